//! Abstract Syntax Tree for Apache configuration
//!
//! Every node keeps the line and column it was read from. Comments live in
//! their own lists and are merged back by line number on export.

use serde::{Deserialize, Serialize};

use crate::parser::lexer::Token;

// ============================================================
// Nodes
// ============================================================

/// Root of a parsed configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub directives: Vec<Directive>,
    pub virtual_hosts: Vec<VirtualHost>,
    pub comments: Vec<Comment>,
    /// Includes that were spliced in, for diagnostics
    pub includes: Vec<Include>,
}

/// A directive line, or a container such as `<Directory>` when `block` is set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directive {
    pub name: String,
    pub args: Vec<String>,
    pub line: usize,
    pub column: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block: Option<Block>,
}

/// `<VirtualHost ...>` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualHost {
    pub name: String,
    /// Usually `addr:port` pairs
    pub args: Vec<String>,
    pub line: usize,
    pub column: usize,
    pub directives: Vec<Directive>,
    pub comments: Vec<Comment>,
}

/// Body of a container directive
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Directory, Location, IfModule, ...
    #[serde(rename = "type")]
    pub kind: String,
    pub args: Vec<String>,
    pub directives: Vec<Directive>,
    pub comments: Vec<Comment>,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// Text after `# `
    pub text: String,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Include {
    pub path: String,
    pub line: usize,
    pub column: usize,
}

impl Directive {
    pub fn new<I, S>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// An empty container directive
    pub fn block<I, S>(kind: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut directive = Self::new(kind, args);
        directive.block = Some(Block {
            kind: directive.name.clone(),
            args: directive.args.clone(),
            ..Block::default()
        });
        directive
    }

    /// Replace the arguments, keeping a container's tag in step
    pub fn set_args(&mut self, args: Vec<String>) {
        if let Some(block) = self.block.as_mut() {
            block.args = args.clone();
        }
        self.args = args;
    }

    /// First argument without surrounding quotes
    pub fn value(&self) -> Option<&str> {
        self.args.first().map(|a| crate::parser::parser::unquote(a))
    }
}

impl Comment {
    pub fn new(text: impl Into<String>, line: usize) -> Self {
        Self {
            text: text.into(),
            line,
            column: 0,
        }
    }

    pub(crate) fn from_token(token: &Token) -> Self {
        Self {
            text: token.value.clone(),
            line: token.line,
            column: token.column,
        }
    }
}

// ============================================================
// Lookup and mutation
// ============================================================

/// Case-insensitive directive lookup and mutation shared by every container.
///
/// Newly added items get a line number past the container's last item so
/// that source-order export places them at the end.
pub trait DirectiveList {
    fn directives(&self) -> &[Directive];
    fn directives_mut(&mut self) -> &mut Vec<Directive>;
    fn comments(&self) -> &[Comment];
    fn comments_mut(&mut self) -> &mut Vec<Comment>;
    /// Line the container itself starts on
    fn start_line(&self) -> usize;

    fn get_directive(&self, name: &str) -> Option<&Directive> {
        self.directives().iter().find(|d| d.name.eq_ignore_ascii_case(name))
    }

    fn get_directive_mut(&mut self, name: &str) -> Option<&mut Directive> {
        self.directives_mut().iter_mut().find(|d| d.name.eq_ignore_ascii_case(name))
    }

    fn get_directives(&self, name: &str) -> Vec<&Directive> {
        self.directives()
            .iter()
            .filter(|d| d.name.eq_ignore_ascii_case(name))
            .collect()
    }

    fn has_directive(&self, name: &str) -> bool {
        self.get_directive(name).is_some()
    }

    /// First argument of the first matching directive, empty when absent
    fn get_directive_value(&self, name: &str) -> &str {
        self.get_directive(name)
            .and_then(|d| d.args.first())
            .map(String::as_str)
            .unwrap_or("")
    }

    fn get_directive_values(&self, name: &str) -> &[String] {
        self.get_directive(name).map(|d| d.args.as_slice()).unwrap_or(&[])
    }

    /// Line number for the next appended item
    fn next_line(&self) -> usize {
        let directives = self.directives().iter().map(|d| last_line(d));
        let comments = self.comments().iter().map(|c| c.line);
        directives.chain(comments).max().unwrap_or(self.start_line()).max(self.start_line()) + 1
    }

    fn add_directive<I, S>(&mut self, name: &str, args: I) -> &mut Directive
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        Self: Sized,
    {
        let mut directive = Directive::new(name, args);
        directive.line = self.next_line();
        push_last(self.directives_mut(), directive)
    }

    /// Update the first matching directive or append a new one
    fn set_directive<I, S>(&mut self, name: &str, args: I) -> &mut Directive
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        Self: Sized,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        match self.directives().iter().position(|d| d.name.eq_ignore_ascii_case(name)) {
            Some(index) => {
                let directive = &mut self.directives_mut()[index];
                directive.set_args(args);
                directive
            }
            None => self.add_directive(name, args),
        }
    }

    /// Insert right after the last directive named `anchor`, or append
    fn insert_directive_after(&mut self, anchor: &str, mut directive: Directive) -> &mut Directive
    where
        Self: Sized,
    {
        match self.directives().iter().rposition(|d| d.name.eq_ignore_ascii_case(anchor)) {
            Some(index) => {
                directive.line = self.directives()[index].line;
                let list = self.directives_mut();
                list.insert(index + 1, directive);
                &mut list[index + 1]
            }
            None => {
                directive.line = self.next_line();
                push_last(self.directives_mut(), directive)
            }
        }
    }

    /// Remove the first matching directive
    fn remove_directive(&mut self, name: &str) -> bool {
        match self.directives().iter().position(|d| d.name.eq_ignore_ascii_case(name)) {
            Some(index) => {
                self.directives_mut().remove(index);
                true
            }
            None => false,
        }
    }

    /// Remove every matching directive, returning how many were removed
    fn remove_directives(&mut self, name: &str) -> usize
    where
        Self: Sized,
    {
        self.remove_directives_where(|d| d.name.eq_ignore_ascii_case(name))
    }

    fn remove_directives_where(&mut self, predicate: impl Fn(&Directive) -> bool) -> usize
    where
        Self: Sized,
    {
        let before = self.directives().len();
        self.directives_mut().retain(|d| !predicate(d));
        before - self.directives().len()
    }

    fn add_block<I, S>(&mut self, kind: &str, args: I) -> &mut Block
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        Self: Sized,
    {
        let line = self.next_line();
        let mut directive = Directive::block(kind, args);
        directive.line = line;
        if let Some(block) = directive.block.as_mut() {
            block.line = line;
        }
        let directive = push_last(self.directives_mut(), directive);
        directive.block.get_or_insert_with(Block::default)
    }

    /// Block of the given kind; when `args` is non-empty they must match exactly
    fn get_block(&self, kind: &str, args: &[&str]) -> Option<&Block> {
        self.directives()
            .iter()
            .filter_map(|d| d.block.as_ref())
            .find(|b| block_matches(b, kind, args))
    }

    fn get_block_mut(&mut self, kind: &str, args: &[&str]) -> Option<&mut Block> {
        self.directives_mut()
            .iter_mut()
            .filter_map(|d| d.block.as_mut())
            .find(|b| block_matches(b, kind, args))
    }

    /// Directive owning the matching block, for edits to the tag itself
    fn get_block_directive_mut(&mut self, kind: &str, args: &[&str]) -> Option<&mut Directive> {
        self.directives_mut()
            .iter_mut()
            .find(|d| d.block.as_ref().is_some_and(|b| block_matches(b, kind, args)))
    }

    fn add_comment(&mut self, text: &str) -> &mut Comment
    where
        Self: Sized,
    {
        let comment = Comment::new(text, self.next_line());
        let comments = self.comments_mut();
        comments.push(comment);
        let last = comments.len() - 1;
        &mut comments[last]
    }
}

fn push_last(list: &mut Vec<Directive>, directive: Directive) -> &mut Directive {
    list.push(directive);
    let last = list.len() - 1;
    &mut list[last]
}

/// Last line a directive occupies, including its block body
fn last_line(directive: &Directive) -> usize {
    let Some(block) = &directive.block else {
        return directive.line;
    };
    let inner = block.directives.iter().map(last_line);
    let comments = block.comments.iter().map(|c| c.line);
    inner.chain(comments).max().unwrap_or(directive.line).max(directive.line)
}

fn block_matches(block: &Block, kind: &str, args: &[&str]) -> bool {
    block.kind.eq_ignore_ascii_case(kind)
        && (args.is_empty() || (block.args.len() == args.len() && block.args.iter().zip(args).all(|(a, b)| a == b)))
}

impl DirectiveList for Config {
    fn directives(&self) -> &[Directive] {
        &self.directives
    }

    fn directives_mut(&mut self) -> &mut Vec<Directive> {
        &mut self.directives
    }

    fn comments(&self) -> &[Comment] {
        &self.comments
    }

    fn comments_mut(&mut self) -> &mut Vec<Comment> {
        &mut self.comments
    }

    fn start_line(&self) -> usize {
        0
    }

    fn next_line(&self) -> usize {
        let directives = self.directives.iter().map(last_line);
        let vhosts = self.virtual_hosts.iter().map(|v| v.next_line() - 1);
        let comments = self.comments.iter().map(|c| c.line);
        directives.chain(vhosts).chain(comments).max().unwrap_or(0) + 1
    }
}

impl DirectiveList for VirtualHost {
    fn directives(&self) -> &[Directive] {
        &self.directives
    }

    fn directives_mut(&mut self) -> &mut Vec<Directive> {
        &mut self.directives
    }

    fn comments(&self) -> &[Comment] {
        &self.comments
    }

    fn comments_mut(&mut self) -> &mut Vec<Comment> {
        &mut self.comments
    }

    fn start_line(&self) -> usize {
        self.line
    }
}

impl DirectiveList for Block {
    fn directives(&self) -> &[Directive] {
        &self.directives
    }

    fn directives_mut(&mut self) -> &mut Vec<Directive> {
        &mut self.directives
    }

    fn comments(&self) -> &[Comment] {
        &self.comments
    }

    fn comments_mut(&mut self) -> &mut Vec<Comment> {
        &mut self.comments
    }

    fn start_line(&self) -> usize {
        self.line
    }
}

impl Config {
    /// Virtual host whose arguments equal `args`
    pub fn get_virtual_host(&self, args: &[&str]) -> Option<&VirtualHost> {
        self.virtual_hosts
            .iter()
            .find(|v| v.args.len() == args.len() && v.args.iter().zip(args).all(|(a, b)| a == b))
    }

    pub fn add_virtual_host<I, S>(&mut self, args: I) -> &mut VirtualHost
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let line = self.next_line();
        self.virtual_hosts.push(VirtualHost {
            name: "VirtualHost".to_string(),
            args: args.into_iter().map(Into::into).collect(),
            line,
            ..VirtualHost::default()
        });
        let last = self.virtual_hosts.len() - 1;
        &mut self.virtual_hosts[last]
    }
}
