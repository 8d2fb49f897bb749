//! Nginx directive tree
//!
//! Comments are attached to the directive that follows them, so reordering
//! directives carries their comments along. Parameters keep their quotes.

use serde::{Deserialize, Serialize};

/// A simple directive (`listen 80;`) or a block directive (`server { ... }`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directive {
    pub name: String,
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block: Option<Block>,
    /// Comment lines directly above, each with its leading `#`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comment: Vec<String>,
    /// Comment on the same line after the terminator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_comment: Option<String>,
    pub line: usize,
}

/// Directives inside braces, or the whole file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub directives: Vec<Directive>,
    /// Comments after the last directive
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trailing_comments: Vec<String>,
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

    /// A block directive holding `directives`
    pub fn with_block<I, S>(name: impl Into<String>, args: I, directives: Vec<Directive>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut directive = Self::new(name, args);
        directive.block = Some(Block {
            directives,
            trailing_comments: Vec::new(),
        });
        directive
    }

    /// Attach comment lines; a missing `#` is added
    pub fn with_comment<I, S>(mut self, comment: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.comment = comment
            .into_iter()
            .map(Into::into)
            .map(|c: String| if c.starts_with('#') { c } else { format!("# {c}") })
            .collect();
        self
    }

    /// First parameter without quotes
    pub fn value(&self) -> Option<&str> {
        self.args.first().map(|a| unquote(a))
    }

    /// Whether the directive owns a block with at least one directive
    pub fn has_body(&self) -> bool {
        self.block.as_ref().is_some_and(|b| !b.directives.is_empty())
    }
}

impl Block {
    /// Direct children named `name`
    pub fn find(&self, name: &str) -> Vec<&Directive> {
        self.directives.iter().filter(|d| d.name == name).collect()
    }

    pub fn find_mut(&mut self, name: &str) -> Vec<&mut Directive> {
        self.directives.iter_mut().filter(|d| d.name == name).collect()
    }

    pub fn has(&self, name: &str) -> bool {
        self.directives.iter().any(|d| d.name == name)
    }

    /// Remove every child named `name`, returning the index of the first one
    pub fn remove_all(&mut self, name: &str) -> Option<usize> {
        let first = self.directives.iter().position(|d| d.name == name);
        self.directives.retain(|d| d.name != name);
        first
    }

    pub fn remove_where(&mut self, mut pred: impl FnMut(&Directive) -> bool) {
        self.directives.retain(|d| !pred(d));
    }
}

/// Strip one pair of matching quotes
pub fn unquote(arg: &str) -> &str {
    let bytes = arg.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' || first == b'\'') && first == last {
            return &arg[1..arg.len() - 1];
        }
    }
    arg
}

/// Quote a parameter when Nginx would otherwise split or misread it
pub fn quote_arg(arg: &str) -> String {
    if arg.is_empty() {
        return "\"\"".to_string();
    }
    if arg.starts_with('"') || arg.starts_with('\'') {
        return arg.to_string();
    }
    let special = |c: char| c.is_whitespace() || matches!(c, ';' | '{' | '}' | '#' | '"' | '\'');
    if !arg.contains(special) {
        return arg.to_string();
    }
    if arg.contains('\'') {
        format!("\"{}\"", arg.replace('"', "\\\""))
    } else {
        format!("'{arg}'")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("\"a b\""), "a b");
        assert_eq!(unquote("'x'"), "x");
        assert_eq!(unquote("\"x'"), "\"x'");
        assert_eq!(unquote("\""), "\"");
    }

    #[test]
    fn test_quote_arg() {
        assert_eq!(quote_arg("/srv/www"), "/srv/www");
        assert_eq!(quote_arg("/srv/my site"), "'/srv/my site'");
        assert_eq!(quote_arg(r#"h3=":443"; ma=86400"#), r#"'h3=":443"; ma=86400'"#);
        assert_eq!(quote_arg("it's"), "\"it's\"");
        assert_eq!(quote_arg("\"kept\""), "\"kept\"");
        assert_eq!(quote_arg(""), "\"\"");
    }

    #[test]
    fn test_with_comment_adds_hash() {
        let d = Directive::new("include", ["a.conf"]).with_comment(["note", "# kept"]);
        assert_eq!(d.comment, vec!["# note", "# kept"]);
    }

    #[test]
    fn test_remove_all() {
        let mut block = Block {
            directives: vec![
                Directive::new("listen", ["80"]),
                Directive::new("root", ["/srv"]),
                Directive::new("listen", ["443"]),
            ],
            ..Block::default()
        };
        assert_eq!(block.remove_all("listen"), Some(0));
        assert_eq!(block.directives.len(), 1);
        assert_eq!(block.remove_all("listen"), None);
    }
}
