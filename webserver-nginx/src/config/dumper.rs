//! Indented dump of a directive tree

use crate::config::ast::{Block, Directive};

/// Indentation per nesting level
pub const INDENT: &str = "    ";

/// Render a top-level block, without a trailing newline
pub fn dump(block: &Block) -> String {
    let mut lines = Vec::new();
    dump_block(block, 0, &mut lines);
    lines.join("\n")
}

/// Render one directive at the top level
pub fn dump_directive(directive: &Directive) -> String {
    let mut lines = Vec::new();
    write_directive(directive, 0, &mut lines);
    lines.join("\n")
}

fn dump_block(block: &Block, depth: usize, lines: &mut Vec<String>) {
    for directive in &block.directives {
        write_directive(directive, depth, lines);
    }
    let indent = INDENT.repeat(depth);
    for comment in &block.trailing_comments {
        lines.push(format!("{indent}{comment}"));
    }
}

fn write_directive(directive: &Directive, depth: usize, lines: &mut Vec<String>) {
    let indent = INDENT.repeat(depth);
    for comment in &directive.comment {
        lines.push(format!("{indent}{comment}"));
    }

    let mut head = format!("{indent}{}", directive.name);
    for arg in &directive.args {
        head.push(' ');
        head.push_str(arg);
    }

    let inline = directive
        .inline_comment
        .as_ref()
        .map(|c| format!(" {c}"))
        .unwrap_or_default();

    match &directive.block {
        None => lines.push(format!("{head};{inline}")),
        Some(block) => {
            lines.push(format!("{head} {{"));
            dump_block(block, depth + 1, lines);
            lines.push(format!("{indent}}}{inline}"));
        }
    }
}
