//! Pretty-printer for the Apache AST
//!
//! Comments and directives are stored in separate lists, so each container
//! merges them back into one item stream before printing: by source line,
//! or by directive priority when sorting is requested.

use std::cmp::Ordering;

pub use webserver_core::config::{ExportSettings as ExportOptions, FormatStyle, IndentStyle};

use crate::order;
use crate::parser::ast::{Block, Comment, Config, Directive, VirtualHost};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemKind {
    Comment,
    Directive,
    Block,
    VirtualHost,
}

#[derive(Debug, Clone, Copy)]
enum Item<'a> {
    Comment(&'a Comment),
    Directive(&'a Directive),
    VirtualHost(&'a VirtualHost),
}

impl<'a> Item<'a> {
    fn line(&self) -> usize {
        match self {
            Item::Comment(c) => c.line,
            Item::Directive(d) => d.line,
            Item::VirtualHost(v) => v.line,
        }
    }

    fn kind(&self) -> ItemKind {
        match self {
            Item::Comment(_) => ItemKind::Comment,
            Item::Directive(d) if d.block.is_some() => ItemKind::Block,
            Item::Directive(_) => ItemKind::Directive,
            Item::VirtualHost(_) => ItemKind::VirtualHost,
        }
    }

    /// Sort key: priority, then args unless the directive is order-sensitive
    fn sort_key(&self) -> (usize, &'a [String]) {
        match self {
            Item::Comment(_) => (usize::MAX, &[]),
            Item::Directive(d) if order::is_order_sensitive(&d.name) => (order::priority(&d.name), &[]),
            Item::Directive(d) => (order::priority(&d.name), &d.args),
            Item::VirtualHost(v) => (order::priority(&v.name), &v.args),
        }
    }
}

// ============================================================
// Entry points
// ============================================================

impl Config {
    /// Export with default options (source order, 4-space indent)
    pub fn export(&self) -> String {
        self.export_with_options(&ExportOptions::default())
    }

    pub fn export_with_options(&self, options: &ExportOptions) -> String {
        let mut items: Vec<Item<'_>> = self.directives.iter().map(Item::Directive).collect();
        items.extend(self.virtual_hosts.iter().map(Item::VirtualHost));
        items.extend(self.comments.iter().map(Item::Comment));

        let mut exporter = Exporter::new(options);
        exporter.write_items(items, 0);
        exporter.out.trim().to_string()
    }
}

impl VirtualHost {
    pub fn export_with_options(&self, options: &ExportOptions, indent: usize) -> String {
        let mut exporter = Exporter::new(options);
        exporter.write_virtual_host(self, indent);
        exporter.out
    }
}

impl Block {
    pub fn export_with_options(&self, options: &ExportOptions, indent: usize) -> String {
        let mut exporter = Exporter::new(options);
        exporter.write_block(self, indent);
        exporter.out
    }
}

impl Directive {
    pub fn export_with_options(&self, options: &ExportOptions, indent: usize) -> String {
        let mut exporter = Exporter::new(options);
        exporter.write_directive(self, indent);
        exporter.out
    }
}

// ============================================================
// Exporter
// ============================================================

struct Exporter<'o> {
    options: &'o ExportOptions,
    out: String,
}

impl<'o> Exporter<'o> {
    fn new(options: &'o ExportOptions) -> Self {
        Self {
            options,
            out: String::new(),
        }
    }

    fn write_items(&mut self, mut items: Vec<Item<'_>>, indent: usize) {
        if !self.options.include_comments {
            items.retain(|i| i.kind() != ItemKind::Comment);
        }
        items.sort_by_key(Item::line);
        if self.options.sort_directives {
            items = sort_items(items);
        }

        for (i, item) in items.iter().enumerate() {
            match item {
                Item::Comment(c) => self.write_comment(c, indent),
                Item::Directive(d) => self.write_directive(d, indent),
                Item::VirtualHost(v) => self.write_virtual_host(v, indent),
            }
            if let Some(next) = items.get(i + 1) {
                if self.needs_blank_line(item.kind(), next.kind()) {
                    self.out.push('\n');
                }
            }
        }
    }

    fn needs_blank_line(&self, current: ItemKind, next: ItemKind) -> bool {
        if !self.options.preserve_empty_lines {
            return false;
        }
        match self.options.format_style {
            FormatStyle::Verbose => true,
            FormatStyle::Compact => false,
            FormatStyle::Standard => {
                current != next && current != ItemKind::Comment && next != ItemKind::Comment
            }
        }
    }

    fn indent(&mut self, level: usize) {
        match self.options.indent_style {
            IndentStyle::Tabs => self.out.extend(std::iter::repeat_n('\t', level)),
            IndentStyle::Spaces => self
                .out
                .extend(std::iter::repeat_n(' ', level * self.options.indent_size)),
        }
    }

    fn write_comment(&mut self, comment: &Comment, indent: usize) {
        self.indent(indent);
        if comment.text.is_empty() {
            self.out.push('#');
        } else {
            self.out.push_str("# ");
            self.out.push_str(&comment.text);
        }
        self.out.push('\n');
    }

    fn write_directive(&mut self, directive: &Directive, indent: usize) {
        if let Some(block) = &directive.block {
            self.write_block(block, indent);
            return;
        }
        self.indent(indent);
        self.out.push_str(&directive.name);
        self.write_args(&directive.args);
        self.out.push('\n');
    }

    fn write_block(&mut self, block: &Block, indent: usize) {
        self.indent(indent);
        self.out.push('<');
        self.out.push_str(&block.kind);
        self.write_args(&block.args);
        self.out.push_str(">\n");

        let mut items: Vec<Item<'_>> = block.directives.iter().map(Item::Directive).collect();
        items.extend(block.comments.iter().map(Item::Comment));
        self.write_items(items, indent + 1);

        self.indent(indent);
        self.out.push_str("</");
        self.out.push_str(&block.kind);
        self.out.push_str(">\n");
    }

    fn write_virtual_host(&mut self, vhost: &VirtualHost, indent: usize) {
        self.indent(indent);
        self.out.push('<');
        self.out.push_str(&vhost.name);
        self.write_args(&vhost.args);
        self.out.push_str(">\n");

        let mut items: Vec<Item<'_>> = vhost.directives.iter().map(Item::Directive).collect();
        items.extend(vhost.comments.iter().map(Item::Comment));
        self.write_items(items, indent + 1);

        self.indent(indent);
        self.out.push_str("</");
        self.out.push_str(&vhost.name);
        self.out.push_str(">\n");
    }

    fn write_args(&mut self, args: &[String]) {
        for arg in args {
            self.out.push(' ');
            self.out.push_str(&quote_arg(arg));
        }
    }
}

/// Quote an argument that contains whitespace and is not quoted already
pub fn quote_arg(arg: &str) -> String {
    let quoted = arg.starts_with('"') || arg.starts_with('\'');
    if quoted || !arg.contains(char::is_whitespace) {
        return arg.to_string();
    }
    format!("\"{}\"", arg.replace('"', "\\\""))
}

/// Sort by priority while each run of comments stays attached to the item after it.
/// Items arrive in source order; trailing comments stay last.
fn sort_items(items: Vec<Item<'_>>) -> Vec<Item<'_>> {
    let mut groups: Vec<(Item<'_>, Vec<Item<'_>>)> = Vec::new();
    let mut pending = Vec::new();
    for item in items {
        if item.kind() == ItemKind::Comment {
            pending.push(item);
        } else {
            groups.push((item, std::mem::take(&mut pending)));
        }
    }

    groups.sort_by(|(a, _), (b, _)| compare(a, b));

    let mut sorted = Vec::new();
    for (item, comments) in groups {
        sorted.extend(comments);
        sorted.push(item);
    }
    sorted.extend(pending);
    sorted
}

fn compare(a: &Item<'_>, b: &Item<'_>) -> Ordering {
    a.sort_key().cmp(&b.sort_key())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_str;

    const SAMPLE: &str = r#"<VirtualHost *:80>
    # main name
    ServerName www.example.com
    DocumentRoot /var/www/html
    <Directory /var/www/html>
        Require all granted
    </Directory>
</VirtualHost>"#;

    fn options() -> ExportOptions {
        ExportOptions::default()
    }

    #[test]
    fn test_export_round_trip() {
        let config = parse_str(SAMPLE).unwrap();
        let exported = config.export();
        assert_eq!(
            exported,
            "<VirtualHost *:80>\n    # main name\n    ServerName www.example.com\n    DocumentRoot /var/www/html\n\n    <Directory /var/www/html>\n        Require all granted\n    </Directory>\n</VirtualHost>"
        );

        let again = parse_str(&exported).unwrap();
        assert_eq!(again.export(), exported);
    }

    #[test]
    fn test_quotes_whitespace_args() {
        let directive = Directive::new("ErrorDocument", ["404", "Not found here"]);
        assert_eq!(
            directive.export_with_options(&options(), 0),
            "ErrorDocument 404 \"Not found here\"\n"
        );

        let quoted = Directive::new("Header", ["set", "\"a b\""]);
        assert_eq!(quoted.export_with_options(&options(), 0), "Header set \"a b\"\n");
        assert_eq!(quote_arg("say \"hi\" now"), "\"say \\\"hi\\\" now\"");
    }

    #[test]
    fn test_tabs_and_compact() {
        let config = parse_str(SAMPLE).unwrap();
        let options = ExportOptions {
            indent_style: IndentStyle::Tabs,
            format_style: FormatStyle::Compact,
            include_comments: false,
            ..ExportOptions::default()
        };
        assert_eq!(
            config.export_with_options(&options),
            "<VirtualHost *:80>\n\tServerName www.example.com\n\tDocumentRoot /var/www/html\n\t<Directory /var/www/html>\n\t\tRequire all granted\n\t</Directory>\n</VirtualHost>"
        );
    }

    #[test]
    fn test_verbose_separates_every_item() {
        let config = parse_str("Listen 80\nListen 443\n").unwrap();
        let options = ExportOptions {
            format_style: FormatStyle::Verbose,
            ..ExportOptions::default()
        };
        assert_eq!(config.export_with_options(&options), "Listen 80\n\nListen 443");

        let flat = ExportOptions {
            format_style: FormatStyle::Verbose,
            preserve_empty_lines: false,
            ..ExportOptions::default()
        };
        assert_eq!(config.export_with_options(&flat), "Listen 80\nListen 443");
    }

    #[test]
    fn test_sorted_export_keeps_comments_attached() {
        let source = "<VirtualHost *:80>\nDocumentRoot /srv\n# the name\nServerName a.com\nErrorLog /log\n# trailing\n</VirtualHost>\n";
        let config = parse_str(source).unwrap();
        let options = ExportOptions {
            sort_directives: true,
            format_style: FormatStyle::Compact,
            ..ExportOptions::default()
        };
        assert_eq!(
            config.export_with_options(&options),
            "<VirtualHost *:80>\n    # the name\n    ServerName a.com\n    DocumentRoot /srv\n    ErrorLog /log\n    # trailing\n</VirtualHost>"
        );
    }

    #[test]
    fn test_sorted_export_keeps_rewrite_order() {
        let source = "RewriteRule ^b - [L]\nRewriteCond %{HTTPS} off\nRewriteEngine on\nListen 80\n";
        let config = parse_str(source).unwrap();
        let options = ExportOptions {
            sort_directives: true,
            ..ExportOptions::default()
        };
        assert_eq!(
            config.export_with_options(&options),
            "Listen 80\nRewriteRule ^b - [L]\nRewriteCond %{HTTPS} off\nRewriteEngine on"
        );
    }

    #[test]
    fn test_sorted_export_orders_by_args() {
        let config = parse_str("Listen 8080\nListen 443\nListen 80\n").unwrap();
        let options = ExportOptions {
            sort_directives: true,
            ..ExportOptions::default()
        };
        assert_eq!(config.export_with_options(&options), "Listen 443\nListen 80\nListen 8080");
    }
}
