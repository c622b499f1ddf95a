//! Pretty printing utilities for ASTs and CFG dumps.
//!
//! ASTs go through the `pretty` crate (see [`PrettyPrint`]); CFG dumps are
//! line oriented and use [`CodeFormatter`].

use pretty::{DocAllocator, DocBuilder, BoxAllocator};
use std::fmt;

/// Default line width for pretty printing.
pub const DEFAULT_WIDTH: usize = 80;

/// A pretty-printable value.
pub trait PrettyPrint {
    /// Convert to a pretty document.
    fn to_doc<'a, D: DocAllocator<'a>>(&self, allocator: &'a D) -> DocBuilder<'a, D>;

    /// Pretty print to a string with the given width.
    fn pretty_print(&self, width: usize) -> String {
        let allocator = BoxAllocator;
        let doc = self.to_doc(&allocator);
        let mut output = String::new();
        // Writing into a String cannot fail.
        let _ = doc.render_fmt(width, &mut output);
        output
    }

    /// Pretty print with default width.
    fn pretty(&self) -> String {
        self.pretty_print(DEFAULT_WIDTH)
    }
}

/// A line-oriented formatter with indentation, used for CFG dumps.
#[derive(Debug)]
pub struct CodeFormatter {
    output: String,
    indent_level: usize,
    indent_str: String,
    at_line_start: bool,
}

impl CodeFormatter {
    /// Create a new formatter with the given indent string.
    pub fn new(indent_str: &str) -> Self {
        Self {
            output: String::new(),
            indent_level: 0,
            indent_str: indent_str.to_string(),
            at_line_start: true,
        }
    }

    /// Create a formatter with default settings (2 spaces).
    pub fn default_indent() -> Self {
        Self::new("  ")
    }

    pub fn indent(&mut self) {
        self.indent_level += 1;
    }

    pub fn dedent(&mut self) {
        if self.indent_level > 0 {
            self.indent_level -= 1;
        }
    }

    /// Write text, indenting at the start of every line.
    pub fn write(&mut self, s: &str) {
        for c in s.chars() {
            if c == '\n' {
                self.output.push('\n');
                self.at_line_start = true;
            } else {
                if self.at_line_start {
                    for _ in 0..self.indent_level {
                        self.output.push_str(&self.indent_str);
                    }
                    self.at_line_start = false;
                }
                self.output.push(c);
            }
        }
    }

    pub fn writeln(&mut self, s: &str) {
        self.write(s);
        self.write("\n");
    }

    /// Write `header:` and run `f` one level deeper.
    pub fn section<F: FnOnce(&mut Self)>(&mut self, header: &str, f: F) {
        self.write(header);
        self.writeln(":");
        self.indent();
        f(self);
        self.dedent();
    }

    /// Get the formatted output.
    pub fn finish(self) -> String {
        self.output
    }
}

/// Format a list of displayable items with separators.
pub fn format_list<T: fmt::Display>(items: &[T], sep: &str) -> String {
    format_list_with(items, sep, |item| item.to_string())
}

/// Format a list with separators using a custom formatter.
pub fn format_list_with<T, F: Fn(&T) -> String>(items: &[T], sep: &str, f: F) -> String {
    items
        .iter()
        .map(f)
        .collect::<Vec<_>>()
        .join(sep)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_formatter() {
        let mut fmt = CodeFormatter::default_indent();
        fmt.writeln("bb 3:");
        fmt.indent();
        fmt.writeln("iv_1 = PHI <0(2), iv_2(5)>");
        fmt.writeln("goto bb 4;");
        fmt.dedent();
        fmt.writeln("bb 4:");

        let output = fmt.finish();
        assert!(output.contains("  iv_1 = PHI"));
        assert!(output.contains("  goto bb 4;"));
        assert!(output.contains("\nbb 4:"));
    }

    #[test]
    fn test_section() {
        let mut fmt = CodeFormatter::default_indent();
        fmt.section("loop 1", |f| {
            f.writeln("header: bb 3");
        });

        let output = fmt.finish();
        assert!(output.starts_with("loop 1:\n"));
        assert!(output.contains("  header: bb 3"));
    }

    #[test]
    fn test_format_list_with() {
        let s = format_list_with(&[1, 2, 3], ", ", |x| format!("bb {}", x));
        assert_eq!(s, "bb 1, bb 2, bb 3");
    }
}
