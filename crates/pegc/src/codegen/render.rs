use std::fmt::Write;

use crate::span::Span;

use super::sourcemap::{Mapping, SourceMap};

#[derive(Clone, Debug)]
struct Line {
    indent: u32,
    text: String,
    /// Grammar text this line was generated from.
    origin: Option<Span>,
}

/// Line based writer for generated source.
///
/// Each line remembers the innermost grammar span active when it was written.
#[derive(Clone, Default, Debug)]
pub struct CodeWriter {
    lines: Vec<Line>,
    indent: u32,
    origins: Vec<Span>,
}

impl CodeWriter {
    pub fn new() -> CodeWriter {
        CodeWriter::default()
    }

    /// A writer for code that will be spliced into this one at the current indentation.
    pub fn nested(&self) -> CodeWriter {
        CodeWriter {
            lines: Vec::new(),
            indent: self.indent,
            origins: self.origins.clone(),
        }
    }

    pub fn line(&mut self, text: impl Into<String>) {
        self.lines.push(Line {
            indent: self.indent,
            text: text.into(),
            origin: self.origins.last().copied(),
        });
    }

    pub fn blank(&mut self) {
        self.lines.push(Line {
            indent: 0,
            text: String::new(),
            origin: None,
        });
    }

    /// Writes `text` and indents what follows, `text` usually ends with `{`.
    pub fn open(&mut self, text: impl Into<String>) {
        self.line(text);
        self.indent += 1;
    }

    pub fn close(&mut self, text: impl Into<String>) {
        self.indent = self.indent.saturating_sub(1);
        self.line(text);
    }

    /// `} else {` and similar, written one level out.
    pub fn reopen(&mut self, text: impl Into<String>) {
        self.indent = self.indent.saturating_sub(1);
        self.line(text);
        self.indent += 1;
    }

    /// Copies host code line by line, attributing it to `origin`.
    pub fn code(&mut self, code: &str, origin: Span) {
        self.origins.push(origin);
        for line in code.trim().lines() {
            self.line(line.trim_end());
        }
        self.origins.pop();
    }

    pub fn push_origin(&mut self, span: Span) {
        self.origins.push(span);
    }

    pub fn pop_origin(&mut self) -> Option<Span> {
        self.origins.pop()
    }

    pub fn append(&mut self, other: CodeWriter) {
        self.lines.extend(other.lines);
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn finish(self) -> (String, SourceMap) {
        let mut buf = String::new();
        let mut mappings: Vec<Mapping> = Vec::new();
        for (i, line) in self.lines.iter().enumerate() {
            for _ in 0..line.indent {
                buf.push_str("    ");
            }
            _ = writeln!(buf, "{}", line.text);

            let Some(origin) = line.origin else {
                continue;
            };
            let i = i as u32;
            match mappings.last_mut() {
                Some(last) if last.original == origin && last.generated.end == i => {
                    last.generated.end = i + 1;
                }
                _ => mappings.push(Mapping {
                    generated: i..i + 1,
                    original: origin,
                }),
            }
        }
        (buf, SourceMap { mappings })
    }
}

#[test]
fn test_writer_merges_origins() {
    let mut w = CodeWriter::new();
    w.line("use a;");
    w.push_origin(Span::new(4, 8));
    w.open("if x {");
    w.line("y();");
    w.close("}");
    w.pop_origin();
    w.code("first\nsecond", Span::new(10, 20));

    let (source, map) = w.finish();
    assert_eq!(source, "use a;\nif x {\n    y();\n}\nfirst\nsecond\n");
    assert_eq!(
        map.mappings,
        vec![
            Mapping {
                generated: 1..4,
                original: Span::new(4, 8)
            },
            Mapping {
                generated: 4..6,
                original: Span::new(10, 20)
            },
        ]
    );
}
