use std::{borrow::Cow, fmt::Write};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ClassPart {
    Char(char),
    /// Inclusive on both ends.
    Range(char, char),
}

impl ClassPart {
    #[inline]
    pub fn contains(self, c: char) -> bool {
        match self {
            ClassPart::Char(a) => a == c,
            ClassPart::Range(lo, hi) => lo <= c && c <= hi,
        }
    }
}

/// A bracketed character class such as `[a-z_]` or `[^"]`.
///
/// Usable in `const` items so that generated parsers can keep their classes in static tables.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct CharClass {
    pub parts: Cow<'static, [ClassPart]>,
    pub inverted: bool,
    pub ignore_case: bool,
}

impl CharClass {
    pub fn new(parts: Vec<ClassPart>, inverted: bool, ignore_case: bool) -> CharClass {
        CharClass {
            parts: Cow::Owned(parts),
            inverted,
            ignore_case,
        }
    }

    fn contains_exact(&self, c: char) -> bool {
        self.parts.iter().any(|p| p.contains(c))
    }

    pub fn matches(&self, c: char) -> bool {
        let mut hit = self.contains_exact(c);
        if !hit && self.ignore_case {
            hit = c.to_lowercase().any(|l| self.contains_exact(l))
                || c.to_uppercase().any(|u| self.contains_exact(u));
        }
        hit != self.inverted
    }

    /// Grammar-like rendering, used in error messages.
    pub fn describe(&self) -> String {
        let mut buf = String::from("[");
        if self.inverted {
            buf.push('^');
        }
        for part in self.parts.iter() {
            match *part {
                ClassPart::Char(c) => escape_class_char(&mut buf, c),
                ClassPart::Range(lo, hi) => {
                    escape_class_char(&mut buf, lo);
                    buf.push('-');
                    escape_class_char(&mut buf, hi);
                }
            }
        }
        buf.push(']');
        buf
    }
}

fn escape_class_char(buf: &mut String, c: char) {
    match c {
        '\\' | ']' | '^' | '-' => {
            buf.push('\\');
            buf.push(c);
        }
        _ => escape_char(buf, c),
    }
}

/// Escapes control characters the way they would be written in a grammar literal.
pub(crate) fn escape_char(buf: &mut String, c: char) {
    match c {
        '\0' => buf.push_str("\\0"),
        '\t' => buf.push_str("\\t"),
        '\n' => buf.push_str("\\n"),
        '\r' => buf.push_str("\\r"),
        c if c.is_control() => {
            _ = write!(buf, "\\x{:02X}", c as u32);
        }
        c => buf.push(c),
    }
}

#[test]
fn test_class_matching() {
    let digits = CharClass::new(vec![ClassPart::Range('0', '9'), ClassPart::Char('_')], false, false);
    assert!(digits.matches('5'));
    assert!(digits.matches('_'));
    assert!(!digits.matches('a'));

    let not_quote = CharClass::new(vec![ClassPart::Char('"')], true, false);
    assert!(not_quote.matches('a'));
    assert!(!not_quote.matches('"'));
}

#[test]
fn test_class_ignore_case() {
    let lower = CharClass::new(vec![ClassPart::Range('a', 'f')], false, true);
    assert!(lower.matches('C'));
    assert!(!lower.matches('G'));

    let inverted = CharClass::new(vec![ClassPart::Range('a', 'f')], true, true);
    assert!(!inverted.matches('C'));
    assert!(inverted.matches('z'));
}

#[test]
fn test_class_describe() {
    let class = CharClass::new(
        vec![ClassPart::Range('a', 'z'), ClassPart::Char(']'), ClassPart::Char('\n')],
        true,
        false,
    );
    assert_eq!(class.describe(), r"[^a-z\]\n]");
}
