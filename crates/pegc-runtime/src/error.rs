use std::{borrow::Cow, fmt::Display};

use crate::{class::escape_char, CharClass, Location, Position};

/// What the parser was looking for when an attempt failed.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Expectation {
    Literal {
        text: Cow<'static, str>,
        ignore_case: bool,
    },
    Class(CharClass),
    Any,
    End,
    /// Named rules and other free-form descriptions.
    Other { description: Cow<'static, str> },
}

impl Expectation {
    pub fn literal(text: impl Into<String>, ignore_case: bool) -> Expectation {
        Expectation::Literal {
            text: Cow::Owned(text.into()),
            ignore_case,
        }
    }
    pub fn other(description: impl Into<String>) -> Expectation {
        Expectation::Other {
            description: Cow::Owned(description.into()),
        }
    }
    pub fn describe(&self) -> String {
        match self {
            Expectation::Literal { text, .. } => {
                let mut buf = String::from("\"");
                escape_literal(&mut buf, text);
                buf.push('"');
                buf
            }
            Expectation::Class(class) => class.describe(),
            Expectation::Any => "any character".to_owned(),
            Expectation::End => "end of input".to_owned(),
            Expectation::Other { description } => description.to_string(),
        }
    }
}

fn escape_literal(buf: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '\\' => buf.push_str("\\\\"),
            '"' => buf.push_str("\\\""),
            c => escape_char(buf, c),
        }
    }
}

/// Structured failure of a parse, also used for syntax errors in grammar text.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ParseError {
    pub message: String,
    /// Sorted by description and deduplicated.
    pub expected: Vec<Expectation>,
    /// The character found at the failure position, `None` at the end of input.
    pub found: Option<String>,
    pub location: Location,
}

impl ParseError {
    pub fn new(
        mut expected: Vec<Expectation>,
        found: Option<String>,
        location: Location,
    ) -> ParseError {
        let mut described = expected
            .drain(..)
            .map(|e| (e.describe(), e))
            .collect::<Vec<_>>();
        described.sort_by(|a, b| a.0.cmp(&b.0));
        described.dedup_by(|a, b| a.0 == b.0);

        let descriptions = described.iter().map(|(d, _)| d.as_str()).collect::<Vec<_>>();
        let message = build_message(&descriptions, found.as_deref());

        ParseError {
            message,
            expected: described.into_iter().map(|(_, e)| e).collect(),
            found,
            location,
        }
    }

    pub fn custom(message: impl Into<String>, location: Location) -> ParseError {
        ParseError {
            message: message.into(),
            expected: Vec::new(),
            found: None,
            location,
        }
    }

    pub fn unknown_start_rule(rule: &str, source: Option<String>) -> ParseError {
        let start = Position {
            offset: 0,
            line: 1,
            column: 1,
        };
        ParseError::custom(
            format!("Can't start parsing from rule \"{rule}\"."),
            Location {
                source,
                start,
                end: start,
            },
        )
    }
}

fn build_message(descriptions: &[&str], found: Option<&str>) -> String {
    let expected = match descriptions {
        [] => String::new(),
        [one] => one.to_string(),
        [a, b] => format!("{a} or {b}"),
        [init @ .., last] => format!("{}, or {last}", init.join(", ")),
    };
    let found = match found {
        Some(found) => {
            let mut buf = String::from("\"");
            escape_literal(&mut buf, found);
            buf.push('"');
            buf
        }
        None => "end of input".to_owned(),
    };
    format!("Expected {expected} but {found} found.")
}

impl Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
fn location_at(offset: usize) -> Location {
    let p = Position {
        offset,
        line: 1,
        column: offset as u32 + 1,
    };
    Location {
        source: None,
        start: p,
        end: p,
    }
}

#[test]
fn test_error_message() {
    let err = ParseError::new(
        vec![
            Expectation::literal("b", false),
            Expectation::Any,
            Expectation::literal("b", false),
            Expectation::other("number"),
        ],
        Some("x".to_owned()),
        location_at(1),
    );
    assert_eq!(err.message, r#"Expected "b", any character, or number but "x" found."#);
    assert_eq!(err.expected.len(), 3);
}

#[test]
fn test_error_message_end_of_input() {
    let err = ParseError::new(vec![Expectation::End], None, location_at(0));
    assert_eq!(err.message, "Expected end of input but end of input found.");

    let err = ParseError::new(
        vec![Expectation::literal("a\"", false), Expectation::End],
        Some("\n".to_owned()),
        location_at(0),
    );
    assert_eq!(err.message, r#"Expected "a\"" or end of input but "\n" found."#);
}
