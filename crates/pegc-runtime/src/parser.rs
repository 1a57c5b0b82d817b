use std::collections::HashMap;

use crate::{
    location::LineCache, CharClass, Expectation, Location, ParseError, TraceEvent, TraceKind,
    Tracer, Value,
};

#[derive(Default)]
pub struct ParseOptions {
    /// Overrides the default start rule, must be one of the parser's allowed start rules.
    pub start_rule: Option<String>,
    /// Opaque tag copied into every reported [`Location`].
    pub grammar_source: Option<String>,
    /// Only consulted by parsers compiled with tracing enabled.
    pub tracer: Option<Box<dyn Tracer>>,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    pos: usize,
    rule: u32,
    silent: bool,
}

struct CacheEntry {
    next_pos: usize,
    result: Value,
}

/// Mutable state of a single parse call.
///
/// Generated parsers and the bytecode interpreter drive this directly, it is never shared
/// between calls.
pub struct ParseState<'a> {
    input: &'a str,
    /// current position, a byte offset
    pub pos: usize,
    /// start of the text an action or predicate sees through `text()`
    pub saved_pos: usize,
    /// while nonzero, failures are not recorded
    pub silent_fails: u32,

    max_fail_pos: usize,
    max_fail_expected: Vec<Expectation>,

    lines: LineCache,
    cache: HashMap<CacheKey, CacheEntry>,
    tracer: Option<Box<dyn Tracer>>,
    source: Option<String>,
}

impl<'a> ParseState<'a> {
    pub fn new(input: &'a str, options: ParseOptions) -> ParseState<'a> {
        ParseState {
            input,
            pos: 0,
            saved_pos: 0,
            silent_fails: 0,
            max_fail_pos: 0,
            max_fail_expected: Vec::new(),
            lines: LineCache::new(),
            cache: HashMap::new(),
            tracer: options.tracer,
            source: options.grammar_source,
        }
    }

    pub fn input(&self) -> &'a str {
        self.input
    }

    #[inline]
    pub fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    #[inline]
    pub fn match_any(&self) -> bool {
        self.pos < self.input.len()
    }

    #[inline]
    pub fn match_str(&self, literal: &str) -> bool {
        self.rest().starts_with(literal)
    }

    /// `lowered` must already be lowercase.
    #[inline]
    pub fn match_str_ic(&self, lowered: &str) -> bool {
        self.ic_len(lowered).is_some()
    }

    /// Byte length of the input prefix whose lowercase form is `lowered`.
    fn ic_len(&self, lowered: &str) -> Option<usize> {
        let rest = self.rest();
        let mut want = lowered;
        for (i, c) in rest.char_indices() {
            if want.is_empty() {
                return Some(i);
            }
            for l in c.to_lowercase() {
                want = want.strip_prefix(l)?;
            }
        }
        want.is_empty().then_some(rest.len())
    }

    #[inline]
    pub fn match_class(&self, class: &CharClass) -> bool {
        match self.rest().chars().next() {
            Some(c) => class.matches(c),
            None => false,
        }
    }

    /// Consumes `count` characters, returning them as a string value.
    pub fn accept_n(&mut self, count: usize) -> Value {
        let rest = self.rest();
        let len = rest
            .char_indices()
            .nth(count)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        self.pos += len;
        Value::Str(rest[..len].to_owned())
    }

    pub fn accept_str(&mut self, literal: &str) -> Value {
        self.pos += literal.len();
        Value::Str(literal.to_owned())
    }

    /// Consumes what [`ParseState::match_str_ic`] matched, in the case of the input.
    pub fn accept_str_ic(&mut self, lowered: &str) -> Value {
        let rest = self.rest();
        let len = self.ic_len(lowered).unwrap_or(0);
        self.pos += len;
        Value::Str(rest[..len].to_owned())
    }

    /// Records a failed expectation at the current position and returns the failure sentinel.
    pub fn fail(&mut self, expected: &Expectation) -> Value {
        if self.silent_fails == 0 {
            self.record_failure(self.pos, expected.clone());
        }
        Value::Failed
    }

    fn record_failure(&mut self, pos: usize, expected: Expectation) {
        if pos < self.max_fail_pos {
            return;
        }
        if pos > self.max_fail_pos {
            self.max_fail_pos = pos;
            self.max_fail_expected.clear();
        }
        self.max_fail_expected.push(expected);
    }

    pub fn max_fail_pos(&self) -> usize {
        self.max_fail_pos
    }

    pub fn max_fail_expected(&self) -> &[Expectation] {
        &self.max_fail_expected
    }

    /// The input between `start` and the current position.
    pub fn text(&self, start: usize) -> Value {
        Value::Str(self.input[start..self.pos].to_owned())
    }

    /// The text matched by the expression an action is attached to.
    pub fn saved_text(&self) -> &'a str {
        &self.input[self.saved_pos..self.pos]
    }

    pub fn location(&mut self, start: usize, end: usize) -> Location {
        let start = self.lines.position(self.input, start);
        let end = self.lines.position(self.input, end);
        Location {
            source: self.source.clone(),
            start,
            end,
        }
    }

    fn key(&self, rule: u32) -> CacheKey {
        CacheKey {
            pos: self.pos,
            rule,
            silent: self.silent_fails > 0,
        }
    }

    /// On a hit, moves to the recorded end position and returns the recorded result.
    pub fn cache_lookup(&mut self, rule: u32) -> Option<Value> {
        let entry = self.cache.get(&self.key(rule))?;
        self.pos = entry.next_pos;
        Some(entry.result.clone())
    }

    pub fn cache_store(&mut self, rule: u32, start: usize, result: &Value) {
        let key = CacheKey {
            pos: start,
            ..self.key(rule)
        };
        let entry = CacheEntry {
            next_pos: self.pos,
            result: result.clone(),
        };
        self.cache.insert(key, entry);
    }

    pub fn tracing(&self) -> bool {
        self.tracer.is_some()
    }

    pub fn trace_enter(&mut self, rule: &str, start: usize) {
        self.trace(TraceKind::Enter, rule, start, start, false);
    }

    /// Emits `rule.match` or `rule.fail` depending on `result`.
    pub fn trace_exit(&mut self, rule: &str, start: usize, result: &Value, cached: bool) {
        match result.is_failed() {
            true => self.trace(TraceKind::Fail, rule, start, start, cached),
            false => self.trace(TraceKind::Match, rule, start, self.pos, cached),
        }
    }

    fn trace(&mut self, kind: TraceKind, rule: &str, start: usize, end: usize, cached: bool) {
        if self.tracer.is_none() {
            return;
        }
        let location = self.location(start, end);
        if let Some(tracer) = self.tracer.as_mut() {
            tracer.trace(&TraceEvent {
                kind,
                rule,
                location,
                cached,
            });
        }
    }

    /// Turns the start rule's result into the final outcome of the parse.
    ///
    /// Succeeds only if the rule matched and consumed the whole input.
    pub fn finish(&mut self, result: Value) -> Result<Value, ParseError> {
        if !result.is_failed() && self.pos == self.input.len() {
            return Ok(result);
        }
        if !result.is_failed() {
            self.record_failure(self.pos, Expectation::End);
        }
        Err(self.error())
    }

    /// Builds the error describing the longest failure seen so far.
    pub fn error(&mut self) -> ParseError {
        let pos = self.max_fail_pos;
        let found = self.input[pos..].chars().next();
        let end = pos + found.map_or(0, char::len_utf8);
        let location = self.location(pos, end);
        ParseError::new(
            self.max_fail_expected.clone(),
            found.map(String::from),
            location,
        )
    }
}

#[test]
fn test_longest_failure() {
    let mut st = ParseState::new("abc", ParseOptions::default());
    st.fail(&Expectation::literal("x", false));
    st.pos = 2;
    st.fail(&Expectation::literal("y", false));
    st.fail(&Expectation::Any);
    st.pos = 1;
    st.fail(&Expectation::literal("z", false));

    assert_eq!(st.max_fail_pos(), 2);
    assert_eq!(st.max_fail_expected().len(), 2);

    let err = st.error();
    assert_eq!(err.location.start.offset, 2);
    assert_eq!(err.found.as_deref(), Some("c"));
    assert_eq!(err.message, r#"Expected "y" or any character but "c" found."#);
}

#[test]
fn test_silenced_failures() {
    let mut st = ParseState::new("abc", ParseOptions::default());
    st.silent_fails += 1;
    st.pos = 2;
    assert!(st.fail(&Expectation::Any).is_failed());
    st.silent_fails -= 1;
    assert_eq!(st.max_fail_pos(), 0);
    assert!(st.max_fail_expected().is_empty());
}

#[test]
fn test_case_insensitive_match() {
    let mut st = ParseState::new("SeLeCt *", ParseOptions::default());
    assert!(st.match_str_ic("select"));
    assert!(!st.match_str_ic("selects"));
    assert_eq!(st.accept_str_ic("select"), Value::Str("SeLeCt".to_owned()));
    assert_eq!(st.pos, 6);
}

#[test]
fn test_case_insensitive_match_changing_length() {
    // 'İ' lowercases to two chars, the Kelvin sign to a shorter encoding
    let lowered = "i\u{307}x".to_owned();
    let mut st = ParseState::new("İX!", ParseOptions::default());
    assert!(st.match_str_ic(&lowered));
    assert_eq!(st.accept_str_ic(&lowered), Value::Str("İX".to_owned()));
    assert_eq!(st.rest(), "!");

    let mut st = ParseState::new("\u{212A}m", ParseOptions::default());
    assert!(st.match_str_ic("km"));
    assert_eq!(st.accept_str_ic("km"), Value::Str("\u{212A}m".to_owned()));
    assert!(st.rest().is_empty());

    // a literal can't end in the middle of an input char's lowercase form
    let st = ParseState::new("İ", ParseOptions::default());
    assert!(!st.match_str_ic("i"));
}

#[test]
fn test_cache_respects_silencing() {
    let mut st = ParseState::new("abc", ParseOptions::default());
    st.pos = 2;
    st.cache_store(3, 0, &Value::Int(1));
    st.pos = 0;
    assert_eq!(st.cache_lookup(3), Some(Value::Int(1)));
    assert_eq!(st.pos, 2);

    st.pos = 0;
    st.silent_fails = 1;
    assert_eq!(st.cache_lookup(3), None);
}

#[test]
fn test_finish_requires_full_input() {
    let mut st = ParseState::new("ab", ParseOptions::default());
    st.pos = 1;
    let err = st.finish(Value::Null).unwrap_err();
    assert_eq!(err.location.start.offset, 1);
    assert_eq!(err.expected, vec![Expectation::End]);
    assert_eq!(err.message, r#"Expected end of input but "b" found."#);
}
