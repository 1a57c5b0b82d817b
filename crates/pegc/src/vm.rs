//! Interpreter for compiled bytecode, the parser handed out by `OutputKind::Parser`.
//!
//! Host code embedded in the grammar can't be evaluated here, so every action, predicate and
//! boundary function has to be bound to a Rust closure before parsing. Functions are looked up
//! by their code text with surrounding whitespace trimmed.

use std::{collections::HashMap, fmt::Display, rc::Rc};

use pegc_runtime::{Expectation, Location, ParseError, ParseOptions, ParseState, Value};

use crate::{
    backend::Compilation,
    bytecode::{instructions, Constants, FunctionKind, Instr, Test},
    error::InternalError,
};

/// What host code sees while it runs.
pub struct FunctionCx<'s, 'a> {
    st: &'s mut ParseState<'a>,
}

impl<'s, 'a> FunctionCx<'s, 'a> {
    /// Text matched by the expression the function is attached to.
    pub fn text(&self) -> &'a str {
        self.st.saved_text()
    }
    pub fn offset(&self) -> usize {
        self.st.saved_pos
    }
    pub fn range(&self) -> std::ops::Range<usize> {
        self.st.saved_pos..self.st.pos
    }
    pub fn location(&mut self) -> Location {
        let (start, end) = (self.st.saved_pos, self.st.pos);
        self.st.location(start, end)
    }
    pub fn input(&self) -> &'a str {
        self.st.input()
    }
}

pub type HostFn = Rc<dyn Fn(&mut FunctionCx<'_, '_>, &[Value]) -> Value>;

#[derive(Debug)]
pub enum RunError {
    Syntax(ParseError),
    /// No closure was bound for a function the grammar uses.
    Unbound { code: String },
    Internal(InternalError),
}

impl From<InternalError> for RunError {
    fn from(value: InternalError) -> Self {
        RunError::Internal(value)
    }
}

impl Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunError::Syntax(e) => write!(f, "{e}"),
            RunError::Unbound { code } => write!(f, "no function bound for `{code}`"),
            RunError::Internal(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for RunError {}

/// State of a parse that ran to completion, successful or not.
#[derive(Clone, PartialEq, Debug)]
pub struct Outcome {
    /// `Value::Failed` if the start rule didn't match.
    pub result: Value,
    pub pos: usize,
    pub max_fail_pos: usize,
    pub expected: Vec<Expectation>,
}

#[derive(Clone)]
struct RuleCode {
    name: String,
    code: Vec<u32>,
    max_sp: u32,
}

/// A grammar compiled to bytecode, ready to parse any number of inputs.
#[derive(Clone)]
pub struct Parser {
    /// Indexed by rule handle, removed rules are `None`.
    rules: Vec<Option<RuleCode>>,
    start_rules: Vec<u32>,
    constants: Constants,
    cache: bool,
    trace: bool,
    functions: HashMap<String, HostFn>,
}

impl std::fmt::Debug for Parser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parser")
            .field("start_rules", &self.start_rule_names().collect::<Vec<_>>())
            .field("functions", &self.constants.functions.len())
            .field("bound", &self.functions.len())
            .field("cache", &self.cache)
            .field("trace", &self.trace)
            .finish()
    }
}

impl Parser {
    pub fn new(c: &Compilation) -> Result<Parser, InternalError> {
        let mut rules = vec![None; c.grammar.rules.len()];
        for (handle, rule) in c.grammar.live_rules() {
            let bytecode = &c.bytecode[handle];
            rules[handle.as_u32() as usize] = Some(RuleCode {
                name: rule.name.clone(),
                code: bytecode.code.clone(),
                max_sp: bytecode.max_sp,
            });
        }
        if c.start_rules.is_empty() {
            return Err(InternalError::new("parser has no start rules"));
        }
        Ok(Parser {
            rules,
            start_rules: c.start_rules.iter().map(|r| r.as_u32()).collect(),
            constants: c.constants.clone(),
            cache: c.options.cache,
            trace: c.options.trace,
            functions: HashMap::new(),
        })
    }

    pub fn start_rule_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.start_rules
            .iter()
            .filter_map(|&r| self.rules[r as usize].as_ref())
            .map(|r| r.name.as_str())
    }

    /// Code of every function the grammar uses, in first use order.
    pub fn functions(&self) -> impl Iterator<Item = (FunctionKind, &str)> + '_ {
        self.constants
            .functions
            .iter()
            .map(|(_, f)| (f.kind, f.code.trim()))
    }

    /// Binds `f` to every function whose code is `code`.
    ///
    /// Actions return their value, predicates are satisfied by a truthy value and boundaries
    /// return a count as [`Value::Int`].
    pub fn bind(
        &mut self,
        code: &str,
        f: impl Fn(&mut FunctionCx<'_, '_>, &[Value]) -> Value + 'static,
    ) -> &mut Parser {
        self.functions.insert(code.trim().to_owned(), Rc::new(f));
        self
    }

    fn check_bound(&self) -> Result<(), RunError> {
        for (_, code) in self.functions() {
            if !self.functions.contains_key(code) {
                return Err(RunError::Unbound {
                    code: code.to_owned(),
                });
            }
        }
        Ok(())
    }

    fn start<'a>(
        &self,
        input: &'a str,
        options: ParseOptions,
    ) -> Result<(Value, ParseState<'a>), RunError> {
        self.check_bound()?;

        let rule = match &options.start_rule {
            None => self.start_rules[0],
            Some(name) => {
                let found = self.start_rules.iter().copied().find(|&r| {
                    self.rules[r as usize]
                        .as_ref()
                        .is_some_and(|rule| rule.name == *name)
                });
                match found {
                    Some(rule) => rule,
                    None => {
                        return Err(RunError::Syntax(ParseError::unknown_start_rule(
                            name,
                            options.grammar_source.clone(),
                        )))
                    }
                }
            }
        };

        let mut machine = Machine {
            parser: self,
            st: ParseState::new(input, options),
        };
        let result = machine.rule(rule)?;
        Ok((result, machine.st))
    }

    /// Parses `input`, requiring the start rule to match all of it.
    pub fn parse(&self, input: &str, options: ParseOptions) -> Result<Value, RunError> {
        let (result, mut st) = self.start(input, options)?;
        st.finish(result).map_err(RunError::Syntax)
    }

    /// Runs the start rule without interpreting the result.
    pub fn run(&self, input: &str, options: ParseOptions) -> Result<Outcome, RunError> {
        let (result, st) = self.start(input, options)?;
        Ok(Outcome {
            result,
            pos: st.pos,
            max_fail_pos: st.max_fail_pos(),
            expected: st.max_fail_expected().to_vec(),
        })
    }
}

enum Slot {
    Pos(usize),
    Value(Value),
}

type Stack = Vec<Slot>;

struct Machine<'p, 'a> {
    parser: &'p Parser,
    st: ParseState<'a>,
}

fn slot_at(stack: &Stack, distance: u32) -> Result<&Slot, InternalError> {
    let index = stack.len().checked_sub(1 + distance as usize);
    index
        .and_then(|i| stack.get(i))
        .ok_or_else(|| InternalError::new(format!("stack underflow reading slot {distance}")))
}

fn pos(stack: &Stack, distance: u32) -> Result<usize, InternalError> {
    match slot_at(stack, distance)? {
        Slot::Pos(p) => Ok(*p),
        Slot::Value(_) => Err(InternalError::new("expected a position on the stack")),
    }
}

fn value(stack: &Stack, distance: u32) -> Result<&Value, InternalError> {
    match slot_at(stack, distance)? {
        Slot::Value(v) => Ok(v),
        Slot::Pos(_) => Err(InternalError::new("expected a value on the stack")),
    }
}

fn value_mut(stack: &mut Stack, distance: u32) -> Result<&mut Value, InternalError> {
    let len = stack.len();
    let slot = len
        .checked_sub(1 + distance as usize)
        .and_then(|i| stack.get_mut(i));
    match slot {
        Some(Slot::Value(v)) => Ok(v),
        Some(Slot::Pos(_)) => Err(InternalError::new("expected a value on the stack")),
        None => Err(InternalError::new(format!(
            "stack underflow reading slot {distance}"
        ))),
    }
}

fn pop(stack: &mut Stack, count: u32) -> Result<(), InternalError> {
    let len = stack
        .len()
        .checked_sub(count as usize)
        .ok_or_else(|| InternalError::new(format!("stack underflow popping {count} slots")))?;
    stack.truncate(len);
    Ok(())
}

impl<'p, 'a> Machine<'p, 'a> {
    fn rule(&mut self, index: u32) -> Result<Value, RunError> {
        let parser = self.parser;
        let rule = parser
            .rules
            .get(index as usize)
            .and_then(Option::as_ref)
            .ok_or_else(|| InternalError::new(format!("call of removed or unknown rule {index}")))?;

        let start = self.st.pos;
        let tracing = parser.trace && self.st.tracing();
        if tracing {
            self.st.trace_enter(&rule.name, start);
        }
        if parser.cache {
            if let Some(cached) = self.st.cache_lookup(index) {
                if tracing {
                    self.st.trace_exit(&rule.name, start, &cached, true);
                }
                return Ok(cached);
            }
        }

        let mut stack = Stack::with_capacity(rule.max_sp as usize + 1);
        self.block(&rule.code, &mut stack)?;
        let result = match (stack.pop(), stack.is_empty()) {
            (Some(Slot::Value(v)), true) => v,
            _ => {
                return Err(InternalError::new(format!(
                    "rule \"{}\" didn't leave exactly one value on the stack",
                    rule.name
                ))
                .into())
            }
        };

        if parser.cache {
            self.st.cache_store(index, start, &result);
        }
        if tracing {
            self.st.trace_exit(&rule.name, start, &result, false);
        }
        Ok(result)
    }

    fn block(&mut self, code: &[u32], stack: &mut Stack) -> Result<(), RunError> {
        for instr in instructions(code) {
            self.instr(instr?, stack)?;
        }
        Ok(())
    }

    fn literal(&self, index: u32) -> Result<&'p str, InternalError> {
        let parser = self.parser;
        parser
            .constants
            .literals
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| InternalError::new(format!("unknown literal {index}")))
    }

    fn instr(&mut self, instr: Instr<'_>, stack: &mut Stack) -> Result<(), RunError> {
        let parser = self.parser;
        match instr {
            Instr::PushEmptyString => stack.push(Slot::Value(Value::Str(String::new()))),
            Instr::PushNull => stack.push(Slot::Value(Value::Null)),
            Instr::PushFailed => stack.push(Slot::Value(Value::Failed)),
            Instr::PushEmptyArray => stack.push(Slot::Value(Value::Array(Vec::new()))),
            Instr::PushCurrPos => stack.push(Slot::Pos(self.st.pos)),
            Instr::Pop => pop(stack, 1)?,
            Instr::PopCurrPos => {
                self.st.pos = pos(stack, 0)?;
                pop(stack, 1)?;
            }
            Instr::PopN(n) => pop(stack, n)?,
            Instr::Nip => {
                let top = stack
                    .pop()
                    .ok_or_else(|| InternalError::new("stack underflow in NIP"))?;
                pop(stack, 1)?;
                stack.push(top);
            }
            Instr::Append => {
                let item = std::mem::take(value_mut(stack, 0)?);
                pop(stack, 1)?;
                value_mut(stack, 0)?.push(item);
            }
            Instr::Wrap(n) => {
                let items = (0..n)
                    .rev()
                    .map(|d| value_mut(stack, d).map(std::mem::take))
                    .collect::<Result<Vec<_>, _>>()?;
                pop(stack, n)?;
                stack.push(Slot::Value(Value::Array(items)));
            }
            Instr::Text => {
                let start = pos(stack, 0)?;
                pop(stack, 1)?;
                stack.push(Slot::Value(self.st.text(start)));
            }
            Instr::Pluck { pop: count, picks } => {
                let mut picked = picks
                    .iter()
                    .map(|&d| value_mut(stack, d).map(std::mem::take))
                    .collect::<Result<Vec<_>, _>>()?;
                pop(stack, count)?;
                let value = match picked.len() {
                    1 => picked.remove(0),
                    _ => Value::Array(picked),
                };
                stack.push(Slot::Value(value));
            }
            Instr::Cond { test, then, els } => match self.test(test, stack)? {
                true => self.block(then, stack)?,
                false => self.block(els, stack)?,
            },
            Instr::WhileNotError(body) => {
                while !value(stack, 0)?.is_failed() {
                    self.block(body, stack)?;
                }
            }
            Instr::AcceptN(n) => {
                let text = self.st.accept_n(n as usize);
                stack.push(Slot::Value(text));
            }
            Instr::AcceptString(i) => {
                let literal = self.literal(i)?;
                let text = self.st.accept_str(literal);
                stack.push(Slot::Value(text));
            }
            Instr::AcceptStringIc(i) => {
                let lowered = self.literal(i)?;
                let text = self.st.accept_str_ic(lowered);
                stack.push(Slot::Value(text));
            }
            Instr::Fail(i) => {
                let expected = parser
                    .constants
                    .expectations
                    .get(i)
                    .ok_or_else(|| InternalError::new(format!("unknown expectation {i}")))?;
                let failed = self.st.fail(expected);
                stack.push(Slot::Value(failed));
            }
            Instr::LoadSavedPos(d) => self.st.saved_pos = pos(stack, d)?,
            Instr::UpdateSavedPos => self.st.saved_pos = self.st.pos,
            Instr::Call {
                function,
                pop: count,
                args,
            } => {
                let f = parser
                    .constants
                    .functions
                    .get(function)
                    .ok_or_else(|| InternalError::new(format!("unknown function {function}")))?;
                let code = f.code.trim();
                let host = parser.functions.get(code).ok_or_else(|| RunError::Unbound {
                    code: code.to_owned(),
                })?;
                let args = args
                    .iter()
                    .map(|&d| value(stack, d).cloned())
                    .collect::<Result<Vec<_>, _>>()?;

                let result = host(&mut FunctionCx { st: &mut self.st }, &args);
                let result = match f.kind {
                    FunctionKind::Predicate => Value::Bool(result.is_truthy()),
                    FunctionKind::Action | FunctionKind::Boundary => result,
                };
                pop(stack, count)?;
                stack.push(Slot::Value(result));
            }
            Instr::Rule(index) => {
                let result = self.rule(index)?;
                stack.push(Slot::Value(result));
            }
            Instr::SilentFailsOn => self.st.silent_fails += 1,
            Instr::SilentFailsOff => {
                self.st.silent_fails = self.st.silent_fails.saturating_sub(1);
            }
            Instr::SourceMapPush(_) | Instr::SourceMapPop => {}
        }
        Ok(())
    }

    fn test(&mut self, test: Test, stack: &Stack) -> Result<bool, RunError> {
        let parser = self.parser;
        let result = match test {
            Test::If => value(stack, 0)?.is_truthy(),
            Test::IfError => value(stack, 0)?.is_failed(),
            Test::IfNotError => !value(stack, 0)?.is_failed(),
            Test::IfLt(n) => value(stack, 0)?.len() < n as usize,
            Test::IfGe(n) => value(stack, 0)?.len() >= n as usize,
            Test::IfLtDynamic(d) => value(stack, 0)?.len() < value(stack, d)?.count_or(0),
            Test::IfGeDynamic(d) => {
                value(stack, 0)?.len() >= value(stack, d)?.count_or(usize::MAX)
            }
            Test::MatchAny => self.st.match_any(),
            Test::MatchString(i) => self.st.match_str(self.literal(i)?),
            Test::MatchStringIc(i) => self.st.match_str_ic(self.literal(i)?),
            Test::MatchCharClass(i) => {
                let class = parser
                    .constants
                    .classes
                    .get(i)
                    .ok_or_else(|| InternalError::new(format!("unknown class {i}")))?;
                self.st.match_class(class)
            }
        };
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use pegc_runtime::{ParseOptions, TraceEvent, TraceKind, Tracer, Value};

    use crate::{
        ast::{dsl::*, GrammarDef},
        backend::Passes,
        compile,
        options::CompileOptions,
        Output,
    };

    use super::{Parser, RunError};

    fn parser(def: GrammarDef, options: CompileOptions) -> Parser {
        let compiled = compile(def.build().unwrap(), &Passes::default(), options).unwrap();
        match compiled.output {
            Output::Parser(parser) => parser,
            _ => panic!("expected a parser"),
        }
    }

    fn parse(parser: &Parser, input: &str) -> Result<Value, RunError> {
        parser.parse(input, ParseOptions::default())
    }

    fn s(text: &str) -> Value {
        Value::Str(text.to_owned())
    }

    #[test]
    fn test_sequence_and_failure() {
        let p = parser(
            GrammarDef::new().rule("Start", seq([lit("a"), lit("b")])),
            CompileOptions::default(),
        );
        assert_eq!(parse(&p, "ab").unwrap(), Value::Array(vec![s("a"), s("b")]));

        let Err(RunError::Syntax(err)) = parse(&p, "ax") else {
            panic!("expected a syntax error");
        };
        assert_eq!(err.location.start.offset, 1);
        assert_eq!(err.message, r#"Expected "b" but "x" found."#);
    }

    #[test]
    fn test_repetition_and_text() {
        let p = parser(
            GrammarDef::new().rule(
                "Start",
                text(seq([plus(class(&[('0', '9')])), opt(lit("."))])),
            ),
            CompileOptions::default(),
        );
        assert_eq!(parse(&p, "123.").unwrap(), s("123."));
        assert_eq!(parse(&p, "7").unwrap(), s("7"));
        assert!(parse(&p, "").is_err());
    }

    #[test]
    fn test_bound_actions() {
        let mut p = parser(
            GrammarDef::new()
                .rule(
                    "Sum",
                    action(
                        seq([label("a", rule_ref("Num")), lit("+"), label("b", rule_ref("Num"))]),
                        "a + b",
                    ),
                )
                .rule("Num", action(plus(class(&[('0', '9')])), "text().parse()")),
            CompileOptions::default(),
        );
        assert!(matches!(parse(&p, "1+2"), Err(RunError::Unbound { .. })));

        p.bind("a + b", |_, args| {
            Value::Int(args[0].as_int().unwrap() + args[1].as_int().unwrap())
        })
        .bind("text().parse()", |cx, _| Value::Int(cx.text().parse().unwrap()));
        assert_eq!(parse(&p, "12+30").unwrap(), Value::Int(42));
    }

    #[test]
    fn test_semantic_predicate_sees_labels() {
        let mut p = parser(
            GrammarDef::new().rule(
                "Start",
                seq([label("x", any()), sem_and("x == \"y\"")]),
            ),
            CompileOptions::default(),
        );
        p.bind("x == \"y\"", |_, args| Value::Bool(args[0] == Value::Str("y".into())));
        assert!(parse(&p, "y").is_ok());
        assert!(parse(&p, "n").is_err());
    }

    #[test]
    fn test_action_after_inner_labels() {
        let mut p = parser(
            GrammarDef::new()
                .rule("Start", choice([rule_ref("Inner"), rule_ref("Named")]))
                .rule("Inner", action(seq([lit("a"), seq([label("x", lit("b"))])]), "x"))
                .rule("Named", action(named("pair", seq([label("x", lit("c")), lit("d")])), "x")),
            CompileOptions::default(),
        );
        p.bind("x", |_, args| Value::Int(args.len() as i64));
        assert_eq!(parse(&p, "ab").unwrap(), Value::Int(0));
        assert_eq!(parse(&p, "cd").unwrap(), Value::Int(0));
    }

    #[test]
    fn test_ignore_case_keeps_input_text() {
        let p = parser(
            GrammarDef::new().rule("Start", seq([lit_ic("İf"), lit("!")])),
            CompileOptions::default(),
        );
        assert_eq!(
            parse(&p, "İF!").unwrap(),
            Value::Array(vec![s("İF"), s("!")])
        );
        assert!(parse(&p, "if!").is_err());
    }

    #[test]
    fn test_named_rule_replaces_expectations() {
        let p = parser(
            GrammarDef::new()
                .rule("Start", seq([lit("("), rule_ref("Digit")]))
                .aliased_rule("Digit", "digit", class(&[('0', '9')])),
            CompileOptions::default(),
        );
        let Err(RunError::Syntax(err)) = parse(&p, "(x") else {
            panic!("expected a syntax error");
        };
        assert_eq!(err.message, r#"Expected digit but "x" found."#);
    }

    #[test]
    fn test_unknown_start_rule() {
        let p = parser(
            GrammarDef::new().rule("A", lit("a")).rule("B", lit("b")),
            CompileOptions::default().with_start_rules(&["A", "B"]),
        );
        let options = ParseOptions {
            start_rule: Some("B".to_owned()),
            ..Default::default()
        };
        assert_eq!(p.parse("b", options).unwrap(), s("b"));

        let options = ParseOptions {
            start_rule: Some("C".to_owned()),
            ..Default::default()
        };
        let Err(RunError::Syntax(err)) = p.parse("c", options) else {
            panic!("expected a syntax error");
        };
        assert_eq!(err.message, "Can't start parsing from rule \"C\".");
    }

    struct Recorder(std::rc::Rc<std::cell::RefCell<Vec<(TraceKind, String, bool)>>>);

    impl Tracer for Recorder {
        fn trace(&mut self, event: &TraceEvent<'_>) {
            self.0
                .borrow_mut()
                .push((event.kind, event.rule.to_owned(), event.cached));
        }
    }

    #[test]
    fn test_trace_with_cache() {
        let p = parser(
            GrammarDef::new()
                .rule("Start", choice([seq([rule_ref("A"), lit("x")]), seq([rule_ref("A"), lit("y")])]))
                .rule("A", lit("a")),
            CompileOptions::default().with_cache(true).with_trace(true),
        );
        let events = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let options = ParseOptions {
            tracer: Some(Box::new(Recorder(events.clone()))),
            ..Default::default()
        };
        assert!(p.parse("ay", options).is_ok());

        let events = events.borrow();
        let a_matches = events
            .iter()
            .filter(|(kind, rule, _)| *kind == TraceKind::Match && rule == "A")
            .map(|(_, _, cached)| *cached)
            .collect::<Vec<_>>();
        assert_eq!(a_matches, vec![false, true]);
        assert_eq!(events.first().map(|e| e.0), Some(TraceKind::Enter));
        assert_eq!(events.last().map(|e| e.0), Some(TraceKind::Match));
    }
}
