//! Rust source generation from compiled bytecode.

pub mod render;
pub mod sourcemap;
mod structure;

use std::fmt::Write;

use pegc_runtime::{CharClass, ClassPart, Expectation};

use crate::{
    backend::Compilation,
    bytecode::{FunctionConst, FunctionKind},
    error::{InternalError, Session},
    options::OutputKind,
};

use render::CodeWriter;
use sourcemap::SourceMap;
use structure::RuleBody;

#[derive(Clone, Debug)]
pub struct GeneratedCode {
    pub source: String,
    /// Present when source maps were requested.
    pub map: Option<SourceMap>,
}

fn class_expr(class: &CharClass) -> String {
    let mut parts = String::new();
    for (i, part) in class.parts.iter().enumerate() {
        if i > 0 {
            parts.push_str(", ");
        }
        _ = match part {
            ClassPart::Char(c) => write!(parts, "ClassPart::Char({c:?})"),
            ClassPart::Range(lo, hi) => write!(parts, "ClassPart::Range({lo:?}, {hi:?})"),
        };
    }
    format!(
        "CharClass {{ parts: Cow::Borrowed(&[{parts}]), inverted: {}, ignore_case: {} }}",
        class.inverted, class.ignore_case
    )
}

fn expectation_expr(expected: &Expectation) -> String {
    match expected {
        Expectation::Literal { text, ignore_case } => format!(
            "Expectation::Literal {{ text: Cow::Borrowed({:?}), ignore_case: {ignore_case} }}",
            text.as_ref()
        ),
        Expectation::Class(class) => format!("Expectation::Class({})", class_expr(class)),
        Expectation::Any => "Expectation::Any".to_owned(),
        Expectation::End => "Expectation::End".to_owned(),
        Expectation::Other { description } => format!(
            "Expectation::Other {{ description: Cow::Borrowed({:?}) }}",
            description.as_ref()
        ),
    }
}

fn constants(c: &Compilation, w: &mut CodeWriter) {
    let constants = &c.constants;
    for (i, literal) in constants.literals.iter() {
        w.line(format!("const L{i}: &str = {literal:?};"));
    }
    for (i, class) in constants.classes.iter() {
        w.line(format!("const C{i}: CharClass = {};", class_expr(class)));
    }
    for (i, expected) in constants.expectations.iter() {
        w.line(format!("const E{i}: Expectation = {};", expectation_expr(expected)));
    }
}

fn function(i: u32, f: &FunctionConst, w: &mut CodeWriter) {
    let params = f
        .params
        .iter()
        .map(|p| format!(", {p}: Value"))
        .collect::<String>();
    match f.kind {
        FunctionKind::Action => {
            w.open(format!("fn f{i}(&mut self{params}) -> Value {{"));
            w.open("Value::from({");
            w.code(&f.code, f.span);
            w.close("})");
        }
        FunctionKind::Predicate => {
            w.open(format!("fn f{i}(&mut self{params}) -> bool {{"));
            w.code(&f.code, f.span);
        }
        FunctionKind::Boundary => {
            w.open(format!("fn f{i}(&mut self{params}) -> usize {{"));
            w.code(&f.code, f.span);
        }
    }
    w.close("}");
}

fn helpers(w: &mut CodeWriter) {
    w.line("/// Text matched by the expression the running action is attached to.");
    w.open("fn text(&self) -> &'a str {");
    w.line("self.st.saved_text()");
    w.close("}");
    w.open("fn offset(&self) -> usize {");
    w.line("self.st.saved_pos");
    w.close("}");
    w.open("fn range(&self) -> std::ops::Range<usize> {");
    w.line("self.st.saved_pos..self.st.pos");
    w.close("}");
    w.open("fn location(&mut self) -> Location {");
    w.line("let (start, end) = (self.st.saved_pos, self.st.pos);");
    w.line("self.st.location(start, end)");
    w.close("}");
}

fn rule(c: &Compilation, handle: crate::ast::RuleHandle, w: &mut CodeWriter) -> Result<(), InternalError> {
    let rule = &c.grammar.rules[handle];
    let bytecode = &c.bytecode[handle];
    let (index, name) = (handle.as_u32(), &rule.name);

    w.push_origin(rule.span);
    w.open(format!("fn parse_{name}(&mut self) -> Value {{"));
    w.line("let start = self.st.pos;");
    if c.options.trace {
        w.open("if self.st.tracing() {");
        w.line(format!("self.st.trace_enter({name:?}, start);"));
        w.close("}");
    }
    if c.options.cache {
        w.open(format!("if let Some(cached) = self.st.cache_lookup({index}) {{"));
        if c.options.trace {
            w.open("if self.st.tracing() {");
            w.line(format!("self.st.trace_exit({name:?}, start, &cached, true);"));
            w.close("}");
        }
        w.line("return cached;");
        w.close("}");
    }

    let mut body = w.nested();
    let mut sim = RuleBody::new(c, name, bytecode.max_sp);
    sim.render(&bytecode.code, &mut body)?;
    sim.declarations(w);
    w.append(body);

    if c.options.cache {
        w.line(format!("self.st.cache_store({index}, start, &s0);"));
    }
    if c.options.trace {
        w.open("if self.st.tracing() {");
        w.line(format!("self.st.trace_exit({name:?}, start, &s0, false);"));
        w.close("}");
    }
    w.line("s0");
    w.close("}");
    w.pop_origin();

    log::trace!("rule {name} rendered from {} words", bytecode.code.len());
    Ok(())
}

fn entry_point(c: &Compilation, w: &mut CodeWriter) -> Result<(), InternalError> {
    let names = c
        .start_rules
        .iter()
        .map(|&r| c.rule_name(r))
        .collect::<Vec<_>>();
    let Some(default) = names.first() else {
        return Err(InternalError::new("no start rules to generate an entry point for"));
    };

    w.line("/// Rules `parse` can start from, the first one is used unless another is requested.");
    let quoted = names.iter().map(|n| format!("{n:?}")).collect::<Vec<_>>();
    w.line(format!("pub const START_RULES: &[&str] = &[{}];", quoted.join(", ")));
    w.blank();
    w.open("pub fn parse(input: &str, options: ParseOptions) -> Result<Value, ParseError> {");
    w.line(format!(
        "let start_rule = options.start_rule.clone().unwrap_or_else(|| {default:?}.to_owned());"
    ));
    w.line("let source = options.grammar_source.clone();");
    w.line("let mut parser = Parser { st: ParseState::new(input, options) };");
    w.open("let result = match start_rule.as_str() {");
    for name in &names {
        w.line(format!("{name:?} => parser.parse_{name}(),"));
    }
    w.line("_ => return Err(ParseError::unknown_start_rule(&start_rule, source)),");
    w.close("};");
    w.line("parser.st.finish(result)");
    w.close("}");
    Ok(())
}

/// Renders the whole parser module.
pub fn generate_rust(c: &mut Compilation, _: &Session) -> Result<(), InternalError> {
    let mut w = CodeWriter::new();
    let runtime = &c.options.runtime_path;

    w.line("// Generated by pegc, edits will be lost.");
    w.blank();
    w.line("#[allow(unused_imports)]");
    w.line("use std::borrow::Cow;");
    w.line("#[allow(unused_imports)]");
    w.line(format!(
        "use {runtime}::{{CharClass, ClassPart, Expectation, Location, ParseError, ParseOptions, ParseState, Value}};"
    ));
    w.blank();

    if let Some(code) = &c.grammar.top_level_initializer {
        w.code(code, code.span);
        w.blank();
    }

    constants(c, &mut w);
    if !c.constants.literals.is_empty()
        || !c.constants.classes.is_empty()
        || !c.constants.expectations.is_empty()
    {
        w.blank();
    }

    entry_point(c, &mut w)?;
    w.blank();

    w.line("struct Parser<'a> {");
    w.line("    st: ParseState<'a>,");
    w.line("}");
    w.blank();
    w.line("#[allow(non_snake_case, dead_code, unused_mut, unused_variables, unused_assignments, unused_braces, clippy::all)]");
    w.open("impl<'a> Parser<'a> {");
    helpers(&mut w);
    if let Some(code) = &c.grammar.initializer {
        w.code(code, code.span);
    }
    for (i, f) in c.constants.functions.iter() {
        function(i, f, &mut w);
    }
    for (handle, _) in c.grammar.live_rules() {
        rule(c, handle, &mut w)?;
    }
    w.close("}");

    let lines = w.len();
    let (source, map) = w.finish();
    log::debug!("generated {lines} lines of Rust");
    c.code = Some(GeneratedCode {
        source,
        map: (c.options.output == OutputKind::SourceAndMap).then_some(map),
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{
        ast::{dsl::*, GrammarDef},
        backend::Passes,
        bytecode::Opcode,
        compile,
        error::CompileError,
        options::{CompileOptions, OutputKind},
        span::Span,
        Output,
    };

    fn source(def: GrammarDef, options: CompileOptions) -> String {
        let compiled = compile(
            def.build().unwrap(),
            &Passes::default(),
            options.with_output(OutputKind::Source),
        )
        .unwrap();
        match compiled.output {
            Output::Source(source) => source,
            _ => panic!("expected source output"),
        }
    }

    #[test]
    fn test_rule_functions() {
        let code = source(
            GrammarDef::new()
                .rule("Start", seq([lit("a"), rule_ref("B")]))
                .rule("B", action(label("x", class(&[('0', '9')])), "x")),
            CompileOptions::default(),
        );
        assert!(code.contains("fn parse_Start(&mut self) -> Value {"));
        assert!(code.contains("fn parse_B(&mut self) -> Value {"));
        assert!(code.contains("fn f0(&mut self, x: Value) -> Value {"));
        assert!(code.contains("const L0: &str = \"a\";"));
        assert!(code.contains("\"Start\" => parser.parse_Start(),"));
        assert!(!code.contains("\"B\" => parser.parse_B(),"));
        assert!(!code.contains("cache_lookup"));
    }

    #[test]
    fn test_cache_and_trace() {
        let code = source(
            GrammarDef::new().rule("Start", lit("a")),
            CompileOptions::default().with_cache(true).with_trace(true),
        );
        assert!(code.contains("if let Some(cached) = self.st.cache_lookup(0) {"));
        assert!(code.contains("self.st.trace_enter(\"Start\", start);"));
        assert!(code.contains("self.st.cache_store(0, start, &s0);"));
    }

    #[test]
    fn test_generation_is_deterministic() {
        let def = || {
            GrammarDef::new()
                .rule("A", seq([star(rule_ref("B")), lit_ic("end"), sem_not("false")]))
                .rule("B", choice([lit("b"), class_with(&[('x', 'z')], true, false)]))
        };
        let options = CompileOptions::default().with_start_rules(&["*"]);
        assert_eq!(source(def(), options.clone()), source(def(), options));
    }

    #[test]
    fn test_source_map() {
        let def = GrammarDef::new().rule("Start", at(lit("a"), Span::new(8, 11)));
        let compiled = compile(
            def.build().unwrap(),
            &Passes::default(),
            CompileOptions::default().with_output(OutputKind::SourceAndMap),
        )
        .unwrap();
        let Output::SourceAndMap { code, map } = compiled.output else {
            panic!("expected source and map");
        };
        let mapping = map
            .mappings
            .iter()
            .find(|m| m.original == Span::new(8, 11))
            .unwrap();
        let line = code.lines().nth(mapping.generated.start as usize).unwrap();
        assert!(line.contains("match_str(L0)"), "{line}");
    }

    fn corrupt(code: Vec<u32>) -> CompileError {
        let mut passes = Passes::default();
        passes.generate.insert(
            1,
            crate::backend::Pass::new("corrupt", |c, _| {
                let (handle, _) = c.grammar.live_rules().next().unwrap();
                c.bytecode[handle].code = CORRUPT.with(|code| code.borrow().clone());
                Ok(())
            }),
        );
        CORRUPT.with(|slot| *slot.borrow_mut() = code);
        let def = GrammarDef::new().rule("Start", lit("a"));
        compile(def.build().unwrap(), &passes, CompileOptions::default()).unwrap_err()
    }

    thread_local! {
        static CORRUPT: std::cell::RefCell<Vec<u32>> = const { std::cell::RefCell::new(Vec::new()) };
    }

    #[test]
    fn test_stack_disagreement_is_internal() {
        let op = |o: Opcode| o as u32;
        // two values left behind
        let err = corrupt(vec![op(Opcode::PushNull), op(Opcode::PushNull)]);
        assert!(matches!(err, CompileError::Internal(_)), "{err}");

        // branches leaving different stacks
        let err = corrupt(vec![
            op(Opcode::PushNull),
            op(Opcode::IfError),
            1,
            0,
            op(Opcode::PushNull),
        ]);
        assert!(matches!(err, CompileError::Internal(_)), "{err}");

        // a position slot used as a value
        let err = corrupt(vec![op(Opcode::PushCurrPos), op(Opcode::IfNotError), 0, 0]);
        assert!(matches!(err, CompileError::Internal(_)), "{err}");

        // truncated block
        let err = corrupt(vec![op(Opcode::MatchAny), 5, 0]);
        assert!(matches!(err, CompileError::Internal(_)), "{err}");
    }
}
