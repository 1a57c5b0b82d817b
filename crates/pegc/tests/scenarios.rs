use pegc::{
    ast::{dsl::*, GrammarDef},
    backend::{inference::MatchResult, Passes},
    bytecode,
    compile,
    error::{CompileError, Severity},
    options::{CompileOptions, OutputKind},
    runtime::{ParseOptions, Value},
    vm::RunError,
    Compiled, Output,
};

fn compile_def(def: GrammarDef, options: CompileOptions) -> Result<Compiled, CompileError> {
    compile(def.build().unwrap(), &Passes::default(), options)
}

fn grammar_error(def: GrammarDef) -> String {
    match compile_def(def, CompileOptions::default()) {
        Err(CompileError::Grammar { first, .. }) => first.message,
        other => panic!("expected a grammar error, got {other:?}"),
    }
}

#[test]
fn test_parse_sequence() {
    let compiled = compile_def(
        GrammarDef::new().rule("start", seq([lit("a"), lit("b")])),
        CompileOptions::default(),
    )
    .unwrap();
    let Output::Parser(parser) = compiled.output else {
        panic!("expected a parser");
    };

    let value = parser.parse("ab", ParseOptions::default()).unwrap();
    assert_eq!(
        value,
        Value::Array(vec![Value::Str("a".into()), Value::Str("b".into())])
    );

    let Err(RunError::Syntax(err)) = parser.parse("ax", ParseOptions::default()) else {
        panic!("expected a syntax error");
    };
    assert_eq!(err.location.start.offset, 1);
    assert_eq!(err.expected.len(), 1);
    assert_eq!(err.expected[0].describe(), "\"b\"");
}

#[test]
fn test_left_recursion_is_rejected() {
    let message = grammar_error(
        GrammarDef::new()
            .rule(
                "Sum",
                choice([seq([rule_ref("Sum"), lit("+"), rule_ref("Num")]), rule_ref("Num")]),
            )
            .rule("Num", plus(class(&[('0', '9')]))),
    );
    assert_eq!(
        message,
        "Possible infinite loop when parsing (left recursion: Sum -> Sum)"
    );
}

#[test]
fn test_empty_repetition_is_rejected() {
    let message = grammar_error(GrammarDef::new().rule("start", star(lit(""))));
    assert!(message.starts_with("Possible infinite loop when parsing"), "{message}");
}

#[test]
fn test_undefined_rule_is_rejected() {
    let message = grammar_error(GrammarDef::new().rule("start", rule_ref("nope")));
    assert_eq!(message, "Rule \"nope\" is not defined");
}

#[test]
fn test_errors_are_all_reported() {
    let err = compile_def(
        GrammarDef::new()
            .rule("start", seq([rule_ref("a"), rule_ref("b")]))
            .rule("start", lit("x")),
        CompileOptions::default(),
    )
    .unwrap_err();
    let CompileError::Grammar { diagnostics, .. } = &err else {
        panic!("expected a grammar error");
    };
    let errors = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .count();
    assert_eq!(errors, 3);
    assert!(err.to_string().ends_with("(and 2 more errors)"), "{err}");
}

#[test]
fn test_warnings_survive_compilation() {
    let compiled = compile_def(
        GrammarDef::new()
            .rule("start", seq([rule_ref("proxy"), repeated(opt(lit("a")), None, count(2), None)]))
            .rule("proxy", rule_ref("target"))
            .rule("target", lit("t"))
            .rule("unused", lit("u")),
        CompileOptions::default(),
    )
    .unwrap();

    let messages = compiled
        .diagnostics
        .iter()
        .map(|d| (d.severity, d.message.as_str()))
        .collect::<Vec<_>>();
    assert!(messages.contains(&(Severity::Warning, "Rule \"unused\" is not referenced")));
    assert!(messages.contains(&(
        Severity::Warning,
        "An expression may not consume any input and may always match 2 times"
    )));
    assert!(messages.contains(&(
        Severity::Info,
        "Proxy rule \"proxy\" replaced by the rule \"target\""
    )));
}

#[test]
fn test_ast_output() {
    let compiled = compile_def(
        GrammarDef::new()
            .rule("start", seq([opt(lit("a")), rule_ref("never")]))
            .rule("never", not(lit(""))),
        CompileOptions::default().with_output(OutputKind::Ast),
    )
    .unwrap();
    let Output::Ast(c) = compiled.output else {
        panic!("expected the compilation");
    };

    let start = c.grammar.rule_by_name("start").unwrap();
    let never = c.grammar.rule_by_name("never").unwrap();
    assert_eq!(c.start_rules, vec![start]);
    assert_eq!(c.rule_matches[never], Some(MatchResult::Never));
    assert_eq!(c.rule_matches[start], Some(MatchResult::Never));
    assert!(c.code.is_some());

    let listing = bytecode::display(&c).unwrap();
    assert!(listing.contains("start (rule 0"), "{listing}");
    assert!(listing.contains("RULE 1"), "{listing}");
}

#[test]
fn test_source_output() {
    let compiled = compile_def(
        GrammarDef::new()
            .top_level_initializer("use std::collections::HashMap;")
            .initializer("fn depth(&self) -> usize { 0 }")
            .rule("start", action(label("n", plus(class(&[('0', '9')]))), "self.text().len()")),
        CompileOptions::default().with_output(OutputKind::Source),
    )
    .unwrap();
    let Output::Source(code) = compiled.output else {
        panic!("expected source");
    };

    assert!(code.contains("use pegc_runtime::{"));
    assert!(code.contains("use std::collections::HashMap;"));
    assert!(code.contains("fn depth(&self) -> usize { 0 }"));
    assert!(code.contains("pub const START_RULES: &[&str] = &[\"start\"];"));
    assert!(code.contains("fn f0(&mut self, n: Value) -> Value {"));
    assert!(code.contains("self.text().len()"));
    assert!(code.contains("pub fn parse(input: &str, options: ParseOptions) -> Result<Value, ParseError> {"));
}

#[test]
fn test_grammar_from_json() {
    let def: GrammarDef = serde_json::from_str(
        r#"{
            "rules": [{
                "name": "greeting",
                "expression": {
                    "type": "sequence",
                    "elements": [
                        { "type": "literal", "value": "hello", "ignoreCase": true },
                        { "type": "optional", "expression": { "type": "literal", "value": "!" } }
                    ]
                }
            }]
        }"#,
    )
    .unwrap();
    let compiled = compile_def(def, CompileOptions::default()).unwrap();
    let Output::Parser(parser) = compiled.output else {
        panic!("expected a parser");
    };
    let value = parser.parse("HeLLo!", ParseOptions::default()).unwrap();
    assert_eq!(
        value,
        Value::Array(vec![Value::Str("HeLLo".into()), Value::Str("!".into())])
    );
}
