use pegc::{
    ast::{dsl::*, GrammarDef},
    backend::{inference::MatchResult, Passes},
    compile,
    options::{CompileOptions, OutputKind},
    runtime::{ParseOptions, Value},
    vm::{Parser, RunError},
    Output,
};
use proptest::prelude::*;

fn parser(def: GrammarDef, options: CompileOptions) -> Parser {
    let compiled = compile(def.build().unwrap(), &Passes::default(), options).unwrap();
    match compiled.output {
        Output::Parser(parser) => parser,
        _ => panic!("expected a parser"),
    }
}

/// Parse result with errors reduced to what a user sees.
fn outcome(parser: &Parser, input: &str) -> Result<Value, (String, usize)> {
    match parser.parse(input, ParseOptions::default()) {
        Ok(value) => Ok(value),
        Err(RunError::Syntax(err)) => Err((err.message, err.location.start.offset)),
        Err(other) => panic!("{other}"),
    }
}

fn lists() -> GrammarDef {
    GrammarDef::new()
        .rule(
            "Start",
            choice([
                seq([rule_ref("List"), opt(lit("!"))]),
                text(plus(lit("c"))),
            ]),
        )
        .rule(
            "List",
            repeated(rule_ref("Item"), Some(count(1)), unbounded(), Some(lit(","))),
        )
        .rule(
            "Item",
            choice([
                seq([lit("a"), lit("b")]),
                seq([lit("a"), not(lit("c"))]),
                plus(class(&[('b', 'c')])),
            ]),
        )
}

fn chained(proxies: bool) -> GrammarDef {
    let def = match proxies {
        true => GrammarDef::new()
            .rule("Start", seq([rule_ref("P"), opt(rule_ref("Q"))]))
            .rule("P", rule_ref("Q"))
            .rule("Q", rule_ref("Body")),
        false => GrammarDef::new().rule("Start", seq([rule_ref("Body"), opt(rule_ref("Body"))])),
    };
    def.rule(
        "Body",
        choice([plus(lit("a")), seq([lit("b"), and(lit("c"))]), lit("c")]),
    )
}

fn inferable() -> GrammarDef {
    GrammarDef::new()
        .rule("Opt", opt(lit("a")))
        .rule("Never", not(lit("")))
        .rule("Some", lit("a"))
        .rule("Seq", seq([rule_ref("Opt"), rule_ref("Never")]))
        .rule("Star", star(class(&[('a', 'b')])))
        .rule("Rep", repeated(opt(lit("a")), None, count(3), None))
        .rule("Alt", choice([rule_ref("Some"), rule_ref("Star")]))
        .rule("Ahead", and(rule_ref("Some")))
}

proptest! {
    #[test]
    fn memoization_does_not_change_results(input in "[abc,!]{0,12}") {
        let plain = parser(lists(), CompileOptions::default());
        let cached = parser(lists(), CompileOptions::default().with_cache(true));
        prop_assert_eq!(outcome(&plain, &input), outcome(&cached, &input));

        let plain = plain.run(&input, ParseOptions::default()).unwrap();
        let cached = cached.run(&input, ParseOptions::default()).unwrap();
        prop_assert_eq!(plain.result, cached.result);
        prop_assert_eq!(plain.pos, cached.pos);
        prop_assert_eq!(plain.max_fail_pos, cached.max_fail_pos);
    }

    #[test]
    fn proxy_removal_preserves_language(input in "[abc]{0,8}") {
        let with = parser(chained(true), CompileOptions::default());
        let without = parser(chained(false), CompileOptions::default());
        prop_assert_eq!(outcome(&with, &input), outcome(&without, &input));
    }

    #[test]
    fn inferred_results_hold(input in "[ab]{0,6}") {
        let compiled = compile(
            inferable().build().unwrap(),
            &Passes::default(),
            CompileOptions::default()
                .with_start_rules(&["*"])
                .with_output(OutputKind::Ast),
        )
        .unwrap();
        let Output::Ast(c) = compiled.output else {
            panic!("expected the compilation");
        };
        let parser = Parser::new(&c).unwrap();

        for (handle, rule) in c.grammar.live_rules() {
            let options = ParseOptions {
                start_rule: Some(rule.name.clone()),
                ..Default::default()
            };
            let failed = parser.run(&input, options).unwrap().result.is_failed();
            match c.rule_matches[handle] {
                Some(MatchResult::Always) => prop_assert!(!failed, "{} failed", rule.name),
                Some(MatchResult::Never) => prop_assert!(failed, "{} matched", rule.name),
                _ => {}
            }
        }
    }
}

#[test]
fn test_inferred_classification() {
    let compiled = compile(
        inferable().build().unwrap(),
        &Passes::default(),
        CompileOptions::default()
            .with_start_rules(&["*"])
            .with_output(OutputKind::Ast),
    )
    .unwrap();
    let Output::Ast(c) = compiled.output else {
        panic!("expected the compilation");
    };
    let result = |name: &str| c.rule_matches[c.grammar.rule_by_name(name).unwrap()];

    assert_eq!(result("Opt"), Some(MatchResult::Always));
    assert_eq!(result("Never"), Some(MatchResult::Never));
    assert_eq!(result("Some"), Some(MatchResult::Sometimes));
    assert_eq!(result("Seq"), Some(MatchResult::Never));
    assert_eq!(result("Star"), Some(MatchResult::Always));
    assert_eq!(result("Rep"), Some(MatchResult::Always));
    assert_eq!(result("Alt"), Some(MatchResult::Always));
    assert_eq!(result("Ahead"), Some(MatchResult::Sometimes));
}

#[test]
fn test_output_is_deterministic() {
    let options = CompileOptions::default()
        .with_cache(true)
        .with_trace(true)
        .with_output(OutputKind::Source);
    let source = || match compile(lists().build().unwrap(), &Passes::default(), options.clone())
        .unwrap()
        .output
    {
        Output::Source(code) => code,
        _ => panic!("expected source"),
    };
    assert_eq!(source(), source());
}
