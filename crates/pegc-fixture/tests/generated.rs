use pegc_fixture::{pair, pair_cached, sum, sum_cached};
use pegc_runtime::{ParseOptions, Value};

fn s(text: &str) -> Value {
    Value::Str(text.to_owned())
}

#[test]
fn test_pair() {
    assert_eq!(pair::START_RULES, &["Start"]);
    assert_eq!(
        pair::parse("ab", ParseOptions::default()).unwrap(),
        Value::Array(vec![s("a"), s("b")])
    );

    let err = pair::parse("ax", ParseOptions::default()).unwrap_err();
    assert_eq!(err.message, r#"Expected "b" but "x" found."#);
    assert_eq!(err.location.start.offset, 1);

    let err = pair::parse("a", ParseOptions::default()).unwrap_err();
    assert_eq!(err.message, r#"Expected "b" but end of input found."#);

    let err = pair::parse("abc", ParseOptions::default()).unwrap_err();
    assert_eq!(err.message, r#"Expected end of input but "c" found."#);
    assert_eq!(err.location.start.offset, 2);
}

#[test]
fn test_unknown_start_rule() {
    let options = ParseOptions {
        start_rule: Some("Sum".to_owned()),
        ..ParseOptions::default()
    };
    let err = sum::parse("1", options).unwrap_err();
    assert_eq!(err.message, r#"Can't start parsing from rule "Sum"."#);
}

#[test]
fn test_actions_and_labels() {
    let parse = |input: &str| sum::parse(input, ParseOptions::default());
    assert_eq!(parse("12").unwrap(), Value::Int(12));
    assert_eq!(parse("1 + 2+30").unwrap(), Value::Int(33));
    assert_eq!(parse("NeG 4 + 1").unwrap(), Value::Int(-5));

    let err = parse("1 +").unwrap_err();
    assert_eq!(err.location.start.offset, 3);
    assert_eq!(err.message, r#"Expected " " or number but end of input found."#);
}

#[test]
fn test_cache_gives_same_results() {
    for input in ["ab", "a", "ax", "", "abab"] {
        assert_eq!(
            pair::parse(input, ParseOptions::default()),
            pair_cached::parse(input, ParseOptions::default()),
            "{input:?}"
        );
    }
    for input in ["1+2", "neg 1 + 2", "NEG", "1 +", "7  +  8 + 9", "x"] {
        assert_eq!(
            sum::parse(input, ParseOptions::default()),
            sum_cached::parse(input, ParseOptions::default()),
            "{input:?}"
        );
    }
}
