//! Shorthand constructors for [`ExprDef`] trees, handy when grammars are assembled in code.

use crate::span::Span;

use super::build::{BoundaryDef, ClassPartDef, ExprDef, ExprDefKind};

fn node(kind: ExprDefKind) -> ExprDef {
    ExprDef {
        kind,
        location: Span::empty(),
    }
}

pub fn at(mut expr: ExprDef, span: Span) -> ExprDef {
    expr.location = span;
    expr
}

pub fn lit(value: &str) -> ExprDef {
    node(ExprDefKind::Literal {
        value: value.to_owned(),
        ignore_case: false,
    })
}

pub fn lit_ic(value: &str) -> ExprDef {
    node(ExprDefKind::Literal {
        value: value.to_owned(),
        ignore_case: true,
    })
}

/// Each `(lo, hi)` pair is a range, a pair with equal ends is a single character.
pub fn class(ranges: &[(char, char)]) -> ExprDef {
    class_with(ranges, false, false)
}

pub fn class_with(ranges: &[(char, char)], inverted: bool, ignore_case: bool) -> ExprDef {
    let parts = ranges
        .iter()
        .map(|&(lo, hi)| match lo == hi {
            true => ClassPartDef::Char(lo),
            false => ClassPartDef::Range(lo, hi),
        })
        .collect();
    node(ExprDefKind::Class {
        parts,
        inverted,
        ignore_case,
    })
}

pub fn any() -> ExprDef {
    node(ExprDefKind::Any)
}

pub fn rule_ref(name: &str) -> ExprDef {
    node(ExprDefKind::RuleRef {
        name: name.to_owned(),
    })
}

pub fn seq(elements: impl IntoIterator<Item = ExprDef>) -> ExprDef {
    node(ExprDefKind::Sequence {
        elements: elements.into_iter().collect(),
    })
}

pub fn choice(alternatives: impl IntoIterator<Item = ExprDef>) -> ExprDef {
    node(ExprDefKind::Choice {
        alternatives: alternatives.into_iter().collect(),
    })
}

pub fn label(name: &str, expression: ExprDef) -> ExprDef {
    node(ExprDefKind::Labeled {
        label: Some(name.to_owned()),
        label_location: Span::empty(),
        pick: false,
        expression: Box::new(expression),
    })
}

/// `@expression`
pub fn pick(expression: ExprDef) -> ExprDef {
    node(ExprDefKind::Labeled {
        label: None,
        label_location: Span::empty(),
        pick: true,
        expression: Box::new(expression),
    })
}

pub fn action(expression: ExprDef, code: &str) -> ExprDef {
    node(ExprDefKind::Action {
        expression: Box::new(expression),
        code: code.to_owned(),
        code_location: Span::empty(),
    })
}

pub fn text(expression: ExprDef) -> ExprDef {
    node(ExprDefKind::Text {
        expression: Box::new(expression),
    })
}

pub fn and(expression: ExprDef) -> ExprDef {
    node(ExprDefKind::SimpleAnd {
        expression: Box::new(expression),
    })
}

pub fn not(expression: ExprDef) -> ExprDef {
    node(ExprDefKind::SimpleNot {
        expression: Box::new(expression),
    })
}

pub fn sem_and(code: &str) -> ExprDef {
    node(ExprDefKind::SemanticAnd {
        code: code.to_owned(),
        code_location: Span::empty(),
    })
}

pub fn sem_not(code: &str) -> ExprDef {
    node(ExprDefKind::SemanticNot {
        code: code.to_owned(),
        code_location: Span::empty(),
    })
}

pub fn opt(expression: ExprDef) -> ExprDef {
    node(ExprDefKind::Optional {
        expression: Box::new(expression),
    })
}

pub fn star(expression: ExprDef) -> ExprDef {
    node(ExprDefKind::ZeroOrMore {
        expression: Box::new(expression),
    })
}

pub fn plus(expression: ExprDef) -> ExprDef {
    node(ExprDefKind::OneOrMore {
        expression: Box::new(expression),
    })
}

pub fn group(expression: ExprDef) -> ExprDef {
    node(ExprDefKind::Group {
        expression: Box::new(expression),
    })
}

pub fn named(name: &str, expression: ExprDef) -> ExprDef {
    node(ExprDefKind::Named {
        name: name.to_owned(),
        expression: Box::new(expression),
    })
}

pub fn count(value: u32) -> BoundaryDef {
    BoundaryDef::Constant { value: Some(value) }
}

pub fn unbounded() -> BoundaryDef {
    BoundaryDef::Constant { value: None }
}

pub fn count_of(label: &str) -> BoundaryDef {
    BoundaryDef::Variable {
        value: label.to_owned(),
        location: Span::empty(),
    }
}

pub fn count_fn(code: &str) -> BoundaryDef {
    BoundaryDef::Function {
        value: code.to_owned(),
        location: Span::empty(),
    }
}

/// `expression|min..max, delimiter|`, a `None` minimum repeats exactly `max` times.
pub fn repeated(
    expression: ExprDef,
    min: Option<BoundaryDef>,
    max: BoundaryDef,
    delimiter: Option<ExprDef>,
) -> ExprDef {
    node(ExprDefKind::Repeated {
        expression: Box::new(expression),
        min,
        max,
        delimiter: delimiter.map(Box::new),
    })
}
