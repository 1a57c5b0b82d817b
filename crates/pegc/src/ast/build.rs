//! The tree-shaped grammar description handed over by a grammar-text parser, and its lowering
//! into the arena form the passes work on.

use std::{collections::HashMap, fmt::Display};

use pegc_runtime::ClassPart;
use serde::{Deserialize, Serialize};

use crate::span::{Span, Spanned};

use super::{Boundary, Code, ExprHandle, ExprKind, Grammar, Rule};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrammarDef {
    #[serde(default)]
    pub top_level_initializer: Option<Code>,
    #[serde(default)]
    pub initializer: Option<Code>,
    pub rules: Vec<RuleDef>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDef {
    pub name: String,
    #[serde(default)]
    pub name_location: Span,
    #[serde(default)]
    pub alias: Option<String>,
    pub expression: ExprDef,
    #[serde(default)]
    pub location: Span,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExprDef {
    #[serde(flatten)]
    pub kind: ExprDefKind,
    #[serde(default)]
    pub location: Span,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExprDefKind {
    Choice {
        alternatives: Vec<ExprDef>,
    },
    Sequence {
        elements: Vec<ExprDef>,
    },
    Labeled {
        #[serde(default)]
        label: Option<String>,
        #[serde(default, rename = "labelLocation")]
        label_location: Span,
        #[serde(default)]
        pick: bool,
        expression: Box<ExprDef>,
    },
    Action {
        expression: Box<ExprDef>,
        code: String,
        #[serde(default, rename = "codeLocation")]
        code_location: Span,
    },
    Text {
        expression: Box<ExprDef>,
    },
    SimpleAnd {
        expression: Box<ExprDef>,
    },
    SimpleNot {
        expression: Box<ExprDef>,
    },
    SemanticAnd {
        code: String,
        #[serde(default, rename = "codeLocation")]
        code_location: Span,
    },
    SemanticNot {
        code: String,
        #[serde(default, rename = "codeLocation")]
        code_location: Span,
    },
    Optional {
        expression: Box<ExprDef>,
    },
    ZeroOrMore {
        expression: Box<ExprDef>,
    },
    OneOrMore {
        expression: Box<ExprDef>,
    },
    Repeated {
        expression: Box<ExprDef>,
        #[serde(default)]
        min: Option<BoundaryDef>,
        max: BoundaryDef,
        #[serde(default)]
        delimiter: Option<Box<ExprDef>>,
    },
    Group {
        expression: Box<ExprDef>,
    },
    RuleRef {
        name: String,
    },
    Literal {
        value: String,
        #[serde(default, rename = "ignoreCase")]
        ignore_case: bool,
    },
    Class {
        parts: Vec<ClassPartDef>,
        #[serde(default)]
        inverted: bool,
        #[serde(default, rename = "ignoreCase")]
        ignore_case: bool,
    },
    Any,
    Named {
        name: String,
        expression: Box<ExprDef>,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BoundaryDef {
    Constant {
        value: Option<u32>,
    },
    Variable {
        value: String,
        #[serde(default)]
        location: Span,
    },
    Function {
        value: String,
        #[serde(default)]
        location: Span,
    },
}

/// `"a"` for a single character, `["a", "z"]` for a range.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClassPartDef {
    Char(char),
    Range(char, char),
}

/// Structurally invalid grammar description.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SyntaxError {
    pub message: String,
    pub location: Span,
}

impl Display for SyntaxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

impl std::error::Error for SyntaxError {}

struct BuildCx {
    grammar: Grammar,
}

impl BuildCx {
    fn expr(&mut self, def: ExprDef) -> Result<ExprHandle, SyntaxError> {
        let span = def.location;
        let kind = match def.kind {
            ExprDefKind::Choice { alternatives } => {
                if alternatives.is_empty() {
                    return Err(SyntaxError {
                        message: "Choice must have at least one alternative".to_owned(),
                        location: span,
                    });
                }
                ExprKind::Choice(self.list(alternatives)?)
            }
            ExprDefKind::Sequence { elements } => ExprKind::Sequence(self.list(elements)?),
            ExprDefKind::Labeled {
                label,
                label_location,
                pick,
                expression,
            } => ExprKind::Labeled {
                label: label.map(|l| Spanned::new(l, label_location)),
                pick,
                expr: self.expr(*expression)?,
            },
            ExprDefKind::Action {
                expression,
                code,
                code_location,
            } => ExprKind::Action {
                expr: self.expr(*expression)?,
                code: Spanned::new(code, code_location),
            },
            ExprDefKind::Text { expression } => ExprKind::Text(self.expr(*expression)?),
            ExprDefKind::SimpleAnd { expression } => ExprKind::SimpleAnd(self.expr(*expression)?),
            ExprDefKind::SimpleNot { expression } => ExprKind::SimpleNot(self.expr(*expression)?),
            ExprDefKind::SemanticAnd {
                code,
                code_location,
            } => ExprKind::SemanticAnd(Spanned::new(code, code_location)),
            ExprDefKind::SemanticNot {
                code,
                code_location,
            } => ExprKind::SemanticNot(Spanned::new(code, code_location)),
            ExprDefKind::Optional { expression } => ExprKind::Optional(self.expr(*expression)?),
            ExprDefKind::ZeroOrMore { expression } => {
                ExprKind::ZeroOrMore(self.expr(*expression)?)
            }
            ExprDefKind::OneOrMore { expression } => ExprKind::OneOrMore(self.expr(*expression)?),
            ExprDefKind::Repeated {
                expression,
                min,
                max,
                delimiter,
            } => ExprKind::Repeated {
                expr: self.expr(*expression)?,
                min: min.map(boundary),
                max: boundary(max),
                delimiter: match delimiter {
                    Some(d) => Some(self.expr(*d)?),
                    None => None,
                },
            },
            ExprDefKind::Group { expression } => ExprKind::Group(self.expr(*expression)?),
            ExprDefKind::RuleRef { name } => ExprKind::RuleRef { name, target: None },
            ExprDefKind::Literal { value, ignore_case } => ExprKind::Literal { value, ignore_case },
            ExprDefKind::Class {
                parts,
                inverted,
                ignore_case,
            } => ExprKind::Class {
                parts: parts
                    .into_iter()
                    .map(|p| class_part(p, span))
                    .collect::<Result<_, _>>()?,
                inverted,
                ignore_case,
            },
            ExprDefKind::Any => ExprKind::Any,
            ExprDefKind::Named { name, expression } => ExprKind::Named {
                name,
                expr: self.expr(*expression)?,
            },
        };

        Ok(self.grammar.push_expr(kind, span))
    }

    fn list(&mut self, defs: Vec<ExprDef>) -> Result<Vec<ExprHandle>, SyntaxError> {
        defs.into_iter().map(|d| self.expr(d)).collect()
    }
}

fn boundary(def: BoundaryDef) -> Boundary {
    match def {
        BoundaryDef::Constant { value } => Boundary::Constant(value),
        BoundaryDef::Variable { value, location } => {
            Boundary::Variable(Spanned::new(value, location))
        }
        BoundaryDef::Function { value, location } => {
            Boundary::Function(Spanned::new(value, location))
        }
    }
}

fn class_part(def: ClassPartDef, span: Span) -> Result<ClassPart, SyntaxError> {
    match def {
        ClassPartDef::Char(c) => Ok(ClassPart::Char(c)),
        ClassPartDef::Range(lo, hi) if lo > hi => Err(SyntaxError {
            message: format!("Invalid character range: {lo}-{hi}."),
            location: span,
        }),
        ClassPartDef::Range(lo, hi) => Ok(ClassPart::Range(lo, hi)),
    }
}

impl GrammarDef {
    pub fn new() -> GrammarDef {
        GrammarDef::default()
    }

    pub fn rule(mut self, name: &str, expression: ExprDef) -> GrammarDef {
        self.rules.push(RuleDef {
            name: name.to_owned(),
            name_location: Span::empty(),
            alias: None,
            expression,
            location: Span::empty(),
        });
        self
    }

    pub fn aliased_rule(mut self, name: &str, alias: &str, expression: ExprDef) -> GrammarDef {
        self = self.rule(name, expression);
        if let Some(rule) = self.rules.last_mut() {
            rule.alias = Some(alias.to_owned());
        }
        self
    }

    pub fn initializer(mut self, code: &str) -> GrammarDef {
        self.initializer = Some(Spanned::new(code.to_owned(), Span::empty()));
        self
    }

    pub fn top_level_initializer(mut self, code: &str) -> GrammarDef {
        self.top_level_initializer = Some(Spanned::new(code.to_owned(), Span::empty()));
        self
    }

    /// Lowers the tree into a [`Grammar`], resolving rule references by name.
    ///
    /// Duplicate rule names resolve to the first definition, they are reported by the check passes.
    pub fn build(self) -> Result<Grammar, SyntaxError> {
        let mut cx = BuildCx {
            grammar: Grammar::new(),
        };
        cx.grammar.top_level_initializer = self.top_level_initializer;
        cx.grammar.initializer = self.initializer;

        let mut names = HashMap::new();
        for def in self.rules {
            let expr = cx.expr(def.expression)?;
            let handle = cx.grammar.rules.push(Rule {
                name: def.name.clone(),
                name_span: def.name_location,
                alias: def.alias,
                expr,
                span: def.location,
            });
            names.entry(def.name).or_insert(handle);
        }

        for expr in cx.grammar.exprs.values_mut() {
            if let ExprKind::RuleRef { name, target } = &mut expr.kind {
                *target = names.get(name.as_str()).copied();
            }
        }

        Ok(cx.grammar)
    }
}

#[cfg(test)]
use super::dsl::*;

#[test]
fn test_build_resolves_references() {
    let grammar = GrammarDef::new()
        .rule("Start", seq([rule_ref("A"), rule_ref("Missing")]))
        .rule("A", lit("a"))
        .rule("A", lit("b"))
        .build()
        .unwrap();

    let handles = grammar.rules.keys().collect::<Vec<_>>();
    let ExprKind::Sequence(elements) = grammar.kind(grammar.rules[handles[0]].expr) else {
        panic!()
    };
    let targets = elements
        .iter()
        .map(|&e| match grammar.kind(e) {
            ExprKind::RuleRef { target, .. } => *target,
            _ => panic!(),
        })
        .collect::<Vec<_>>();

    assert_eq!(targets, vec![Some(handles[1]), None]);
}

#[test]
fn test_build_rejects_inverted_range() {
    let err = GrammarDef::new()
        .rule("A", class(&[('z', 'a')]))
        .build()
        .unwrap_err();
    assert_eq!(err.message, "Invalid character range: z-a.");
}

#[test]
fn test_grammar_def_from_json() {
    let json = r#"{
        "rules": [{
            "name": "Start",
            "nameLocation": { "start": 0, "end": 5 },
            "expression": {
                "type": "sequence",
                "location": { "start": 8, "end": 15 },
                "elements": [
                    { "type": "literal", "value": "a" },
                    { "type": "class", "parts": ["x", ["0", "9"]], "inverted": true },
                    {
                        "type": "repeated",
                        "expression": { "type": "any" },
                        "min": { "type": "constant", "value": 1 },
                        "max": { "type": "constant", "value": null }
                    }
                ]
            }
        }]
    }"#;
    let def: GrammarDef = serde_json::from_str(json).unwrap();
    let grammar = def.build().unwrap();

    let rule = &grammar.rules[grammar.rule_by_name("Start").unwrap()];
    assert_eq!(rule.name_span, Span::new(0, 5));
    assert_eq!(grammar.exprs[rule.expr].span, Span::new(8, 15));

    let ExprKind::Sequence(elements) = grammar.kind(rule.expr) else {
        panic!()
    };
    match grammar.kind(elements[1]) {
        ExprKind::Class {
            parts, inverted, ..
        } => {
            assert!(*inverted);
            assert_eq!(parts, &[ClassPart::Char('x'), ClassPart::Range('0', '9')]);
        }
        _ => panic!(),
    }
    match grammar.kind(elements[2]) {
        ExprKind::Repeated { min, max, .. } => {
            assert_eq!(min, &Some(Boundary::Constant(Some(1))));
            assert!(max.is_unbounded());
        }
        _ => panic!(),
    }
}
