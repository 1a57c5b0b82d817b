pub mod build;
pub mod display;
pub mod dsl;

use cranelift_entity::{entity_impl, EntitySet, PrimaryMap};
use pegc_runtime::ClassPart;

use crate::span::{Span, Spanned};

pub use build::{GrammarDef, SyntaxError};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuleHandle(u32);
entity_impl!(RuleHandle, "rule");

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExprHandle(u32);
entity_impl!(ExprHandle, "expr");

/// Host code embedded in the grammar, along with where it was written.
pub type Code = Spanned<String>;

#[derive(Clone, Debug)]
pub struct Grammar {
    /// Emitted once at the top of the generated file.
    pub top_level_initializer: Option<Code>,
    /// Runs at the start of every parse call.
    pub initializer: Option<Code>,
    /// In declaration order.
    pub rules: PrimaryMap<RuleHandle, Rule>,
    pub exprs: PrimaryMap<ExprHandle, Expr>,
    removed: EntitySet<RuleHandle>,
}

#[derive(Clone, Debug)]
pub struct Rule {
    pub name: String,
    pub name_span: Span,
    /// Human readable name used in error messages instead of the rule's expectations.
    pub alias: Option<String>,
    pub expr: ExprHandle,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Boundary {
    /// `None` is unbounded
    Constant(Option<u32>),
    /// The count captured by an earlier label.
    Variable(Spanned<String>),
    Function(Code),
}

impl Boundary {
    pub fn constant(&self) -> Option<Option<u32>> {
        match *self {
            Boundary::Constant(c) => Some(c),
            _ => None,
        }
    }
    pub fn is_unbounded(&self) -> bool {
        matches!(self, Boundary::Constant(None))
    }
}

#[derive(Clone, Debug)]
pub enum ExprKind {
    Choice(Vec<ExprHandle>),
    Sequence(Vec<ExprHandle>),
    Labeled {
        label: Option<Spanned<String>>,
        pick: bool,
        expr: ExprHandle,
    },
    Action {
        expr: ExprHandle,
        code: Code,
    },
    Text(ExprHandle),
    SimpleAnd(ExprHandle),
    SimpleNot(ExprHandle),
    SemanticAnd(Code),
    SemanticNot(Code),
    Optional(ExprHandle),
    ZeroOrMore(ExprHandle),
    OneOrMore(ExprHandle),
    Repeated {
        expr: ExprHandle,
        /// `None` means exactly `max` repetitions.
        min: Option<Boundary>,
        max: Boundary,
        delimiter: Option<ExprHandle>,
    },
    Group(ExprHandle),
    RuleRef {
        name: String,
        /// `None` if the name didn't resolve.
        target: Option<RuleHandle>,
    },
    Literal {
        value: String,
        ignore_case: bool,
    },
    Class {
        parts: Vec<ClassPart>,
        inverted: bool,
        ignore_case: bool,
    },
    Any,
    Named {
        name: String,
        expr: ExprHandle,
    },
}

impl ExprKind {
    /// Direct subexpressions, rule references are not followed.
    pub fn children(&self) -> impl Iterator<Item = ExprHandle> + '_ {
        let (many, one, two): (&[ExprHandle], _, _) = match self {
            ExprKind::Choice(list) | ExprKind::Sequence(list) => (list.as_slice(), None, None),
            ExprKind::Labeled { expr, .. }
            | ExprKind::Action { expr, .. }
            | ExprKind::Named { expr, .. }
            | ExprKind::Text(expr)
            | ExprKind::SimpleAnd(expr)
            | ExprKind::SimpleNot(expr)
            | ExprKind::Optional(expr)
            | ExprKind::ZeroOrMore(expr)
            | ExprKind::OneOrMore(expr)
            | ExprKind::Group(expr) => (&[][..], Some(*expr), None),
            ExprKind::Repeated {
                expr, delimiter, ..
            } => (&[][..], Some(*expr), *delimiter),
            ExprKind::SemanticAnd(_)
            | ExprKind::SemanticNot(_)
            | ExprKind::RuleRef { .. }
            | ExprKind::Literal { .. }
            | ExprKind::Class { .. }
            | ExprKind::Any => (&[][..], None, None),
        };
        many.iter().copied().chain(one).chain(two)
    }
}

impl Grammar {
    pub fn new() -> Grammar {
        Grammar {
            top_level_initializer: None,
            initializer: None,
            rules: PrimaryMap::new(),
            exprs: PrimaryMap::new(),
            removed: EntitySet::new(),
        }
    }

    pub fn push_expr(&mut self, kind: ExprKind, span: Span) -> ExprHandle {
        self.exprs.push(Expr { kind, span })
    }

    pub fn kind(&self, expr: ExprHandle) -> &ExprKind {
        &self.exprs[expr].kind
    }

    /// Rules that weren't removed by a transform, in declaration order.
    pub fn live_rules(&self) -> impl Iterator<Item = (RuleHandle, &Rule)> + '_ {
        self.rules
            .iter()
            .filter(|(handle, _)| !self.removed.contains(*handle))
    }

    pub fn remove_rule(&mut self, rule: RuleHandle) {
        self.removed.insert(rule);
    }

    /// First live rule declared with this name.
    pub fn rule_by_name(&self, name: &str) -> Option<RuleHandle> {
        self.live_rules()
            .find(|(_, rule)| rule.name == name)
            .map(|(handle, _)| handle)
    }

    /// Every expression in the body of `rule`, parents before children.
    pub fn rule_exprs(&self, rule: RuleHandle) -> Vec<ExprHandle> {
        let mut out = Vec::new();
        let mut stack = vec![self.rules[rule].expr];
        while let Some(expr) = stack.pop() {
            out.push(expr);
            let start = stack.len();
            stack.extend(self.kind(expr).children());
            stack[start..].reverse();
        }
        out
    }
}

impl Default for Grammar {
    fn default() -> Self {
        Self::new()
    }
}

#[test]
fn test_handles_print_with_prefix() {
    let mut grammar = Grammar::new();
    let expr = grammar.push_expr(ExprKind::Any, Span::empty());
    assert_eq!(format!("{expr:?}"), "expr0");
    assert_eq!(format!("{:?}", RuleHandle::from_u32(2)), "rule2");
}
