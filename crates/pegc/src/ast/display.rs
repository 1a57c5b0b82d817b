use std::fmt::{Display, Formatter, Result, Write};

use pegc_runtime::ClassPart;

use super::{Boundary, ExprHandle, ExprKind, Grammar};

/// Prints a grammar back in PEG notation.
pub struct GrammarDisplay<'a>(&'a Grammar);

pub struct ExprDisplay<'a>(&'a Grammar, ExprHandle);

impl Grammar {
    pub fn display(&self) -> GrammarDisplay<'_> {
        GrammarDisplay(self)
    }
    pub fn display_expr(&self, expr: ExprHandle) -> ExprDisplay<'_> {
        ExprDisplay(self, expr)
    }
}

impl Display for GrammarDisplay<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        for (_, rule) in self.0.live_rules() {
            write!(f, "{}", rule.name)?;
            if let Some(alias) = &rule.alias {
                write!(f, " \"{}\"", alias.escape_debug())?;
            }
            writeln!(f, " = {}", self.0.display_expr(rule.expr))?;
        }
        Ok(())
    }
}

impl Display for ExprDisplay<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write_expr(f, self.0, self.1, 0)
    }
}

fn precedence(kind: &ExprKind) -> u8 {
    match kind {
        ExprKind::Choice(_) => 0,
        ExprKind::Action { .. } => 1,
        ExprKind::Sequence(_) => 2,
        ExprKind::Labeled { .. }
        | ExprKind::Text(_)
        | ExprKind::SimpleAnd(_)
        | ExprKind::SimpleNot(_) => 3,
        ExprKind::Optional(_)
        | ExprKind::ZeroOrMore(_)
        | ExprKind::OneOrMore(_)
        | ExprKind::Repeated { .. } => 4,
        _ => 5,
    }
}

fn write_expr(f: &mut dyn Write, grammar: &Grammar, expr: ExprHandle, min: u8) -> Result {
    let kind = grammar.kind(expr);
    if precedence(kind) < min {
        f.write_char('(')?;
        write_expr(f, grammar, expr, 0)?;
        return f.write_char(')');
    }

    match kind {
        ExprKind::Choice(alternatives) => {
            for (i, &alt) in alternatives.iter().enumerate() {
                if i > 0 {
                    f.write_str(" / ")?;
                }
                write_expr(f, grammar, alt, 1)?;
            }
            Ok(())
        }
        ExprKind::Sequence(elements) => {
            if elements.is_empty() {
                return f.write_str("()");
            }
            for (i, &element) in elements.iter().enumerate() {
                if i > 0 {
                    f.write_char(' ')?;
                }
                write_expr(f, grammar, element, 3)?;
            }
            Ok(())
        }
        ExprKind::Labeled { label, pick, expr } => {
            if *pick {
                f.write_char('@')?;
            }
            if let Some(label) = label {
                write!(f, "{}:", label.inner)?;
            }
            write_expr(f, grammar, *expr, 4)
        }
        ExprKind::Action { expr, code } => {
            write_expr(f, grammar, *expr, 2)?;
            write!(f, " {{{}}}", code.inner)
        }
        ExprKind::Text(e) => prefix(f, grammar, "$", *e),
        ExprKind::SimpleAnd(e) => prefix(f, grammar, "&", *e),
        ExprKind::SimpleNot(e) => prefix(f, grammar, "!", *e),
        ExprKind::SemanticAnd(code) => write!(f, "&{{{}}}", code.inner),
        ExprKind::SemanticNot(code) => write!(f, "!{{{}}}", code.inner),
        ExprKind::Optional(e) => suffix(f, grammar, *e, "?"),
        ExprKind::ZeroOrMore(e) => suffix(f, grammar, *e, "*"),
        ExprKind::OneOrMore(e) => suffix(f, grammar, *e, "+"),
        ExprKind::Repeated {
            expr,
            min,
            max,
            delimiter,
        } => {
            write_expr(f, grammar, *expr, 5)?;
            f.write_char('|')?;
            if let Some(min) = min {
                write_boundary(f, min)?;
                f.write_str("..")?;
            }
            write_boundary(f, max)?;
            if let Some(delimiter) = delimiter {
                f.write_str(", ")?;
                write_expr(f, grammar, *delimiter, 0)?;
            }
            f.write_char('|')
        }
        ExprKind::Group(e) => {
            f.write_char('(')?;
            write_expr(f, grammar, *e, 0)?;
            f.write_char(')')
        }
        ExprKind::RuleRef { name, .. } => f.write_str(name),
        ExprKind::Literal { value, ignore_case } => {
            write!(f, "\"{}\"", value.escape_debug())?;
            if *ignore_case {
                f.write_char('i')?;
            }
            Ok(())
        }
        ExprKind::Class {
            parts,
            inverted,
            ignore_case,
        } => {
            f.write_char('[')?;
            if *inverted {
                f.write_char('^')?;
            }
            for part in parts {
                match *part {
                    ClassPart::Char(c) => write!(f, "{}", c.escape_debug())?,
                    ClassPart::Range(lo, hi) => {
                        write!(f, "{}-{}", lo.escape_debug(), hi.escape_debug())?
                    }
                }
            }
            f.write_char(']')?;
            if *ignore_case {
                f.write_char('i')?;
            }
            Ok(())
        }
        ExprKind::Any => f.write_char('.'),
        ExprKind::Named { expr, .. } => write_expr(f, grammar, *expr, min),
    }
}

fn prefix(f: &mut dyn Write, grammar: &Grammar, op: &str, expr: ExprHandle) -> Result {
    f.write_str(op)?;
    write_expr(f, grammar, expr, 4)
}

fn suffix(f: &mut dyn Write, grammar: &Grammar, expr: ExprHandle, op: &str) -> Result {
    write_expr(f, grammar, expr, 5)?;
    f.write_str(op)
}

fn write_boundary(f: &mut dyn Write, boundary: &Boundary) -> Result {
    match boundary {
        Boundary::Constant(Some(n)) => write!(f, "{n}"),
        Boundary::Constant(None) => Ok(()),
        Boundary::Variable(label) => f.write_str(&label.inner),
        Boundary::Function(code) => write!(f, "{{{}}}", code.inner),
    }
}

#[test]
fn test_display_roundtrips_precedence() {
    use super::dsl::*;
    use super::GrammarDef;

    let grammar = GrammarDef::new()
        .rule(
            "Sum",
            choice([
                action(
                    seq([label("a", rule_ref("Num")), lit("+"), pick(plus(choice([lit("x"), lit("y")])))]),
                    "a",
                ),
                seq([not(lit("-")), star(class(&[('0', '9')]))]),
            ]),
        )
        .rule(
            "List",
            repeated(rule_ref("Num"), Some(count(1)), unbounded(), Some(lit(","))),
        )
        .build()
        .unwrap();

    assert_eq!(
        grammar.display().to_string(),
        "Sum = a:Num \"+\" @(\"x\" / \"y\")+ {a} / !\"-\" [0-9]*\nList = Num|1.., \",\"|\n"
    );
}
