use cranelift_entity::SecondaryMap;

use crate::{
    ast::{Boundary, ExprHandle, ExprKind, Grammar, RuleHandle},
    error::{InternalError, Session},
};

use super::Compilation;

/// Whether an expression can succeed, judged without looking at the input.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Debug)]
pub enum MatchResult {
    Always,
    #[default]
    Sometimes,
    Never,
}

impl MatchResult {
    pub fn negate(self) -> MatchResult {
        match self {
            MatchResult::Always => MatchResult::Never,
            MatchResult::Sometimes => MatchResult::Sometimes,
            MatchResult::Never => MatchResult::Always,
        }
    }
}

/// Rounds a rule body may be re-evaluated before the result is considered divergent.
pub const MAX_ITERATIONS: usize = 6;

struct InferCx<'a> {
    grammar: &'a Grammar,
    matches: &'a mut SecondaryMap<ExprHandle, MatchResult>,
    rules: &'a mut SecondaryMap<RuleHandle, Option<MatchResult>>,
}

impl InferCx<'_> {
    fn rule(&mut self, rule: RuleHandle) -> Result<MatchResult, InternalError> {
        if let Some(result) = self.rules[rule] {
            return Ok(result);
        }

        // recursive references observe the current estimate
        let mut result = MatchResult::Sometimes;
        self.rules[rule] = Some(result);
        let mut count = 0;
        loop {
            count += 1;
            if count > MAX_ITERATIONS {
                return Err(InternalError::new(format!(
                    "match result of rule \"{}\" did not converge",
                    self.grammar.rules[rule].name
                )));
            }
            let next = self.expr(self.grammar.rules[rule].expr)?;
            self.rules[rule] = Some(next);
            if next == result {
                break;
            }
            result = next;
        }
        log::trace!(
            "rule {} is {result:?} after {count} iterations",
            self.grammar.rules[rule].name
        );
        Ok(result)
    }

    fn expr(&mut self, expr: ExprHandle) -> Result<MatchResult, InternalError> {
        let grammar = self.grammar;
        let result = match grammar.kind(expr) {
            ExprKind::Choice(alternatives) => {
                let mut result = MatchResult::Never;
                for &alt in alternatives {
                    match self.expr(alt)? {
                        MatchResult::Always => result = MatchResult::Always,
                        MatchResult::Sometimes if result == MatchResult::Never => {
                            result = MatchResult::Sometimes
                        }
                        _ => {}
                    }
                }
                result
            }
            ExprKind::Sequence(elements) => {
                let mut result = MatchResult::Always;
                for &element in elements {
                    match self.expr(element)? {
                        MatchResult::Never => result = MatchResult::Never,
                        MatchResult::Sometimes if result == MatchResult::Always => {
                            result = MatchResult::Sometimes
                        }
                        _ => {}
                    }
                }
                result
            }
            ExprKind::Labeled { expr, .. }
            | ExprKind::Action { expr, .. }
            | ExprKind::Named { expr, .. }
            | ExprKind::Text(expr)
            | ExprKind::OneOrMore(expr)
            | ExprKind::Group(expr)
            | ExprKind::SimpleAnd(expr) => self.expr(*expr)?,
            ExprKind::SimpleNot(expr) => self.expr(*expr)?.negate(),
            ExprKind::Optional(expr) | ExprKind::ZeroOrMore(expr) => {
                self.expr(*expr)?;
                MatchResult::Always
            }
            ExprKind::Repeated {
                expr,
                min,
                max,
                delimiter,
            } => {
                let body = self.expr(*expr)?;
                let delimiter = match delimiter {
                    Some(d) => Some(self.expr(*d)?),
                    None => None,
                };
                repeated(body, delimiter, min.as_ref().unwrap_or(max), max)
            }
            ExprKind::RuleRef { target, name } => match *target {
                Some(target) => self.rule(target)?,
                None => {
                    return Err(InternalError::new(format!(
                        "reference to rule \"{name}\" is unresolved"
                    )))
                }
            },
            ExprKind::Literal { value, .. } if value.is_empty() => MatchResult::Always,
            ExprKind::Class {
                parts, inverted, ..
            } if parts.is_empty() && !inverted => MatchResult::Never,
            ExprKind::Literal { .. }
            | ExprKind::Class { .. }
            | ExprKind::Any
            | ExprKind::SemanticAnd(_)
            | ExprKind::SemanticNot(_) => MatchResult::Sometimes,
        };
        self.matches[expr] = result;
        Ok(result)
    }
}

fn repeated(
    body: MatchResult,
    delimiter: Option<MatchResult>,
    min: &Boundary,
    max: &Boundary,
) -> MatchResult {
    let (Boundary::Constant(min), Boundary::Constant(max)) = (min, max) else {
        return MatchResult::Sometimes;
    };
    let min = min.unwrap_or(0);
    match *max {
        Some(0) if min == 0 => return MatchResult::Always,
        Some(0) => return MatchResult::Never,
        Some(max) if min > max => return MatchResult::Never,
        _ => {}
    }
    // with two or more required items the delimiter has to match at least once
    let delimiter = delimiter.filter(|_| min >= 2);
    match (body, delimiter) {
        (MatchResult::Never, _) if min == 0 => MatchResult::Always,
        (MatchResult::Never, _) => MatchResult::Never,
        (MatchResult::Always, Some(delimiter)) => delimiter,
        (MatchResult::Always, None) => MatchResult::Always,
        (MatchResult::Sometimes, Some(MatchResult::Never)) => MatchResult::Never,
        (MatchResult::Sometimes, Some(_)) => MatchResult::Sometimes,
        (MatchResult::Sometimes, None) if min == 0 => MatchResult::Always,
        (MatchResult::Sometimes, None) => MatchResult::Sometimes,
    }
}

/// Classifies every expression of the live rules.
pub fn infer_match_results(c: &mut Compilation, _: &Session) -> Result<(), InternalError> {
    let Compilation {
        grammar,
        matches,
        rule_matches,
        ..
    } = c;
    let grammar = &*grammar;
    let mut cx = InferCx {
        grammar,
        matches,
        rules: rule_matches,
    };
    for (handle, _) in grammar.live_rules() {
        cx.rule(handle)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{
        ast::{dsl::*, GrammarDef},
        backend::Compilation,
        error::Session,
        options::CompileOptions,
    };

    use super::MatchResult::{self, *};

    fn infer(def: GrammarDef) -> Vec<MatchResult> {
        let mut c = Compilation::new(def.build().unwrap(), CompileOptions::default());
        super::infer_match_results(&mut c, &Session::new()).unwrap();
        c.grammar
            .rules
            .keys()
            .map(|r| c.rule_matches[r].unwrap())
            .collect()
    }

    #[test]
    fn test_terminals() {
        let found = infer(
            GrammarDef::new()
                .rule("A", lit(""))
                .rule("B", lit("b"))
                .rule("C", class(&[]))
                .rule("D", class_with(&[], true, false))
                .rule("E", any())
                .rule("F", sem_and("true")),
        );
        assert_eq!(found, vec![Always, Sometimes, Never, Sometimes, Sometimes, Sometimes]);
    }

    #[test]
    fn test_combinators() {
        let found = infer(
            GrammarDef::new()
                .rule("Seq", seq([lit(""), lit("a"), class(&[])]))
                .rule("Choice", choice([lit("a"), lit("")]))
                .rule("Not", not(lit("")))
                .rule("And", and(lit("a")))
                .rule("Star", star(class(&[])))
                .rule("Plus", plus(lit("a")))
                .rule("Ref", text(rule_ref("Choice"))),
        );
        assert_eq!(
            found,
            vec![Never, Always, Never, Sometimes, Always, Sometimes, Always]
        );
    }

    #[test]
    fn test_repeated() {
        let found = infer(
            GrammarDef::new()
                .rule("A", repeated(class(&[]), Some(count(0)), count(3), None))
                .rule("B", repeated(lit("a"), Some(count(1)), count(3), None))
                .rule("C", repeated(lit(""), Some(count(2)), count(3), Some(class(&[]))))
                .rule("D", repeated(lit(""), Some(count(1)), count(3), Some(class(&[]))))
                .rule("E", repeated(lit("a"), None, count_fn("n"), None))
                .rule("F", repeated(lit("a"), Some(count(0)), unbounded(), None)),
        );
        assert_eq!(found, vec![Always, Sometimes, Never, Always, Sometimes, Always]);
    }

    #[test]
    fn test_recursive_rule_converges() {
        let found = infer(
            GrammarDef::new()
                .rule("List", choice([seq([lit("a"), rule_ref("List")]), lit("")]))
                .rule("Loop", seq([lit("("), rule_ref("Loop")])),
        );
        assert_eq!(found, vec![Always, Sometimes]);
    }

    #[test]
    fn test_every_expression_is_classified() {
        let mut c = Compilation::new(
            GrammarDef::new()
                .rule("A", choice([lit("a"), opt(class(&[]))]))
                .build()
                .unwrap(),
            CompileOptions::default(),
        );
        super::infer_match_results(&mut c, &Session::new()).unwrap();
        let classes = c
            .grammar
            .exprs
            .keys()
            .map(|e| c.matches[e])
            .collect::<Vec<_>>();
        // children are lowered before their parents
        assert_eq!(classes, vec![Sometimes, Never, Always, Always]);
    }
}
