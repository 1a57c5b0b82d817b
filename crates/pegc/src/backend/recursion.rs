//! Checks for grammars that would loop forever without consuming input.

use std::collections::HashSet;

use cranelift_entity::{EntitySet, SecondaryMap};

use crate::{
    ast::{Boundary, ExprHandle, ExprKind, Grammar, RuleHandle},
    error::{InternalError, Related, Session},
};

use super::Compilation;

#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
enum Consumes {
    #[default]
    Unknown,
    InProgress,
    Done(bool),
}

/// Answers whether an expression is guaranteed to consume input whenever it succeeds.
pub struct ConsumeCx<'a> {
    grammar: &'a Grammar,
    rules: SecondaryMap<RuleHandle, Consumes>,
    /// Set when the current answer assumed an in-progress rule doesn't consume.
    provisional: bool,
}

impl<'a> ConsumeCx<'a> {
    pub fn new(grammar: &'a Grammar) -> ConsumeCx<'a> {
        ConsumeCx {
            grammar,
            rules: SecondaryMap::new(),
            provisional: false,
        }
    }

    pub fn rule(&mut self, rule: RuleHandle) -> bool {
        match self.rules[rule] {
            Consumes::Done(result) => return result,
            Consumes::InProgress => {
                self.provisional = true;
                return false;
            }
            Consumes::Unknown => {}
        }

        let outer = std::mem::replace(&mut self.provisional, false);
        self.rules[rule] = Consumes::InProgress;
        let result = self.expr(self.grammar.rules[rule].expr);
        // answers that leaned on a rule still being computed are recomputed on the next query
        self.rules[rule] = match self.provisional {
            true => Consumes::Unknown,
            false => Consumes::Done(result),
        };
        self.provisional |= outer;
        result
    }

    pub fn expr(&mut self, expr: ExprHandle) -> bool {
        let grammar = self.grammar;
        match grammar.kind(expr) {
            ExprKind::Literal { value, .. } => !value.is_empty(),
            ExprKind::Class { .. } | ExprKind::Any => true,
            ExprKind::Sequence(elements) => elements.iter().any(|&e| self.expr(e)),
            ExprKind::Choice(alternatives) => alternatives.iter().all(|&e| self.expr(e)),
            ExprKind::Repeated {
                expr,
                min,
                max,
                delimiter,
            } => {
                let (expr, delimiter) = (*expr, *delimiter);
                let min = match min.as_ref().unwrap_or(max) {
                    Boundary::Constant(Some(min)) if *min > 0 => *min,
                    _ => return false,
                };
                self.expr(expr) || (min > 1 && delimiter.is_some_and(|d| self.expr(d)))
            }
            ExprKind::RuleRef { target, .. } => match *target {
                Some(target) => self.rule(target),
                None => false,
            },
            ExprKind::Labeled { expr, .. }
            | ExprKind::Action { expr, .. }
            | ExprKind::Named { expr, .. }
            | ExprKind::Text(expr)
            | ExprKind::OneOrMore(expr)
            | ExprKind::Group(expr) => self.expr(*expr),
            ExprKind::SimpleAnd(_)
            | ExprKind::SimpleNot(_)
            | ExprKind::SemanticAnd(_)
            | ExprKind::SemanticNot(_)
            | ExprKind::Optional(_)
            | ExprKind::ZeroOrMore(_) => false,
        }
    }
}

struct RecursionCx<'a, 'b> {
    grammar: &'a Grammar,
    consumes: &'b mut ConsumeCx<'a>,
    session: &'b Session,
    /// Rules currently being walked, outermost first.
    stack: Vec<RuleHandle>,
    /// `refs[i]` is the reference through which `stack[i]` entered the next rule.
    refs: Vec<ExprHandle>,
    /// Rules fully walked, every cycle through them has been reported.
    walked: EntitySet<RuleHandle>,
    /// Rules of each reported cycle, sorted.
    reported: HashSet<Vec<RuleHandle>>,
}

impl RecursionCx<'_, '_> {
    fn rule(&mut self, rule: RuleHandle) {
        if self.walked.contains(rule) {
            return;
        }
        self.stack.push(rule);
        self.expr(self.grammar.rules[rule].expr);
        self.stack.pop();
        self.walked.insert(rule);
    }

    fn expr(&mut self, expr: ExprHandle) {
        let grammar = self.grammar;
        match grammar.kind(expr) {
            ExprKind::Sequence(elements) => {
                for &element in elements {
                    self.expr(element);
                    if self.consumes.expr(element) {
                        break;
                    }
                }
            }
            ExprKind::Repeated {
                expr, delimiter, ..
            } => {
                self.expr(*expr);
                if let Some(delimiter) = *delimiter {
                    if !self.consumes.expr(*expr) {
                        self.expr(delimiter);
                    }
                }
            }
            ExprKind::RuleRef {
                target: Some(target),
                ..
            } => {
                let target = *target;
                self.refs.push(expr);
                match self.stack.iter().position(|&r| r == target) {
                    Some(start) => self.report(start, target),
                    None => self.rule(target),
                }
                self.refs.pop();
            }
            kind => {
                for child in kind.children() {
                    self.expr(child);
                }
            }
        }
    }

    fn report(&mut self, start: usize, target: RuleHandle) {
        let mut rules = self.stack[start..].to_vec();
        rules.sort();
        if !self.reported.insert(rules) {
            return;
        }

        let grammar = self.grammar;
        let chain = self.stack[start..]
            .iter()
            .chain([&target])
            .map(|&r| grammar.rules[r].name.as_str())
            .collect::<Vec<_>>()
            .join(" -> ");

        let refs = &self.refs[start..];
        let related = refs
            .iter()
            .enumerate()
            .map(|(i, &r)| {
                let message = if i + 1 == refs.len() {
                    format!("Step {}: call itself without input consumption - left recursion", i + 1)
                } else {
                    let callee = &grammar.rules[self.stack[start + i + 1]].name;
                    format!("Step {}: call of the rule \"{callee}\" without input consumption", i + 1)
                };
                Related::new(message, grammar.exprs[r].span)
            })
            .collect();

        self.session.error_with(
            grammar.rules[target].name_span,
            format!("Possible infinite loop when parsing (left recursion: {chain})"),
            related,
        );
    }
}

/// Reports every cycle of rules that can reach themselves without consuming input.
pub fn check_left_recursion(c: &mut Compilation, session: &Session) -> Result<(), InternalError> {
    let grammar = &c.grammar;
    let mut consumes = ConsumeCx::new(grammar);
    let mut cx = RecursionCx {
        grammar,
        consumes: &mut consumes,
        session,
        stack: Vec::new(),
        refs: Vec::new(),
        walked: EntitySet::new(),
        reported: HashSet::new(),
    };
    for (handle, _) in grammar.live_rules() {
        cx.rule(handle);
    }
    Ok(())
}

pub fn check_infinite_repetition(
    c: &mut Compilation,
    session: &Session,
) -> Result<(), InternalError> {
    let grammar = &c.grammar;
    let mut consumes = ConsumeCx::new(grammar);

    for (handle, _) in grammar.live_rules() {
        for expr in grammar.rule_exprs(handle) {
            let span = grammar.exprs[expr].span;
            match grammar.kind(expr) {
                ExprKind::ZeroOrMore(body) | ExprKind::OneOrMore(body) => {
                    if !consumes.expr(*body) {
                        session.error(
                            span,
                            "Possible infinite loop when parsing (repetition used with an expression that may not consume any input)",
                        );
                    }
                }
                ExprKind::Repeated {
                    expr: body,
                    min,
                    max,
                    delimiter,
                } => {
                    if consumes.expr(*body) || delimiter.is_some_and(|d| consumes.expr(d)) {
                        continue;
                    }
                    if max.is_unbounded() {
                        session.error(
                            span,
                            "Possible infinite loop when repeating (repetition used with an expression that may not consume any input)",
                        );
                    } else {
                        let min = min.as_ref().unwrap_or(max);
                        let message = match (min, max) {
                            (Boundary::Constant(_), Boundary::Constant(Some(max))) => format!(
                                "An expression may not consume any input and may always match {max} times"
                            ),
                            _ => "An expression may not consume any input and may always match with a maximum repetition count".to_owned(),
                        };
                        session.warning(span, message);
                    }
                }
                _ => {}
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{
        ast::{dsl::*, GrammarDef},
        backend::Compilation,
        error::{Diagnostic, Session, Severity},
        options::CompileOptions,
    };

    use super::ConsumeCx;

    fn check(def: GrammarDef, pass: crate::backend::PassFn) -> Vec<Diagnostic> {
        let mut c = Compilation::new(def.build().unwrap(), CompileOptions::default());
        let session = Session::new();
        pass(&mut c, &session).unwrap();
        session.into_diagnostics()
    }

    #[test]
    fn test_sum_left_recursion() {
        let def = GrammarDef::new()
            .rule(
                "Sum",
                choice([seq([rule_ref("Sum"), lit("+"), rule_ref("Num")]), rule_ref("Num")]),
            )
            .rule("Num", plus(class(&[('0', '9')])));
        let found = check(def, super::check_left_recursion);

        assert_eq!(found.len(), 1);
        assert_eq!(
            found[0].message,
            "Possible infinite loop when parsing (left recursion: Sum -> Sum)"
        );
        assert_eq!(
            found[0].related[0].message,
            "Step 1: call itself without input consumption - left recursion"
        );
    }

    #[test]
    fn test_indirect_left_recursion_through_optional() {
        let def = GrammarDef::new()
            .rule("Start", seq([lit("x"), rule_ref("A")]))
            .rule("A", seq([rule_ref("B"), lit("a")]))
            .rule("B", seq([opt(lit("b")), rule_ref("A")]));
        let found = check(def, super::check_left_recursion);

        assert_eq!(found.len(), 1);
        assert_eq!(
            found[0].message,
            "Possible infinite loop when parsing (left recursion: A -> B -> A)"
        );
        let steps = found[0]
            .related
            .iter()
            .map(|r| r.message.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            steps,
            vec![
                "Step 1: call of the rule \"B\" without input consumption",
                "Step 2: call itself without input consumption - left recursion",
            ]
        );
    }

    #[test]
    fn test_every_cycle_is_reported() {
        let def = GrammarDef::new()
            .rule("Start", choice([rule_ref("A"), rule_ref("C")]))
            .rule("A", choice([seq([rule_ref("B"), lit("a")]), lit("a")]))
            .rule("B", seq([rule_ref("A"), lit("b")]))
            .rule("C", seq([opt(lit("c")), rule_ref("C"), lit("c")]));
        let found = check(def, super::check_left_recursion);

        let messages = found.iter().map(|d| d.message.as_str()).collect::<Vec<_>>();
        assert_eq!(
            messages,
            vec![
                "Possible infinite loop when parsing (left recursion: A -> B -> A)",
                "Possible infinite loop when parsing (left recursion: C -> C)",
            ]
        );
    }

    #[test]
    fn test_consumed_prefix_is_not_left_recursion() {
        let def = GrammarDef::new()
            .rule("List", seq([lit("("), opt(rule_ref("List")), lit(")")]))
            .rule("Skip", seq([plus(lit(" ")), rule_ref("Skip")]));
        assert!(check(def, super::check_left_recursion).is_empty());
    }

    #[test]
    fn test_empty_literal_star() {
        let def = GrammarDef::new().rule("A", star(lit("")));
        let found = check(def, super::check_infinite_repetition);

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].severity, Severity::Error);
        assert!(found[0].message.starts_with("Possible infinite loop when parsing"));
    }

    #[test]
    fn test_bounded_repetition_only_warns() {
        let def = GrammarDef::new().rule(
            "A",
            seq([
                repeated(opt(lit("a")), Some(count(1)), count(3), None),
                repeated(opt(lit("b")), None, unbounded(), None),
                repeated(opt(lit("c")), None, unbounded(), Some(lit(","))),
            ]),
        );
        let found = check(def, super::check_infinite_repetition);

        let found = found
            .iter()
            .map(|d| (d.severity, d.message.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(
            found,
            vec![
                (
                    Severity::Warning,
                    "An expression may not consume any input and may always match 3 times"
                ),
                (
                    Severity::Error,
                    "Possible infinite loop when repeating (repetition used with an expression that may not consume any input)"
                ),
            ]
        );
    }

    #[test]
    fn test_always_consumes() {
        let grammar = GrammarDef::new()
            .rule("A", choice([lit("a"), seq([opt(lit("x")), any()])]))
            .rule("B", choice([lit("b"), lit("")]))
            .rule("C", repeated(opt(lit("c")), Some(count(2)), count(4), Some(lit(","))))
            .rule("D", repeated(lit("d"), Some(count(0)), count(4), None))
            .build()
            .unwrap();
        let mut cx = ConsumeCx::new(&grammar);
        let results = grammar
            .rules
            .keys()
            .map(|r| cx.rule(r))
            .collect::<Vec<_>>();
        assert_eq!(results, vec![true, false, true, false]);
    }
}
