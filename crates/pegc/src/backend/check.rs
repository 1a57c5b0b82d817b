//! Structural checks over the grammar. Every check records into the session and keeps going,
//! errors are acted upon once the whole stage ran.

use std::collections::{hash_map::Entry, HashMap};

use cranelift_entity::EntitySet;

use crate::{
    ast::{Boundary, ExprHandle, ExprKind, Grammar},
    error::{InternalError, Related, Session},
    span::Span,
};

use super::Compilation;

pub fn check_start_rules(c: &mut Compilation, session: &Session) -> Result<(), InternalError> {
    let names = &c.options.allowed_start_rules;

    c.start_rules = if names.is_empty() {
        c.grammar.live_rules().map(|(handle, _)| handle).take(1).collect()
    } else if names.iter().any(|n| n == "*") {
        c.grammar.live_rules().map(|(handle, _)| handle).collect()
    } else {
        let mut rules = Vec::new();
        for name in names {
            match c.grammar.rule_by_name(name) {
                Some(handle) if !rules.contains(&handle) => rules.push(handle),
                Some(_) => {}
                None => session.error(Span::empty(), format!("Unknown start rule \"{name}\"")),
            }
        }
        rules
    };

    if c.grammar.live_rules().next().is_none() {
        session.error(Span::empty(), "Grammar must contain at least one rule");
    }
    Ok(())
}

pub fn check_undefined_rules(c: &mut Compilation, session: &Session) -> Result<(), InternalError> {
    let grammar = &c.grammar;
    for (handle, _) in grammar.live_rules() {
        for expr in grammar.rule_exprs(handle) {
            if let ExprKind::RuleRef { name, target: None } = grammar.kind(expr) {
                session.error(
                    grammar.exprs[expr].span,
                    format!("Rule \"{name}\" is not defined"),
                );
            }
        }
    }
    Ok(())
}

pub fn check_duplicate_rules(c: &mut Compilation, session: &Session) -> Result<(), InternalError> {
    let mut seen: HashMap<&str, Span> = HashMap::new();
    for (_, rule) in c.grammar.live_rules() {
        match seen.entry(rule.name.as_str()) {
            Entry::Occupied(original) => session.error_with(
                rule.name_span,
                format!("Rule \"{}\" is already defined", rule.name),
                vec![Related::new("Original rule location", *original.get())],
            ),
            Entry::Vacant(v) => {
                v.insert(rule.name_span);
            }
        }
    }
    Ok(())
}

pub fn check_unused_rules(c: &mut Compilation, session: &Session) -> Result<(), InternalError> {
    let grammar = &c.grammar;
    let mut used = EntitySet::new();
    for &start in &c.start_rules {
        used.insert(start);
    }
    for (handle, _) in grammar.live_rules() {
        for expr in grammar.rule_exprs(handle) {
            if let ExprKind::RuleRef {
                target: Some(target),
                ..
            } = grammar.kind(expr)
            {
                used.insert(*target);
            }
        }
    }
    for (handle, rule) in grammar.live_rules() {
        if !used.contains(handle) {
            session.warning(
                rule.name_span,
                format!("Rule \"{}\" is not referenced", rule.name),
            );
        }
    }
    Ok(())
}

/// Labels visible at some point of a rule, with where they were defined.
type Scope = HashMap<String, Span>;

struct LabelCx<'a> {
    grammar: &'a Grammar,
    reserved: &'a [String],
    session: &'a Session,
}

impl LabelCx<'_> {
    fn nested(&self, expr: ExprHandle, scope: &Scope) {
        self.expr(expr, &mut scope.clone());
    }

    fn expr(&self, expr: ExprHandle, scope: &mut Scope) {
        match self.grammar.kind(expr) {
            ExprKind::Choice(alternatives) => {
                for &alt in alternatives {
                    self.nested(alt, scope);
                }
            }
            // labels of earlier elements are visible in later ones, none outlive the sequence
            ExprKind::Sequence(elements) => {
                let mut scope = scope.clone();
                for &element in elements {
                    self.expr(element, &mut scope);
                }
            }
            ExprKind::Labeled { label, expr, .. } => {
                self.nested(*expr, scope);
                let Some(label) = label else {
                    return;
                };
                if self.reserved.iter().any(|w| *w == label.inner) {
                    self.session.error(
                        label.span,
                        format!("Label can't be a reserved word \"{}\"", label.inner),
                    );
                }
                match scope.entry(label.inner.clone()) {
                    Entry::Occupied(original) => self.session.error_with(
                        label.span,
                        format!("Label \"{}\" is already defined", label.inner),
                        vec![Related::new("Original label location", *original.get())],
                    ),
                    Entry::Vacant(v) => {
                        v.insert(label.span);
                    }
                }
            }
            ExprKind::Repeated {
                expr,
                min,
                max,
                delimiter,
            } => {
                for boundary in min.iter().chain([max]) {
                    if let Boundary::Variable(label) = boundary {
                        if !scope.contains_key(&label.inner) {
                            self.session.error(
                                label.span,
                                format!("Label \"{}\" is not defined", label.inner),
                            );
                        }
                    }
                }
                if let Some(delimiter) = delimiter {
                    self.nested(*delimiter, scope);
                }
                self.nested(*expr, scope);
            }
            kind => {
                for child in kind.children() {
                    self.nested(child, scope);
                }
            }
        }
    }
}

/// Duplicate labels within one scope, reserved words and repetition counts naming unknown labels.
pub fn check_labels(c: &mut Compilation, session: &Session) -> Result<(), InternalError> {
    let cx = LabelCx {
        grammar: &c.grammar,
        reserved: &c.options.reserved_words,
        session,
    };
    for (_, rule) in c.grammar.live_rules() {
        cx.expr(rule.expr, &mut Scope::new());
    }
    Ok(())
}

pub fn check_repetition_bounds(
    c: &mut Compilation,
    session: &Session,
) -> Result<(), InternalError> {
    let grammar = &c.grammar;
    for (handle, _) in grammar.live_rules() {
        for expr in grammar.rule_exprs(handle) {
            let ExprKind::Repeated { min, max, .. } = grammar.kind(expr) else {
                continue;
            };
            let span = grammar.exprs[expr].span;
            match (min.as_ref().and_then(Boundary::constant), max.constant()) {
                (_, Some(Some(0))) => session.error(
                    span,
                    "The maximum count of repetitions of the rule must be > 0",
                ),
                (Some(Some(min)), Some(Some(max))) if min > max => session.error(
                    span,
                    format!(
                        "The minimum count of repetitions of the rule ({min}) must be <= the maximum count ({max})"
                    ),
                ),
                _ => {}
            }
        }
    }
    Ok(())
}

/// A labeled element marked with `@` can't also have an action attached.
pub fn check_pick(c: &mut Compilation, session: &Session) -> Result<(), InternalError> {
    let grammar = &c.grammar;
    for (handle, _) in grammar.live_rules() {
        for expr in grammar.rule_exprs(handle) {
            let ExprKind::Action { expr: body, code } = grammar.kind(expr) else {
                continue;
            };
            let elements = match grammar.kind(*body) {
                ExprKind::Sequence(elements) => elements.as_slice(),
                _ => std::slice::from_ref(body),
            };
            for &element in elements {
                if let ExprKind::Labeled {
                    pick: true, label, ..
                } = grammar.kind(element)
                {
                    let span = match label {
                        Some(label) => label.span,
                        None => grammar.exprs[element].span,
                    };
                    session.error_with(
                        span,
                        "\"@\" cannot be used with an action block",
                        vec![Related::new("Action block location", code.span)],
                    );
                }
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
        error::{Session, Severity},
        options::CompileOptions,
    };

    fn run(
        def: GrammarDef,
        options: CompileOptions,
        pass: super::super::PassFn,
    ) -> Vec<(Severity, String)> {
        let mut c = Compilation::new(def.build().unwrap(), options);
        let session = Session::new();
        super::check_start_rules(&mut c, &session).unwrap();
        let start = session.diagnostics().len();
        pass(&mut c, &session).unwrap();
        let diagnostics = session.into_diagnostics();
        diagnostics[start..]
            .iter()
            .map(|d| (d.severity, d.message.clone()))
            .collect()
    }

    #[test]
    fn test_undefined_rule() {
        let def = GrammarDef::new().rule("Start", seq([lit("a"), rule_ref("B")]));
        let found = run(def, CompileOptions::default(), super::check_undefined_rules);
        assert_eq!(found, vec![(Severity::Error, "Rule \"B\" is not defined".to_owned())]);
    }

    #[test]
    fn test_duplicate_rule_points_at_original() {
        let def = GrammarDef::new()
            .rule("A", lit("a"))
            .rule("B", rule_ref("A"))
            .rule("A", lit("b"));
        let mut c = Compilation::new(def.build().unwrap(), CompileOptions::default());
        let session = Session::new();
        super::check_duplicate_rules(&mut c, &session).unwrap();

        let diagnostics = session.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].message, "Rule \"A\" is already defined");
        assert_eq!(diagnostics[0].related[0].message, "Original rule location");
    }

    #[test]
    fn test_unknown_start_rule() {
        let def = GrammarDef::new().rule("A", lit("a"));
        let mut c = Compilation::new(
            def.build().unwrap(),
            CompileOptions::default().with_start_rules(&["A", "Nope"]),
        );
        let session = Session::new();
        super::check_start_rules(&mut c, &session).unwrap();
        assert_eq!(c.start_rules.len(), 1);
        assert_eq!(session.diagnostics()[0].message, "Unknown start rule \"Nope\"");
    }

    #[test]
    fn test_wildcard_start_rules() {
        let def = GrammarDef::new().rule("A", lit("a")).rule("B", lit("b"));
        let mut c = Compilation::new(
            def.build().unwrap(),
            CompileOptions::default().with_start_rules(&["*"]),
        );
        let session = Session::new();
        super::check_start_rules(&mut c, &session).unwrap();
        assert_eq!(c.start_rules.len(), 2);
    }

    #[test]
    fn test_unused_rule_warning() {
        let def = GrammarDef::new()
            .rule("Start", rule_ref("Used"))
            .rule("Used", lit("a"))
            .rule("Unused", lit("b"));
        let found = run(def, CompileOptions::default(), super::check_unused_rules);
        assert_eq!(
            found,
            vec![(Severity::Warning, "Rule \"Unused\" is not referenced".to_owned())]
        );
    }

    #[test]
    fn test_duplicate_labels_follow_scopes() {
        // the same label in different alternatives is fine
        let ok = GrammarDef::new().rule(
            "A",
            choice([
                seq([label("x", lit("a")), lit("b")]),
                seq([label("x", lit("c"))]),
            ]),
        );
        assert!(run(ok, CompileOptions::default(), super::check_labels).is_empty());

        // a label can't be redefined later in the sequence or in a nested scope
        let bad = GrammarDef::new().rule(
            "A",
            seq([
                label("x", lit("a")),
                label("x", lit("b")),
                group(seq([label("x", lit("c"))])),
            ]),
        );
        let found = run(bad, CompileOptions::default(), super::check_labels);
        assert_eq!(found.len(), 2);
        assert!(found
            .iter()
            .all(|(_, m)| m == "Label \"x\" is already defined"));
    }

    #[test]
    fn test_inner_sequence_labels_are_not_visible_later() {
        // `n` is bound inside the nested sequence and named expression only
        let def = GrammarDef::new().rule(
            "A",
            seq([
                seq([label("n", rule_ref("A"))]),
                named("count", seq([label("m", rule_ref("A"))])),
                repeated(lit("x"), None, count_of("n"), None),
                repeated(lit("y"), None, count_of("m"), None),
                label("n", lit("z")),
            ]),
        );
        let found = run(def, CompileOptions::default(), super::check_labels);
        assert_eq!(
            found,
            vec![
                (Severity::Error, "Label \"n\" is not defined".to_owned()),
                (Severity::Error, "Label \"m\" is not defined".to_owned()),
            ]
        );
    }

    #[test]
    fn test_reserved_label() {
        let def = GrammarDef::new().rule("A", seq([label("fn", lit("a"))]));
        let found = run(def, CompileOptions::default(), super::check_labels);
        assert_eq!(
            found,
            vec![(Severity::Error, "Label can't be a reserved word \"fn\"".to_owned())]
        );
    }

    #[test]
    fn test_repetition_label_must_be_visible() {
        let def = GrammarDef::new().rule(
            "A",
            seq([
                label("n", rule_ref("A")),
                repeated(lit("x"), None, count_of("n"), None),
                repeated(lit("y"), None, count_of("m"), None),
            ]),
        );
        let found = run(def, CompileOptions::default(), super::check_labels);
        assert_eq!(
            found,
            vec![(Severity::Error, "Label \"m\" is not defined".to_owned())]
        );
    }

    #[test]
    fn test_repetition_bounds() {
        let def = GrammarDef::new().rule(
            "A",
            seq([
                repeated(lit("x"), None, count(0), None),
                repeated(lit("y"), Some(count(3)), count(2), None),
                repeated(lit("z"), Some(count(0)), count(2), None),
            ]),
        );
        let found = run(def, CompileOptions::default(), super::check_repetition_bounds);
        assert_eq!(found.len(), 2);
        assert_eq!(
            found[0].1,
            "The maximum count of repetitions of the rule must be > 0"
        );
    }

    #[test]
    fn test_pick_with_action() {
        let def = GrammarDef::new()
            .rule("A", action(seq([lit("("), pick(lit("a")), lit(")")]), "x"))
            .rule("B", seq([lit("("), pick(lit("a")), lit(")")]));
        let found = run(def, CompileOptions::default(), super::check_pick);
        assert_eq!(
            found,
            vec![(Severity::Error, "\"@\" cannot be used with an action block".to_owned())]
        );
    }
}
