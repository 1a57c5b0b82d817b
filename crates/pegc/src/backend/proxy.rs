use crate::{
    ast::{ExprKind, RuleHandle},
    error::{InternalError, Related, Session},
};

use super::Compilation;

/// Target of a rule whose whole body is a reference to another rule.
fn proxy_target(c: &Compilation, rule: RuleHandle) -> Option<RuleHandle> {
    let r = &c.grammar.rules[rule];
    match c.grammar.kind(r.expr) {
        ExprKind::RuleRef {
            target: Some(to), ..
        } if r.alias.is_none() && *to != rule => Some(*to),
        _ => None,
    }
}

/// Points references to proxy rules straight at their targets and drops the proxies.
///
/// Proxies are looked at in declaration order against their current body, a chain of proxies
/// collapses within one run no matter how the rules are ordered.
pub fn remove_proxy_rules(c: &mut Compilation, session: &Session) -> Result<(), InternalError> {
    let rules = c.grammar.live_rules().map(|(h, _)| h).collect::<Vec<_>>();
    let mut removed = Vec::new();

    for &proxy in &rules {
        let Some(to) = proxy_target(c, proxy) else {
            continue;
        };
        let from_name = c.grammar.rules[proxy].name.clone();
        let to_name = c.grammar.rules[to].name.clone();
        let to_span = c.grammar.rules[to].name_span;

        for &rule in &rules {
            for expr in c.grammar.rule_exprs(rule) {
                let expr = &mut c.grammar.exprs[expr];
                if let ExprKind::RuleRef { name, target } = &mut expr.kind {
                    if *target == Some(proxy) {
                        *name = to_name.clone();
                        *target = Some(to);
                        session.info(
                            expr.span,
                            format!("Proxy rule \"{from_name}\" replaced by the rule \"{to_name}\""),
                            vec![Related::new("This rule will be used", to_span)],
                        );
                    }
                }
            }
        }

        if !c.start_rules.contains(&proxy) {
            removed.push(proxy);
        }
    }

    for rule in removed {
        log::debug!("removing proxy rule {}", c.grammar.rules[rule].name);
        c.grammar.remove_rule(rule);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{
        ast::{dsl::*, GrammarDef},
        backend::{check::check_start_rules, Compilation},
        error::{Session, Severity},
        options::CompileOptions,
    };

    fn run(def: GrammarDef, options: CompileOptions) -> (Compilation, Session) {
        let mut c = Compilation::new(def.build().unwrap(), options);
        let session = Session::new();
        check_start_rules(&mut c, &session).unwrap();
        super::remove_proxy_rules(&mut c, &session).unwrap();
        (c, session)
    }

    #[test]
    fn test_chain_collapses_in_one_run() {
        // declared against the direction of the chain
        let def = GrammarDef::new()
            .rule("Start", seq([rule_ref("A"), rule_ref("B")]))
            .rule("B", rule_ref("C"))
            .rule("A", rule_ref("B"))
            .rule("C", lit("c"));
        let (c, session) = run(def, CompileOptions::default());

        assert_eq!(c.grammar.display().to_string(), "Start = C C\nC = \"c\"\n");
        let diagnostics = session.into_diagnostics();
        assert!(diagnostics.iter().all(|d| d.severity == Severity::Info));
        assert_eq!(
            diagnostics[0].message,
            "Proxy rule \"B\" replaced by the rule \"C\""
        );
        assert_eq!(diagnostics[0].related[0].message, "This rule will be used");
    }

    #[test]
    fn test_start_proxy_is_kept() {
        let def = GrammarDef::new()
            .rule("Start", rule_ref("Other"))
            .rule("Other", lit("x"));
        let (c, _) = run(def, CompileOptions::default());

        assert_eq!(c.grammar.live_rules().count(), 2);
    }

    #[test]
    fn test_aliased_rule_is_not_a_proxy() {
        let def = GrammarDef::new()
            .rule("Start", rule_ref("Number"))
            .aliased_rule("Number", "number", rule_ref("Digits"))
            .rule("Digits", plus(class(&[('0', '9')])));
        let (c, session) = run(def, CompileOptions::default());

        assert_eq!(c.grammar.live_rules().count(), 3);
        assert!(session.diagnostics().is_empty());
    }
}
