use cranelift_entity::SecondaryMap;
use pegc_runtime::{CharClass, Expectation};

use crate::{
    ast::{Boundary, Code, ExprHandle, ExprKind, Grammar, RuleHandle},
    backend::{inference::MatchResult, Compilation},
    error::{InternalError, Session},
    options::OutputKind,
};

use super::{Bytecode, Constants, FunctionConst, FunctionKind, Opcode, Test};

macro_rules! code {
    ($($e:expr),* $(,)?) => {
        vec![$(u32::from($e)),*]
    };
}

/// Labels in scope, mapped to the stack slot holding their value, in binding order.
type Env = Vec<(String, i32)>;

fn bind(env: &mut Env, label: &str, slot: i32) {
    match env.iter_mut().find(|(name, _)| name == label) {
        Some(entry) => entry.1 = slot,
        None => env.push((label.to_owned(), slot)),
    }
}

/// Two-armed block, arms that can't be reached given `m` are left out along with the test.
fn cond(m: MatchResult, test: Test, then: Vec<u32>, els: Vec<u32>) -> Vec<u32> {
    match m {
        MatchResult::Always => then,
        MatchResult::Never => els,
        MatchResult::Sometimes => {
            let mut code = test.encode();
            code.push(then.len() as u32);
            code.push(els.len() as u32);
            code.extend(then);
            code.extend(els);
            code
        }
    }
}

fn while_not_error(body: Vec<u32>) -> Vec<u32> {
    let mut code = code![Opcode::WhileNotError, body.len() as u32];
    code.extend(body);
    code
}

/// `sp` is the slot on top of the stack at the point of the call.
fn call(function: u32, pop: u32, env: &Env, sp: i32) -> Result<Vec<u32>, InternalError> {
    let mut code = code![Opcode::Call, function, pop, env.len() as u32];
    for &(_, slot) in env {
        code.push(distance(sp, slot)?);
    }
    Ok(code)
}

/// How far below the top `sp` the slot lies, it must not have been popped yet.
fn distance(sp: i32, slot: i32) -> Result<u32, InternalError> {
    u32::try_from(sp - slot)
        .map_err(|_| InternalError::new(format!("slot {slot} is above the top of the stack at {sp}")))
}

struct BytecodeCx<'a> {
    grammar: &'a Grammar,
    matches: &'a SecondaryMap<ExprHandle, MatchResult>,
    constants: &'a mut Constants,
    source_map: bool,
    max_sp: i32,
}

impl<'a> BytecodeCx<'a> {
    fn rule(&mut self, rule: RuleHandle) -> Result<Bytecode, InternalError> {
        self.max_sp = 0;
        let grammar = self.grammar;
        let r = &grammar.rules[rule];
        let (mut env, mut pluck) = (Env::new(), Vec::new());
        let code = match &r.alias {
            Some(alias) => self.named(alias, r.expr, -1, &env)?,
            None => self.expr(r.expr, -1, &mut env, &mut pluck, None)?,
        };
        Ok(Bytecode {
            code,
            max_sp: self.max_sp as u32,
        })
    }

    fn function(&mut self, kind: FunctionKind, env: &Env, code: &Code) -> u32 {
        self.constants.functions.add(FunctionConst {
            kind,
            params: env.iter().map(|(name, _)| name.clone()).collect(),
            code: code.inner.clone(),
            span: code.span,
        })
    }

    /// Compiles a subexpression in its own label scope.
    fn nested(&mut self, expr: ExprHandle, sp: i32, env: &Env) -> Result<Vec<u32>, InternalError> {
        self.expr(expr, sp, &mut env.clone(), &mut Vec::new(), None)
    }

    /// Emits code leaving the expression's result in slot `sp + 1`.
    fn expr(
        &mut self,
        expr: ExprHandle,
        sp: i32,
        env: &mut Env,
        pluck: &mut Vec<i32>,
        action: Option<&'a Code>,
    ) -> Result<Vec<u32>, InternalError> {
        self.max_sp = self.max_sp.max(sp + 1);
        let code = self.expr_kind(expr, sp, env, pluck, action)?;
        if self.source_map && !code.is_empty() {
            let location = self.constants.locations.add(self.grammar.exprs[expr].span);
            let mut wrapped = code![Opcode::SourceMapPush, location];
            wrapped.extend(code);
            wrapped.push(Opcode::SourceMapPop.into());
            return Ok(wrapped);
        }
        Ok(code)
    }

    fn expr_kind(
        &mut self,
        expr: ExprHandle,
        sp: i32,
        env: &mut Env,
        pluck: &mut Vec<i32>,
        action: Option<&'a Code>,
    ) -> Result<Vec<u32>, InternalError> {
        let grammar = self.grammar;
        let m = self.matches[expr];
        let code = match grammar.kind(expr) {
            ExprKind::Choice(alternatives) => self.choice(alternatives, sp, env)?,
            // labels of a sequence end with it
            ExprKind::Sequence(elements) => {
                let mut env = env.clone();
                let mut code = code![Opcode::PushCurrPos];
                code.extend(self.elements(elements, 0, sp + 1, &mut env, &mut Vec::new(), action)?);
                code
            }
            ExprKind::Labeled { label, pick, expr } => {
                let slot = sp + 1;
                let mut inner = env.clone();
                if let Some(label) = label {
                    bind(env, label, slot);
                }
                if *pick {
                    pluck.push(slot);
                }
                self.expr(*expr, sp, &mut inner, &mut Vec::new(), None)?
            }
            ExprKind::Action { expr, code: body } => {
                let mut env = env.clone();
                if let ExprKind::Sequence(_) = grammar.kind(*expr) {
                    return self.expr(*expr, sp, &mut env, &mut Vec::new(), Some(body));
                }
                let child = self.matches[*expr];
                let mut code = code![Opcode::PushCurrPos];
                code.extend(self.expr(*expr, sp + 1, &mut env, &mut Vec::new(), None)?);
                let then = match child {
                    MatchResult::Never => Vec::new(),
                    _ => {
                        let f = self.function(FunctionKind::Action, &env, body);
                        let mut then = code![Opcode::LoadSavedPos, 1u32];
                        then.extend(call(f, 1, &env, sp + 2)?);
                        then
                    }
                };
                code.extend(cond(child, Test::IfNotError, then, Vec::new()));
                code.push(Opcode::Nip.into());
                code
            }
            ExprKind::Text(expr) => {
                let mut code = code![Opcode::PushCurrPos];
                code.extend(self.nested(*expr, sp + 1, env)?);
                code.extend(cond(
                    self.matches[*expr],
                    Test::IfNotError,
                    code![Opcode::Pop, Opcode::Text],
                    code![Opcode::Nip],
                ));
                code
            }
            ExprKind::SimpleAnd(expr) => self.simple_predicate(*expr, false, sp, env)?,
            ExprKind::SimpleNot(expr) => self.simple_predicate(*expr, true, sp, env)?,
            ExprKind::SemanticAnd(body) => self.semantic_predicate(body, false, sp, env)?,
            ExprKind::SemanticNot(body) => self.semantic_predicate(body, true, sp, env)?,
            ExprKind::Optional(expr) => {
                let mut code = self.nested(*expr, sp, env)?;
                code.extend(cond(
                    self.matches[*expr].negate(),
                    Test::IfError,
                    code![Opcode::Pop, Opcode::PushNull],
                    Vec::new(),
                ));
                code
            }
            ExprKind::ZeroOrMore(expr) => {
                let item = self.nested(*expr, sp + 1, env)?;
                let mut code = code![Opcode::PushEmptyArray];
                code.extend(item.iter().copied());
                let mut body = code![Opcode::Append];
                body.extend(item);
                code.extend(while_not_error(body));
                code.push(Opcode::Pop.into());
                code
            }
            ExprKind::OneOrMore(expr) => {
                let item = self.nested(*expr, sp + 1, env)?;
                let mut code = code![Opcode::PushEmptyArray];
                code.extend(item.iter().copied());
                let mut body = code![Opcode::Append];
                body.extend(item);
                let mut then = while_not_error(body);
                then.push(Opcode::Pop.into());
                code.extend(cond(
                    self.matches[*expr],
                    Test::IfNotError,
                    then,
                    code![Opcode::Pop, Opcode::Pop, Opcode::PushFailed],
                ));
                code
            }
            ExprKind::Repeated {
                expr,
                min,
                max,
                delimiter,
            } => self.repeated(*expr, min.as_ref(), max, *delimiter, sp, env)?,
            ExprKind::Group(expr) => self.nested(*expr, sp, env)?,
            ExprKind::RuleRef { name, target } => match target {
                Some(target) => code![Opcode::Rule, target.as_u32()],
                None => {
                    return Err(InternalError::new(format!(
                        "reference to rule \"{name}\" is unresolved"
                    )))
                }
            },
            ExprKind::Literal { value, .. } if value.is_empty() => code![Opcode::PushEmptyString],
            ExprKind::Literal { value, ignore_case } => {
                let (test, then) = match (m, *ignore_case) {
                    (MatchResult::Never, _) => (Test::MatchAny, Vec::new()),
                    (_, false) => {
                        let index = self.constants.literals.add(value.clone());
                        (Test::MatchString(index), code![Opcode::AcceptString, index])
                    }
                    (_, true) => {
                        let index = self.constants.literals.add(value.to_lowercase());
                        (Test::MatchStringIc(index), code![Opcode::AcceptStringIc, index])
                    }
                };
                let els = self.fail(m, || Expectation::literal(value.as_str(), *ignore_case));
                cond(m, test, then, els)
            }
            ExprKind::Class {
                parts,
                inverted,
                ignore_case,
            } => {
                let class = CharClass::new(parts.clone(), *inverted, *ignore_case);
                let test = match m {
                    MatchResult::Sometimes => {
                        Test::MatchCharClass(self.constants.classes.add(class.clone()))
                    }
                    _ => Test::MatchAny,
                };
                let els = self.fail(m, || Expectation::Class(class));
                cond(m, test, code![Opcode::AcceptN, 1u32], els)
            }
            ExprKind::Any => {
                let els = self.fail(m, || Expectation::Any);
                cond(m, Test::MatchAny, code![Opcode::AcceptN, 1u32], els)
            }
            ExprKind::Named { name, expr } => self.named(name, *expr, sp, env)?,
        };
        Ok(code)
    }

    /// `FAIL` arm of a terminal, nothing is interned when it can't be reached.
    fn fail(&mut self, m: MatchResult, expected: impl FnOnce() -> Expectation) -> Vec<u32> {
        match m {
            MatchResult::Always => Vec::new(),
            _ => code![Opcode::Fail, self.constants.expectations.add(expected())],
        }
    }

    fn choice(
        &mut self,
        alternatives: &[ExprHandle],
        sp: i32,
        env: &Env,
    ) -> Result<Vec<u32>, InternalError> {
        let Some((&first, rest)) = alternatives.split_first() else {
            return Err(InternalError::new("choice without alternatives"));
        };
        let mut code = self.nested(first, sp, env)?;
        if rest.is_empty() {
            return Ok(code);
        }
        let m = self.matches[first];
        let then = match m {
            MatchResult::Always => Vec::new(),
            _ => {
                let mut then = code![Opcode::Pop];
                then.extend(self.choice(rest, sp, env)?);
                then
            }
        };
        code.extend(cond(m.negate(), Test::IfError, then, Vec::new()));
        Ok(code)
    }

    /// Elements of a sequence after `done` of them matched, `sp` is the slot of the last result.
    fn elements(
        &mut self,
        elements: &[ExprHandle],
        done: u32,
        sp: i32,
        env: &mut Env,
        pluck: &mut Vec<i32>,
        action: Option<&'a Code>,
    ) -> Result<Vec<u32>, InternalError> {
        let Some((&first, rest)) = elements.split_first() else {
            if !pluck.is_empty() {
                let mut code = code![Opcode::Pluck, done + 1, pluck.len() as u32];
                for &slot in pluck.iter() {
                    code.push(distance(sp, slot)?);
                }
                return Ok(code);
            }
            if let Some(action) = action {
                let f = self.function(FunctionKind::Action, env, action);
                let mut code = code![Opcode::LoadSavedPos, done];
                code.extend(call(f, done + 1, env, sp)?);
                return Ok(code);
            }
            return Ok(code![Opcode::Wrap, done, Opcode::Nip]);
        };

        let mut code = self.expr(first, sp, env, pluck, None)?;
        let m = self.matches[first];
        let then = match m {
            MatchResult::Never => Vec::new(),
            _ => self.elements(rest, done + 1, sp + 1, env, pluck, action)?,
        };
        let els = match m {
            MatchResult::Always => Vec::new(),
            _ => {
                let mut els = match done {
                    0 => code![Opcode::Pop],
                    _ => code![Opcode::PopN, done + 1],
                };
                els.extend(code![Opcode::PopCurrPos, Opcode::PushFailed]);
                els
            }
        };
        code.extend(cond(m, Test::IfNotError, then, els));
        Ok(code)
    }

    fn simple_predicate(
        &mut self,
        expr: ExprHandle,
        negative: bool,
        sp: i32,
        env: &Env,
    ) -> Result<Vec<u32>, InternalError> {
        let m = self.matches[expr];
        let mut code = code![Opcode::PushCurrPos, Opcode::SilentFailsOn];
        code.extend(self.nested(expr, sp + 1, env)?);
        code.push(Opcode::SilentFailsOff.into());
        let (m, test, then, els) = match negative {
            false => (
                m,
                Test::IfNotError,
                code![Opcode::Pop, Opcode::PopCurrPos, Opcode::PushNull],
                code![Opcode::Pop, Opcode::Pop, Opcode::PushFailed],
            ),
            true => (
                m.negate(),
                Test::IfError,
                code![Opcode::Pop, Opcode::Pop, Opcode::PushNull],
                code![Opcode::Pop, Opcode::PopCurrPos, Opcode::PushFailed],
            ),
        };
        code.extend(cond(m, test, then, els));
        Ok(code)
    }

    fn semantic_predicate(
        &mut self,
        body: &Code,
        negative: bool,
        sp: i32,
        env: &Env,
    ) -> Result<Vec<u32>, InternalError> {
        let f = self.function(FunctionKind::Predicate, env, body);
        let mut code = code![Opcode::UpdateSavedPos];
        code.extend(call(f, 0, env, sp)?);
        let (pass, reject) = match negative {
            false => (Opcode::PushNull, Opcode::PushFailed),
            true => (Opcode::PushFailed, Opcode::PushNull),
        };
        code.extend(cond(
            MatchResult::Sometimes,
            Test::If,
            code![Opcode::Pop, pass],
            code![Opcode::Pop, reject],
        ));
        Ok(code)
    }

    fn named(
        &mut self,
        name: &str,
        expr: ExprHandle,
        sp: i32,
        env: &Env,
    ) -> Result<Vec<u32>, InternalError> {
        let m = self.matches[expr];
        let mut code = code![Opcode::SilentFailsOn];
        code.extend(self.nested(expr, sp, env)?);
        code.push(Opcode::SilentFailsOff.into());
        let then = match m {
            MatchResult::Always => Vec::new(),
            _ => {
                let expected = self.constants.expectations.add(Expectation::other(name));
                code![Opcode::Pop, Opcode::Fail, expected]
            }
        };
        code.extend(cond(m.negate(), Test::IfError, then, Vec::new()));
        Ok(code)
    }

    /// Slot holding a boundary's count, function boundaries are evaluated into a fresh slot.
    fn boundary(
        &mut self,
        boundary: &Boundary,
        env: &Env,
        top: &mut i32,
        pre: &mut Vec<u32>,
        post: &mut Vec<u32>,
    ) -> Result<Option<i32>, InternalError> {
        match boundary {
            Boundary::Constant(_) => Ok(None),
            Boundary::Variable(label) => match env.iter().find(|(name, _)| *name == label.inner) {
                Some(&(_, slot)) => Ok(Some(slot)),
                None => Err(InternalError::new(format!(
                    "label \"{}\" of a repetition count is not in scope",
                    label.inner
                ))),
            },
            Boundary::Function(code) => {
                let f = self.function(FunctionKind::Boundary, env, code);
                pre.extend(call(f, 0, env, *top)?);
                post.push(Opcode::Nip.into());
                *top += 1;
                self.max_sp = self.max_sp.max(*top);
                Ok(Some(*top))
            }
        }
    }

    fn repeated(
        &mut self,
        expr: ExprHandle,
        min: Option<&Boundary>,
        max: &Boundary,
        delimiter: Option<ExprHandle>,
        sp: i32,
        env: &Env,
    ) -> Result<Vec<u32>, InternalError> {
        let (mut pre, mut post) = (Vec::new(), Vec::new());
        let mut top = sp;
        let min_slot = match min {
            Some(min) => self.boundary(min, env, &mut top, &mut pre, &mut post)?,
            None => None,
        };
        let max_slot = self.boundary(max, env, &mut top, &mut pre, &mut post)?;
        // no minimum means exactly `max` items
        let (min, min_slot) = match min {
            Some(min) => (min, min_slot),
            None => (max, max_slot),
        };

        let has_min = !matches!(min, Boundary::Constant(None | Some(0)));
        // the start position sits below the array when a short result has to be undone
        let array = top + if has_min { 2 } else { 1 };

        let first = self.nested(expr, array, env)?;
        let item = match delimiter {
            Some(delimiter) => {
                let (md, me) = (self.matches[delimiter], self.matches[expr]);
                let mut code = code![Opcode::PushCurrPos];
                code.extend(self.nested(delimiter, array + 1, env)?);
                let then = match md {
                    MatchResult::Never => Vec::new(),
                    _ => {
                        let mut then = code![Opcode::Pop];
                        then.extend(self.nested(expr, array + 1, env)?);
                        then.extend(cond(
                            me.negate(),
                            Test::IfError,
                            code![Opcode::Pop, Opcode::PopCurrPos, Opcode::PushFailed],
                            code![Opcode::Nip],
                        ));
                        then
                    }
                };
                let els = match md {
                    MatchResult::Always => Vec::new(),
                    _ => code![Opcode::Nip],
                };
                code.extend(cond(md, Test::IfNotError, then, els));
                code
            }
            None => first.clone(),
        };

        let max_test = match (max, max_slot) {
            (Boundary::Constant(None), _) => None,
            (Boundary::Constant(Some(n)), _) => Some(Test::IfGe(*n)),
            (_, Some(slot)) => Some(Test::IfGeDynamic(distance(array, slot)?)),
            (_, None) => return Err(InternalError::new("repetition maximum has no slot")),
        };
        let check_max = |code: Vec<u32>| match max_test {
            Some(test) => cond(MatchResult::Sometimes, test, code![Opcode::PushFailed], code),
            None => code,
        };

        let mut code = pre;
        if has_min {
            code.push(Opcode::PushCurrPos.into());
        }
        code.push(Opcode::PushEmptyArray.into());
        code.extend(check_max(first));
        let mut body = code![Opcode::Append];
        body.extend(check_max(item));
        code.extend(while_not_error(body));
        code.push(Opcode::Pop.into());

        if has_min {
            let test = match (min, min_slot) {
                (Boundary::Constant(n), _) => Test::IfLt(n.unwrap_or(0)),
                (_, Some(slot)) => Test::IfLtDynamic(distance(array, slot)?),
                (_, None) => return Err(InternalError::new("repetition minimum has no slot")),
            };
            code.extend(cond(
                MatchResult::Sometimes,
                test,
                code![Opcode::Pop, Opcode::PopCurrPos, Opcode::PushFailed],
                code![Opcode::Nip],
            ));
        }
        code.extend(post);
        Ok(code)
    }
}

/// Compiles every live rule, filling the constant pools in rule order.
pub fn generate_bytecode(c: &mut Compilation, _: &Session) -> Result<(), InternalError> {
    let Compilation {
        grammar,
        options,
        matches,
        bytecode,
        constants,
        ..
    } = c;
    let grammar = &*grammar;
    let mut cx = BytecodeCx {
        grammar,
        matches,
        constants,
        source_map: options.output == OutputKind::SourceAndMap,
        max_sp: 0,
    };
    for (handle, rule) in grammar.live_rules() {
        let code = cx.rule(handle)?;
        log::trace!(
            "rule {} compiled to {} words, max_sp {}",
            rule.name,
            code.code.len(),
            code.max_sp
        );
        bytecode[handle] = code;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{
        ast::{dsl::*, GrammarDef},
        backend::{check::check_start_rules, inference::infer_match_results, Compilation},
        bytecode::{FunctionKind, Opcode::*},
        error::Session,
        options::CompileOptions,
    };

    fn compile(def: GrammarDef) -> Compilation {
        let mut c = Compilation::new(def.build().unwrap(), CompileOptions::default());
        let session = Session::new();
        check_start_rules(&mut c, &session).unwrap();
        infer_match_results(&mut c, &session).unwrap();
        super::generate_bytecode(&mut c, &session).unwrap();
        c
    }

    fn first_rule(c: &Compilation) -> &super::Bytecode {
        let (handle, _) = c.grammar.live_rules().next().unwrap();
        &c.bytecode[handle]
    }

    #[test]
    fn test_literal() {
        let c = compile(GrammarDef::new().rule("start", lit("a")));
        let bytecode = first_rule(&c);
        assert_eq!(
            bytecode.code,
            code![MatchString, 0u32, 2u32, 2u32, AcceptString, 0u32, Fail, 0u32]
        );
        assert_eq!(bytecode.max_sp, 0);
        assert_eq!(c.constants.literals.get(0).map(String::as_str), Some("a"));
    }

    #[test]
    fn test_sequence() {
        let c = compile(GrammarDef::new().rule("Start", seq([lit("a"), lit("b")])));
        let bytecode = first_rule(&c);

        let mut second = code![MatchString, 1u32, 2u32, 2u32, AcceptString, 1u32, Fail, 1u32];
        second.extend(code![IfNotError, 3u32, 4u32, Wrap, 2u32, Nip]);
        second.extend(code![PopN, 2u32, PopCurrPos, PushFailed]);
        let mut expected = code![PushCurrPos];
        expected.extend(code![MatchString, 0u32, 2u32, 2u32, AcceptString, 0u32, Fail, 0u32]);
        expected.extend(code![IfNotError, second.len() as u32, 3u32]);
        expected.extend(second);
        expected.extend(code![Pop, PopCurrPos, PushFailed]);

        assert_eq!(bytecode.code, expected);
        assert_eq!(bytecode.max_sp, 2);
    }

    #[test]
    fn test_always_matching_alternative_ends_choice() {
        let c = compile(GrammarDef::new().rule("A", choice([lit(""), lit("b")])));
        assert_eq!(first_rule(&c).code, code![PushEmptyString]);
        assert!(c.constants.literals.is_empty());
        assert!(c.constants.expectations.is_empty());
    }

    #[test]
    fn test_shared_constants() {
        let c = compile(
            GrammarDef::new()
                .rule("A", seq([lit("x"), rule_ref("B"), lit("x")]))
                .rule("B", choice([lit("x"), class(&[('0', '9')]), class(&[('0', '9')])])),
        );
        assert_eq!(c.constants.literals.len(), 1);
        assert_eq!(c.constants.classes.len(), 1);
        assert_eq!(c.constants.expectations.len(), 2);
    }

    #[test]
    fn test_action_parameters() {
        let c = compile(GrammarDef::new().rule(
            "A",
            choice([
                action(seq([label("a", lit("x")), label("b", lit("y"))]), "a + b"),
                action(label("c", lit("z")), "c"),
                seq([label("d", lit("w")), sem_and("d.is_empty()")]),
            ]),
        ));
        let functions = c
            .constants
            .functions
            .iter()
            .map(|(_, f)| (f.kind, f.params.join(",")))
            .collect::<Vec<_>>();
        assert_eq!(
            functions,
            vec![
                (FunctionKind::Action, "a,b".to_owned()),
                (FunctionKind::Action, "c".to_owned()),
                (FunctionKind::Predicate, "d".to_owned()),
            ]
        );
    }

    #[test]
    fn test_inner_labels_end_with_their_sequence() {
        let c = compile(
            GrammarDef::new()
                .rule(
                    "A",
                    action(seq([lit("a"), seq([label("x", lit("b"))])]), "x"),
                )
                .rule(
                    "B",
                    action(named("pair", seq([label("y", lit("a")), lit("b")])), "y"),
                )
                .rule(
                    "C",
                    action(seq([label("z", lit("a")), named("b", seq([lit("b")]))]), "z"),
                ),
        );
        let params = c
            .constants
            .functions
            .iter()
            .map(|(_, f)| f.params.join(","))
            .collect::<Vec<_>>();
        assert_eq!(params, vec!["", "", "z"]);
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let def = || {
            GrammarDef::new()
                .rule("A", seq([star(rule_ref("B")), lit_ic("end")]))
                .rule("B", repeated(class(&[('a', 'z')]), Some(count(1)), count(3), Some(lit(","))))
        };
        let (a, b) = (compile(def()), compile(def()));
        for (handle, _) in a.grammar.live_rules() {
            assert_eq!(a.bytecode[handle], b.bytecode[handle]);
        }
        assert_eq!(
            super::super::display(&a).unwrap(),
            super::super::display(&b).unwrap()
        );
    }
}
