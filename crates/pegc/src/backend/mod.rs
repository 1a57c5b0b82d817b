pub mod check;
pub mod inference;
pub mod proxy;
pub mod recursion;

use cranelift_entity::SecondaryMap;

use crate::{
    ast::{ExprHandle, Grammar, RuleHandle},
    bytecode::{Bytecode, Constants},
    codegen::GeneratedCode,
    error::{InternalError, Session},
    options::CompileOptions,
};

use inference::MatchResult;

/// A grammar together with everything the passes computed about it.
///
/// Built fresh for every compile call.
#[derive(Clone, Debug)]
pub struct Compilation {
    pub grammar: Grammar,
    pub options: CompileOptions,
    /// Resolved from `options.allowed_start_rules` by the check stage.
    pub start_rules: Vec<RuleHandle>,
    pub matches: SecondaryMap<ExprHandle, MatchResult>,
    /// `None` until inference reaches the rule.
    pub rule_matches: SecondaryMap<RuleHandle, Option<MatchResult>>,
    pub bytecode: SecondaryMap<RuleHandle, Bytecode>,
    pub constants: Constants,
    pub code: Option<GeneratedCode>,
}

impl Compilation {
    pub fn new(grammar: Grammar, options: CompileOptions) -> Compilation {
        Compilation {
            grammar,
            options,
            start_rules: Vec::new(),
            matches: SecondaryMap::new(),
            rule_matches: SecondaryMap::new(),
            bytecode: SecondaryMap::new(),
            constants: Constants::default(),
            code: None,
        }
    }

    pub fn rule_name(&self, rule: RuleHandle) -> &str {
        &self.grammar.rules[rule].name
    }
}

pub type PassFn = fn(&mut Compilation, &Session) -> Result<(), InternalError>;

#[derive(Clone, Copy)]
pub struct Pass {
    pub name: &'static str,
    pub run: PassFn,
}

impl Pass {
    pub const fn new(name: &'static str, run: PassFn) -> Pass {
        Pass { name, run }
    }
}

/// Passes grouped by stage, compilation stops after the check stage if it recorded an error.
#[derive(Clone)]
pub struct Passes {
    pub check: Vec<Pass>,
    pub transform: Vec<Pass>,
    pub generate: Vec<Pass>,
}

impl Default for Passes {
    fn default() -> Self {
        Passes {
            check: vec![
                Pass::new("check_start_rules", check::check_start_rules),
                Pass::new("check_undefined_rules", check::check_undefined_rules),
                Pass::new("check_duplicate_rules", check::check_duplicate_rules),
                Pass::new("check_unused_rules", check::check_unused_rules),
                Pass::new("check_labels", check::check_labels),
                Pass::new("check_repetition_bounds", check::check_repetition_bounds),
                Pass::new("check_left_recursion", recursion::check_left_recursion),
                Pass::new("check_infinite_repetition", recursion::check_infinite_repetition),
                Pass::new("check_pick", check::check_pick),
            ],
            transform: vec![
                Pass::new("remove_proxy_rules", proxy::remove_proxy_rules),
                Pass::new("infer_match_results", inference::infer_match_results),
            ],
            generate: vec![
                Pass::new("generate_bytecode", crate::bytecode::generate_bytecode),
                Pass::new("generate_rust", crate::codegen::generate_rust),
            ],
        }
    }
}

pub fn run_stage(
    stage: &str,
    passes: &[Pass],
    compilation: &mut Compilation,
    session: &Session,
) -> Result<(), InternalError> {
    log::debug!("stage {stage}");
    for pass in passes {
        log::debug!("  pass {}", pass.name);
        (pass.run)(compilation, session)?;
    }
    Ok(())
}
