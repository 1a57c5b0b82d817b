//! Re-derives block structure from a rule's bytecode and renders it as Rust statements.
//!
//! The stack is simulated a second time, independent of the bytecode compiler, to name the
//! local holding every slot. Any disagreement between the two is a compiler defect.

use cranelift_bitset::CompoundBitSet;

use crate::{
    backend::Compilation,
    bytecode::{instructions, FunctionKind, Instr, Test},
    error::InternalError,
};

use super::render::CodeWriter;

/// Slots holding input positions become `p{n}: usize`, the rest are `s{n}: Value`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SlotKind {
    Pos,
    Value,
}

impl SlotKind {
    fn prefix(self) -> char {
        match self {
            SlotKind::Pos => 'p',
            SlotKind::Value => 's',
        }
    }
}

pub struct RuleBody<'a> {
    c: &'a Compilation,
    rule: &'a str,
    stack: Vec<SlotKind>,
    /// Highest slot the bytecode compiler said the code uses.
    limit: usize,
    used_pos: CompoundBitSet,
    used_values: CompoundBitSet,
}

impl<'a> RuleBody<'a> {
    pub fn new(c: &'a Compilation, rule: &'a str, max_sp: u32) -> RuleBody<'a> {
        RuleBody {
            c,
            rule,
            stack: Vec::new(),
            limit: max_sp as usize,
            used_pos: CompoundBitSet::new(),
            used_values: CompoundBitSet::new(),
        }
    }

    fn error(&self, message: impl std::fmt::Display) -> InternalError {
        InternalError::new(format!("in rule \"{}\": {message}", self.rule))
    }

    fn top(&self) -> Result<usize, InternalError> {
        match self.stack.len() {
            0 => Err(self.error("stack underflow")),
            n => Ok(n - 1),
        }
    }

    /// Slot `distance` below the top, which must hold a `kind`.
    fn slot(&self, distance: u32, kind: SlotKind) -> Result<String, InternalError> {
        let top = self.top()?;
        let index = top
            .checked_sub(distance as usize)
            .ok_or_else(|| self.error(format!("slot {distance} below the top is out of range")))?;
        if self.stack[index] != kind {
            return Err(self.error(format!(
                "slot {index} holds a {:?} where a {kind:?} is expected",
                self.stack[index]
            )));
        }
        Ok(format!("{}{index}", kind.prefix()))
    }

    fn push(&mut self, kind: SlotKind) -> Result<String, InternalError> {
        let index = self.stack.len();
        if index > self.limit {
            return Err(self.error(format!(
                "stack grows to slot {index} beyond the compiled maximum {}",
                self.limit
            )));
        }
        self.stack.push(kind);
        match kind {
            SlotKind::Pos => self.used_pos.insert(index),
            SlotKind::Value => self.used_values.insert(index),
        };
        Ok(format!("{}{index}", kind.prefix()))
    }

    fn pop(&mut self, count: u32) -> Result<(), InternalError> {
        let count = count as usize;
        if count > self.stack.len() {
            return Err(self.error("stack underflow"));
        }
        self.stack.truncate(self.stack.len() - count);
        Ok(())
    }

    /// Declarations of every local the body assigned, positions first.
    pub fn declarations(&self, w: &mut CodeWriter) {
        for index in self.used_pos.iter() {
            w.line(format!("let mut p{index}: usize = 0;"));
        }
        for index in self.used_values.iter() {
            w.line(format!("let mut s{index} = Value::Null;"));
        }
    }

    /// Renders a whole rule body, which has to leave exactly its result in `s0`.
    pub fn render(&mut self, code: &[u32], w: &mut CodeWriter) -> Result<(), InternalError> {
        self.block(code, w)?;
        match self.stack.as_slice() {
            [SlotKind::Value] => Ok(()),
            other => Err(self.error(format!("rule leaves {other:?} on the stack"))),
        }
    }

    fn block(&mut self, code: &[u32], w: &mut CodeWriter) -> Result<(), InternalError> {
        for instr in instructions(code) {
            self.instr(instr?, w)?;
        }
        Ok(())
    }

    fn instr(&mut self, instr: Instr<'_>, w: &mut CodeWriter) -> Result<(), InternalError> {
        match instr {
            Instr::PushEmptyString => {
                let s = self.push(SlotKind::Value)?;
                w.line(format!("{s} = Value::Str(String::new());"));
            }
            Instr::PushNull => {
                let s = self.push(SlotKind::Value)?;
                w.line(format!("{s} = Value::Null;"));
            }
            Instr::PushFailed => {
                let s = self.push(SlotKind::Value)?;
                w.line(format!("{s} = Value::Failed;"));
            }
            Instr::PushEmptyArray => {
                let s = self.push(SlotKind::Value)?;
                w.line(format!("{s} = Value::Array(Vec::new());"));
            }
            Instr::PushCurrPos => {
                let p = self.push(SlotKind::Pos)?;
                w.line(format!("{p} = self.st.pos;"));
            }
            Instr::Pop => self.pop(1)?,
            Instr::PopCurrPos => {
                let p = self.slot(0, SlotKind::Pos)?;
                w.line(format!("self.st.pos = {p};"));
                self.pop(1)?;
            }
            Instr::PopN(n) => self.pop(n)?,
            Instr::Nip => {
                let top = self.top()?;
                let kind = self.stack[top];
                let from = self.slot(0, kind)?;
                self.pop(2)?;
                let to = self.push(kind)?;
                match kind {
                    SlotKind::Pos => w.line(format!("{to} = {from};")),
                    SlotKind::Value => w.line(format!("{to} = std::mem::take(&mut {from});")),
                }
            }
            Instr::Append => {
                let item = self.slot(0, SlotKind::Value)?;
                let array = self.slot(1, SlotKind::Value)?;
                w.line(format!("{array}.push(std::mem::take(&mut {item}));"));
                self.pop(1)?;
            }
            Instr::Wrap(n) => {
                let items = (0..n)
                    .rev()
                    .map(|d| Ok(format!("std::mem::take(&mut {})", self.slot(d, SlotKind::Value)?)))
                    .collect::<Result<Vec<_>, InternalError>>()?;
                self.pop(n)?;
                let s = self.push(SlotKind::Value)?;
                w.line(format!("{s} = Value::Array(vec![{}]);", items.join(", ")));
            }
            Instr::Text => {
                let p = self.slot(0, SlotKind::Pos)?;
                self.pop(1)?;
                let s = self.push(SlotKind::Value)?;
                w.line(format!("{s} = self.st.text({p});"));
            }
            Instr::Pluck { pop, picks } => {
                let picked = picks
                    .iter()
                    .map(|&d| Ok(format!("std::mem::take(&mut {})", self.slot(d, SlotKind::Value)?)))
                    .collect::<Result<Vec<_>, InternalError>>()?;
                self.pop(pop)?;
                let s = self.push(SlotKind::Value)?;
                match picked.as_slice() {
                    [one] => w.line(format!("{s} = {one};")),
                    many => w.line(format!("{s} = Value::Array(vec![{}]);", many.join(", "))),
                }
            }
            Instr::Cond { test, then, els } => {
                let condition = self.test(test)?;
                w.open(format!("if {condition} {{"));
                let entry = self.stack.clone();
                self.block(then, w)?;
                let after_then = std::mem::replace(&mut self.stack, entry);
                if !els.is_empty() {
                    w.reopen("} else {");
                }
                self.block(els, w)?;
                w.close("}");
                if after_then != self.stack {
                    return Err(self.error(format!(
                        "branches of {:?} leave different stacks: {after_then:?} and {:?}",
                        test.opcode(),
                        self.stack
                    )));
                }
            }
            Instr::WhileNotError(body) => {
                let s = self.slot(0, SlotKind::Value)?;
                w.open(format!("while !{s}.is_failed() {{"));
                let entry = self.stack.clone();
                self.block(body, w)?;
                w.close("}");
                if entry != self.stack {
                    return Err(self.error(format!(
                        "loop body changes the stack from {entry:?} to {:?}",
                        self.stack
                    )));
                }
            }
            Instr::AcceptN(n) => {
                let s = self.push(SlotKind::Value)?;
                w.line(format!("{s} = self.st.accept_n({n});"));
            }
            Instr::AcceptString(i) => {
                let s = self.push(SlotKind::Value)?;
                w.line(format!("{s} = self.st.accept_str(L{i});"));
            }
            Instr::AcceptStringIc(i) => {
                let s = self.push(SlotKind::Value)?;
                w.line(format!("{s} = self.st.accept_str_ic(L{i});"));
            }
            Instr::Fail(i) => {
                let s = self.push(SlotKind::Value)?;
                w.line(format!("{s} = self.st.fail(&E{i});"));
            }
            Instr::LoadSavedPos(d) => {
                let p = self.slot(d, SlotKind::Pos)?;
                w.line(format!("self.st.saved_pos = {p};"));
            }
            Instr::UpdateSavedPos => w.line("self.st.saved_pos = self.st.pos;"),
            Instr::Call {
                function,
                pop,
                args,
            } => {
                let kind = self
                    .c
                    .constants
                    .functions
                    .get(function)
                    .map(|f| f.kind)
                    .ok_or_else(|| self.error(format!("unknown function {function}")))?;
                let args = args
                    .iter()
                    .map(|&d| Ok(format!("{}.clone()", self.slot(d, SlotKind::Value)?)))
                    .collect::<Result<Vec<_>, InternalError>>()?;
                let call = format!("self.f{function}({})", args.join(", "));
                self.pop(pop)?;
                let s = self.push(SlotKind::Value)?;
                match kind {
                    FunctionKind::Action => w.line(format!("{s} = {call};")),
                    FunctionKind::Predicate => w.line(format!("{s} = Value::Bool({call});")),
                    FunctionKind::Boundary => w.line(format!("{s} = Value::from({call});")),
                }
            }
            Instr::Rule(index) => {
                let name = self
                    .c
                    .grammar
                    .live_rules()
                    .find(|(handle, _)| handle.as_u32() == index)
                    .map(|(_, rule)| rule.name.as_str())
                    .ok_or_else(|| self.error(format!("call of removed or unknown rule {index}")))?;
                let s = self.push(SlotKind::Value)?;
                w.line(format!("{s} = self.parse_{name}();"));
            }
            Instr::SilentFailsOn => w.line("self.st.silent_fails += 1;"),
            Instr::SilentFailsOff => w.line("self.st.silent_fails -= 1;"),
            Instr::SourceMapPush(i) => {
                let span = self
                    .c
                    .constants
                    .locations
                    .get(i)
                    .copied()
                    .ok_or_else(|| self.error(format!("unknown location {i}")))?;
                w.push_origin(span);
            }
            Instr::SourceMapPop => {
                if w.pop_origin().is_none() {
                    return Err(self.error("unbalanced source map pop"));
                }
            }
        }
        Ok(())
    }

    fn test(&self, test: Test) -> Result<String, InternalError> {
        let condition = match test {
            Test::If => format!("{}.is_truthy()", self.slot(0, SlotKind::Value)?),
            Test::IfError => format!("{}.is_failed()", self.slot(0, SlotKind::Value)?),
            Test::IfNotError => format!("!{}.is_failed()", self.slot(0, SlotKind::Value)?),
            Test::IfLt(n) => format!("{}.len() < {n}", self.slot(0, SlotKind::Value)?),
            Test::IfGe(n) => format!("{}.len() >= {n}", self.slot(0, SlotKind::Value)?),
            Test::IfLtDynamic(d) => format!(
                "{}.len() < {}.count_or(0)",
                self.slot(0, SlotKind::Value)?,
                self.slot(d, SlotKind::Value)?
            ),
            Test::IfGeDynamic(d) => format!(
                "{}.len() >= {}.count_or(usize::MAX)",
                self.slot(0, SlotKind::Value)?,
                self.slot(d, SlotKind::Value)?
            ),
            Test::MatchAny => "self.st.match_any()".to_owned(),
            Test::MatchString(i) => format!("self.st.match_str(L{i})"),
            Test::MatchStringIc(i) => format!("self.st.match_str_ic(L{i})"),
            Test::MatchCharClass(i) => format!("self.st.match_class(&C{i})"),
        };
        Ok(condition)
    }
}
