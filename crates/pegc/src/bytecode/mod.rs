//! Flat stack-machine code each rule compiles to.
//!
//! Code is a `Vec<u32>` of opcodes and their operands. Conditionals and loops carry the lengths
//! of their bodies inline, so the nesting can be recovered by a single forward walk.

mod compile;
pub mod pool;

use std::fmt::Write;

use crate::{backend::Compilation, error::InternalError};

pub use compile::generate_bytecode;
pub use pool::{Constants, FunctionConst, FunctionKind, Pool};

macro_rules! opcodes {
    ($($name:ident => $text:literal,)*) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
        #[repr(u32)]
        pub enum Opcode {
            $($name,)*
        }

        impl Opcode {
            const ALL: &'static [Opcode] = &[$(Opcode::$name,)*];

            pub fn from_u32(value: u32) -> Option<Opcode> {
                Self::ALL.get(value as usize).copied()
            }

            pub fn name(self) -> &'static str {
                match self {
                    $(Opcode::$name => $text,)*
                }
            }
        }
    };
}

opcodes! {
    PushEmptyString => "PUSH_EMPTY_STRING",
    PushNull => "PUSH_NULL",
    PushFailed => "PUSH_FAILED",
    PushEmptyArray => "PUSH_EMPTY_ARRAY",
    PushCurrPos => "PUSH_CURR_POS",
    Pop => "POP",
    PopCurrPos => "POP_CURR_POS",
    PopN => "POP_N",
    Nip => "NIP",
    Append => "APPEND",
    Wrap => "WRAP",
    Text => "TEXT",
    Pluck => "PLUCK",
    If => "IF",
    IfError => "IF_ERROR",
    IfNotError => "IF_NOT_ERROR",
    IfLt => "IF_LT",
    IfGe => "IF_GE",
    IfLtDynamic => "IF_LT_DYNAMIC",
    IfGeDynamic => "IF_GE_DYNAMIC",
    WhileNotError => "WHILE_NOT_ERROR",
    MatchAny => "MATCH_ANY",
    MatchString => "MATCH_STRING",
    MatchStringIc => "MATCH_STRING_IC",
    MatchCharClass => "MATCH_CHAR_CLASS",
    AcceptN => "ACCEPT_N",
    AcceptString => "ACCEPT_STRING",
    AcceptStringIc => "ACCEPT_STRING_IC",
    Fail => "FAIL",
    LoadSavedPos => "LOAD_SAVED_POS",
    UpdateSavedPos => "UPDATE_SAVED_POS",
    Call => "CALL",
    Rule => "RULE",
    SilentFailsOn => "SILENT_FAILS_ON",
    SilentFailsOff => "SILENT_FAILS_OFF",
    SourceMapPush => "SOURCE_MAP_PUSH",
    SourceMapPop => "SOURCE_MAP_POP",
}

impl From<Opcode> for u32 {
    fn from(value: Opcode) -> u32 {
        value as u32
    }
}

/// Condition of a two-armed block.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Test {
    /// The value on top of the stack is truthy.
    If,
    IfError,
    IfNotError,
    /// The array on top of the stack is shorter than the constant.
    IfLt(u32),
    IfGe(u32),
    /// Like [`Test::IfLt`] with the count taken from the slot this far below the top.
    IfLtDynamic(u32),
    IfGeDynamic(u32),
    MatchAny,
    MatchString(u32),
    MatchStringIc(u32),
    MatchCharClass(u32),
}

impl Test {
    pub fn opcode(self) -> Opcode {
        match self {
            Test::If => Opcode::If,
            Test::IfError => Opcode::IfError,
            Test::IfNotError => Opcode::IfNotError,
            Test::IfLt(_) => Opcode::IfLt,
            Test::IfGe(_) => Opcode::IfGe,
            Test::IfLtDynamic(_) => Opcode::IfLtDynamic,
            Test::IfGeDynamic(_) => Opcode::IfGeDynamic,
            Test::MatchAny => Opcode::MatchAny,
            Test::MatchString(_) => Opcode::MatchString,
            Test::MatchStringIc(_) => Opcode::MatchStringIc,
            Test::MatchCharClass(_) => Opcode::MatchCharClass,
        }
    }

    pub fn operand(self) -> Option<u32> {
        match self {
            Test::If | Test::IfError | Test::IfNotError | Test::MatchAny => None,
            Test::IfLt(n)
            | Test::IfGe(n)
            | Test::IfLtDynamic(n)
            | Test::IfGeDynamic(n)
            | Test::MatchString(n)
            | Test::MatchStringIc(n)
            | Test::MatchCharClass(n) => Some(n),
        }
    }

    pub fn encode(self) -> Vec<u32> {
        let mut code = vec![self.opcode().into()];
        code.extend(self.operand());
        code
    }
}

/// One decoded instruction, nested blocks borrow from the code they were decoded from.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Instr<'a> {
    PushEmptyString,
    PushNull,
    PushFailed,
    PushEmptyArray,
    PushCurrPos,
    Pop,
    PopCurrPos,
    PopN(u32),
    Nip,
    Append,
    Wrap(u32),
    Text,
    /// Pops `pop` values and pushes the picked ones, given as distances from the top.
    Pluck {
        pop: u32,
        picks: &'a [u32],
    },
    Cond {
        test: Test,
        then: &'a [u32],
        els: &'a [u32],
    },
    WhileNotError(&'a [u32]),
    AcceptN(u32),
    AcceptString(u32),
    /// Consumes the input matched by the lowercase literal, as it is written in the input.
    AcceptStringIc(u32),
    Fail(u32),
    LoadSavedPos(u32),
    UpdateSavedPos,
    /// Calls a function with the values at `args` distances from the top, then pops `pop`
    /// values and pushes the result.
    Call {
        function: u32,
        pop: u32,
        args: &'a [u32],
    },
    Rule(u32),
    SilentFailsOn,
    SilentFailsOff,
    SourceMapPush(u32),
    SourceMapPop,
}

struct Reader<'a> {
    code: &'a [u32],
    ip: usize,
}

impl<'a> Reader<'a> {
    fn next(&mut self) -> Result<u32, InternalError> {
        let value = self.code.get(self.ip).copied().ok_or_else(|| {
            InternalError::new(format!("bytecode truncated at offset {}", self.ip))
        })?;
        self.ip += 1;
        Ok(value)
    }

    fn slice(&mut self, len: u32) -> Result<&'a [u32], InternalError> {
        let end = self.ip + len as usize;
        let slice = self.code.get(self.ip..end).ok_or_else(|| {
            InternalError::new(format!("bytecode block at offset {} overruns its code", self.ip))
        })?;
        self.ip = end;
        Ok(slice)
    }

    /// Operand count followed by that many operands.
    fn list(&mut self) -> Result<&'a [u32], InternalError> {
        let len = self.next()?;
        self.slice(len)
    }

    fn cond(&mut self, test: Test) -> Result<Instr<'a>, InternalError> {
        let then_len = self.next()?;
        let else_len = self.next()?;
        let then = self.slice(then_len)?;
        let els = self.slice(else_len)?;
        Ok(Instr::Cond { test, then, els })
    }
}

/// Decodes the instruction at `ip`, returning it with its encoded length.
pub fn decode(code: &[u32], ip: usize) -> Result<(Instr<'_>, usize), InternalError> {
    let mut r = Reader { code, ip };
    let raw = r.next()?;
    let op = Opcode::from_u32(raw)
        .ok_or_else(|| InternalError::new(format!("unknown opcode {raw} at offset {ip}")))?;

    let instr = match op {
        Opcode::PushEmptyString => Instr::PushEmptyString,
        Opcode::PushNull => Instr::PushNull,
        Opcode::PushFailed => Instr::PushFailed,
        Opcode::PushEmptyArray => Instr::PushEmptyArray,
        Opcode::PushCurrPos => Instr::PushCurrPos,
        Opcode::Pop => Instr::Pop,
        Opcode::PopCurrPos => Instr::PopCurrPos,
        Opcode::PopN => Instr::PopN(r.next()?),
        Opcode::Nip => Instr::Nip,
        Opcode::Append => Instr::Append,
        Opcode::Wrap => Instr::Wrap(r.next()?),
        Opcode::Text => Instr::Text,
        Opcode::Pluck => Instr::Pluck {
            pop: r.next()?,
            picks: r.list()?,
        },
        Opcode::If => r.cond(Test::If)?,
        Opcode::IfError => r.cond(Test::IfError)?,
        Opcode::IfNotError => r.cond(Test::IfNotError)?,
        Opcode::IfLt => {
            let n = r.next()?;
            r.cond(Test::IfLt(n))?
        }
        Opcode::IfGe => {
            let n = r.next()?;
            r.cond(Test::IfGe(n))?
        }
        Opcode::IfLtDynamic => {
            let n = r.next()?;
            r.cond(Test::IfLtDynamic(n))?
        }
        Opcode::IfGeDynamic => {
            let n = r.next()?;
            r.cond(Test::IfGeDynamic(n))?
        }
        Opcode::MatchAny => r.cond(Test::MatchAny)?,
        Opcode::MatchString => {
            let n = r.next()?;
            r.cond(Test::MatchString(n))?
        }
        Opcode::MatchStringIc => {
            let n = r.next()?;
            r.cond(Test::MatchStringIc(n))?
        }
        Opcode::MatchCharClass => {
            let n = r.next()?;
            r.cond(Test::MatchCharClass(n))?
        }
        Opcode::WhileNotError => Instr::WhileNotError(r.list()?),
        Opcode::AcceptN => Instr::AcceptN(r.next()?),
        Opcode::AcceptString => Instr::AcceptString(r.next()?),
        Opcode::AcceptStringIc => Instr::AcceptStringIc(r.next()?),
        Opcode::Fail => Instr::Fail(r.next()?),
        Opcode::LoadSavedPos => Instr::LoadSavedPos(r.next()?),
        Opcode::UpdateSavedPos => Instr::UpdateSavedPos,
        Opcode::Call => Instr::Call {
            function: r.next()?,
            pop: r.next()?,
            args: r.list()?,
        },
        Opcode::Rule => Instr::Rule(r.next()?),
        Opcode::SilentFailsOn => Instr::SilentFailsOn,
        Opcode::SilentFailsOff => Instr::SilentFailsOff,
        Opcode::SourceMapPush => Instr::SourceMapPush(r.next()?),
        Opcode::SourceMapPop => Instr::SourceMapPop,
    };
    Ok((instr, r.ip - ip))
}

/// Decodes a whole block, nested blocks stay encoded.
pub fn instructions(code: &[u32]) -> impl Iterator<Item = Result<Instr<'_>, InternalError>> {
    let mut ip = 0;
    std::iter::from_fn(move || {
        if ip >= code.len() {
            return None;
        }
        match decode(code, ip) {
            Ok((instr, len)) => {
                ip += len;
                Some(Ok(instr))
            }
            Err(e) => {
                ip = code.len();
                Some(Err(e))
            }
        }
    })
}

/// Compiled body of one rule.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct Bytecode {
    pub code: Vec<u32>,
    /// Deepest stack slot the code uses.
    pub max_sp: u32,
}

/// Human readable listing of every rule's bytecode, with constants resolved.
pub fn display(c: &Compilation) -> Result<String, InternalError> {
    let mut buf = String::new();
    for (handle, rule) in c.grammar.live_rules() {
        let bytecode = &c.bytecode[handle];
        _ = writeln!(buf, "{} (rule {}, max_sp {}):", rule.name, handle.as_u32(), bytecode.max_sp);
        display_block(&mut buf, &bytecode.code, &c.constants, 1)?;
    }
    Ok(buf)
}

fn display_block(
    buf: &mut String,
    code: &[u32],
    constants: &Constants,
    indent: usize,
) -> Result<(), InternalError> {
    fn print_indent(buf: &mut String, indent: usize) {
        for _ in 0..indent {
            buf.push_str("  ");
        }
    }

    for instr in instructions(code) {
        let instr = instr?;
        print_indent(buf, indent);
        match instr {
            Instr::PopN(n) => _ = writeln!(buf, "POP_N {n}"),
            Instr::Wrap(n) => _ = writeln!(buf, "WRAP {n}"),
            Instr::Pluck { pop, picks } => _ = writeln!(buf, "PLUCK {pop} {picks:?}"),
            Instr::Cond { test, then, els } => {
                let _ = match test {
                    Test::MatchString(i) | Test::MatchStringIc(i) => writeln!(
                        buf,
                        "{} {:?}",
                        test.opcode().name(),
                        constants.literals.get(i).map_or("?", |s| s.as_str())
                    ),
                    Test::MatchCharClass(i) => writeln!(
                        buf,
                        "MATCH_CHAR_CLASS {}",
                        constants.classes.get(i).map_or("?".to_owned(), |c| c.describe())
                    ),
                    _ => match test.operand() {
                        Some(n) => writeln!(buf, "{} {n}", test.opcode().name()),
                        None => writeln!(buf, "{}", test.opcode().name()),
                    },
                };
                display_block(buf, then, constants, indent + 1)?;
                if !els.is_empty() {
                    print_indent(buf, indent);
                    buf.push_str("ELSE\n");
                    display_block(buf, els, constants, indent + 1)?;
                }
            }
            Instr::WhileNotError(body) => {
                buf.push_str("WHILE_NOT_ERROR\n");
                display_block(buf, body, constants, indent + 1)?;
            }
            Instr::AcceptN(n) => _ = writeln!(buf, "ACCEPT_N {n}"),
            Instr::AcceptString(i) => _ = writeln!(
                buf,
                "ACCEPT_STRING {:?}",
                constants.literals.get(i).map_or("?", |s| s.as_str())
            ),
            Instr::AcceptStringIc(i) => _ = writeln!(
                buf,
                "ACCEPT_STRING_IC {:?}",
                constants.literals.get(i).map_or("?", |s| s.as_str())
            ),
            Instr::Fail(i) => _ = writeln!(
                buf,
                "FAIL {}",
                constants.expectations.get(i).map_or("?".to_owned(), |e| e.describe())
            ),
            Instr::LoadSavedPos(n) => _ = writeln!(buf, "LOAD_SAVED_POS {n}"),
            Instr::Call {
                function,
                pop,
                args,
            } => _ = writeln!(buf, "CALL f{function} {pop} {args:?}"),
            Instr::Rule(index) => _ = writeln!(buf, "RULE {index}"),
            Instr::SourceMapPush(i) => _ = writeln!(buf, "SOURCE_MAP_PUSH {i}"),
            other => _ = writeln!(buf, "{}", simple_name(other)),
        }
    }
    Ok(())
}

fn simple_name(instr: Instr<'_>) -> &'static str {
    let op = match instr {
        Instr::PushEmptyString => Opcode::PushEmptyString,
        Instr::PushNull => Opcode::PushNull,
        Instr::PushFailed => Opcode::PushFailed,
        Instr::PushEmptyArray => Opcode::PushEmptyArray,
        Instr::PushCurrPos => Opcode::PushCurrPos,
        Instr::Pop => Opcode::Pop,
        Instr::PopCurrPos => Opcode::PopCurrPos,
        Instr::Nip => Opcode::Nip,
        Instr::Append => Opcode::Append,
        Instr::Text => Opcode::Text,
        Instr::UpdateSavedPos => Opcode::UpdateSavedPos,
        Instr::SilentFailsOn => Opcode::SilentFailsOn,
        Instr::SilentFailsOff => Opcode::SilentFailsOff,
        Instr::SourceMapPop => Opcode::SourceMapPop,
        _ => return "?",
    };
    op.name()
}
