//! Compiler from parsing expression grammars to Rust parsers.
//!
//! A [`Grammar`](ast::Grammar) goes through three stages of [`Passes`]: checks which report
//! problems of the grammar, transformations, and generation of bytecode and Rust source.
//! The check stage ends compilation if it reported any error.

pub mod ast;
pub mod backend;
pub mod bytecode;
pub mod codegen;
pub mod error;
pub mod options;
pub mod span;
pub mod vm;

use backend::{run_stage, Compilation, Passes};
use codegen::sourcemap::SourceMap;
use error::{CompileError, Diagnostic, InternalError, Session};
use options::{CompileOptions, OutputKind};

pub use pegc_runtime as runtime;

#[derive(Debug)]
pub enum Output {
    Parser(vm::Parser),
    Source(String),
    SourceAndMap { code: String, map: SourceMap },
    Ast(Box<Compilation>),
}

#[derive(Debug)]
pub struct Compiled {
    pub output: Output,
    /// Warnings and notes, a successful compilation never carries errors.
    pub diagnostics: Vec<Diagnostic>,
}

pub fn compile(
    grammar: ast::Grammar,
    passes: &Passes,
    options: CompileOptions,
) -> Result<Compiled, CompileError> {
    let session = Session::new();
    let mut c = Compilation::new(grammar, options);

    run_stage("check", &passes.check, &mut c, &session)?;
    session.check_errors()?;
    run_stage("transform", &passes.transform, &mut c, &session)?;
    run_stage("generate", &passes.generate, &mut c, &session)?;

    let kind = c.options.output;
    let output = match kind {
        OutputKind::Parser => Output::Parser(vm::Parser::new(&c)?),
        OutputKind::Source => match c.code.take() {
            Some(code) => Output::Source(code.source),
            None => return Err(InternalError::new("no source was generated").into()),
        },
        OutputKind::SourceAndMap => match c.code.take() {
            Some(codegen::GeneratedCode {
                source,
                map: Some(map),
            }) => Output::SourceAndMap { code: source, map },
            _ => return Err(InternalError::new("no source map was generated").into()),
        },
        OutputKind::Ast => Output::Ast(Box::new(c)),
    };

    let diagnostics = session.into_diagnostics();
    log::debug!("compiled with {} diagnostics", diagnostics.len());
    Ok(Compiled {
        output,
        diagnostics,
    })
}
