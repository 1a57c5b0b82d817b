use std::{
    env::args,
    fmt::Display,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{bail, Context};
use pegc::{
    ast::GrammarDef,
    backend::Passes,
    bytecode,
    compile,
    error::{CompileError, Diagnostic},
    options::{CompileOptions, OutputKind},
    runtime::{location::LineCache, LogTracer, ParseOptions, Tracer},
    span::Span,
    Compiled, Output,
};

fn main() {
    let level = std::env::var("RUST_LOG").unwrap_or_else(|_| "WARN".to_owned());
    let level = log::LevelFilter::from_str(&level).unwrap_or(log::LevelFilter::Warn);

    _ = simplelog::TermLogger::init(
        level,
        simplelog::ConfigBuilder::new()
            .set_time_format_custom(&[])
            .build(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Never,
    );

    if let Err(e) = run() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

pub struct UnitPrinter {
    value: f64,
    suffixes: &'static [(&'static str, f64)],
}

#[allow(non_upper_case_globals)]
impl UnitPrinter {
    fn seconds(value: f64) -> Self {
        const ms: f64 = 1000.0;
        Self {
            value,
            suffixes: &[
                ("s", 1.0),
                ("ms", ms),
                ("µs", ms * ms),
                ("ns", ms * ms * ms),
            ],
        }
    }
}

impl Display for UnitPrinter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut best: Option<(f64, &'static str)> = None;

        for &(name, factor) in self.suffixes {
            let value = self.value * factor;

            let new_best = match best {
                Some((best, _)) if best >= 1.0 => value < best,
                Some((best, _)) => value > best,
                None => true,
            };
            if new_best {
                best = Some((value, name));
            }
        }

        match best {
            Some((value, suffix)) => write!(f, "{value:.2} {suffix}"),
            None => write!(f, "{}", self.value),
        }
    }
}

/// Prints diagnostics as `file:line:column`, or with byte spans if the grammar text is unknown.
struct Reporter<'a> {
    file: &'a Path,
    text: Option<String>,
    lines: LineCache,
}

impl Reporter<'_> {
    fn position(&mut self, span: Span) -> String {
        match &self.text {
            Some(text) => {
                let pos = self.lines.position(text, span.start() as usize);
                format!("{}:{}", pos.line, pos.column)
            }
            None => span.to_string(),
        }
    }

    fn report(&mut self, diagnostic: &Diagnostic) {
        let file = self.file.display();
        let at = self.position(diagnostic.span);
        eprintln!("{file}:{at} {}: {}", diagnostic.severity, diagnostic.message);
        for related in &diagnostic.related {
            let at = self.position(related.span);
            eprintln!("  {file}:{at} note: {}", related.message);
        }
    }
}

struct Args {
    grammar: PathBuf,
    grammar_text: Option<PathBuf>,
    options: CompileOptions,
    start_rules: Vec<String>,
    do_bytecode: bool,
    do_ast: bool,
    map: Option<PathBuf>,
    out_file: Option<PathBuf>,
    parse: Option<PathBuf>,
    rustfmt: bool,
    bench: bool,
}

fn value<'a>(iter: &mut impl Iterator<Item = &'a str>, flag: &str) -> anyhow::Result<String> {
    iter.next()
        .map(str::to_owned)
        .with_context(|| format!("Expected an argument after {flag}"))
}

fn parse_args() -> anyhow::Result<Args> {
    let args = args().skip(1).collect::<Vec<_>>();
    let mut iter = args.iter().map(String::as_str);

    let mut options = None;
    let mut cache = false;
    let mut trace = false;
    let mut runtime_path = None;
    let mut output: Option<OutputKind> = None;
    let mut parsed = Args {
        grammar: PathBuf::new(),
        grammar_text: None,
        options: CompileOptions::default(),
        start_rules: Vec::new(),
        do_bytecode: false,
        do_ast: false,
        map: None,
        out_file: None,
        parse: None,
        rustfmt: false,
        bench: false,
    };
    let mut files = Vec::new();

    while let Some(arg) = iter.next() {
        match arg {
            "--bytecode" => parsed.do_bytecode = true,
            "--ast" => parsed.do_ast = true,
            "--source" => {}
            "--map" => parsed.map = Some(value(&mut iter, arg)?.into()),
            "--cache" => cache = true,
            "--trace" => trace = true,
            "--start-rule" => parsed.start_rules.push(value(&mut iter, arg)?),
            "--runtime-path" => runtime_path = Some(value(&mut iter, arg)?),
            "--output" => {
                let kind = value(&mut iter, arg)?;
                output = Some(
                    serde_json::from_value(serde_json::Value::String(kind.clone()))
                        .with_context(|| format!("Unknown output kind {kind}"))?,
                );
            }
            "--out-file" | "-o" => parsed.out_file = Some(value(&mut iter, arg)?.into()),
            "--options" => options = Some(PathBuf::from(value(&mut iter, arg)?)),
            "--grammar-text" => parsed.grammar_text = Some(value(&mut iter, arg)?.into()),
            "--parse" => parsed.parse = Some(value(&mut iter, arg)?.into()),
            "--rustfmt" => parsed.rustfmt = true,
            "--bench" => parsed.bench = true,
            _ if arg.starts_with("--") => bail!("Unknown flag {arg}"),
            _ => files.push(arg),
        }
    }

    parsed.grammar = match files.as_slice() {
        [] => bail!("No grammar file provided"),
        [one] => PathBuf::from(one),
        _ => bail!("Only one grammar file may be provided"),
    };

    if let Some(path) = options {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read `{}`", path.display()))?;
        parsed.options = serde_json::from_str(&text)
            .with_context(|| format!("Invalid options in `{}`", path.display()))?;
    }
    let o = &mut parsed.options;
    o.cache |= cache;
    o.trace |= trace;
    if !parsed.start_rules.is_empty() {
        o.allowed_start_rules = parsed.start_rules.clone();
    }
    if let Some(path) = runtime_path {
        o.runtime_path = path;
    }
    o.output = match (output, &parsed.parse, parsed.do_ast || parsed.do_bytecode, &parsed.map) {
        (Some(kind), ..) => kind,
        (_, Some(_), ..) => OutputKind::Parser,
        (_, _, true, _) => OutputKind::Ast,
        (_, _, _, Some(_)) => OutputKind::SourceAndMap,
        _ => OutputKind::Source,
    };

    Ok(parsed)
}

fn emit(args: &Args, text: &str) -> anyhow::Result<()> {
    match &args.out_file {
        Some(path) => std::fs::write(path, text)
            .with_context(|| format!("Failed to write `{}`", path.display())),
        None => {
            print!("{text}");
            Ok(())
        }
    }
}

fn run() -> anyhow::Result<()> {
    let args = parse_args()?;

    let json = std::fs::read_to_string(&args.grammar)
        .with_context(|| format!("Failed to read `{}`", args.grammar.display()))?;
    let def: GrammarDef = serde_json::from_str(&json)
        .with_context(|| format!("Invalid grammar in `{}`", args.grammar.display()))?;

    let text = match &args.grammar_text {
        Some(path) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read `{}`", path.display()))?,
        ),
        None => None,
    };
    let mut reporter = Reporter {
        file: args.grammar_text.as_deref().unwrap_or(&args.grammar),
        text,
        lines: LineCache::new(),
    };

    let grammar = def
        .build()
        .map_err(|e| anyhow::anyhow!("{}: {}", e.location, e.message))?;

    let start = std::time::Instant::now();
    let result = compile(grammar, &Passes::default(), args.options.clone());
    if args.bench {
        let elapsed = UnitPrinter::seconds(start.elapsed().as_secs_f64());
        eprintln!("compile\t {elapsed}");
    }

    let Compiled {
        output,
        diagnostics,
    } = match result {
        Ok(compiled) => compiled,
        Err(CompileError::Grammar { diagnostics, .. }) => {
            for d in &diagnostics {
                reporter.report(d);
            }
            bail!("Grammar has errors");
        }
        Err(e) => return Err(e.into()),
    };
    for d in &diagnostics {
        reporter.report(d);
    }

    match output {
        Output::Parser(parser) => {
            let Some(path) = &args.parse else {
                bail!("Nothing to do with the parser");
            };
            let input = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read `{}`", path.display()))?;
            let options = ParseOptions {
                grammar_source: Some(path.display().to_string()),
                tracer: args.options.trace.then(|| Box::new(LogTracer::default()) as Box<dyn Tracer>),
                ..Default::default()
            };
            let value = parser.parse(&input, options)?;
            emit(&args, &format!("{value}\n"))?;
        }
        Output::Source(code) => emit(&args, &format(code, args.rustfmt))?,
        Output::SourceAndMap { code, map } => {
            emit(&args, &format(code, args.rustfmt))?;
            if let Some(path) = &args.map {
                let json = serde_json::to_string_pretty(&map)?;
                std::fs::write(path, json)
                    .with_context(|| format!("Failed to write `{}`", path.display()))?;
            }
        }
        Output::Ast(c) => {
            let mut buf = String::new();
            let all = !args.do_ast && !args.do_bytecode;
            if args.do_ast || all {
                buf.push_str(&c.grammar.display().to_string());
                for (handle, rule) in c.grammar.live_rules() {
                    if let Some(result) = c.rule_matches[handle] {
                        buf.push_str(&format!("# {} {result:?}\n", rule.name));
                    }
                }
            }
            if args.do_bytecode || all {
                buf.push_str(&bytecode::display(&c)?);
            }
            emit(&args, &buf)?;
        }
    }

    Ok(())
}

/// Runs `rustfmt` over generated code if asked to, falling back to the unformatted text.
fn format(code: String, rustfmt: bool) -> String {
    if !rustfmt {
        return code;
    }
    match rustfmt_format(&code) {
        Ok(formatted) => formatted,
        Err(e) => {
            log::warn!("Formatting failed, printing unformatted: {e}");
            code
        }
    }
}

fn rustfmt_format(input: &str) -> anyhow::Result<String> {
    use std::io::Write;
    use std::process::{Command, Stdio};

    let mut child = Command::new("rustfmt")
        .args(["--edition", "2021"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .context("Failed to spawn rustfmt")?;

    let mut stdin = child.stdin.take().context("Failed to open stdin")?;
    std::thread::scope(move |s| {
        s.spawn(move || stdin.write_all(input.as_bytes()))
            .join()
            .map_err(|_| anyhow::anyhow!("Writer thread panicked"))?
            .context("Failed to write to rustfmt")
    })?;

    let output = child.wait_with_output().context("Failed to read stdout")?;
    if !output.status.success() {
        bail!("rustfmt exited with {}", output.status);
    }
    String::from_utf8(output.stdout).context("Rustfmt returned non-utf8 data")
}
