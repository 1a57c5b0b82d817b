//! Generates the parsers in `src/lib.rs` into `OUT_DIR`.

use std::{env, fs, path::Path};

use anyhow::{bail, Context};
use pegc::{
    ast::{dsl::*, GrammarDef},
    backend::Passes,
    compile,
    options::{CompileOptions, OutputKind},
    Output,
};

const SUM: &str = "
    let mut total = head.as_int().unwrap_or(0);
    if let Value::Array(items) = &tail {
        total += items.iter().filter_map(Value::as_int).sum::<i64>();
    }
    total
";

fn pair() -> GrammarDef {
    GrammarDef::new().rule("Start", seq([lit("a"), lit("b")]))
}

fn sum() -> GrammarDef {
    GrammarDef::new()
        .rule(
            "Start",
            choice([
                action(
                    seq([lit_ic("neg"), rule_ref("_"), label("v", rule_ref("Sum"))]),
                    "-v.as_int().unwrap_or(0)",
                ),
                rule_ref("Sum"),
            ]),
        )
        .rule(
            "Sum",
            action(
                seq([
                    label("head", rule_ref("Num")),
                    label(
                        "tail",
                        star(seq([
                            rule_ref("_"),
                            lit("+"),
                            rule_ref("_"),
                            pick(rule_ref("Num")),
                        ])),
                    ),
                ]),
                SUM,
            ),
        )
        .aliased_rule(
            "Num",
            "number",
            action(plus(class(&[('0', '9')])), "self.text().parse::<i64>().unwrap_or(0)"),
        )
        .rule("_", star(lit(" ")))
}

fn generate(
    out_dir: &Path,
    file: &str,
    def: GrammarDef,
    options: CompileOptions,
) -> anyhow::Result<()> {
    let grammar = def.build()?;
    let compiled = compile(
        grammar,
        &Passes::default(),
        options.with_output(OutputKind::Source),
    )
    .with_context(|| format!("compiling the grammar of {file}"))?;
    let Output::Source(source) = compiled.output else {
        bail!("no source was generated for {file}");
    };
    fs::write(out_dir.join(file), source).with_context(|| format!("writing {file}"))?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    println!("cargo:rerun-if-changed=build.rs");
    let out_dir = env::var_os("OUT_DIR").context("OUT_DIR is not set")?;
    let out_dir = Path::new(&out_dir);

    let cached = CompileOptions::default().with_cache(true);
    generate(out_dir, "pair.rs", pair(), CompileOptions::default())?;
    generate(out_dir, "pair_cached.rs", pair(), cached.clone())?;
    generate(out_dir, "sum.rs", sum(), CompileOptions::default())?;
    generate(out_dir, "sum_cached.rs", sum(), cached)?;
    Ok(())
}
