use serde::{Deserialize, Serialize};

/// Words that can't be used as labels, labels become parameter names in generated Rust.
pub const RUST_KEYWORDS: &[&str] = &[
    "abstract", "as", "async", "await", "become", "box", "break", "const", "continue", "crate",
    "do", "dyn", "else", "enum", "extern", "false", "final", "fn", "for", "gen", "if", "impl",
    "in", "let", "loop", "macro", "match", "mod", "move", "mut", "override", "priv", "pub", "ref",
    "return", "self", "Self", "static", "struct", "super", "trait", "true", "try", "type",
    "typeof", "union", "unsafe", "unsized", "use", "virtual", "where", "while", "yield",
];

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputKind {
    /// An in-memory parser running the compiled bytecode.
    #[default]
    Parser,
    Source,
    SourceAndMap,
    /// The grammar together with every analysis result.
    Ast,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompileOptions {
    /// Rules a parse may start from. Empty selects the first rule, `"*"` selects all of them.
    pub allowed_start_rules: Vec<String>,
    /// Enables packrat memoization.
    pub cache: bool,
    /// Emits rule enter/match/fail notifications.
    pub trace: bool,
    pub output: OutputKind,
    pub reserved_words: Vec<String>,
    /// Path of the runtime crate in `use` items of generated code.
    pub runtime_path: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            allowed_start_rules: Vec::new(),
            cache: false,
            trace: false,
            output: OutputKind::default(),
            reserved_words: RUST_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            runtime_path: "pegc_runtime".to_owned(),
        }
    }
}

impl CompileOptions {
    pub fn with_output(mut self, output: OutputKind) -> CompileOptions {
        self.output = output;
        self
    }
    pub fn with_cache(mut self, cache: bool) -> CompileOptions {
        self.cache = cache;
        self
    }
    pub fn with_trace(mut self, trace: bool) -> CompileOptions {
        self.trace = trace;
        self
    }
    pub fn with_start_rules(mut self, rules: &[&str]) -> CompileOptions {
        self.allowed_start_rules = rules.iter().map(|s| s.to_string()).collect();
        self
    }
}

#[test]
fn test_options_from_json() {
    let options: CompileOptions = serde_json::from_str(
        r#"{ "allowedStartRules": ["*"], "cache": true, "output": "source-and-map" }"#,
    )
    .unwrap();
    assert_eq!(options.allowed_start_rules, vec!["*"]);
    assert!(options.cache);
    assert!(!options.trace);
    assert_eq!(options.output, OutputKind::SourceAndMap);
    assert!(options.reserved_words.iter().any(|w| w == "fn"));
}
