//! Parsers generated by `pegc` at build time, compiled against `pegc-runtime`.

/// `Start = "a" "b"`
pub mod pair {
    include!(concat!(env!("OUT_DIR"), "/pair.rs"));
}

pub mod pair_cached {
    include!(concat!(env!("OUT_DIR"), "/pair_cached.rs"));
}

/// Sums of numbers, negated after a case-insensitive `neg`.
pub mod sum {
    include!(concat!(env!("OUT_DIR"), "/sum.rs"));
}

pub mod sum_cached {
    include!(concat!(env!("OUT_DIR"), "/sum_cached.rs"));
}
