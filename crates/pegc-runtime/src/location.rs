use std::{collections::BTreeMap, fmt::Display};

/// A point in the parsed input.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub struct Position {
    /// byte offset into the input
    pub offset: usize,
    /// one-based line number
    pub line: u32,
    /// one-based column, counted in unicode code points
    pub column: u32,
}

#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub struct Location {
    /// Opaque tag passed in through `ParseOptions::grammar_source`.
    pub source: Option<String>,
    pub start: Position,
    pub end: Position,
}

impl Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(source) = &self.source {
            write!(f, "{source}:")?;
        }
        write!(f, "{}:{}", self.start.line, self.start.column)
    }
}

/// Lazily computed offset -> line/column mapping.
///
/// Lookups walk forward from the closest offset at or below the requested one,
/// every answer is remembered so the input is never rescanned from the start.
pub struct LineCache {
    known: BTreeMap<usize, (u32, u32)>,
}

impl Default for LineCache {
    fn default() -> Self {
        Self::new()
    }
}

impl LineCache {
    pub fn new() -> LineCache {
        let mut known = BTreeMap::new();
        known.insert(0, (1, 1));
        LineCache { known }
    }

    /// Offset is clamped to the end of `src` and rounded down to a char boundary.
    pub fn position(&mut self, src: &str, offset: usize) -> Position {
        let mut offset = offset.min(src.len());
        while !src.is_char_boundary(offset) {
            offset -= 1;
        }

        let (&from, &(mut line, mut column)) = match self.known.range(..=offset).next_back() {
            Some(found) => found,
            None => (&0, &(1, 1)),
        };

        if from != offset {
            for c in src[from..offset].chars() {
                if c == '\n' {
                    line += 1;
                    column = 1;
                } else {
                    column += 1;
                }
            }
            self.known.insert(offset, (line, column));
        }

        Position {
            offset,
            line,
            column,
        }
    }

    pub fn cached_offsets(&self) -> usize {
        self.known.len()
    }
}

#[test]
fn test_line_cache() {
    let src = "ab\ncd\n\nef";
    let mut cache = LineCache::new();

    let p = cache.position(src, 4);
    assert_eq!((p.line, p.column), (2, 2));
    let p = cache.position(src, 8);
    assert_eq!((p.line, p.column), (4, 2));
    // answered from the cache, walking forward from offset 4
    let p = cache.position(src, 6);
    assert_eq!((p.line, p.column), (3, 1));
    let p = cache.position(src, 0);
    assert_eq!((p.line, p.column), (1, 1));
    assert_eq!(cache.cached_offsets(), 4);
}

#[test]
fn test_line_cache_unicode() {
    let src = "žluť\nx";
    let mut cache = LineCache::new();
    let p = cache.position(src, "žluť".len());
    assert_eq!((p.line, p.column), (1, 5));
    // clamped
    let p = cache.position(src, 1000);
    assert_eq!((p.offset, p.line, p.column), (src.len(), 2, 2));
}
