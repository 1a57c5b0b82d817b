use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::span::Span;

/// Generated lines `generated` (zero based, exclusive end) came from `original` grammar text.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Mapping {
    pub generated: Range<u32>,
    pub original: Span,
}

/// Ordered by generated line, adjacent lines with the same origin share one mapping.
#[derive(Clone, Default, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct SourceMap {
    pub mappings: Vec<Mapping>,
}

impl SourceMap {
    /// Grammar span a generated line came from.
    pub fn lookup(&self, line: u32) -> Option<Span> {
        let i = self
            .mappings
            .partition_point(|m| m.generated.end <= line);
        self.mappings
            .get(i)
            .filter(|m| m.generated.contains(&line))
            .map(|m| m.original)
    }
}

#[test]
fn test_lookup() {
    let map = SourceMap {
        mappings: vec![
            Mapping {
                generated: 2..4,
                original: Span::new(0, 3),
            },
            Mapping {
                generated: 6..7,
                original: Span::new(5, 9),
            },
        ],
    };
    assert_eq!(map.lookup(1), None);
    assert_eq!(map.lookup(3), Some(Span::new(0, 3)));
    assert_eq!(map.lookup(4), None);
    assert_eq!(map.lookup(6), Some(Span::new(5, 9)));
}
