use std::{collections::HashMap, hash::Hash};

use pegc_runtime::{CharClass, Expectation};

use crate::span::Span;

/// Append-only table, equal values share one index.
#[derive(Clone, Debug)]
pub struct Pool<T> {
    items: Vec<T>,
    lookup: HashMap<T, u32>,
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            lookup: HashMap::new(),
        }
    }
}

impl<T: Hash + Eq + Clone> Pool<T> {
    pub fn add(&mut self, item: T) -> u32 {
        if let Some(&index) = self.lookup.get(&item) {
            return index;
        }
        let index = self.items.len() as u32;
        self.items.push(item.clone());
        self.lookup.insert(item, index);
        index
    }
}

impl<T> Pool<T> {
    pub fn get(&self, index: u32) -> Option<&T> {
        self.items.get(index as usize)
    }
    pub fn len(&self) -> usize {
        self.items.len()
    }
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> + '_ {
        self.items.iter().enumerate().map(|(i, item)| (i as u32, item))
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum FunctionKind {
    /// Action code, its result becomes the expression's value.
    Action,
    /// Semantic predicate code, evaluates to a boolean.
    Predicate,
    /// Computes a repetition count.
    Boundary,
}

/// Host code called from the bytecode, with the labels visible at the call site as parameters.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct FunctionConst {
    pub kind: FunctionKind,
    pub params: Vec<String>,
    pub code: String,
    pub span: Span,
}

#[derive(Clone, Default, Debug)]
pub struct Constants {
    pub literals: Pool<String>,
    pub classes: Pool<CharClass>,
    pub expectations: Pool<Expectation>,
    pub functions: Pool<FunctionConst>,
    pub locations: Pool<Span>,
}

#[test]
fn test_pool_dedup() {
    let mut pool = Pool::default();
    assert_eq!(pool.add(Expectation::literal("a", false)), 0);
    assert_eq!(pool.add(Expectation::Any), 1);
    assert_eq!(pool.add(Expectation::literal("a", false)), 0);
    assert_eq!(pool.add(Expectation::literal("a", true)), 2);
    assert_eq!(pool.len(), 3);
    assert_eq!(pool.get(1), Some(&Expectation::Any));
    assert_eq!(pool.get(3), None);
}
