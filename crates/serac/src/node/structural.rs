//! Structural hashing for expressions.
//!
//! Rewrite passes never store state on nodes; memo tables and idempotence
//! side tables key off these hashes instead. Junction children hash in
//! sorted order, so sibling permutation does not change identity.
#![expect(clippy::cast_possible_truncation)]

use crate::node::{Expr, Literal};
use std::collections::{HashMap, HashSet};
use xxhash_rust::xxh3::Xxh3;

const TAG_AND: u8 = 0x01;
const TAG_OR: u8 = 0x02;
const TAG_NOT: u8 = 0x03;
const TAG_COMPARE: u8 = 0x04;
const TAG_FUNCTION: u8 = 0x05;
const TAG_LITERAL: u8 = 0x06;
const TAG_IDENT: u8 = 0x07;
const TAG_MARKED: u8 = 0x08;

const TAG_NULL: u8 = 0x10;
const TAG_BOOL: u8 = 0x11;
const TAG_INT: u8 = 0x12;
const TAG_FLOAT: u8 = 0x13;
const TAG_TEXT: u8 = 0x14;

/// Order-insensitive (for junctions) content hash of an expression.
/// Grouping wrappers are transparent.
#[must_use]
pub fn structural_hash(expr: &Expr) -> u64 {
    let mut hasher = Xxh3::new();
    write_expr(&mut hasher, expr);
    hasher.digest()
}

/// Memo key for one index lookup task.
#[must_use]
pub fn term_hash(field: &str, pattern: &str) -> u64 {
    let mut hasher = Xxh3::new();
    write_str(&mut hasher, field);
    write_str(&mut hasher, pattern);
    hasher.digest()
}

/// Idempotence key for an overflow scan: the field plus its source subtree.
#[must_use]
pub fn source_hash(field: &str, source: &Expr) -> u64 {
    let mut hasher = Xxh3::new();
    write_str(&mut hasher, field);
    write_expr(&mut hasher, source);
    hasher.digest()
}

fn write_expr(hasher: &mut Xxh3, expr: &Expr) {
    match expr.peel() {
        Expr::And(children) => write_junction(hasher, TAG_AND, children),
        Expr::Or(children) => write_junction(hasher, TAG_OR, children),
        Expr::Not(inner) => {
            write_tag(hasher, TAG_NOT);
            write_expr(hasher, inner);
        }
        Expr::Compare(cmp) => {
            write_tag(hasher, TAG_COMPARE);
            write_tag(hasher, cmp.op.tag());
            write_expr(hasher, &cmp.lhs);
            write_expr(hasher, &cmp.rhs);
        }
        Expr::Function(call) => {
            write_tag(hasher, TAG_FUNCTION);
            write_str(hasher, &call.namespace);
            write_str(hasher, &call.name);
            write_u32(hasher, call.args.len() as u32);
            for arg in &call.args {
                write_expr(hasher, arg);
            }
        }
        Expr::Literal(lit) => {
            write_tag(hasher, TAG_LITERAL);
            write_literal(hasher, lit);
        }
        Expr::Ident(name) => {
            write_tag(hasher, TAG_IDENT);
            write_str(hasher, name);
        }
        Expr::Marked(marker) => {
            write_tag(hasher, TAG_MARKED);
            write_tag(hasher, marker.kind.tag());
            write_expr(hasher, &marker.source);
        }
        Expr::Group(inner) => write_expr(hasher, inner),
    }
}

fn write_junction(hasher: &mut Xxh3, tag: u8, children: &[Expr]) {
    let mut hashes: Vec<u64> = children.iter().map(structural_hash).collect();
    hashes.sort_unstable();

    write_tag(hasher, tag);
    write_u32(hasher, hashes.len() as u32);
    for child in hashes {
        hasher.update(&child.to_be_bytes());
    }
}

fn write_literal(hasher: &mut Xxh3, lit: &Literal) {
    match lit {
        Literal::Null => write_tag(hasher, TAG_NULL),
        Literal::Bool(b) => {
            write_tag(hasher, TAG_BOOL);
            write_tag(hasher, u8::from(*b));
        }
        Literal::Int(n) => {
            write_tag(hasher, TAG_INT);
            hasher.update(&n.to_be_bytes());
        }
        Literal::Float(x) => {
            write_tag(hasher, TAG_FLOAT);
            hasher.update(&x.to_be_bytes());
        }
        Literal::Text(s) => {
            write_tag(hasher, TAG_TEXT);
            write_str(hasher, s);
        }
    }
}

fn write_str(hasher: &mut Xxh3, value: &str) {
    write_u32(hasher, value.len() as u32);
    hasher.update(value.as_bytes());
}

fn write_u32(hasher: &mut Xxh3, value: u32) {
    hasher.update(&value.to_be_bytes());
}

fn write_tag(hasher: &mut Xxh3, tag: u8) {
    hasher.update(&[tag]);
}

///
/// StructuralSet
///
/// Set of subtrees keyed by structural hash.
///

#[derive(Debug, Default)]
pub struct StructuralSet(HashSet<u64>);

impl StructuralSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the subtree was not present before.
    pub fn insert(&mut self, expr: &Expr) -> bool {
        self.0.insert(structural_hash(expr))
    }

    #[must_use]
    pub fn contains(&self, expr: &Expr) -> bool {
        self.0.contains(&structural_hash(expr))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

///
/// StructuralMap
///
/// Map from subtree (or precomputed key) to pass-local state.
///

#[derive(Debug)]
pub struct StructuralMap<V>(HashMap<u64, V>);

impl<V> StructuralMap<V> {
    #[must_use]
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn insert(&mut self, key: u64, value: V) -> Option<V> {
        self.0.insert(key, value)
    }

    #[must_use]
    pub fn get(&self, key: u64) -> Option<&V> {
        self.0.get(&key)
    }

    #[must_use]
    pub fn contains(&self, key: u64) -> bool {
        self.0.contains_key(&key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<V> Default for StructuralMap<V> {
    fn default() -> Self {
        Self::new()
    }
}
