//! Catalog seams consulted during compilation: field facts, value
//! normalization, aliasing, composite keys, index lookups, and cost
//! estimates. The compiler owns none of these; callers implement them
//! against their store.

use crate::node::{Expr, Literal};
use derive_more::{Add, AddAssign};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    time::Duration,
};
use thiserror::Error as ThisError;

/// Datatype scope for metadata questions; empty means all datatypes.
pub type DatatypeFilter = BTreeSet<String>;

///
/// Metadata
///
/// Per-field facts, each scoped to a datatype filter. `index-only` fields
/// have no stored event form and must be answerable from the index;
/// `non-event` is the broader set that also includes composite-backed
/// fields.
///

pub trait Metadata {
    fn is_indexed(&self, field: &str, datatypes: &DatatypeFilter) -> bool;

    fn is_reverse_indexed(&self, field: &str, datatypes: &DatatypeFilter) -> bool;

    fn is_index_only(&self, field: &str, datatypes: &DatatypeFilter) -> bool;

    fn is_non_event(&self, field: &str, datatypes: &DatatypeFilter) -> bool;

    /// Every field name the catalog has ever seen, scoped to the filter.
    fn known_fields(&self, datatypes: &DatatypeFilter) -> BTreeSet<String>;

    /// Composite keys synthesizable from component fields, if any.
    fn composites(&self) -> Vec<CompositeKey> {
        Vec::new()
    }
}

///
/// CompositeKey
///

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct CompositeKey {
    pub name: String,
    pub components: Vec<String>,
}

impl CompositeKey {
    #[must_use]
    pub fn new(name: impl Into<String>, components: Vec<String>) -> Self {
        Self {
            name: name.into(),
            components,
        }
    }
}

///
/// NormalizeFailure
///
/// A normalizer declining a value. Always recoverable at this seam; the
/// normalization policy decides what becomes of the term.
///

#[derive(Clone, Debug, ThisError)]
#[error("{reason}")]
pub struct NormalizeFailure {
    pub reason: String,
}

impl NormalizeFailure {
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

///
/// Normalizer
///
/// Rewrites literals into the canonical form stored in the key space.
/// Patterns are rewritten so that their literal parts match canonical
/// values without changing what the pattern accepts.
///

pub trait Normalizer {
    fn name(&self) -> &'static str;

    fn normalize(&self, literal: &Literal) -> Result<Literal, NormalizeFailure>;

    fn normalize_pattern(&self, pattern: &str) -> Result<String, NormalizeFailure>;

    /// Whether rewriting `pattern` loses match fidelity. A lossy rewrite
    /// still bounds the index scan, but the original pattern must survive
    /// for row evaluation.
    fn is_lossy_pattern(&self, _pattern: &str) -> bool {
        false
    }
}

///
/// NormalizerRegistry
///

pub trait NormalizerRegistry {
    /// Normalizers registered for a field, in registration order.
    /// Empty means the field's values are stored verbatim.
    fn normalizers_for(&self, field: &str) -> Vec<&dyn Normalizer>;
}

///
/// QueryModel
///

pub trait QueryModel {
    /// Alias set for a field; empty means the field maps to itself.
    fn aliases(&self, field: &str) -> Vec<String>;
}

///
/// Cost
///
/// Two-part cost estimate: index work and everything else. Comparisons
/// during expansion use the combined total.
///

#[derive(
    Add, AddAssign, Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize,
)]
pub struct Cost {
    pub index_cost: u64,
    pub other_cost: u64,
}

impl Cost {
    pub const ZERO: Self = Self {
        index_cost: 0,
        other_cost: 0,
    };

    #[must_use]
    pub const fn new(index_cost: u64, other_cost: u64) -> Self {
        Self {
            index_cost,
            other_cost,
        }
    }

    #[must_use]
    pub const fn total(self) -> u64 {
        self.index_cost.saturating_add(self.other_cost)
    }
}

///
/// CostEstimator
///

pub trait CostEstimator {
    fn estimate(&self, expr: &Expr) -> Cost;
}

///
/// LookupOutcome
///
/// Result of resolving one pattern against the index: either the concrete
/// values seen, per field, or an overflow handle when the value budget
/// was exceeded mid-scan.
///

#[derive(Clone, Debug)]
pub enum LookupOutcome {
    Values(BTreeMap<String, BTreeSet<String>>),
    Overflow(OverflowHandle),
}

impl LookupOutcome {
    /// True when the lookup completed and saw no values at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Values(fields) => fields.values().all(BTreeSet::is_empty),
            Self::Overflow(_) => false,
        }
    }
}

///
/// OverflowHandle
///
/// Compact handle standing in for an expansion too large to enumerate;
/// consumed by ivarator construction.
///

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct OverflowHandle {
    pub field: String,
    pub pattern: String,
    pub estimated_cardinality: Option<u64>,
}

///
/// LookupError
///

#[derive(Clone, Debug, ThisError)]
pub enum LookupError {
    #[error("index lookup timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },

    #[error("index storage failure: {reason}")]
    Storage { reason: String },
}

impl LookupError {
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

///
/// IndexLookup
///
/// Resolves a fielded pattern against the global index. Implementations
/// must be shareable across the lookup pool.
///

pub trait IndexLookup: Send + Sync {
    fn lookup(
        &self,
        field: &str,
        pattern: &str,
        timeout: Option<Duration>,
    ) -> Result<LookupOutcome, LookupError>;
}

///
/// Providers
///
/// The catalog bundle one compilation borrows. Plain references; the
/// compiler never takes ownership of catalog state.
///

#[derive(Clone, Copy)]
pub struct Providers<'a> {
    pub metadata: &'a dyn Metadata,
    pub normalizers: &'a dyn NormalizerRegistry,
    pub model: &'a dyn QueryModel,
    pub lookup: &'a dyn IndexLookup,
    pub cost: &'a dyn CostEstimator,
}
