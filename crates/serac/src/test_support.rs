//! Shared fixtures for compiler tests: an in-memory catalog, normalizers
//! with controllable behavior, and a table-backed index lookup with
//! overflow and failure injection.

use crate::{
    config::CompilerConfig,
    context::CompileContext,
    node::{Expr, Literal},
    schema::{
        CompositeKey, Cost, CostEstimator, DatatypeFilter, IndexLookup, LookupError,
        LookupOutcome, Metadata, NormalizeFailure, Normalizer, NormalizerRegistry, OverflowHandle,
        Providers, QueryModel,
    },
};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

///
/// FixtureMetadata
///

#[derive(Default)]
pub struct FixtureMetadata {
    pub indexed: BTreeSet<String>,
    pub reverse_indexed: BTreeSet<String>,
    pub index_only: BTreeSet<String>,
    pub event_only: BTreeSet<String>,
    pub composite_keys: Vec<CompositeKey>,
}

impl FixtureMetadata {
    pub fn with_indexed(fields: &[&str]) -> Self {
        Self {
            indexed: fields.iter().map(ToString::to_string).collect(),
            ..Self::default()
        }
    }

    pub fn and_reverse(mut self, fields: &[&str]) -> Self {
        self.reverse_indexed
            .extend(fields.iter().map(ToString::to_string));
        self
    }

    pub fn and_index_only(mut self, fields: &[&str]) -> Self {
        for field in fields {
            self.index_only.insert((*field).to_string());
            self.indexed.insert((*field).to_string());
        }
        self
    }

    pub fn and_event_only(mut self, fields: &[&str]) -> Self {
        self.event_only
            .extend(fields.iter().map(ToString::to_string));
        self
    }

    pub fn and_composites(mut self, keys: Vec<CompositeKey>) -> Self {
        for key in &keys {
            self.indexed.insert(key.name.clone());
        }
        self.composite_keys = keys;
        self
    }
}

impl Metadata for FixtureMetadata {
    fn is_indexed(&self, field: &str, _datatypes: &DatatypeFilter) -> bool {
        self.indexed.contains(field)
    }

    fn is_reverse_indexed(&self, field: &str, _datatypes: &DatatypeFilter) -> bool {
        self.reverse_indexed.contains(field)
    }

    fn is_index_only(&self, field: &str, _datatypes: &DatatypeFilter) -> bool {
        self.index_only.contains(field)
    }

    fn is_non_event(&self, field: &str, _datatypes: &DatatypeFilter) -> bool {
        self.index_only.contains(field)
    }

    fn known_fields(&self, _datatypes: &DatatypeFilter) -> BTreeSet<String> {
        let mut fields = self.indexed.clone();
        fields.extend(self.reverse_indexed.iter().cloned());
        fields.extend(self.event_only.iter().cloned());
        fields
    }

    fn composites(&self) -> Vec<CompositeKey> {
        self.composite_keys.clone()
    }
}

///
/// Normalizers
///

pub struct LowercaseNormalizer;

impl Normalizer for LowercaseNormalizer {
    fn name(&self) -> &'static str {
        "lowercase"
    }

    fn normalize(&self, literal: &Literal) -> Result<Literal, NormalizeFailure> {
        match literal {
            Literal::Text(s) => Ok(Literal::Text(s.to_lowercase())),
            other => Ok(other.clone()),
        }
    }

    fn normalize_pattern(&self, pattern: &str) -> Result<String, NormalizeFailure> {
        Ok(pattern.to_lowercase())
    }
}

pub struct UppercaseNormalizer;

impl Normalizer for UppercaseNormalizer {
    fn name(&self) -> &'static str {
        "uppercase"
    }

    fn normalize(&self, literal: &Literal) -> Result<Literal, NormalizeFailure> {
        match literal {
            Literal::Text(s) => Ok(Literal::Text(s.to_uppercase())),
            other => Ok(other.clone()),
        }
    }

    fn normalize_pattern(&self, pattern: &str) -> Result<String, NormalizeFailure> {
        Ok(pattern.to_uppercase())
    }
}

/// Case-folds values and patterns, reporting every pattern fold lossy;
/// drives the keep-original-for-evaluation path.
pub struct FoldingNormalizer;

impl Normalizer for FoldingNormalizer {
    fn name(&self) -> &'static str {
        "folding"
    }

    fn normalize(&self, literal: &Literal) -> Result<Literal, NormalizeFailure> {
        match literal {
            Literal::Text(s) => Ok(Literal::Text(s.to_lowercase())),
            other => Ok(other.clone()),
        }
    }

    fn normalize_pattern(&self, pattern: &str) -> Result<String, NormalizeFailure> {
        Ok(pattern.to_lowercase())
    }

    fn is_lossy_pattern(&self, _pattern: &str) -> bool {
        true
    }
}

/// Declines every value; drives the failure-policy paths.
pub struct RejectingNormalizer;

impl Normalizer for RejectingNormalizer {
    fn name(&self) -> &'static str {
        "rejecting"
    }

    fn normalize(&self, literal: &Literal) -> Result<Literal, NormalizeFailure> {
        Err(NormalizeFailure::new(format!("no canonical form for {literal}")))
    }

    fn normalize_pattern(&self, pattern: &str) -> Result<String, NormalizeFailure> {
        Err(NormalizeFailure::new(format!(
            "no canonical form for pattern {pattern}"
        )))
    }
}

#[derive(Default)]
pub struct FixtureNormalizers {
    by_field: HashMap<String, Vec<Box<dyn Normalizer>>>,
}

impl FixtureNormalizers {
    pub fn with(mut self, field: &str, normalizer: Box<dyn Normalizer>) -> Self {
        self.by_field
            .entry(field.to_string())
            .or_default()
            .push(normalizer);
        self
    }
}

impl NormalizerRegistry for FixtureNormalizers {
    fn normalizers_for(&self, field: &str) -> Vec<&dyn Normalizer> {
        self.by_field
            .get(field)
            .map(|list| list.iter().map(Box::as_ref).collect())
            .unwrap_or_default()
    }
}

///
/// AliasModel
///

#[derive(Default)]
pub struct AliasModel {
    by_field: HashMap<String, Vec<String>>,
}

impl AliasModel {
    pub fn with(mut self, field: &str, aliases: &[&str]) -> Self {
        self.by_field.insert(
            field.to_string(),
            aliases.iter().map(ToString::to_string).collect(),
        );
        self
    }
}

impl QueryModel for AliasModel {
    fn aliases(&self, field: &str) -> Vec<String> {
        self.by_field.get(field).cloned().unwrap_or_default()
    }
}

///
/// TableLookup
///
/// Index backed by a value table. Patterns are full-match regexes;
/// fields can be primed to overflow past a value budget, fail with a
/// storage error, or time out. `hits` counts the lookups that actually
/// ran, so tests can assert memoization.
///

#[derive(Default)]
pub struct TableLookup {
    values: HashMap<String, BTreeSet<String>>,
    overflow_above: Option<usize>,
    failing: HashSet<String>,
    timing_out: HashSet<String>,
    pub hits: AtomicUsize,
}

impl TableLookup {
    pub fn with_values(mut self, field: &str, values: &[&str]) -> Self {
        self.values
            .entry(field.to_string())
            .or_default()
            .extend(values.iter().map(ToString::to_string));
        self
    }

    pub fn overflow_above(mut self, budget: usize) -> Self {
        self.overflow_above = Some(budget);
        self
    }

    pub fn failing_on(mut self, field: &str) -> Self {
        self.failing.insert(field.to_string());
        self
    }

    pub fn timing_out_on(mut self, field: &str) -> Self {
        self.timing_out.insert(field.to_string());
        self
    }

    pub fn lookups_run(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl IndexLookup for TableLookup {
    fn lookup(
        &self,
        field: &str,
        pattern: &str,
        _timeout: Option<Duration>,
    ) -> Result<LookupOutcome, LookupError> {
        self.hits.fetch_add(1, Ordering::SeqCst);

        if self.timing_out.contains(field) {
            return Err(LookupError::Timeout { elapsed_ms: 1 });
        }
        if self.failing.contains(field) {
            return Err(LookupError::Storage {
                reason: format!("injected failure for {field}"),
            });
        }

        let matcher = regex::Regex::new(&format!("^(?:{pattern})$")).map_err(|err| {
            LookupError::Storage {
                reason: format!("bad pattern {pattern}: {err}"),
            }
        })?;

        let matched: BTreeSet<String> = self
            .values
            .get(field)
            .map(|values| {
                values
                    .iter()
                    .filter(|value| matcher.is_match(value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(budget) = self.overflow_above
            && matched.len() > budget
        {
            return Ok(LookupOutcome::Overflow(OverflowHandle {
                field: field.to_string(),
                pattern: pattern.to_string(),
                estimated_cardinality: u64::try_from(matched.len()).ok(),
            }));
        }

        let mut fields = BTreeMap::new();
        fields.insert(field.to_string(), matched);
        Ok(LookupOutcome::Values(fields))
    }
}

///
/// FlatCost
///
/// Leaf costs come from a per-field table; junctions sum their children.
/// Unknown fields get the default.
///

pub struct FlatCost {
    per_field: HashMap<String, Cost>,
    default: Cost,
}

impl Default for FlatCost {
    fn default() -> Self {
        Self {
            per_field: HashMap::new(),
            default: Cost::new(1, 1),
        }
    }
}

impl FlatCost {
    pub fn with(mut self, field: &str, cost: Cost) -> Self {
        self.per_field.insert(field.to_string(), cost);
        self
    }

    pub fn defaulting_to(mut self, cost: Cost) -> Self {
        self.default = cost;
        self
    }
}

impl CostEstimator for FlatCost {
    fn estimate(&self, expr: &Expr) -> Cost {
        match expr {
            Expr::And(children) | Expr::Or(children) => children
                .iter()
                .fold(Cost::ZERO, |acc, child| acc + self.estimate(child)),
            Expr::Not(inner) | Expr::Group(inner) => self.estimate(inner),
            Expr::Marked(marker) => self.estimate(&marker.source),
            other => match other.as_field_term() {
                Some(term) => self
                    .per_field
                    .get(term.field)
                    .copied()
                    .unwrap_or(self.default),
                None => self.default,
            },
        }
    }
}

///
/// Fixture
///
/// One bag of catalog implementations with a `providers` borrow, so a
/// test builds its world in a few lines.
///

#[derive(Default)]
pub struct Fixture {
    pub metadata: FixtureMetadata,
    pub normalizers: FixtureNormalizers,
    pub model: AliasModel,
    pub lookup: TableLookup,
    pub cost: FlatCost,
}

impl Fixture {
    pub fn providers(&self) -> Providers<'_> {
        Providers {
            metadata: &self.metadata,
            normalizers: &self.normalizers,
            model: &self.model,
            lookup: &self.lookup,
            cost: &self.cost,
        }
    }

    pub fn context<'a>(&'a self, config: &'a CompilerConfig) -> CompileContext<'a> {
        CompileContext::new(config, self.providers()).unwrap()
    }
}

/// Route compiler logs through the test harness. Safe to call from every
/// test; only the first call installs the logger.
pub fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}
