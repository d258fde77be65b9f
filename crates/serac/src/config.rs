//! Compiler configuration: budgets, normalization policy, lookup
//! concurrency, and overflow-scan settings. Validated once per compile.

use crate::{error::CompileError, schema::DatatypeFilter};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, path::PathBuf, time::Duration};

///
/// IvaratorSettings
///
/// Knobs carried verbatim into every overflow-scan plan node. The
/// compiler allocates spill paths from `cache_dirs` but never touches
/// the filesystem; the scan runtime does.
///

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct IvaratorSettings {
    pub cache_dirs: Vec<PathBuf>,
    pub buffer_size: usize,
    pub persist_threshold: u64,
    pub scan_timeout: Duration,
    pub max_open_files: u32,
    pub max_range_splits: u32,
    pub source_pool_size: u32,
    pub retries: u32,
}

impl Default for IvaratorSettings {
    fn default() -> Self {
        Self {
            cache_dirs: Vec::new(),
            buffer_size: 10_000,
            persist_threshold: 100_000,
            scan_timeout: Duration::from_secs(60 * 60),
            max_open_files: 100,
            max_range_splits: 11,
            source_pool_size: 16,
            retries: 2,
        }
    }
}

///
/// CompilerConfig
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CompilerConfig {
    /// Caller-assigned id; namespaces spill paths and log lines.
    pub query_id: String,

    /// Datatype scope applied to every metadata question.
    pub datatypes: DatatypeFilter,

    /// Term budget. Checked on the rewritten tree before any index
    /// lookups are dispatched, and again as expansion rebuilds terms.
    pub max_terms: usize,

    /// Worker threads for the expansion lookup pool.
    pub lookup_threads: usize,

    /// Per-lookup deadline. When set, cost gating is skipped and every
    /// structurally unnecessary pattern still expands.
    pub lookup_timeout: Option<Duration>,

    /// Expand every admissible pattern regardless of structural necessity
    /// or cost.
    pub expand_all_terms: bool,

    /// Fields whose failed normalization keeps the raw term for post-scan
    /// evaluation.
    pub strict_fields: BTreeSet<String>,

    /// Fields whose failed normalization drops the term.
    pub lenient_fields: BTreeSet<String>,

    /// Admitted function namespaces; calls outside this set are rejected.
    pub function_namespaces: BTreeSet<String>,

    /// Separator joining composite component values.
    pub composite_separator: char,

    pub ivarator: IvaratorSettings,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            query_id: "query".to_string(),
            datatypes: DatatypeFilter::new(),
            max_terms: 2500,
            lookup_threads: 8,
            lookup_timeout: None,
            expand_all_terms: false,
            strict_fields: BTreeSet::new(),
            lenient_fields: BTreeSet::new(),
            function_namespaces: BTreeSet::from(["filter".to_string()]),
            composite_separator: '\u{0}',
            ivarator: IvaratorSettings::default(),
        }
    }
}

impl CompilerConfig {
    pub fn validate(&self) -> Result<(), CompileError> {
        if self.max_terms == 0 {
            return Err(CompileError::malformed(
                "term budget must be positive",
                "configuration",
            ));
        }

        if self.lookup_threads == 0 {
            return Err(CompileError::malformed(
                "lookup pool needs at least one thread",
                "configuration",
            ));
        }

        let contested: Vec<&String> = self
            .strict_fields
            .intersection(&self.lenient_fields)
            .collect();
        if !contested.is_empty() {
            let fields = contested
                .iter()
                .map(|field| field.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(CompileError::malformed(
                format!("fields configured both strict and lenient: {fields}"),
                "configuration",
            ));
        }

        Ok(())
    }

    /// The normalization policy configured for a field, if any.
    #[must_use]
    pub fn field_policy(&self, field: &str) -> Option<crate::marker::MarkerKind> {
        if self.strict_fields.contains(field) {
            return Some(crate::marker::MarkerKind::Strict);
        }
        if self.lenient_fields.contains(field) {
            return Some(crate::marker::MarkerKind::Lenient);
        }

        None
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(CompilerConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_term_budget_is_rejected() {
        let config = CompilerConfig {
            max_terms: 0,
            ..Default::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn contested_policy_fields_are_rejected() {
        let mut config = CompilerConfig::default();
        config.strict_fields.insert("F".to_string());
        config.lenient_fields.insert("F".to_string());

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("strict and lenient"));
    }

    #[test]
    fn field_policy_resolves_per_field() {
        let mut config = CompilerConfig::default();
        config.strict_fields.insert("S".to_string());
        config.lenient_fields.insert("L".to_string());

        assert_eq!(
            config.field_policy("S"),
            Some(crate::marker::MarkerKind::Strict)
        );
        assert_eq!(
            config.field_policy("L"),
            Some(crate::marker::MarkerKind::Lenient)
        );
        assert_eq!(config.field_policy("X"), None);
    }
}
