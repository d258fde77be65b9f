//! Compile-time error taxonomy.
//!
//! Every variant is fatal to the compilation that raised it. Index
//! inconsistencies are deliberately absent: they are never fatal and
//! surface as a warning plus a cleared satisfiability flag on the
//! artifact instead.

use crate::schema::LookupError;
use std::fmt;
use thiserror::Error as ThisError;

///
/// CompileError
///
/// `context` always carries the canonical rendering of the originating
/// subtree (or `configuration` for pre-flight failures).
///

#[remain::sorted]
#[derive(Debug, ThisError)]
pub enum CompileError {
    #[error("malformed query: {reason} in `{context}`")]
    Malformed { reason: String, context: String },

    #[error("normalization failed: {reason} for `{context}`")]
    Normalization { reason: String, context: String },

    #[error("storage failure while resolving `{context}`: {source}")]
    Storage {
        #[source]
        source: LookupError,
        context: String,
    },

    #[error("term budget exceeded: {found} terms over budget {budget}")]
    TermBudgetExceeded { found: usize, budget: usize },

    #[error("unsatisfiable expansion: `{context}` matches nothing outside a union")]
    Unsatisfiable { context: String },

    #[error("unsupported construct: {reason} in `{context}`")]
    Unsupported { reason: String, context: String },
}

impl CompileError {
    pub fn malformed(reason: impl Into<String>, context: impl fmt::Display) -> Self {
        Self::Malformed {
            reason: reason.into(),
            context: context.to_string(),
        }
    }

    pub fn normalization(reason: impl Into<String>, context: impl fmt::Display) -> Self {
        Self::Normalization {
            reason: reason.into(),
            context: context.to_string(),
        }
    }

    pub fn storage(source: LookupError, context: impl fmt::Display) -> Self {
        Self::Storage {
            source,
            context: context.to_string(),
        }
    }

    pub const fn term_budget(found: usize, budget: usize) -> Self {
        Self::TermBudgetExceeded { found, budget }
    }

    pub fn unsatisfiable(context: impl fmt::Display) -> Self {
        Self::Unsatisfiable {
            context: context.to_string(),
        }
    }

    pub fn unsupported(reason: impl Into<String>, context: impl fmt::Display) -> Self {
        Self::Unsupported {
            reason: reason.into(),
            context: context.to_string(),
        }
    }

    /// Stable lowercase label for log lines and reports.
    #[must_use]
    pub const fn kind_label(&self) -> &'static str {
        match self {
            Self::Malformed { .. } => "malformed-query",
            Self::Normalization { .. } => "normalization-failure",
            Self::Storage { .. } => "storage-failure",
            Self::TermBudgetExceeded { .. } => "term-budget-exceeded",
            Self::Unsatisfiable { .. } => "unsatisfiable-expansion",
            Self::Unsupported { .. } => "unsupported-construct",
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Expr;

    #[test]
    fn errors_carry_subtree_context() {
        let err = CompileError::malformed("negation at root", &Expr::not(Expr::eq("F", "v")));

        assert_eq!(
            err.to_string(),
            "malformed query: negation at root in `!(F == 'v')`"
        );
    }

    #[test]
    fn storage_errors_expose_their_source() {
        use std::error::Error;

        let err = CompileError::storage(
            LookupError::Timeout { elapsed_ms: 1200 },
            &Expr::matches("F", "a.*"),
        );

        assert!(err.source().is_some());
        assert_eq!(err.kind_label(), "storage-failure");
    }
}
