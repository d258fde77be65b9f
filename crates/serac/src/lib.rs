//! Compiler from boolean field-comparison trees to scan plans for a
//! range-sorted key-value index. Queries are validated, normalized by a
//! fixed rewrite pipeline, classified for executability, expanded
//! against the index under a cost gate, and emitted as an
//! intersection/union plan with the post-scan residue tracked alongside.

// public exports are one module level down
pub mod classify;
pub mod compile;
pub mod config;
pub mod context;
pub mod error;
pub mod marker;
pub mod node;
pub mod plan;
pub mod schema;

pub(crate) mod expand;
pub(crate) mod rewrite;

// test
#[cfg(test)]
pub(crate) mod test_support;

///
/// Prelude
///
/// The compile entry point and the vocabulary a caller needs to drive
/// it. Pass internals stay one module level down.
///

pub mod prelude {
    pub use crate::{
        classify::{ClassifyMode, Executability, classify},
        compile::{CompiledQuery, compile},
        config::{CompilerConfig, IvaratorSettings},
        context::CompileReport,
        error::CompileError,
        node::{Compare, CompareOp, Expr, FunctionCall, Literal},
        plan::{IvaratorPlan, IvaratorSource, PlanFingerprint, PlanNode},
        schema::{
            Cost, CostEstimator, DatatypeFilter, IndexLookup, Metadata, NormalizerRegistry,
            Providers, QueryModel,
        },
    };
}
