//! Model-driven tree rewrites.
//!
//! The passes run in a fixed order, each one a pure tree-to-tree
//! function threaded through the compile context for configuration,
//! schema access, and reporting:
//!
//! 1. alias expansion against the query model
//! 2. multi-representation expansion through field normalizers
//! 3. composite key synthesis
//! 4. negative number literal fixup
//! 5. constant folding and redundant-predicate pruning
//!
//! Trees are re-flattened between passes so every pass sees collapsed
//! junctions.

mod composite;
mod model;
mod negatives;
pub(crate) mod prune;
mod terms;


use crate::{
    context::CompileContext,
    error::CompileError,
    node::{Expr, rewrite},
};

pub(crate) fn run_pipeline(expr: &Expr, ctx: &mut CompileContext<'_>) -> Result<Expr, CompileError> {
    let tree = rewrite::flatten(expr);
    let tree = model::expand_aliases(&tree, ctx);

    let tree = rewrite::flatten(&tree);
    let tree = terms::expand_representations(&tree, ctx)?;

    let tree = rewrite::flatten(&tree);
    let tree = composite::synthesize(&tree, ctx);

    let tree = negatives::fix(&tree);
    let tree = prune::run(&tree, ctx);

    Ok(rewrite::flatten(&tree))
}
