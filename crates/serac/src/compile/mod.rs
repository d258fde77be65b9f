//! Compilation entry point: validation, the rewrite pipeline,
//! classification, cost-based expansion, and plan emission, in that
//! order. Every fatal error carries the originating subtree rendered
//! into its message.

use crate::{
    classify::{ClassifyMode, Executability, classify},
    config::CompilerConfig,
    context::{CompileContext, CompileReport},
    error::CompileError,
    expand, marker,
    node::Expr,
    plan::{self, PlanFingerprint, PlanNode},
    rewrite,
    schema::{DatatypeFilter, Metadata, Providers},
};

///
/// CompiledQuery
///
/// The emitted artifact: the scan plan, the rewritten tree the
/// post-scan evaluator runs against matched records, and the compile's
/// diagnostics.
///

#[derive(Clone, Debug)]
pub struct CompiledQuery {
    pub plan: PlanNode,
    pub evaluation: Expr,
    pub fully_satisfiable: bool,
    pub classification: Executability,
    pub fingerprint: PlanFingerprint,
    pub report: CompileReport,
}

///
/// compile
///

/// Compile a parsed comparison tree into an executable scan plan.
pub fn compile(
    expr: &Expr,
    config: &CompilerConfig,
    providers: Providers<'_>,
) -> Result<CompiledQuery, CompileError> {
    let mut ctx = CompileContext::new(config, providers)?;
    validate(expr, &ctx)?;

    let tree = rewrite::run_pipeline(expr, &mut ctx)?;
    match tree.as_bool() {
        Some(true) => {
            return Err(CompileError::unsupported(
                "query reduces to a constant and cannot bound a scan",
                expr,
            ));
        }
        Some(false) => return Err(CompileError::unsatisfiable(expr)),
        None => {}
    }

    let before = classify(
        &tree,
        ctx.providers.metadata,
        &config.datatypes,
        ClassifyMode::WholeQuery,
    );
    log::debug!("[{}] pre-expansion classification: {before}", config.query_id);

    let tree = expand::expand(&tree, &mut ctx)?;

    let classification = classify(
        &tree,
        ctx.providers.metadata,
        &config.datatypes,
        ClassifyMode::WholeQuery,
    );
    if classification == Executability::Error {
        return Err(CompileError::malformed(
            "the index cannot answer a required term",
            &tree,
        ));
    }

    let covered = classification.is_executable()
        && covers_fully(&tree, ctx.providers.metadata, &config.datatypes);
    ctx.set_expected_executable(covered);

    let plan = plan::compile(&tree, &mut ctx)?;
    ctx.seal_report();

    let fingerprint = plan.fingerprint();
    log::debug!(
        "[{}] compiled plan {fingerprint} with {} leaves",
        config.query_id,
        plan.leaf_count()
    );

    Ok(CompiledQuery {
        plan,
        evaluation: tree,
        fully_satisfiable: ctx.fully_satisfiable(),
        classification,
        fingerprint,
        report: ctx.report(),
    })
}

/// Structural admission: junctions are non-empty, marker chains carry no
/// conflicting policies, and function calls stay inside the configured
/// namespaces. Runs before any rewrite touches the tree.
fn validate(expr: &Expr, ctx: &CompileContext<'_>) -> Result<(), CompileError> {
    match expr {
        Expr::And(children) | Expr::Or(children) => {
            if children.is_empty() {
                return Err(CompileError::malformed("empty junction", expr));
            }
            for child in children {
                validate(child, ctx)?;
            }
            Ok(())
        }
        Expr::Not(inner) | Expr::Group(inner) => validate(inner, ctx),
        Expr::Marked(_) => {
            let chain = marker::unwrap_fully(expr);
            if let Some((left, right)) = chain.conflict() {
                return Err(CompileError::malformed(
                    format!("conflicting markers {} and {}", left.label(), right.label()),
                    expr,
                ));
            }
            validate(chain.source, ctx)
        }
        Expr::Function(call) => {
            if !ctx.config.function_namespaces.contains(call.namespace.as_str()) {
                return Err(CompileError::unsupported(
                    format!("function namespace '{}'", call.namespace),
                    expr,
                ));
            }
            for arg in &call.args {
                validate(arg, ctx)?;
            }
            Ok(())
        }
        Expr::Compare(_) | Expr::Literal(_) | Expr::Ident(_) => Ok(()),
    }
}

/// Whether the plan will cover the query with no post-scan residue.
/// Every leaf must be answerable inside an index scan, exclusion
/// included, which is the field-index classification. A pattern still
/// bare after expansion was kept for row evaluation, so it is residue
/// no matter how its field classifies.
fn covers_fully(expr: &Expr, metadata: &dyn Metadata, datatypes: &DatatypeFilter) -> bool {
    match expr {
        Expr::And(children) | Expr::Or(children) => children
            .iter()
            .all(|child| covers_fully(child, metadata, datatypes)),
        Expr::Not(inner) | Expr::Group(inner) => covers_fully(inner, metadata, datatypes),
        Expr::Compare(cmp)
            if cmp
                .field_op_literal()
                .is_some_and(|term| term.op.is_regex()) =>
        {
            false
        }
        leaf => matches!(
            classify(leaf, metadata, datatypes, ClassifyMode::FieldIndex),
            Executability::Executable | Executability::Ignorable
        ),
    }
}

///
/// TESTS
///
