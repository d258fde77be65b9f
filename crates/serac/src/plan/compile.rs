//! Terminal pass: walk the rewritten, expanded tree and emit the plan.
//!
//! Leaves become index probes or range scans; exceeded markers become
//! overflow scans; deferral markers and unindexable terms drop out of
//! the plan and flip the satisfiability flag for the post-scan
//! evaluator. A negation places its subtree on the enclosing junction's
//! exclude side; a junction left holding only exclusions inverts
//! through De Morgan onto its parent's opposite side.

use crate::{
    context::CompileContext,
    error::CompileError,
    marker::{Marker, MarkerKind},
    node::{CompareOp, Expr, range::LiteralRange},
    plan::{JunctionBuilder, PlanNode, ivarator},
};

/// What one child contributed to its enclosing builder. Unions use this
/// to tell bounded arms from fallbacks.
#[derive(Clone, Copy, Default)]
struct Added {
    includes: usize,
    excludes: usize,
}

impl Added {
    const fn none() -> Self {
        Self {
            includes: 0,
            excludes: 0,
        }
    }

    const fn one(excluded: bool) -> Self {
        if excluded {
            Self {
                includes: 0,
                excludes: 1,
            }
        } else {
            Self {
                includes: 1,
                excludes: 0,
            }
        }
    }
}

/// Compile the plan for a rewritten tree.
pub(crate) fn compile(expr: &Expr, ctx: &mut CompileContext<'_>) -> Result<PlanNode, CompileError> {
    let mut root = JunctionBuilder::conjunction();
    add(expr, &mut root, false, ctx)?;

    if root.is_empty() {
        return Err(CompileError::unsupported(
            "no index-bounded terms to plan",
            expr,
        ));
    }

    root.build(expr)
}

fn add(
    expr: &Expr,
    parent: &mut JunctionBuilder,
    negated: bool,
    ctx: &mut CompileContext<'_>,
) -> Result<Added, CompileError> {
    match expr {
        Expr::And(children) | Expr::Or(children) => {
            let conjunction = matches!(expr, Expr::And(_));
            let mut builder = if conjunction {
                JunctionBuilder::conjunction()
            } else {
                JunctionBuilder::disjunction()
            };

            let mut starved = false;
            let mut saw_include = false;
            let mut saw_exclude = false;
            for child in children {
                let added = add(child, &mut builder, false, ctx)?;
                starved |= added.includes == 0 && added.excludes == 0;
                saw_include |= added.includes > 0;
                saw_exclude |= added.excludes > 0;
            }

            // A union is only as bounded as its widest arm: one arm
            // outside the index, or mixed with complements, makes the
            // whole union unplannable. Intersections just tighten
            // around whatever remains.
            if !conjunction && (starved || (saw_include && saw_exclude)) {
                ctx.fall_back("union arm is not index-bounded", expr);
                return Ok(Added::none());
            }
            if builder.is_empty() {
                return Ok(Added::none());
            }
            if builder.is_purely_excluding() {
                place(parent, builder.inverted(), !negated);
                return Ok(Added::one(!negated));
            }

            let node = builder.build(expr)?;
            place(parent, node, negated);
            Ok(Added::one(negated))
        }
        Expr::Not(inner) => add(inner, parent, !negated, ctx),
        Expr::Group(inner) => add(inner, parent, negated, ctx),
        Expr::Marked(marker) => add_marked(marker, expr, parent, negated, ctx),
        Expr::Compare(_) => add_comparison(expr, parent, negated, ctx),
        Expr::Function(_) => {
            ctx.fall_back("function evaluated post-scan", expr);
            Ok(Added::none())
        }
        Expr::Literal(_) | Expr::Ident(_) => Ok(Added::none()),
    }
}

fn add_comparison(
    leaf: &Expr,
    parent: &mut JunctionBuilder,
    negated: bool,
    ctx: &mut CompileContext<'_>,
) -> Result<Added, CompileError> {
    let Some(term) = leaf.as_field_term() else {
        ctx.fall_back("comparison without a field/literal shape", leaf);
        return Ok(Added::none());
    };

    match term.op {
        CompareOp::Eq | CompareOp::Ne => {
            if term.literal.is_null() {
                if ctx
                    .providers
                    .metadata
                    .is_index_only(term.field, &ctx.config.datatypes)
                {
                    return Err(CompileError::malformed(
                        format!("index-only field {} compared against null", term.field),
                        leaf,
                    ));
                }
                ctx.fall_back("null comparison evaluated post-scan", leaf);
                return Ok(Added::none());
            }
            if !ctx
                .providers
                .metadata
                .is_indexed(term.field, &ctx.config.datatypes)
            {
                ctx.fall_back("unindexed field", leaf);
                return Ok(Added::none());
            }

            let excluded = negated ^ (term.op == CompareOp::Ne);
            parent.probe(term.field, &term.literal.render(), excluded);
            Ok(Added::one(excluded))
        }
        op if op.is_regex() => {
            ctx.fall_back("unexpanded pattern evaluated post-scan", leaf);
            Ok(Added::none())
        }
        _ => {
            ctx.fall_back("unbounded relational term", leaf);
            Ok(Added::none())
        }
    }
}

fn add_marked(
    marker: &Marker,
    whole: &Expr,
    parent: &mut JunctionBuilder,
    negated: bool,
    ctx: &mut CompileContext<'_>,
) -> Result<Added, CompileError> {
    match marker.kind {
        MarkerKind::Strict | MarkerKind::Lenient => add(&marker.source, parent, negated, ctx),
        MarkerKind::BoundedRange => {
            let range = LiteralRange::from_marked_source(&marker.source)
                .map_err(|err| CompileError::malformed(err.to_string(), whole))?;
            if !ctx
                .providers
                .metadata
                .is_indexed(&range.field, &ctx.config.datatypes)
            {
                ctx.fall_back("range on an unindexed field", whole);
                return Ok(Added::none());
            }

            place(parent, PlanNode::Range(range), negated);
            Ok(Added::one(negated))
        }
        MarkerKind::Delayed | MarkerKind::EvaluationOnly | MarkerKind::IndexHole => {
            ctx.fall_back("deferred term evaluated post-scan", whole);
            Ok(Added::none())
        }
        // a dropped term is gone entirely; nothing to plan or evaluate
        MarkerKind::Dropped => Ok(Added::none()),
        MarkerKind::ExceededValue | MarkerKind::ExceededTerm => {
            let (field, source) = ivarator::source_of(&marker.source)?;
            let plan = ivarator::build(&field, source, &marker.source, ctx)?;

            let negative = marker
                .source
                .as_field_term()
                .is_some_and(|term| term.op.is_negative());
            let excluded = negated ^ negative;
            place(parent, PlanNode::Ivarator(plan), excluded);

            if marker.kind == MarkerKind::ExceededTerm {
                ctx.fall_back("timed-out term needs post-scan confirmation", whole);
            }
            Ok(Added::one(excluded))
        }
        MarkerKind::ExceededOr => {
            let (field, source) = ivarator::union_values(&marker.source)?;
            let plan = ivarator::build(&field, source, &marker.source, ctx)?;

            place(parent, PlanNode::Ivarator(plan), negated);
            Ok(Added::one(negated))
        }
    }
}

fn place(parent: &mut JunctionBuilder, node: PlanNode, excluded: bool) {
    if excluded {
        parent.exclude(node);
    } else {
        parent.include(node);
    }
}
