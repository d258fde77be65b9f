//! Multi-representation expansion.
//!
//! Every comparison literal is rewritten through the normalizers
//! registered for its field. One normalizer rewrites in place; several
//! produce a junction of the distinct canonical forms. Bounded range
//! pairs normalize as units, both bounds under the same normalizer, and
//! come out wrapped as bounded-range markers ready for planning.
//! Rebuilt junctions drop structurally duplicate arms, so a tree that
//! already carries its representations gains nothing from another pass.

use crate::{
    context::CompileContext,
    error::CompileError,
    marker::{self, Marker, MarkerKind},
    node::{
        Compare, CompareOp, Expr, Literal,
        range::{self, LiteralRange},
        rewrite,
        structural::StructuralSet,
    },
    schema::{NormalizeFailure, Normalizer},
};
use std::{collections::HashMap, ops::Bound};

pub(crate) fn expand_representations(
    expr: &Expr,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, CompileError> {
    walk(expr, ctx, None)
}

fn walk(
    expr: &Expr,
    ctx: &mut CompileContext<'_>,
    policy: Option<MarkerKind>,
) -> Result<Expr, CompileError> {
    Ok(match expr {
        Expr::And(children) => walk_conjunction(children, ctx, policy)?,
        Expr::Or(children) => {
            let arms = children
                .iter()
                .map(|child| walk(child, ctx, policy))
                .collect::<Result<Vec<_>, _>>()?;
            Expr::Or(dedup_arms(arms))
        }
        Expr::Not(inner) => Expr::not(walk(inner, ctx, policy)?),
        Expr::Group(inner) => Expr::group(walk(inner, ctx, policy)?),
        Expr::Compare(cmp) => rewrite_compare(cmp, ctx, policy)?,
        Expr::Marked(m) if m.kind.is_policy() => Expr::Marked(Marker {
            kind: m.kind,
            source: Box::new(walk(&m.source, ctx, Some(m.kind))?),
        }),
        other => other.clone(),
    })
}

fn walk_conjunction(
    children: &[Expr],
    ctx: &mut CompileContext<'_>,
    policy: Option<MarkerKind>,
) -> Result<Expr, CompileError> {
    let found = range::find_bounded_ranges(children);
    let mut replaced: HashMap<usize, Expr> = HashMap::new();
    let mut consumed = vec![false; children.len()];

    for fr in &found {
        let unit = normalize_range_unit(&fr.range, ctx, policy)?;
        replaced.insert(fr.lower_slot, unit);
        consumed[fr.upper_slot] = true;
    }

    let mut out = Vec::with_capacity(children.len());
    for (slot, child) in children.iter().enumerate() {
        if consumed[slot] {
            continue;
        }
        if let Some(unit) = replaced.remove(&slot) {
            out.push(unit);
            continue;
        }
        out.push(walk(child, ctx, policy)?);
    }

    Ok(Expr::And(dedup_arms(out)))
}

/// Drop junction arms already seen in this junction, by structural hash.
fn dedup_arms(arms: Vec<Expr>) -> Vec<Expr> {
    let mut seen = StructuralSet::new();
    arms.into_iter().filter(|arm| seen.insert(arm)).collect()
}

/// Normalize a bounded range as a unit. Both bounds must succeed under
/// the same normalizer for that representation to count.
fn normalize_range_unit(
    range: &LiteralRange,
    ctx: &mut CompileContext<'_>,
    policy: Option<MarkerKind>,
) -> Result<Expr, CompileError> {
    let normalizers = ctx.providers.normalizers.normalizers_for(&range.field);
    if normalizers.is_empty() {
        return Ok(range.clone().into_marked());
    }

    let mut variants: Vec<LiteralRange> = Vec::new();
    for normalizer in &normalizers {
        match normalize_range(range, *normalizer) {
            Ok(variant) => {
                if !variants.contains(&variant) {
                    variants.push(variant);
                }
            }
            Err(failure) => log::debug!(
                "normalizer {} declined range {range}: {failure}",
                normalizer.name()
            ),
        }
    }

    if variants.is_empty() {
        let original = Expr::group(range.to_conjunction());
        let field = range.field.clone();
        return failed_term(original, &field, false, ctx, policy);
    }

    ctx.report.representations_added += variants.len() - 1;
    let arms: Vec<Expr> = variants.into_iter().map(LiteralRange::into_marked).collect();

    Ok(assemble(arms))
}

fn normalize_range(
    range: &LiteralRange,
    normalizer: &dyn Normalizer,
) -> Result<LiteralRange, NormalizeFailure> {
    Ok(LiteralRange {
        field: range.field.clone(),
        lower: normalize_bound(&range.lower, normalizer)?,
        upper: normalize_bound(&range.upper, normalizer)?,
    })
}

fn normalize_bound(
    bound: &Bound<Literal>,
    normalizer: &dyn Normalizer,
) -> Result<Bound<Literal>, NormalizeFailure> {
    Ok(match bound {
        Bound::Included(lit) => Bound::Included(normalizer.normalize(lit)?),
        Bound::Excluded(lit) => Bound::Excluded(normalizer.normalize(lit)?),
        Bound::Unbounded => Bound::Unbounded,
    })
}

fn rewrite_compare(
    cmp: &Compare,
    ctx: &mut CompileContext<'_>,
    policy: Option<MarkerKind>,
) -> Result<Expr, CompileError> {
    let Some(term) = cmp.field_op_literal() else {
        // identifier-to-identifier and literal-to-literal comparisons
        // pass through untouched
        return Ok(Expr::Compare(cmp.clone()));
    };

    if term.literal.is_null() {
        return Ok(Expr::Compare(cmp.clone()));
    }

    let field = term.field.to_string();
    let op = term.op;
    let normalizers = ctx.providers.normalizers.normalizers_for(&field);
    if normalizers.is_empty() {
        return Ok(Expr::Compare(cmp.clone()));
    }

    if op.is_regex() {
        let Some(pattern) = term.literal.as_text() else {
            return Err(CompileError::malformed(
                "regex operand must be a text pattern",
                Expr::Compare(cmp.clone()),
            ));
        };

        let mut variants: Vec<String> = Vec::new();
        let mut lossy = false;
        for normalizer in &normalizers {
            match normalizer.normalize_pattern(pattern) {
                Ok(variant) => {
                    if variant != pattern && normalizer.is_lossy_pattern(pattern) {
                        lossy = true;
                    }
                    if !variants.contains(&variant) {
                        variants.push(variant);
                    }
                }
                Err(failure) => log::debug!(
                    "normalizer {} declined pattern {pattern}: {failure}",
                    normalizer.name()
                ),
            }
        }

        if variants.is_empty() {
            return failed_term(Expr::Compare(cmp.clone()), &field, true, ctx, policy);
        }

        ctx.report.representations_added += variants.len() - 1;
        let arms: Vec<Expr> = variants
            .into_iter()
            .map(|variant| Expr::Compare(Compare::term(&field, op, Literal::Text(variant))))
            .collect();

        let indexed = assemble_by_op(arms, op);
        if lossy {
            // a lossy rewrite bounds the index but cannot replace the
            // original at evaluation time
            let original = marker::wrap(MarkerKind::EvaluationOnly, Expr::Compare(cmp.clone()));
            return Ok(Expr::group(Expr::And(vec![indexed, original])));
        }

        return Ok(indexed);
    }

    let mut variants: Vec<Literal> = Vec::new();
    for normalizer in &normalizers {
        match normalizer.normalize(term.literal) {
            Ok(variant) => {
                if !variants.contains(&variant) {
                    variants.push(variant);
                }
            }
            Err(failure) => log::debug!(
                "normalizer {} declined literal {}: {failure}",
                normalizer.name(),
                term.literal
            ),
        }
    }

    if variants.is_empty() {
        return failed_term(Expr::Compare(cmp.clone()), &field, false, ctx, policy);
    }

    ctx.report.representations_added += variants.len() - 1;
    let arms: Vec<Expr> = variants
        .into_iter()
        .map(|variant| Expr::Compare(Compare::term(&field, op, variant)))
        .collect();

    Ok(assemble_by_op(arms, op))
}

/// Apply the normalization-failure policy when a term is left with no
/// viable representation.
fn failed_term(
    original: Expr,
    field: &str,
    is_regex: bool,
    ctx: &mut CompileContext<'_>,
    policy: Option<MarkerKind>,
) -> Result<Expr, CompileError> {
    if ctx
        .providers
        .metadata
        .is_index_only(field, &ctx.config.datatypes)
    {
        return Err(CompileError::normalization(
            format!("no viable representation for index-only field {field}"),
            original,
        ));
    }

    let effective = policy.or_else(|| ctx.config.field_policy(field));
    ctx.report.terms_deferred += 1;

    match effective {
        Some(MarkerKind::Strict) => Ok(marker::wrap(MarkerKind::EvaluationOnly, original)),
        Some(_) => {
            log::debug!("[{}] dropping unnormalizable term `{original}`", ctx.config.query_id);
            Ok(marker::wrap(MarkerKind::Dropped, original))
        }
        None if is_regex => Ok(marker::wrap(MarkerKind::EvaluationOnly, original)),
        None => {
            log::debug!("[{}] dropping unnormalizable term `{original}`", ctx.config.query_id);
            Ok(marker::wrap(MarkerKind::Dropped, original))
        }
    }
}

fn assemble(arms: Vec<Expr>) -> Expr {
    let junction = rewrite::disjoin(arms);
    match junction {
        Expr::And(_) | Expr::Or(_) => Expr::group(junction),
        other => other,
    }
}

fn assemble_by_op(arms: Vec<Expr>, op: CompareOp) -> Expr {
    let junction = if op.is_negative() {
        rewrite::conjoin(arms)
    } else {
        rewrite::disjoin(arms)
    };

    match junction {
        Expr::And(_) | Expr::Or(_) => Expr::group(junction),
        other => other,
    }
}
