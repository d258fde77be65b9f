//! Constant folding and redundant-predicate pruning.
//!
//! Nodes carry a three-valued truth state: comparison leaves are unknown
//! until data is consulted, boolean literals are known, and junctions
//! combine their children. Known children that cannot change their
//! junction's outcome are removed; a child that forces the outcome
//! replaces the junction with a constant. A second walk drops
//! `!(F == null)` conjuncts whose field is already positively constrained
//! by a sibling, since any row reaching them has F present.

use crate::{
    context::CompileContext,
    marker::MarkerKind,
    node::{CompareOp, Expr, range::LiteralRange, rewrite},
};
use std::collections::HashSet;

pub(crate) fn run(expr: &Expr, ctx: &mut CompileContext<'_>) -> Expr {
    let folded = fold(expr, &mut ctx.report.subtrees_pruned);
    strip_not_null(&folded, &mut ctx.report.subtrees_pruned)
}

fn fold(expr: &Expr, pruned: &mut usize) -> Expr {
    match expr {
        Expr::And(children) => fold_junction(children, true, pruned),
        Expr::Or(children) => fold_junction(children, false, pruned),
        Expr::Not(inner) => {
            let inner = fold(inner, pruned);
            if let Some(known) = inner.as_bool() {
                *pruned += 1;
                return Expr::lit(!known);
            }
            Expr::Not(Box::new(inner))
        }
        Expr::Group(inner) => {
            let inner = fold(inner, pruned);
            if inner.as_bool().is_some() {
                return inner;
            }
            Expr::group(inner)
        }
        // marker sources are opaque to folding
        other => other.clone(),
    }
}

fn fold_junction(children: &[Expr], is_and: bool, pruned: &mut usize) -> Expr {
    let mut kept = Vec::with_capacity(children.len());

    for child in children {
        let child = fold(child, pruned);
        match child.as_bool() {
            // a false conjunct or true disjunct decides the junction
            Some(known) if known != is_and => {
                *pruned += 1;
                return Expr::lit(known);
            }
            // identity operands drop out
            Some(_) => *pruned += 1,
            None => kept.push(child),
        }
    }

    if is_and {
        rewrite::conjoin(kept)
    } else {
        rewrite::disjoin(kept)
    }
}

fn strip_not_null(expr: &Expr, pruned: &mut usize) -> Expr {
    match expr {
        Expr::And(children) => {
            let positives = positive_fields(children);
            let mut kept = Vec::with_capacity(children.len());

            for child in children {
                if let Some(field) = not_null_field(child)
                    && positives.contains(field)
                {
                    *pruned += 1;
                    continue;
                }
                kept.push(strip_not_null(child, pruned));
            }

            rewrite::conjoin(kept)
        }
        Expr::Or(children) => Expr::Or(
            children
                .iter()
                .map(|child| strip_not_null(child, pruned))
                .collect(),
        ),
        Expr::Not(inner) => Expr::Not(Box::new(strip_not_null(inner, pruned))),
        Expr::Group(inner) => Expr::group(strip_not_null(inner, pruned)),
        other => other.clone(),
    }
}

/// The field of a `!(F == null)` or `F != null` existence check.
fn not_null_field(child: &Expr) -> Option<&str> {
    match child.peel() {
        Expr::Not(inner) => {
            let term = inner.as_field_term()?;
            (term.op == CompareOp::Eq && term.literal.is_null()).then_some(term.field)
        }
        Expr::Compare(cmp) => {
            let term = cmp.field_op_literal()?;
            (term.op == CompareOp::Ne && term.literal.is_null()).then_some(term.field)
        }
        _ => None,
    }
}

/// Fields positively constrained by at least one conjunct: an equality or
/// regex match, a bounded range, or a disjunction every arm of which
/// constrains the field.
fn positive_fields(children: &[Expr]) -> HashSet<String> {
    let mut fields = HashSet::new();
    for child in children {
        add_positive_fields(child, &mut fields);
    }
    fields
}

fn add_positive_fields(child: &Expr, fields: &mut HashSet<String>) {
    match child.peel() {
        Expr::Compare(cmp) => {
            if let Some(term) = cmp.field_op_literal()
                && matches!(term.op, CompareOp::Eq | CompareOp::RegexMatch)
                && !term.literal.is_null()
            {
                fields.insert(term.field.to_string());
            }
        }
        Expr::Marked(marker) if marker.kind == MarkerKind::BoundedRange => {
            if let Ok(range) = LiteralRange::from_marked_source(&marker.source) {
                fields.insert(range.field);
            }
        }
        Expr::Or(arms) => {
            let mut common: Option<HashSet<String>> = None;
            for arm in arms {
                let mut arm_fields = HashSet::new();
                add_positive_fields(arm, &mut arm_fields);
                common = Some(match common {
                    None => arm_fields,
                    Some(prev) => prev.intersection(&arm_fields).cloned().collect(),
                });
            }
            fields.extend(common.unwrap_or_default());
        }
        _ => {}
    }
}
