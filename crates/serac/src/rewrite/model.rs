//! Model alias expansion.
//!
//! Every identifier is replaced by the union (or intersection, for
//! negative and null comparisons) of its model aliases. Bounded range
//! pairs expand as units so both bounds stay on the same alias.

use crate::{
    context::CompileContext,
    node::{
        Compare, CompareOp, Expr, Literal,
        range::{self, LiteralRange},
        rewrite,
    },
};
use std::collections::HashMap;

pub(crate) fn expand_aliases(expr: &Expr, ctx: &mut CompileContext<'_>) -> Expr {
    match expr {
        Expr::And(children) => expand_conjunction(children, ctx),
        Expr::Or(children) => Expr::Or(
            children
                .iter()
                .map(|child| expand_aliases(child, ctx))
                .collect(),
        ),
        Expr::Not(inner) => Expr::not(expand_aliases(inner, ctx)),
        Expr::Group(inner) => Expr::group(expand_aliases(inner, ctx)),
        Expr::Compare(cmp) => expand_compare(cmp, ctx),
        Expr::Marked(marker) if marker.kind.is_policy() => Expr::Marked(crate::marker::Marker {
            kind: marker.kind,
            source: Box::new(expand_aliases(&marker.source, ctx)),
        }),
        other => other.clone(),
    }
}

fn expand_conjunction(children: &[Expr], ctx: &mut CompileContext<'_>) -> Expr {
    let found = range::find_bounded_ranges(children);
    let mut replaced: HashMap<usize, Expr> = HashMap::new();
    let mut consumed = vec![false; children.len()];

    for fr in &found {
        if let Some(unit) = expand_range_unit(&fr.range, ctx) {
            replaced.insert(fr.lower_slot, unit);
            consumed[fr.upper_slot] = true;
        }
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
        out.push(expand_aliases(child, ctx));
    }

    Expr::And(out)
}

/// Expand one bounded range across its field's aliases, keeping each
/// lower/upper pair together. `None` leaves the original pair untouched.
fn expand_range_unit(range: &LiteralRange, ctx: &mut CompileContext<'_>) -> Option<Expr> {
    let aliases = ctx.providers.model.aliases(&range.field);
    if aliases.is_empty() || aliases == [range.field.clone()] {
        return None;
    }

    let units: Vec<Expr> = aliases
        .iter()
        .map(|alias| {
            let aliased = LiteralRange {
                field: alias.clone(),
                lower: range.lower.clone(),
                upper: range.upper.clone(),
            };
            Expr::group(aliased.to_conjunction())
        })
        .collect();

    ctx.report.aliases_applied += units.len().saturating_sub(1);

    let expanded = rewrite::disjoin(units);
    Some(match expanded {
        Expr::Or(_) => Expr::group(expanded),
        other => other,
    })
}

fn expand_compare(cmp: &Compare, ctx: &mut CompileContext<'_>) -> Expr {
    let lhs_set = operand_aliases(&cmp.lhs, ctx);
    let rhs_set = operand_aliases(&cmp.rhs, ctx);

    if lhs_set.len() == 1 && rhs_set.len() == 1 {
        let (Some(lhs), Some(rhs)) = (lhs_set.first(), rhs_set.first()) else {
            return Expr::Compare(cmp.clone());
        };
        return Expr::Compare(Compare::new(lhs.clone(), cmp.op, rhs.clone()));
    }

    let mut arms = Vec::with_capacity(lhs_set.len() * rhs_set.len());
    for lhs in &lhs_set {
        for rhs in &rhs_set {
            arms.push(Expr::Compare(Compare::new(lhs.clone(), cmp.op, rhs.clone())));
        }
    }

    ctx.report.aliases_applied += arms.len().saturating_sub(1);

    // Negative operators and null comparisons must hold across every
    // alias; everything else is satisfied by any alias.
    let junction = if cmp.op.is_negative() || is_null_equality(cmp) {
        rewrite::conjoin(arms)
    } else {
        rewrite::disjoin(arms)
    };

    Expr::group(junction)
}

fn operand_aliases(operand: &Expr, ctx: &CompileContext<'_>) -> Vec<Expr> {
    match operand.peel() {
        Expr::Ident(name) => {
            let aliases = ctx.providers.model.aliases(name);
            if aliases.is_empty() {
                vec![Expr::Ident(name.clone())]
            } else {
                aliases.into_iter().map(Expr::Ident).collect()
            }
        }
        other => vec![other.clone()],
    }
}

fn is_null_equality(cmp: &Compare) -> bool {
    cmp.op == CompareOp::Eq
        && (matches!(cmp.lhs.peel(), Expr::Literal(Literal::Null))
            || matches!(cmp.rhs.peel(), Expr::Literal(Literal::Null)))
}
