//! Composite key synthesis.
//!
//! Conjunctions whose leaves cover the component fields of a declared
//! composite key are rewritten to probe the composite index directly.
//! Equality components may sit anywhere; ranges and regexes only in the
//! final position, and a regex ends the concatenation early. Leaves
//! consumed into an all-equality composite disappear; leaves feeding a
//! range, regex, or shortened composite stay behind as filters.

use crate::{
    context::CompileContext,
    marker::{Marker, MarkerKind},
    node::{CompareOp, Expr, Literal, range::LiteralRange, rewrite},
    schema::CompositeKey,
};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    ops::Bound,
};

/// Highest scalar value; bounds open-ended composite tails.
const COMPONENT_MAX: char = char::MAX;

pub(crate) fn synthesize(expr: &Expr, ctx: &mut CompileContext<'_>) -> Expr {
    let mut catalog = ctx.providers.metadata.composites();
    if catalog.is_empty() {
        return expr.clone();
    }

    // longest first; catalog order breaks ties
    catalog.sort_by(|a, b| b.components.len().cmp(&a.components.len()));

    walk(expr, &catalog, ctx)
}

fn walk(expr: &Expr, catalog: &[CompositeKey], ctx: &mut CompileContext<'_>) -> Expr {
    match expr {
        Expr::And(children) => rewrite_conjunction(children, &BTreeMap::new(), catalog, ctx),
        Expr::Or(children) => Expr::Or(
            children
                .iter()
                .map(|child| walk(child, catalog, ctx))
                .collect(),
        ),
        // no synthesis below negation
        Expr::Not(_) => expr.clone(),
        Expr::Group(inner) => Expr::group(walk(inner, catalog, ctx)),
        Expr::Marked(marker) if marker.kind.is_policy() => Expr::Marked(Marker {
            kind: marker.kind,
            source: Box::new(walk(&marker.source, catalog, ctx)),
        }),
        other => other.clone(),
    }
}

enum Tail {
    AllEq,
    Regex(String),
    Range(LiteralRange),
    Relational(CompareOp, Literal),
}

struct Built {
    node: Expr,
    consumed_fields: Vec<String>,
    goner_slots: Vec<usize>,
}

#[derive(Default)]
struct Leaves {
    eq: HashMap<String, (usize, Literal)>,
    regex: HashMap<String, (usize, String)>,
    relational: HashMap<String, (usize, CompareOp, Literal)>,
    ranges: HashMap<String, (usize, LiteralRange)>,
}

fn collect_leaves(children: &[Expr]) -> Leaves {
    let mut leaves = Leaves::default();

    for (slot, child) in children.iter().enumerate() {
        if let Expr::Marked(marker) = child.peel() {
            if marker.kind == MarkerKind::BoundedRange
                && let Ok(range) = LiteralRange::from_marked_source(&marker.source)
            {
                leaves
                    .ranges
                    .entry(range.field.clone())
                    .or_insert((slot, range));
            }
            continue;
        }

        let Some(term) = child.as_field_term() else {
            continue;
        };

        match term.op {
            CompareOp::Eq if !term.literal.is_null() => {
                leaves
                    .eq
                    .entry(term.field.to_string())
                    .or_insert((slot, term.literal.clone()));
            }
            CompareOp::RegexMatch => {
                if let Some(pattern) = term.literal.as_text() {
                    leaves
                        .regex
                        .entry(term.field.to_string())
                        .or_insert((slot, pattern.to_string()));
                }
            }
            op if op.is_relational() && !term.literal.is_null() => {
                leaves
                    .relational
                    .entry(term.field.to_string())
                    .or_insert((slot, op, term.literal.clone()));
            }
            _ => {}
        }
    }

    leaves
}

fn rewrite_conjunction(
    children: &[Expr],
    ancestors: &BTreeMap<String, Literal>,
    catalog: &[CompositeKey],
    ctx: &mut CompileContext<'_>,
) -> Expr {
    let leaves = collect_leaves(children);
    let separator = ctx.config.composite_separator;

    let mut used_fields: HashSet<String> = HashSet::new();
    let mut goners: HashSet<usize> = HashSet::new();
    let mut synthesized: Vec<Expr> = Vec::new();

    for key in catalog {
        if key
            .components
            .iter()
            .any(|component| used_fields.contains(component))
        {
            continue;
        }

        if let Some(built) = try_build(key, &leaves, ancestors, separator) {
            used_fields.extend(built.consumed_fields);
            goners.extend(built.goner_slots);
            synthesized.push(built.node);
            ctx.report.composites_formed += 1;
        }
    }

    // equality context handed down to direct disjunction children
    let mut inherited = ancestors.clone();
    for (field, (slot, literal)) in &leaves.eq {
        if !goners.contains(slot) {
            inherited.insert(field.clone(), literal.clone());
        }
    }

    let mut out = synthesized;
    for (slot, child) in children.iter().enumerate() {
        if goners.contains(&slot) {
            continue;
        }
        match child.peel() {
            Expr::Or(arms) => out.push(rebuild_or(arms, &inherited, catalog, ctx)),
            Expr::Compare(_) | Expr::Marked(_) => out.push(child.clone()),
            _ => out.push(walk(child, catalog, ctx)),
        }
    }

    rewrite::conjoin(out)
}

fn rebuild_or(
    arms: &[Expr],
    ancestors: &BTreeMap<String, Literal>,
    catalog: &[CompositeKey],
    ctx: &mut CompileContext<'_>,
) -> Expr {
    Expr::Or(
        arms.iter()
            .map(|arm| match arm.peel() {
                Expr::And(sub) => rewrite_conjunction(sub, ancestors, catalog, ctx),
                Expr::Compare(_) => {
                    rewrite_conjunction(std::slice::from_ref(arm), ancestors, catalog, ctx)
                }
                _ => walk(arm, catalog, ctx),
            })
            .collect(),
    )
}

#[expect(clippy::too_many_lines)]
fn try_build(
    key: &CompositeKey,
    leaves: &Leaves,
    ancestors: &BTreeMap<String, Literal>,
    separator: char,
) -> Option<Built> {
    let last_index = key.components.len().checked_sub(1)?;

    let mut prefix: Vec<String> = Vec::new();
    let mut consumed_fields: Vec<String> = Vec::new();
    let mut goner_slots: Vec<usize> = Vec::new();
    let mut tail = Tail::AllEq;
    let mut components_used = 0usize;

    for (i, component) in key.components.iter().enumerate() {
        if let Some((slot, literal)) = leaves.eq.get(component) {
            prefix.push(literal.render());
            consumed_fields.push(component.clone());
            goner_slots.push(*slot);
            components_used += 1;
            continue;
        }

        if let Some(literal) = ancestors.get(component) {
            // ancestor equality participates but is never removed
            prefix.push(literal.render());
            consumed_fields.push(component.clone());
            components_used += 1;
            continue;
        }

        if let Some((_, pattern)) = leaves.regex.get(component) {
            // a regex ends the concatenation; it needs at least one
            // literal component ahead of it
            if prefix.is_empty() {
                return None;
            }
            tail = Tail::Regex(pattern.clone());
            consumed_fields.push(component.clone());
            components_used += 1;
            break;
        }

        if i == last_index {
            if let Some((_, range)) = leaves.ranges.get(component) {
                tail = Tail::Range(range.clone());
                consumed_fields.push(component.clone());
                components_used += 1;
                break;
            }
            if let Some((_, op, literal)) = leaves.relational.get(component) {
                tail = Tail::Relational(*op, literal.clone());
                consumed_fields.push(component.clone());
                components_used += 1;
                break;
            }
        }

        // component missing, or a range sits before the final position
        return None;
    }

    if components_used < 2 {
        return None;
    }

    let all_equality = matches!(tail, Tail::AllEq);
    let sep = separator.to_string();
    let node = match tail {
        Tail::AllEq => Expr::eq(&key.name, prefix.join(&sep)),
        Tail::Regex(pattern) => {
            let mut joined = prefix
                .iter()
                .map(|part| regex_syntax::escape(part))
                .collect::<Vec<_>>()
                .join(&regex_syntax::escape(&sep));
            joined.push_str(&regex_syntax::escape(&sep));
            joined.push_str(&pattern);
            Expr::matches(&key.name, joined)
        }
        Tail::Range(range) => {
            let lead = prefix.join(&sep);
            let lower = prefix_bound(&range.lower, &lead, &sep, true);
            let upper = prefix_bound(&range.upper, &lead, &sep, false);
            LiteralRange::new(&key.name, lower, upper).into_marked()
        }
        Tail::Relational(op, literal) => {
            let lead = prefix.join(&sep);
            let value = format!("{lead}{sep}{}", literal.render());
            let ceiling = format!("{lead}{sep}{COMPONENT_MAX}");
            let floor = format!("{lead}{sep}");

            let (lower, upper) = match op {
                CompareOp::Gt => (
                    Bound::Excluded(Literal::Text(value)),
                    Bound::Excluded(Literal::Text(ceiling)),
                ),
                CompareOp::Ge => (
                    Bound::Included(Literal::Text(value)),
                    Bound::Excluded(Literal::Text(ceiling)),
                ),
                CompareOp::Lt => (
                    Bound::Included(Literal::Text(floor)),
                    Bound::Excluded(Literal::Text(value)),
                ),
                _ => (
                    Bound::Included(Literal::Text(floor)),
                    Bound::Included(Literal::Text(value)),
                ),
            };

            LiteralRange::new(&key.name, lower, upper).into_marked()
        }
    };

    // only full all-equality composites remove their sources
    let goner_slots = if all_equality { goner_slots } else { Vec::new() };

    Some(Built {
        node,
        consumed_fields,
        goner_slots,
    })
}

/// Prepend the composite prefix to one bound of a trailing range.
fn prefix_bound(bound: &Bound<Literal>, lead: &str, sep: &str, is_lower: bool) -> Bound<Literal> {
    match bound {
        Bound::Included(lit) => {
            Bound::Included(Literal::Text(format!("{lead}{sep}{}", lit.render())))
        }
        Bound::Excluded(lit) => {
            Bound::Excluded(Literal::Text(format!("{lead}{sep}{}", lit.render())))
        }
        Bound::Unbounded if is_lower => Bound::Included(Literal::Text(format!("{lead}{sep}"))),
        Bound::Unbounded => Bound::Excluded(Literal::Text(format!("{lead}{sep}{COMPONENT_MAX}"))),
    }
}
