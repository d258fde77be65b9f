//! Structural rebuild helpers shared by the rewrite passes.
//!
//! Every pass is copy-with-transform: the input tree is never mutated, and
//! unchanged regions are cloned into the output.

use crate::node::Expr;

/// Rebuild a node with each direct boolean child replaced by `f(child)`.
///
/// Leaves clone unchanged. Marker wrappers are treated as leaves here;
/// passes that descend below markers must do so explicitly, because most
/// of them are forbidden from rewriting deferral-marked subtrees.
pub fn map_children<E, F>(expr: &Expr, f: &mut F) -> Result<Expr, E>
where
    F: FnMut(&Expr) -> Result<Expr, E>,
{
    Ok(match expr {
        Expr::And(children) => Expr::And(map_each(children, f)?),
        Expr::Or(children) => Expr::Or(map_each(children, f)?),
        Expr::Not(inner) => Expr::Not(Box::new(f(inner)?)),
        Expr::Group(inner) => Expr::Group(Box::new(f(inner)?)),
        other => other.clone(),
    })
}

fn map_each<E, F>(children: &[Expr], f: &mut F) -> Result<Vec<Expr>, E>
where
    F: FnMut(&Expr) -> Result<Expr, E>,
{
    children.iter().map(f).collect()
}

/// Collapse nested conjunctions into their parent conjunction, likewise for
/// disjunctions; single-child junctions unwrap. Marker sources flatten in
/// place but never splice across the marker boundary.
#[must_use]
pub fn flatten(expr: &Expr) -> Expr {
    match expr {
        Expr::And(children) => rebuild_junction(true, children),
        Expr::Or(children) => rebuild_junction(false, children),
        Expr::Not(inner) => Expr::Not(Box::new(flatten(inner))),
        Expr::Group(inner) => Expr::Group(Box::new(flatten(inner))),
        Expr::Marked(marker) => Expr::Marked(crate::marker::Marker {
            kind: marker.kind,
            source: Box::new(flatten(&marker.source)),
        }),
        other => other.clone(),
    }
}

fn rebuild_junction(is_and: bool, children: &[Expr]) -> Expr {
    let mut flat = Vec::with_capacity(children.len());

    for child in children {
        let child = flatten(child);
        if let Some(grand) = splice_children(&child, is_and) {
            flat.extend(grand);
        } else {
            flat.push(child);
        }
    }

    if flat.len() == 1
        && let Some(only) = flat.pop()
    {
        return only;
    }

    if is_and { Expr::And(flat) } else { Expr::Or(flat) }
}

fn splice_children(child: &Expr, is_and: bool) -> Option<Vec<Expr>> {
    match (child.peel(), is_and) {
        (Expr::And(grand), true) | (Expr::Or(grand), false) => Some(grand.clone()),
        _ => None,
    }
}

/// Conjunction of `arms` with the boolean identities applied: zero arms is
/// the constant true, a single arm is returned bare.
#[must_use]
pub fn conjoin(mut arms: Vec<Expr>) -> Expr {
    match arms.len() {
        0 => Expr::lit(true),
        1 => arms.swap_remove(0),
        _ => Expr::And(arms),
    }
}

/// Disjunction of `arms`: zero arms is the constant false, a single arm is
/// returned bare.
#[must_use]
pub fn disjoin(mut arms: Vec<Expr>) -> Expr {
    match arms.len() {
        0 => Expr::lit(false),
        1 => arms.swap_remove(0),
        _ => Expr::Or(arms),
    }
}
