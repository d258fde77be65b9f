//! Negative number literal fixup.
//!
//! Parsers that reuse the boolean NOT token for unary minus hand us
//! `!(5)` where the query meant `-5`. Any NOT whose operand reduces to a
//! numeric literal is folded into a negated literal, inside comparison
//! operands included. Non-numeric operands keep their NOT untouched.

use crate::node::{Compare, Expr, Float64, Literal};

pub(crate) fn fix(expr: &Expr) -> Expr {
    match expr {
        Expr::And(children) => Expr::And(children.iter().map(fix).collect()),
        Expr::Or(children) => Expr::Or(children.iter().map(fix).collect()),
        Expr::Not(inner) => {
            if let Some(negated) = negate_numeric(inner) {
                return negated;
            }
            Expr::Not(Box::new(fix(inner)))
        }
        Expr::Group(inner) => Expr::group(fix(inner)),
        Expr::Compare(cmp) => Expr::Compare(Compare {
            lhs: Box::new(fix(&cmp.lhs)),
            op: cmp.op,
            rhs: Box::new(fix(&cmp.rhs)),
        }),
        Expr::Marked(marker) => Expr::Marked(crate::marker::Marker {
            kind: marker.kind,
            source: Box::new(fix(&marker.source)),
        }),
        other => other.clone(),
    }
}

/// The negated literal for `!(n)` when `n` is numeric, seeing through
/// grouping. `i64::MIN` has no negation and is left alone.
fn negate_numeric(inner: &Expr) -> Option<Expr> {
    let Expr::Literal(literal) = inner.peel() else {
        return None;
    };

    match literal {
        Literal::Int(value) => value.checked_neg().map(Expr::lit),
        Literal::Float(value) => {
            Float64::try_new(-value.get()).map(|f| Expr::Literal(Literal::Float(f)))
        }
        _ => None,
    }
}
