//! Literal ranges: the two-sided comparison pairs that scan a contiguous
//! slice of the key space.

use crate::node::{CompareOp, Expr, FieldOpLiteral, Literal};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, ops::Bound};
use thiserror::Error as ThisError;

///
/// LiteralRange
///
/// A per-field interval over canonical literal order. Both bounds are
/// present for a bounded range; single-sided intervals appear only as
/// ivarator sources.
///

#[derive(Clone, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
pub struct LiteralRange {
    pub field: String,
    pub lower: Bound<Literal>,
    pub upper: Bound<Literal>,
}

impl LiteralRange {
    #[must_use]
    pub fn new(field: impl Into<String>, lower: Bound<Literal>, upper: Bound<Literal>) -> Self {
        Self {
            field: field.into(),
            lower,
            upper,
        }
    }

    /// Combine one lower-bound and one upper-bound comparison over the same
    /// field into a range. Order of arguments does not matter.
    #[must_use]
    pub fn from_pair(a: &FieldOpLiteral<'_>, b: &FieldOpLiteral<'_>) -> Option<Self> {
        if a.field != b.field || a.literal.is_null() || b.literal.is_null() {
            return None;
        }

        let (lower, upper) = match (a.op.is_lower_bound(), b.op.is_lower_bound()) {
            (true, false) if b.op.is_upper_bound() => (a, b),
            (false, true) if a.op.is_upper_bound() => (b, a),
            _ => return None,
        };

        Some(Self {
            field: lower.field.to_string(),
            lower: bound_of(lower.op, lower.literal.clone())?,
            upper: bound_of(upper.op, upper.literal.clone())?,
        })
    }

    /// Both bounds present.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        !matches!(self.lower, Bound::Unbounded) && !matches!(self.upper, Bound::Unbounded)
    }

    /// Single-sided interval from one relational comparison.
    #[must_use]
    pub fn from_single(term: &FieldOpLiteral<'_>) -> Option<Self> {
        if !term.op.is_relational() || term.literal.is_null() {
            return None;
        }

        let (lower, upper) = match term.op {
            CompareOp::Gt => (Bound::Excluded(term.literal.clone()), Bound::Unbounded),
            CompareOp::Ge => (Bound::Included(term.literal.clone()), Bound::Unbounded),
            CompareOp::Lt => (Bound::Unbounded, Bound::Excluded(term.literal.clone())),
            CompareOp::Le => (Bound::Unbounded, Bound::Included(term.literal.clone())),
            _ => return None,
        };

        Some(Self {
            field: term.field.to_string(),
            lower,
            upper,
        })
    }

    /// Rebuild the comparison pair this range stands for.
    #[must_use]
    pub fn to_conjunction(&self) -> Expr {
        let mut arms = Vec::with_capacity(2);

        match &self.lower {
            Bound::Included(lit) => arms.push(Expr::ge(&self.field, lit.clone())),
            Bound::Excluded(lit) => arms.push(Expr::gt(&self.field, lit.clone())),
            Bound::Unbounded => {}
        }
        match &self.upper {
            Bound::Included(lit) => arms.push(Expr::le(&self.field, lit.clone())),
            Bound::Excluded(lit) => arms.push(Expr::lt(&self.field, lit.clone())),
            Bound::Unbounded => {}
        }

        super::rewrite::conjoin(arms)
    }

    /// Wrap this range as a marked unit ready for planning.
    #[must_use]
    pub fn into_marked(self) -> Expr {
        crate::marker::wrap(
            crate::marker::MarkerKind::BoundedRange,
            Expr::group(self.to_conjunction()),
        )
    }

    /// Recover a range from the source of a bounded-range marker.
    pub fn from_marked_source(source: &Expr) -> Result<Self, RangeError> {
        let Expr::And(children) = source.peel() else {
            return Err(RangeError::NotAPair {
                context: source.to_string(),
            });
        };

        if children.len() != 2 {
            return Err(RangeError::WrongArity {
                found: children.len(),
                context: source.to_string(),
            });
        }

        let (Some(a), Some(b)) = (children[0].as_field_term(), children[1].as_field_term()) else {
            return Err(RangeError::NotAPair {
                context: source.to_string(),
            });
        };

        if a.field != b.field {
            return Err(RangeError::MixedFields {
                context: source.to_string(),
            });
        }

        Self::from_pair(&a, &b).ok_or_else(|| RangeError::NotAPair {
            context: source.to_string(),
        })
    }
}

impl fmt::Display for LiteralRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lower = match &self.lower {
            Bound::Included(lit) => format!("[{lit}"),
            Bound::Excluded(lit) => format!("({lit}"),
            Bound::Unbounded => "(".to_string(),
        };
        let upper = match &self.upper {
            Bound::Included(lit) => format!("{lit}]"),
            Bound::Excluded(lit) => format!("{lit})"),
            Bound::Unbounded => ")".to_string(),
        };

        write!(f, "{}:{lower}..{upper}", self.field)
    }
}

fn bound_of(op: CompareOp, literal: Literal) -> Option<Bound<Literal>> {
    match op {
        CompareOp::Ge | CompareOp::Le => Some(Bound::Included(literal)),
        CompareOp::Gt | CompareOp::Lt => Some(Bound::Excluded(literal)),
        _ => None,
    }
}

///
/// RangeError
///

#[remain::sorted]
#[derive(Debug, ThisError)]
pub enum RangeError {
    #[error("bounded range fields disagree in `{context}`")]
    MixedFields { context: String },

    #[error("bounded range source is not a lower/upper comparison pair: `{context}`")]
    NotAPair { context: String },

    #[error("bounded range source must hold exactly 2 comparisons, found {found} in `{context}`")]
    WrongArity { found: usize, context: String },
}

///
/// FoundRange
///
/// A bounded range detected among the children of a conjunction, with the
/// child slots it consumes.
///

#[derive(Debug)]
pub struct FoundRange {
    pub range: LiteralRange,
    pub lower_slot: usize,
    pub upper_slot: usize,
}

impl FoundRange {
    #[must_use]
    pub const fn consumes(&self, slot: usize) -> bool {
        self.lower_slot == slot || self.upper_slot == slot
    }
}

/// Detect bounded ranges among conjunction children.
///
/// A field forms a range only when the conjunction holds exactly one
/// lower-bound and exactly one upper-bound comparison for it; extra bounds
/// on either side disqualify the field and its comparisons stay untouched.
/// Marked children and null literals never participate.
#[must_use]
pub fn find_bounded_ranges(children: &[Expr]) -> Vec<FoundRange> {
    #[derive(Default)]
    struct Sides {
        lower: Vec<usize>,
        upper: Vec<usize>,
    }

    let mut by_field: BTreeMap<String, Sides> = BTreeMap::new();

    for (slot, child) in children.iter().enumerate() {
        if matches!(child.peel(), Expr::Marked(_)) {
            continue;
        }
        let Some(term) = child.as_field_term() else {
            continue;
        };
        if !term.op.is_relational() || term.literal.is_null() {
            continue;
        }

        let sides = by_field.entry(term.field.to_string()).or_default();
        if term.op.is_lower_bound() {
            sides.lower.push(slot);
        } else {
            sides.upper.push(slot);
        }
    }

    let mut found = Vec::new();
    for sides in by_field.values() {
        let (&[lower_slot], &[upper_slot]) = (&sides.lower[..], &sides.upper[..]) else {
            continue;
        };

        let (Some(lower), Some(upper)) = (
            children[lower_slot].as_field_term(),
            children[upper_slot].as_field_term(),
        ) else {
            continue;
        };

        if let Some(range) = LiteralRange::from_pair(&lower, &upper) {
            found.push(FoundRange {
                range,
                lower_slot,
                upper_slot,
            });
        }
    }

    found
}
