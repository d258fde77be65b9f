//! Property markers: wrapper nodes that tag a subtree with how the planner
//! must treat it, without disturbing its boolean meaning.

use crate::node::Expr;
use serde::{Deserialize, Serialize};
use std::fmt;

///
/// MarkerKind
///
/// Closed set of subtree annotations. Deferral markers fence a subtree off
/// from index planning; ivarator markers route it to an overflow-backed
/// scan; policy markers carry normalization policy downward.
///

#[remain::sorted]
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
#[repr(u8)]
pub enum MarkerKind {
    BoundedRange = 0x01,
    Delayed = 0x02,
    Dropped = 0x03,
    EvaluationOnly = 0x04,
    ExceededOr = 0x05,
    ExceededTerm = 0x06,
    ExceededValue = 0x07,
    IndexHole = 0x08,
    Lenient = 0x09,
    Strict = 0x0a,
}

impl MarkerKind {
    #[must_use]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::BoundedRange => "bounded-range",
            Self::Delayed => "delayed",
            Self::Dropped => "dropped",
            Self::EvaluationOnly => "eval-only",
            Self::ExceededOr => "exceeded-or",
            Self::ExceededTerm => "exceeded-term",
            Self::ExceededValue => "exceeded-value",
            Self::IndexHole => "index-hole",
            Self::Lenient => "lenient",
            Self::Strict => "strict",
        }
    }

    /// Markers that fence their subtree off from index-driven planning.
    /// The compiler never rewrites below a deferral marker.
    #[must_use]
    pub const fn is_deferral(self) -> bool {
        matches!(
            self,
            Self::Delayed
                | Self::Dropped
                | Self::EvaluationOnly
                | Self::ExceededOr
                | Self::ExceededTerm
                | Self::ExceededValue
                | Self::IndexHole
        )
    }

    /// Markers whose subtree compiles to an overflow-backed scan.
    #[must_use]
    pub const fn is_ivarator(self) -> bool {
        matches!(
            self,
            Self::ExceededOr | Self::ExceededTerm | Self::ExceededValue
        )
    }

    /// Normalization-policy markers; they scope policy, not planning.
    #[must_use]
    pub const fn is_policy(self) -> bool {
        matches!(self, Self::Lenient | Self::Strict)
    }
}

impl fmt::Display for MarkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

///
/// Marker
///

#[derive(Clone, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
pub struct Marker {
    pub kind: MarkerKind,
    pub source: Box<Expr>,
}

impl Marker {
    #[must_use]
    pub fn new(kind: MarkerKind, source: Expr) -> Self {
        Self {
            kind,
            source: Box::new(source),
        }
    }
}

/// Wrap `expr` with `kind`, idempotently: a subtree already carrying the
/// marker anywhere in its wrapper chain is returned unchanged.
#[must_use]
pub fn wrap(kind: MarkerKind, expr: Expr) -> Expr {
    if unwrap_fully(&expr).has(kind) {
        return expr;
    }

    Expr::Marked(Marker::new(kind, expr))
}

///
/// MarkerChain
///
/// The full wrapper chain above a source node, with grouping stripped.
///

#[derive(Debug)]
pub struct MarkerChain<'a> {
    pub kinds: Vec<MarkerKind>,
    pub source: &'a Expr,
}

impl MarkerChain<'_> {
    #[must_use]
    pub fn has(&self, kind: MarkerKind) -> bool {
        self.kinds.contains(&kind)
    }

    #[must_use]
    pub fn any_deferral(&self) -> bool {
        self.kinds.iter().any(|kind| kind.is_deferral())
    }

    #[must_use]
    pub fn any_ivarator(&self) -> bool {
        self.kinds.iter().any(|kind| kind.is_ivarator())
    }

    /// The normalization policy carried by this chain, if any.
    #[must_use]
    pub fn policy(&self) -> Option<MarkerKind> {
        self.kinds.iter().copied().find(|kind| kind.is_policy())
    }

    /// Contradictory policy pair, if the chain carries one.
    #[must_use]
    pub fn conflict(&self) -> Option<(MarkerKind, MarkerKind)> {
        if self.has(MarkerKind::Strict) && self.has(MarkerKind::Lenient) {
            return Some((MarkerKind::Strict, MarkerKind::Lenient));
        }

        None
    }
}

/// Peel every marker wrapper (and interleaved grouping) above a node,
/// collecting the marker kinds outermost-first.
#[must_use]
pub fn unwrap_fully(expr: &Expr) -> MarkerChain<'_> {
    let mut kinds = Vec::new();
    let mut node = expr.peel();

    while let Expr::Marked(marker) = node {
        kinds.push(marker.kind);
        node = marker.source.peel();
    }

    MarkerChain {
        kinds,
        source: node,
    }
}

///
/// TESTS
///
