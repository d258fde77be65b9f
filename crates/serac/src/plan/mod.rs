//! The runtime plan: combinators over index probes, range scans, and
//! overflow scans. The compiler owns the builder tree while walking the
//! rewritten query; the built plan is handed to the scan runtime
//! read-only.

pub(crate) mod compile;
mod explain;
mod fingerprint;
pub(crate) mod ivarator;


use crate::{error::CompileError, node::Expr, node::range::LiteralRange};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub use self::fingerprint::PlanFingerprint;
pub use self::ivarator::{IvaratorPlan, IvaratorSource};
pub(crate) use self::compile::compile;

///
/// PlanNode
///
/// One node of the emitted plan. Probes and ranges bound the scan from
/// the index directly; ivarators materialize oversized value sets at run
/// time; junction nodes intersect or merge their includes while
/// subtracting their excludes.
///

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum PlanNode {
    Probe {
        field: String,
        value: String,
    },
    Range(LiteralRange),
    Ivarator(IvaratorPlan),
    Intersection {
        includes: Vec<PlanNode>,
        excludes: Vec<PlanNode>,
    },
    Union {
        includes: Vec<PlanNode>,
        excludes: Vec<PlanNode>,
    },
}

impl PlanNode {
    /// Leaves in the plan, junctions excluded.
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        match self {
            Self::Probe { .. } | Self::Range(_) | Self::Ivarator(_) => 1,
            Self::Intersection { includes, excludes } | Self::Union { includes, excludes } => {
                includes
                    .iter()
                    .chain(excludes)
                    .map(Self::leaf_count)
                    .sum()
            }
        }
    }
}

///
/// JunctionBuilder
///
/// Accumulates the include and exclude lists for one combinator.
/// Probes de-duplicate per side, so alias and composite expansion cannot
/// land the same effective probe twice. Building requires at least one
/// include; an all-excluded junction cannot bound a scan on its own and
/// either inverts into its parent or fails at the root.
///

pub(crate) struct JunctionBuilder {
    conjunction: bool,
    includes: Vec<PlanNode>,
    excludes: Vec<PlanNode>,
    seen_includes: HashSet<(String, String)>,
    seen_excludes: HashSet<(String, String)>,
}

impl JunctionBuilder {
    pub(crate) fn conjunction() -> Self {
        Self::new(true)
    }

    pub(crate) fn disjunction() -> Self {
        Self::new(false)
    }

    fn new(conjunction: bool) -> Self {
        Self {
            conjunction,
            includes: Vec::new(),
            excludes: Vec::new(),
            seen_includes: HashSet::new(),
            seen_excludes: HashSet::new(),
        }
    }

    pub(crate) fn include(&mut self, node: PlanNode) {
        self.includes.push(node);
    }

    pub(crate) fn exclude(&mut self, node: PlanNode) {
        self.excludes.push(node);
    }

    /// Add a field+value probe on one side, skipping pairs already seen
    /// on that side.
    pub(crate) fn probe(&mut self, field: &str, value: &str, excluded: bool) {
        let seen = if excluded {
            &mut self.seen_excludes
        } else {
            &mut self.seen_includes
        };
        if !seen.insert((field.to_string(), value.to_string())) {
            return;
        }

        let node = PlanNode::Probe {
            field: field.to_string(),
            value: value.to_string(),
        };
        if excluded {
            self.excludes.push(node);
        } else {
            self.includes.push(node);
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.includes.is_empty() && self.excludes.is_empty()
    }

    pub(crate) fn is_purely_excluding(&self) -> bool {
        self.includes.is_empty() && !self.excludes.is_empty()
    }

    /// De Morgan inversion: a junction holding only exclusions equals
    /// the negation of the opposite junction over those nodes. The
    /// caller places the result on the opposite side of its parent.
    pub(crate) fn inverted(mut self) -> PlanNode {
        if self.excludes.len() == 1 {
            return self.excludes.swap_remove(0);
        }

        if self.conjunction {
            PlanNode::Union {
                includes: self.excludes,
                excludes: Vec::new(),
            }
        } else {
            PlanNode::Intersection {
                includes: self.excludes,
                excludes: Vec::new(),
            }
        }
    }

    /// Finish the combinator. A single include with no excludes collapses
    /// to the include itself.
    pub(crate) fn build(mut self, context: &Expr) -> Result<PlanNode, CompileError> {
        if self.includes.is_empty() {
            return Err(CompileError::malformed(
                "junction holds only exclusions and cannot bound a scan",
                context,
            ));
        }

        if self.includes.len() == 1 && self.excludes.is_empty() {
            return Ok(self.includes.swap_remove(0));
        }

        Ok(if self.conjunction {
            PlanNode::Intersection {
                includes: self.includes,
                excludes: self.excludes,
            }
        } else {
            PlanNode::Union {
                includes: self.includes,
                excludes: self.excludes,
            }
        })
    }
}
