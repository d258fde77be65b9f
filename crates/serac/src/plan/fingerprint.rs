//! Deterministic plan fingerprinting.
#![expect(clippy::cast_possible_truncation)]

use crate::{
    node::{Literal, range::LiteralRange},
    plan::{IvaratorPlan, IvaratorSource, PlanNode},
};
use sha2::{Digest, Sha256};
use std::ops::Bound;

///
/// PlanFingerprint
///
/// Stable, deterministic identity for an emitted plan. Spill paths,
/// scan ordinals and runtime settings stay outside the hash stream so
/// fingerprints agree across hosts and runs.
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PlanFingerprint([u8; 32]);

impl PlanFingerprint {
    #[must_use]
    pub fn as_hex(&self) -> String {
        let mut out = String::with_capacity(64);
        for byte in self.0 {
            use std::fmt::Write as _;
            let _ = write!(out, "{byte:02x}");
        }
        out
    }
}

impl std::fmt::Display for PlanFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_hex())
    }
}

impl PlanNode {
    /// Compute the stable fingerprint for this plan.
    #[must_use]
    pub fn fingerprint(&self) -> PlanFingerprint {
        let mut hasher = Sha256::new();
        hasher.update(b"serac:plan:v1");
        hash_node(&mut hasher, self);
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        PlanFingerprint(out)
    }
}

fn hash_node(hasher: &mut Sha256, node: &PlanNode) {
    match node {
        PlanNode::Probe { field, value } => {
            write_tag(hasher, 0x01);
            write_str(hasher, field);
            write_str(hasher, value);
        }
        PlanNode::Range(range) => {
            write_tag(hasher, 0x02);
            hash_range(hasher, range);
        }
        PlanNode::Ivarator(plan) => {
            write_tag(hasher, 0x03);
            hash_ivarator(hasher, plan);
        }
        PlanNode::Intersection { includes, excludes } => {
            write_tag(hasher, 0x04);
            hash_junction(hasher, includes, excludes);
        }
        PlanNode::Union { includes, excludes } => {
            write_tag(hasher, 0x05);
            hash_junction(hasher, includes, excludes);
        }
    }
}

fn hash_junction(hasher: &mut Sha256, includes: &[PlanNode], excludes: &[PlanNode]) {
    write_u32(hasher, includes.len() as u32);
    for child in includes {
        hash_node(hasher, child);
    }
    write_u32(hasher, excludes.len() as u32);
    for child in excludes {
        hash_node(hasher, child);
    }
}

fn hash_ivarator(hasher: &mut Sha256, plan: &IvaratorPlan) {
    write_str(hasher, &plan.field);
    match &plan.source {
        IvaratorSource::Range(range) => {
            write_tag(hasher, 0x10);
            hash_range(hasher, range);
        }
        IvaratorSource::Pattern(pattern) => {
            write_tag(hasher, 0x11);
            write_str(hasher, pattern);
        }
        IvaratorSource::Values(values) => {
            write_tag(hasher, 0x12);
            write_u32(hasher, values.len() as u32);
            for value in values {
                write_str(hasher, value);
            }
        }
    }
}

fn hash_range(hasher: &mut Sha256, range: &LiteralRange) {
    write_str(hasher, &range.field);
    write_bound(hasher, &range.lower);
    write_bound(hasher, &range.upper);
}

fn write_bound(hasher: &mut Sha256, bound: &Bound<Literal>) {
    match bound {
        Bound::Unbounded => write_tag(hasher, 0x00),
        Bound::Included(literal) => {
            write_tag(hasher, 0x01);
            write_literal(hasher, literal);
        }
        Bound::Excluded(literal) => {
            write_tag(hasher, 0x02);
            write_literal(hasher, literal);
        }
    }
}

fn write_literal(hasher: &mut Sha256, literal: &Literal) {
    write_tag(hasher, literal_tag(literal));
    write_str(hasher, &literal.render());
}

fn write_str(hasher: &mut Sha256, value: &str) {
    write_u32(hasher, value.len() as u32);
    hasher.update(value.as_bytes());
}

fn write_u32(hasher: &mut Sha256, value: u32) {
    hasher.update(value.to_be_bytes());
}

fn write_tag(hasher: &mut Sha256, tag: u8) {
    hasher.update([tag]);
}

const fn literal_tag(literal: &Literal) -> u8 {
    match literal {
        Literal::Null => 0x01,
        Literal::Bool(_) => 0x02,
        Literal::Int(_) => 0x03,
        Literal::Float(_) => 0x04,
        Literal::Text(_) => 0x05,
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IvaratorSettings;
    use std::path::PathBuf;

    fn probe(field: &str, value: &str) -> PlanNode {
        PlanNode::Probe {
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn fingerprint_is_stable_for_a_probe() {
        let plan = probe("NAME", "ann");
        assert_eq!(
            plan.fingerprint().as_hex(),
            "2f1787a073d3b0e2781dd72be730dedfce14e5111d7f3121f88ed10a642a255d"
        );
    }

    #[test]
    fn length_framing_keeps_field_and_value_apart() {
        assert_ne!(
            probe("NAME", "ann").fingerprint(),
            probe("NAMEa", "nn").fingerprint()
        );
    }

    #[test]
    fn junction_shape_changes_the_fingerprint() {
        let intersection = PlanNode::Intersection {
            includes: vec![probe("NAME", "ann"), probe("AGE", "30")],
            excludes: Vec::new(),
        };
        let union = PlanNode::Union {
            includes: vec![probe("NAME", "ann"), probe("AGE", "30")],
            excludes: Vec::new(),
        };

        assert_ne!(intersection.fingerprint(), union.fingerprint());
    }

    #[test]
    fn exclusion_side_changes_the_fingerprint() {
        let included = PlanNode::Intersection {
            includes: vec![probe("NAME", "ann"), probe("AGE", "30")],
            excludes: Vec::new(),
        };
        let excluded = PlanNode::Intersection {
            includes: vec![probe("NAME", "ann")],
            excludes: vec![probe("AGE", "30")],
        };

        assert_ne!(included.fingerprint(), excluded.fingerprint());
    }

    #[test]
    fn spill_allocation_stays_out_of_the_fingerprint() {
        let scan = |ordinal: u32, dir: &str| {
            PlanNode::Ivarator(IvaratorPlan {
                field: "NAME".to_string(),
                source: IvaratorSource::Pattern("an.*".to_string()),
                spill_dir: PathBuf::from(dir),
                ordinal,
                settings: IvaratorSettings::default(),
            })
        };

        assert_eq!(
            scan(0, "/tmp/a").fingerprint(),
            scan(7, "/tmp/b").fingerprint()
        );
    }
}
