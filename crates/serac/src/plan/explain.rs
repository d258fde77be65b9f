//! Human-readable plan rendering: an indented outline, one node per
//! line, used by diagnostics and test assertions.

use crate::plan::{IvaratorPlan, IvaratorSource, PlanNode};

impl PlanNode {
    /// Render the plan as an indented outline.
    #[must_use]
    pub fn explain(&self) -> String {
        let mut lines = Vec::new();
        render(self, 0, &mut lines);
        lines.join("\n")
    }
}

fn render(node: &PlanNode, depth: usize, lines: &mut Vec<String>) {
    let pad = "  ".repeat(depth);
    match node {
        PlanNode::Probe { field, value } => {
            lines.push(format!("{pad}probe {field} == '{value}'"));
        }
        PlanNode::Range(range) => {
            lines.push(format!("{pad}range {range}"));
        }
        PlanNode::Ivarator(plan) => {
            lines.push(format!("{pad}ivarate {} [term{}]", source_label(plan), plan.ordinal));
        }
        PlanNode::Intersection { includes, excludes } => {
            lines.push(format!("{pad}intersection"));
            render_junction(includes, excludes, depth, lines);
        }
        PlanNode::Union { includes, excludes } => {
            lines.push(format!("{pad}union"));
            render_junction(includes, excludes, depth, lines);
        }
    }
}

fn render_junction(
    includes: &[PlanNode],
    excludes: &[PlanNode],
    depth: usize,
    lines: &mut Vec<String>,
) {
    for child in includes {
        render(child, depth + 1, lines);
    }
    if !excludes.is_empty() {
        lines.push(format!("{}except", "  ".repeat(depth + 1)));
        for child in excludes {
            render(child, depth + 2, lines);
        }
    }
}

fn source_label(plan: &IvaratorPlan) -> String {
    match &plan.source {
        IvaratorSource::Range(range) => range.to_string(),
        IvaratorSource::Pattern(pattern) => format!("{} =~ '{pattern}'", plan.field),
        IvaratorSource::Values(values) => {
            let listed: Vec<String> = values.iter().map(|value| format!("'{value}'")).collect();
            format!("{} in [{}]", plan.field, listed.join(", "))
        }
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
    fn leaves_render_on_one_line() {
        assert_eq!(probe("NAME", "ann").explain(), "probe NAME == 'ann'");
    }

    #[test]
    fn junctions_indent_their_children() {
        let plan = PlanNode::Intersection {
            includes: vec![
                probe("NAME", "ann"),
                PlanNode::Union {
                    includes: vec![probe("AGE", "30"), probe("AGE", "31")],
                    excludes: Vec::new(),
                },
            ],
            excludes: vec![probe("NAME", "bob")],
        };

        assert_eq!(
            plan.explain(),
            [
                "intersection",
                "  probe NAME == 'ann'",
                "  union",
                "    probe AGE == '30'",
                "    probe AGE == '31'",
                "  except",
                "    probe NAME == 'bob'",
            ]
            .join("\n")
        );
    }

    #[test]
    fn overflow_scans_show_their_source_and_slot() {
        let plan = PlanNode::Ivarator(IvaratorPlan {
            field: "AGE".to_string(),
            source: IvaratorSource::Values(vec!["30".to_string(), "31".to_string()]),
            spill_dir: PathBuf::from("/tmp/spill"),
            ordinal: 2,
            settings: IvaratorSettings::default(),
        });

        assert_eq!(plan.explain(), "ivarate AGE in ['30', '31'] [term2]");
    }
}
