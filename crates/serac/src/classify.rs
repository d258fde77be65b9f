//! Executability classification.
//!
//! A bottom-up fold assigning each node one of five states, used to
//! decide whether a query (or a field-index subset of it) is answerable
//! from indexes alone. Conjunctions need only one executable child,
//! since sibling predicates can filter its results; disjunctions need
//! every arm executable or the union leaks rows. `Error` is reserved for
//! asking an index-only field to do something no index can answer, which
//! is fatal rather than a fallback.

use crate::{
    marker::MarkerKind,
    node::{CompareOp, Expr},
    schema::{DatatypeFilter, Metadata},
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt};

///
/// Executability
///

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize,
)]
pub enum Executability {
    Executable,
    Partial,
    NonExecutable,
    Ignorable,
    Error,
}

impl Executability {
    #[must_use]
    pub const fn is_executable(self) -> bool {
        matches!(self, Self::Executable)
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Executable => "executable",
            Self::Partial => "partial",
            Self::NonExecutable => "non-executable",
            Self::Ignorable => "ignorable",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Executability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

///
/// ClassifyMode
///
/// Whole-query mode gates planning: negations and exclusions cannot
/// drive a global index scan. Field-index mode judges a subset that will
/// run inside a single field's index, where exclusion is answerable.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ClassifyMode {
    WholeQuery,
    FieldIndex,
}

pub fn classify(
    expr: &Expr,
    metadata: &dyn Metadata,
    datatypes: &DatatypeFilter,
    mode: ClassifyMode,
) -> Executability {
    let walker = Walker {
        metadata,
        datatypes,
        mode,
    };
    walker.state_of(expr)
}

struct Walker<'a> {
    metadata: &'a dyn Metadata,
    datatypes: &'a DatatypeFilter,
    mode: ClassifyMode,
}

impl Walker<'_> {
    fn state_of(&self, expr: &Expr) -> Executability {
        match expr {
            Expr::And(children) => all_or_some(self.states(children)),
            Expr::Or(children) => all_or_none(self.states(children)),
            Expr::Not(inner) => self.negation(inner),
            Expr::Group(inner) => self.state_of(inner),
            Expr::Compare(cmp) => self.comparison(cmp),
            Expr::Function(_) => Executability::NonExecutable,
            Expr::Literal(_) | Expr::Ident(_) => Executability::Ignorable,
            Expr::Marked(marker) => self.marked(marker.kind, &marker.source),
        }
    }

    fn states(&self, children: &[Expr]) -> Vec<Executability> {
        children.iter().map(|child| self.state_of(child)).collect()
    }

    fn negation(&self, inner: &Expr) -> Executability {
        let child = self.state_of(inner);
        match self.mode {
            // a negation cannot drive the global index; the child may
            // still be fatally misclassified
            ClassifyMode::WholeQuery => match child {
                Executability::Error => Executability::Error,
                Executability::Ignorable => Executability::Ignorable,
                _ => Executability::NonExecutable,
            },
            ClassifyMode::FieldIndex => all_or_none(vec![child]),
        }
    }

    fn comparison(&self, cmp: &crate::node::Compare) -> Executability {
        let Some(term) = cmp.field_op_literal() else {
            // identifier-to-identifier comparisons need row evaluation
            return Executability::NonExecutable;
        };

        let indexed = self.metadata.is_indexed(term.field, self.datatypes);
        let index_only = self.metadata.is_index_only(term.field, self.datatypes);
        let non_event = self.metadata.is_non_event(term.field, self.datatypes);

        match term.op {
            CompareOp::Eq => {
                if term.literal.is_null() {
                    if index_only {
                        return Executability::Error;
                    }
                    return Executability::NonExecutable;
                }
                if indexed {
                    Executability::Executable
                } else {
                    Executability::NonExecutable
                }
            }
            CompareOp::Ne => {
                if self.mode == ClassifyMode::FieldIndex {
                    return self.comparison(&crate::node::Compare::new(
                        (*cmp.lhs).clone(),
                        CompareOp::Eq,
                        (*cmp.rhs).clone(),
                    ));
                }
                if term.literal.is_null() && index_only {
                    return Executability::Error;
                }
                Executability::NonExecutable
            }
            CompareOp::RegexMatch => {
                if indexed {
                    Executability::Executable
                } else {
                    Executability::NonExecutable
                }
            }
            // a bare bound or exclusion pattern is unbounded in the key
            // space; on a non-event field there is no row to filter either
            _ => {
                if non_event {
                    Executability::Error
                } else {
                    Executability::NonExecutable
                }
            }
        }
    }

    fn marked(&self, kind: MarkerKind, source: &Expr) -> Executability {
        match kind {
            MarkerKind::ExceededValue | MarkerKind::ExceededOr => Executability::Executable,
            MarkerKind::ExceededTerm | MarkerKind::Delayed | MarkerKind::Dropped => {
                Executability::NonExecutable
            }
            MarkerKind::EvaluationOnly => {
                if self.mentions_non_event(source) {
                    Executability::Error
                } else {
                    Executability::NonExecutable
                }
            }
            MarkerKind::BoundedRange => {
                if let Some(field) = single_field(source)
                    && self.metadata.is_indexed(field, self.datatypes)
                {
                    Executability::Executable
                } else {
                    Executability::NonExecutable
                }
            }
            MarkerKind::IndexHole => Executability::NonExecutable,
            MarkerKind::Strict | MarkerKind::Lenient => self.state_of(source),
        }
    }

    fn mentions_non_event(&self, expr: &Expr) -> bool {
        match expr {
            Expr::Ident(name) => self.metadata.is_non_event(name, self.datatypes),
            Expr::And(children) | Expr::Or(children) => {
                children.iter().any(|child| self.mentions_non_event(child))
            }
            Expr::Not(inner) | Expr::Group(inner) => self.mentions_non_event(inner),
            Expr::Compare(cmp) => {
                self.mentions_non_event(&cmp.lhs) || self.mentions_non_event(&cmp.rhs)
            }
            Expr::Function(call) => call.args.iter().any(|arg| self.mentions_non_event(arg)),
            Expr::Marked(marker) => self.mentions_non_event(&marker.source),
            Expr::Literal(_) => false,
        }
    }
}

/// The one field a bounded-range source constrains, if it is well formed.
fn single_field(source: &Expr) -> Option<&str> {
    let Expr::And(children) = source.peel() else {
        return None;
    };
    let first = children.first()?.as_field_term()?;
    Some(first.field)
}

/// Result is the state every non-ignorable child shares; disagreement is
/// partial unless an error is present.
fn all_or_none(states: Vec<Executability>) -> Executability {
    let distinct: BTreeSet<Executability> = states
        .into_iter()
        .filter(|state| *state != Executability::Ignorable)
        .collect();

    match distinct.len() {
        0 => Executability::Ignorable,
        1 => {
            let Some(only) = distinct.into_iter().next() else {
                return Executability::Ignorable;
            };
            only
        }
        _ if distinct.contains(&Executability::Error) => Executability::Error,
        _ => Executability::Partial,
    }
}

/// One executable child suffices; partial children taint the whole
/// conjunction and errors propagate.
fn all_or_some(states: Vec<Executability>) -> Executability {
    let considered: Vec<Executability> = states
        .into_iter()
        .filter(|state| *state != Executability::Ignorable)
        .collect();

    if considered.is_empty() {
        return Executability::Ignorable;
    }
    if considered.contains(&Executability::Error) {
        return Executability::Error;
    }
    if considered.contains(&Executability::Partial) {
        return Executability::Partial;
    }
    if considered.contains(&Executability::Executable) {
        return Executability::Executable;
    }

    Executability::NonExecutable
}

///
/// TESTS
///
