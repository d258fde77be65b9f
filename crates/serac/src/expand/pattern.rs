//! Wildcard pattern analysis.
//!
//! Expansion and ivarator planning only need three facts about a
//! pattern: the literal run anchored at its start, the literal run
//! anchored at its end, and whether it is one of the canonical
//! match-everything spellings. Anything fancier stays opaque; a pattern
//! with no anchored literal on either end cannot seed an index scan.

use crate::error::CompileError;
use regex_syntax::hir::{Hir, HirKind};
use std::fmt;

///
/// PatternFacts
///

#[derive(Clone, Debug, Default)]
pub struct PatternFacts {
    pub leading_literal: Option<String>,
    pub trailing_literal: Option<String>,
    pub matches_all: bool,
}

impl PatternFacts {
    /// Wildcards on both ends; an index scan has nothing to seek to.
    #[must_use]
    pub fn double_ended(&self) -> bool {
        !self.matches_all && self.leading_literal.is_none() && self.trailing_literal.is_none()
    }

    /// Whether the pattern can drive a scan over the given index shapes.
    #[must_use]
    pub fn expandable(&self, forward_indexed: bool, reverse_indexed: bool) -> bool {
        if self.matches_all || self.double_ended() {
            return false;
        }

        (self.leading_literal.is_some() && forward_indexed)
            || (self.trailing_literal.is_some() && reverse_indexed)
    }
}

pub fn analyze(pattern: &str, context: impl fmt::Display) -> Result<PatternFacts, CompileError> {
    if is_match_all(pattern) {
        return Ok(PatternFacts {
            matches_all: true,
            ..PatternFacts::default()
        });
    }

    let hir = regex_syntax::parse(pattern)
        .map_err(|err| CompileError::malformed(format!("invalid pattern: {err}"), context))?;

    let (leading_literal, trailing_literal) = edge_literals(&hir);

    Ok(PatternFacts {
        leading_literal,
        trailing_literal,
        matches_all: false,
    })
}

/// The canonical spellings of "match any value", anchored or not.
fn is_match_all(pattern: &str) -> bool {
    let trimmed = pattern.strip_prefix('^').unwrap_or(pattern);
    let trimmed = trimmed.strip_suffix('$').unwrap_or(trimmed);
    matches!(trimmed, ".*" | ".*?")
}

fn edge_literals(hir: &Hir) -> (Option<String>, Option<String>) {
    match hir.kind() {
        HirKind::Literal(_) => {
            let text = literal_text(hir);
            (text.clone(), text)
        }
        HirKind::Capture(capture) => edge_literals(&capture.sub),
        HirKind::Concat(parts) => {
            let visible: Vec<&Hir> = parts
                .iter()
                .filter(|part| !matches!(part.kind(), HirKind::Look(_)))
                .collect();
            let leading = visible.first().and_then(|part| literal_text(part));
            let trailing = visible.last().and_then(|part| literal_text(part));
            (leading, trailing)
        }
        _ => (None, None),
    }
}

fn literal_text(hir: &Hir) -> Option<String> {
    match hir.kind() {
        HirKind::Literal(lit) => std::str::from_utf8(&lit.0).ok().map(str::to_owned),
        HirKind::Capture(capture) => literal_text(&capture.sub),
        _ => None,
    }
}

///
/// TESTS
///
