//! Per-compilation state: configuration and catalog borrows, the term
//! budget counter, satisfiability tracking, the lookup pool, the ivarator
//! side table, and report counters. One context per compile; nothing here
//! outlives the artifact.

use crate::{
    config::CompilerConfig,
    error::CompileError,
    expand::pool::LookupPool,
    node::{
        Expr,
        structural::{self, StructuralMap},
    },
    schema::Providers,
};
use serde::{Deserialize, Serialize};
use std::fmt;

///
/// CompileReport
///
/// Counters accumulated across the pipeline; attached to the artifact.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct CompileReport {
    pub terms_processed: usize,
    pub terms_expanded: usize,
    pub terms_deferred: usize,
    pub values_substituted: usize,
    pub aliases_applied: usize,
    pub representations_added: usize,
    pub composites_formed: usize,
    pub subtrees_pruned: usize,
    pub lookups_dispatched: usize,
    pub lookups_reused: usize,
    pub ivarators_built: usize,
}

struct IvaratorSlot {
    ordinal: u32,
}

///
/// CompileContext
///

pub struct CompileContext<'a> {
    pub config: &'a CompilerConfig,
    pub providers: Providers<'a>,
    pub(crate) pool: LookupPool,
    pub(crate) report: CompileReport,
    terms_seen: usize,
    expected_executable: bool,
    satisfiable: bool,
    warned_inconsistency: bool,
    ivarators: StructuralMap<IvaratorSlot>,
    next_ivarator: u32,
}

impl<'a> CompileContext<'a> {
    pub fn new(
        config: &'a CompilerConfig,
        providers: Providers<'a>,
    ) -> Result<Self, CompileError> {
        config.validate()?;
        let pool = LookupPool::new(config.lookup_threads)?;

        Ok(Self {
            config,
            providers,
            pool,
            report: CompileReport::default(),
            terms_seen: 0,
            expected_executable: false,
            satisfiable: true,
            warned_inconsistency: false,
            ivarators: StructuralMap::new(),
            next_ivarator: 0,
        })
    }

    /// Charge `n` terms against the budget; exceeding it is fatal.
    pub fn charge_terms(&mut self, n: usize) -> Result<(), CompileError> {
        self.terms_seen = self.terms_seen.saturating_add(n);
        self.report.terms_processed = self.terms_seen;

        if self.terms_seen > self.config.max_terms {
            return Err(CompileError::term_budget(
                self.terms_seen,
                self.config.max_terms,
            ));
        }

        Ok(())
    }

    #[must_use]
    pub const fn terms_seen(&self) -> usize {
        self.terms_seen
    }

    /// Record the classifier's verdict before plan compilation. The
    /// artifact starts out claiming exactly what the classifier predicted.
    pub const fn set_expected_executable(&mut self, expected: bool) {
        self.expected_executable = expected;
        self.satisfiable = expected;
    }

    /// Record that part of the query fell back to post-scan evaluation.
    ///
    /// When the classifier had predicted a fully index-answerable query,
    /// the first fallback is an index inconsistency: warn once, never
    /// fail.
    pub fn fall_back(&mut self, why: &str, context: impl fmt::Display) {
        if self.expected_executable && !self.warned_inconsistency {
            log::warn!(
                "[{}] index inconsistency: {why} at `{context}`; plan no longer covers the full query",
                self.config.query_id
            );
            self.warned_inconsistency = true;
        } else {
            log::debug!(
                "[{}] post-scan fallback: {why} at `{context}`",
                self.config.query_id
            );
        }

        self.satisfiable = false;
    }

    #[must_use]
    pub const fn fully_satisfiable(&self) -> bool {
        self.satisfiable
    }

    /// Ordinal slot for an overflow scan, idempotent per (field, source):
    /// the same pair always lands in the same slot. Returns the ordinal
    /// and whether the slot is new.
    pub(crate) fn ivarator_slot(&mut self, field: &str, source: &Expr) -> (u32, bool) {
        let key = structural::source_hash(field, source);
        if let Some(slot) = self.ivarators.get(key) {
            return (slot.ordinal, false);
        }

        let ordinal = self.next_ivarator;
        self.next_ivarator += 1;
        self.ivarators.insert(key, IvaratorSlot { ordinal });
        self.report.ivarators_built += 1;

        (ordinal, true)
    }

    /// Fold pool counters into the report after the last pass.
    pub(crate) const fn seal_report(&mut self) {
        self.report.lookups_dispatched = self.pool.dispatched();
        self.report.lookups_reused = self.pool.reused();
    }

    #[must_use]
    pub const fn report(&self) -> CompileReport {
        self.report
    }
}
