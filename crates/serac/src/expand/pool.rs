//! Bounded lookup pool.
//!
//! Expansion accumulates lookup tasks per pattern, dispatches the distinct
//! ones across a bounded worker pool, and joins the whole batch before any
//! rebuild. A storage failure fails the batch as a unit: the first one
//! cancels work that has not started and surfaces alone. Timeouts are
//! per-task resolutions, not failures; the caller defers those terms
//! instead of aborting. Outcomes are memoized for the life of one
//! compilation so identical sub-patterns reuse one lookup.

use crate::{
    error::CompileError,
    node::structural,
    schema::{IndexLookup, LookupError, LookupOutcome},
};
use rayon::{ThreadPool, ThreadPoolBuilder, prelude::*};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

///
/// LookupTask
///
/// One fielded pattern to resolve, with the rendering of its originating
/// subtree for error context.
///

#[derive(Clone, Debug)]
pub struct LookupTask {
    pub field: String,
    pub pattern: String,
    pub context: String,
}

impl LookupTask {
    #[must_use]
    pub fn new(
        field: impl Into<String>,
        pattern: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            pattern: pattern.into(),
            context: context.into(),
        }
    }

    /// Memo key; tasks with equal keys are the same lookup.
    #[must_use]
    pub fn key(&self) -> u64 {
        structural::term_hash(&self.field, &self.pattern)
    }
}

///
/// Resolution
///
/// What one task came back with. Timed-out lookups are ordinary
/// resolutions so the caller can defer the term.
///

#[derive(Clone, Debug)]
pub enum Resolution {
    Outcome(Arc<LookupOutcome>),
    TimedOut,
}

enum TaskResult {
    Done(u64, LookupOutcome),
    TimedOut(u64),
    Skipped,
    Failed(CompileError),
}

///
/// LookupPool
///

pub struct LookupPool {
    pool: ThreadPool,
    memo: HashMap<u64, Arc<LookupOutcome>>,
    dispatched: usize,
    reused: usize,
}

impl LookupPool {
    pub fn new(threads: usize) -> Result<Self, CompileError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("serac-lookup-{i}"))
            .build()
            .map_err(|err| {
                CompileError::storage(
                    LookupError::Storage {
                        reason: err.to_string(),
                    },
                    "lookup pool",
                )
            })?;

        Ok(Self {
            pool,
            memo: HashMap::new(),
            dispatched: 0,
            reused: 0,
        })
    }

    #[must_use]
    pub const fn dispatched(&self) -> usize {
        self.dispatched
    }

    #[must_use]
    pub const fn reused(&self) -> usize {
        self.reused
    }

    /// Resolve a batch of tasks, joining every worker before returning.
    /// The result maps task keys to per-task resolutions.
    pub fn resolve(
        &mut self,
        tasks: &[LookupTask],
        lookup: &dyn IndexLookup,
        timeout: Option<Duration>,
    ) -> Result<HashMap<u64, Resolution>, CompileError> {
        let mut results: HashMap<u64, Resolution> = HashMap::new();
        let mut pending: Vec<&LookupTask> = Vec::new();

        for task in tasks {
            let key = task.key();
            if results.contains_key(&key) {
                self.reused += 1;
                continue;
            }
            if let Some(hit) = self.memo.get(&key) {
                self.reused += 1;
                results.insert(key, Resolution::Outcome(Arc::clone(hit)));
                continue;
            }
            if pending.iter().any(|queued| queued.key() == key) {
                self.reused += 1;
                continue;
            }
            pending.push(task);
        }

        if pending.is_empty() {
            return Ok(results);
        }

        self.dispatched += pending.len();
        let cancel = AtomicBool::new(false);

        let mut outcomes: Vec<TaskResult> = self.pool.install(|| {
            pending
                .par_iter()
                .map(|task| {
                    if cancel.load(Ordering::Relaxed) {
                        return TaskResult::Skipped;
                    }

                    match lookup.lookup(&task.field, &task.pattern, timeout) {
                        Ok(outcome) => TaskResult::Done(task.key(), outcome),
                        Err(err) if err.is_timeout() => TaskResult::TimedOut(task.key()),
                        Err(err) => {
                            cancel.store(true, Ordering::Relaxed);
                            TaskResult::Failed(CompileError::storage(err, &task.context))
                        }
                    }
                })
                .collect()
        });

        // Surface the earliest failure in task order; completed siblings
        // from a failed batch are discarded, not memoized.
        if let Some(slot) = outcomes
            .iter()
            .position(|result| matches!(result, TaskResult::Failed(_)))
        {
            if let TaskResult::Failed(err) = outcomes.swap_remove(slot) {
                return Err(err);
            }
        }

        for result in outcomes {
            match result {
                TaskResult::Done(key, outcome) => {
                    let outcome = Arc::new(outcome);
                    self.memo.insert(key, Arc::clone(&outcome));
                    results.insert(key, Resolution::Outcome(outcome));
                }
                // timeouts resolve the batch but are never memoized
                TaskResult::TimedOut(key) => {
                    results.insert(key, Resolution::TimedOut);
                }
                TaskResult::Skipped | TaskResult::Failed(_) => {}
            }
        }

        Ok(results)
    }

    /// Serial lookup through the same memo, used by ivarator priming.
    pub fn resolve_one(
        &mut self,
        task: &LookupTask,
        lookup: &dyn IndexLookup,
        timeout: Option<Duration>,
        retries: u32,
    ) -> Result<Arc<LookupOutcome>, CompileError> {
        let key = task.key();
        if let Some(hit) = self.memo.get(&key) {
            self.reused += 1;
            return Ok(Arc::clone(hit));
        }

        let mut last_err: Option<LookupError> = None;
        for attempt in 0..=retries {
            self.dispatched += 1;
            match lookup.lookup(&task.field, &task.pattern, timeout) {
                Ok(outcome) => {
                    let outcome = Arc::new(outcome);
                    self.memo.insert(key, Arc::clone(&outcome));
                    return Ok(outcome);
                }
                Err(err) => {
                    log::debug!(
                        "lookup attempt {attempt} failed for {}:{}: {err}",
                        task.field,
                        task.pattern
                    );
                    last_err = Some(err);
                }
            }
        }

        let source = last_err.unwrap_or(LookupError::Storage {
            reason: "lookup failed with no attempts".to_string(),
        });
        Err(CompileError::storage(source, &task.context))
    }
}
