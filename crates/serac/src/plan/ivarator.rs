//! Overflow scans. An ivarator materializes a value set too large to
//! enumerate at compile time, spilling to disk past a persistence
//! threshold. The compiler sizes the scan and allocates its spill
//! directory; the runtime owns the resources.

use crate::{
    config::IvaratorSettings,
    context::CompileContext,
    error::CompileError,
    expand::pool::LookupTask,
    marker::{self, MarkerKind},
    node::{CompareOp, Expr, range::LiteralRange},
    schema::LookupError,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

///
/// IvaratorSource
///
/// What the runtime scan enumerates: a literal range, a pattern walked
/// against the index, or concrete values handed over directly.
///

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum IvaratorSource {
    Range(LiteralRange),
    Pattern(String),
    Values(Vec<String>),
}

///
/// IvaratorPlan
///
/// One overflow-scan leaf, carrying its runtime settings verbatim from
/// compile-time configuration.
///

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct IvaratorPlan {
    pub field: String,
    pub source: IvaratorSource,
    pub spill_dir: PathBuf,
    pub ordinal: u32,
    pub settings: IvaratorSettings,
}

/// Derive the scan source from the subtree an exceeded marker wraps.
pub(crate) fn source_of(origin: &Expr) -> Result<(String, IvaratorSource), CompileError> {
    let chain = marker::unwrap_fully(origin);

    if chain.has(MarkerKind::BoundedRange) {
        let range = LiteralRange::from_marked_source(chain.source)
            .map_err(|err| CompileError::malformed(err.to_string(), origin))?;
        return Ok((range.field.clone(), IvaratorSource::Range(range)));
    }

    if let Some(term) = chain.source.as_field_term() {
        if term.op.is_regex()
            && let Some(pattern) = term.literal.as_text()
        {
            return Ok((
                term.field.to_string(),
                IvaratorSource::Pattern(pattern.to_string()),
            ));
        }
        if term.op == CompareOp::Eq && !term.literal.is_null() {
            return Ok((
                term.field.to_string(),
                IvaratorSource::Values(vec![term.literal.render()]),
            ));
        }
        if term.op.is_relational()
            && let Some(range) = LiteralRange::from_single(&term)
        {
            return Ok((range.field.clone(), IvaratorSource::Range(range)));
        }
    }

    Err(CompileError::malformed(
        "no overflow scan source in the marked subtree",
        origin,
    ))
}

/// Collect the values of an exceeded union: every arm must be an
/// equality on one shared field.
pub(crate) fn union_values(origin: &Expr) -> Result<(String, IvaratorSource), CompileError> {
    let Expr::Or(arms) = origin.peel() else {
        return Err(CompileError::malformed(
            "exceeded-or marks a subtree that is not a union",
            origin,
        ));
    };

    let mut field: Option<String> = None;
    let mut values = Vec::with_capacity(arms.len());
    for arm in arms {
        let Some(term) = arm.as_field_term() else {
            return Err(CompileError::malformed(
                "exceeded-or arm is not a field comparison",
                origin,
            ));
        };
        if term.op != CompareOp::Eq || term.literal.is_null() {
            return Err(CompileError::malformed(
                "exceeded-or arm is not an equality",
                origin,
            ));
        }
        match &field {
            Some(seen) if seen != term.field => {
                return Err(CompileError::malformed(
                    "exceeded-or arms span more than one field",
                    origin,
                ));
            }
            Some(_) => {}
            None => field = Some(term.field.to_string()),
        }
        values.push(term.literal.render());
    }

    let Some(field) = field else {
        return Err(CompileError::malformed("exceeded-or union is empty", origin));
    };

    Ok((field, IvaratorSource::Values(values)))
}

/// Build one overflow-scan leaf. Idempotent per (field, origin): the
/// same pair always lands in the same spill slot and is primed at most
/// once. Pattern sources prime the lookup memo through the pool's
/// bounded-retry path.
pub(crate) fn build(
    field: &str,
    source: IvaratorSource,
    origin: &Expr,
    ctx: &mut CompileContext<'_>,
) -> Result<IvaratorPlan, CompileError> {
    let settings = ctx.config.ivarator.clone();
    if settings.cache_dirs.is_empty() {
        return Err(CompileError::storage(
            LookupError::Storage {
                reason: "no spill directories configured for overflow scans".to_string(),
            },
            origin,
        ));
    }

    let (ordinal, fresh) = ctx.ivarator_slot(field, origin);
    let slot = usize::try_from(ordinal).unwrap_or_default() % settings.cache_dirs.len();
    let spill_dir = settings.cache_dirs[slot]
        .join(&ctx.config.query_id)
        .join(format!("term{ordinal}"));

    if fresh && let IvaratorSource::Pattern(pattern) = &source {
        let task = LookupTask::new(field, pattern.as_str(), origin.to_string());
        let lookup = ctx.providers.lookup;
        let timeout = ctx.config.lookup_timeout;
        ctx.pool.resolve_one(&task, lookup, timeout, settings.retries)?;
    }

    Ok(IvaratorPlan {
        field: field.to_string(),
        source,
        spill_dir,
        ordinal,
        settings,
    })
}
