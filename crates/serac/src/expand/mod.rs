//! Cost-based expansion of regex terms into concrete index values.
//!
//! Two walks in one deterministic order. The first decides, per regex
//! leaf, whether to expand (structural necessity first, then the cost
//! gate) and queues one lookup task per leaf to expand. The batch then
//! resolves on the shared pool, and the second walk substitutes each
//! resolution back at the leaf that asked for it. Constant folding
//! realizes empty expansions; a tree folding to FALSE at the root is
//! unsatisfiable.

pub(crate) mod pattern;
pub(crate) mod pool;

#[cfg(test)]
mod tests;

use crate::{
    context::CompileContext,
    error::CompileError,
    marker::{self, Marker, MarkerKind},
    node::{
        CompareOp, Expr, FieldOpLiteral,
        structural::{StructuralMap, structural_hash},
    },
    rewrite::prune,
    schema::{Cost, LookupOutcome},
};
use self::pool::{LookupTask, Resolution};
use std::collections::{BTreeMap, BTreeSet, HashMap};

///
/// Decision
///
/// What the first walk settled on for one regex leaf. `Expand` carries
/// the index of the task queued for it.
///

#[derive(Clone, Copy, Debug)]
enum Decision {
    Keep,
    Delay,
    Expand(usize),
}

/// Ancestor junction on the path down to the current leaf; `via` is the
/// child the walk descended through.
struct Frame<'e> {
    conjunction: bool,
    children: &'e [Expr],
    via: usize,
}

///
/// Scan
///
/// First-walk state: the decision per regex leaf in visit order, the
/// queued lookup tasks, and the ancestor trail for cost comparisons.
///

struct Scan<'e> {
    decisions: Vec<Decision>,
    tasks: Vec<LookupTask>,
    frames: Vec<Frame<'e>>,
    necessity: StructuralMap<bool>,
    known: BTreeSet<String>,
}

/// Second-walk state; `cursor` pairs each regex leaf with its decision.
struct Rebuild<'a> {
    decisions: &'a [Decision],
    tasks: &'a [LookupTask],
    resolutions: &'a HashMap<u64, Resolution>,
    cursor: usize,
}

/// Run the expansion pass over a rewritten tree.
pub(crate) fn expand(expr: &Expr, ctx: &mut CompileContext<'_>) -> Result<Expr, CompileError> {
    ctx.charge_terms(expr.term_count())?;

    let mut scan = Scan {
        decisions: Vec::new(),
        tasks: Vec::new(),
        frames: Vec::new(),
        necessity: StructuralMap::new(),
        known: ctx.providers.metadata.known_fields(&ctx.config.datatypes),
    };
    collect(expr, ctx, &mut scan, false)?;

    let lookup = ctx.providers.lookup;
    let timeout = ctx.config.lookup_timeout;
    let resolutions = ctx.pool.resolve(&scan.tasks, lookup, timeout)?;

    let mut state = Rebuild {
        decisions: &scan.decisions,
        tasks: &scan.tasks,
        resolutions: &resolutions,
        cursor: 0,
    };
    let rebuilt = rebuild(expr, ctx, &mut state)?;

    let folded = prune::run(&rebuilt, ctx);
    if folded.as_bool() == Some(false) {
        return Err(CompileError::unsatisfiable(expr));
    }

    Ok(folded)
}

/// The leaf shape this pass acts on. Both walks must agree on it
/// exactly, or the decision cursor drifts.
fn regex_term(expr: &Expr) -> Option<FieldOpLiteral<'_>> {
    let Expr::Compare(cmp) = expr else {
        return None;
    };
    let term = cmp.field_op_literal()?;

    term.op.is_regex().then_some(term)
}

fn collect<'e>(
    expr: &'e Expr,
    ctx: &CompileContext<'_>,
    scan: &mut Scan<'e>,
    bounded: bool,
) -> Result<(), CompileError> {
    match expr {
        Expr::And(children) | Expr::Or(children) => {
            let conjunction = matches!(expr, Expr::And(_));
            let bounded = bounded || !requires_expansion(expr, ctx, &mut scan.necessity);
            for (via, child) in children.iter().enumerate() {
                scan.frames.push(Frame {
                    conjunction,
                    children,
                    via,
                });
                collect(child, ctx, scan, bounded)?;
                scan.frames.pop();
            }

            Ok(())
        }
        Expr::Not(inner) | Expr::Group(inner) => collect(inner, ctx, scan, bounded),
        Expr::Marked(marker) if marker.kind.is_policy() => {
            collect(&marker.source, ctx, scan, bounded)
        }
        Expr::Compare(_) => {
            if let Some(term) = regex_term(expr) {
                let decision = decide(expr, &term, ctx, scan, bounded)?;
                scan.decisions.push(decision);
            }

            Ok(())
        }
        _ => Ok(()),
    }
}

/// Whether a subtree still needs its regexes expanded to bound a scan.
/// A conjunction is bounded by any bounded child, a disjunction only by
/// all of its arms; indexed literal equalities are the bounding leaves.
/// Memoized per subtree, keyed by structural hash.
fn requires_expansion(
    expr: &Expr,
    ctx: &CompileContext<'_>,
    memo: &mut StructuralMap<bool>,
) -> bool {
    let key = structural_hash(expr);
    if let Some(&cached) = memo.get(key) {
        return cached;
    }

    let required = match expr {
        Expr::And(children) => children
            .iter()
            .all(|child| requires_expansion(child, ctx, memo)),
        Expr::Or(children) => children
            .iter()
            .any(|child| requires_expansion(child, ctx, memo)),
        Expr::Group(inner) => requires_expansion(inner, ctx, memo),
        Expr::Marked(marker) if marker.kind.is_policy() => {
            requires_expansion(&marker.source, ctx, memo)
        }
        Expr::Compare(cmp) => match cmp.field_op_literal() {
            Some(term) if term.op == CompareOp::Eq && !term.literal.is_null() => {
                !ctx.providers
                    .metadata
                    .is_indexed(term.field, &ctx.config.datatypes)
            }
            _ => true,
        },
        _ => true,
    };
    memo.insert(key, required);

    required
}

fn decide(
    leaf: &Expr,
    term: &FieldOpLiteral<'_>,
    ctx: &CompileContext<'_>,
    scan: &mut Scan<'_>,
    bounded: bool,
) -> Result<Decision, CompileError> {
    let Some(raw) = term.literal.as_text() else {
        return Ok(Decision::Keep);
    };
    let field = term.field;
    let metadata = ctx.providers.metadata;
    let datatypes = &ctx.config.datatypes;

    // Fields the catalog has never heard of, and known but unindexed
    // fields, belong to the post-scan evaluator.
    if !scan.known.contains(field) {
        return Ok(Decision::Delay);
    }
    let forward = metadata.is_indexed(field, datatypes);
    let reverse = metadata.is_reverse_indexed(field, datatypes);
    if !forward && !reverse {
        return Ok(Decision::Delay);
    }

    let facts = pattern::analyze(raw, leaf)?;
    if facts.matches_all {
        return Ok(Decision::Delay);
    }

    let must_expand =
        metadata.is_index_only(field, datatypes) || metadata.is_non_event(field, datatypes);
    if !facts.expandable(forward, reverse) {
        if must_expand {
            return Err(CompileError::unsupported(
                format!("pattern on index-only field {field} has no expandable edge"),
                leaf,
            ));
        }

        return Ok(Decision::Delay);
    }

    // With a lookup deadline the timeout bounds the work instead of the
    // cost gate.
    let forced = ctx.config.expand_all_terms || ctx.config.lookup_timeout.is_some();
    if !(must_expand || forced || !bounded || favorable(leaf, ctx, &scan.frames)) {
        log::debug!(
            "[{}] cost gate kept `{leaf}` unexpanded",
            ctx.config.query_id
        );
        return Ok(Decision::Keep);
    }

    scan.tasks.push(LookupTask::new(field, raw, leaf.to_string()));

    Ok(Decision::Expand(scan.tasks.len() - 1))
}

/// The cost gate for structurally unnecessary leaves: take the
/// conjunction run nearest the leaf, looking through disjunction arms
/// below it, and anchor at the run's outermost member. Expand only when
/// the leaf is estimated strictly cheaper than the cheapest anchor
/// sibling carrying nonzero non-index cost. No comparable sibling means
/// no expansion.
fn favorable(leaf: &Expr, ctx: &CompileContext<'_>, frames: &[Frame<'_>]) -> bool {
    let mut anchor: Option<&Frame<'_>> = None;
    for frame in frames.iter().rev() {
        if frame.conjunction {
            anchor = Some(frame);
        } else if anchor.is_some() {
            break;
        }
    }
    let Some(frame) = anchor else {
        return true;
    };

    let mut cheapest: Option<Cost> = None;
    for (index, sibling) in frame.children.iter().enumerate() {
        if index == frame.via {
            continue;
        }
        let cost = ctx.providers.cost.estimate(sibling);
        if cost.other_cost == 0 {
            continue;
        }
        if cheapest.is_none_or(|best| cost.total() < best.total()) {
            cheapest = Some(cost);
        }
    }

    cheapest.is_some_and(|best| ctx.providers.cost.estimate(leaf).total() < best.total())
}

fn rebuild(
    expr: &Expr,
    ctx: &mut CompileContext<'_>,
    state: &mut Rebuild<'_>,
) -> Result<Expr, CompileError> {
    match expr {
        Expr::And(children) => {
            let rebuilt = children
                .iter()
                .map(|child| rebuild(child, ctx, state))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Expr::And(rebuilt))
        }
        Expr::Or(children) => {
            let rebuilt = children
                .iter()
                .map(|child| rebuild(child, ctx, state))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Expr::Or(rebuilt))
        }
        Expr::Not(inner) => Ok(Expr::not(rebuild(inner, ctx, state)?)),
        Expr::Group(inner) => Ok(Expr::group(rebuild(inner, ctx, state)?)),
        Expr::Marked(marker) if marker.kind.is_policy() => {
            let source = rebuild(&marker.source, ctx, state)?;
            Ok(Expr::Marked(Marker::new(marker.kind, source)))
        }
        Expr::Marked(marker)
            if marker.kind == MarkerKind::EvaluationOnly
                && index_only_regex(&marker.source, ctx) =>
        {
            // The record cannot supply an index-only value, so the term
            // graduates to an overflow scan instead of post-scan
            // evaluation.
            Ok(marker::wrap(
                MarkerKind::ExceededValue,
                marker.source.as_ref().clone(),
            ))
        }
        Expr::Compare(_) => {
            let Some(term) = regex_term(expr) else {
                return Ok(expr.clone());
            };
            let Some(decision) = state.decisions.get(state.cursor) else {
                return Err(CompileError::malformed(
                    "expansion decisions out of step with the tree",
                    expr,
                ));
            };
            state.cursor += 1;

            match decision {
                Decision::Keep => Ok(expr.clone()),
                Decision::Delay => {
                    ctx.report.terms_deferred += 1;
                    log::debug!(
                        "[{}] deferred `{expr}` to post-scan evaluation",
                        ctx.config.query_id
                    );
                    Ok(marker::wrap(MarkerKind::Delayed, expr.clone()))
                }
                Decision::Expand(task) => {
                    let Some(resolution) = state
                        .tasks
                        .get(*task)
                        .and_then(|task| state.resolutions.get(&task.key()))
                    else {
                        return Err(CompileError::malformed(
                            "lookup resolution missing for expanded term",
                            expr,
                        ));
                    };

                    match resolution {
                        Resolution::TimedOut => {
                            ctx.report.terms_deferred += 1;
                            Ok(marker::wrap(MarkerKind::ExceededTerm, expr.clone()))
                        }
                        Resolution::Outcome(outcome) => match outcome.as_ref() {
                            LookupOutcome::Overflow(_) => {
                                Ok(marker::wrap(MarkerKind::ExceededValue, expr.clone()))
                            }
                            LookupOutcome::Values(resolved) => {
                                substitute(expr, &term, resolved, ctx)
                            }
                        },
                    }
                }
            }
        }
        other => Ok(other.clone()),
    }
}

/// True for an evaluation-only source whose regex field never reaches
/// the record.
fn index_only_regex(source: &Expr, ctx: &CompileContext<'_>) -> bool {
    let Some(term) = source.as_field_term() else {
        return false;
    };

    term.op.is_regex()
        && ctx
            .providers
            .metadata
            .is_index_only(term.field, &ctx.config.datatypes)
}

/// Replace one regex leaf with the values the index resolved for it.
fn substitute(
    leaf: &Expr,
    term: &FieldOpLiteral<'_>,
    resolved: &BTreeMap<String, BTreeSet<String>>,
    ctx: &mut CompileContext<'_>,
) -> Result<Expr, CompileError> {
    let negated = term.op == CompareOp::RegexNotMatch;
    let Some(values) = resolved.get(term.field).filter(|values| !values.is_empty()) else {
        log::debug!(
            "[{}] pattern matched nothing in the index: `{leaf}`",
            ctx.config.query_id
        );
        return Ok(Expr::lit(negated));
    };

    ctx.charge_terms(values.len().saturating_sub(1))?;
    ctx.report.terms_expanded += 1;
    ctx.report.values_substituted += values.len();
    log::debug!(
        "[{}] expanded `{leaf}` into {} index values",
        ctx.config.query_id,
        values.len()
    );

    let mut arms: Vec<Expr> = values
        .iter()
        .map(|value| {
            if negated {
                Expr::ne(term.field, value.as_str())
            } else {
                Expr::eq(term.field, value.as_str())
            }
        })
        .collect();
    if arms.len() == 1 {
        return Ok(arms.swap_remove(0));
    }

    Ok(if negated {
        Expr::group(Expr::And(arms))
    } else {
        Expr::group(Expr::Or(arms))
    })
}
