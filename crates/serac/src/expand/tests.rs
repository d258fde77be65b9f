use super::*;
use crate::{
    config::CompilerConfig,
    node::Compare,
    test_support::{Fixture, FixtureMetadata, FlatCost, TableLookup},
};
use std::time::Duration;

fn name_fixture() -> Fixture {
    let mut fx = Fixture::default();
    fx.metadata = FixtureMetadata::with_indexed(&["NAME", "AGE"]);
    fx.lookup = TableLookup::default().with_values("NAME", &["andy", "ann", "bob"]);
    fx
}

///
/// structural necessity
///

#[test]
fn necessary_regex_expands_into_a_disjunction() {
    let fx = name_fixture();
    let config = CompilerConfig::default();
    let mut ctx = fx.context(&config);

    let out = expand(&Expr::matches("NAME", "an.*"), &mut ctx).unwrap();

    assert_eq!(out.to_string(), "((NAME == 'andy' || NAME == 'ann'))");
    assert_eq!(ctx.report().terms_expanded, 1);
    assert_eq!(ctx.report().values_substituted, 2);
}

#[test]
fn union_arms_expand_beside_indexed_equalities() {
    let fx = name_fixture();
    let config = CompilerConfig::default();
    let mut ctx = fx.context(&config);

    let query = Expr::Or(vec![
        Expr::matches("NAME", "an.*"),
        Expr::eq("AGE", "30"),
    ]);
    let out = expand(&query, &mut ctx).unwrap();

    assert_eq!(
        out.to_string(),
        "(((NAME == 'andy' || NAME == 'ann')) || AGE == '30')"
    );
}

#[test]
fn bounded_conjunction_keeps_the_regex_unexpanded() {
    let fx = name_fixture();
    let config = CompilerConfig::default();
    let mut ctx = fx.context(&config);

    let query = Expr::And(vec![
        Expr::eq("AGE", "30"),
        Expr::matches("NAME", "an.*"),
    ]);
    let out = expand(&query, &mut ctx).unwrap();

    assert_eq!(out, query);
    assert_eq!(fx.lookup.lookups_run(), 0);
}

#[test]
fn negated_regex_expands_into_exclusions() {
    let fx = name_fixture();
    let config = CompilerConfig::default();
    let mut ctx = fx.context(&config);

    let out = expand(&Expr::not_matches("NAME", "an.*"), &mut ctx).unwrap();

    assert_eq!(out.to_string(), "((NAME != 'andy' && NAME != 'ann'))");
}

#[test]
fn single_value_expansion_substitutes_the_equality_bare() {
    let mut fx = name_fixture();
    fx.lookup = TableLookup::default().with_values("NAME", &["ann", "bob"]);
    let config = CompilerConfig::default();
    let mut ctx = fx.context(&config);

    let out = expand(&Expr::matches("NAME", "ann"), &mut ctx).unwrap();

    assert_eq!(out, Expr::eq("NAME", "ann"));
}

///
/// cost gate
///

#[test]
fn cost_gate_expands_a_cheaper_regex() {
    let mut fx = name_fixture();
    fx.cost = FlatCost::default()
        .with("NAME", Cost::new(1, 0))
        .with("AGE", Cost::new(5, 5));
    let config = CompilerConfig::default();
    let mut ctx = fx.context(&config);

    let query = Expr::And(vec![
        Expr::eq("AGE", "30"),
        Expr::matches("NAME", "an.*"),
    ]);
    let out = expand(&query, &mut ctx).unwrap();

    assert_eq!(
        out.to_string(),
        "(AGE == '30' && ((NAME == 'andy' || NAME == 'ann')))"
    );
}

#[test]
fn cost_gate_needs_a_sibling_with_evaluation_cost() {
    let mut fx = name_fixture();
    fx.cost = FlatCost::default().with("AGE", Cost::new(5, 0));
    let config = CompilerConfig::default();
    let mut ctx = fx.context(&config);

    let query = Expr::And(vec![
        Expr::eq("AGE", "30"),
        Expr::matches("NAME", "an.*"),
    ]);
    let out = expand(&query, &mut ctx).unwrap();

    assert_eq!(out, query);
    assert_eq!(fx.lookup.lookups_run(), 0);
}

#[test]
fn expand_all_terms_overrides_the_gate() {
    let fx = name_fixture();
    let config = CompilerConfig {
        expand_all_terms: true,
        ..Default::default()
    };
    let mut ctx = fx.context(&config);

    let query = Expr::And(vec![
        Expr::eq("AGE", "30"),
        Expr::matches("NAME", "an.*"),
    ]);
    let out = expand(&query, &mut ctx).unwrap();

    assert_eq!(
        out.to_string(),
        "(AGE == '30' && ((NAME == 'andy' || NAME == 'ann')))"
    );
}

#[test]
fn lookup_deadline_skips_the_gate() {
    let fx = name_fixture();
    let config = CompilerConfig {
        lookup_timeout: Some(Duration::from_secs(5)),
        ..Default::default()
    };
    let mut ctx = fx.context(&config);

    let query = Expr::And(vec![
        Expr::eq("AGE", "30"),
        Expr::matches("NAME", "an.*"),
    ]);
    let out = expand(&query, &mut ctx).unwrap();

    assert_eq!(fx.lookup.lookups_run(), 1);
    assert_eq!(
        out.to_string(),
        "(AGE == '30' && ((NAME == 'andy' || NAME == 'ann')))"
    );
}

///
/// admissibility
///

#[test]
fn unknown_field_is_deferred() {
    let fx = name_fixture();
    let config = CompilerConfig::default();
    let mut ctx = fx.context(&config);

    let query = Expr::matches("WHO", "an.*");
    let out = expand(&query, &mut ctx).unwrap();

    assert_eq!(out, marker::wrap(MarkerKind::Delayed, query));
    assert_eq!(ctx.report().terms_deferred, 1);
}

#[test]
fn known_unindexed_field_is_deferred() {
    let mut fx = name_fixture();
    fx.metadata = FixtureMetadata::with_indexed(&["AGE"]).and_event_only(&["NOTES"]);
    let config = CompilerConfig::default();
    let mut ctx = fx.context(&config);

    let query = Expr::matches("NOTES", "an.*");
    let out = expand(&query, &mut ctx).unwrap();

    assert_eq!(out, marker::wrap(MarkerKind::Delayed, query));
    assert_eq!(fx.lookup.lookups_run(), 0);
}

#[test]
fn match_all_pattern_is_never_dispatched() {
    let fx = name_fixture();
    let config = CompilerConfig::default();
    let mut ctx = fx.context(&config);

    let query = Expr::matches("NAME", ".*");
    let out = expand(&query, &mut ctx).unwrap();

    assert_eq!(out, marker::wrap(MarkerKind::Delayed, query));
    assert_eq!(fx.lookup.lookups_run(), 0);
}

#[test]
fn double_ended_pattern_defers_on_event_backed_fields() {
    let fx = name_fixture();
    let config = CompilerConfig::default();
    let mut ctx = fx.context(&config);

    let query = Expr::matches("NAME", ".*mid.*");
    let out = expand(&query, &mut ctx).unwrap();

    assert_eq!(out, marker::wrap(MarkerKind::Delayed, query));
}

#[test]
fn unexpandable_pattern_on_index_only_field_is_fatal() {
    let mut fx = name_fixture();
    fx.metadata = FixtureMetadata::with_indexed(&["NAME"]).and_index_only(&["HASH"]);
    let config = CompilerConfig::default();
    let mut ctx = fx.context(&config);

    let err = expand(&Expr::matches("HASH", ".*mid.*"), &mut ctx).unwrap_err();

    assert_eq!(err.kind_label(), "unsupported-construct");
    assert!(err.to_string().contains("expandable edge"));
}

#[test]
fn suffix_pattern_expands_through_the_reverse_index() {
    let mut fx = Fixture::default();
    fx.metadata = FixtureMetadata::with_indexed(&["NAME"]).and_reverse(&["NAME"]);
    fx.lookup = TableLookup::default().with_values("NAME", &["anderson", "kim", "mason"]);
    let config = CompilerConfig::default();
    let mut ctx = fx.context(&config);

    let out = expand(&Expr::matches("NAME", ".*son"), &mut ctx).unwrap();

    assert_eq!(out.to_string(), "((NAME == 'anderson' || NAME == 'mason'))");
}

#[test]
fn suffix_pattern_without_reverse_index_defers() {
    let fx = name_fixture();
    let config = CompilerConfig::default();
    let mut ctx = fx.context(&config);

    let query = Expr::matches("NAME", ".*son");
    let out = expand(&query, &mut ctx).unwrap();

    assert_eq!(out, marker::wrap(MarkerKind::Delayed, query));
}

#[test]
fn non_text_regex_operand_is_left_alone() {
    let fx = name_fixture();
    let config = CompilerConfig::default();
    let mut ctx = fx.context(&config);

    let query = Expr::Compare(Compare::term("NAME", CompareOp::RegexMatch, 5_i64));
    let out = expand(&query, &mut ctx).unwrap();

    assert_eq!(out, query);
    assert_eq!(fx.lookup.lookups_run(), 0);
}

///
/// empty expansions
///

#[test]
fn empty_expansion_inside_a_union_drops_the_arm() {
    let fx = name_fixture();
    let config = CompilerConfig::default();
    let mut ctx = fx.context(&config);

    let query = Expr::Or(vec![
        Expr::matches("NAME", "zz.*"),
        Expr::eq("AGE", "30"),
    ]);
    let out = expand(&query, &mut ctx).unwrap();

    assert_eq!(out, Expr::eq("AGE", "30"));
}

#[test]
fn empty_expansion_outside_a_union_is_unsatisfiable() {
    let fx = name_fixture();
    let config = CompilerConfig::default();
    let mut ctx = fx.context(&config);

    let err = expand(&Expr::matches("NAME", "zz.*"), &mut ctx).unwrap_err();

    assert_eq!(err.kind_label(), "unsatisfiable-expansion");
}

#[test]
fn negated_empty_expansion_is_the_constant_true() {
    let fx = name_fixture();
    let config = CompilerConfig::default();
    let mut ctx = fx.context(&config);

    let out = expand(&Expr::not_matches("NAME", "zz.*"), &mut ctx).unwrap();

    assert_eq!(out, Expr::lit(true));
}

///
/// overflow, timeouts, failures
///

#[test]
fn oversized_expansion_is_wrapped_for_an_overflow_scan() {
    let mut fx = name_fixture();
    fx.lookup = TableLookup::default()
        .with_values("NAME", &["andy", "ann", "anna"])
        .overflow_above(2);
    let config = CompilerConfig::default();
    let mut ctx = fx.context(&config);

    let query = Expr::matches("NAME", "an.*");
    let out = expand(&query, &mut ctx).unwrap();

    assert!(out.is_marked(MarkerKind::ExceededValue));
    assert_eq!(marker::unwrap_fully(&out).source, &query);
}

#[test]
fn timed_out_lookup_defers_the_term() {
    let mut fx = name_fixture();
    fx.lookup = TableLookup::default()
        .with_values("NAME", &["andy", "ann"])
        .timing_out_on("NAME");
    let config = CompilerConfig {
        lookup_timeout: Some(Duration::from_millis(10)),
        ..Default::default()
    };
    let mut ctx = fx.context(&config);

    let query = Expr::matches("NAME", "an.*");
    let out = expand(&query, &mut ctx).unwrap();

    assert!(out.is_marked(MarkerKind::ExceededTerm));
    assert_eq!(ctx.report().terms_deferred, 1);
}

#[test]
fn storage_failure_aborts_the_compile() {
    let mut fx = name_fixture();
    fx.lookup = TableLookup::default()
        .with_values("NAME", &["andy"])
        .failing_on("NAME");
    let config = CompilerConfig::default();
    let mut ctx = fx.context(&config);

    let err = expand(&Expr::matches("NAME", "an.*"), &mut ctx).unwrap_err();

    assert_eq!(err.kind_label(), "storage-failure");
}

#[test]
fn identical_patterns_resolve_through_one_lookup() {
    let fx = name_fixture();
    let config = CompilerConfig::default();
    let mut ctx = fx.context(&config);

    let query = Expr::Or(vec![
        Expr::matches("NAME", "an.*"),
        Expr::matches("NAME", "an.*"),
    ]);
    let out = expand(&query, &mut ctx).unwrap();

    assert_eq!(fx.lookup.lookups_run(), 1);
    assert_eq!(
        out.to_string(),
        "(((NAME == 'andy' || NAME == 'ann')) || ((NAME == 'andy' || NAME == 'ann')))"
    );
}

///
/// markers
///

#[test]
fn deferral_markers_fence_off_expansion() {
    let fx = name_fixture();
    let config = CompilerConfig::default();
    let mut ctx = fx.context(&config);

    let query = marker::wrap(MarkerKind::Delayed, Expr::matches("NAME", "an.*"));
    let out = expand(&query, &mut ctx).unwrap();

    assert_eq!(out, query);
    assert_eq!(fx.lookup.lookups_run(), 0);
}

#[test]
fn evaluation_only_index_only_regex_graduates_to_an_overflow_scan() {
    let mut fx = name_fixture();
    fx.metadata = FixtureMetadata::with_indexed(&[]).and_index_only(&["HASH"]);
    let config = CompilerConfig::default();
    let mut ctx = fx.context(&config);

    let source = Expr::matches("HASH", "ab.*");
    let query = marker::wrap(MarkerKind::EvaluationOnly, source.clone());
    let out = expand(&query, &mut ctx).unwrap();

    let chain = marker::unwrap_fully(&out);
    assert_eq!(chain.kinds, vec![MarkerKind::ExceededValue]);
    assert_eq!(chain.source, &source);
    assert_eq!(fx.lookup.lookups_run(), 0);
}

#[test]
fn evaluation_only_event_field_regex_is_left_alone() {
    let fx = name_fixture();
    let config = CompilerConfig::default();
    let mut ctx = fx.context(&config);

    let query = marker::wrap(MarkerKind::EvaluationOnly, Expr::matches("NAME", "ab.*"));
    let out = expand(&query, &mut ctx).unwrap();

    assert_eq!(out, query);
    assert_eq!(fx.lookup.lookups_run(), 0);
}

#[test]
fn policy_markers_stay_transparent_to_expansion() {
    let fx = name_fixture();
    let config = CompilerConfig::default();
    let mut ctx = fx.context(&config);

    let query = marker::wrap(MarkerKind::Strict, Expr::matches("NAME", "an.*"));
    let out = expand(&query, &mut ctx).unwrap();

    assert_eq!(out.to_string(), "strict(((NAME == 'andy' || NAME == 'ann')))");
}

///
/// term budget
///

#[test]
fn term_budget_gates_before_dispatch() {
    let fx = name_fixture();
    let config = CompilerConfig {
        max_terms: 2,
        ..Default::default()
    };
    let mut ctx = fx.context(&config);

    let query = Expr::And(vec![
        Expr::eq("AGE", "30"),
        Expr::eq("AGE", "31"),
        Expr::matches("NAME", "an.*"),
    ]);
    let err = expand(&query, &mut ctx).unwrap_err();

    assert_eq!(err.kind_label(), "term-budget-exceeded");
    assert_eq!(fx.lookup.lookups_run(), 0);
}

#[test]
fn expansion_arms_charge_the_budget() {
    let mut fx = name_fixture();
    fx.lookup = TableLookup::default().with_values("NAME", &["a1", "a2", "a3", "a4"]);
    let config = CompilerConfig {
        max_terms: 2,
        ..Default::default()
    };
    let mut ctx = fx.context(&config);

    let err = expand(&Expr::matches("NAME", "a.*"), &mut ctx).unwrap_err();

    assert_eq!(err.kind_label(), "term-budget-exceeded");
}
