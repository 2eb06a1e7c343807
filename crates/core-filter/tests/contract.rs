//! Cross-strategy contract tests: every filter must behave identically
//! through `apply` and `apply_collect`, and parallelisable filters must
//! produce chunk outputs that concatenate to the unchunked result.

use std::sync::Arc;

use core_filter::{ChannelSink, Filter, FilterSet, FuzzyFilter, RegexpFilter};
use core_model::{IdGen, Line, Matched, Span};
use core_pipeline::Scope;
use tokio::sync::mpsc;

fn corpus() -> Vec<Matched> {
    let gen = IdGen::fixed(0);
    let texts = [
        "Apple",
        "banana",
        "APRICOT",
        "cherry",
        "application",
        "the quick brown fox",
        "lorem ipsum",
        "taxi",
        "foo",
        "foobar",
        "foobaz",
        "qux",
        "日本語の行",
        "",
        "  leading spaces",
    ];
    texts
        .iter()
        .map(|t| Matched::passthrough(Arc::new(Line::new(gen.next(), *t, false, false))))
        .collect()
}

fn flatten(out: &[Matched]) -> Vec<(u64, Vec<Span>)> {
    out.iter().map(|m| (m.id(), m.spans().to_vec())).collect()
}

async fn apply_via_channel(
    filter: &dyn Filter,
    scope: &Scope,
    lines: &[Matched],
) -> Vec<Matched> {
    let (tx, mut rx) = mpsc::channel(1024);
    let mut sink = ChannelSink::new(tx);
    filter.apply(scope, lines, &mut sink).await.unwrap();
    drop(sink);
    let mut out = Vec::new();
    while let Some(item) = rx.recv().await {
        out.push(item);
    }
    out
}

fn standard_filters() -> Vec<Arc<dyn Filter>> {
    vec![
        Arc::new(RegexpFilter::ignore_case()),
        Arc::new(RegexpFilter::case_sensitive()),
        Arc::new(RegexpFilter::smart_case()),
        Arc::new(RegexpFilter::regexp()),
        Arc::new(RegexpFilter::iregexp()),
        Arc::new(FuzzyFilter::new(false)),
        Arc::new(FuzzyFilter::new(true)),
    ]
}

#[tokio::test]
async fn apply_equals_apply_collect_for_every_filter() {
    let lines = corpus();
    for filter in standard_filters() {
        for query in ["ap", "foo -bar", "tqb", "-qux", "a c", ""] {
            let scope = Scope::root().child(query);
            let collected = filter.apply_collect(&scope, &lines).await.unwrap();
            let channeled = apply_via_channel(filter.as_ref(), &scope, &lines).await;
            assert_eq!(
                flatten(&collected),
                flatten(&channeled),
                "filter {} query {query:?}",
                filter.name()
            );
        }
    }
}

#[tokio::test]
async fn chunked_apply_concatenates_for_parallel_filters() {
    let gen = IdGen::fixed(0);
    let lines: Vec<Matched> = (0..2_500)
        .map(|i| {
            Matched::passthrough(Arc::new(Line::new(
                gen.next(),
                format!("entry {i} of {}", i % 13),
                false,
                false,
            )))
        })
        .collect();

    for filter in standard_filters() {
        if !filter.supports_parallel() {
            continue;
        }
        let scope = Scope::root().child("entry 1");
        let whole = filter.apply_collect(&scope, &lines).await.unwrap();
        for chunk_size in [1, 7, 100, 999, 2_500] {
            let mut chunked = Vec::new();
            for chunk in lines.chunks(chunk_size) {
                chunked.extend(filter.apply_collect(&scope, chunk).await.unwrap());
            }
            assert_eq!(
                flatten(&whole),
                flatten(&chunked),
                "filter {} chunk size {chunk_size}",
                filter.name()
            );
        }
    }
}

#[tokio::test]
async fn longest_sort_fuzzy_declares_itself_sequential() {
    assert!(!FuzzyFilter::new(true).supports_parallel());
    assert!(FuzzyFilter::new(false).supports_parallel());
    assert!(RegexpFilter::ignore_case().supports_parallel());
}

#[tokio::test]
async fn standard_set_contains_documented_strategies() {
    let set = FilterSet::standard(false);
    let names = set.names();
    for expected in [
        "IgnoreCase",
        "CaseSensitive",
        "SmartCase",
        "Regexp",
        "IRegexp",
        "Fuzzy",
    ] {
        assert!(names.iter().any(|n| n == expected), "missing {expected}");
    }
}

#[tokio::test]
async fn cancellation_error_propagates_through_collect() {
    let lines = corpus();
    let scope = Scope::root().child("ap");
    scope.cancel();
    let filter = RegexpFilter::ignore_case();
    assert!(filter.apply_collect(&scope, &lines).await.is_err());
}
