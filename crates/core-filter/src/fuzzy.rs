//! Fuzzy matching: query runes must appear in order, not necessarily
//! adjacent. One highlight span is produced per query rune.
//!
//! Default mode tries only the first occurrence of the leading query rune.
//! Longest-match mode tries every occurrence, keeps the best walk per the
//! comparator below, and additionally orders the whole result set with it,
//! which is why that mode cannot be chunk-parallelised:
//! 1. longer longest-contiguous-match wins,
//! 2. then smaller earliest match start,
//! 3. then shorter display string.

use async_trait::async_trait;
use core_model::{Matched, Span};
use core_pipeline::Scope;

use crate::terms::{excluded, QueryTerms};
use crate::{Filter, FilterError, Sink, CANCEL_POLL_INTERVAL};

pub struct FuzzyFilter {
    longest_sort: bool,
}

#[derive(Debug)]
struct Walk {
    spans: Vec<Span>,
    contiguous: usize,
    start: usize,
}

impl FuzzyFilter {
    pub fn new(longest_sort: bool) -> Self {
        Self { longest_sort }
    }

    fn best_walk(display: &str, runes: &[char], sensitive: bool, all_starts: bool) -> Option<Walk> {
        let first = *runes.first()?;
        let mut best: Option<Walk> = None;
        for (offset, ch) in display.char_indices() {
            if !rune_eq(ch, first, sensitive) {
                continue;
            }
            if let Some(walk) = walk_from(display, offset, runes, sensitive) {
                best = match best {
                    Some(prev) if walk_order(&prev, &walk) != std::cmp::Ordering::Greater => {
                        Some(prev)
                    }
                    _ => Some(walk),
                };
            }
            if !all_starts {
                break;
            }
        }
        best
    }
}

fn rune_eq(a: char, b: char, sensitive: bool) -> bool {
    if sensitive {
        a == b
    } else {
        a.to_lowercase().eq(b.to_lowercase())
    }
}

/// Greedily match every query rune in order, starting at `start` (which is
/// known to hold the first rune). Each subsequent rune matches at or after
/// the previous match end.
fn walk_from(display: &str, start: usize, runes: &[char], sensitive: bool) -> Option<Walk> {
    let mut spans = Vec::with_capacity(runes.len());
    let mut pos = start;
    for &rune in runes {
        let (rel, ch) = display[pos..]
            .char_indices()
            .find(|&(_, c)| rune_eq(c, rune, sensitive))?;
        let begin = pos + rel;
        let end = begin + ch.len_utf8();
        spans.push(Span::new(begin, end));
        pos = end;
    }
    let contiguous = longest_contiguous(&spans);
    Some(Walk {
        spans,
        contiguous,
        start,
    })
}

/// Longest chain of spans where each start equals the previous end.
fn longest_contiguous(spans: &[Span]) -> usize {
    let mut best = 0;
    let mut run = 0;
    let mut prev_end = None;
    for span in spans {
        run = if prev_end == Some(span.start) {
            run + span.len()
        } else {
            span.len()
        };
        best = best.max(run);
        prev_end = Some(span.end);
    }
    best
}

fn walk_order(a: &Walk, b: &Walk) -> std::cmp::Ordering {
    b.contiguous
        .cmp(&a.contiguous)
        .then(a.start.cmp(&b.start))
}

#[async_trait]
impl Filter for FuzzyFilter {
    fn name(&self) -> &str {
        "Fuzzy"
    }

    fn supports_parallel(&self) -> bool {
        // Longest-match sorting imposes a global order on the result set.
        !self.longest_sort
    }

    async fn apply(
        &self,
        scope: &Scope,
        lines: &[Matched],
        sink: &mut dyn Sink,
    ) -> Result<(), FilterError> {
        let terms = QueryTerms::parse(scope.query());
        let negatives = terms.compile_negatives()?;
        let query: String = terms.positives.concat();
        let runes: Vec<char> = query.chars().collect();
        let sensitive = query.chars().any(|c| c.is_uppercase());

        if runes.is_empty() {
            for (n, item) in lines.iter().enumerate() {
                if n % CANCEL_POLL_INTERVAL == 0 {
                    scope.ensure_alive()?;
                }
                if terms.is_empty() {
                    sink.push(item.clone()).await?;
                } else if !excluded(item.display(), &negatives) {
                    sink.push(Matched::passthrough(item.line().clone())).await?;
                }
            }
            return Ok(());
        }

        let mut sorted: Vec<(Walk, usize, Matched)> = Vec::new();
        for (n, item) in lines.iter().enumerate() {
            if n % CANCEL_POLL_INTERVAL == 0 {
                scope.ensure_alive()?;
            }
            let display = item.display();
            if excluded(display, &negatives) {
                continue;
            }
            let Some(walk) = Self::best_walk(display, &runes, sensitive, self.longest_sort)
            else {
                continue;
            };
            if self.longest_sort {
                sorted.push((walk, display.chars().count(), item.clone()));
            } else {
                sink.push(Matched::with_spans(item.line().clone(), walk.spans))
                    .await?;
            }
        }

        if self.longest_sort {
            sorted.sort_by(|(wa, la, _), (wb, lb, _)| walk_order(wa, wb).then(la.cmp(lb)));
            for (walk, _, item) in sorted {
                scope.ensure_alive()?;
                sink.push(Matched::with_spans(item.line().clone(), walk.spans))
                    .await?;
            }
        }
        Ok(())
    }
}
