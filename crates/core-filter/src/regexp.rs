//! The literal/regex filter family and its compiled-regex cache.
//!
//! Five strategies share one implementation: CaseSensitive, IgnoreCase and
//! SmartCase escape every positive term (literal matching), Regexp and
//! IRegexp pass terms through as written. Positive terms are AND-combined;
//! every term must match somewhere in the display string. Match ranges
//! from all terms are merged into the highlight span list.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use core_model::{Matched, Span};
use core_pipeline::Scope;
use regex::Regex;
use tracing::trace;

use crate::terms::{excluded, QueryTerms};
use crate::{Filter, FilterError, Sink, CANCEL_POLL_INTERVAL};

/// Entries untouched for this long are purged on the next access.
const CACHE_TTL: Duration = Duration::from_secs(60);
/// Hard cap. On overflow stale entries go first; if the cache is still
/// full it is cleared entirely.
const CACHE_MAX_ENTRIES: usize = 100;

#[derive(Debug)]
pub struct CompiledQuery {
    pub positives: Vec<Regex>,
    pub negatives: Vec<Regex>,
}

struct CacheSlot {
    compiled: Arc<CompiledQuery>,
    last_used: Instant,
}

/// Compiled-regex cache keyed by the full original query string. Each
/// filter instance owns one, since the same query compiles differently
/// under different strategies.
#[derive(Default)]
pub struct RegexCache {
    slots: Mutex<HashMap<String, CacheSlot>>,
}

impl RegexCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up `query`, compiling with `compile` on a miss. Consecutive
    /// lookups of the same query within the TTL return the identical
    /// compiled object.
    pub fn get_or_compile<F>(&self, query: &str, compile: F) -> Result<Arc<CompiledQuery>, FilterError>
    where
        F: FnOnce() -> Result<CompiledQuery, FilterError>,
    {
        let mut slots = match self.slots.lock() {
            Ok(slots) => slots,
            Err(_) => return compile().map(Arc::new),
        };
        let now = Instant::now();
        slots.retain(|_, slot| now.duration_since(slot.last_used) < CACHE_TTL);

        if let Some(slot) = slots.get_mut(query) {
            slot.last_used = now;
            return Ok(slot.compiled.clone());
        }

        let compiled = Arc::new(compile()?);
        if slots.len() >= CACHE_MAX_ENTRIES {
            trace!(target: "filter.cache", entries = slots.len(), "cap reached; clearing");
            slots.clear();
        }
        slots.insert(
            query.to_string(),
            CacheSlot {
                compiled: compiled.clone(),
                last_used: now,
            },
        );
        Ok(compiled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaseRule {
    Sensitive,
    Insensitive,
    /// Insensitive iff the query contains no uppercase rune.
    Smart,
}

pub struct RegexpFilter {
    name: &'static str,
    quote_meta: bool,
    case: CaseRule,
    cache: RegexCache,
}

impl RegexpFilter {
    pub fn case_sensitive() -> Self {
        Self::build("CaseSensitive", true, CaseRule::Sensitive)
    }

    pub fn ignore_case() -> Self {
        Self::build("IgnoreCase", true, CaseRule::Insensitive)
    }

    pub fn smart_case() -> Self {
        Self::build("SmartCase", true, CaseRule::Smart)
    }

    pub fn regexp() -> Self {
        Self::build("Regexp", false, CaseRule::Sensitive)
    }

    pub fn iregexp() -> Self {
        Self::build("IRegexp", false, CaseRule::Insensitive)
    }

    fn build(name: &'static str, quote_meta: bool, case: CaseRule) -> Self {
        Self {
            name,
            quote_meta,
            case,
            cache: RegexCache::new(),
        }
    }

    fn insensitive(&self, query: &str) -> bool {
        match self.case {
            CaseRule::Sensitive => false,
            CaseRule::Insensitive => true,
            CaseRule::Smart => !query.chars().any(|c| c.is_uppercase()),
        }
    }

    fn compile(&self, query: &str) -> Result<CompiledQuery, FilterError> {
        let terms = QueryTerms::parse(query);
        let flag = if self.insensitive(query) { "(?i)" } else { "" };
        let positives = terms
            .positives
            .iter()
            .map(|term| {
                let pattern = if self.quote_meta {
                    regex::escape(term)
                } else {
                    term.clone()
                };
                Regex::new(&format!("{flag}{pattern}")).map_err(FilterError::from)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CompiledQuery {
            positives,
            negatives: terms.compile_negatives()?,
        })
    }

    fn match_line(compiled: &CompiledQuery, item: &Matched) -> Option<Matched> {
        let display = item.display();
        if excluded(display, &compiled.negatives) {
            return None;
        }
        if compiled.positives.is_empty() {
            // Negative-only query: retained without highlight.
            return Some(Matched::passthrough(item.line().clone()));
        }
        let mut spans: Vec<Span> = Vec::new();
        for re in &compiled.positives {
            let before = spans.len();
            for m in re.find_iter(display) {
                spans.push(Span::new(m.start(), m.end()));
            }
            if spans.len() == before {
                return None;
            }
        }
        Some(Matched::with_spans(item.line().clone(), spans))
    }
}

#[async_trait]
impl Filter for RegexpFilter {
    fn name(&self) -> &str {
        self.name
    }

    async fn apply(
        &self,
        scope: &Scope,
        lines: &[Matched],
        sink: &mut dyn Sink,
    ) -> Result<(), FilterError> {
        let query = scope.query().to_string();
        if QueryTerms::parse(&query).is_empty() {
            for (n, item) in lines.iter().enumerate() {
                if n % CANCEL_POLL_INTERVAL == 0 {
                    scope.ensure_alive()?;
                }
                sink.push(item.clone()).await?;
            }
            return Ok(());
        }
        let compiled = self.cache.get_or_compile(&query, || self.compile(&query))?;
        for (n, item) in lines.iter().enumerate() {
            if n % CANCEL_POLL_INTERVAL == 0 {
                scope.ensure_alive()?;
            }
            if let Some(matched) = Self::match_line(&compiled, item) {
                sink.push(matched).await?;
            }
        }
        Ok(())
    }
}
