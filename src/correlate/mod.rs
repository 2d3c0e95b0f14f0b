//! Correlator
//!
//! Turns one file's extraction outputs into three range lists: action body
//! ranges, icon markers and verified call ranges. Candidates go through a
//! fixed pipeline:
//!
//! ```text
//! Extracted ─┬─ entry point ─────────────────────────────► Accepted
//!            ├─ same-file action ────────────────────────► Accepted
//!            ├─ unknown name ────────────────────────────► Rejected
//!            └─ admitted ─► oracle ─┬─ confirmed ─────────► Accepted
//!                                   └─ no/timeout/abort ──► Rejected
//! ```
//!
//! With `RuntimeControls` the oracle phase is bounded by a concurrency cap,
//! a per-resolution timeout, a per-pass budget and a cancellation token.
//! Without them every surviving candidate is resolved, unbounded.

pub mod controls;
pub mod oracle;
pub mod pool;
pub mod session;

pub use controls::{ResolutionBounds, RuntimeControls};
pub use oracle::{
    oracle_error, oracle_fn, ChasingOracle, FnOracle, Location, NavigationProvider, Relation,
    ResolutionOracle, DEFAULT_MAX_HOPS,
};
pub use pool::{ResolutionJob, ResolutionOutcome, ResolutionPool};
pub use session::{PassTicket, PassTracker};

use crate::extract::{ActionDefinitionSpan, CallCandidate, FileExtraction, NameSets, SourceDialect};
use crate::range::{LineIndex, OffsetRange};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::Instant;

/// Output of one correlation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CorrelationResult {
    /// Action bodies widened to the full lines they touch
    pub body_ranges: Vec<OffsetRange>,
    /// Zero-width markers at the end of each body's opening line
    pub icon_ranges: Vec<OffsetRange>,
    /// Candidates accepted as action invocations, in admission order
    pub call_ranges: Vec<OffsetRange>,
    pub stats: PassStats,
}

/// Counters describing what one pass did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassStats {
    pub candidates: usize,
    /// Entry-point attributes accepted without resolution
    pub unconditional: usize,
    /// Calls to same-file actions accepted without resolution
    pub short_circuited: usize,
    /// Dropped by the name filter
    pub filtered: usize,
    /// Handed to the oracle
    pub admitted: usize,
    /// Would have been resolved but the budget ran out
    pub skipped: usize,
    pub confirmed: usize,
    pub rejected: usize,
    pub timed_out: usize,
    pub aborted: usize,
    pub failed: usize,
    pub budget_exhausted: bool,
    pub cancelled: bool,
}

impl PassStats {
    fn record(&mut self, outcome: ResolutionOutcome) {
        match outcome {
            ResolutionOutcome::Confirmed => self.confirmed += 1,
            ResolutionOutcome::Rejected => self.rejected += 1,
            ResolutionOutcome::TimedOut => self.timed_out += 1,
            ResolutionOutcome::Aborted => self.aborted += 1,
            ResolutionOutcome::Failed => self.failed += 1,
        }
    }
}

/// What step 3 decided for a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Unconditional,
    ShortCircuit,
    Filtered,
    Resolve,
}

/// Extract and correlate one file.
///
/// `file_identifier` picks the grammar (by extension); `document_identifier`
/// is what the oracle receives.
pub async fn correlate(
    source: &str,
    file_identifier: &str,
    document_identifier: &str,
    oracle: Arc<dyn ResolutionOracle>,
    controls: Option<RuntimeControls>,
) -> CorrelationResult {
    let extraction = FileExtraction::from_source(source, SourceDialect::from_path(file_identifier));
    correlate_extracted(source, &extraction, document_identifier, oracle, controls).await
}

/// Correlate already extracted outputs of `source`
pub async fn correlate_extracted(
    source: &str,
    extraction: &FileExtraction,
    document_identifier: &str,
    oracle: Arc<dyn ResolutionOracle>,
    controls: Option<RuntimeControls>,
) -> CorrelationResult {
    let started = Instant::now();
    let (body_ranges, icon_ranges) = definition_ranges(source, &extraction.definitions);
    let local_actions: HashSet<&str> = extraction
        .definitions
        .iter()
        .filter_map(|d| d.name.as_local_name())
        .collect();

    let visible = controls.as_ref().and_then(|c| c.visible_range);
    let ordered = order_candidates(&extraction.candidates, visible);
    let bounds = controls.as_ref().map(|c| c.bounds);
    let mut pool = match &controls {
        Some(c) => ResolutionPool::bounded(&c.bounds, c.cancel.clone()),
        None => ResolutionPool::unbounded(),
    };
    let document: Arc<str> = Arc::from(document_identifier);

    let mut stats = PassStats {
        candidates: ordered.len(),
        ..PassStats::default()
    };
    let mut accepted = vec![false; ordered.len()];

    for (index, candidate) in ordered.iter().enumerate() {
        if controls.as_ref().is_some_and(RuntimeControls::is_cancelled) {
            stats.cancelled = true;
            break;
        }

        match admission(candidate, &local_actions, &extraction.names) {
            Admission::Unconditional => {
                stats.unconditional += 1;
                accepted[index] = true;
                continue;
            }
            Admission::ShortCircuit => {
                stats.short_circuited += 1;
                accepted[index] = true;
                continue;
            }
            Admission::Filtered => {
                stats.filtered += 1;
                continue;
            }
            Admission::Resolve => {}
        }

        if stats.budget_exhausted || bounds.is_some_and(|b| b.exhausted(started.elapsed(), stats.admitted)) {
            stats.budget_exhausted = true;
            stats.skipped += 1;
            continue;
        }

        let Some(slot) = pool.acquire().await else {
            stats.cancelled = true;
            break;
        };
        // Waiting for the slot may have used up the time budget
        if bounds.is_some_and(|b| b.exhausted(started.elapsed(), stats.admitted)) {
            drop(slot);
            stats.budget_exhausted = true;
            stats.skipped += 1;
            continue;
        }

        let job = ResolutionJob {
            key: index,
            document: document.clone(),
            offset: candidate.probe_offset(),
        };
        pool.spawn(slot, job, oracle.clone());
        stats.admitted += 1;

        if bounds.is_some_and(|b| b.exhausted(started.elapsed(), stats.admitted)) {
            stats.budget_exhausted = true;
        }
    }

    let outcomes = if stats.cancelled {
        pool.abandon()
    } else {
        pool.drain().await
    };
    for (index, outcome) in outcomes {
        stats.record(outcome);
        if outcome.is_accepted() {
            accepted[index] = true;
        }
    }

    let mut seen = HashSet::new();
    let call_ranges = ordered
        .iter()
        .zip(&accepted)
        .filter(|(_, accepted)| **accepted)
        .map(|(candidate, _)| candidate.range)
        .filter(|range| seen.insert(*range))
        .collect();

    tracing::debug!(
        "Correlated {}: {} candidates, {} admitted, {} confirmed in {:?}",
        document_identifier,
        stats.candidates,
        stats.admitted,
        stats.confirmed,
        started.elapsed()
    );

    CorrelationResult {
        body_ranges,
        icon_ranges,
        call_ranges,
        stats,
    }
}

fn admission(candidate: &CallCandidate, local_actions: &HashSet<&str>, names: &NameSets) -> Admission {
    if candidate.is_entry_point() {
        return Admission::Unconditional;
    }
    let Some(name) = candidate.callee_name() else {
        return Admission::Resolve;
    };
    if local_actions.contains(name) {
        return Admission::ShortCircuit;
    }
    let namespaced = candidate
        .qualifier_name()
        .is_some_and(|q| names.namespace_imports.contains(q));
    if names.knows_callee(name) || namespaced {
        Admission::Resolve
    } else {
        Admission::Filtered
    }
}

/// Body ranges widened to whole lines, plus an icon marker at the end of the
/// line holding each opening brace. Both lists are deduplicated.
pub fn definition_ranges(source: &str, definitions: &[ActionDefinitionSpan]) -> (Vec<OffsetRange>, Vec<OffsetRange>) {
    let lines = LineIndex::new(source);
    let mut bodies = Vec::new();
    let mut icons = Vec::new();

    for definition in definitions {
        let body = definition.body;
        let widened = OffsetRange::new(lines.line_start(body.start), lines.line_end(body.end));
        if !bodies.contains(&widened) {
            bodies.push(widened);
        }
        if source.get(body.start..).is_some_and(|rest| rest.starts_with('{')) {
            let icon = OffsetRange::point(lines.line_end(body.start));
            if !icons.contains(&icon) {
                icons.push(icon);
            }
        }
    }

    (bodies, icons)
}

/// Candidates overlapping `visible` first, each partition in extraction order
pub fn order_candidates(candidates: &[CallCandidate], visible: Option<OffsetRange>) -> Vec<CallCandidate> {
    let Some(visible) = visible else {
        return candidates.to_vec();
    };
    let (mut inside, outside): (Vec<_>, Vec<_>) = candidates
        .iter()
        .cloned()
        .partition(|c| c.range.overlaps(&visible));
    inside.extend(outside);
    inside
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    /// Oracle answering a fixed value and counting calls
    struct CountingOracle {
        answer: bool,
        calls: AtomicUsize,
    }

    impl CountingOracle {
        fn new(answer: bool) -> Arc<Self> {
            Arc::new(Self {
                answer,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl ResolutionOracle for CountingOracle {
        async fn resolve(&self, _document: &str, _offset: usize) -> crate::Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.answer)
        }
    }

    async fn run(source: &str, oracle: Arc<dyn ResolutionOracle>, controls: Option<RuntimeControls>) -> CorrelationResult {
        correlate(source, "page.tsx", "file:///page.tsx", oracle, controls).await
    }

    fn texts<'a>(source: &'a str, ranges: &[OffsetRange]) -> Vec<&'a str> {
        ranges.iter().map(|r| &source[r.start..r.end]).collect()
    }

    /// `count` imported calls `a0()`, `a1()`, ...
    fn many_imported_calls(count: usize) -> String {
        let names: Vec<String> = (0..count).map(|i| format!("a{}", i)).collect();
        let mut source = format!("import {{ {} }} from './actions';\n", names.join(", "));
        for name in &names {
            source.push_str(&format!("{}();\n", name));
        }
        source
    }

    #[tokio::test]
    async fn test_local_action_called_and_bound_to_form() {
        let source = r#"async function save() {
  "use server";
  await db.write();
}

export function Page() {
  save();
  return <form action={save}></form>;
}
"#;
        let oracle = CountingOracle::new(true);
        let result = run(source, oracle.clone(), None).await;

        assert_eq!(result.body_ranges.len(), 1);
        assert_eq!(result.icon_ranges.len(), 1);
        assert_eq!(texts(source, &result.call_ranges), vec!["save()", "save"]);
        assert_eq!(oracle.calls(), 0);

        let body = result.body_ranges[0];
        assert_eq!(body.start, 0);
        assert_eq!(&source[body.end - 1..=body.end], "}\n");
        let icon = result.icon_ranges[0];
        assert!(icon.is_empty());
        assert_eq!(icon.start, source.find('\n').unwrap());
    }

    #[tokio::test]
    async fn test_element_access_is_never_a_call() {
        let result = run("obj['run']();", CountingOracle::new(true), None).await;
        assert!(result.call_ranges.is_empty());
    }

    #[tokio::test]
    async fn test_namespace_qualified_calls() {
        let source = "import * as actions from './a';\nactions.submit();\n";
        let oracle = CountingOracle::new(true);
        let result = run(source, oracle.clone(), None).await;
        assert_eq!(texts(source, &result.call_ranges), vec!["submit()"]);
        assert_eq!(oracle.calls(), 1);

        let nested = "import * as actions from './a';\nactions.group.submit();\n";
        let result = run(nested, CountingOracle::new(true), None).await;
        assert!(result.call_ranges.is_empty());
    }

    #[tokio::test]
    async fn test_type_only_import_is_filtered() {
        let source = "import type { foo } from './types';\nfoo();\n";
        let oracle = CountingOracle::new(true);
        let result = run(source, oracle.clone(), None).await;
        assert!(result.call_ranges.is_empty());
        assert_eq!(oracle.calls(), 0);
        assert_eq!(result.stats.filtered, 1);
    }

    #[tokio::test]
    async fn test_globals_are_filtered() {
        let oracle = CountingOracle::new(true);
        let result = run("alert('x'); console.log('y');", oracle.clone(), None).await;
        assert!(result.call_ranges.is_empty());
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test]
    async fn test_oracle_decides_imported_calls() {
        let source = "import { save } from './actions';\nsave();\n";
        let result = run(source, CountingOracle::new(false), None).await;
        assert!(result.call_ranges.is_empty());
        assert_eq!(result.stats.rejected, 1);

        let result = run(source, CountingOracle::new(true), None).await;
        assert_eq!(texts(source, &result.call_ranges), vec!["save()"]);
    }

    #[tokio::test]
    async fn test_probe_lands_inside_callee_name() {
        let source = "import { submitForm } from './actions';\nsubmitForm();\n";
        let probes = Arc::new(std::sync::Mutex::new(Vec::new()));
        let oracle = {
            let probes = probes.clone();
            oracle_fn(move |document, offset| {
                probes.lock().unwrap().push((document, offset));
                async { Ok(true) }
            })
        };
        run(source, Arc::new(oracle), None).await;

        let call = source.rfind("submitForm").unwrap();
        assert_eq!(
            probes.lock().unwrap().clone(),
            vec![("file:///page.tsx".to_string(), call + 5)]
        );
    }

    #[tokio::test]
    async fn test_repeated_passes_are_identical() {
        let source = r#"import { save } from './actions';
export function Form() {
  startTransition(() => { save(); });
  return <button formAction={save} />;
}
"#;
        let first = run(source, CountingOracle::new(true), None).await;
        let second = run(source, CountingOracle::new(true), None).await;
        assert_eq!(first, second);

        let unique: HashSet<_> = first.call_ranges.iter().collect();
        assert_eq!(unique.len(), first.call_ranges.len());
        // The wrapped call and the direct call share a span
        assert_eq!(texts(source, &first.call_ranges), vec!["save()", "save"]);
    }

    #[tokio::test]
    async fn test_budget_caps_oracle_calls() {
        let source = many_imported_calls(10);
        let oracle = CountingOracle::new(true);
        let bounds = ResolutionBounds { max_resolutions: 3, ..ResolutionBounds::default() };
        let controls = RuntimeControls::new().with_bounds(bounds);
        let result = run(&source, oracle.clone(), Some(controls)).await;

        assert_eq!(oracle.calls(), 3);
        assert_eq!(result.call_ranges.len(), 3);
        assert!(result.stats.budget_exhausted);
        assert_eq!(result.stats.skipped, 7);
    }

    #[tokio::test]
    async fn test_time_budget_stops_admission() {
        let calls = Arc::new(AtomicUsize::new(0));
        let oracle = {
            let calls = calls.clone();
            Arc::new(oracle_fn(move |_document, _offset| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(true)
                }
            }))
        };
        let source = many_imported_calls(10);
        let bounds = ResolutionBounds {
            max_concurrent: 1,
            per_pass_budget_ms: 120,
            resolve_timeout_ms: 5_000,
            max_resolutions: 100,
        };
        let controls = RuntimeControls::new().with_bounds(bounds);
        let result = run(&source, oracle, Some(controls)).await;

        let stats = result.stats;
        assert!(stats.budget_exhausted);
        assert!(stats.admitted < stats.candidates);
        assert!(stats.skipped > 0);
        assert_eq!(stats.admitted + stats.skipped, 10);
        assert_eq!(calls.load(Ordering::SeqCst), stats.admitted);
        assert_eq!(result.call_ranges.len(), stats.admitted);
    }

    #[tokio::test]
    async fn test_entry_points_survive_budget_exhaustion() {
        let source = r#"import { a, b } from './actions';
a();
b();
const form = <form action={b}></form>;
"#;
        let bounds = ResolutionBounds { max_resolutions: 1, ..ResolutionBounds::default() };
        let controls = RuntimeControls::new().with_bounds(bounds);
        let result = run(source, CountingOracle::new(true), Some(controls)).await;
        assert_eq!(texts(source, &result.call_ranges), vec!["a()", "b"]);
    }

    #[tokio::test]
    async fn test_concurrency_cap_is_respected() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let oracle = {
            let (active, peak) = (active.clone(), peak.clone());
            oracle_fn(move |_document, _offset| {
                let (active, peak) = (active.clone(), peak.clone());
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(true)
                }
            })
        };
        let bounds = ResolutionBounds {
            max_concurrent: 2,
            per_pass_budget_ms: 60_000,
            ..ResolutionBounds::default()
        };
        let source = many_imported_calls(8);
        let result = run(&source, Arc::new(oracle), Some(RuntimeControls::new().with_bounds(bounds))).await;

        assert_eq!(result.call_ranges.len(), 8);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let source = r#"import { a } from './actions';
a();
const form = <form action={a}></form>;
"#;
        let token = CancellationToken::new();
        token.cancel();
        let oracle = CountingOracle::new(true);
        let controls = RuntimeControls::new().with_cancellation(token);
        let result = run(source, oracle.clone(), Some(controls)).await;

        assert!(result.call_ranges.is_empty());
        assert_eq!(oracle.calls(), 0);
        assert!(result.stats.cancelled);
    }

    #[tokio::test]
    async fn test_cancel_mid_pass_stops_admission() {
        let token = CancellationToken::new();
        let oracle = {
            let token = token.clone();
            oracle_fn(move |_document, _offset| {
                let token = token.clone();
                async move {
                    token.cancel();
                    Ok(true)
                }
            })
        };
        let bounds = ResolutionBounds { max_concurrent: 1, ..ResolutionBounds::default() };
        let controls = RuntimeControls::new().with_bounds(bounds).with_cancellation(token);
        let source = many_imported_calls(5);
        let result = run(&source, Arc::new(oracle), Some(controls)).await;

        assert!(result.stats.cancelled);
        assert!(result.stats.admitted < 5);
    }

    #[tokio::test]
    async fn test_timeout_is_negative() {
        let oracle = oracle_fn(|_document, _offset| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(true)
        });
        let bounds = ResolutionBounds { resolve_timeout_ms: 20, ..ResolutionBounds::default() };
        let source = "import { save } from './actions';\nsave();\n";
        let result = run(source, Arc::new(oracle), Some(RuntimeControls::new().with_bounds(bounds))).await;

        assert!(result.call_ranges.is_empty());
        assert_eq!(result.stats.timed_out, 1);
    }

    #[tokio::test]
    async fn test_failing_resolution_is_isolated() {
        let source = "import { good, bad } from './actions';\ngood();\nbad();\n";
        let bad_at = source.rfind("bad").unwrap();
        let oracle = oracle_fn(move |_document, offset| async move {
            if (bad_at..bad_at + 3).contains(&offset) {
                Err(oracle_error("host unavailable"))
            } else {
                Ok(true)
            }
        });
        let result = run(source, Arc::new(oracle), None).await;

        assert_eq!(texts(source, &result.call_ranges), vec!["good()"]);
        assert_eq!(result.stats.failed, 1);
    }

    #[tokio::test]
    async fn test_visible_candidates_resolve_first() {
        let source = many_imported_calls(4);
        let last = source.rfind("a3()").unwrap();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let oracle = {
            let order = order.clone();
            oracle_fn(move |_document, offset| {
                order.lock().unwrap().push(offset);
                async { Ok(true) }
            })
        };
        let bounds = ResolutionBounds { max_concurrent: 1, ..ResolutionBounds::default() };
        let controls = RuntimeControls::new()
            .with_bounds(bounds)
            .with_visible_range(OffsetRange::new(last, last + 4));
        let result = run(&source, Arc::new(oracle), Some(controls)).await;

        assert_eq!(order.lock().unwrap()[0], last + 1);
        assert_eq!(texts(&source, &result.call_ranges)[0], "a3()");
    }

    #[test]
    fn test_order_without_hint_is_extraction_order() {
        let candidates = crate::extract::extract_call_sites("a(); b(); c();");
        assert_eq!(order_candidates(&candidates, None), candidates);
    }
}
