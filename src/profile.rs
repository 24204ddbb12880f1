//! Opt-in evaluation profiling.
//!
//! Counters are only allocated when `DIRFILTER_PROFILE` is set in the
//! environment; otherwise every hook is a cheap early return.
//!
//! Times are exclusive: a logical evaluator is charged only for its own
//! work, not for the children it calls, so the `*_ns` fields can be summed.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

/// A snapshot of evaluation profiling metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvalProfileSnapshot {
    /// Nanoseconds spent in leaf evaluators.
    pub leaf_ns: u64,
    /// Number of leaf evaluations.
    pub leaf_count: u64,
    /// Nanoseconds spent in And/Or/Not evaluators, excluding their children.
    pub logical_ns: u64,
    /// Number of logical evaluations.
    pub logical_count: u64,
    /// Nanoseconds spent in scope evaluators.
    pub scope_ns: u64,
    /// Number of scope evaluations.
    pub scope_count: u64,
    /// Entries fetched from the store to resolve candidates.
    pub fetch_count: u64,
    /// Candidates whose entry had vanished when fetched.
    pub vanished_count: u64,
}

#[derive(Default)]
struct EvalProfileCounters {
    leaf_ns: AtomicU64,
    leaf_count: AtomicU64,
    logical_ns: AtomicU64,
    logical_count: AtomicU64,
    scope_ns: AtomicU64,
    scope_count: AtomicU64,
    fetch_count: AtomicU64,
    vanished_count: AtomicU64,
}

static PROFILE_ENABLED: OnceLock<bool> = OnceLock::new();
static PROFILE_COUNTERS: OnceLock<EvalProfileCounters> = OnceLock::new();

fn profiling_enabled() -> bool {
    *PROFILE_ENABLED.get_or_init(|| std::env::var_os("DIRFILTER_PROFILE").is_some())
}

fn counters() -> Option<&'static EvalProfileCounters> {
    profiling_enabled().then(|| PROFILE_COUNTERS.get_or_init(EvalProfileCounters::default))
}

thread_local! {
    // time recorded by spans nested inside the innermost open span
    static NESTED_NS: Cell<u64> = const { Cell::new(0) };
}

/// One open profiling span on the current thread.
pub(crate) struct ProfileTimer {
    start: Instant,
    outer_nested_ns: u64,
}

impl ProfileTimer {
    fn start() -> Self {
        Self {
            outer_nested_ns: NESTED_NS.with(|nested| nested.replace(0)),
            start: Instant::now(),
        }
    }

    /// Closes the span and returns its self time in nanoseconds.
    fn finish(self) -> u64 {
        let total = self.start.elapsed().as_nanos().min(u64::MAX as u128) as u64;
        let nested = NESTED_NS.with(|nested| {
            nested.replace(self.outer_nested_ns.saturating_add(total))
        });
        total.saturating_sub(nested)
    }
}

pub(crate) fn profile_timer() -> Option<ProfileTimer> {
    profiling_enabled().then(ProfileTimer::start)
}

pub(crate) enum EvalProfileKind {
    Leaf,
    Logical,
    Scope,
}

pub(crate) fn record_profile_timer(kind: EvalProfileKind, timer: Option<ProfileTimer>) {
    let Some(timer) = timer else {
        return;
    };
    let nanos = timer.finish();
    let Some(counters) = counters() else {
        return;
    };
    let (ns, count) = match kind {
        EvalProfileKind::Leaf => (&counters.leaf_ns, &counters.leaf_count),
        EvalProfileKind::Logical => (&counters.logical_ns, &counters.logical_count),
        EvalProfileKind::Scope => (&counters.scope_ns, &counters.scope_count),
    };
    ns.fetch_add(nanos, Ordering::Relaxed);
    count.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_fetch(found: bool) {
    let Some(counters) = counters() else {
        return;
    };
    counters.fetch_count.fetch_add(1, Ordering::Relaxed);
    if !found {
        counters.vanished_count.fetch_add(1, Ordering::Relaxed);
    }
}

/// Retrieves the current evaluation metrics.
///
/// Returns `None` unless `DIRFILTER_PROFILE` is set. With `reset` the
/// counters are zeroed as they are read.
///
/// ```no_run
/// use dirfilter::profile::profile_snapshot;
///
/// if let Some(snapshot) = profile_snapshot(true) {
///     println!("vanished candidates: {}", snapshot.vanished_count);
/// }
/// ```
pub fn profile_snapshot(reset: bool) -> Option<EvalProfileSnapshot> {
    let counters = counters()?;
    let load = |counter: &AtomicU64| {
        if reset {
            counter.swap(0, Ordering::Relaxed)
        } else {
            counter.load(Ordering::Relaxed)
        }
    };
    Some(EvalProfileSnapshot {
        leaf_ns: load(&counters.leaf_ns),
        leaf_count: load(&counters.leaf_count),
        logical_ns: load(&counters.logical_ns),
        logical_count: load(&counters.logical_count),
        scope_ns: load(&counters.scope_ns),
        scope_count: load(&counters.scope_count),
        fetch_count: load(&counters.fetch_count),
        vanished_count: load(&counters.vanished_count),
    })
}
