//! Cross-database diffing with checksum-based range bisection
//!
//! Segments of the key range are checksummed on both sides with one
//! aggregate query each. Matching segments are never downloaded; differing
//! segments are bisected until they fall under the download threshold, then
//! fetched and matched row by row.

use crate::error::{DiffError, Result};
use crate::hash;
use crate::table::TableHandle;
use crate::{DEFAULT_BISECTION_FACTOR, DEFAULT_BISECTION_THRESHOLD, DEFAULT_MAX_THREADS};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Instant;

/// Inclusive key bounds of one segment; None compares the whole table
type Bounds = Option<(i64, i64)>;

/// Progress callback: (segments finished, segments known)
pub type ProgressFn<'a> = &'a (dyn Fn(u64, u64) + Sync);

/// Tuning knobs for a diff run
#[derive(Debug, Clone)]
pub struct DiffOptions {
    /// Process segments on a worker pool
    pub threaded: bool,
    /// Worker pool size when threaded
    pub max_threadpool_size: usize,
    /// Segments per bisection level
    pub bisection_factor: usize,
    /// Segment size at which rows are downloaded instead of bisected
    pub bisection_threshold: u64,
    /// Stop after emitting this many diff rows
    pub limit: Option<usize>,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            threaded: true,
            max_threadpool_size: DEFAULT_MAX_THREADS,
            bisection_factor: DEFAULT_BISECTION_FACTOR,
            bisection_threshold: DEFAULT_BISECTION_THRESHOLD,
            limit: None,
        }
    }
}

/// Which side of the diff a result row belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiffOp {
    /// Present in the source, absent (or different) in the target
    #[serde(rename = "-")]
    Removed,
    /// Present in the target, absent (or different) in the source
    #[serde(rename = "+")]
    Added,
}

impl DiffOp {
    pub fn sign(&self) -> char {
        match self {
            Self::Removed => '-',
            Self::Added => '+',
        }
    }
}

/// One entry of the result list. An updated row appears twice: the source
/// version with `-`, the target version with `+`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffRow {
    pub op: DiffOp,
    pub values: Vec<Option<String>>,
}

impl fmt::Display for DiffRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<&str> = self
            .values
            .iter()
            .map(|v| v.as_deref().unwrap_or("NULL"))
            .collect();
        write!(f, "{} {}", self.op.sign(), rendered.join(", "))
    }
}

/// Run statistics accumulated across all workers
#[derive(Debug, Default, Clone, Serialize)]
pub struct DiffStats {
    pub segments_compared: u64,
    pub segments_downloaded: u64,
    pub rows_downloaded: u64,
    pub rows_added: u64,
    pub rows_removed: u64,
    pub rows_updated: u64,
    pub elapsed_ms: u64,
}

impl DiffStats {
    fn merge(&mut self, other: &DiffStats) {
        self.segments_compared += other.segments_compared;
        self.segments_downloaded += other.segments_downloaded;
        self.rows_downloaded += other.rows_downloaded;
        self.rows_added += other.rows_added;
        self.rows_removed += other.rows_removed;
        self.rows_updated += other.rows_updated;
    }
}

/// The emitted result list plus run statistics
#[derive(Debug, Serialize)]
pub struct DiffResult {
    pub rows: Vec<DiffRow>,
    pub stats: DiffStats,
}

impl DiffResult {
    pub fn has_differences(&self) -> bool {
        !self.rows.is_empty()
    }
}

/// Compare `source` against `target` and collect every differing row.
///
/// Key order is guaranteed within a downloaded segment; segment completion
/// order is not guaranteed under threading.
pub fn diff_tables(
    source: &TableHandle,
    target: &TableHandle,
    options: &DiffOptions,
    progress: Option<ProgressFn>,
) -> Result<DiffResult> {
    let start = Instant::now();

    if source.compared_columns() != target.compared_columns() {
        return Err(DiffError::schema_mismatch(format!(
            "Compared column sets differ: {:?} vs {:?}",
            source.compared_columns(),
            target.compared_columns()
        )));
    }

    let initial = initial_segments(source, target, options)?;
    if initial.is_empty() {
        log::info!("Both tables are empty, nothing to compare");
        return Ok(DiffResult {
            rows: Vec::new(),
            stats: DiffStats {
                elapsed_ms: start.elapsed().as_millis() as u64,
                ..DiffStats::default()
            },
        });
    }

    let key_integral: Vec<bool> = source
        .key_columns()
        .iter()
        .map(|k| source.column_is_integral(k))
        .collect();
    let workers = if options.threaded {
        options.max_threadpool_size.max(1)
    } else {
        1
    };

    let shared = SharedState {
        queue: WorkQueue::new(initial),
        emitted: AtomicUsize::new(0),
        segments_done: AtomicU64::new(0),
        segments_known: AtomicU64::new(0),
    };
    shared
        .segments_known
        .store(shared.queue.outstanding() as u64, Ordering::Relaxed);

    let outputs: Vec<Result<WorkerOutput>> = if workers == 1 {
        vec![run_worker(source, target, options, &shared, progress, &key_integral)]
    } else {
        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            handles.push((source.try_clone()?, target.try_clone()?));
        }

        std::thread::scope(|scope| {
            let joiners: Vec<_> = handles
                .into_iter()
                .map(|(src, tgt)| {
                    let shared = &shared;
                    let key_integral = &key_integral;
                    scope.spawn(move || {
                        run_worker(&src, &tgt, options, shared, progress, key_integral)
                    })
                })
                .collect();

            joiners
                .into_iter()
                .map(|j| {
                    j.join()
                        .unwrap_or_else(|_| Err(DiffError::query("diff worker panicked")))
                })
                .collect()
        })
    };

    let mut rows = Vec::new();
    let mut stats = DiffStats::default();
    for output in outputs {
        let output = output?;
        rows.extend(output.rows);
        stats.merge(&output.stats);
    }

    if let Some(limit) = options.limit {
        rows.truncate(limit);
    }

    stats.elapsed_ms = start.elapsed().as_millis() as u64;

    log::info!(
        "Diff finished: {} segments compared, {} downloaded, +{} -{} ~{} in {}ms",
        stats.segments_compared,
        stats.segments_downloaded,
        stats.rows_added,
        stats.rows_removed,
        stats.rows_updated,
        stats.elapsed_ms
    );

    Ok(DiffResult { rows, stats })
}

/// Initial segmentation of the union key range
fn initial_segments(
    source: &TableHandle,
    target: &TableHandle,
    options: &DiffOptions,
) -> Result<Vec<Bounds>> {
    if !source.segment_key_is_integral() || !target.segment_key_is_integral() {
        log::warn!(
            "Segment key '{}' is not an integral column, comparing the whole table as one segment",
            source.segment_key()
        );
        return Ok(vec![None]);
    }

    let range = match (source.key_range()?, target.key_range()?) {
        (None, None) => return Ok(Vec::new()),
        (Some(range), None) | (None, Some(range)) => range,
        (Some((source_min, source_max)), Some((target_min, target_max))) => {
            (source_min.min(target_min), source_max.max(target_max))
        }
    };

    Ok(split_bounds(range.0, range.1, options.bisection_factor)
        .unwrap_or_else(|| vec![Some(range)]))
}

/// Split an inclusive range into `factor` contiguous children.
///
/// Returns None when the range is too narrow to split.
fn split_bounds(low: i64, high: i64, factor: usize) -> Option<Vec<Bounds>> {
    let width = high as i128 - low as i128 + 1;
    if width <= factor as i128 {
        return None;
    }

    let mut children = Vec::with_capacity(factor);
    for i in 0..factor {
        let child_low = low as i128 + width * i as i128 / factor as i128;
        let child_high = low as i128 + width * (i + 1) as i128 / factor as i128 - 1;
        children.push(Some((child_low as i64, child_high as i64)));
    }
    Some(children)
}

/// One key component typed for ordering. Integral key columns compare
/// numerically, everything else by the rendered string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum KeyValue {
    Null,
    Int(i64),
    Text(String),
}

/// Build the sort key for a row's leading key values
fn typed_key(values: &[Option<String>], key_integral: &[bool]) -> Vec<KeyValue> {
    values
        .iter()
        .zip(key_integral)
        .map(|(value, integral)| match value {
            None => KeyValue::Null,
            Some(v) if *integral => v
                .parse::<i64>()
                .map(KeyValue::Int)
                .unwrap_or_else(|_| KeyValue::Text(v.clone())),
            Some(v) => KeyValue::Text(v.clone()),
        })
        .collect()
}

/// State shared by every worker of one diff run
struct SharedState {
    queue: WorkQueue,
    emitted: AtomicUsize,
    segments_done: AtomicU64,
    segments_known: AtomicU64,
}

/// Rows and stats accumulated by a single worker
#[derive(Default)]
struct WorkerOutput {
    rows: Vec<DiffRow>,
    stats: DiffStats,
}

fn run_worker(
    source: &TableHandle,
    target: &TableHandle,
    options: &DiffOptions,
    shared: &SharedState,
    progress: Option<ProgressFn>,
    key_integral: &[bool],
) -> Result<WorkerOutput> {
    let mut output = WorkerOutput::default();

    while let Some(bounds) = shared.queue.next() {
        let children = match process_segment(
            source,
            target,
            bounds,
            options,
            key_integral,
            &shared.emitted,
            &mut output,
        ) {
            Ok(children) => children,
            Err(e) => {
                shared.queue.stop();
                return Err(e);
            }
        };

        shared
            .segments_known
            .fetch_add(children.len() as u64, Ordering::Relaxed);
        shared.queue.complete(children);
        let done = shared.segments_done.fetch_add(1, Ordering::Relaxed) + 1;

        if let Some(progress) = progress {
            progress(done, shared.segments_known.load(Ordering::Relaxed));
        }

        if let Some(limit) = options.limit {
            if shared.emitted.load(Ordering::Relaxed) >= limit {
                shared.queue.stop();
                break;
            }
        }
    }

    Ok(output)
}

/// Checksum one segment on both sides, bisect or download on mismatch.
///
/// Returns the child segments to enqueue (empty when the segment is settled).
fn process_segment(
    source: &TableHandle,
    target: &TableHandle,
    bounds: Bounds,
    options: &DiffOptions,
    key_integral: &[bool],
    emitted: &AtomicUsize,
    output: &mut WorkerOutput,
) -> Result<Vec<Bounds>> {
    let key_len = key_integral.len();
    let (source_count, source_sum) = source.segment_checksum(bounds)?;
    let (target_count, target_sum) = target.segment_checksum(bounds)?;
    output.stats.segments_compared += 1;

    if source_count == target_count && source_sum == target_sum {
        return Ok(Vec::new());
    }

    if let Some((low, high)) = bounds {
        if source_count.max(target_count) > options.bisection_threshold {
            if let Some(children) = split_bounds(low, high, options.bisection_factor) {
                log::debug!(
                    "Segment [{}, {}] differs ({} vs {} rows), bisecting",
                    low,
                    high,
                    source_count,
                    target_count
                );
                return Ok(children);
            }
            // Range narrower than the factor, fall through to download
        }
    }

    let source_rows = source.fetch_rows(bounds)?;
    let target_rows = target.fetch_rows(bounds)?;
    output.stats.segments_downloaded += 1;
    output.stats.rows_downloaded += (source_rows.len() + target_rows.len()) as u64;

    let comparison = hash::match_rows(key_len, source_rows, target_rows);
    output.stats.rows_removed += comparison.removed.len() as u64;
    output.stats.rows_added += comparison.added.len() as u64;
    output.stats.rows_updated += comparison.updated.len() as u64;

    // Interleave the three kinds back into key order before emitting
    let mut entries: Vec<(Vec<KeyValue>, Vec<DiffRow>)> = Vec::new();
    for row in comparison.removed {
        entries.push((
            typed_key(&row[..key_len], key_integral),
            vec![DiffRow {
                op: DiffOp::Removed,
                values: row,
            }],
        ));
    }
    for (source_row, target_row) in comparison.updated {
        entries.push((
            typed_key(&source_row[..key_len], key_integral),
            vec![
                DiffRow {
                    op: DiffOp::Removed,
                    values: source_row,
                },
                DiffRow {
                    op: DiffOp::Added,
                    values: target_row,
                },
            ],
        ));
    }
    for row in comparison.added {
        entries.push((
            typed_key(&row[..key_len], key_integral),
            vec![DiffRow {
                op: DiffOp::Added,
                values: row,
            }],
        ));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut count = 0;
    for (_, rows) in entries {
        count += rows.len();
        output.rows.extend(rows);
    }
    emitted.fetch_add(count, Ordering::Relaxed);

    Ok(Vec::new())
}

/// Segment queue shared across workers.
///
/// `outstanding` counts segments enqueued but not yet completed; workers
/// park on the condvar while it is non-zero and the queue is drained, since
/// a running worker may still enqueue children.
struct WorkQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

struct QueueState {
    pending: VecDeque<Bounds>,
    outstanding: usize,
    stopped: bool,
}

impl WorkQueue {
    fn new(initial: Vec<Bounds>) -> Self {
        let outstanding = initial.len();
        Self {
            state: Mutex::new(QueueState {
                pending: initial.into(),
                outstanding,
                stopped: false,
            }),
            ready: Condvar::new(),
        }
    }

    fn outstanding(&self) -> usize {
        self.state.lock().unwrap().outstanding
    }

    /// Next segment to process, or None when the run is finished or stopped
    fn next(&self) -> Option<Bounds> {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.stopped || state.outstanding == 0 {
                return None;
            }
            if let Some(bounds) = state.pending.pop_front() {
                return Some(bounds);
            }
            state = self.ready.wait(state).unwrap();
        }
    }

    /// Mark one segment done, enqueueing its children
    fn complete(&self, children: Vec<Bounds>) {
        let mut state = self.state.lock().unwrap();
        state.outstanding += children.len();
        state.outstanding -= 1;
        state.pending.extend(children);
        drop(state);
        self.ready.notify_all();
    }

    /// Abort the run: wake every parked worker and hand out no more work
    fn stop(&self) {
        let mut state = self.state.lock().unwrap();
        state.stopped = true;
        drop(state);
        self.ready.notify_all();
    }
}
