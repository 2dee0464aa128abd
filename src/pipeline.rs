//! # Pipeline Driver
//!
//! Orchestrates reduction across regions, pages, and sheets.
//!
//! ## Concurrency model
//!
//! Each region's graph is independently owned: workers claim regions off an
//! atomic index and never touch another worker's region. Cross-region work
//! runs single-threaded after all regions of a page finish — the scoped
//! join is the barrier. Within one region reduction stays single-threaded
//! and deterministic.
//!
//! Cancellation is cooperative and checked only at step boundaries: a
//! reduction pass, once started, always runs to completion so a partially
//! reduced graph is never exposed.
//!
//! Interactive edits go through a per-region [`EditQueue`] so user-triggered
//! edit+re-reduce sequences never interleave with a background pass on the
//! same region.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::grade::{KindPriorities, Tunables};
use crate::graph::SymbolGraph;
use crate::impact::{EditBatch, ImpactVector, OpKind, impact};
use crate::model::{PageId, SheetId};
use crate::reduce::{Reducer, Reduction};
use crate::{Error, Result};

// ============================================================================
// Context & cancellation
// ============================================================================

/// Injected services for a pipeline run. Tests substitute deterministic
/// stubs here instead of reaching for global lookups.
#[derive(Debug, Clone, Default)]
pub struct PipelineContext {
    pub tunables: Tunables,
    pub priorities: KindPriorities,
}

/// Cooperative cancellation flag shared between a driver and its caller.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Step-boundary check.
    fn checkpoint(&self) -> Result<()> {
        if self.is_canceled() { Err(Error::Canceled) } else { Ok(()) }
    }
}

// ============================================================================
// Page / sheet structures
// ============================================================================

/// One page: a set of regions, each owning its graph.
#[derive(Debug)]
pub struct Page {
    pub id: PageId,
    pub regions: Vec<SymbolGraph>,
}

/// One sheet: pages plus numeric parameters restored from persisted state,
/// applied on top of the pipeline tunables before processing.
#[derive(Debug)]
pub struct Sheet {
    pub id: SheetId,
    pub params: Vec<(String, f64)>,
    pub pages: Vec<Page>,
}

/// Per-page reduction report, one entry per region.
#[derive(Debug, Clone)]
pub struct PageReport {
    pub page: PageId,
    pub regions: Vec<Reduction>,
}

#[derive(Debug, Clone)]
pub struct SheetReport {
    pub sheet: SheetId,
    pub pages: Vec<PageReport>,
}

/// Book outcome: completed sheets plus per-sheet step failures. A failing
/// sheet never stops its siblings.
#[derive(Debug, Default)]
pub struct BookReport {
    pub completed: Vec<SheetReport>,
    pub failures: Vec<Error>,
}

// ============================================================================
// Page processing
// ============================================================================

/// Reduce every region of a page in parallel, then run the single-threaded
/// cross-region step behind the join barrier.
pub fn process_page_with<F>(
    page: &mut Page,
    ctx: &PipelineContext,
    cancel: &CancelFlag,
    cross_region: F,
) -> Result<PageReport>
where
    F: FnOnce(&mut Page) -> Result<()>,
{
    cancel.checkpoint()?;

    let workers = ctx.tunables.region_workers.clamp(1, page.regions.len().max(1));
    let next = AtomicUsize::new(0);
    let results: Mutex<Vec<(usize, Reduction)>> = Mutex::new(Vec::with_capacity(page.regions.len()));
    let regions: Vec<Mutex<&mut SymbolGraph>> = page.regions.iter_mut().map(Mutex::new).collect();

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| {
                loop {
                    let index = next.fetch_add(1, Ordering::Relaxed);
                    if index >= regions.len() || cancel.is_canceled() {
                        break;
                    }
                    let mut sig = regions[index].lock();
                    let reduction = Reducer::new(&ctx.tunables, &ctx.priorities).reduce(&mut sig);
                    results.lock().push((index, reduction));
                }
            });
        }
    });

    // Join barrier passed; a cancellation inside the fan-out surfaces here.
    cancel.checkpoint()?;

    let mut collected = results.into_inner();
    collected.sort_by_key(|(index, _)| *index);
    let report =
        PageReport { page: page.id, regions: collected.into_iter().map(|(_, r)| r).collect() };

    // Cross-region operations (slur reconnection, page-level reduction) run
    // single-threaded on the fully reduced page.
    cross_region(page)?;

    debug!(page = %page.id, regions = report.regions.len(), "page reduced");
    Ok(report)
}

/// `process_page_with` without a cross-region step.
pub fn process_page(page: &mut Page, ctx: &PipelineContext, cancel: &CancelFlag) -> Result<PageReport> {
    process_page_with(page, ctx, cancel, |_| Ok(()))
}

// ============================================================================
// Sheet / book processing
// ============================================================================

/// Process one sheet: apply its restored parameters, then reduce its pages.
/// A configuration problem (e.g. an unrecognized kind in persisted params)
/// aborts this sheet only.
pub fn process_sheet(sheet: &mut Sheet, ctx: &PipelineContext, cancel: &CancelFlag) -> Result<SheetReport> {
    let mut effective = ctx.clone();
    for (key, value) in &sheet.params {
        effective.tunables.set(key, *value).map_err(|source| Error::Step {
            sheet: sheet.id,
            message: source.to_string(),
        })?;
    }

    let mut pages = Vec::with_capacity(sheet.pages.len());
    for page in &mut sheet.pages {
        pages.push(process_page(page, &effective, cancel)?);
    }
    Ok(SheetReport { sheet: sheet.id, pages })
}

/// Process a batch of sheets with sheet-level isolation: each failure is
/// recorded and the remaining sheets proceed. Cancellation stops the batch.
pub fn process_book(sheets: &mut [Sheet], ctx: &PipelineContext, cancel: &CancelFlag) -> BookReport {
    let mut report = BookReport::default();

    for sheet in sheets.iter_mut() {
        if cancel.is_canceled() {
            break;
        }
        match process_sheet(sheet, ctx, cancel) {
            Ok(done) => report.completed.push(done),
            Err(Error::Canceled) => break,
            Err(err) => {
                warn!(sheet = %sheet.id, error = %err, "sheet step failed, continuing batch");
                report.failures.push(err);
            }
        }
    }
    report
}

// ============================================================================
// Interactive edit queue
// ============================================================================

/// Serialized queue of interactive edit batches for one region.
///
/// Submission is thread-safe; draining requires exclusive access to the
/// region's graph, which is what serializes user edits against background
/// passes.
#[derive(Debug, Default)]
pub struct EditQueue {
    pending: Mutex<VecDeque<(EditBatch, OpKind)>>,
}

impl EditQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit(&self, batch: EditBatch, op_kind: OpKind) {
        self.pending.lock().push_back((batch, op_kind));
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Apply all queued batches in submission order: classify each batch,
    /// union the per-page impact vectors, and re-stabilize the region after
    /// each batch so the next one sees a consistent graph.
    pub fn drain(
        &self,
        sig: &mut SymbolGraph,
        ctx: &PipelineContext,
    ) -> BTreeMap<PageId, ImpactVector> {
        let mut impacts: BTreeMap<PageId, ImpactVector> = BTreeMap::new();

        loop {
            let task = self.pending.lock().pop_front();
            let Some((batch, op_kind)) = task else { break };

            for (page, vector) in impact(&batch, op_kind) {
                let entry = impacts.entry(page).or_default();
                *entry = entry.union(vector);
            }
            Reducer::new(&ctx.tunables, &ctx.priorities).reduce(sig);
        }
        impacts
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Bounds, ExclusionCause, Inter, InterKind, RegionId};
    use pretty_assertions::assert_eq;

    fn region_with_conflict(region: u32) -> SymbolGraph {
        let mut sig = SymbolGraph::new(RegionId(region));
        let a = sig.add_vertex(Inter::new(InterKind::Notehead, Bounds::new(0, 0, 10, 10), 0.9));
        let b = sig.add_vertex(Inter::new(InterKind::Rest, Bounds::new(2, 0, 10, 10), 0.6));
        sig.add_edge(a, b, crate::model::Relation::exclusion(ExclusionCause::Overlap)).unwrap();
        sig
    }

    #[test]
    fn test_process_page_reduces_every_region() {
        let mut page = Page {
            id: PageId(1),
            regions: (0..8).map(region_with_conflict).collect(),
        };
        let ctx = PipelineContext::default();

        let report = process_page(&mut page, &ctx, &CancelFlag::new()).unwrap();

        assert_eq!(report.regions.len(), 8);
        for (reduction, sig) in report.regions.iter().zip(&page.regions) {
            assert!(reduction.converged);
            assert_eq!(reduction.removed.len(), 1);
            assert_eq!(sig.vertex_count(), 1);
        }
    }

    #[test]
    fn test_cancellation_respected_at_step_boundary() {
        let mut page = Page { id: PageId(1), regions: vec![region_with_conflict(0)] };
        let ctx = PipelineContext::default();
        let cancel = CancelFlag::new();
        cancel.cancel();

        let result = process_page(&mut page, &ctx, &cancel);
        assert!(matches!(result, Err(Error::Canceled)));
        // Canceled before the step: the graph is untouched.
        assert_eq!(page.regions[0].vertex_count(), 2);
    }

    #[test]
    fn test_cross_region_step_runs_after_barrier() {
        let mut page = Page {
            id: PageId(1),
            regions: vec![region_with_conflict(0), region_with_conflict(1)],
        };
        let ctx = PipelineContext::default();

        let report = process_page_with(&mut page, &ctx, &CancelFlag::new(), |page| {
            // All regions already reduced when this runs.
            for sig in &page.regions {
                assert_eq!(sig.vertex_count(), 1);
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(report.regions.len(), 2);
    }

    #[test]
    fn test_sheet_isolation_in_book_batch() {
        let good = Sheet {
            id: SheetId(1),
            params: vec![("reduce.max_passes".into(), 5.0)],
            pages: vec![Page { id: PageId(1), regions: vec![region_with_conflict(0)] }],
        };
        let bad = Sheet {
            id: SheetId(2),
            // Unrecognized kind restored from persisted state.
            params: vec![("grade.min_contextual.squiggle".into(), 0.5)],
            pages: vec![Page { id: PageId(2), regions: vec![region_with_conflict(1)] }],
        };
        let mut sheets = [bad, good];
        let ctx = PipelineContext::default();

        let report = process_book(&mut sheets, &ctx, &CancelFlag::new());

        assert_eq!(report.completed.len(), 1);
        assert_eq!(report.completed[0].sheet, SheetId(1));
        assert_eq!(report.failures.len(), 1);
    }

    #[test]
    fn test_edit_queue_drains_in_order_and_re_reduces() {
        use crate::impact::EditRecord;

        let mut sig = region_with_conflict(0);
        let ctx = PipelineContext::default();
        let queue = EditQueue::new();

        let mut batch = EditBatch::new();
        batch.push(EditRecord::Inter { kind: InterKind::Slur, role: None, page: PageId(1) });
        queue.submit(batch, OpKind::Do);

        let mut batch = EditBatch::new();
        batch.push(EditRecord::Inter { kind: InterKind::Barline, role: None, page: PageId(1) });
        queue.submit(batch, OpKind::Undo);

        let impacts = queue.drain(&mut sig, &ctx);

        assert!(queue.is_empty());
        let v = impacts[&PageId(1)];
        assert!(v.slurs && v.measures);
        // The queued re-reduction resolved the region's conflict.
        assert_eq!(sig.vertex_count(), 1);
    }
}
