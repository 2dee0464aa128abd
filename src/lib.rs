//! # omr-sig — Symbol Interpretation Graph
//!
//! The hypothesis-arbitration core of an optical music recognition engine.
//! Shape detectors produce many uncertain, conflicting interpretations of
//! what each detected shape means; this crate reconciles them into one
//! globally consistent reading per page region.
//!
//! ## Design Principles
//!
//! 1. **Store owns nothing clever**: `SymbolGraph` is synchronous CRUD with
//!    invariants, no geometry or grade heuristics of its own
//! 2. **Clean DTOs**: `Inter`, `Relation`, `Link` cross all boundaries
//! 3. **Pure search, explicit commit**: producers propose `Link`s without
//!    mutating; only `Link::apply_to` touches the graph
//! 4. **Deterministic reduction**: identical input always yields identical
//!    survivors, ties broken by kind priority then insertion order
//!
//! ## Quick Start
//!
//! ```rust
//! use omr_sig::{
//!     Bounds, ExclusionCause, Inter, InterKind, KindPriorities, Reducer, Relation, RegionId,
//!     SymbolGraph, Tunables,
//! };
//!
//! // One region's graph; producers add interpretations.
//! let mut sig = SymbolGraph::new(RegionId(0));
//! let head = sig.add_vertex(Inter::new(InterKind::Notehead, Bounds::new(10, 40, 12, 12), 0.9));
//! let rest = sig.add_vertex(Inter::new(InterKind::Rest, Bounds::new(12, 40, 10, 14), 0.6));
//!
//! // The two hypotheses claim the same ink.
//! sig.add_edge(head, rest, Relation::exclusion(ExclusionCause::Overlap)).unwrap();
//!
//! // Reduce to a consistent subgraph: the stronger reading survives.
//! let tunables = Tunables::default();
//! let priorities = KindPriorities::default();
//! let report = Reducer::new(&tunables, &priorities).reduce(&mut sig);
//! assert!(report.converged);
//! assert!(sig.is_live(head));
//! assert!(!sig.is_live(rest));
//! ```
//!
//! ## Components
//!
//! | Component | Module | Description |
//! |-----------|--------|-------------|
//! | Graph store | `graph` | Vertices, typed relations, queries for one region |
//! | Grade model | `grade` | Contextual grades, tunables, kind priorities |
//! | Reducer | `reduce` | Fixed-point conflict resolution |
//! | Linker | `link` | Pure-search / explicit-commit candidate protocol |
//! | Impact planner | `impact` | Edit batches → downstream recomputation |
//! | Pipeline | `pipeline` | Parallel regions, cancellation, sheet isolation |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod graph;
pub mod grade;
pub mod reduce;
pub mod link;
pub mod impact;
pub mod pipeline;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    Bounds, ExclusionCause, GlyphId, GradeImpacts, ImpactItem, Inter, InterId, InterKind,
    PageId, Point, RegionId, RelId, Relation, RelationEdge, RelationFilter, SheetId,
    SupportKind, TextRole,
};

// ============================================================================
// Re-exports: Store & grades
// ============================================================================

pub use graph::SymbolGraph;
pub use grade::{KindPriorities, Tunables, contextual};

// ============================================================================
// Re-exports: Algorithms
// ============================================================================

pub use reduce::{Reducer, Reduction};
pub use link::{Link, LinkContext, LinkPartner, LinkReport, LinkSearcher, ProducerError, link_candidates};
pub use impact::{Category, EditBatch, EditRecord, ImpactVector, OpKind, PASS_ORDER, impact};
pub use pipeline::{
    BookReport, CancelFlag, EditQueue, Page, PageReport, PipelineContext, Sheet, SheetReport,
    process_book, process_page, process_page_with, process_sheet,
};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An unrecoverable configuration problem, e.g. an unrecognized kind
    /// restored from persisted state.
    #[error("configuration error for '{key}': {message}")]
    Config { key: String, message: String },

    /// The current operation was canceled at a step boundary.
    #[error("canceled")]
    Canceled,

    /// A pipeline step failed for one sheet; other sheets are unaffected.
    #[error("step failure on sheet {sheet}: {message}")]
    Step { sheet: model::SheetId, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;
