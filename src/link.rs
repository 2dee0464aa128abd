//! # Linker
//!
//! Protocol by which candidate producers attach their proposals to the
//! graph without bypassing its invariants.
//!
//! The split is strict: `LinkSearcher::search_links` is a pure function
//! from a read-only context to candidate bindings, so search logic can be
//! tested and replayed without mutating shared state. Committing a link
//! (`Link::apply_to`) is the only side-effecting step, and it goes through
//! the ordinary `add_vertex`/`add_edge` operations.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::grade::Tunables;
use crate::graph::SymbolGraph;
use crate::model::{Inter, InterId, Relation, RelId};

// ============================================================================
// Link
// ============================================================================

/// Partner side of a proposed binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LinkPartner {
    /// Bind to an interpretation already in the graph.
    Existing(InterId),
    /// Materialize a new interpretation, then bind to it.
    New(Inter),
}

/// A proposed-but-uncommitted relation: partner, relation value, and the
/// producer's numeric affinity for ranking competing proposals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub partner: LinkPartner,
    pub relation: Relation,
    /// True when the committed edge runs candidate → partner.
    pub outgoing: bool,
    pub affinity: f64,
}

impl Link {
    pub fn to_existing(partner: InterId, relation: Relation, affinity: f64) -> Self {
        Self { partner: LinkPartner::Existing(partner), relation, outgoing: true, affinity }
    }

    pub fn incoming(mut self) -> Self {
        self.outgoing = false;
        self
    }

    /// Commit this link for `inter`: add the partner vertex when new, then
    /// the edge. Returns the committed edge id, or `None` when the store
    /// skipped the proposal (dangling partner, duplicate, overridden pair).
    pub fn apply_to(&self, sig: &mut SymbolGraph, inter: InterId) -> Option<RelId> {
        let partner = match &self.partner {
            LinkPartner::Existing(id) => *id,
            LinkPartner::New(proto) => sig.add_vertex(proto.clone()),
        };
        let (src, dst) = if self.outgoing { (inter, partner) } else { (partner, inter) };
        sig.add_edge(src, dst, self.relation)
    }

    /// Whether the relation admits a single partner (best-affinity wins).
    fn is_exclusive(&self) -> bool {
        match self.relation {
            Relation::Support { kind, .. } => kind.is_exclusive(),
            Relation::Exclusion { .. } | Relation::NonExclusionOverride => false,
        }
    }
}

// ============================================================================
// Producer contract
// ============================================================================

/// Failure inside a candidate producer. Never escapes the orchestrator:
/// the failing candidate is discarded and all others proceed.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[error("producer failure: {message}")]
pub struct ProducerError {
    pub message: String,
}

impl ProducerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Read-only context handed to a producer's link search.
pub struct LinkContext<'a> {
    pub sig: &'a SymbolGraph,
    /// The candidate interpretation partners are searched for.
    pub inter: InterId,
    pub tunables: &'a Tunables,
}

/// One candidate producer's pure link search.
pub trait LinkSearcher {
    /// Propose zero or more partner bindings for the context's candidate.
    /// Must not mutate any shared state.
    fn search_links(&self, ctx: &LinkContext<'_>) -> Result<Vec<Link>, ProducerError>;
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Outcome of one linking round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkReport {
    /// Candidates that committed at least one link.
    pub linked: Vec<InterId>,
    /// Candidates removed for lack of any acceptable link.
    pub removed: Vec<InterId>,
    /// Candidates whose producer failed (also removed).
    pub failed: Vec<InterId>,
    /// Edges committed this round.
    pub edges: Vec<RelId>,
}

/// Run the link search for each candidate and commit the winners.
///
/// Selection per relation cardinality: exclusive relations keep only the
/// single best-affinity link; non-exclusive relations keep every link at or
/// above the minimum affinity. A candidate that ends up with no acceptable
/// link is removed outright rather than left dangling in the graph.
pub fn link_candidates(
    sig: &mut SymbolGraph,
    candidates: &[InterId],
    searcher: &dyn LinkSearcher,
    tunables: &Tunables,
) -> LinkReport {
    let mut report = LinkReport::default();

    for &candidate in candidates {
        if !sig.is_live(candidate) {
            continue;
        }

        let links = {
            let ctx = LinkContext { sig, inter: candidate, tunables };
            searcher.search_links(&ctx)
        };

        let links = match links {
            Ok(links) => links,
            Err(err) => {
                // Partial-failure isolation: this candidate only.
                warn!(%candidate, error = %err, "producer failed, candidate discarded");
                sig.remove_vertex(candidate);
                report.failed.push(candidate);
                continue;
            }
        };

        let accepted = select_links(links, tunables);
        if accepted.is_empty() {
            debug!(%candidate, "no acceptable link, candidate removed");
            sig.remove_vertex(candidate);
            report.removed.push(candidate);
            continue;
        }

        let mut committed = false;
        for link in &accepted {
            if let Some(rel_id) = link.apply_to(sig, candidate) {
                report.edges.push(rel_id);
                committed = true;
            }
        }
        if committed {
            report.linked.push(candidate);
        } else {
            // Every accepted link was skipped by the store; the candidate is
            // still unbound and goes the same way as an empty search.
            debug!(%candidate, "all links skipped by the store, candidate removed");
            sig.remove_vertex(candidate);
            report.removed.push(candidate);
        }
    }

    report
}

/// Apply the cardinality policy to a candidate's raw proposals.
fn select_links(links: Vec<Link>, tunables: &Tunables) -> Vec<Link> {
    let (exclusive, shared): (Vec<Link>, Vec<Link>) =
        links.into_iter().partition(|l| l.is_exclusive());

    let mut accepted: Vec<Link> = shared
        .into_iter()
        .filter(|l| l.affinity >= tunables.min_affinity)
        .collect();

    // For exclusive relations only the best-affinity proposal per relation
    // type survives, ties resolved toward the earliest proposal so the
    // outcome is deterministic.
    let mut best_per_type: Vec<Link> = Vec::new();
    for link in exclusive {
        match best_per_type.iter_mut().find(|b| b.relation.same_type(&link.relation)) {
            Some(best) => {
                if link.affinity > best.affinity {
                    *best = link;
                }
            }
            None => best_per_type.push(link),
        }
    }
    accepted.extend(best_per_type);
    accepted
}

// ============================================================================
// Tests
// ============================================================================
