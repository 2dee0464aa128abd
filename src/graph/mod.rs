//! # Symbol Graph Store
//!
//! One region's SIG: an arena of interpretations plus typed relations
//! between them. This is the single mutation point for producers, the
//! linker, and the reducer.
//!
//! ## Design
//!
//! - Vertices live in an arena `Vec` indexed by `InterId`; removal flips the
//!   `removed` flag so handles stay stable and insertion order survives as
//!   the deterministic tie-break.
//! - Edges live in their own arena, wired to vertices through per-vertex
//!   incidence lists.
//! - All mutating operations are synchronous and side-effect visible
//!   immediately; none perform geometry or grade heuristics on their own.
//! - Malformed proposals (dangling or duplicate edges) are never fatal:
//!   they are logged and skipped, and the caller observes `None`.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::grade::{self, Tunables};
use crate::model::{
    Bounds, ExclusionCause, GlyphId, Inter, InterId, InterKind, Point, Relation, RelationEdge,
    RelationFilter, RegionId, RelId, SupportKind,
};

// ============================================================================
// SymbolGraph
// ============================================================================

/// The symbol interpretation graph of one region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolGraph {
    region: RegionId,
    inters: Vec<Inter>,
    edges: Vec<RelationEdge>,
    /// Incidence lists: every edge appears under both endpoints.
    adjacency: Vec<SmallVec<[RelId; 4]>>,
    /// Source-glyph lookup (weak, non-owning).
    by_glyph: HashMap<GlyphId, InterId>,
}

impl SymbolGraph {
    pub fn new(region: RegionId) -> Self {
        Self {
            region,
            inters: Vec::new(),
            edges: Vec::new(),
            adjacency: Vec::new(),
            by_glyph: HashMap::new(),
        }
    }

    pub fn region(&self) -> RegionId {
        self.region
    }

    // ========================================================================
    // Vertex CRUD
    // ========================================================================

    /// Insert an interpretation, stamping its id and owning region.
    pub fn add_vertex(&mut self, mut inter: Inter) -> InterId {
        let id = InterId(self.inters.len() as u32);
        inter.id = id;
        inter.region = self.region;
        inter.removed = false;

        if let Some(glyph) = inter.glyph {
            self.by_glyph.insert(glyph, id);
        }

        self.inters.push(inter);
        self.adjacency.push(SmallVec::new());
        id
    }

    pub fn inter(&self, id: InterId) -> Option<&Inter> {
        self.inters.get(id.0 as usize)
    }

    pub fn inter_mut(&mut self, id: InterId) -> Option<&mut Inter> {
        self.inters.get_mut(id.0 as usize)
    }

    /// True when the id designates a present, non-removed interpretation.
    pub fn is_live(&self, id: InterId) -> bool {
        self.inter(id).is_some_and(|i| !i.removed)
    }

    /// Remove an interpretation: cascades incident edges, and invalidates an
    /// ensemble whose last live constituent is gone.
    pub fn remove_vertex(&mut self, id: InterId) {
        let Some(inter) = self.inters.get_mut(id.0 as usize) else {
            warn!(%id, "remove_vertex: unknown interpretation, ignored");
            return;
        };
        if inter.removed {
            return;
        }
        inter.removed = true;
        let ensemble = inter.ensemble;

        // Cascade incident edges.
        let incident = self.adjacency[id.0 as usize].clone();
        for rel_id in incident {
            if let Some(edge) = self.edges.get_mut(rel_id.0 as usize) {
                edge.removed = true;
            }
        }

        // An ensemble whose sole constituents are gone is gone too.
        if let Some(ens) = ensemble {
            if self.is_live(ens) {
                let has_live_member =
                    self.inters.iter().any(|i| !i.removed && i.ensemble == Some(ens));
                if !has_live_member {
                    debug!(ensemble = %ens, "last constituent removed, invalidating ensemble");
                    self.remove_vertex(ens);
                }
            }
        }
    }

    // ========================================================================
    // Edge CRUD
    // ========================================================================

    /// Insert a typed relation between two interpretations.
    ///
    /// Returns `None` without mutating when the proposal must be skipped:
    /// - an endpoint is absent or removed (dangling, logged);
    /// - a self-loop (logged);
    /// - a live edge of the same type already joins the pair (duplicate,
    ///   logged; direction-aware for directed supports);
    /// - a plain `Exclusion` is proposed for a pair covered by a
    ///   `NonExclusionOverride` or an existing `Support`;
    /// - a `Support` is proposed for a pair covered by an `Exclusion`.
    pub fn add_edge(&mut self, src: InterId, dst: InterId, relation: Relation) -> Option<RelId> {
        if !self.is_live(src) || !self.is_live(dst) {
            warn!(%src, %dst, %relation, "dangling edge proposal, skipped");
            return None;
        }
        if src == dst {
            warn!(%src, %relation, "self-loop proposal, skipped");
            return None;
        }

        if self.find_edge(src, dst, &relation).is_some() {
            warn!(%src, %dst, %relation, "duplicate edge proposal, skipped");
            return None;
        }

        match relation {
            Relation::Exclusion { .. } => {
                // An override pins the pair as compatible, now and later.
                if self.pair_has(src, dst, RelationFilter::Overrides) {
                    debug!(%src, %dst, "exclusion proposal overridden, skipped");
                    return None;
                }
                if self.pair_has(src, dst, RelationFilter::Supports) {
                    debug!(%src, %dst, "exclusion proposal against supported pair, skipped");
                    return None;
                }
            }
            Relation::Support { .. } => {
                if self.pair_has(src, dst, RelationFilter::Exclusions) {
                    debug!(%src, %dst, "support proposal against excluded pair, skipped");
                    return None;
                }
            }
            Relation::NonExclusionOverride => {}
        }

        let id = RelId(self.edges.len() as u32);
        self.edges.push(RelationEdge { id, src, dst, relation, removed: false });
        self.adjacency[src.0 as usize].push(id);
        self.adjacency[dst.0 as usize].push(id);
        Some(id)
    }

    pub fn relation(&self, id: RelId) -> Option<&RelationEdge> {
        self.edges.get(id.0 as usize).filter(|e| !e.removed)
    }

    /// First live edge of the same type joining the pair, honoring direction
    /// for directed relations.
    fn find_edge(&self, src: InterId, dst: InterId, relation: &Relation) -> Option<RelId> {
        self.adjacency[src.0 as usize]
            .iter()
            .copied()
            .filter_map(|rel_id| self.relation(rel_id))
            .find(|edge| {
                edge.relation.same_type(relation)
                    && if relation.is_symmetric() {
                        edge.joins(src, dst)
                    } else {
                        edge.src == src && edge.dst == dst
                    }
            })
            .map(|edge| edge.id)
    }

    /// Whether any live edge of the given category joins the unordered pair.
    pub fn pair_has(&self, a: InterId, b: InterId, filter: RelationFilter) -> bool {
        self.adjacency
            .get(a.0 as usize)
            .into_iter()
            .flatten()
            .filter_map(|rel_id| self.relation(*rel_id))
            .any(|edge| filter.matches(&edge.relation) && edge.joins(a, b))
    }

    // ========================================================================
    // Typed queries
    // ========================================================================

    /// Live relations of the given category the interpretation is involved in.
    pub fn get_relations(&self, id: InterId, filter: RelationFilter) -> Vec<RelId> {
        self.adjacency
            .get(id.0 as usize)
            .into_iter()
            .flatten()
            .filter_map(|rel_id| self.relation(*rel_id))
            .filter(|edge| filter.matches(&edge.relation))
            .map(|edge| edge.id)
            .collect()
    }

    pub fn has_relation(&self, id: InterId, filter: RelationFilter) -> bool {
        !self.get_relations(id, filter).is_empty()
    }

    /// The vertex at the opposite side of the relation.
    pub fn get_opposite_inter(&self, id: InterId, rel_id: RelId) -> Option<InterId> {
        self.relation(rel_id)?.other(id)
    }

    /// Live interpretations of the given kind.
    pub fn inters(&self, kind: InterKind) -> Vec<InterId> {
        self.inters_where(|i| i.kind == kind)
    }

    /// Live interpretations satisfying an arbitrary predicate.
    pub fn inters_where(&self, predicate: impl Fn(&Inter) -> bool) -> Vec<InterId> {
        self.inters.iter().filter(|i| !i.removed && predicate(i)).map(|i| i.id).collect()
    }

    /// Iterate live interpretations in insertion order.
    pub fn live_inters(&self) -> impl Iterator<Item = &Inter> {
        self.inters.iter().filter(|i| !i.removed)
    }

    /// All live exclusion edges.
    pub fn exclusions(&self) -> Vec<RelId> {
        self.edges
            .iter()
            .filter(|e| !e.removed && e.relation.is_exclusion())
            .map(|e| e.id)
            .collect()
    }

    /// Interpretation built from the given source glyph, if still live.
    pub fn inter_of_glyph(&self, glyph: GlyphId) -> Option<InterId> {
        self.by_glyph.get(&glyph).copied().filter(|id| self.is_live(*id))
    }

    // ========================================================================
    // Geometry queries
    // ========================================================================

    /// Live interpretations entirely contained in the rectangle.
    pub fn contained_inters(&self, rect: Bounds) -> Vec<InterId> {
        self.inters_where(|i| rect.encloses(&i.bounds))
    }

    /// Live interpretations whose bounds intersect the rectangle.
    pub fn intersected_inters(&self, rect: Bounds) -> Vec<InterId> {
        self.inters_where(|i| rect.intersects(&i.bounds))
    }

    /// Live interpretations whose bounds contain the point.
    pub fn containing_inters(&self, point: Point) -> Vec<InterId> {
        self.inters_where(|i| i.bounds.contains(point))
    }

    // ========================================================================
    // Exclusion insertion
    // ========================================================================

    /// Formalize mutual exclusion within a candidate set: pairwise
    /// all-to-all, skipping pairs already overridden, supported, or excluded.
    /// Edges run from the lower to the higher id.
    pub fn insert_exclusions(&mut self, group: &[InterId], cause: ExclusionCause) -> Vec<RelId> {
        let mut seen: SmallVec<[InterId; 8]> = SmallVec::new();
        for id in group {
            if !seen.contains(id) {
                seen.push(*id);
            }
        }

        let mut inserted = Vec::new();
        for (i, &a) in seen.iter().enumerate() {
            for &b in &seen[i + 1..] {
                let (src, dst) = if a <= b { (a, b) } else { (b, a) };
                if let Some(rel_id) = self.add_edge(src, dst, Relation::exclusion(cause)) {
                    inserted.push(rel_id);
                }
            }
        }
        inserted
    }

    // ========================================================================
    // Contextual grades
    // ========================================================================

    /// (Re)compute and cache the contextual grade of one interpretation.
    ///
    /// Contributions are summed per support kind from the base grades of live
    /// partners, each kind's aggregate capped by the tunables, then folded
    /// into the base grade through the saturating sum. Directed supports
    /// contribute to their target only; symmetric supports to both ends.
    pub fn compute_contextual_grade(&mut self, id: InterId, tunables: &Tunables) -> f64 {
        let Some(inter) = self.inter(id) else {
            return 0.0;
        };
        let base = inter.grade;

        let mut per_kind: HashMap<SupportKind, f64> = HashMap::new();
        for rel_id in self.get_relations(id, RelationFilter::Supports) {
            let Some(edge) = self.relation(rel_id) else { continue };
            let Relation::Support { kind, weight } = edge.relation else { continue };

            let incoming = edge.dst == id || kind.is_symmetric();
            if !incoming {
                continue;
            }
            let Some(partner) = edge.other(id).and_then(|p| self.inter(p)) else { continue };
            if partner.removed {
                continue;
            }
            *per_kind.entry(kind).or_insert(0.0) += partner.grade * weight.max(0.0);
        }

        let contribution: f64 =
            per_kind.iter().map(|(kind, sum)| sum.min(tunables.max_support(*kind))).sum();

        let cg = grade::contextual(base, contribution);
        if let Some(inter) = self.inter_mut(id) {
            inter.contextual = Some(cg);
        }
        cg
    }

    /// (Re)compute the contextual grade of every live interpretation.
    pub fn contextualize(&mut self, tunables: &Tunables) {
        let ids: Vec<InterId> = self.live_inters().map(|i| i.id).collect();
        for id in ids {
            self.compute_contextual_grade(id, tunables);
        }
    }

    // ========================================================================
    // Counts
    // ========================================================================

    /// Number of live interpretations.
    pub fn vertex_count(&self) -> usize {
        self.live_inters().count()
    }

    /// Number of live edges.
    pub fn edge_count(&self) -> usize {
        self.edges.iter().filter(|e| !e.removed).count()
    }
}

// ============================================================================
// Tests
// ============================================================================
