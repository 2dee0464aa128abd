//! # Reducer
//!
//! Brings one region's graph to a local fixed point by resolving exclusion
//! classes and purging under-threshold interpretations, repeating until a
//! full pass removes nothing or the iteration cap is hit.
//!
//! The algorithm is deterministic for identical input: classes are visited
//! in arena order, members compared by contextual grade, then kind priority,
//! then earliest-inserted id. A frozen interpretation reflects user intent
//! and is never auto-removed.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::grade::{KindPriorities, Tunables};
use crate::graph::SymbolGraph;
use crate::model::{InterId, RelationFilter};

// ============================================================================
// Union-find over arena handles
// ============================================================================

/// Disjoint sets over dense arena indices, with path compression and union
/// by size. Partition keys are vertex indices, so the whole structure is two
/// flat vectors.
struct UnionFind {
    parent: Vec<u32>,
    size: Vec<u32>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self { parent: (0..n as u32).collect(), size: vec![1; n] }
    }

    fn find(&mut self, x: u32) -> u32 {
        let mut root = x;
        while self.parent[root as usize] != root {
            root = self.parent[root as usize];
        }
        // Compress the walked path.
        let mut cur = x;
        while self.parent[cur as usize] != root {
            let next = self.parent[cur as usize];
            self.parent[cur as usize] = root;
            cur = next;
        }
        root
    }

    fn union(&mut self, a: u32, b: u32) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        let (big, small) =
            if self.size[ra as usize] >= self.size[rb as usize] { (ra, rb) } else { (rb, ra) };
        self.parent[small as usize] = big;
        self.size[big as usize] += self.size[small as usize];
    }
}

// ============================================================================
// Reduction report
// ============================================================================

/// Outcome of one `reduce` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reduction {
    /// Full passes executed (at least one).
    pub passes: usize,
    /// Interpretations removed, in removal order.
    pub removed: Vec<InterId>,
    /// False when the iteration cap was hit before stability.
    pub converged: bool,
}

// ============================================================================
// Reducer
// ============================================================================

/// Fixed-point resolver for one region's graph.
pub struct Reducer<'a> {
    tunables: &'a Tunables,
    priorities: &'a KindPriorities,
}

impl<'a> Reducer<'a> {
    pub fn new(tunables: &'a Tunables, priorities: &'a KindPriorities) -> Self {
        Self { tunables, priorities }
    }

    /// Run reduction passes until stable or until the iteration cap.
    ///
    /// Each pass: partition live interpretations into exclusion classes
    /// (override-covered pairs do not conflict), keep one survivor per
    /// class, then purge anything below its kind's minimum contextual grade.
    /// Removals change neighbors' contextual grades, hence the outer loop.
    pub fn reduce(&self, sig: &mut SymbolGraph) -> Reduction {
        let mut report = Reduction { passes: 0, removed: Vec::new(), converged: false };

        while report.passes < self.tunables.max_reduction_passes {
            report.passes += 1;
            let removed_this_pass = self.reduce_pass(sig, &mut report.removed);

            if removed_this_pass == 0 {
                report.converged = true;
                break;
            }
        }

        if !report.converged {
            warn!(
                passes = report.passes,
                region = %sig.region(),
                "reduction did not converge within the iteration cap, graph kept as-is"
            );
        }
        report
    }

    /// One full pass. Returns the number of removals it performed.
    fn reduce_pass(&self, sig: &mut SymbolGraph, removed: &mut Vec<InterId>) -> usize {
        sig.contextualize(self.tunables);
        let before = removed.len();

        // 1. Exclusion classes via union-find, skipping overridden pairs.
        let capacity = sig.live_inters().map(|i| i.id.0 as usize + 1).max().unwrap_or(0);
        let mut uf = UnionFind::new(capacity);
        for rel_id in sig.exclusions() {
            let Some(edge) = sig.relation(rel_id) else { continue };
            let (a, b) = (edge.src, edge.dst);
            if !sig.is_live(a) || !sig.is_live(b) {
                continue;
            }
            if sig.pair_has(a, b, RelationFilter::Overrides) {
                continue;
            }
            uf.union(a.0, b.0);
        }

        // Group members per class root, arena order throughout.
        let live: Vec<InterId> = sig.live_inters().map(|i| i.id).collect();
        let mut classes: Vec<Vec<InterId>> = vec![Vec::new(); capacity];
        for id in &live {
            classes[uf.find(id.0) as usize].push(*id);
        }

        // 2. One survivor per conflicting class.
        for members in classes.iter().filter(|c| c.len() > 1) {
            self.resolve_class(sig, members, removed);
        }

        // 3. Threshold purge, frozen exempt.
        for id in live {
            if !sig.is_live(id) {
                continue;
            }
            let Some(inter) = sig.inter(id) else { continue };
            if inter.frozen {
                continue;
            }
            let (kind, grade) = (inter.kind, inter.best_grade());
            if grade < self.tunables.min_contextual(kind) {
                debug!(%id, %kind, grade, "purged weak interpretation");
                sig.remove_vertex(id);
                removed.push(id);
            }
        }

        removed.len() - before
    }

    /// Pick the survivor(s) of one exclusion class and remove the rest.
    fn resolve_class(&self, sig: &mut SymbolGraph, members: &[InterId], removed: &mut Vec<InterId>) {
        let frozen: Vec<InterId> =
            members.iter().copied().filter(|id| sig.inter(*id).is_some_and(|i| i.frozen)).collect();

        let survivor = match frozen.len() {
            0 => Some(self.best_member(sig, members)),
            1 => Some(frozen[0]),
            _ => {
                // Conflicting user decisions: keep all of them, user intent
                // is authoritative.
                warn!(
                    region = %sig.region(),
                    frozen = ?frozen,
                    "multiple frozen interpretations in one exclusion class"
                );
                None
            }
        };

        for &id in members {
            let keep = survivor == Some(id) || sig.inter(id).is_some_and(|i| i.frozen);
            if !keep && sig.is_live(id) {
                sig.remove_vertex(id);
                removed.push(id);
            }
        }
    }

    /// Highest contextual grade, ties broken by kind priority, then by
    /// earliest-inserted id.
    fn best_member(&self, sig: &SymbolGraph, members: &[InterId]) -> InterId {
        let mut best = members[0];
        for &id in &members[1..] {
            let (Some(challenger), Some(champion)) = (sig.inter(id), sig.inter(best)) else {
                continue;
            };
            let better = challenger
                .best_grade()
                .partial_cmp(&champion.best_grade())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    self.priorities.rank(champion.kind).cmp(&self.priorities.rank(challenger.kind))
                })
                .then_with(|| champion.id.cmp(&challenger.id));
            if better == std::cmp::Ordering::Greater {
                best = id;
            }
        }
        best
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Bounds, ExclusionCause, Inter, InterKind, Relation, RegionId, SupportKind};
    use pretty_assertions::assert_eq;

    fn bounds(x: i32) -> Bounds {
        Bounds::new(x, 0, 10, 10)
    }

    fn setup() -> (SymbolGraph, Tunables, KindPriorities) {
        (SymbolGraph::new(RegionId(0)), Tunables::default(), KindPriorities::default())
    }

    #[test]
    fn test_exclusion_keeps_higher_grade() {
        let (mut sig, tunables, priorities) = setup();
        let a = sig.add_vertex(Inter::new(InterKind::Notehead, bounds(0), 0.9));
        let b = sig.add_vertex(Inter::new(InterKind::Rest, bounds(2), 0.6));
        sig.add_edge(a, b, Relation::exclusion(ExclusionCause::Overlap)).unwrap();

        let report = Reducer::new(&tunables, &priorities).reduce(&mut sig);

        assert!(report.converged);
        assert!(sig.is_live(a));
        assert!(!sig.is_live(b));
        assert_eq!(report.removed, vec![b]);
    }

    #[test]
    fn test_override_saves_both() {
        let (mut sig, tunables, priorities) = setup();
        let a = sig.add_vertex(Inter::new(InterKind::Notehead, bounds(0), 0.9));
        let b = sig.add_vertex(Inter::new(InterKind::Rest, bounds(2), 0.6));
        // The exclusion goes in first; the override still neutralizes it.
        sig.add_edge(a, b, Relation::exclusion(ExclusionCause::Overlap)).unwrap();
        sig.add_edge(a, b, Relation::NonExclusionOverride).unwrap();

        let report = Reducer::new(&tunables, &priorities).reduce(&mut sig);

        assert!(report.converged);
        assert!(sig.is_live(a));
        assert!(sig.is_live(b));
        assert!(report.removed.is_empty());
    }

    #[test]
    fn test_threshold_purge_without_exclusion() {
        let (mut sig, mut tunables, priorities) = setup();
        tunables.set_min_contextual(InterKind::Notehead, 0.65);

        let c = sig.add_vertex(Inter::new(InterKind::Notehead, bounds(0), 0.5));
        let d = sig.add_vertex(Inter::new(InterKind::Stem, bounds(20), 0.95));
        sig.add_edge(d, c, Relation::Support { kind: SupportKind::HeadStem, weight: 0.3 })
            .unwrap();

        let report = Reducer::new(&tunables, &priorities).reduce(&mut sig);

        // contextual(c) = 0.5 + 0.95 × 0.3 × 0.5 = 0.6425 < 0.65
        assert!(!sig.is_live(c));
        assert!(sig.is_live(d));
        assert!(report.removed.contains(&c));
    }

    #[test]
    fn test_frozen_member_survives_regardless_of_grade() {
        let (mut sig, tunables, priorities) = setup();
        let weak = sig.add_vertex(Inter::new(InterKind::Notehead, bounds(0), 0.2).frozen());
        let strong = sig.add_vertex(Inter::new(InterKind::Rest, bounds(2), 0.95));
        sig.add_edge(weak, strong, Relation::exclusion(ExclusionCause::Overlap)).unwrap();

        Reducer::new(&tunables, &priorities).reduce(&mut sig);

        assert!(sig.is_live(weak));
        assert!(!sig.is_live(strong));
    }

    #[test]
    fn test_two_frozen_members_both_kept() {
        let (mut sig, tunables, priorities) = setup();
        let a = sig.add_vertex(Inter::new(InterKind::Notehead, bounds(0), 0.5).frozen());
        let b = sig.add_vertex(Inter::new(InterKind::Rest, bounds(2), 0.6).frozen());
        let c = sig.add_vertex(Inter::new(InterKind::Flag, bounds(4), 0.4));
        sig.insert_exclusions(&[a, b, c], ExclusionCause::Overlap);

        Reducer::new(&tunables, &priorities).reduce(&mut sig);

        assert!(sig.is_live(a));
        assert!(sig.is_live(b));
        assert!(!sig.is_live(c));
    }

    #[test]
    fn test_grade_tie_falls_back_to_kind_priority_then_id() {
        let (mut sig, tunables, priorities) = setup();
        // Same grade; Barline outranks Word in the default priority order.
        let word = sig.add_vertex(Inter::new(InterKind::Word, bounds(0), 0.7));
        let bar = sig.add_vertex(Inter::new(InterKind::Barline, bounds(2), 0.7));
        sig.add_edge(word, bar, Relation::exclusion(ExclusionCause::SharedGlyph)).unwrap();

        Reducer::new(&tunables, &priorities).reduce(&mut sig);
        assert!(sig.is_live(bar));
        assert!(!sig.is_live(word));

        // Same grade, same kind: earliest-inserted wins.
        let (mut sig2, tunables2, priorities2) = setup();
        let first = sig2.add_vertex(Inter::new(InterKind::Barline, bounds(0), 0.7));
        let second = sig2.add_vertex(Inter::new(InterKind::Barline, bounds(2), 0.7));
        sig2.add_edge(first, second, Relation::exclusion(ExclusionCause::TooClose)).unwrap();

        Reducer::new(&tunables2, &priorities2).reduce(&mut sig2);
        assert!(sig2.is_live(first));
        assert!(!sig2.is_live(second));
    }

    #[test]
    fn test_reduce_is_idempotent() {
        let (mut sig, tunables, priorities) = setup();
        for i in 0..6 {
            sig.add_vertex(Inter::new(InterKind::Notehead, bounds(i * 3), 0.5 + 0.05 * i as f64));
        }
        let ids = sig.inters(InterKind::Notehead);
        sig.insert_exclusions(&ids[..3], ExclusionCause::Overlap);

        let reducer = Reducer::new(&tunables, &priorities);
        reducer.reduce(&mut sig);
        let stable: Vec<InterId> = sig.live_inters().map(|i| i.id).collect();
        let edges = sig.edge_count();

        let report = reducer.reduce(&mut sig);
        let after: Vec<InterId> = sig.live_inters().map(|i| i.id).collect();

        assert!(report.converged);
        assert_eq!(report.passes, 1);
        assert!(report.removed.is_empty());
        assert_eq!(stable, after);
        assert_eq!(edges, sig.edge_count());
    }

    #[test]
    fn test_iteration_cap_reports_non_convergence() {
        let (mut sig, mut tunables, priorities) = setup();
        tunables.max_reduction_passes = 1;
        tunables.set_min_contextual(InterKind::Notehead, 0.4);

        // A chain of supports where each removal re-exposes the next victim:
        // one pass cannot finish the cascade.
        let mut prev = sig.add_vertex(Inter::new(InterKind::Notehead, bounds(0), 0.35));
        for i in 1..5 {
            let next = sig.add_vertex(Inter::new(InterKind::Notehead, bounds(i * 12), 0.35));
            sig.add_edge(prev, next, Relation::Support { kind: SupportKind::BeamStem, weight: 0.5 })
                .unwrap();
            prev = next;
        }

        let report = Reducer::new(&tunables, &priorities).reduce(&mut sig);
        assert_eq!(report.passes, 1);
        assert!(!report.converged);
        // The graph survives in its last fully-computed state.
        assert!(sig.vertex_count() > 0);
    }
}
