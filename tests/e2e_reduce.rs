//! End-to-end tests for the produce → relate → reduce flow.
//!
//! Each test drives the public API the way a candidate producer and the
//! pipeline driver would: vertices in, relations in, one reduction to a
//! stable subgraph.

use omr_sig::{
    Bounds, ExclusionCause, Inter, InterKind, KindPriorities, Reducer, Relation, RegionId,
    RelationFilter, SupportKind, SymbolGraph, Tunables,
};

fn bounds(x: i32) -> Bounds {
    Bounds::new(x, 0, 10, 10)
}

// ============================================================================
// 1. Plain exclusion: the stronger hypothesis survives
// ============================================================================

#[test]
fn test_exclusion_resolves_to_stronger_reading() {
    let mut sig = SymbolGraph::new(RegionId(0));
    let a = sig.add_vertex(Inter::new(InterKind::Notehead, bounds(0), 0.9));
    let b = sig.add_vertex(Inter::new(InterKind::Rest, bounds(2), 0.6));
    sig.add_edge(a, b, Relation::exclusion(ExclusionCause::Overlap)).unwrap();

    let tunables = Tunables::default();
    let priorities = KindPriorities::default();
    let report = Reducer::new(&tunables, &priorities).reduce(&mut sig);

    assert!(report.converged);
    assert!(sig.is_live(a));
    assert!(!sig.is_live(b));
    // The losing hypothesis takes its relations with it.
    assert!(sig.get_relations(a, RelationFilter::Any).is_empty());
}

// ============================================================================
// 2. Overridden exclusion: both hypotheses survive
// ============================================================================

#[test]
fn test_override_preserves_both_readings() {
    let mut sig = SymbolGraph::new(RegionId(0));
    let a = sig.add_vertex(Inter::new(InterKind::Notehead, bounds(0), 0.9));
    let b = sig.add_vertex(Inter::new(InterKind::Rest, bounds(2), 0.6));
    sig.add_edge(a, b, Relation::exclusion(ExclusionCause::Overlap)).unwrap();
    sig.add_edge(a, b, Relation::NonExclusionOverride).unwrap();

    let tunables = Tunables::default();
    let priorities = KindPriorities::default();
    Reducer::new(&tunables, &priorities).reduce(&mut sig);

    assert!(sig.is_live(a));
    assert!(sig.is_live(b));
}

// ============================================================================
// 3. Support changes the winner
// ============================================================================

#[test]
fn test_supported_underdog_beats_raw_grade() {
    let mut sig = SymbolGraph::new(RegionId(0));

    // A stem-backed notehead at base 0.6 against a lone rest at 0.7.
    let head = sig.add_vertex(Inter::new(InterKind::Notehead, bounds(0), 0.6));
    let rest = sig.add_vertex(Inter::new(InterKind::Rest, bounds(2), 0.7));
    let stem = sig.add_vertex(Inter::new(InterKind::Stem, bounds(20), 0.95));

    sig.add_edge(stem, head, Relation::Support { kind: SupportKind::HeadStem, weight: 0.5 })
        .unwrap();
    sig.add_edge(head, rest, Relation::exclusion(ExclusionCause::Overlap)).unwrap();

    let tunables = Tunables::default();
    let priorities = KindPriorities::default();
    Reducer::new(&tunables, &priorities).reduce(&mut sig);

    // contextual(head) = 0.6 + 0.95 × 0.5 × 0.4 = 0.79 > 0.7
    assert!(sig.is_live(head));
    assert!(sig.is_live(stem));
    assert!(!sig.is_live(rest));
}

// ============================================================================
// 4. Chained conflicts need multiple passes
// ============================================================================

#[test]
fn test_cascading_removal_reaches_fixed_point() {
    let mut sig = SymbolGraph::new(RegionId(0));
    let mut tunables = Tunables::default();
    tunables.set_min_contextual(InterKind::Beam, 0.4);

    // A beam kept alive only by a stem that loses its own exclusion fight.
    let stem = sig.add_vertex(Inter::new(InterKind::Stem, bounds(0), 0.5));
    let barline = sig.add_vertex(Inter::new(InterKind::Barline, bounds(1), 0.9));
    let beam = sig.add_vertex(Inter::new(InterKind::Beam, bounds(30), 0.3));

    sig.add_edge(stem, barline, Relation::exclusion(ExclusionCause::SharedGlyph)).unwrap();
    sig.add_edge(stem, beam, Relation::Support { kind: SupportKind::BeamStem, weight: 0.9 })
        .unwrap();

    let priorities = KindPriorities::default();
    let report = Reducer::new(&tunables, &priorities).reduce(&mut sig);

    assert!(report.converged);
    assert!(report.passes > 1);
    assert!(sig.is_live(barline));
    assert!(!sig.is_live(stem));
    // With its support gone the beam drops below its kind minimum.
    assert!(!sig.is_live(beam));
}

// ============================================================================
// 5. Ensemble collapses with its constituents
// ============================================================================

#[test]
fn test_reduction_invalidates_emptied_ensemble() {
    let mut sig = SymbolGraph::new(RegionId(0));
    let chord = sig.add_vertex(Inter::new(InterKind::Chord, bounds(0), 0.7));

    let mut head = Inter::new(InterKind::Notehead, bounds(0), 0.4);
    head.ensemble = Some(chord);
    let head = sig.add_vertex(head);

    let rest = sig.add_vertex(Inter::new(InterKind::Rest, bounds(2), 0.9));
    sig.add_edge(head, rest, Relation::exclusion(ExclusionCause::Overlap)).unwrap();

    let tunables = Tunables::default();
    let priorities = KindPriorities::default();
    Reducer::new(&tunables, &priorities).reduce(&mut sig);

    assert!(!sig.is_live(head));
    assert!(!sig.is_live(chord));
    assert!(sig.is_live(rest));
}

// ============================================================================
// 6. Mixed region: exclusion groups + thresholds together
// ============================================================================

#[test]
fn test_mixed_region_stabilizes() {
    let mut sig = SymbolGraph::new(RegionId(3));
    let mut tunables = Tunables::default();
    tunables.set_min_contextual(InterKind::Accidental, 0.35);

    // Three barline candidates for the same vertical line.
    let bars: Vec<_> = (0..3)
        .map(|i| {
            sig.add_vertex(Inter::new(InterKind::Barline, bounds(100), 0.5 + 0.1 * i as f64))
        })
        .collect();
    sig.insert_exclusions(&bars, ExclusionCause::TooClose);

    // A healthy head+stem pair.
    let head = sig.add_vertex(Inter::new(InterKind::Notehead, bounds(0), 0.8));
    let stem = sig.add_vertex(Inter::new(InterKind::Stem, bounds(10), 0.85));
    sig.add_edge(stem, head, Relation::support(SupportKind::HeadStem)).unwrap();

    // A weak accidental with nothing speaking for it.
    let weak = sig.add_vertex(Inter::new(InterKind::Accidental, bounds(60), 0.2));

    let priorities = KindPriorities::default();
    let report = Reducer::new(&tunables, &priorities).reduce(&mut sig);

    assert!(report.converged);
    assert_eq!(sig.inters(InterKind::Barline), vec![bars[2]]);
    assert!(sig.is_live(head) && sig.is_live(stem));
    assert!(!sig.is_live(weak));
    assert_eq!(sig.vertex_count(), 3);
}
