//! Relation (edge) in the symbol graph.
//!
//! Three edge categories drive the arbitration: `Exclusion` (both ends cannot
//! be valid), `Support` (one end reinforces the other), and
//! `NonExclusionOverride` (a pair pinned as compatible, which beats any plain
//! exclusion between the same pair).

use serde::{Deserialize, Serialize};

use super::InterId;

/// Opaque relation identifier — an edge-arena handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelId(pub u32);

impl std::fmt::Display for RelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Why two interpretations exclude each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExclusionCause {
    /// Bounding regions overlap beyond tolerance.
    Overlap,
    /// Kinds cannot coexist at this location (e.g. two clefs on one staff).
    Incompatible,
    /// Too close to both be real (e.g. twin barlines).
    TooClose,
    /// Both interpretations claim the same source glyph.
    SharedGlyph,
}

impl ExclusionCause {
    pub fn name(&self) -> &'static str {
        match self {
            ExclusionCause::Overlap => "overlap",
            ExclusionCause::Incompatible => "incompatible",
            ExclusionCause::TooClose => "too-close",
            ExclusionCause::SharedGlyph => "shared-glyph",
        }
    }
}

/// The closed set of support relation kinds.
///
/// Each kind fixes three policies: edge direction, the default contribution
/// weight, and the maximum aggregate contribution ratio — the cap on the
/// summed contribution of ALL edges of this kind into one target, so
/// redundant evidence of the same type cannot compound unboundedly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SupportKind {
    /// Notehead ↔ stem attachment (directed stem → head).
    HeadStem,
    /// Beam ↔ stem crossing (directed beam → stem).
    BeamStem,
    /// Stem ↔ flag attachment (directed stem → flag).
    StemFlag,
    /// Accidental left of a notehead (directed accidental → head).
    HeadAccidental,
    /// Constituent membership in an ensemble (directed member → ensemble).
    ChordMember,
    /// Slur end anchored on a notehead (directed head → slur).
    SlurHead,
    /// Barlines aligned across staves (symmetric).
    BarConnection,
    /// Word belonging to a sentence (directed word → sentence).
    WordSentence,
}

impl SupportKind {
    pub const ALL: [SupportKind; 8] = [
        SupportKind::HeadStem,
        SupportKind::BeamStem,
        SupportKind::StemFlag,
        SupportKind::HeadAccidental,
        SupportKind::ChordMember,
        SupportKind::SlurHead,
        SupportKind::BarConnection,
        SupportKind::WordSentence,
    ];

    /// Symmetric kinds contribute to both endpoints; directed kinds only to
    /// the target.
    pub fn is_symmetric(&self) -> bool {
        matches!(self, SupportKind::BarConnection)
    }

    /// Exclusive kinds admit a single partner: the linker keeps only the
    /// best-affinity link. Non-exclusive kinds keep every acceptable link.
    pub fn is_exclusive(&self) -> bool {
        match self {
            SupportKind::HeadStem
            | SupportKind::StemFlag
            | SupportKind::HeadAccidental
            | SupportKind::SlurHead => true,
            SupportKind::BeamStem
            | SupportKind::ChordMember
            | SupportKind::BarConnection
            | SupportKind::WordSentence => false,
        }
    }

    pub fn default_weight(&self) -> f64 {
        match self {
            SupportKind::HeadStem => 0.5,
            SupportKind::BeamStem => 0.3,
            SupportKind::StemFlag => 0.3,
            SupportKind::HeadAccidental => 0.2,
            SupportKind::ChordMember => 0.3,
            SupportKind::SlurHead => 0.2,
            SupportKind::BarConnection => 0.4,
            SupportKind::WordSentence => 0.2,
        }
    }

    /// Default cap on the aggregate contribution of this kind into one
    /// target, regardless of how many edges of the kind exist.
    pub fn max_contribution(&self) -> f64 {
        match self {
            SupportKind::HeadStem => 0.6,
            SupportKind::BeamStem => 0.5,
            SupportKind::StemFlag => 0.4,
            SupportKind::HeadAccidental => 0.3,
            SupportKind::ChordMember => 0.5,
            SupportKind::SlurHead => 0.3,
            SupportKind::BarConnection => 0.5,
            SupportKind::WordSentence => 0.3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SupportKind::HeadStem => "head-stem",
            SupportKind::BeamStem => "beam-stem",
            SupportKind::StemFlag => "stem-flag",
            SupportKind::HeadAccidental => "head-accidental",
            SupportKind::ChordMember => "chord-member",
            SupportKind::SlurHead => "slur-head",
            SupportKind::BarConnection => "bar-connection",
            SupportKind::WordSentence => "word-sentence",
        }
    }

    pub fn from_name(name: &str) -> Option<SupportKind> {
        SupportKind::ALL.iter().copied().find(|k| k.name() == name)
    }
}

/// A typed relation value carried on an edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Relation {
    Exclusion { cause: ExclusionCause },
    Support { kind: SupportKind, weight: f64 },
    NonExclusionOverride,
}

impl Relation {
    /// Support with the kind's default weight.
    pub fn support(kind: SupportKind) -> Self {
        Relation::Support { kind, weight: kind.default_weight() }
    }

    pub fn exclusion(cause: ExclusionCause) -> Self {
        Relation::Exclusion { cause }
    }

    pub fn is_exclusion(&self) -> bool {
        matches!(self, Relation::Exclusion { .. })
    }

    pub fn is_support(&self) -> bool {
        matches!(self, Relation::Support { .. })
    }

    pub fn is_override(&self) -> bool {
        matches!(self, Relation::NonExclusionOverride)
    }

    /// Whether the edge means the same thing read from either end.
    pub fn is_symmetric(&self) -> bool {
        match self {
            Relation::Exclusion { .. } | Relation::NonExclusionOverride => true,
            Relation::Support { kind, .. } => kind.is_symmetric(),
        }
    }

    /// Duplicate identity: same category, and for supports the same kind.
    /// Weights and causes do not distinguish edges.
    pub fn same_type(&self, other: &Relation) -> bool {
        match (self, other) {
            (Relation::Exclusion { .. }, Relation::Exclusion { .. }) => true,
            (Relation::NonExclusionOverride, Relation::NonExclusionOverride) => true,
            (Relation::Support { kind: a, .. }, Relation::Support { kind: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Relation::Exclusion { cause } => write!(f, "Exclusion({})", cause.name()),
            Relation::Support { kind, weight } => write!(f, "Support({}, {weight})", kind.name()),
            Relation::NonExclusionOverride => write!(f, "NonExclusionOverride"),
        }
    }
}

/// A stored edge: relation value plus its endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationEdge {
    pub id: RelId,
    pub src: InterId,
    pub dst: InterId,
    pub relation: Relation,
    pub removed: bool,
}

impl RelationEdge {
    /// The "other" end of the edge from the given interpretation.
    pub fn other(&self, from: InterId) -> Option<InterId> {
        if from == self.src {
            Some(self.dst)
        } else if from == self.dst {
            Some(self.src)
        } else {
            None
        }
    }

    /// True when the edge joins exactly this unordered pair.
    pub fn joins(&self, a: InterId, b: InterId) -> bool {
        (self.src == a && self.dst == b) || (self.src == b && self.dst == a)
    }
}

/// Edge-category selector for typed queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationFilter {
    Exclusions,
    Supports,
    Overrides,
    Any,
}

impl RelationFilter {
    pub fn matches(&self, relation: &Relation) -> bool {
        match self {
            RelationFilter::Exclusions => relation.is_exclusion(),
            RelationFilter::Supports => relation.is_support(),
            RelationFilter::Overrides => relation.is_override(),
            RelationFilter::Any => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_type_distinguishes_support_kinds() {
        let a = Relation::support(SupportKind::HeadStem);
        let b = Relation::Support { kind: SupportKind::HeadStem, weight: 0.9 };
        let c = Relation::support(SupportKind::BeamStem);
        assert!(a.same_type(&b));
        assert!(!a.same_type(&c));
        assert!(!a.same_type(&Relation::NonExclusionOverride));
    }

    #[test]
    fn test_exclusions_share_type_across_causes() {
        let a = Relation::exclusion(ExclusionCause::Overlap);
        let b = Relation::exclusion(ExclusionCause::TooClose);
        assert!(a.same_type(&b));
    }

    #[test]
    fn test_edge_other_end() {
        let edge = RelationEdge {
            id: RelId(0),
            src: InterId(1),
            dst: InterId(2),
            relation: Relation::NonExclusionOverride,
            removed: false,
        };
        assert_eq!(edge.other(InterId(1)), Some(InterId(2)));
        assert_eq!(edge.other(InterId(2)), Some(InterId(1)));
        assert_eq!(edge.other(InterId(3)), None);
    }

    #[test]
    fn test_support_kind_name_round_trip() {
        for kind in SupportKind::ALL {
            assert_eq!(SupportKind::from_name(kind.name()), Some(kind));
        }
    }
}
