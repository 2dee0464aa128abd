//! Interpretation (vertex) in the symbol graph.
//!
//! An `Inter` is a single hypothesis about what a detected shape represents.
//! Its base grade comes from the producing detector and is never recomputed
//! here; the contextual grade is derived from the graph neighborhood.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::{Bounds, RegionId};

/// Opaque interpretation identifier — an arena handle within one region's
/// graph. Allocation order is creation order, which serves as the
/// deterministic tie-break of last resort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InterId(pub u32);

impl std::fmt::Display for InterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Weak back-reference to the source glyph an interpretation was built from.
/// Lookup only — the graph does not own glyphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GlyphId(pub u64);

impl std::fmt::Display for GlyphId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// The closed set of shape categories an interpretation can claim.
///
/// Exhaustively matched everywhere a per-kind table exists (influence table,
/// minimum grades, priorities) so that adding a kind is a compile error until
/// every table covers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InterKind {
    Notehead,
    Stem,
    Beam,
    Flag,
    Rest,
    Accidental,
    Clef,
    KeySignature,
    TimeSignature,
    Barline,
    Slur,
    Chord,
    Tuplet,
    Word,
    Sentence,
    Ending,
}

impl InterKind {
    /// All kinds, in declaration order.
    pub const ALL: [InterKind; 16] = [
        InterKind::Notehead,
        InterKind::Stem,
        InterKind::Beam,
        InterKind::Flag,
        InterKind::Rest,
        InterKind::Accidental,
        InterKind::Clef,
        InterKind::KeySignature,
        InterKind::TimeSignature,
        InterKind::Barline,
        InterKind::Slur,
        InterKind::Chord,
        InterKind::Tuplet,
        InterKind::Word,
        InterKind::Sentence,
        InterKind::Ending,
    ];

    /// Kinds whose instances are composites of other interpretations.
    pub fn is_ensemble(&self) -> bool {
        matches!(self, InterKind::Chord | InterKind::Sentence)
    }

    pub fn name(&self) -> &'static str {
        match self {
            InterKind::Notehead => "notehead",
            InterKind::Stem => "stem",
            InterKind::Beam => "beam",
            InterKind::Flag => "flag",
            InterKind::Rest => "rest",
            InterKind::Accidental => "accidental",
            InterKind::Clef => "clef",
            InterKind::KeySignature => "key-signature",
            InterKind::TimeSignature => "time-signature",
            InterKind::Barline => "barline",
            InterKind::Slur => "slur",
            InterKind::Chord => "chord",
            InterKind::Tuplet => "tuplet",
            InterKind::Word => "word",
            InterKind::Sentence => "sentence",
            InterKind::Ending => "ending",
        }
    }

    /// Inverse of `name()`, used when tunables address a kind by key.
    pub fn from_name(name: &str) -> Option<InterKind> {
        InterKind::ALL.iter().copied().find(|k| k.name() == name)
    }
}

impl std::fmt::Display for InterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Role of a text sentence. Only `PartName` makes a text edit relevant to
/// part structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextRole {
    Lyrics,
    PartName,
    Direction,
    Title,
}

/// One named sub-score contributing to a base grade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactItem {
    pub name: String,
    pub value: f64,
    pub weight: f64,
}

/// Breakdown of the sub-scores ("impacts") explaining a base grade.
///
/// Purely explanatory: the store never recomputes a base grade from its
/// breakdown, it only carries it for display and serialization.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GradeImpacts {
    pub items: SmallVec<[ImpactItem; 4]>,
}

impl GradeImpacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: f64, weight: f64) -> Self {
        self.items.push(ImpactItem { name: name.into(), value, weight });
        self
    }

    /// Weighted mean of the sub-scores.
    pub fn grade(&self) -> f64 {
        let total_weight: f64 = self.items.iter().map(|i| i.weight).sum();
        if total_weight <= 0.0 {
            return 0.0;
        }
        let sum: f64 = self.items.iter().map(|i| i.value * i.weight).sum();
        (sum / total_weight).clamp(0.0, 1.0)
    }
}

/// An interpretation: one hypothesis about a detected shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inter {
    /// Arena handle, assigned by the graph on insertion.
    pub id: InterId,
    pub kind: InterKind,
    pub bounds: Bounds,
    /// Base plausibility in [0, 1], supplied by the producer.
    pub grade: f64,
    /// Cached contextual grade; `None` until first computed.
    pub contextual: Option<f64>,
    /// Optional breakdown explaining the base grade.
    pub impacts: Option<GradeImpacts>,
    /// Role for text kinds (`Word`, `Sentence`).
    pub role: Option<TextRole>,
    /// Owning region, assigned by the graph on insertion.
    pub region: RegionId,
    pub removed: bool,
    /// A frozen interpretation reflects explicit user intent and is never
    /// auto-removed by the reducer.
    pub frozen: bool,
    pub glyph: Option<GlyphId>,
    /// Composite membership (e.g. notehead → chord).
    pub ensemble: Option<InterId>,
}

impl Inter {
    /// Build an interpretation not yet attached to any graph.
    /// `id` and `region` are stamped by `SymbolGraph::add_vertex`.
    pub fn new(kind: InterKind, bounds: Bounds, grade: f64) -> Self {
        Self {
            id: InterId(u32::MAX),
            kind,
            bounds,
            grade: grade.clamp(0.0, 1.0),
            contextual: None,
            impacts: None,
            role: None,
            region: RegionId(u32::MAX),
            removed: false,
            frozen: false,
            glyph: None,
            ensemble: None,
        }
    }

    pub fn with_impacts(mut self, impacts: GradeImpacts) -> Self {
        self.impacts = Some(impacts);
        self
    }

    pub fn with_role(mut self, role: TextRole) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_glyph(mut self, glyph: GlyphId) -> Self {
        self.glyph = Some(glyph);
        self
    }

    pub fn frozen(mut self) -> Self {
        self.frozen = true;
        self
    }

    /// Contextual grade when computed, else the base grade.
    pub fn best_grade(&self) -> f64 {
        self.contextual.unwrap_or(self.grade)
    }
}
