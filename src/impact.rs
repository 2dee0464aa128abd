//! # Impact Planner
//!
//! Maps a batch of interactive edits to the minimal set of downstream
//! recomputation passes, per page. The influence table is total over the
//! closed kind enums, so a new kind cannot ship without declaring what it
//! invalidates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{InterKind, PageId, Relation, SupportKind, TextRole};

// ============================================================================
// Categories
// ============================================================================

/// Downstream derived structures a pass can rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    Parts,
    Slurs,
    Lyrics,
    Voices,
    Measures,
}

/// Fixed execution order for downstream passes: part/measure boundary
/// changes can invalidate slur/voice results but not vice versa.
pub const PASS_ORDER: [Category; 5] =
    [Category::Parts, Category::Measures, Category::Slurs, Category::Lyrics, Category::Voices];

/// Boolean vector over the five recomputation categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImpactVector {
    pub parts: bool,
    pub slurs: bool,
    pub lyrics: bool,
    pub voices: bool,
    pub measures: bool,
}

impl ImpactVector {
    pub const NONE: ImpactVector =
        ImpactVector { parts: false, slurs: false, lyrics: false, voices: false, measures: false };

    pub const ALL: ImpactVector =
        ImpactVector { parts: true, slurs: true, lyrics: true, voices: true, measures: true };

    pub fn contains(&self, category: Category) -> bool {
        match category {
            Category::Parts => self.parts,
            Category::Slurs => self.slurs,
            Category::Lyrics => self.lyrics,
            Category::Voices => self.voices,
            Category::Measures => self.measures,
        }
    }

    pub fn union(self, other: ImpactVector) -> ImpactVector {
        ImpactVector {
            parts: self.parts || other.parts,
            slurs: self.slurs || other.slurs,
            lyrics: self.lyrics || other.lyrics,
            voices: self.voices || other.voices,
            measures: self.measures || other.measures,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == ImpactVector::NONE
    }

    /// Voice assignment feeds measure-level specials, so influence on voices
    /// forces influence on measures.
    pub fn normalized(mut self) -> ImpactVector {
        if self.voices {
            self.measures = true;
        }
        self
    }

    /// Flagged categories in downstream execution order.
    pub fn passes(&self) -> Vec<Category> {
        PASS_ORDER.iter().copied().filter(|c| self.contains(*c)).collect()
    }
}

// ============================================================================
// Edits
// ============================================================================

/// How an edit batch is being applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpKind {
    Do,
    Undo,
    Redo,
}

/// One tagged edit, carrying exactly the kind information the influence
/// table needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EditRecord {
    /// An interpretation of some kind was added, moved, or deleted.
    Inter { kind: InterKind, role: Option<TextRole>, page: PageId },
    /// A relation was added or deleted.
    Relation { relation: Relation, page: PageId },
    /// A measure-stack-level edit.
    Stack { page: PageId },
    /// A page-level edit (e.g. page reprocessing).
    Page { page: PageId },
    /// Two regions were merged across a boundary.
    RegionMerge { page: PageId },
    /// An explicit cross-region connection edit (e.g. slur reconnection).
    Connection { page: PageId },
}

impl EditRecord {
    pub fn page(&self) -> PageId {
        match self {
            EditRecord::Inter { page, .. }
            | EditRecord::Relation { page, .. }
            | EditRecord::Stack { page }
            | EditRecord::Page { page }
            | EditRecord::RegionMerge { page }
            | EditRecord::Connection { page } => *page,
        }
    }
}

/// An ordered batch of edits applied as one user action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditBatch {
    pub records: Vec<EditRecord>,
}

impl EditBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: EditRecord) -> &mut Self {
        self.records.push(record);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ============================================================================
// Influence table
// ============================================================================

/// What editing an interpretation of this kind can invalidate.
pub fn influence_of_kind(kind: InterKind) -> ImpactVector {
    let mut v = ImpactVector::NONE;
    match kind {
        InterKind::Notehead
        | InterKind::Stem
        | InterKind::Beam
        | InterKind::Flag
        | InterKind::Rest
        | InterKind::Chord
        | InterKind::Tuplet
        | InterKind::TimeSignature => v.voices = true,
        InterKind::Barline | InterKind::Ending => v.measures = true,
        InterKind::Slur => v.slurs = true,
        InterKind::Word | InterKind::Sentence => v.lyrics = true,
        // Pitch-only kinds rebuild nothing downstream of the graph itself.
        InterKind::Accidental | InterKind::Clef | InterKind::KeySignature => {}
    }
    v.normalized()
}

/// What editing a relation can invalidate. Supports map through their kind;
/// exclusions and overrides change which interpretations survive, so they
/// conservatively flag everything.
pub fn influence_of_relation(relation: &Relation) -> ImpactVector {
    let mut v = ImpactVector::NONE;
    match relation {
        Relation::Exclusion { .. } | Relation::NonExclusionOverride => return ImpactVector::ALL,
        Relation::Support { kind, .. } => match kind {
            SupportKind::HeadStem
            | SupportKind::BeamStem
            | SupportKind::StemFlag
            | SupportKind::ChordMember => v.voices = true,
            SupportKind::BarConnection => v.measures = true,
            SupportKind::SlurHead => v.slurs = true,
            SupportKind::WordSentence => v.lyrics = true,
            SupportKind::HeadAccidental => {}
        },
    }
    v.normalized()
}

fn influence_of(record: &EditRecord) -> ImpactVector {
    match record {
        EditRecord::Inter { kind, role, .. } => {
            let mut v = influence_of_kind(*kind);
            // Text influences part structure only when the sentence is
            // specifically a part-name label.
            if matches!(kind, InterKind::Word | InterKind::Sentence)
                && *role == Some(TextRole::PartName)
            {
                v.parts = true;
            }
            v.normalized()
        }
        EditRecord::Relation { relation, .. } => influence_of_relation(relation),
        EditRecord::Stack { .. } => {
            ImpactVector { voices: true, measures: true, ..ImpactVector::NONE }
        }
        EditRecord::Connection { .. } => ImpactVector { slurs: true, ..ImpactVector::NONE },
        // Page-wide changes conservatively flag every category.
        EditRecord::Page { .. } | EditRecord::RegionMerge { .. } => ImpactVector::ALL,
    }
}

// ============================================================================
// Planner
// ============================================================================

/// Classify an edit batch into per-page impact vectors.
///
/// `op_kind` does not change the classification — undoing an edit
/// invalidates the same derived structures as doing it — but it is part of
/// the editor contract and recorded for tracing.
pub fn impact(batch: &EditBatch, op_kind: OpKind) -> BTreeMap<PageId, ImpactVector> {
    let mut per_page: BTreeMap<PageId, ImpactVector> = BTreeMap::new();

    for record in &batch.records {
        let v = influence_of(record);
        let entry = per_page.entry(record.page()).or_default();
        *entry = entry.union(v);
    }

    debug!(?op_kind, pages = per_page.len(), "classified edit batch");
    per_page
}

// ============================================================================
// Tests
// ============================================================================
