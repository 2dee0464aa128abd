//! # Grade Model
//!
//! Base grades are producer-supplied and never recomputed here. The
//! contextual grade of an interpretation folds in the support it receives
//! from its graph neighborhood through a saturating sum:
//!
//! ```text
//! contextual(X) = clip(base(X) + contribution × (1 − base(X)), 0, 1)
//! contribution  = Σ over support kinds  min(Σ partner_grade × weight, cap(kind))
//! ```
//!
//! Strong support cannot push an excellent base past 1, and the per-kind cap
//! keeps redundant evidence of one type from compounding unboundedly.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::model::{InterKind, SupportKind};
use crate::{Error, Result};

/// Saturating combination of a base grade with a support contribution.
pub fn contextual(base: f64, contribution: f64) -> f64 {
    (base + contribution * (1.0 - base)).clamp(0.0, 1.0)
}

// ============================================================================
// Tunables
// ============================================================================

/// Numeric knobs for the arbitration core. Key/value addressable so hosts can
/// expose them as plain preferences — no wire format is defined here.
///
/// Recognized keys:
///
/// | Key | Meaning |
/// |-----|---------|
/// | `reduce.max_passes` | reducer iteration cap |
/// | `link.min_affinity` | minimum affinity for non-exclusive links |
/// | `pipeline.region_workers` | parallel region worker count |
/// | `grade.min_contextual` | default minimum contextual grade |
/// | `grade.min_contextual.<inter-kind>` | per-kind minimum |
/// | `grade.max_support.<support-kind>` | per-kind aggregate contribution cap |
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tunables {
    /// Fallback minimum contextual grade for kinds without an override.
    pub default_min_contextual: f64,
    min_contextual: HashMap<InterKind, f64>,
    max_support: HashMap<SupportKind, f64>,
    /// Iteration cap for the reduction fixed point.
    pub max_reduction_passes: usize,
    /// Minimum affinity for keeping a non-exclusive link.
    pub min_affinity: f64,
    /// Worker threads for parallel region processing.
    pub region_workers: usize,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            default_min_contextual: 0.1,
            min_contextual: HashMap::new(),
            max_support: HashMap::new(),
            max_reduction_passes: 10,
            min_affinity: 0.2,
            region_workers: 4,
        }
    }
}

impl Tunables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Minimum acceptable contextual grade for a kind. Falling below makes an
    /// interpretation a removal candidate regardless of exclusion membership.
    pub fn min_contextual(&self, kind: InterKind) -> f64 {
        self.min_contextual.get(&kind).copied().unwrap_or(self.default_min_contextual)
    }

    pub fn set_min_contextual(&mut self, kind: InterKind, grade: f64) {
        self.min_contextual.insert(kind, grade.clamp(0.0, 1.0));
    }

    /// Aggregate contribution cap for one support kind into one target.
    pub fn max_support(&self, kind: SupportKind) -> f64 {
        self.max_support.get(&kind).copied().unwrap_or_else(|| kind.max_contribution())
    }

    pub fn set_max_support(&mut self, kind: SupportKind, cap: f64) {
        self.max_support.insert(kind, cap.max(0.0));
    }

    /// Apply one key/value parameter. Unknown keys are configuration errors:
    /// they abort the current step rather than being silently dropped.
    pub fn set(&mut self, key: &str, value: f64) -> Result<()> {
        match key {
            "reduce.max_passes" => {
                self.max_reduction_passes = value.max(1.0) as usize;
                return Ok(());
            }
            "link.min_affinity" => {
                self.min_affinity = value.clamp(0.0, 1.0);
                return Ok(());
            }
            "pipeline.region_workers" => {
                self.region_workers = value.max(1.0) as usize;
                return Ok(());
            }
            "grade.min_contextual" => {
                self.default_min_contextual = value.clamp(0.0, 1.0);
                return Ok(());
            }
            _ => {}
        }

        if let Some(name) = key.strip_prefix("grade.min_contextual.") {
            let kind = InterKind::from_name(name).ok_or_else(|| Error::Config {
                key: key.to_string(),
                message: format!("unrecognized interpretation kind '{name}'"),
            })?;
            self.set_min_contextual(kind, value);
            return Ok(());
        }

        if let Some(name) = key.strip_prefix("grade.max_support.") {
            let kind = SupportKind::from_name(name).ok_or_else(|| Error::Config {
                key: key.to_string(),
                message: format!("unrecognized relation kind '{name}'"),
            })?;
            self.set_max_support(kind, value);
            return Ok(());
        }

        Err(Error::Config { key: key.to_string(), message: "unknown parameter".into() })
    }
}

// ============================================================================
// Kind priorities
// ============================================================================

/// Externally supplied total order over interpretation kinds, used as the
/// tie-break when two competing interpretations have equal contextual grade.
///
/// The default ranks page-skeleton kinds (barlines, clefs, signatures) above
/// note material, above ornaments and text. Hosts may replace the order
/// wholesale; kinds missing from a custom order sort last, by declaration
/// order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindPriorities {
    order: Vec<InterKind>,
}

impl Default for KindPriorities {
    fn default() -> Self {
        Self {
            order: vec![
                InterKind::Barline,
                InterKind::Clef,
                InterKind::KeySignature,
                InterKind::TimeSignature,
                InterKind::Notehead,
                InterKind::Stem,
                InterKind::Beam,
                InterKind::Chord,
                InterKind::Rest,
                InterKind::Flag,
                InterKind::Accidental,
                InterKind::Tuplet,
                InterKind::Slur,
                InterKind::Ending,
                InterKind::Sentence,
                InterKind::Word,
            ],
        }
    }
}

impl KindPriorities {
    pub fn new(order: Vec<InterKind>) -> Self {
        Self { order }
    }

    /// Rank of a kind: lower wins ties. Kinds absent from the order rank
    /// after every listed kind, in declaration order.
    pub fn rank(&self, kind: InterKind) -> usize {
        self.order.iter().position(|k| *k == kind).unwrap_or_else(|| {
            self.order.len()
                + InterKind::ALL.iter().position(|k| *k == kind).unwrap_or(InterKind::ALL.len())
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
