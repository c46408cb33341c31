//! Damage assessment
//!
//! Scores how badly a vehicle is damaged from the claim photos, tags the
//! kinds of damage seen and estimates the repair cost.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{Currency, ImageId, Money};

use crate::claim::Angle;
use crate::scoring::ScoringImage;
use crate::signals::{seeded_range, seeded_unit, ImageSignals};

/// Note attached to an assessment of an empty image set
pub const NO_IMAGES_NOTE: &str = "No images provided for analysis";

pub const COST_UNAVAILABLE_NOTE: &str = "Repair cost could not be totalled; estimate set to zero";

/// Damage severity category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    None,
    Minor,
    Moderate,
    Major,
    TotalLoss,
}

impl Severity {
    /// Maps a damage score to a severity
    ///
    /// Breakpoints are inclusive on the upper side.
    pub fn from_score(score: f64) -> Self {
        if score <= 0.25 {
            Severity::Minor
        } else if score <= 0.5 {
            Severity::Moderate
        } else if score <= 0.75 {
            Severity::Major
        } else {
            Severity::TotalLoss
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Minor => "minor",
            Severity::Moderate => "moderate",
            Severity::Major => "major",
            Severity::TotalLoss => "total_loss",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kinds of damage the scorer can tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DamageType {
    Scratch,
    Dent,
    BrokenHeadlight,
    CrackedWindshield,
    BumperDamage,
    DoorDamage,
    MirrorDamage,
    PaintDamage,
}

impl DamageType {
    pub const ALL: [DamageType; 8] = [
        DamageType::Scratch,
        DamageType::Dent,
        DamageType::BrokenHeadlight,
        DamageType::CrackedWindshield,
        DamageType::BumperDamage,
        DamageType::DoorDamage,
        DamageType::MirrorDamage,
        DamageType::PaintDamage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DamageType::Scratch => "scratch",
            DamageType::Dent => "dent",
            DamageType::BrokenHeadlight => "broken_headlight",
            DamageType::CrackedWindshield => "cracked_windshield",
            DamageType::BumperDamage => "bumper_damage",
            DamageType::DoorDamage => "door_damage",
            DamageType::MirrorDamage => "mirror_damage",
            DamageType::PaintDamage => "paint_damage",
        }
    }

    /// Base repair cost in whole currency units
    pub fn base_cost(&self) -> f64 {
        match self {
            DamageType::Scratch => 500.0,
            DamageType::Dent => 1200.0,
            DamageType::BrokenHeadlight => 800.0,
            DamageType::CrackedWindshield => 600.0,
            DamageType::BumperDamage => 2000.0,
            DamageType::DoorDamage => 1500.0,
            DamageType::MirrorDamage => 400.0,
            DamageType::PaintDamage => 1000.0,
        }
    }

    /// Human-readable explanation
    pub fn explanation(&self) -> &'static str {
        match self {
            DamageType::Scratch => "Surface level damage to paint or clear coat",
            DamageType::Dent => "Physical deformation of metal body panels",
            DamageType::BrokenHeadlight => "Damaged or shattered headlight assembly",
            DamageType::CrackedWindshield => "Cracks or chips in windshield glass",
            DamageType::BumperDamage => "Impact damage to front or rear bumper",
            DamageType::DoorDamage => "Damage to door panels or mechanisms",
            DamageType::MirrorDamage => "Broken or damaged side mirrors",
            DamageType::PaintDamage => "Scratches, chips, or fading in vehicle paint",
        }
    }
}

impl fmt::Display for DamageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Damage result for a single image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDamage {
    pub image_id: ImageId,
    pub angle: Angle,
    pub damage_score: f64,
    pub damages: Vec<DamageType>,
    pub cost_estimate: Money,
    pub confidence: f64,
    pub signals: ImageSignals,
}

/// Claim-level damage assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageAssessment {
    pub damage_score: f64,
    pub severity: Severity,
    /// Damage tags in detection order, without repeats
    pub detected_damages: Vec<DamageType>,
    pub cost_estimate: Money,
    pub confidence: f64,
    pub images_analyzed: usize,
    pub images_skipped: usize,
    pub recommendations: Vec<String>,
    pub note: Option<String>,
    pub per_image: Vec<ImageDamage>,
    pub assessed_at: DateTime<Utc>,
}

impl DamageAssessment {
    /// Assessment of an empty image set
    pub fn empty(currency: Currency) -> Self {
        Self {
            damage_score: 0.0,
            severity: Severity::None,
            detected_damages: Vec::new(),
            cost_estimate: Money::zero(currency),
            confidence: 0.0,
            images_analyzed: 0,
            images_skipped: 0,
            recommendations: vec![NO_IMAGES_NOTE.to_string()],
            note: Some(NO_IMAGES_NOTE.to_string()),
            per_image: Vec::new(),
            assessed_at: Utc::now(),
        }
    }
}

/// Pluggable damage scorer
///
/// Implementations are CPU-bound and synchronous; callers run them on the
/// blocking pool.
pub trait DamageScorer: Send + Sync {
    fn assess(&self, images: &[ScoringImage]) -> DamageAssessment;
}

/// Heuristic scorer driven by edge density and colour variance
#[derive(Debug, Clone)]
pub struct HeuristicDamageScorer {
    currency: Currency,
}

impl HeuristicDamageScorer {
    pub fn new(currency: Currency) -> Self {
        Self { currency }
    }

    /// Scores one image from its signals and content hash
    pub fn score_image(&self, image: &ScoringImage, signals: ImageSignals) -> ImageDamage {
        let hash = image.content_hash.as_str();

        let base = f64::min(signals.edge_density * 2.0 + signals.color_variance / 10_000.0, 0.9);
        let damage_score = (base + seeded_range(hash, "damage.score", -0.2, 0.3)).clamp(0.1, 1.0);

        let count = usize::min((damage_score * 4.0).floor() as usize + 1, DamageType::ALL.len());
        let mut order = DamageType::ALL;
        order.sort_by(|a, b| {
            let ka = seeded_unit(hash, &format!("damage.tag.{}", a));
            let kb = seeded_unit(hash, &format!("damage.tag.{}", b));
            ka.total_cmp(&kb)
        });
        let damages: Vec<DamageType> = order[..count].to_vec();

        let cost: f64 = damages
            .iter()
            .map(|d| {
                let adj = seeded_range(hash, &format!("damage.cost.{}", d), -0.3, 0.5);
                d.base_cost() * (1.0 + adj)
            })
            .sum();

        let confidence = 0.7 + 0.3 * (1.0 - (0.5 - damage_score).abs() * 2.0);

        ImageDamage {
            image_id: image.image_id,
            angle: image.angle,
            damage_score,
            damages,
            cost_estimate: Money::estimate(cost, self.currency),
            confidence,
            signals,
        }
    }
}

impl DamageScorer for HeuristicDamageScorer {
    fn assess(&self, images: &[ScoringImage]) -> DamageAssessment {
        if images.is_empty() {
            return DamageAssessment::empty(self.currency);
        }

        let mut per_image = Vec::with_capacity(images.len());
        let mut skipped = 0;
        for image in images {
            match ImageSignals::from_bytes(&image.bytes) {
                Ok(signals) => per_image.push(self.score_image(image, signals)),
                Err(err) => {
                    tracing::warn!(image_id = %image.image_id, error = %err, "Skipping undecodable image in damage assessment");
                    skipped += 1;
                }
            }
        }

        if per_image.is_empty() {
            let mut empty = DamageAssessment::empty(self.currency);
            empty.images_skipped = skipped;
            return empty;
        }

        let n = per_image.len() as f64;
        let damage_score = (per_image.iter().map(|d| d.damage_score).sum::<f64>() / n).clamp(0.0, 1.0);
        let confidence = per_image.iter().map(|d| d.confidence).sum::<f64>() / n;
        let (cost_estimate, note) = total_estimate(self.currency, &per_image);

        let mut detected_damages = Vec::new();
        for d in per_image.iter().flat_map(|d| d.damages.iter()) {
            if !detected_damages.contains(d) {
                detected_damages.push(*d);
            }
        }

        let severity = Severity::from_score(damage_score);

        DamageAssessment {
            damage_score,
            severity,
            recommendations: recommendations(severity, &detected_damages),
            detected_damages,
            cost_estimate,
            confidence,
            images_analyzed: per_image.len(),
            images_skipped: skipped,
            note,
            per_image,
            assessed_at: Utc::now(),
        }
    }
}

/// Sum of the per-image estimates
///
/// A sum that cannot be formed is logged and reported as zero with
/// [`COST_UNAVAILABLE_NOTE`].
fn total_estimate(currency: Currency, per_image: &[ImageDamage]) -> (Money, Option<String>) {
    match Money::total(currency, per_image.iter().map(|d| &d.cost_estimate)) {
        Ok(total) => (total, None),
        Err(err) => {
            tracing::warn!(currency = ?currency, images = per_image.len(), error = %err, "Failed to total repair cost estimates");
            (Money::zero(currency), Some(COST_UNAVAILABLE_NOTE.to_string()))
        }
    }
}

/// Repair recommendations for a severity and set of damage tags
pub fn recommendations(severity: Severity, damages: &[DamageType]) -> Vec<String> {
    let mut out: Vec<&str> = match severity {
        Severity::None => vec![NO_IMAGES_NOTE],
        Severity::Minor => vec![
            "Quick repair recommended at authorized service center",
            "Claim likely to be processed quickly",
        ],
        Severity::Moderate => vec![
            "Professional assessment required",
            "Multiple repair sessions may be needed",
        ],
        Severity::Major => vec![
            "Comprehensive repair required",
            "Consider alternative transportation during repair",
        ],
        Severity::TotalLoss => vec![
            "Vehicle may be declared total loss",
            "Salvage evaluation recommended",
        ],
    };

    if damages.contains(&DamageType::BrokenHeadlight) {
        out.push("Replace headlight assembly for safety");
    }
    if damages.contains(&DamageType::CrackedWindshield) {
        out.push("Windshield replacement urgent for visibility");
    }
    if damages.contains(&DamageType::BumperDamage) {
        out.push("Structural integrity check recommended");
    }

    out.into_iter().map(String::from).collect()
}
