//! Engine configuration: canvas, thresholds, and the style guide.
//!
//! Everything here is supplied at construction and validated once —
//! `EngineConfig::validate` is the only place a `Configuration` error can
//! originate. After construction the config is shared read-only.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;
use crate::model::Canvas;

// ────────────────────────────────────────────────────────────────────────────
// Style guide
// ────────────────────────────────────────────────────────────────────────────

/// Semantic role a box plays for font-consistency purposes.
///
/// Inferred from slot role at bind time and from vertical position during
/// repair (top region of the canvas ⇒ title).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StyleRole {
    Title,
    Subtitle,
    Body,
    Caption,
}

/// One approved (role, family, size) combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleStyle {
    pub role: StyleRole,
    pub family: String,
    /// The approved size the fixer snaps to.
    pub size: u32,
    /// Readability floor for this role.
    pub min_size: u32,
}

/// Numeric style-guide thresholds, supplied at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleRules {
    pub approved_families: Vec<String>,
    pub role_styles: Vec<RoleStyle>,
    /// Max distinct families / sizes tolerated on one slide.
    pub max_families: usize,
    pub max_sizes: usize,
    pub max_bullets: usize,
    /// Total character cap across all boxes on a slide.
    pub max_chars: usize,
    pub max_boxes: usize,
    pub max_line_chars: usize,
    pub max_lines_per_box: usize,
    /// ALL-CAPS runs longer than this are a readability issue.
    pub max_caps_run: usize,
    /// Minimum clear gap between boxes, points.
    pub min_gap: f32,
}

impl Default for StyleRules {
    fn default() -> Self {
        StyleRules {
            approved_families: vec!["Arial".into(), "Calibri".into(), "Helvetica".into()],
            role_styles: vec![
                RoleStyle {
                    role: StyleRole::Title,
                    family: "Arial".into(),
                    size: 24,
                    min_size: 20,
                },
                RoleStyle {
                    role: StyleRole::Subtitle,
                    family: "Arial".into(),
                    size: 16,
                    min_size: 12,
                },
                RoleStyle {
                    role: StyleRole::Body,
                    family: "Calibri".into(),
                    size: 14,
                    min_size: 11,
                },
                RoleStyle {
                    role: StyleRole::Caption,
                    family: "Calibri".into(),
                    size: 10,
                    min_size: 9,
                },
            ],
            max_families: 2,
            max_sizes: 4,
            max_bullets: 5,
            max_chars: 500,
            max_boxes: 6,
            max_line_chars: 60,
            max_lines_per_box: 8,
            max_caps_run: 20,
            min_gap: 8.0,
        }
    }
}

impl StyleRules {
    /// Loads a rules override from JSON, e.g. a per-tenant style guide.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse style rules JSON")
    }

    pub fn style_for(&self, role: StyleRole) -> Option<&RoleStyle> {
        self.role_styles.iter().find(|r| r.role == role)
    }

    /// The lowest readability floor across roles — the slide-wide minimum.
    pub fn global_min_size(&self) -> u32 {
        self.role_styles
            .iter()
            .map(|r| r.min_size)
            .min()
            .unwrap_or(9)
    }

    pub fn is_approved_family(&self, family: &str) -> bool {
        self.approved_families
            .iter()
            .any(|f| f.eq_ignore_ascii_case(family))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Fix defaults
// ────────────────────────────────────────────────────────────────────────────

/// Defaults for the repair loop; callers may override per invocation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixDefaults {
    pub max_iterations: u32,
    pub aggressive: bool,
}

impl Default for FixDefaults {
    fn default() -> Self {
        FixDefaults {
            max_iterations: 3,
            aggressive: false,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Engine config
// ────────────────────────────────────────────────────────────────────────────

/// Full engine configuration. Validated once at engine construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub canvas: Canvas,
    /// Comfort clearance from canvas edges, points. Distinct from the hard
    /// canvas bounds: violating this is a Margin issue, not OutOfBounds.
    pub margin: f32,
    /// Overlap area below this (square points) is tolerated.
    pub overlap_epsilon: f32,
    /// Text may exceed its frame height by this much (points).
    pub overflow_epsilon: f32,
    pub line_spacing: f32,
    /// Bounded measurement-cache capacity (entries).
    pub cache_capacity: usize,
    /// Smallest box the fixer may produce when clamping or shrinking.
    pub min_box_width: f32,
    pub min_box_height: f32,
    pub style: StyleRules,
    pub fix: FixDefaults,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            canvas: Canvas::DEFAULT,
            margin: 36.0,
            overlap_epsilon: 5.0,
            overflow_epsilon: 0.5,
            line_spacing: 1.2,
            cache_capacity: 1024,
            min_box_width: 40.0,
            min_box_height: 20.0,
            style: StyleRules::default(),
            fix: FixDefaults::default(),
        }
    }
}

impl EngineConfig {
    /// Rejects configurations the engine cannot operate under.
    pub fn validate(&self) -> std::result::Result<(), EngineError> {
        if self.canvas.width <= 0.0 || self.canvas.height <= 0.0 {
            return Err(EngineError::Configuration(format!(
                "canvas must be positive, got {}x{}",
                self.canvas.width, self.canvas.height
            )));
        }
        if self.margin < 0.0 || self.margin * 2.0 >= self.canvas.width.min(self.canvas.height) {
            return Err(EngineError::Configuration(format!(
                "margin {} does not fit the canvas",
                self.margin
            )));
        }
        if self.line_spacing <= 0.0 {
            return Err(EngineError::Configuration(
                "line_spacing must be positive".into(),
            ));
        }
        if self.cache_capacity == 0 {
            return Err(EngineError::Configuration(
                "cache_capacity must be at least 1".into(),
            ));
        }
        if self.min_box_width <= 0.0 || self.min_box_height <= 0.0 {
            return Err(EngineError::Configuration(
                "minimum box dimensions must be positive".into(),
            ));
        }
        if self.style.approved_families.is_empty() {
            return Err(EngineError::Configuration(
                "approved font whitelist is empty".into(),
            ));
        }
        if self.style.role_styles.is_empty() {
            return Err(EngineError::Configuration(
                "no approved role styles configured".into(),
            ));
        }
        for rs in &self.style.role_styles {
            if rs.min_size == 0 || rs.min_size > rs.size {
                return Err(EngineError::Configuration(format!(
                    "role {:?}: min size {} exceeds approved size {}",
                    rs.role, rs.min_size, rs.size
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_inverted_font_range_rejected() {
        let mut config = EngineConfig::default();
        config.style.role_styles[0].min_size = 30; // above the approved 24pt
        let err = config.validate().unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
    }

    #[test]
    fn test_empty_whitelist_rejected() {
        let mut config = EngineConfig::default();
        config.style.approved_families.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_margin_rejected() {
        let mut config = EngineConfig::default();
        config.margin = 400.0; // 2×400 exceeds the 540pt canvas height
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_style_rules_json_round_trip() {
        let rules = StyleRules::default();
        let json = serde_json::to_string(&rules).unwrap();
        let parsed = StyleRules::from_json_str(&json).unwrap();
        assert_eq!(parsed, rules);
    }

    #[test]
    fn test_style_rules_bad_json_has_context() {
        let err = StyleRules::from_json_str("{not json").unwrap_err();
        assert!(err.to_string().contains("style rules"));
    }

    #[test]
    fn test_global_min_size_is_lowest_floor() {
        let rules = StyleRules::default();
        assert_eq!(rules.global_min_size(), 9);
    }

    #[test]
    fn test_family_approval_case_insensitive() {
        let rules = StyleRules::default();
        assert!(rules.is_approved_family("arial"));
        assert!(!rules.is_approved_family("Comic Sans MS"));
    }
}
