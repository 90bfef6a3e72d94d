//! Per-slide geometric state passed between engine stages.
//!
//! `SlideGeometryModel` is created by the applier, scanned by the validator,
//! repaired in place by the fixer, and finally handed (read-only) to the
//! external serializer. All geometry is in points; the default canvas is the
//! 16:9 deck at 960 × 540 pt.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::library::SlotRole;
use crate::validator::ValidationIssue;

// ────────────────────────────────────────────────────────────────────────────
// Geometry
// ────────────────────────────────────────────────────────────────────────────

/// Axis-aligned rectangle in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Rect { x, y, w, h }
    }

    pub fn right(&self) -> f32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.h
    }

    pub fn area(&self) -> f32 {
        self.w * self.h
    }

    /// Intersection area with another rect; 0.0 when disjoint.
    pub fn overlap_area(&self, other: &Rect) -> f32 {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right > left && bottom > top {
            (right - left) * (bottom - top)
        } else {
            0.0
        }
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.overlap_area(other) > 0.0
    }
}

/// Canvas dimensions in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Canvas {
    pub width: f32,
    pub height: f32,
}

impl Canvas {
    /// 16:9 deck, 13.33" × 7.5" at 72 dpi.
    pub const DEFAULT: Canvas = Canvas {
        width: 960.0,
        height: 540.0,
    };

    pub fn contains(&self, rect: &Rect) -> bool {
        rect.x >= 0.0 && rect.y >= 0.0 && rect.right() <= self.width && rect.bottom() <= self.height
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Fitted boxes
// ────────────────────────────────────────────────────────────────────────────

/// Concrete, per-slide instantiation of a template slot after text fitting.
///
/// Owned exclusively by its `SlideGeometryModel`; created by the applier,
/// mutated only by the fixer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedBox {
    pub id: Uuid,
    pub role: SlotRole,
    pub frame: Rect,
    /// Resolved source text (pre-wrap, post-truncation).
    pub text: String,
    /// Wrapped lines at the resolved font size.
    pub lines: Vec<String>,
    pub font_family: String,
    pub font_size: u32,
    pub bold: bool,
    /// Slot-configured font range the fixer must stay within.
    pub size_min: u32,
    pub size_max: u32,
    pub truncated: bool,
    /// True when the slot's source field was absent and an empty placeholder
    /// was bound instead.
    pub placeholder: bool,
    /// 0.0 – 1.0; 1.0 = fit without truncation or overflow.
    pub fit_confidence: f32,
}

impl FittedBox {
    /// Height the wrapped text actually needs at the current font size.
    pub fn text_height(&self, line_spacing: f32) -> f32 {
        self.lines.len() as f32 * self.font_size as f32 * line_spacing
    }

    /// True for boxes playing a title role on the slide.
    pub fn is_title(&self) -> bool {
        matches!(self.role, SlotRole::Headline | SlotRole::Subtitle)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Slide model
// ────────────────────────────────────────────────────────────────────────────

/// The full geometric state of one slide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideGeometryModel {
    pub id: Uuid,
    pub template_id: String,
    pub canvas: Canvas,
    /// Classifier complexity in [0, 1].
    pub complexity: f32,
    pub boxes: Vec<FittedBox>,
    /// Recovered binding problems (absent fields bound as placeholders).
    /// Merged into every `ValidationResult` for this model.
    pub binding_issues: Vec<ValidationIssue>,
}

impl SlideGeometryModel {
    pub fn box_by_id(&self, id: Uuid) -> Option<&FittedBox> {
        self.boxes.iter().find(|b| b.id == id)
    }

    pub fn box_index(&self, id: Uuid) -> Option<usize> {
        self.boxes.iter().position(|b| b.id == id)
    }
}
