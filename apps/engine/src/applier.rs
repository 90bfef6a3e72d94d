//! Binds a content block + chosen template into a concrete slide model.
//!
//! Every slot yields exactly one `FittedBox` — absent source fields bind an
//! empty placeholder and raise a Warning on the model instead of failing the
//! slide. Slots are fitted independently: each box respects its own frame
//! after binding, but boxes may still collide with each other; that is the
//! validator's job to report.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::analyzer::Classification;
use crate::config::EngineConfig;
use crate::content::{ContentBlock, KpiTuple};
use crate::library::{ElementSlot, LayoutTemplate, SlotRole};
use crate::metrics::TextMetricsEngine;
use crate::model::{FittedBox, SlideGeometryModel};
use crate::validator::{IssueCategory, IssueSeverity, ValidationIssue};

/// Fields shorter than this are "trivial" and lose to a richer alternative.
const TRIVIAL_LEN: usize = 24;
/// Per-slot initial-guess shrink per additional slot on the template.
const GUESS_STEP: u32 = 2;

pub struct LayoutApplier {
    metrics: Arc<TextMetricsEngine>,
    config: EngineConfig,
}

impl LayoutApplier {
    pub fn new(metrics: Arc<TextMetricsEngine>, config: EngineConfig) -> Self {
        LayoutApplier { metrics, config }
    }

    /// Binds `block` into `template`, producing one `FittedBox` per slot.
    pub fn bind(
        &self,
        block: &ContentBlock,
        template: &LayoutTemplate,
        classification: &Classification,
    ) -> SlideGeometryModel {
        let canvas = self.config.canvas;
        let units = content_units(block);
        let mut binding_issues: Vec<ValidationIssue> = Vec::new();
        let mut boxes: Vec<FittedBox> = Vec::with_capacity(template.slots.len());

        for slot in &template.slots {
            let source = resolve_source(block, &units, slot);
            let fitted = match source {
                Some(text) => self.fit_slot(slot, &text, template.slots.len()),
                None => {
                    binding_issues.push(
                        ValidationIssue::new(
                            IssueSeverity::Warning,
                            IssueCategory::Density,
                            format!(
                                "No source field for slot {:?}; bound an empty placeholder",
                                slot.role
                            ),
                            vec![],
                            0.0,
                        )
                        .with_fix("Supply the missing content field upstream"),
                    );
                    self.placeholder_box(slot)
                }
            };
            boxes.push(fitted);
        }

        // Units with no item slot to land in are reported, never lost quietly.
        let item_slots = template
            .slots
            .iter()
            .filter(|s| matches!(s.role, SlotRole::Item(_)))
            .count();
        if item_slots > 0 && units.len() > item_slots {
            let dropped = units.len() - item_slots;
            binding_issues.push(ValidationIssue::new(
                IssueSeverity::Warning,
                IssueCategory::Density,
                format!(
                    "{dropped} content unit(s) beyond the template's {item_slots} item slots"
                ),
                vec![],
                dropped as f32,
            ));
        }

        debug!(
            template = %template.id,
            boxes = boxes.len(),
            warnings = binding_issues.len(),
            "content bound"
        );

        SlideGeometryModel {
            id: Uuid::new_v4(),
            template_id: template.id.clone(),
            canvas,
            complexity: classification.complexity,
            boxes,
            binding_issues,
        }
    }

    /// Fits one slot's text: binary-search size within the slot's range,
    /// smart truncation at `size_min` when nothing in range fits.
    fn fit_slot(&self, slot: &ElementSlot, text: &str, slot_count: usize) -> FittedBox {
        let frame = slot.frame_on(self.config.canvas.width, self.config.canvas.height);
        let family = slot
            .families
            .first()
            .cloned()
            .unwrap_or_else(|| "Arial".to_string());

        // More elements ⇒ smaller starting guess ⇒ fewer search steps.
        let guess = slot
            .size_max
            .saturating_sub(GUESS_STEP * slot_count.saturating_sub(1) as u32)
            .clamp(slot.size_min, slot.size_max);

        let fit = self.metrics.fit_to_box(
            text,
            &family,
            frame.w,
            frame.h,
            slot.size_min,
            slot.size_max,
            guess,
        );

        let (text, lines, size, truncated, confidence) = if fit.fits {
            (text.to_string(), fit.lines, fit.size, false, 1.0)
        } else {
            // Overflow persists at size_min: keep only the lines that fit,
            // then smart-truncate so the cut lands on a clean boundary.
            let line_h = self.metrics.line_height(slot.size_min);
            let max_lines = (frame.h / line_h).floor().max(1.0) as usize;
            let kept = fit
                .lines
                .iter()
                .take(max_lines)
                .cloned()
                .collect::<Vec<_>>()
                .join("\n");
            let budget = kept.chars().count().saturating_sub(1);
            let cut = self.metrics.truncate(&kept, budget, true);
            let lines = self.metrics.wrap(&cut, &family, slot.size_min, frame.w);
            let height = lines.len() as f32 * line_h;
            let confidence = if height <= frame.h {
                0.75
            } else {
                (frame.h / height).clamp(0.1, 0.5)
            };
            (cut, lines, slot.size_min, true, confidence)
        };

        FittedBox {
            id: Uuid::new_v4(),
            role: slot.role,
            frame,
            text,
            lines,
            font_family: family,
            font_size: size,
            bold: slot.bold,
            size_min: slot.size_min,
            size_max: slot.size_max,
            truncated,
            placeholder: false,
            fit_confidence: confidence,
        }
    }

    fn placeholder_box(&self, slot: &ElementSlot) -> FittedBox {
        let frame = slot.frame_on(self.config.canvas.width, self.config.canvas.height);
        FittedBox {
            id: Uuid::new_v4(),
            role: slot.role,
            frame,
            text: String::new(),
            lines: Vec::new(),
            font_family: slot
                .families
                .first()
                .cloned()
                .unwrap_or_else(|| "Arial".to_string()),
            font_size: slot.size_min,
            bold: slot.bold,
            size_min: slot.size_min,
            size_max: slot.size_max,
            truncated: false,
            placeholder: true,
            fit_confidence: 0.0,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Source resolution
// ────────────────────────────────────────────────────────────────────────────

/// Discrete units competing for item slots: bullets, or formatted KPI tuples
/// when the block carries structured data instead.
fn content_units(block: &ContentBlock) -> Vec<String> {
    if !block.bullets.is_empty() {
        block.bullets.clone()
    } else {
        block.kpis.iter().map(format_kpi).collect()
    }
}

fn format_kpi(kpi: &KpiTuple) -> String {
    match &kpi.trend {
        Some(trend) => format!("{}: {} ({})", kpi.label, kpi.value, trend),
        None => format!("{}: {}", kpi.label, kpi.value),
    }
}

fn non_trivial(text: &str) -> bool {
    text.trim().chars().count() >= TRIVIAL_LEN
}

/// Resolves the text feeding one slot. `None` means no usable source — the
/// caller binds a placeholder.
fn resolve_source(block: &ContentBlock, units: &[String], slot: &ElementSlot) -> Option<String> {
    match slot.role {
        SlotRole::Headline => block.headline.clone().filter(|t| !t.trim().is_empty()),
        SlotRole::Subtitle => block.subtitle.clone().filter(|t| !t.trim().is_empty()),
        SlotRole::Body => resolve_body(block, units),
        SlotRole::Bullets => {
            if !units.is_empty() {
                Some(units.join("\n"))
            } else {
                block.body.clone().filter(|t| !t.trim().is_empty())
            }
        }
        SlotRole::Item(i) => units.get(i as usize).cloned(),
        SlotRole::Quote => block
            .quote
            .clone()
            .or_else(|| block.body.clone())
            .filter(|t| !t.trim().is_empty()),
        SlotRole::Attribution => block.attribution.clone().filter(|t| !t.trim().is_empty()),
        SlotRole::Panel(i) => resolve_panel(block, units, i),
        SlotRole::PanelHeader(_) => None,
    }
}

/// Body slots prefer the richer of prose body vs joined bullets: when both
/// are present and non-trivial the longer generated field wins.
fn resolve_body(block: &ContentBlock, units: &[String]) -> Option<String> {
    let body = block.body.clone().filter(|t| !t.trim().is_empty());
    let joined = if units.is_empty() {
        None
    } else {
        Some(units.join("\n"))
    };
    match (body, joined) {
        (Some(b), Some(j)) => {
            if non_trivial(&b) && b.chars().count() >= j.chars().count() {
                Some(b)
            } else if non_trivial(&j) {
                Some(j)
            } else if !b.trim().is_empty() {
                Some(b)
            } else {
                Some(j)
            }
        }
        (Some(b), None) => Some(b),
        (None, Some(j)) => Some(j),
        (None, None) => None,
    }
}

/// Split layouts take the first/second half of the units, or fall back to
/// the prose body on the left panel.
fn resolve_panel(block: &ContentBlock, units: &[String], index: u8) -> Option<String> {
    if units.is_empty() {
        return match index {
            0 => block.body.clone().filter(|t| !t.trim().is_empty()),
            _ => None,
        };
    }
    let mid = units.len().div_ceil(2);
    let half: &[String] = match index {
        0 => &units[..mid],
        _ => &units[mid..],
    };
    if half.is_empty() {
        None
    } else {
        Some(half.join("\n"))
    }
}
