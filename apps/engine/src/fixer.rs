//! Priority-ordered slide repair with a bounded fix/re-validate loop.
//!
//! Pass 1 applies every applicable fix in priority order and re-validates;
//! while Critical issues remain and the iteration budget allows, further
//! passes fix only the remaining Criticals. A single unfixable issue never
//! aborts a pass — it is recorded as failed and processing continues. Only
//! invalid box references (programmer error) are fatal.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{EngineConfig, StyleRole};
use crate::errors::EngineError;
use crate::library::SlotRole;
use crate::metrics::TextMetricsEngine;
use crate::model::{FittedBox, Rect, SlideGeometryModel};
use crate::validator::{
    style_role_for, IssueCategory, IssueSeverity, SlideValidator, ValidationIssue,
    ValidationResult,
};

// ────────────────────────────────────────────────────────────────────────────
// Options and results
// ────────────────────────────────────────────────────────────────────────────

/// Per-invocation repair options.
#[derive(Debug, Clone, Copy)]
pub struct FixOptions {
    /// Destructive repairs allowed: truncation, shrinking, caps rewriting.
    pub aggressive: bool,
    pub max_iterations: u32,
    /// Checked between passes only; an abandoned slide is always left
    /// fully re-validated.
    pub deadline: Option<Instant>,
}

impl FixOptions {
    pub fn from_config(config: &EngineConfig) -> Self {
        FixOptions {
            aggressive: config.fix.aggressive,
            max_iterations: config.fix.max_iterations,
            deadline: None,
        }
    }

    pub fn aggressive(mut self, aggressive: bool) -> Self {
        self.aggressive = aggressive;
        self
    }
}

/// Outcome of one repair attempt on one issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixResult {
    pub category: IssueCategory,
    pub issue_message: String,
    /// Box ids the originating issue referenced; empty for slide-level
    /// issues.
    pub boxes: Vec<Uuid>,
    /// Strategy that ran, e.g. "nudge_box"; "none" when no strategy applied.
    pub method: String,
    /// Snapshots of the affected boxes before and after the attempt.
    pub before: Vec<FittedBox>,
    pub after: Vec<FittedBox>,
    /// True when the specific issue no longer appears on re-check.
    pub success: bool,
    pub duration_ms: f32,
}

/// Aggregate of a complete fix run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixSummary {
    pub results: Vec<FixResult>,
    pub iterations: u32,
    pub total: usize,
    pub fixed: usize,
    /// fixed / total; 1.0 for a run with nothing to do.
    pub success_rate: f32,
    pub aggressive: bool,
    /// Budget reached (or deadline hit) with Critical issues remaining.
    pub exhausted: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Fixer
// ────────────────────────────────────────────────────────────────────────────

/// Overlap nudge grid: step size and search breadth.
const NUDGE_STEP: f32 = 8.0;
const NUDGE_MAX_STEPS: u32 = 12;
/// Aggressive overlap repair shrinks the movable box by this factor.
const SHRINK_FACTOR: f32 = 0.85;
/// Boxes whose top edge sits in this fraction of the canvas are treated as
/// titles when inferring a style role from geometry.
const TITLE_REGION: f32 = 0.2;

pub struct SlideFixer {
    metrics: Arc<TextMetricsEngine>,
    validator: SlideValidator,
    config: EngineConfig,
}

impl SlideFixer {
    pub fn new(metrics: Arc<TextMetricsEngine>, config: EngineConfig) -> Self {
        SlideFixer {
            metrics,
            validator: SlideValidator::new(config.clone()),
            config,
        }
    }

    /// Repairs `model` in place, driven by `initial` validation findings.
    ///
    /// Returns the fix summary and the final (post-repair) validation
    /// result. Residual Critical issues after budget exhaustion are not an
    /// error — they are visible in the returned result.
    pub fn fix(
        &self,
        model: &mut SlideGeometryModel,
        initial: &ValidationResult,
        options: FixOptions,
    ) -> Result<(FixSummary, ValidationResult), EngineError> {
        // Dangling references are programmer-usage errors, the only fatal case.
        for issue in &initial.issues {
            for id in &issue.boxes {
                if model.box_index(*id).is_none() {
                    return Err(EngineError::UnknownBox {
                        model: model.id,
                        box_id: *id,
                    });
                }
            }
        }

        let mut results: Vec<FixResult> = Vec::new();
        let mut iterations = 0u32;

        // Pass 1: everything applicable, in priority order.
        let first_pass = self.apply_pass(model, &initial.issues, options, false);
        iterations += 1;
        let mut current = self.validator.validate(model);
        results.extend(score_pass(first_pass, &current));

        // Remaining passes: Critical issues only.
        while current.critical_count() > 0 && iterations < options.max_iterations {
            if let Some(deadline) = options.deadline {
                if Instant::now() >= deadline {
                    debug!("fix deadline reached; abandoning with a re-validated model");
                    break;
                }
            }
            let criticals: Vec<ValidationIssue> = current
                .issues
                .iter()
                .filter(|i| i.severity == IssueSeverity::Critical)
                .cloned()
                .collect();
            let pass = self.apply_pass(model, &criticals, options, true);
            iterations += 1;
            current = self.validator.validate(model);
            results.extend(score_pass(pass, &current));
        }

        let exhausted = current.critical_count() > 0;
        if exhausted {
            warn!(
                iterations,
                residual = current.critical_count(),
                "fix budget exhausted with Critical issues remaining"
            );
        }

        let total = results.len();
        let fixed = results.iter().filter(|r| r.success).count();
        let success_rate = if total == 0 {
            1.0
        } else {
            fixed as f32 / total as f32
        };

        Ok((
            FixSummary {
                results,
                iterations,
                total,
                fixed,
                success_rate,
                aggressive: options.aggressive,
                exhausted,
            },
            current,
        ))
    }

    /// Applies one pass of fixes. Returns raw results whose `success` flag
    /// is still unset — the caller scores them against the re-validation.
    fn apply_pass(
        &self,
        model: &mut SlideGeometryModel,
        issues: &[ValidationIssue],
        options: FixOptions,
        criticals_only: bool,
    ) -> Vec<FixResult> {
        let mut ordered: Vec<&ValidationIssue> = issues
            .iter()
            .filter(|i| !criticals_only || i.severity == IssueSeverity::Critical)
            .collect();
        ordered.sort_by_key(|i| (std::cmp::Reverse(i.category.fix_priority()), i.severity));

        let mut pass_results = Vec::with_capacity(ordered.len());
        for issue in ordered {
            let start = Instant::now();
            let before = snapshot(model, &issue.boxes);
            let method = self.dispatch(model, issue, options);
            let after = snapshot(model, &issue.boxes);
            pass_results.push(FixResult {
                category: issue.category,
                issue_message: issue.message.clone(),
                boxes: issue.boxes.clone(),
                method: method.to_string(),
                before,
                after,
                success: false,
                duration_ms: start.elapsed().as_secs_f32() * 1000.0,
            });
        }
        pass_results
    }

    fn dispatch(
        &self,
        model: &mut SlideGeometryModel,
        issue: &ValidationIssue,
        options: FixOptions,
    ) -> &'static str {
        match issue.category {
            IssueCategory::OutOfBounds => self.fix_out_of_bounds(model, issue),
            IssueCategory::Overflow => self.fix_overflow(model, issue, options),
            IssueCategory::Overlap => self.fix_overlap(model, issue, options),
            IssueCategory::Readability => self.fix_readability(model, issue, options),
            IssueCategory::Margin => self.fix_margin(model, issue),
            IssueCategory::FontConsistency => self.fix_font_consistency(model, issue),
            IssueCategory::Density => self.fix_density(model, options),
            IssueCategory::StyleGuide => self.fix_style_guide(model),
        }
    }

    // ── OutOfBounds: clamp into the canvas, re-fit on resize ───────────────

    fn fix_out_of_bounds(
        &self,
        model: &mut SlideGeometryModel,
        issue: &ValidationIssue,
    ) -> &'static str {
        let canvas = model.canvas;
        let Some(idx) = issue.boxes.first().and_then(|id| model.box_index(*id)) else {
            return "none";
        };
        let b = &mut model.boxes[idx];
        let old = b.frame;

        let w = b.frame.w.min(canvas.width).max(self.config.min_box_width);
        let h = b.frame.h.min(canvas.height).max(self.config.min_box_height);
        let x = b.frame.x.clamp(0.0, canvas.width - w);
        let y = b.frame.y.clamp(0.0, canvas.height - h);
        b.frame = Rect::new(x, y, w, h);

        let resized = (b.frame.w - old.w).abs() > f32::EPSILON
            || (b.frame.h - old.h).abs() > f32::EPSILON;
        if resized {
            self.refit(idx, model);
        }
        "clamp_into_canvas"
    }

    // ── Overflow: shrink font, grow box, aggressive truncate ──────────────

    fn fix_overflow(
        &self,
        model: &mut SlideGeometryModel,
        issue: &ValidationIssue,
        options: FixOptions,
    ) -> &'static str {
        let Some(idx) = issue.boxes.first().and_then(|id| model.box_index(*id)) else {
            return "none";
        };

        // First resort: let the binary search pick a smaller size.
        self.refit(idx, model);
        if self.box_fits(&model.boxes[idx]) {
            return "refit_font";
        }

        // Second: grow the box downward into free vertical slack.
        let needed = model.boxes[idx].text_height(self.config.line_spacing);
        let limit = self.growth_limit(model, idx);
        let b = &mut model.boxes[idx];
        if b.frame.y + needed <= limit {
            b.frame.h = needed;
            self.refit(idx, model);
            return "grow_box";
        }

        // Last resort, destructive: truncate at the floor size.
        if options.aggressive {
            self.truncate_to_frame(idx, model);
            return "truncate_text";
        }
        "none"
    }

    /// Lowest y the box may grow to: the top of the nearest box below it
    /// (minus the spacing minimum), or the comfort margin above the canvas
    /// bottom.
    fn growth_limit(&self, model: &SlideGeometryModel, idx: usize) -> f32 {
        let frame = model.boxes[idx].frame;
        let mut limit = model.canvas.height - self.config.margin;
        for (i, other) in model.boxes.iter().enumerate() {
            if i == idx {
                continue;
            }
            let horizontal_overlap =
                other.frame.x < frame.right() && other.frame.right() > frame.x;
            if horizontal_overlap && other.frame.y >= frame.bottom() {
                limit = limit.min(other.frame.y - self.config.style.min_gap);
            }
        }
        limit
    }

    // ── Overlap: minimal displacement, aggressive shrink fallback ──────────

    fn fix_overlap(
        &self,
        model: &mut SlideGeometryModel,
        issue: &ValidationIssue,
        options: FixOptions,
    ) -> &'static str {
        let (Some(&first), Some(&second)) = (issue.boxes.first(), issue.boxes.get(1)) else {
            return "none";
        };
        let (Some(i), Some(j)) = (model.box_index(first), model.box_index(second)) else {
            return "none";
        };
        if model.boxes[i].frame.overlap_area(&model.boxes[j].frame)
            <= self.config.overlap_epsilon
        {
            return "already_resolved";
        }

        let movable = self.pick_movable(model, i, j);
        let partner = if movable == i { j } else { i };
        let partner_frame = model.boxes[partner].frame;
        let mframe = model.boxes[movable].frame;
        let gap = self.config.style.min_gap;

        // Minimal displacement that clears the partner, rightward then
        // downward, snapped up to the nudge grid; a few extra grid steps
        // handle third-party collisions at the exact clearing offset.
        let right_needed = (partner_frame.right() + gap - mframe.x).max(NUDGE_STEP);
        let down_needed = (partner_frame.bottom() + gap - mframe.y).max(NUDGE_STEP);
        for (needed, horizontal) in [(right_needed, true), (down_needed, false)] {
            let base_steps = (needed / NUDGE_STEP).ceil() as u32;
            for extra in 0..NUDGE_MAX_STEPS {
                let d = (base_steps + extra) as f32 * NUDGE_STEP;
                let candidate = if horizontal {
                    shifted(mframe, d, 0.0)
                } else {
                    shifted(mframe, 0.0, d)
                };
                if candidate.overlap_area(&partner_frame) > self.config.overlap_epsilon {
                    continue;
                }
                if self.placement_ok(model, movable, Some(partner), candidate) {
                    model.boxes[movable].frame = candidate;
                    return "nudge_box";
                }
            }
        }

        if options.aggressive {
            let b = &mut model.boxes[movable];
            b.frame.w = (b.frame.w * SHRINK_FACTOR).max(self.config.min_box_width);
            b.frame.h = (b.frame.h * SHRINK_FACTOR).max(self.config.min_box_height);
            self.refit(movable, model);
            return "shrink_box";
        }
        "none"
    }

    /// The lower-priority box of a pair: non-title first, then the smaller,
    /// then the later one in slot order.
    fn pick_movable(&self, model: &SlideGeometryModel, i: usize, j: usize) -> usize {
        let a = &model.boxes[i];
        let b = &model.boxes[j];
        match (a.is_title(), b.is_title()) {
            (true, false) => j,
            (false, true) => i,
            _ => {
                if (a.frame.area() - b.frame.area()).abs() > f32::EPSILON {
                    if a.frame.area() < b.frame.area() {
                        i
                    } else {
                        j
                    }
                } else {
                    i.max(j)
                }
            }
        }
    }

    /// A candidate placement is acceptable when it stays on the canvas and
    /// does not overlap any box (other than `exclude`, judged separately)
    /// beyond what that pair already had.
    fn placement_ok(
        &self,
        model: &SlideGeometryModel,
        idx: usize,
        exclude: Option<usize>,
        candidate: Rect,
    ) -> bool {
        if !model.canvas.contains(&candidate) {
            return false;
        }
        for (i, other) in model.boxes.iter().enumerate() {
            if i == idx || Some(i) == exclude {
                continue;
            }
            let existing = model.boxes[idx].frame.overlap_area(&other.frame);
            let proposed = candidate.overlap_area(&other.frame);
            if proposed > self.config.overlap_epsilon && proposed >= existing {
                return false;
            }
        }
        true
    }

    // ── Margin: move inward, shrink when moving would collide ──────────────

    fn fix_margin(&self, model: &mut SlideGeometryModel, issue: &ValidationIssue) -> &'static str {
        let canvas = model.canvas;
        let margin = self.config.margin;
        let Some(idx) = issue.boxes.first().and_then(|id| model.box_index(*id)) else {
            return "none";
        };
        let frame = model.boxes[idx].frame;

        let moved = Rect::new(
            if frame.w <= canvas.width - 2.0 * margin {
                frame.x.clamp(margin, canvas.width - margin - frame.w)
            } else {
                frame.x
            },
            if frame.h <= canvas.height - 2.0 * margin {
                frame.y.clamp(margin, canvas.height - margin - frame.h)
            } else {
                frame.y
            },
            frame.w,
            frame.h,
        );

        if self.placement_ok(model, idx, None, moved) {
            model.boxes[idx].frame = moved;
            return "move_inward";
        }

        // Moving would collide: shrink into the comfort area instead.
        let x = frame.x.max(margin);
        let y = frame.y.max(margin);
        let w = (canvas.width - margin - x)
            .min(frame.w)
            .max(self.config.min_box_width);
        let h = (canvas.height - margin - y)
            .min(frame.h)
            .max(self.config.min_box_height);
        model.boxes[idx].frame = Rect::new(x, y, w, h);
        self.refit(idx, model);
        "shrink_into_margin"
    }

    // ── Readability: font floor, long lines, aggressive caps rewrite ───────

    fn fix_readability(
        &self,
        model: &mut SlideGeometryModel,
        issue: &ValidationIssue,
        options: FixOptions,
    ) -> &'static str {
        let Some(idx) = issue.boxes.first().and_then(|id| model.box_index(*id)) else {
            return "none";
        };
        let mut method: &'static str = "none";

        let role = self.inferred_role(&model.boxes[idx]);
        let floor = self
            .config
            .style
            .style_for(role)
            .map(|r| r.min_size)
            .unwrap_or_else(|| self.config.style.global_min_size());
        {
            let b = &mut model.boxes[idx];
            if b.font_size < floor {
                b.font_size = floor;
                method = "raise_font_floor";
            }
        }

        let too_long = model.boxes[idx]
            .lines
            .iter()
            .any(|l| l.chars().count() > self.config.style.max_line_chars);
        if too_long {
            let b = &mut model.boxes[idx];
            b.text = split_long_lines(&b.text, self.config.style.max_line_chars);
            if method == "none" {
                method = "split_long_lines";
            }
        }

        if options.aggressive {
            let b = &mut model.boxes[idx];
            if has_long_caps_run(&b.text, self.config.style.max_caps_run) {
                b.text = sentence_case(&b.text);
                method = "normalize_caps";
            }
        }

        if method != "none" {
            self.rewrap(idx, model);
        }
        method
    }

    // ── FontConsistency: snap to the approved role pair ────────────────────

    fn fix_font_consistency(
        &self,
        model: &mut SlideGeometryModel,
        issue: &ValidationIssue,
    ) -> &'static str {
        match issue.boxes.first().and_then(|id| model.box_index(*id)) {
            Some(idx) => {
                let role = self.inferred_role(&model.boxes[idx]);
                let Some(rs) = self.config.style.style_for(role) else {
                    return "none";
                };
                let target_family = rs.family.clone();
                let target_size = rs.size;
                let b = &mut model.boxes[idx];
                let mut changed = false;
                if !self.config.style.is_approved_family(&b.font_family) {
                    b.font_family = target_family;
                    changed = true;
                }
                // The issue was reported against this box, so snap all the
                // way to the approved pair rather than the nearest bound.
                if b.font_size != target_size {
                    b.font_size = target_size;
                    changed = true;
                }
                if changed {
                    self.rewrap(idx, model);
                    "snap_role_pair"
                } else {
                    "already_resolved"
                }
            }
            None => {
                // Slide-level inconsistency: align every box's family with
                // its role's approved pair.
                let mut changed = false;
                for idx in 0..model.boxes.len() {
                    let role = self.inferred_role(&model.boxes[idx]);
                    if let Some(rs) = self.config.style.style_for(role) {
                        let family = rs.family.clone();
                        let b = &mut model.boxes[idx];
                        if !b.font_family.eq_ignore_ascii_case(&family) {
                            b.font_family = family;
                            changed = true;
                            self.rewrap(idx, model);
                        }
                    }
                }
                if changed {
                    "align_families"
                } else {
                    "already_resolved"
                }
            }
        }
    }

    // ── Density: destructive trims, gated on aggressive mode ───────────────

    fn fix_density(&self, model: &mut SlideGeometryModel, options: FixOptions) -> &'static str {
        if !options.aggressive {
            return "none";
        }
        let max_bullets = self.config.style.max_bullets;
        let mut method: &'static str = "none";

        for idx in 0..model.boxes.len() {
            if !matches!(model.boxes[idx].role, SlotRole::Bullets | SlotRole::Panel(_)) {
                continue;
            }
            let items: Vec<&str> = model.boxes[idx]
                .text
                .lines()
                .filter(|l| !l.trim().is_empty())
                .collect();
            if items.len() > max_bullets {
                let trimmed = items[..max_bullets].join("\n");
                model.boxes[idx].text = trimmed;
                model.boxes[idx].truncated = true;
                self.refit(idx, model);
                method = "trim_bullets";
            }
        }

        let total: usize = model.boxes.iter().map(|b| b.text.chars().count()).sum();
        if total > self.config.style.max_chars {
            // Cut the longest box down by the slide-wide excess.
            let excess = total - self.config.style.max_chars;
            if let Some(idx) = (0..model.boxes.len())
                .max_by_key(|i| model.boxes[*i].text.chars().count())
            {
                let len = model.boxes[idx].text.chars().count();
                let cut = self
                    .metrics
                    .truncate(&model.boxes[idx].text, len.saturating_sub(excess), true);
                model.boxes[idx].text = cut;
                model.boxes[idx].truncated = true;
                self.refit(idx, model);
                method = "truncate_density";
            }
        }
        method
    }

    // ── StyleGuide: composite defaults (title floor + whitelist) ───────────

    fn fix_style_guide(&self, model: &mut SlideGeometryModel) -> &'static str {
        let mut changed = false;
        for idx in 0..model.boxes.len() {
            let role = self.inferred_role(&model.boxes[idx]);
            let Some(rs) = self.config.style.style_for(role) else {
                continue;
            };
            let family = rs.family.clone();
            let size = rs.size;
            let min_size = rs.min_size;
            let b = &mut model.boxes[idx];
            if b.lines.is_empty() {
                continue;
            }
            let mut touched = false;
            if !self.config.style.is_approved_family(&b.font_family) {
                b.font_family = family;
                touched = true;
            }
            if role == StyleRole::Title && b.font_size < min_size {
                b.font_size = size;
                touched = true;
            }
            if touched {
                self.rewrap(idx, model);
                changed = true;
            }
        }
        if changed {
            "apply_style_defaults"
        } else {
            "already_resolved"
        }
    }

    // ── Shared primitives ──────────────────────────────────────────────────

    /// Style role with geometric inference: a box whose top edge sits in the
    /// title region is treated as a title regardless of slot role.
    fn inferred_role(&self, b: &FittedBox) -> StyleRole {
        if b.frame.y < self.config.canvas.height * TITLE_REGION && b.is_title() {
            return StyleRole::Title;
        }
        if b.frame.y < self.config.canvas.height * TITLE_REGION
            && matches!(b.role, SlotRole::Body | SlotRole::Bullets)
        {
            // Top-region prose reads as a title to the audience.
            return StyleRole::Title;
        }
        style_role_for(b)
    }

    fn box_fits(&self, b: &FittedBox) -> bool {
        b.text_height(self.config.line_spacing) <= b.frame.h + self.config.overflow_epsilon
    }

    /// Re-runs the binary search for the box's current frame and text.
    fn refit(&self, idx: usize, model: &mut SlideGeometryModel) {
        let b = &mut model.boxes[idx];
        if b.text.trim().is_empty() {
            b.lines.clear();
            return;
        }
        let guess = b.font_size.clamp(b.size_min, b.size_max);
        let fit = self.metrics.fit_to_box(
            &b.text,
            &b.font_family,
            b.frame.w,
            b.frame.h,
            b.size_min,
            b.size_max,
            guess,
        );
        b.font_size = fit.size;
        b.lines = fit.lines;
    }

    /// Re-wraps at the current size without revisiting the size choice
    /// (used after deliberate size overrides like floor raises).
    fn rewrap(&self, idx: usize, model: &mut SlideGeometryModel) {
        let b = &mut model.boxes[idx];
        if b.text.trim().is_empty() {
            b.lines.clear();
            return;
        }
        b.lines = self
            .metrics
            .wrap(&b.text, &b.font_family, b.font_size, b.frame.w);
    }

    /// Destructive: keep only the lines that fit at the floor size.
    fn truncate_to_frame(&self, idx: usize, model: &mut SlideGeometryModel) {
        let b = &model.boxes[idx];
        let size = b.size_min;
        let lines = self
            .metrics
            .wrap(&b.text, &b.font_family, size, b.frame.w);
        let max_lines = (b.frame.h / self.metrics.line_height(size))
            .floor()
            .max(1.0) as usize;
        if lines.len() <= max_lines {
            let b = &mut model.boxes[idx];
            b.font_size = size;
            b.lines = lines;
            return;
        }
        let kept = lines[..max_lines].join("\n");
        let budget = kept.chars().count().saturating_sub(1);
        let cut = self.metrics.truncate(&kept, budget, true);
        let family = model.boxes[idx].font_family.clone();
        let frame_w = model.boxes[idx].frame.w;
        let new_lines = self.metrics.wrap(&cut, &family, size, frame_w);
        let b = &mut model.boxes[idx];
        b.text = cut;
        b.lines = new_lines;
        b.font_size = size;
        b.truncated = true;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Free helpers
// ────────────────────────────────────────────────────────────────────────────

fn shifted(frame: Rect, dx: f32, dy: f32) -> Rect {
    Rect::new(frame.x + dx, frame.y + dy, frame.w, frame.h)
}

fn snapshot(model: &SlideGeometryModel, ids: &[Uuid]) -> Vec<FittedBox> {
    if ids.is_empty() {
        return model.boxes.clone();
    }
    ids.iter()
        .filter_map(|id| model.box_by_id(*id).cloned())
        .collect()
}

/// Marks each raw result as resolved when no issue of the same category
/// still touches the same boxes in the re-validated result.
fn score_pass(raw: Vec<FixResult>, revalidated: &ValidationResult) -> Vec<FixResult> {
    raw.into_iter()
        .map(|mut r| {
            let still_present = revalidated.issues.iter().any(|i| {
                i.category == r.category
                    && ((i.boxes.is_empty() && r.boxes.is_empty())
                        || i.boxes.iter().any(|id| r.boxes.contains(id)))
            });
            r.success = !still_present;
            r
        })
        .collect()
}

fn has_long_caps_run(text: &str, max_run: usize) -> bool {
    let mut run = 0usize;
    for c in text.chars() {
        if c.is_uppercase() {
            run += 1;
            if run > max_run {
                return true;
            }
        } else if c != ' ' {
            run = 0;
        }
    }
    false
}

/// Lowercases shouting text, capitalizing sentence starts.
fn sentence_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut start_of_sentence = true;
    for c in text.chars() {
        if start_of_sentence && c.is_alphabetic() {
            out.extend(c.to_uppercase());
            start_of_sentence = false;
        } else {
            out.extend(c.to_lowercase());
        }
        if matches!(c, '.' | '!' | '?' | '\n') {
            start_of_sentence = true;
        }
    }
    out
}

/// Inserts paragraph breaks so no line exceeds `max_chars` characters.
fn split_long_lines(text: &str, max_chars: usize) -> String {
    let mut out_lines: Vec<String> = Vec::new();
    for line in text.lines() {
        if line.chars().count() <= max_chars {
            out_lines.push(line.to_string());
            continue;
        }
        let mut current = String::new();
        for word in line.split_whitespace() {
            let candidate_len = if current.is_empty() {
                word.chars().count()
            } else {
                current.chars().count() + 1 + word.chars().count()
            };
            if !current.is_empty() && candidate_len > max_chars {
                out_lines.push(std::mem::take(&mut current));
                current = word.to_string();
            } else {
                if !current.is_empty() {
                    current.push(' ');
                }
                current.push_str(word);
            }
        }
        if !current.is_empty() {
            out_lines.push(current);
        }
    }
    out_lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::BuiltinMetrics;
    use crate::model::Canvas;

    fn make_fixer() -> SlideFixer {
        let config = EngineConfig::default();
        let metrics = Arc::new(TextMetricsEngine::new(
            Arc::new(BuiltinMetrics::new()),
            config.line_spacing,
            config.cache_capacity,
        ));
        SlideFixer::new(metrics, config)
    }

    fn make_box(role: SlotRole, frame: Rect, text: &str, size: u32) -> FittedBox {
        FittedBox {
            id: Uuid::new_v4(),
            role,
            frame,
            text: text.to_string(),
            lines: if text.is_empty() {
                vec![]
            } else {
                text.lines().map(str::to_string).collect()
            },
            font_family: "Arial".into(),
            font_size: size,
            bold: false,
            size_min: 10,
            size_max: 28,
            truncated: false,
            placeholder: false,
            fit_confidence: 1.0,
        }
    }

    fn make_model(boxes: Vec<FittedBox>) -> SlideGeometryModel {
        SlideGeometryModel {
            id: Uuid::new_v4(),
            template_id: "bullet_list".into(),
            canvas: Canvas::DEFAULT,
            complexity: 0.4,
            boxes,
            binding_issues: vec![],
        }
    }

    fn validate(model: &SlideGeometryModel) -> ValidationResult {
        SlideValidator::new(EngineConfig::default()).validate(model)
    }

    #[test]
    fn test_out_of_bounds_clamped_into_canvas() {
        let fixer = make_fixer();
        let mut model = make_model(vec![make_box(
            SlotRole::Body,
            Rect::new(900.0, 500.0, 120.0, 80.0),
            "spills over",
            12,
        )]);
        let initial = validate(&model);
        let (summary, result) = fixer
            .fix(&mut model, &initial, FixOptions::from_config(&EngineConfig::default()))
            .unwrap();

        assert_eq!(result.by_category(IssueCategory::OutOfBounds).count(), 0);
        assert!(Canvas::DEFAULT.contains(&model.boxes[0].frame));
        assert!(summary.results.iter().any(|r| r.method == "clamp_into_canvas"));
    }

    #[test]
    fn test_full_overlap_resolved_within_budget() {
        let fixer = make_fixer();
        let frame = Rect::new(100.0, 100.0, 200.0, 100.0);
        let mut model = make_model(vec![
            make_box(SlotRole::Bullets, frame, "first box", 14),
            make_box(SlotRole::Body, frame, "second box", 14),
        ]);
        let initial = validate(&model);
        assert!(!initial.is_valid);

        let (summary, result) = fixer
            .fix(&mut model, &initial, FixOptions::from_config(&EngineConfig::default()))
            .unwrap();

        let residual = model.boxes[0].frame.overlap_area(&model.boxes[1].frame);
        assert!(
            residual <= EngineConfig::default().overlap_epsilon,
            "residual overlap {residual}"
        );
        assert_eq!(result.by_category(IssueCategory::Overlap).count(), 0);
        assert!(summary.success_rate > 0.0);
    }

    #[test]
    fn test_unfixable_issue_recorded_failed_not_fatal() {
        let fixer = make_fixer();
        // Two canvas-filling boxes: no displacement can separate them and
        // non-aggressive mode may not shrink.
        let mut model = make_model(vec![
            make_box(SlotRole::Body, Rect::new(0.0, 0.0, 960.0, 540.0), "a", 14),
            make_box(SlotRole::Bullets, Rect::new(0.0, 0.0, 960.0, 540.0), "b", 14),
        ]);
        let initial = validate(&model);
        let options = FixOptions::from_config(&EngineConfig::default()).aggressive(false);
        let (summary, result) = fixer.fix(&mut model, &initial, options).unwrap();

        assert!(summary.exhausted);
        assert!(result.critical_count() > 0);
        assert!(summary.results.iter().any(|r| !r.success));
        assert_eq!(summary.iterations, 3, "budget must be honored");
    }

    #[test]
    fn test_aggressive_shrink_breaks_deadlock() {
        let fixer = make_fixer();
        let mut model = make_model(vec![
            make_box(SlotRole::Body, Rect::new(0.0, 0.0, 960.0, 540.0), "a", 14),
            make_box(SlotRole::Bullets, Rect::new(0.0, 0.0, 960.0, 540.0), "b", 14),
        ]);
        let initial = validate(&model);
        let options = FixOptions::from_config(&EngineConfig::default()).aggressive(true);
        let (_, result) = fixer.fix(&mut model, &initial, options).unwrap();
        // Shrinking 15% per pass over 3 passes may not fully clear a total
        // overlap, but it must strictly reduce it.
        let residual = model.boxes[0].frame.overlap_area(&model.boxes[1].frame);
        assert!(residual < 960.0 * 540.0);
        let _ = result;
    }

    #[test]
    fn test_sub_minimum_title_raised_and_cleared() {
        let fixer = make_fixer();
        let mut model = make_model(vec![make_box(
            SlotRole::Headline,
            Rect::new(48.0, 40.0, 860.0, 60.0),
            "Tiny title",
            8,
        )]);
        let initial = validate(&model);
        assert!(initial.by_category(IssueCategory::Readability).count() >= 1);

        let (_, result) = fixer
            .fix(&mut model, &initial, FixOptions::from_config(&EngineConfig::default()))
            .unwrap();

        // Raised to the approved title size by the consistency snap.
        assert_eq!(model.boxes[0].font_size, 24);
        assert_eq!(result.by_category(IssueCategory::Readability).count(), 0);
        assert_eq!(result.by_category(IssueCategory::FontConsistency).count(), 0);
    }

    #[test]
    fn test_margin_violation_moved_inward() {
        let fixer = make_fixer();
        let mut model = make_model(vec![make_box(
            SlotRole::Body,
            Rect::new(10.0, 100.0, 200.0, 100.0),
            "close to the edge",
            12,
        )]);
        let initial = validate(&model);
        let (_, result) = fixer
            .fix(&mut model, &initial, FixOptions::from_config(&EngineConfig::default()))
            .unwrap();
        assert!(model.boxes[0].frame.x >= 36.0 - 1e-3);
        assert_eq!(result.by_category(IssueCategory::Margin).count(), 0);
    }

    #[test]
    fn test_fix_idempotent_on_clean_model() {
        let fixer = make_fixer();
        let mut model = make_model(vec![
            make_box(
                SlotRole::Headline,
                Rect::new(48.0, 40.0, 860.0, 60.0),
                "Quarterly results",
                24,
            ),
            make_box(
                SlotRole::Bullets,
                Rect::new(48.0, 140.0, 860.0, 300.0),
                "Revenue up\nCosts down",
                14,
            ),
        ]);
        let initial = validate(&model);
        assert!(initial.is_valid);
        let snapshot = model.clone();

        let (summary, result) = fixer
            .fix(&mut model, &initial, FixOptions::from_config(&EngineConfig::default()))
            .unwrap();

        assert!(result.is_valid);
        assert_eq!(summary.total, 0, "fixed point must produce zero changes");
        assert!((summary.success_rate - 1.0).abs() < 1e-6);
        assert_eq!(model, snapshot);
    }

    #[test]
    fn test_dangling_box_reference_is_fatal() {
        let fixer = make_fixer();
        let mut model = make_model(vec![]);
        let bogus = ValidationResult {
            is_valid: false,
            issues: vec![ValidationIssue::new(
                IssueSeverity::Critical,
                IssueCategory::Overflow,
                "refers to a box that does not exist",
                vec![Uuid::new_v4()],
                1.0,
            )],
            category_counts: Default::default(),
            duration_ms: 0.0,
        };
        let err = fixer
            .fix(&mut model, &bogus, FixOptions::from_config(&EngineConfig::default()))
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownBox { .. }));
    }

    #[test]
    fn test_fix_results_carry_before_after_snapshots() {
        let fixer = make_fixer();
        let mut model = make_model(vec![make_box(
            SlotRole::Body,
            Rect::new(900.0, 500.0, 120.0, 80.0),
            "spills",
            12,
        )]);
        let initial = validate(&model);
        let (summary, _) = fixer
            .fix(&mut model, &initial, FixOptions::from_config(&EngineConfig::default()))
            .unwrap();
        let clamp = summary
            .results
            .iter()
            .find(|r| r.method == "clamp_into_canvas")
            .unwrap();
        assert_eq!(clamp.before.len(), 1);
        assert_eq!(clamp.after.len(), 1);
        assert_ne!(clamp.before[0].frame, clamp.after[0].frame);
        assert!(clamp.success);
    }

    #[test]
    fn test_aggressive_caps_normalization() {
        let fixer = make_fixer();
        let mut model = make_model(vec![make_box(
            SlotRole::Bullets,
            Rect::new(100.0, 140.0, 700.0, 300.0),
            "REVENUE GREW ACROSS EVERY SEGMENT THIS QUARTER",
            14,
        )]);
        let initial = validate(&model);
        let options = FixOptions::from_config(&EngineConfig::default()).aggressive(true);
        let (_, result) = fixer.fix(&mut model, &initial, options).unwrap();
        assert_eq!(model.boxes[0].text, "Revenue grew across every segment this quarter");
        assert!(!result
            .by_category(IssueCategory::Readability)
            .any(|i| i.message.contains("ALL-CAPS")));
    }

    #[test]
    fn test_deadline_between_passes_leaves_validated_model() {
        let fixer = make_fixer();
        let mut model = make_model(vec![
            make_box(SlotRole::Body, Rect::new(0.0, 0.0, 960.0, 540.0), "a", 14),
            make_box(SlotRole::Bullets, Rect::new(0.0, 0.0, 960.0, 540.0), "b", 14),
        ]);
        let initial = validate(&model);
        let options = FixOptions {
            aggressive: false,
            max_iterations: 5,
            deadline: Some(Instant::now()),
        };
        let (summary, result) = fixer.fix(&mut model, &initial, options).unwrap();
        // Pass 1 always runs; the deadline stops the loop before pass 2.
        assert_eq!(summary.iterations, 1);
        // The returned result reflects the model as left on disk.
        assert_eq!(
            result.critical_count(),
            validate(&model).critical_count()
        );
    }

    #[test]
    fn test_sentence_case_helper() {
        assert_eq!(
            sentence_case("STOP SHOUTING. PLEASE DO."),
            "Stop shouting. Please do."
        );
    }

    #[test]
    fn test_split_long_lines_helper() {
        let out = split_long_lines("alpha beta gamma delta", 11);
        for line in out.lines() {
            assert!(line.chars().count() <= 11, "line too long: {line}");
        }
        assert_eq!(out.replace('\n', " "), "alpha beta gamma delta");
    }
}
