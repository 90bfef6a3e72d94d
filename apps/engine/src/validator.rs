//! Read-only slide validation: categorized, severity-ranked issues.
//!
//! Each checker is independent and produces zero or more issues; `validate`
//! never mutates the model and never raises on data quality. `is_valid`
//! means no Critical issues. Issues are sorted by severity, then by the
//! category priority the fixer consumes them in.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::{EngineConfig, StyleRole};
use crate::library::SlotRole;
use crate::model::{FittedBox, SlideGeometryModel};

// ────────────────────────────────────────────────────────────────────────────
// Issue types
// ────────────────────────────────────────────────────────────────────────────

/// Severity, highest first. Declaration order is the sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IssueSeverity {
    Critical,
    Warning,
    Suggestion,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueCategory {
    Overflow,
    Overlap,
    OutOfBounds,
    Margin,
    Readability,
    FontConsistency,
    Density,
    StyleGuide,
}

impl IssueCategory {
    /// Repair priority, descending. Density and StyleGuide trail the ranked
    /// six; they are composite/cosmetic passes in the original system.
    pub fn fix_priority(&self) -> u8 {
        match self {
            IssueCategory::OutOfBounds => 10,
            IssueCategory::Overflow => 9,
            IssueCategory::Overlap => 8,
            IssueCategory::Readability => 7,
            IssueCategory::Margin => 6,
            IssueCategory::FontConsistency => 5,
            IssueCategory::Density => 4,
            IssueCategory::StyleGuide => 3,
        }
    }
}

/// One detected contract violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: IssueSeverity,
    pub category: IssueCategory,
    pub message: String,
    /// Affected box ids; overlap issues reference the pair.
    pub boxes: Vec<Uuid>,
    /// Quantitative measure: overflow points, overlap area, deficit, etc.
    pub measure: f32,
    pub suggested_fix: Option<String>,
}

impl ValidationIssue {
    pub fn new(
        severity: IssueSeverity,
        category: IssueCategory,
        message: impl Into<String>,
        boxes: Vec<Uuid>,
        measure: f32,
    ) -> Self {
        ValidationIssue {
            severity,
            category,
            message: message.into(),
            boxes,
            measure,
            suggested_fix: None,
        }
    }

    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.suggested_fix = Some(fix.into());
        self
    }
}

/// Immutable snapshot of one validation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub issues: Vec<ValidationIssue>,
    pub category_counts: HashMap<IssueCategory, usize>,
    pub duration_ms: f32,
}

impl ValidationResult {
    pub fn critical_issues(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Critical)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Warning)
    }

    pub fn by_category(&self, category: IssueCategory) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |i| i.category == category)
    }

    pub fn critical_count(&self) -> usize {
        self.critical_issues().count()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Validator
// ────────────────────────────────────────────────────────────────────────────

/// Overlap ratio (area / smaller box area) above which the pair is Critical.
const OVERLAP_CRITICAL_RATIO: f32 = 0.30;
/// Style compliance at or below this score escalates to Critical.
const STYLE_CRITICAL_SCORE: i32 = 70;
/// Font sizes may exceed the approved role size by this much before the
/// consistency checker flags them.
const SIZE_SLACK: u32 = 4;

pub struct SlideValidator {
    config: EngineConfig,
}

impl SlideValidator {
    pub fn new(config: EngineConfig) -> Self {
        SlideValidator { config }
    }

    /// Scans the model and returns every detected issue. Read-only.
    pub fn validate(&self, model: &SlideGeometryModel) -> ValidationResult {
        let start = Instant::now();
        let mut issues: Vec<ValidationIssue> = model.binding_issues.clone();

        self.check_overflow(model, &mut issues);
        self.check_overlap(model, &mut issues);
        self.check_out_of_bounds(model, &mut issues);
        self.check_margins(model, &mut issues);
        self.check_readability(model, &mut issues);
        self.check_font_consistency(model, &mut issues);
        self.check_density(model, &mut issues);
        self.check_style_guide(model, &mut issues);

        issues.sort_by_key(|i| (i.severity, std::cmp::Reverse(i.category.fix_priority())));

        let mut category_counts: HashMap<IssueCategory, usize> = HashMap::new();
        for issue in &issues {
            *category_counts.entry(issue.category).or_insert(0) += 1;
        }
        let is_valid = !issues.iter().any(|i| i.severity == IssueSeverity::Critical);
        let duration_ms = start.elapsed().as_secs_f32() * 1000.0;

        debug!(
            is_valid,
            total = issues.len(),
            critical = issues
                .iter()
                .filter(|i| i.severity == IssueSeverity::Critical)
                .count(),
            "slide validated"
        );

        ValidationResult {
            is_valid,
            issues,
            category_counts,
            duration_ms,
        }
    }

    // ── Overflow ────────────────────────────────────────────────────────────

    fn check_overflow(&self, model: &SlideGeometryModel, issues: &mut Vec<ValidationIssue>) {
        for b in &model.boxes {
            if b.lines.is_empty() {
                continue;
            }
            let needed = b.text_height(self.config.line_spacing);
            let excess = needed - b.frame.h;
            if excess > self.config.overflow_epsilon {
                issues.push(
                    ValidationIssue::new(
                        IssueSeverity::Critical,
                        IssueCategory::Overflow,
                        format!(
                            "Text needs {:.1}pt but box is {:.1}pt tall ({:.1}pt overflow)",
                            needed, b.frame.h, excess
                        ),
                        vec![b.id],
                        excess,
                    )
                    .with_fix("Shrink the font, grow the box, or truncate the text"),
                );
            }
        }
    }

    // ── Overlap ─────────────────────────────────────────────────────────────

    fn check_overlap(&self, model: &SlideGeometryModel, issues: &mut Vec<ValidationIssue>) {
        for (i, a) in model.boxes.iter().enumerate() {
            for b in model.boxes.iter().skip(i + 1) {
                let area = a.frame.overlap_area(&b.frame);
                if area <= self.config.overlap_epsilon {
                    continue;
                }
                let smaller = a.frame.area().min(b.frame.area()).max(1.0);
                let ratio = area / smaller;
                let severity = if ratio > OVERLAP_CRITICAL_RATIO {
                    IssueSeverity::Critical
                } else {
                    IssueSeverity::Warning
                };
                issues.push(
                    ValidationIssue::new(
                        severity,
                        IssueCategory::Overlap,
                        format!(
                            "Boxes overlap by {:.0}sq pt ({:.0}% of the smaller box)",
                            area,
                            ratio * 100.0
                        ),
                        vec![a.id, b.id],
                        area,
                    )
                    .with_fix("Move or shrink one of the boxes"),
                );
            }
        }
    }

    // ── Out of bounds ───────────────────────────────────────────────────────

    fn check_out_of_bounds(&self, model: &SlideGeometryModel, issues: &mut Vec<ValidationIssue>) {
        let canvas = model.canvas;
        for b in &model.boxes {
            let mut edges: Vec<(&str, f32)> = Vec::new();
            if b.frame.x < 0.0 {
                edges.push(("left", -b.frame.x));
            }
            if b.frame.y < 0.0 {
                edges.push(("top", -b.frame.y));
            }
            if b.frame.right() > canvas.width {
                edges.push(("right", b.frame.right() - canvas.width));
            }
            if b.frame.bottom() > canvas.height {
                edges.push(("bottom", b.frame.bottom() - canvas.height));
            }
            if edges.is_empty() {
                continue;
            }
            let worst = edges.iter().map(|(_, e)| *e).fold(0.0_f32, f32::max);
            let detail = edges
                .iter()
                .map(|(edge, excess)| format!("{edge} by {excess:.1}pt"))
                .collect::<Vec<_>>()
                .join(", ");
            issues.push(
                ValidationIssue::new(
                    IssueSeverity::Critical,
                    IssueCategory::OutOfBounds,
                    format!("Box extends past the canvas: {detail}"),
                    vec![b.id],
                    worst,
                )
                .with_fix("Clamp the box inside the canvas"),
            );
        }
    }

    // ── Margin (comfort clearance, distinct from hard bounds) ───────────────

    fn check_margins(&self, model: &SlideGeometryModel, issues: &mut Vec<ValidationIssue>) {
        let canvas = model.canvas;
        let margin = self.config.margin;
        for b in &model.boxes {
            if !canvas.contains(&b.frame) {
                continue; // already an OutOfBounds issue
            }
            let clearance = b
                .frame
                .x
                .min(b.frame.y)
                .min(canvas.width - b.frame.right())
                .min(canvas.height - b.frame.bottom());
            if clearance >= margin {
                continue;
            }
            let severity = if clearance < margin * 0.5 {
                IssueSeverity::Critical
            } else {
                IssueSeverity::Warning
            };
            issues.push(
                ValidationIssue::new(
                    severity,
                    IssueCategory::Margin,
                    format!(
                        "Box sits {:.1}pt from the canvas edge (comfort margin {:.0}pt)",
                        clearance, margin
                    ),
                    vec![b.id],
                    margin - clearance,
                )
                .with_fix("Move the box inward"),
            );
        }
    }

    // ── Readability ─────────────────────────────────────────────────────────

    fn check_readability(&self, model: &SlideGeometryModel, issues: &mut Vec<ValidationIssue>) {
        let style = &self.config.style;
        for b in &model.boxes {
            if b.lines.is_empty() {
                continue;
            }
            let role = style_role_for(b);
            if let Some(rs) = style.style_for(role) {
                if b.font_size < rs.min_size {
                    issues.push(
                        ValidationIssue::new(
                            IssueSeverity::Warning,
                            IssueCategory::Readability,
                            format!(
                                "{:?} text at {}pt is below the {}pt floor",
                                role, b.font_size, rs.min_size
                            ),
                            vec![b.id],
                            (rs.min_size - b.font_size) as f32,
                        )
                        .with_fix(format!("Raise the font to at least {}pt", rs.min_size)),
                    );
                }
            }

            let longest = b.lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
            if longest > style.max_line_chars {
                issues.push(
                    ValidationIssue::new(
                        IssueSeverity::Suggestion,
                        IssueCategory::Readability,
                        format!(
                            "Line of {longest} chars exceeds the {} char comfort limit",
                            style.max_line_chars
                        ),
                        vec![b.id],
                        (longest - style.max_line_chars) as f32,
                    )
                    .with_fix("Break the line or shorten the text"),
                );
            }

            if let Some(run) = longest_caps_run(&b.text) {
                if run > style.max_caps_run {
                    issues.push(
                        ValidationIssue::new(
                            IssueSeverity::Warning,
                            IssueCategory::Readability,
                            format!("ALL-CAPS run of {run} chars hurts readability"),
                            vec![b.id],
                            run as f32,
                        )
                        .with_fix("Use sentence case"),
                    );
                }
            }

            if b.lines.len() > style.max_lines_per_box {
                issues.push(
                    ValidationIssue::new(
                        IssueSeverity::Warning,
                        IssueCategory::Readability,
                        format!(
                            "{} lines in one box (comfort limit {})",
                            b.lines.len(),
                            style.max_lines_per_box
                        ),
                        vec![b.id],
                        b.lines.len() as f32,
                    )
                    .with_fix("Split or condense the text"),
                );
            }
        }
    }

    // ── Font consistency ────────────────────────────────────────────────────

    fn check_font_consistency(&self, model: &SlideGeometryModel, issues: &mut Vec<ValidationIssue>) {
        let style = &self.config.style;
        for b in &model.boxes {
            if b.lines.is_empty() {
                continue;
            }
            if !style.is_approved_family(&b.font_family) {
                issues.push(
                    ValidationIssue::new(
                        IssueSeverity::Warning,
                        IssueCategory::FontConsistency,
                        format!("Family '{}' is not in the approved set", b.font_family),
                        vec![b.id],
                        0.0,
                    )
                    .with_fix(format!("Use one of: {}", style.approved_families.join(", "))),
                );
            }
            let role = style_role_for(b);
            if let Some(rs) = style.style_for(role) {
                if b.font_size < rs.min_size || b.font_size > rs.size + SIZE_SLACK {
                    issues.push(
                        ValidationIssue::new(
                            IssueSeverity::Warning,
                            IssueCategory::FontConsistency,
                            format!(
                                "{:?} at {}pt deviates from the approved {}pt pair",
                                role, b.font_size, rs.size
                            ),
                            vec![b.id],
                            (b.font_size as i64 - rs.size as i64).unsigned_abs() as f32,
                        )
                        .with_fix(format!("Snap to {} {}pt", rs.family, rs.size)),
                    );
                }
            }
        }

        let families: HashSet<String> = model
            .boxes
            .iter()
            .filter(|b| !b.lines.is_empty())
            .map(|b| b.font_family.to_lowercase())
            .collect();
        if families.len() > style.max_families {
            issues.push(ValidationIssue::new(
                IssueSeverity::Warning,
                IssueCategory::FontConsistency,
                format!(
                    "{} font families on one slide (limit {})",
                    families.len(),
                    style.max_families
                ),
                vec![],
                families.len() as f32,
            ));
        }
        let sizes: HashSet<u32> = model
            .boxes
            .iter()
            .filter(|b| !b.lines.is_empty())
            .map(|b| b.font_size)
            .collect();
        if sizes.len() > style.max_sizes {
            issues.push(ValidationIssue::new(
                IssueSeverity::Warning,
                IssueCategory::FontConsistency,
                format!(
                    "{} distinct font sizes on one slide (limit {})",
                    sizes.len(),
                    style.max_sizes
                ),
                vec![],
                sizes.len() as f32,
            ));
        }
    }

    // ── Density ─────────────────────────────────────────────────────────────

    fn check_density(&self, model: &SlideGeometryModel, issues: &mut Vec<ValidationIssue>) {
        let style = &self.config.style;

        let bullet_count = count_bullets(model);
        if bullet_count > style.max_bullets {
            issues.push(
                ValidationIssue::new(
                    IssueSeverity::Warning,
                    IssueCategory::Density,
                    format!("{bullet_count} bullets (limit {})", style.max_bullets),
                    vec![],
                    bullet_count as f32,
                )
                .with_fix("Trim to the strongest points"),
            );
        }

        let total_chars: usize = model.boxes.iter().map(|b| b.text.chars().count()).sum();
        if total_chars > style.max_chars {
            issues.push(
                ValidationIssue::new(
                    IssueSeverity::Warning,
                    IssueCategory::Density,
                    format!("{total_chars} chars on one slide (cap {})", style.max_chars),
                    vec![],
                    total_chars as f32,
                )
                .with_fix("Split the content across slides"),
            );
        }

        for (i, a) in model.boxes.iter().enumerate() {
            for b in model.boxes.iter().skip(i + 1) {
                if a.frame.intersects(&b.frame) {
                    continue; // overlap checker owns this pair
                }
                let gap = rect_gap(a, b);
                if gap < style.min_gap {
                    issues.push(ValidationIssue::new(
                        IssueSeverity::Suggestion,
                        IssueCategory::Density,
                        format!(
                            "Boxes are {:.1}pt apart (minimum spacing {:.0}pt)",
                            gap, style.min_gap
                        ),
                        vec![a.id, b.id],
                        style.min_gap - gap,
                    ));
                }
            }
        }
    }

    // ── Style guide (composite) ─────────────────────────────────────────────

    fn check_style_guide(&self, model: &SlideGeometryModel, issues: &mut Vec<ValidationIssue>) {
        let style = &self.config.style;
        let mut score: i32 = 100;
        let mut violations: Vec<String> = Vec::new();

        let title_min = style
            .style_for(StyleRole::Title)
            .map(|r| r.min_size)
            .unwrap_or(20);
        for b in &model.boxes {
            if style_role_for(b) == StyleRole::Title && !b.lines.is_empty() && b.font_size < title_min
            {
                violations.push(format!("title at {}pt (floor {}pt)", b.font_size, title_min));
                score -= 15;
            }
        }

        if let Some(body) = style.style_for(StyleRole::Body) {
            for b in &model.boxes {
                if style_role_for(b) != StyleRole::Body || b.lines.is_empty() {
                    continue;
                }
                if b.font_size < body.min_size || b.font_size > body.size + SIZE_SLACK {
                    violations.push(format!("body at {}pt outside the approved range", b.font_size));
                    score -= 10;
                }
            }
        }

        let bullet_count = count_bullets(model);
        if bullet_count > style.max_bullets {
            violations.push(format!("{bullet_count} bullets"));
            score -= 20;
        }

        let box_count = model.boxes.iter().filter(|b| !b.lines.is_empty()).count();
        if box_count > style.max_boxes {
            violations.push(format!("{box_count} text boxes"));
            score -= 15;
        }

        for b in &model.boxes {
            if !b.lines.is_empty() && !style.is_approved_family(&b.font_family) {
                violations.push(format!("off-whitelist family '{}'", b.font_family));
                score -= 10;
                break;
            }
        }

        if !violations.is_empty() {
            let severity = if score <= STYLE_CRITICAL_SCORE {
                IssueSeverity::Critical
            } else {
                IssueSeverity::Warning
            };
            issues.push(
                ValidationIssue::new(
                    severity,
                    IssueCategory::StyleGuide,
                    format!("Style compliance {score}%: {}", violations.join("; ")),
                    vec![],
                    score as f32,
                )
                .with_fix("Apply the style guide defaults"),
            );
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

/// Style role a box is judged against.
pub fn style_role_for(b: &FittedBox) -> StyleRole {
    match b.role {
        SlotRole::Headline | SlotRole::Quote => StyleRole::Title,
        SlotRole::Subtitle | SlotRole::PanelHeader(_) => StyleRole::Subtitle,
        SlotRole::Attribution => StyleRole::Caption,
        _ => StyleRole::Body,
    }
}

/// Bullet-ish item count: one per line in a bullet group, one per item box.
pub fn count_bullets(model: &SlideGeometryModel) -> usize {
    model
        .boxes
        .iter()
        .map(|b| match b.role {
            SlotRole::Bullets | SlotRole::Panel(_) => {
                b.text.lines().filter(|l| !l.trim().is_empty()).count()
            }
            SlotRole::Item(_) if !b.text.is_empty() => 1,
            _ => 0,
        })
        .sum()
}

/// Longest run of consecutive uppercase letters (spaces allowed inside).
fn longest_caps_run(text: &str) -> Option<usize> {
    let mut best = 0usize;
    let mut current = 0usize;
    for c in text.chars() {
        if c.is_uppercase() {
            current += 1;
            best = best.max(current);
        } else if c == ' ' && current > 0 {
            // A space keeps a shouting run alive but does not extend it.
        } else {
            current = 0;
        }
    }
    (best > 0).then_some(best)
}

/// Shortest edge-to-edge distance between two disjoint rects.
fn rect_gap(a: &FittedBox, b: &FittedBox) -> f32 {
    let dx = (b.frame.x - a.frame.right()).max(a.frame.x - b.frame.right()).max(0.0);
    let dy = (b.frame.y - a.frame.bottom()).max(a.frame.y - b.frame.bottom()).max(0.0);
    dx.max(dy)
}
