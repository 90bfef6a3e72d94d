//! Immutable template catalog: slots, fallback chains, compatibility
//! scoring, and selection.
//!
//! Templates are loaded once at engine construction and shared read-only
//! across all slides. Slot geometry is normalized (fractions of the canvas)
//! and resolved to points at bind time. Every fallback chain is finite,
//! repeat-free, and ends at the generic `single_column` template, which has
//! no capacity ceiling — so selection is total and never fails.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::analyzer::{Classification, TemplateCategory};
use crate::content::ContentBlock;
use crate::model::Rect;

// ────────────────────────────────────────────────────────────────────────────
// Slots
// ────────────────────────────────────────────────────────────────────────────

/// Semantic role of one template slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotRole {
    Headline,
    Subtitle,
    /// Long-form text area. Unbounded capacity on the generic template.
    Body,
    /// Bullet group absorbing up to `capacity` items.
    Bullets,
    /// The n-th single-item slot (milestone, step, tier, KPI card).
    Item(u8),
    Quote,
    Attribution,
    /// Half of a split/column layout.
    Panel(u8),
    PanelHeader(u8),
}

/// Horizontal text alignment inside a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Align {
    Left,
    Center,
    Right,
}

/// One named region within a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementSlot {
    pub role: SlotRole,
    /// Normalized geometry, fractions of the canvas in [0, 1].
    pub frame: Rect,
    /// Character budget before truncation kicks in.
    pub max_len: usize,
    /// Font family candidates, preferred first.
    pub families: Vec<String>,
    pub size_min: u32,
    pub size_max: u32,
    pub bold: bool,
    pub align: Align,
    /// Content units this slot absorbs: 0 for field-fed slots, `usize::MAX`
    /// for the generic body.
    pub capacity: usize,
}

impl ElementSlot {
    /// Frame resolved to points on a concrete canvas.
    pub fn frame_on(&self, canvas_w: f32, canvas_h: f32) -> Rect {
        Rect::new(
            self.frame.x * canvas_w,
            self.frame.y * canvas_h,
            self.frame.w * canvas_w,
            self.frame.h * canvas_h,
        )
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Templates
// ────────────────────────────────────────────────────────────────────────────

/// Immutable geometric/role definition a slide can be bound to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutTemplate {
    pub id: String,
    pub name: String,
    pub slots: Vec<ElementSlot>,
    pub base_complexity: f32,
    /// Use-case keywords, mirrored from the classifier tables.
    pub keywords: Vec<String>,
    /// Ordered alternatives tried when this template scores below threshold.
    pub fallback_chain: Vec<String>,
    /// The designated always-compatible catch-all.
    pub is_generic: bool,
}

impl LayoutTemplate {
    /// Total content units this template can absorb.
    pub fn unit_capacity(&self) -> usize {
        self.slots
            .iter()
            .fold(0usize, |acc, s| acc.saturating_add(s.capacity))
    }

    /// Max-length budget of the first unit-bearing slot, used for the
    /// overlong-content penalty.
    fn unit_max_len(&self) -> Option<usize> {
        self.slots.iter().find(|s| s.capacity > 0).map(|s| s.max_len)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Catalog construction
// ────────────────────────────────────────────────────────────────────────────

const TITLE_FAMILIES: &[&str] = &["Arial", "Helvetica"];
const BODY_FAMILIES: &[&str] = &["Calibri", "Arial"];

#[allow(clippy::too_many_arguments)]
fn slot(
    role: SlotRole,
    frame: (f32, f32, f32, f32),
    families: &[&str],
    size_min: u32,
    size_max: u32,
    max_len: usize,
    capacity: usize,
    bold: bool,
    align: Align,
) -> ElementSlot {
    ElementSlot {
        role,
        frame: Rect::new(frame.0, frame.1, frame.2, frame.3),
        max_len,
        families: families.iter().map(|f| f.to_string()).collect(),
        size_min,
        size_max,
        bold,
        align,
        capacity,
    }
}

fn headline_slot() -> ElementSlot {
    // Top edge sits just inside the 36pt comfort margin on a 540pt canvas.
    slot(
        SlotRole::Headline,
        (0.05, 0.067, 0.90, 0.10),
        TITLE_FAMILIES,
        20,
        28,
        80,
        0,
        true,
        Align::Left,
    )
}

fn template(
    id: &str,
    name: &str,
    base_complexity: f32,
    keywords: &[&str],
    fallback_chain: &[&str],
    slots: Vec<ElementSlot>,
) -> LayoutTemplate {
    LayoutTemplate {
        id: id.to_string(),
        name: name.to_string(),
        slots,
        base_complexity,
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        fallback_chain: fallback_chain.iter().map(|f| f.to_string()).collect(),
        is_generic: id == GENERIC_TEMPLATE_ID,
    }
}

/// The always-compatible catch-all, last in every fallback chain.
pub const GENERIC_TEMPLATE_ID: &str = "single_column";

fn build_catalog() -> Vec<LayoutTemplate> {
    vec![
        template(
            GENERIC_TEMPLATE_ID,
            "Single Column",
            0.2,
            &["narrative", "detail"],
            &[],
            vec![
                headline_slot(),
                slot(
                    SlotRole::Body,
                    (0.05, 0.20, 0.90, 0.70),
                    BODY_FAMILIES,
                    10,
                    16,
                    600,
                    usize::MAX,
                    false,
                    Align::Left,
                ),
            ],
        ),
        template(
            "bullet_list",
            "Bullet List",
            0.3,
            &["summary", "action items"],
            &["two_column", "single_column"],
            vec![
                headline_slot(),
                slot(
                    SlotRole::Bullets,
                    (0.08, 0.20, 0.85, 0.62),
                    BODY_FAMILIES,
                    11,
                    16,
                    100,
                    5,
                    false,
                    Align::Left,
                ),
            ],
        ),
        template(
            "two_column",
            "Two Column",
            0.4,
            &["comparison", "contrast"],
            &["bullet_list", "single_column"],
            vec![
                headline_slot(),
                slot(
                    SlotRole::PanelHeader(0),
                    (0.05, 0.19, 0.43, 0.06),
                    TITLE_FAMILIES,
                    12,
                    16,
                    30,
                    0,
                    true,
                    Align::Center,
                ),
                slot(
                    SlotRole::Panel(0),
                    (0.05, 0.275, 0.43, 0.545),
                    BODY_FAMILIES,
                    10,
                    14,
                    60,
                    4,
                    false,
                    Align::Left,
                ),
                slot(
                    SlotRole::PanelHeader(1),
                    (0.52, 0.19, 0.43, 0.06),
                    TITLE_FAMILIES,
                    12,
                    16,
                    30,
                    0,
                    true,
                    Align::Center,
                ),
                slot(
                    SlotRole::Panel(1),
                    (0.52, 0.275, 0.43, 0.545),
                    BODY_FAMILIES,
                    10,
                    14,
                    60,
                    4,
                    false,
                    Align::Left,
                ),
            ],
        ),
        template(
            "timeline",
            "Timeline",
            0.7,
            &["roadmap", "milestone", "chronology"],
            &["process_flow", "bullet_list", "single_column"],
            vec![
                headline_slot(),
                slot(SlotRole::Item(0), (0.12, 0.22, 0.19, 0.42), BODY_FAMILIES, 10, 14, 50, 1, false, Align::Center),
                slot(SlotRole::Item(1), (0.32, 0.22, 0.19, 0.42), BODY_FAMILIES, 10, 14, 50, 1, false, Align::Center),
                slot(SlotRole::Item(2), (0.52, 0.22, 0.19, 0.42), BODY_FAMILIES, 10, 14, 50, 1, false, Align::Center),
                slot(SlotRole::Item(3), (0.72, 0.22, 0.19, 0.42), BODY_FAMILIES, 10, 14, 50, 1, false, Align::Center),
            ],
        ),
        template(
            "process_flow",
            "Process Flow",
            0.8,
            &["workflow", "procedure", "steps"],
            &["timeline", "bullet_list", "single_column"],
            vec![
                headline_slot(),
                slot(SlotRole::Item(0), (0.05, 0.24, 0.20, 0.20), BODY_FAMILIES, 10, 14, 40, 1, false, Align::Center),
                slot(SlotRole::Item(1), (0.35, 0.24, 0.20, 0.20), BODY_FAMILIES, 10, 14, 40, 1, false, Align::Center),
                slot(SlotRole::Item(2), (0.65, 0.24, 0.20, 0.20), BODY_FAMILIES, 10, 14, 40, 1, false, Align::Center),
                slot(SlotRole::Item(3), (0.20, 0.53, 0.20, 0.20), BODY_FAMILIES, 10, 14, 40, 1, false, Align::Center),
                slot(SlotRole::Item(4), (0.50, 0.53, 0.20, 0.20), BODY_FAMILIES, 10, 14, 40, 1, false, Align::Center),
            ],
        ),
        template(
            "pyramid",
            "Pyramid Hierarchy",
            0.8,
            &["hierarchy", "priority levels"],
            &["two_column", "bullet_list", "single_column"],
            vec![
                headline_slot(),
                slot(SlotRole::Item(0), (0.35, 0.20, 0.30, 0.15), BODY_FAMILIES, 10, 14, 40, 1, false, Align::Center),
                slot(SlotRole::Item(1), (0.25, 0.38, 0.50, 0.15), BODY_FAMILIES, 10, 14, 50, 1, false, Align::Center),
                slot(SlotRole::Item(2), (0.15, 0.56, 0.70, 0.15), BODY_FAMILIES, 10, 14, 60, 1, false, Align::Center),
            ],
        ),
        template(
            "dashboard_grid",
            "Dashboard Grid",
            0.9,
            &["kpi", "metrics", "scorecard"],
            &["two_column", "bullet_list", "single_column"],
            vec![
                headline_slot(),
                slot(SlotRole::Item(0), (0.05, 0.22, 0.26, 0.28), BODY_FAMILIES, 10, 16, 40, 1, false, Align::Center),
                slot(SlotRole::Item(1), (0.37, 0.22, 0.26, 0.28), BODY_FAMILIES, 10, 16, 40, 1, false, Align::Center),
                slot(SlotRole::Item(2), (0.69, 0.22, 0.26, 0.28), BODY_FAMILIES, 10, 16, 40, 1, false, Align::Center),
                slot(SlotRole::Item(3), (0.05, 0.56, 0.26, 0.28), BODY_FAMILIES, 10, 16, 40, 1, false, Align::Center),
                slot(SlotRole::Item(4), (0.37, 0.56, 0.26, 0.28), BODY_FAMILIES, 10, 16, 40, 1, false, Align::Center),
                slot(SlotRole::Item(5), (0.69, 0.56, 0.26, 0.28), BODY_FAMILIES, 10, 16, 40, 1, false, Align::Center),
            ],
        ),
        template(
            "quote_highlight",
            "Quote Highlight",
            0.3,
            &["testimonial", "citation"],
            &["single_column"],
            vec![
                slot(
                    SlotRole::Quote,
                    (0.10, 0.25, 0.80, 0.35),
                    TITLE_FAMILIES,
                    20,
                    28,
                    200,
                    0,
                    false,
                    Align::Center,
                ),
                slot(
                    SlotRole::Attribution,
                    (0.30, 0.65, 0.40, 0.08),
                    BODY_FAMILIES,
                    12,
                    16,
                    50,
                    0,
                    false,
                    Align::Center,
                ),
            ],
        ),
        template(
            "split_screen",
            "Split Screen",
            0.5,
            &["side by side", "balance"],
            &["two_column", "single_column"],
            vec![
                headline_slot(),
                slot(
                    SlotRole::Panel(0),
                    (0.05, 0.20, 0.42, 0.70),
                    BODY_FAMILIES,
                    10,
                    14,
                    300,
                    5,
                    false,
                    Align::Left,
                ),
                slot(
                    SlotRole::Panel(1),
                    (0.53, 0.20, 0.42, 0.70),
                    BODY_FAMILIES,
                    10,
                    14,
                    300,
                    5,
                    false,
                    Align::Left,
                ),
            ],
        ),
        template(
            "agenda_toc",
            "Agenda",
            0.5,
            &["agenda", "outline", "contents"],
            &["bullet_list", "single_column"],
            vec![
                headline_slot(),
                slot(
                    SlotRole::Bullets,
                    (0.10, 0.22, 0.80, 0.65),
                    BODY_FAMILIES,
                    12,
                    18,
                    60,
                    5,
                    false,
                    Align::Left,
                ),
            ],
        ),
    ]
}

// ────────────────────────────────────────────────────────────────────────────
// Library
// ────────────────────────────────────────────────────────────────────────────

/// Content units that overflow a slot's budget by more than this factor
/// count against compatibility.
const OVERLONG_FACTOR: f32 = 1.5;
const LENGTH_PENALTY: f32 = 0.1;
/// Below this compatibility score the fallback chain is walked.
const COMPAT_THRESHOLD: f32 = 0.6;

pub struct LayoutLibrary {
    templates: Vec<LayoutTemplate>,
    by_id: HashMap<String, usize>,
}

impl Default for LayoutLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutLibrary {
    pub fn new() -> Self {
        let templates = build_catalog();
        let by_id = templates
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.clone(), i))
            .collect();
        LayoutLibrary { templates, by_id }
    }

    pub fn get(&self, id: &str) -> Option<&LayoutTemplate> {
        self.by_id.get(id).map(|i| &self.templates[*i])
    }

    pub fn generic(&self) -> &LayoutTemplate {
        self.get(GENERIC_TEMPLATE_ID)
            .unwrap_or_else(|| unreachable!("catalog always contains the generic template"))
    }

    pub fn templates(&self) -> &[LayoutTemplate] {
        &self.templates
    }

    /// Primary template id for a classified category.
    fn primary_for(&self, classification: &Classification) -> &str {
        match classification.category {
            TemplateCategory::Agenda => "agenda_toc",
            TemplateCategory::Timeline => "timeline",
            TemplateCategory::Process => "process_flow",
            TemplateCategory::Pyramid => "pyramid",
            TemplateCategory::Dashboard => "dashboard_grid",
            TemplateCategory::Quote => "quote_highlight",
            TemplateCategory::Split => "split_screen",
            TemplateCategory::Generic => {
                if classification.bullet_count >= 3 {
                    "bullet_list"
                } else {
                    GENERIC_TEMPLATE_ID
                }
            }
        }
    }

    /// Compatibility of a template with a block: coverage of the block's
    /// content units, minus penalties for overlong fields and for units the
    /// template cannot place. The generic template always scores 1.0.
    pub fn compatibility(&self, template: &LayoutTemplate, block: &ContentBlock) -> f32 {
        if template.is_generic {
            return 1.0;
        }

        let units = block.unit_count();
        let mut score = if units == 0 {
            1.0
        } else {
            let capacity = template.unit_capacity();
            let placed = units.min(capacity);
            let unplaced = units - placed;
            let mut s = placed as f32 / units as f32;
            if unplaced > 0 {
                s -= 0.25 + 0.05 * (unplaced - 1) as f32;
            }
            s
        };

        // Overlong placed content burns additional score.
        if let Some(budget) = template.unit_max_len() {
            let limit = budget as f32 * OVERLONG_FACTOR;
            for unit in &block.bullets {
                if unit.chars().count() as f32 > limit {
                    score -= LENGTH_PENALTY;
                }
            }
        }
        if let Some(headline) = &block.headline {
            if let Some(h_slot) = template.slots.iter().find(|s| s.role == SlotRole::Headline) {
                if headline.chars().count() as f32 > h_slot.max_len as f32 * OVERLONG_FACTOR {
                    score -= LENGTH_PENALTY;
                }
            }
        }

        score.max(0.0)
    }

    /// Selects a template for the block. Total: an explicit valid hint wins,
    /// otherwise the category's primary template or the first compatible
    /// fallback; the generic template terminates every chain.
    pub fn select_layout(
        &self,
        block: &ContentBlock,
        classification: &Classification,
        explicit_hint: Option<&str>,
    ) -> &LayoutTemplate {
        if let Some(hint) = explicit_hint {
            match self.get(hint) {
                Some(t) => {
                    debug!(template = %t.id, "explicit layout hint honored");
                    return t;
                }
                None => {
                    warn!(hint, "unknown layout hint ignored");
                }
            }
        }

        let primary_id = self.primary_for(classification);
        let primary = self
            .get(primary_id)
            .unwrap_or_else(|| self.generic());
        let score = self.compatibility(primary, block);
        if score >= COMPAT_THRESHOLD {
            return primary;
        }
        debug!(
            template = %primary.id,
            score, "primary template incompatible; walking fallback chain"
        );

        for fallback_id in &primary.fallback_chain {
            if let Some(candidate) = self.get(fallback_id) {
                let score = self.compatibility(candidate, block);
                if score >= COMPAT_THRESHOLD {
                    debug!(template = %candidate.id, score, "fallback selected");
                    return candidate;
                }
            }
        }
        self.generic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::classify;

    fn library() -> LayoutLibrary {
        LayoutLibrary::new()
    }

    fn block_with_bullets(headline: &str, n: usize) -> ContentBlock {
        ContentBlock {
            headline: Some(headline.to_string()),
            bullets: (0..n).map(|i| format!("Milestone {i} shipped")).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_catalog_ids_unique_and_generic_present() {
        let lib = library();
        let mut seen = std::collections::HashSet::new();
        for t in lib.templates() {
            assert!(seen.insert(t.id.clone()), "duplicate template id {}", t.id);
        }
        assert!(lib.get(GENERIC_TEMPLATE_ID).is_some());
    }

    #[test]
    fn test_fallback_chains_end_at_generic_without_repeats() {
        let lib = library();
        for t in lib.templates() {
            if t.is_generic {
                assert!(t.fallback_chain.is_empty());
                continue;
            }
            assert_eq!(
                t.fallback_chain.last().map(String::as_str),
                Some(GENERIC_TEMPLATE_ID),
                "{} chain must end at the generic template",
                t.id
            );
            let mut seen = std::collections::HashSet::new();
            seen.insert(t.id.as_str());
            for id in &t.fallback_chain {
                assert!(lib.get(id).is_some(), "{} references unknown {}", t.id, id);
                assert!(seen.insert(id.as_str()), "{} chain repeats {}", t.id, id);
            }
        }
    }

    #[test]
    fn test_slot_frames_normalized() {
        for t in library().templates() {
            for s in &t.slots {
                assert!(s.frame.x >= 0.0 && s.frame.right() <= 1.0, "{} x range", t.id);
                assert!(s.frame.y >= 0.0 && s.frame.bottom() <= 1.0, "{} y range", t.id);
                assert!(s.size_min <= s.size_max, "{} font range inverted", t.id);
            }
        }
    }

    #[test]
    fn test_explicit_hint_wins() {
        let lib = library();
        let block = block_with_bullets("Quarterly roadmap", 3);
        let c = classify(&block);
        let t = lib.select_layout(&block, &c, Some("pyramid"));
        assert_eq!(t.id, "pyramid");
    }

    #[test]
    fn test_invalid_hint_ignored() {
        let lib = library();
        let block = block_with_bullets("Roadmap and milestones", 3);
        let c = classify(&block);
        let t = lib.select_layout(&block, &c, Some("holographic_cube"));
        assert_eq!(t.id, "timeline");
    }

    #[test]
    fn test_select_never_fails_on_arbitrary_content() {
        let lib = library();
        for n in 0..20 {
            let block = block_with_bullets("Anything at all", n);
            let c = classify(&block);
            let t = lib.select_layout(&block, &c, None);
            assert!(!t.id.is_empty());
        }
    }

    #[test]
    fn test_six_milestones_fall_through_to_generic() {
        // Scenario: timeline holds 4, process_flow holds 5, neither fits 6;
        // the walk ends at the generic template.
        let lib = library();
        let block = block_with_bullets("Launch roadmap milestones", 6);
        let c = classify(&block);
        assert_eq!(c.category, TemplateCategory::Timeline);

        let timeline = lib.get("timeline").unwrap();
        let process = lib.get("process_flow").unwrap();
        assert!(lib.compatibility(timeline, &block) < COMPAT_THRESHOLD);
        assert!(lib.compatibility(process, &block) < COMPAT_THRESHOLD);

        let t = lib.select_layout(&block, &c, None);
        assert_eq!(t.id, GENERIC_TEMPLATE_ID);
    }

    #[test]
    fn test_four_milestones_keep_timeline() {
        let lib = library();
        let block = block_with_bullets("Launch roadmap milestones", 4);
        let c = classify(&block);
        let t = lib.select_layout(&block, &c, None);
        assert_eq!(t.id, "timeline");
    }

    #[test]
    fn test_generic_template_always_compatible() {
        let lib = library();
        let block = block_with_bullets("x", 50);
        assert_eq!(lib.compatibility(lib.generic(), &block), 1.0);
    }

    #[test]
    fn test_overlong_bullets_depress_score() {
        let lib = library();
        let short = block_with_bullets("Plan", 4);
        let long = ContentBlock {
            headline: Some("Plan".into()),
            bullets: (0..4).map(|_| "x".repeat(400)).collect(),
            ..Default::default()
        };
        let t = lib.get("bullet_list").unwrap();
        assert!(lib.compatibility(t, &long) < lib.compatibility(t, &short));
    }

    #[test]
    fn test_generic_category_with_few_bullets_is_single_column() {
        let lib = library();
        let block = ContentBlock {
            headline: Some("Team update".into()),
            body: Some("A narrative paragraph about the quarter.".into()),
            ..Default::default()
        };
        let c = classify(&block);
        let t = lib.select_layout(&block, &c, None);
        assert_eq!(t.id, GENERIC_TEMPLATE_ID);
    }
}
