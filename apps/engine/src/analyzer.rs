//! Content classification: template category + complexity score.
//!
//! Pure and stateless. Keyword matching runs in a fixed priority order over
//! a closed category set; the first hit wins, ties broken by declaration
//! order. Structured data (KPI tuples, an explicit quote field) outranks
//! keyword heuristics.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::content::ContentBlock;
use crate::metrics::provider::is_hangul;

// ────────────────────────────────────────────────────────────────────────────
// Categories
// ────────────────────────────────────────────────────────────────────────────

/// Closed template category set, in match-priority order.
/// Agenda outranks Timeline so "schedule"-flavored agendas do not get pulled
/// onto a timeline by their date words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemplateCategory {
    Agenda,
    Timeline,
    Process,
    Pyramid,
    Dashboard,
    Quote,
    Split,
    Generic,
}

/// Word-count density bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextDensity {
    Low,
    Medium,
    High,
}

/// Result of classifying one content block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: TemplateCategory,
    /// 0.0 – 1.0; structured-data signals score higher than keyword hits.
    pub confidence: f32,
    /// Deterministic, monotone in element count / text volume, in [0, 1].
    pub complexity: f32,
    pub bullet_count: usize,
    pub word_count: usize,
    pub density: TextDensity,
}

// ────────────────────────────────────────────────────────────────────────────
// Keyword tables (priority order)
// ────────────────────────────────────────────────────────────────────────────

const AGENDA_KEYWORDS: &[&str] = &[
    "agenda", "의제", "toc", "table of contents", "목차", "outline", "개요", "schedule", "일정",
    "program", "contents",
];
const TIMELINE_KEYWORDS: &[&str] = &[
    "timeline", "타임라인", "roadmap", "로드맵", "milestone", "마일스톤", "chronology", "history",
    "역사", "progression", "진행",
];
const PROCESS_KEYWORDS: &[&str] = &[
    "process", "프로세스", "workflow", "워크플로우", "step", "단계", "procedure", "절차",
    "method", "flow", "흐름", "guide",
];
const PYRAMID_KEYWORDS: &[&str] = &[
    "pyramid", "피라미드", "hierarchy", "계층", "organization", "조직", "structure", "구조",
    "priority", "우선순위",
];
const DASHBOARD_KEYWORDS: &[&str] = &[
    "dashboard", "대시보드", "kpi", "metrics", "지표", "performance", "성과", "scorecard",
    "monitoring",
];
const QUOTE_KEYWORDS: &[&str] = &[
    "quote", "인용", "testimonial", "review", "feedback", "opinion", "says", "said",
];
const SPLIT_KEYWORDS: &[&str] = &[
    "split", "분할", "versus", "vs.", "side by side", "비교", "comparison", "before/after",
];

const KEYWORD_TABLE: &[(TemplateCategory, &[&str])] = &[
    (TemplateCategory::Agenda, AGENDA_KEYWORDS),
    (TemplateCategory::Timeline, TIMELINE_KEYWORDS),
    (TemplateCategory::Process, PROCESS_KEYWORDS),
    (TemplateCategory::Pyramid, PYRAMID_KEYWORDS),
    (TemplateCategory::Dashboard, DASHBOARD_KEYWORDS),
    (TemplateCategory::Quote, QUOTE_KEYWORDS),
    (TemplateCategory::Split, SPLIT_KEYWORDS),
];

/// Category base complexity, before content adjustments.
fn base_complexity(category: TemplateCategory) -> f32 {
    match category {
        TemplateCategory::Generic => 0.2,
        TemplateCategory::Quote => 0.3,
        TemplateCategory::Agenda => 0.5,
        TemplateCategory::Split => 0.5,
        TemplateCategory::Timeline => 0.7,
        TemplateCategory::Process => 0.8,
        TemplateCategory::Pyramid => 0.8,
        TemplateCategory::Dashboard => 0.9,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Classifier
// ────────────────────────────────────────────────────────────────────────────

/// Classifies a content block into a template category and complexity.
pub fn classify(block: &ContentBlock) -> Classification {
    let combined = block.combined_text().to_lowercase();
    let bullet_count = block.bullets.len();
    let word_count = estimate_word_count(&combined);
    let density = density_band(word_count);

    let (category, confidence) = detect_category(block, &combined);

    let mut complexity = base_complexity(category);
    // Larger bullet adjustment first so it is not shadowed by the smaller.
    if bullet_count > 8 {
        complexity += 0.2;
    } else if bullet_count > 5 {
        complexity += 0.1;
    }
    complexity += match density {
        TextDensity::High => 0.1,
        TextDensity::Medium => 0.0,
        TextDensity::Low => -0.1,
    };
    let complexity = complexity.clamp(0.0, 1.0);

    debug!(
        ?category,
        confidence, complexity, bullet_count, word_count, "content classified"
    );

    Classification {
        category,
        confidence,
        complexity,
        bullet_count,
        word_count,
        density,
    }
}

fn detect_category(block: &ContentBlock, combined: &str) -> (TemplateCategory, f32) {
    // Structured data beats keyword heuristics.
    if !block.kpis.is_empty() {
        return (TemplateCategory::Dashboard, 0.9);
    }
    if block.quote.as_deref().is_some_and(|q| !q.trim().is_empty()) {
        return (TemplateCategory::Quote, 0.9);
    }
    if block.chart.is_some() {
        return (TemplateCategory::Dashboard, 0.8);
    }

    for (category, keywords) in KEYWORD_TABLE {
        let matches = keywords.iter().filter(|kw| combined.contains(*kw)).count();
        if matches > 0 {
            let confidence = (0.6 + 0.1 * (matches - 1) as f32).min(0.9);
            return (*category, confidence);
        }
    }

    (TemplateCategory::Generic, 0.5)
}

/// Word count that works for spaced and unspaced scripts: whitespace tokens,
/// or roughly one word per three Hangul syllables, whichever is larger.
fn estimate_word_count(text: &str) -> usize {
    let spaced = text.split_whitespace().count();
    let hangul = text.chars().filter(|c| is_hangul(*c)).count();
    spaced.max(hangul / 3)
}

fn density_band(word_count: usize) -> TextDensity {
    if word_count < 50 {
        TextDensity::Low
    } else if word_count <= 150 {
        TextDensity::Medium
    } else {
        TextDensity::High
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::KpiTuple;

    fn block_with_headline(headline: &str) -> ContentBlock {
        ContentBlock {
            headline: Some(headline.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_classify_is_deterministic() {
        let block = block_with_headline("Product roadmap for 2027");
        assert_eq!(classify(&block), classify(&block));
    }

    #[test]
    fn test_timeline_keywords_detected() {
        let c = classify(&block_with_headline("Delivery roadmap and milestones"));
        assert_eq!(c.category, TemplateCategory::Timeline);
        assert!(c.confidence >= 0.6);
    }

    #[test]
    fn test_agenda_outranks_timeline() {
        // "schedule" (agenda) and "milestone" (timeline) both present;
        // agenda has higher priority.
        let c = classify(&block_with_headline("Meeting schedule and milestone review"));
        assert_eq!(c.category, TemplateCategory::Agenda);
    }

    #[test]
    fn test_kpi_data_forces_dashboard() {
        let block = ContentBlock {
            headline: Some("Quarterly review".into()),
            kpis: vec![KpiTuple {
                label: "ARR".into(),
                value: "$12M".into(),
                trend: Some("+18%".into()),
            }],
            ..Default::default()
        };
        let c = classify(&block);
        assert_eq!(c.category, TemplateCategory::Dashboard);
        assert!(c.confidence >= 0.9);
    }

    #[test]
    fn test_chart_spec_reads_as_dashboard() {
        let block = ContentBlock {
            headline: Some("Segment growth".into()),
            chart: Some(crate::content::ChartSpec {
                kind: "bar".into(),
                series_labels: vec!["EMEA".into(), "APAC".into()],
            }),
            ..Default::default()
        };
        let c = classify(&block);
        assert_eq!(c.category, TemplateCategory::Dashboard);
    }

    #[test]
    fn test_quote_field_forces_quote() {
        let block = ContentBlock {
            quote: Some("The best way to predict the future is to invent it.".into()),
            attribution: Some("Alan Kay".into()),
            ..Default::default()
        };
        assert_eq!(classify(&block).category, TemplateCategory::Quote);
    }

    #[test]
    fn test_plain_prose_is_generic() {
        let c = classify(&block_with_headline("Team updates"));
        assert_eq!(c.category, TemplateCategory::Generic);
        assert!((c.confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_korean_keywords_detected() {
        let c = classify(&block_with_headline("2027년 로드맵"));
        assert_eq!(c.category, TemplateCategory::Timeline);
    }

    #[test]
    fn test_complexity_clamped_to_unit_interval() {
        let block = ContentBlock {
            headline: Some("KPI dashboard".into()),
            bullets: (0..12).map(|i| format!("Metric number {i} details")).collect(),
            body: Some("word ".repeat(200)),
            ..Default::default()
        };
        let c = classify(&block);
        assert!(c.complexity <= 1.0);
        assert!(c.complexity >= 0.0);
    }

    #[test]
    fn test_complexity_monotone_in_bullets() {
        let make = |n: usize| ContentBlock {
            headline: Some("Generic update".into()),
            bullets: (0..n).map(|i| format!("item {i}")).collect(),
            ..Default::default()
        };
        let few = classify(&make(3)).complexity;
        let some = classify(&make(6)).complexity;
        let many = classify(&make(9)).complexity;
        assert!(some >= few);
        assert!(many >= some);
    }

    #[test]
    fn test_nine_bullets_gets_full_adjustment() {
        // The +0.2 branch must not be shadowed by the +0.1 branch.
        let make = |n: usize| ContentBlock {
            headline: Some("Team update".into()),
            bullets: (0..n).map(|i| format!("item {i}")).collect(),
            ..Default::default()
        };
        let six = classify(&make(6)).complexity;
        let nine = classify(&make(9)).complexity;
        assert!((nine - six - 0.1).abs() < 1e-6, "expected +0.1 step, got {six} -> {nine}");
    }

    #[test]
    fn test_density_bands() {
        assert_eq!(density_band(10), TextDensity::Low);
        assert_eq!(density_band(100), TextDensity::Medium);
        assert_eq!(density_band(200), TextDensity::High);
    }
}
