//! Role-tagged content input for a single slide.
//!
//! A `ContentBlock` is what the upstream generation step hands over: text
//! fields keyed by semantic role plus optional structured data. Missing
//! optional fields are absent, never errors. The block is immutable input —
//! the engine reads it and owns nothing in it.

use serde::{Deserialize, Serialize};

/// One KPI tuple for dashboard-style slides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiTuple {
    pub label: String,
    pub value: String,
    /// Delta vs the previous period, e.g. "+12%". Optional.
    pub trend: Option<String>,
}

/// Declarative chart request carried alongside text content.
///
/// The engine only reserves geometry for it; rendering happens downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub kind: String,
    pub series_labels: Vec<String>,
}

/// Semantic input unit for one slide.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub headline: Option<String>,
    pub subtitle: Option<String>,
    /// Long-form prose body. When both `body` and `bullets` are present and
    /// non-trivial, the richer field wins at bind time.
    pub body: Option<String>,
    pub bullets: Vec<String>,
    pub quote: Option<String>,
    pub attribution: Option<String>,
    pub kpis: Vec<KpiTuple>,
    pub chart: Option<ChartSpec>,
    /// Explicit template request, e.g. "timeline". Validated by the layout
    /// library; an unknown id is ignored, not an error.
    pub layout_hint: Option<String>,
}

impl ContentBlock {
    /// Number of discrete content units competing for item slots:
    /// bullets, or KPI tuples when no bullets are present.
    pub fn unit_count(&self) -> usize {
        if !self.bullets.is_empty() {
            self.bullets.len()
        } else {
            self.kpis.len()
        }
    }

    /// All text the classifier should see, joined for keyword scanning.
    pub fn combined_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if let Some(h) = &self.headline {
            parts.push(h);
        }
        if let Some(s) = &self.subtitle {
            parts.push(s);
        }
        if let Some(b) = &self.body {
            parts.push(b);
        }
        for b in &self.bullets {
            parts.push(b);
        }
        if let Some(q) = &self.quote {
            parts.push(q);
        }
        parts.join(" ")
    }

    /// True when the block carries no usable text or data at all.
    pub fn is_empty(&self) -> bool {
        self.headline.as_deref().map_or(true, str::is_empty)
            && self.subtitle.as_deref().map_or(true, str::is_empty)
            && self.body.as_deref().map_or(true, str::is_empty)
            && self.bullets.is_empty()
            && self.quote.as_deref().map_or(true, str::is_empty)
            && self.kpis.is_empty()
            && self.chart.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_count_prefers_bullets() {
        let block = ContentBlock {
            bullets: vec!["a".into(), "b".into()],
            kpis: vec![KpiTuple {
                label: "Revenue".into(),
                value: "$4M".into(),
                trend: None,
            }],
            ..Default::default()
        };
        assert_eq!(block.unit_count(), 2);
    }

    #[test]
    fn test_unit_count_falls_back_to_kpis() {
        let block = ContentBlock {
            kpis: vec![
                KpiTuple {
                    label: "Revenue".into(),
                    value: "$4M".into(),
                    trend: Some("+8%".into()),
                },
                KpiTuple {
                    label: "Churn".into(),
                    value: "2.1%".into(),
                    trend: None,
                },
            ],
            ..Default::default()
        };
        assert_eq!(block.unit_count(), 2);
    }

    #[test]
    fn test_empty_block_detected() {
        assert!(ContentBlock::default().is_empty());
        let block = ContentBlock {
            headline: Some("Q3 results".into()),
            ..Default::default()
        };
        assert!(!block.is_empty());
    }

    #[test]
    fn test_combined_text_joins_roles() {
        let block = ContentBlock {
            headline: Some("Roadmap".into()),
            bullets: vec!["Launch beta".into()],
            ..Default::default()
        };
        let text = block.combined_text();
        assert!(text.contains("Roadmap"));
        assert!(text.contains("Launch beta"));
    }
}
