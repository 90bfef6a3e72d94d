//! Slide layout-fitting and self-repair engine.
//!
//! Takes a role-tagged content block, selects a geometric template, fits
//! text into bounded boxes with exact measurement, detects geometric and
//! stylistic contract violations, and iteratively repairs them under
//! priority ordering and a bounded retry budget. Upstream content
//! generation and the downstream document writer are external
//! collaborators: this crate consumes already-generated text and hands back
//! a validated `SlideGeometryModel` for serialization elsewhere.
//!
//! Control flow: classify → select template → bind → validate → fix →
//! (re-validate loop) → final model.

pub mod analyzer;
pub mod applier;
pub mod config;
pub mod content;
pub mod engine;
pub mod errors;
pub mod fixer;
pub mod library;
pub mod metrics;
pub mod model;
pub mod validator;

// The public API consumed by the orchestration and serialization layers.
pub use analyzer::{classify, Classification, TemplateCategory};
pub use config::{EngineConfig, FixDefaults, RoleStyle, StyleRole, StyleRules};
pub use content::{ChartSpec, ContentBlock, KpiTuple};
pub use engine::SlideEngine;
pub use errors::EngineError;
pub use fixer::{FixOptions, FixResult, FixSummary};
pub use library::{ElementSlot, LayoutLibrary, LayoutTemplate, SlotRole};
pub use metrics::{BuiltinMetrics, FontMetrics, TextMetricsEngine};
pub use model::{Canvas, FittedBox, Rect, SlideGeometryModel};
pub use validator::{
    IssueCategory, IssueSeverity, SlideValidator, ValidationIssue, ValidationResult,
};
