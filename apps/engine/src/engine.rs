//! Engine facade: constructor-injected components, one handle per tenant.
//!
//! Everything that was a process-wide registry in earlier designs (metrics
//! cache, template catalog) is owned by the `SlideEngine` instance, so
//! parallel engines in tests are fully independent. Per-slide work is
//! synchronous and shares nothing across slides except the measurement
//! cache, which is internally locked.

use std::sync::Arc;

use tracing::info;

use crate::analyzer::classify;
use crate::applier::LayoutApplier;
use crate::config::EngineConfig;
use crate::content::ContentBlock;
use crate::errors::EngineError;
use crate::fixer::{FixOptions, FixSummary, SlideFixer};
use crate::library::LayoutLibrary;
use crate::metrics::{BuiltinMetrics, FontMetrics, TextMetricsEngine};
use crate::model::SlideGeometryModel;
use crate::validator::{SlideValidator, ValidationResult};

pub struct SlideEngine {
    config: EngineConfig,
    metrics: Arc<TextMetricsEngine>,
    library: LayoutLibrary,
    applier: LayoutApplier,
    validator: SlideValidator,
    fixer: SlideFixer,
}

impl std::fmt::Debug for SlideEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlideEngine")
            .field("templates", &self.library.templates().len())
            .finish_non_exhaustive()
    }
}

impl SlideEngine {
    /// Builds an engine from a validated configuration and a font-metrics
    /// provider. The only fatal failure mode is a bad configuration.
    pub fn new(config: EngineConfig, provider: Arc<dyn FontMetrics>) -> Result<Self, EngineError> {
        config.validate()?;
        let metrics = Arc::new(TextMetricsEngine::new(
            provider,
            config.line_spacing,
            config.cache_capacity,
        ));
        let library = LayoutLibrary::new();
        info!(
            templates = library.templates().len(),
            canvas_w = config.canvas.width,
            canvas_h = config.canvas.height,
            "slide engine initialized"
        );
        Ok(SlideEngine {
            applier: LayoutApplier::new(Arc::clone(&metrics), config.clone()),
            validator: SlideValidator::new(config.clone()),
            fixer: SlideFixer::new(Arc::clone(&metrics), config.clone()),
            metrics,
            library,
            config,
        })
    }

    /// Default configuration with the built-in static font tables.
    pub fn with_defaults() -> Result<Self, EngineError> {
        Self::new(EngineConfig::default(), Arc::new(BuiltinMetrics::new()))
    }

    /// Classifies the block, selects a template (explicit hint first, then
    /// category + fallback chain), and binds it into a slide model.
    pub fn select_and_bind(
        &self,
        block: &ContentBlock,
        hint: Option<&str>,
    ) -> SlideGeometryModel {
        let hint = hint.or(block.layout_hint.as_deref());
        let classification = classify(block);
        let template = self.library.select_layout(block, &classification, hint);
        self.applier.bind(block, template, &classification)
    }

    /// Read-only scan; never mutates, never raises on data quality.
    pub fn validate(&self, model: &SlideGeometryModel) -> ValidationResult {
        self.validator.validate(model)
    }

    /// Repairs the model in place under the options' budget and returns the
    /// fix summary plus the final validation result.
    pub fn fix(
        &self,
        model: &mut SlideGeometryModel,
        result: &ValidationResult,
        options: FixOptions,
    ) -> Result<(FixSummary, ValidationResult), EngineError> {
        self.fixer.fix(model, result, options)
    }

    /// Bind → validate → fix in one call, with the config's fix defaults.
    pub fn compose(
        &self,
        block: &ContentBlock,
        hint: Option<&str>,
    ) -> Result<(SlideGeometryModel, FixSummary, ValidationResult), EngineError> {
        let mut model = self.select_and_bind(block, hint);
        let initial = self.validate(&model);
        let (summary, final_result) = self.fix(&mut model, &initial, self.fix_options())?;
        Ok((model, summary, final_result))
    }

    /// Fix options seeded from the engine configuration.
    pub fn fix_options(&self) -> FixOptions {
        FixOptions::from_config(&self.config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn library(&self) -> &LayoutLibrary {
        &self.library
    }

    /// Resolves a template id for callers that must fail on unknown ids
    /// instead of falling back to category selection.
    pub fn template(&self, id: &str) -> Result<&crate::library::LayoutTemplate, EngineError> {
        self.library
            .get(id)
            .ok_or_else(|| EngineError::UnknownTemplate(id.to_string()))
    }

    pub fn metrics(&self) -> &Arc<TextMetricsEngine> {
        &self.metrics
    }
}
