//! Text measurement engine: cached measurement, binary-search font fitting.
//!
//! One instance is shared (behind `Arc`) by every slide processed by an
//! engine; the measurement cache is the only mutable state crossing slide
//! boundaries. Lookups are cached by `(text, family, size)` with bounded,
//! batched eviction of the oldest entries.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::metrics::provider::{FontMetrics, TextSize};
use crate::metrics::wrap::{self, detect_profile, LanguageProfile};

// ────────────────────────────────────────────────────────────────────────────
// Results
// ────────────────────────────────────────────────────────────────────────────

/// Outcome of fitting text into a box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    /// Chosen font size: the largest fitting size, or `size_min` when
    /// nothing in range fits.
    pub size: u32,
    /// Wrapped lines at `size`.
    pub lines: Vec<String>,
    pub fits: bool,
    /// Residual height past the box at `size`, points. 0 when `fits`.
    pub overflow: f32,
}

/// Cache counters, exposed for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

// ────────────────────────────────────────────────────────────────────────────
// Cache
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    text: String,
    family: String,
    size: u32,
}

/// Evicting this many at once keeps eviction off the per-call hot path.
const EVICT_BATCH: usize = 16;

struct MeasureCache {
    map: HashMap<CacheKey, TextSize>,
    order: VecDeque<CacheKey>,
    capacity: usize,
    hits: u64,
    misses: u64,
    /// Families already reported as unresolved, to keep the log quiet.
    warned_families: HashSet<String>,
}

impl MeasureCache {
    fn new(capacity: usize) -> Self {
        MeasureCache {
            map: HashMap::with_capacity(capacity.min(4096)),
            order: VecDeque::new(),
            capacity,
            hits: 0,
            misses: 0,
            warned_families: HashSet::new(),
        }
    }

    fn get(&mut self, key: &CacheKey) -> Option<TextSize> {
        match self.map.get(key) {
            Some(v) => {
                self.hits += 1;
                Some(*v)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    fn insert(&mut self, key: CacheKey, value: TextSize) {
        if self.map.len() >= self.capacity {
            for _ in 0..EVICT_BATCH.min(self.order.len()) {
                if let Some(old) = self.order.pop_front() {
                    self.map.remove(&old);
                }
            }
        }
        if self.map.insert(key.clone(), value).is_none() {
            self.order.push_back(key);
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Engine
// ────────────────────────────────────────────────────────────────────────────

/// Cached, provider-backed text measurement and font fitting.
pub struct TextMetricsEngine {
    provider: Arc<dyn FontMetrics>,
    line_spacing: f32,
    cache: Mutex<MeasureCache>,
}

impl TextMetricsEngine {
    pub fn new(provider: Arc<dyn FontMetrics>, line_spacing: f32, cache_capacity: usize) -> Self {
        TextMetricsEngine {
            provider,
            line_spacing,
            cache: Mutex::new(MeasureCache::new(cache_capacity.max(1))),
        }
    }

    /// Height of one printed line at `size`.
    pub fn line_height(&self, size: u32) -> f32 {
        size as f32 * self.line_spacing
    }

    /// Single-line dimensions of `text` at `size` points.
    ///
    /// An unresolvable family degrades to the per-script fallback widths —
    /// reduced accuracy, never an error. Results are cached either way.
    pub fn measure(&self, text: &str, family: &str, size: u32) -> TextSize {
        let key = CacheKey {
            text: text.to_string(),
            family: family.to_string(),
            size,
        };
        {
            let mut cache = self.cache.lock();
            if let Some(hit) = cache.get(&key) {
                return hit;
            }
        }

        let measured = match self.provider.measure(text, family, size) {
            Some(m) => m,
            None => {
                let mut cache = self.cache.lock();
                if cache.warned_families.insert(family.to_string()) {
                    warn!(family, "Font family unresolved; using fallback width table");
                }
                drop(cache);
                let em = self.provider.fallback_widths().measure_em(text);
                TextSize {
                    w: em * size as f32,
                    h: size as f32,
                }
            }
        };

        self.cache.lock().insert(key, measured);
        measured
    }

    /// Wraps `text` to `max_width` at the given font, using the profile
    /// detected from the text itself.
    pub fn wrap(&self, text: &str, family: &str, size: u32, max_width: f32) -> Vec<String> {
        let profile = detect_profile(text);
        self.wrap_with_profile(text, family, size, max_width, profile)
    }

    pub fn wrap_with_profile(
        &self,
        text: &str,
        family: &str,
        size: u32,
        max_width: f32,
        profile: LanguageProfile,
    ) -> Vec<String> {
        wrap::wrap_text(text, max_width, profile, |fragment| {
            self.measure(fragment, family, size).w
        })
    }

    /// Smart truncation to a character budget. Pure passthrough, kept here
    /// so callers need only one handle.
    pub fn truncate(&self, text: &str, max_len: usize, smart: bool) -> String {
        wrap::truncate(text, max_len, smart)
    }

    /// Largest integer size in `[size_min, size_max]` whose wrapped height
    /// fits `box_h`, found by binary search seeded at `initial_guess`.
    ///
    /// If even `size_min` overflows, returns `fits = false` with the
    /// best-effort wrap at `size_min` and the residual overflow height.
    /// Sound because wrapped height is monotone in font size (provider
    /// contract).
    #[allow(clippy::too_many_arguments)]
    pub fn fit_to_box(
        &self,
        text: &str,
        family: &str,
        box_w: f32,
        box_h: f32,
        size_min: u32,
        size_max: u32,
        initial_guess: u32,
    ) -> FitResult {
        let lo_bound = size_min.min(size_max).max(1);
        let hi_bound = size_max.max(size_min);
        let profile = detect_profile(text);

        if text.trim().is_empty() {
            return FitResult {
                size: initial_guess.clamp(lo_bound, hi_bound),
                lines: Vec::new(),
                fits: true,
                overflow: 0.0,
            };
        }

        let eval = |size: u32| -> (Vec<String>, f32) {
            let lines = self.wrap_with_profile(text, family, size, box_w, profile);
            let height = lines.len() as f32 * self.line_height(size);
            (lines, height)
        };

        let (min_lines, min_height) = eval(lo_bound);
        if min_height > box_h {
            return FitResult {
                size: lo_bound,
                lines: min_lines,
                fits: false,
                overflow: min_height - box_h,
            };
        }

        let guess = initial_guess.clamp(lo_bound, hi_bound);
        let (mut lo, mut hi) = if eval(guess).1 <= box_h {
            (guess, hi_bound)
        } else {
            (lo_bound, guess - 1)
        };
        while lo < hi {
            let mid = lo + (hi - lo + 1) / 2;
            if eval(mid).1 <= box_h {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }

        let (lines, height) = eval(lo);
        debug!(
            size = lo,
            lines = lines.len(),
            height,
            "fit_to_box resolved"
        );
        FitResult {
            size: lo,
            lines,
            fits: true,
            overflow: 0.0,
        }
    }

    /// Rough character budget for a box at a fixed size: lines that fit ×
    /// average chars per line. Used to pick truncation lengths.
    pub fn char_budget(&self, family: &str, size: u32, box_w: f32, box_h: f32) -> usize {
        let line_count = (box_h / self.line_height(size)).floor().max(1.0) as usize;
        let avg_char = self.measure("n", family, size).w.max(1.0);
        let per_line = (box_w / avg_char).floor().max(1.0) as usize;
        line_count * per_line
    }

    pub fn cache_stats(&self) -> CacheStats {
        let cache = self.cache.lock();
        CacheStats {
            hits: cache.hits,
            misses: cache.misses,
            entries: cache.map.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::provider::BuiltinMetrics;

    fn make_engine() -> TextMetricsEngine {
        TextMetricsEngine::new(Arc::new(BuiltinMetrics::new()), 1.2, 256)
    }

    #[test]
    fn test_measure_caches_results() {
        let engine = make_engine();
        let first = engine.measure("Quarterly revenue", "Arial", 14);
        let second = engine.measure("Quarterly revenue", "Arial", 14);
        assert_eq!(first, second);
        let stats = engine.cache_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_cache_eviction_is_bounded() {
        let engine = TextMetricsEngine::new(Arc::new(BuiltinMetrics::new()), 1.2, 32);
        for i in 0..200 {
            engine.measure(&format!("text {i}"), "Arial", 12);
        }
        assert!(engine.cache_stats().entries <= 32);
    }

    #[test]
    fn test_unknown_family_degrades_not_fails() {
        let engine = make_engine();
        let m = engine.measure("fallback text", "No Such Font", 12);
        assert!(m.w > 0.0);
        assert!(m.h > 0.0);
    }

    #[test]
    fn test_fit_picks_largest_fitting_size() {
        let engine = make_engine();
        // Wide, tall box: short text should land at size_max.
        let fit = engine.fit_to_box("Title", "Arial", 600.0, 100.0, 10, 32, 20);
        assert!(fit.fits);
        assert_eq!(fit.size, 32);
    }

    #[test]
    fn test_fit_reports_overflow_at_min() {
        let engine = make_engine();
        let text = "A very long passage. ".repeat(40);
        let fit = engine.fit_to_box(&text, "Arial", 200.0, 40.0, 10, 18, 14);
        assert!(!fit.fits);
        assert_eq!(fit.size, 10);
        assert!(fit.overflow > 0.0);
        assert!(!fit.lines.is_empty(), "best-effort wrap must be returned");
    }

    #[test]
    fn test_fit_monotone_height_in_size() {
        let engine = make_engine();
        let text = "Consistent growth across all reporting segments this quarter";
        let height_at = |size: u32| {
            let lines = engine.wrap(text, "Arial", size, 300.0);
            lines.len() as f32 * engine.line_height(size)
        };
        let mut prev = 0.0;
        for size in 8..=32 {
            let h = height_at(size);
            assert!(
                h >= prev - 1e-3,
                "height not monotone: {prev} -> {h} at size {size}"
            );
            prev = h;
        }
    }

    #[test]
    fn test_fit_result_is_within_requested_range() {
        let engine = make_engine();
        let text = "Revenue grew fourteen percent year over year";
        for guess in [10u32, 14, 18, 24] {
            let fit = engine.fit_to_box(text, "Calibri", 240.0, 60.0, 10, 24, guess);
            assert!((10..=24).contains(&fit.size), "size {} escaped range", fit.size);
        }
    }

    #[test]
    fn test_fit_guess_does_not_change_answer() {
        let engine = make_engine();
        let text = "Operating margin expanded on lower infrastructure spend";
        let baseline = engine.fit_to_box(text, "Arial", 300.0, 50.0, 9, 28, 9);
        for guess in [12u32, 18, 28] {
            let fit = engine.fit_to_box(text, "Arial", 300.0, 50.0, 9, 28, guess);
            assert_eq!(fit.size, baseline.size, "guess {guess} changed the result");
        }
    }

    #[test]
    fn test_fit_empty_text_fits_trivially() {
        let engine = make_engine();
        let fit = engine.fit_to_box("", "Arial", 100.0, 20.0, 10, 18, 14);
        assert!(fit.fits);
        assert!(fit.lines.is_empty());
    }

    #[test]
    fn test_char_budget_scales_with_box() {
        let engine = make_engine();
        let small = engine.char_budget("Arial", 14, 100.0, 30.0);
        let large = engine.char_budget("Arial", 14, 400.0, 120.0);
        assert!(large > small * 4, "budget should scale with area");
    }

    #[test]
    fn test_concurrent_measure_is_safe() {
        let engine = Arc::new(make_engine());
        let mut handles = Vec::new();
        for t in 0..4 {
            let engine = Arc::clone(&engine);
            handles.push(std::thread::spawn(move || {
                for i in 0..50 {
                    engine.measure(&format!("thread {t} item {i}"), "Arial", 12);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        let stats = engine.cache_stats();
        assert_eq!(stats.misses, 200);
    }
}
