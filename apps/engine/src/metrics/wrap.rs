//! Language-aware line breaking and smart truncation.
//!
//! Wrapping is greedy word wrap driven by a caller-supplied width function,
//! so the same code path serves exact table metrics and the per-script
//! fallback. Korean (agglutinative) text keeps trailing grammatical
//! particles glued to the preceding token when a hard break is unavoidable;
//! dense CJK text wraps per character.

use serde::{Deserialize, Serialize};

use crate::metrics::provider::{is_cjk, is_hangul};

/// Ellipsis marker appended by `truncate`. One char.
pub const ELLIPSIS: char = '…';

/// Script profile steering line-break behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LanguageProfile {
    /// Break at word boundaries (Latin and friends).
    SpaceDelimited,
    /// Word boundaries, with trailing particles non-breakable (Korean).
    Agglutinative,
    /// Break between characters (Chinese, Japanese).
    CjkDense,
}

/// Trailing grammatical particles that must not start a line.
/// Longer particles first so suffix matching is greedy.
const KOREAN_PARTICLES: &[&str] = &[
    "에서", "부터", "까지", "은", "는", "이", "가", "을", "를", "의", "에", "와", "과", "도", "만",
];

/// Classifies text by dominant script: >30% Hangul ⇒ agglutinative,
/// >30% CJK ideographs/kana ⇒ dense, else space-delimited.
pub fn detect_profile(text: &str) -> LanguageProfile {
    let total = text.chars().filter(|c| !c.is_whitespace()).count();
    if total == 0 {
        return LanguageProfile::SpaceDelimited;
    }
    let hangul = text.chars().filter(|c| is_hangul(*c)).count();
    let cjk = text.chars().filter(|c| is_cjk(*c)).count();
    if hangul as f32 / total as f32 > 0.3 {
        LanguageProfile::Agglutinative
    } else if cjk as f32 / total as f32 > 0.3 {
        LanguageProfile::CjkDense
    } else {
        LanguageProfile::SpaceDelimited
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Wrapping
// ────────────────────────────────────────────────────────────────────────────

/// Greedy wrap to `max_width`. `measure` returns the width of a fragment in
/// the caller's units (points at the current font size).
///
/// Explicit newlines are respected as paragraph breaks. A single token wider
/// than `max_width` is hard-broken at the last boundary that fits; no token
/// is otherwise split. Empty input yields no lines.
pub fn wrap_text<F>(text: &str, max_width: f32, profile: LanguageProfile, measure: F) -> Vec<String>
where
    F: Fn(&str) -> f32,
{
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        match profile {
            LanguageProfile::CjkDense => wrap_dense(paragraph, max_width, &measure, &mut lines),
            _ => wrap_words(paragraph, max_width, profile, &measure, &mut lines),
        }
    }
    lines
}

fn wrap_words<F>(
    paragraph: &str,
    max_width: f32,
    profile: LanguageProfile,
    measure: &F,
    lines: &mut Vec<String>,
) where
    F: Fn(&str) -> f32,
{
    let words: Vec<&str> = paragraph.split_whitespace().collect();
    if words.is_empty() {
        return;
    }
    let space_w = measure(" ");
    let mut current = String::new();
    let mut current_width = 0.0_f32;

    for word in words {
        let word_w = measure(word);

        if word_w > max_width {
            // Oversized token: flush the current line, then hard-break.
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
                current_width = 0.0;
            }
            let mut rest = word.to_string();
            while measure(rest.as_str()) > max_width {
                let cut = hard_break_index(&rest, max_width, profile, measure);
                let chars: Vec<char> = rest.chars().collect();
                let head: String = chars[..cut].iter().collect();
                let tail: String = chars[cut..].iter().collect();
                lines.push(head);
                rest = tail;
            }
            current_width = measure(rest.as_str());
            current = rest;
            continue;
        }

        let sep = if current.is_empty() { 0.0 } else { space_w };
        if !current.is_empty() && current_width + sep + word_w > max_width {
            lines.push(std::mem::take(&mut current));
            current = word.to_string();
            current_width = word_w;
        } else {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
            current_width += sep + word_w;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
}

fn wrap_dense<F>(paragraph: &str, max_width: f32, measure: &F, lines: &mut Vec<String>)
where
    F: Fn(&str) -> f32,
{
    let mut current = String::new();
    let mut current_width = 0.0_f32;
    for c in paragraph.chars() {
        if c.is_whitespace() {
            continue;
        }
        let cw = measure(&c.to_string());
        if !current.is_empty() && current_width + cw > max_width {
            lines.push(std::mem::take(&mut current));
            current_width = 0.0;
        }
        current.push(c);
        current_width += cw;
    }
    if !current.is_empty() {
        lines.push(current);
    }
}

/// Index (in chars) where an oversized token is hard-broken: the largest
/// prefix that fits, pulled back so an agglutinative particle stays attached
/// to its stem rather than opening the next line.
fn hard_break_index<F>(token: &str, max_width: f32, profile: LanguageProfile, measure: &F) -> usize
where
    F: Fn(&str) -> f32,
{
    let chars: Vec<char> = token.chars().collect();
    let mut fit = 0usize;
    let mut width = 0.0_f32;
    for (i, c) in chars.iter().enumerate() {
        width += measure(&c.to_string());
        if width > max_width {
            break;
        }
        fit = i + 1;
    }
    // Even a single char may exceed a degenerate width; always make progress.
    let fit = fit.max(1);

    if profile == LanguageProfile::Agglutinative && fit < chars.len() {
        let prefix: String = chars[..fit].iter().collect();
        if let Some(after_particle) = last_particle_end(&prefix) {
            if after_particle > 0 && after_particle < fit {
                return after_particle;
            }
        }
    }
    fit
}

/// Char index just past the last Korean particle in `s`, if any.
fn last_particle_end(s: &str) -> Option<usize> {
    let chars: Vec<char> = s.chars().collect();
    let mut best: Option<usize> = None;
    for particle in KOREAN_PARTICLES {
        let plen = particle.chars().count();
        if plen > chars.len() {
            continue;
        }
        for start in 0..=chars.len() - plen {
            let window: String = chars[start..start + plen].iter().collect();
            if window == *particle {
                let end = start + plen;
                if best.map_or(true, |b| end > b) {
                    best = Some(end);
                }
            }
        }
    }
    best
}

// ────────────────────────────────────────────────────────────────────────────
// Truncation
// ────────────────────────────────────────────────────────────────────────────

/// Truncates `text` to at most `max_len` chars plus the ellipsis marker.
///
/// Smart mode prefers the longest sentence-boundary prefix covering ≥ 60%
/// of the budget, then a word boundary covering ≥ 70%, then a hard cut.
/// Input at or under budget is returned unchanged. Output is non-empty for
/// non-empty input.
pub fn truncate(text: &str, max_len: usize, smart: bool) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_len {
        return text.to_string();
    }

    let prefix: String = chars[..max_len].iter().collect();
    if !smart {
        return format!("{prefix}{ELLIPSIS}");
    }

    let prefix_chars: Vec<char> = prefix.chars().collect();
    let sentence_floor = (max_len as f32 * 0.6) as usize;
    let word_floor = (max_len as f32 * 0.7) as usize;

    // Sentence boundary: keep the terminator.
    if let Some(pos) = prefix_chars
        .iter()
        .rposition(|&c| matches!(c, '.' | '!' | '?' | '。' | '！' | '？'))
    {
        if pos + 1 >= sentence_floor {
            let head: String = prefix_chars[..=pos].iter().collect();
            return format!("{head}{ELLIPSIS}");
        }
    }

    // Word boundary: drop the trailing space.
    if let Some(pos) = prefix_chars.iter().rposition(|c| *c == ' ') {
        if pos >= word_floor {
            let head: String = prefix_chars[..pos].iter().collect();
            return format!("{head}{ELLIPSIS}");
        }
    }

    format!("{prefix}{ELLIPSIS}")
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Uniform 1.0-per-char width makes expected break points countable.
    fn char_count_measure(s: &str) -> f32 {
        s.chars().count() as f32
    }

    // ── detect_profile ──────────────────────────────────────────────────────

    #[test]
    fn test_detect_profile_english() {
        assert_eq!(
            detect_profile("Quarterly revenue grew 14%"),
            LanguageProfile::SpaceDelimited
        );
    }

    #[test]
    fn test_detect_profile_korean() {
        assert_eq!(
            detect_profile("분기 매출이 성장했습니다"),
            LanguageProfile::Agglutinative
        );
    }

    #[test]
    fn test_detect_profile_chinese() {
        assert_eq!(detect_profile("季度收入增长了"), LanguageProfile::CjkDense);
    }

    #[test]
    fn test_detect_profile_empty_defaults_to_space() {
        assert_eq!(detect_profile(""), LanguageProfile::SpaceDelimited);
    }

    // ── wrap_text ───────────────────────────────────────────────────────────

    #[test]
    fn test_wrap_empty_yields_no_lines() {
        let lines = wrap_text("", 20.0, LanguageProfile::SpaceDelimited, char_count_measure);
        assert!(lines.is_empty());
    }

    #[test]
    fn test_wrap_single_short_word_one_line() {
        let lines = wrap_text(
            "hello",
            20.0,
            LanguageProfile::SpaceDelimited,
            char_count_measure,
        );
        assert_eq!(lines, vec!["hello"]);
    }

    #[test]
    fn test_wrap_breaks_at_word_boundaries() {
        // 10-wide lines: "aaa bbb" is 7, adding " ccc" would be 11.
        let lines = wrap_text(
            "aaa bbb ccc",
            10.0,
            LanguageProfile::SpaceDelimited,
            char_count_measure,
        );
        assert_eq!(lines, vec!["aaa bbb", "ccc"]);
    }

    #[test]
    fn test_wrap_never_splits_fitting_token() {
        let lines = wrap_text(
            "alpha beta gamma delta",
            7.0,
            LanguageProfile::SpaceDelimited,
            char_count_measure,
        );
        for line in &lines {
            for word in line.split(' ') {
                assert!(
                    ["alpha", "beta", "gamma", "delta"].contains(&word),
                    "token was split: {word}"
                );
            }
        }
    }

    #[test]
    fn test_wrap_hard_breaks_oversized_token() {
        let lines = wrap_text(
            "abcdefghij",
            4.0,
            LanguageProfile::SpaceDelimited,
            char_count_measure,
        );
        assert_eq!(lines, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_wrap_respects_explicit_newlines() {
        let lines = wrap_text(
            "one\ntwo",
            20.0,
            LanguageProfile::SpaceDelimited,
            char_count_measure,
        );
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[test]
    fn test_wrap_dense_breaks_per_char() {
        let lines = wrap_text("漢字漢字漢", 2.0, LanguageProfile::CjkDense, |s| {
            s.chars().count() as f32
        });
        assert_eq!(lines, vec!["漢字", "漢字", "漢"]);
    }

    #[test]
    fn test_korean_particle_not_stranded() {
        // "서울에서출발" hard-broken at width 5 would strand "서출발";
        // the particle-aware break cuts after "에서" instead.
        let lines = wrap_text("서울에서출발합니다", 5.0, LanguageProfile::Agglutinative, |s| {
            s.chars().count() as f32
        });
        assert_eq!(lines[0], "서울에서");
    }

    // ── truncate ────────────────────────────────────────────────────────────

    #[test]
    fn test_truncate_short_input_unchanged() {
        assert_eq!(truncate("short", 10, true), "short");
        assert_eq!(truncate("exact", 5, true), "exact");
    }

    #[test]
    fn test_truncate_length_bound_holds() {
        for max_len in [1usize, 5, 20, 80] {
            let long = "word ".repeat(50);
            let out = truncate(&long, max_len, true);
            assert!(
                out.chars().count() <= max_len + 1,
                "len {} exceeds bound {} + ellipsis",
                out.chars().count(),
                max_len
            );
        }
    }

    #[test]
    fn test_truncate_prefers_sentence_boundary() {
        let text = "First sentence ends here. Second sentence is much longer and runs on.";
        let out = truncate(text, 30, true);
        assert_eq!(out, format!("First sentence ends here.{ELLIPSIS}"));
    }

    #[test]
    fn test_truncate_falls_back_to_word_boundary() {
        let text = "alpha beta gamma delta epsilon zeta";
        let out = truncate(text, 22, true);
        assert!(out.ends_with(ELLIPSIS));
        // No mid-word cut: everything before the ellipsis is whole words.
        let body: String = out.chars().take(out.chars().count() - 1).collect();
        for word in body.split(' ') {
            assert!(text.contains(word), "word fragment in output: {word}");
        }
    }

    #[test]
    fn test_truncate_hard_cut_when_no_boundary() {
        let out = truncate("abcdefghijklmnop", 8, true);
        assert_eq!(out, format!("abcdefgh{ELLIPSIS}"));
    }

    #[test]
    fn test_truncate_dumb_mode_hard_cuts() {
        let out = truncate("alpha beta gamma", 7, false);
        assert_eq!(out, format!("alpha b{ELLIPSIS}"));
    }

    #[test]
    fn test_truncate_nonempty_for_nonempty_input() {
        assert!(!truncate("abc", 0, true).is_empty());
    }
}
