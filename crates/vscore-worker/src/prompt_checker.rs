//! Music prompt validation and improvement.
//!
//! Pure text processing: strips terms the music service rejects, keeps the
//! prompt within the length limit, and makes sure it names at least one
//! style or instrument. Checking never fails; the worst case is the
//! fallback prompt.

use std::sync::LazyLock;

use regex::Regex;
use vscore_models::encoding::FALLBACK_PROMPT;

pub const DEFAULT_PROMPT_MAX_LENGTH: usize = 500;

/// Below this the appended style cue would not fit.
const MIN_PROMPT_MAX_LENGTH: usize = 100;

/// Prompts shorter than this lose quality points.
const SHORT_PROMPT_CHARS: usize = 20;

const INSTRUMENT_CUE: &str = "featuring piano and strings";

const PROBLEMATIC_CHARS: &[char] = &['<', '>', '&', '"', '\'', '\\', '/', '|'];

const PROBLEMATIC_WORDS: &[&str] = &[
    "copyright",
    "trademark",
    "brand",
    "explicit",
    "offensive",
    "inappropriate",
    "illegal",
    "unauthorized",
    "stolen",
    "plagiarized",
    "ripped off",
];

const STYLE_TERMS: &[&str] = &[
    "film score",
    "trailer music",
    "ambient",
    "electronic",
    "orchestral",
    "jazz",
    "rock",
    "pop",
    "classical",
    "folk",
    "world",
    "experimental",
];

const LOCATION_TERMS: &[&str] = &[
    "studio",
    "concert hall",
    "outdoor",
    "live",
    "recording",
    "los angeles",
    "london",
    "new york",
    "tokyo",
];

const INSTRUMENT_TERMS: &[&str] = &[
    "piano",
    "guitar",
    "drums",
    "bass",
    "strings",
    "brass",
    "synths",
    "percussion",
    "violin",
    "cello",
    "trumpet",
    "saxophone",
];

const MOOD_TERMS: &[&str] = &[
    "peaceful",
    "dramatic",
    "energetic",
    "melancholic",
    "uplifting",
    "dark",
    "bright",
    "mysterious",
    "romantic",
    "tension",
    "relaxing",
];

/// Whole-word, case-insensitive matchers for [`PROBLEMATIC_WORDS`].
static PROBLEMATIC_WORD_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    PROBLEMATIC_WORDS
        .iter()
        .map(|word| {
            let pattern = format!(r"(?i)\b{}\b", regex::escape(word).replace(' ', r"\s+"));
            (*word, Regex::new(&pattern).unwrap())
        })
        .collect()
});

/// Phrases typical of well-formed music prompts.
static FORMAT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)([A-Z][a-z]+)\s+(Film Score|Trailer Music|Background Music)").unwrap(),
        Regex::new(r"(?i)(Studio|Live|Concert)\s+recording").unwrap(),
        Regex::new(r"(?i)(Pristine|Contemporary|Modern)\s+(Instrumental|Music)").unwrap(),
        Regex::new(r"(?i)(featuring|with|including)\s+[a-z\s]+(instruments?|elements?)").unwrap(),
    ]
});

/// Output of [`PromptChecker::check`].
#[derive(Debug, Clone, PartialEq)]
pub struct CheckedPrompt {
    /// Validated prompt; never empty, never longer than the limit
    pub prompt: String,
    /// False when anything was stripped or truncated, or the fallback was used
    pub ok: bool,
    /// Quality score, 0 to 100
    pub score: u8,
    pub issues: Vec<String>,
    pub used_fallback: bool,
}

/// Validates raw prompts against the music service's expectations.
#[derive(Debug, Clone)]
pub struct PromptChecker {
    max_length: usize,
}

impl Default for PromptChecker {
    fn default() -> Self {
        Self::new(DEFAULT_PROMPT_MAX_LENGTH)
    }
}

impl PromptChecker {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length: max_length.max(MIN_PROMPT_MAX_LENGTH),
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn check(&self, raw: &str) -> CheckedPrompt {
        let mut issues = Vec::new();

        let (cleaned, stripped) = sanitize(raw, &mut issues);

        let (body, used_fallback) = if cleaned.is_empty() {
            issues.push("prompt empty after cleaning; using fallback".to_string());
            (FALLBACK_PROMPT.to_string(), true)
        } else {
            (cleaned, false)
        };

        let mut cue = style_cue(&body);
        let (mut prompt, mut truncated) = self.fit(&body, cue.as_deref());
        // Truncation may have cut the only style or instrument term.
        if cue.is_none() && truncated {
            cue = style_cue(&prompt);
            if cue.is_some() {
                (prompt, truncated) = self.fit(&body, cue.as_deref());
            }
        }
        if let Some(cue) = &cue {
            issues.push(format!("no style or instrument named; added \"{}\"", cue));
        }
        if truncated {
            issues.push(format!("truncated to {} characters", self.max_length));
        }

        let (score, missing) = score_prompt(&prompt, self.max_length);
        issues.extend(missing);

        CheckedPrompt {
            ok: !(stripped || truncated || used_fallback),
            prompt,
            score,
            issues,
            used_fallback,
        }
    }

    /// Join body and cue, capitalise, punctuate, and keep the result within
    /// the limit by shortening the body only.
    fn fit(&self, body: &str, cue: Option<&str>) -> (String, bool) {
        let body = match cue {
            Some(_) => body.trim_end_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace()),
            None => body,
        };

        let candidate = assemble(body, cue);
        if candidate.chars().count() <= self.max_length {
            return (candidate, false);
        }

        let tail = cue.map(|c| c.chars().count() + 2).unwrap_or(0);
        let budget = self.max_length.saturating_sub(tail + 1);
        let shortened = truncate_at_word(body, budget);
        (assemble(&shortened, cue), true)
    }
}

/// Replace problematic characters, drop disallowed words, collapse whitespace.
fn sanitize(raw: &str, issues: &mut Vec<String>) -> (String, bool) {
    let mut stripped = false;

    let mut text: String = raw
        .chars()
        .map(|c| if PROBLEMATIC_CHARS.contains(&c) { ' ' } else { c })
        .collect();
    if raw.contains(PROBLEMATIC_CHARS) {
        stripped = true;
        issues.push("replaced problematic characters".to_string());
    }

    let mut removed = Vec::new();
    for (word, pattern) in PROBLEMATIC_WORD_PATTERNS.iter() {
        if pattern.is_match(&text) {
            text = pattern.replace_all(&text, " ").into_owned();
            removed.push(*word);
        }
    }
    if !removed.is_empty() {
        stripped = true;
        issues.push(format!("removed disallowed terms: {}", removed.join(", ")));
    }

    (text.split_whitespace().collect::<Vec<_>>().join(" "), stripped)
}

fn contains_any(lower: &str, terms: &[&str]) -> bool {
    terms.iter().any(|t| lower.contains(t))
}

/// Cue to append when the prompt names neither a style nor an instrument.
fn style_cue(prompt: &str) -> Option<String> {
    let lower = prompt.to_lowercase();
    if contains_any(&lower, STYLE_TERMS) || contains_any(&lower, INSTRUMENT_TERMS) {
        return None;
    }
    let style = MOOD_TERMS
        .iter()
        .find(|m| lower.contains(*m))
        .map(|m| capitalize(m))
        .unwrap_or_else(|| "Contemporary".to_string());
    Some(format!("{} Film Score, {}", style, INSTRUMENT_CUE))
}

fn assemble(body: &str, cue: Option<&str>) -> String {
    let mut text = match cue {
        Some(cue) if body.is_empty() => cue.to_string(),
        Some(cue) => format!("{}. {}", body, cue),
        None => body.to_string(),
    };
    text = capitalize(&text);
    if !text.ends_with(['.', '!', '?']) {
        text.push('.');
    }
    text
}

/// Uppercase the first letter when that keeps the length unchanged.
fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => {
            let mut upper = first.to_uppercase();
            match (upper.next(), upper.next()) {
                (Some(u), None) => std::iter::once(u).chain(chars).collect(),
                _ => text.to_string(),
            }
        }
        None => String::new(),
    }
}

/// At most `limit` characters, cut at the last word boundary when there is one.
fn truncate_at_word(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let hard: String = text.chars().take(limit).collect();
    let cut = match hard.rfind(char::is_whitespace) {
        Some(pos) if pos > 0 => &hard[..pos],
        _ => hard.as_str(),
    };
    cut.trim_end_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
        .to_string()
}

/// Quality score and the missing-element notes behind it.
fn score_prompt(prompt: &str, max_length: usize) -> (u8, Vec<String>) {
    let lower = prompt.to_lowercase();
    let mut notes = Vec::new();
    let mut score: i32 = 0;

    let length = prompt.chars().count();
    if length < SHORT_PROMPT_CHARS {
        score -= 30;
        notes.push(format!("prompt shorter than {} characters", SHORT_PROMPT_CHARS));
    } else if length > max_length {
        score -= 20;
    }

    for (category, terms) in [
        ("style", STYLE_TERMS),
        ("location", LOCATION_TERMS),
        ("instruments", INSTRUMENT_TERMS),
        ("mood", MOOD_TERMS),
    ] {
        if contains_any(&lower, terms) {
            score += 5;
        } else {
            score -= 10;
            notes.push(format!("missing {} element", category));
        }
    }

    let format_matches: usize = FORMAT_PATTERNS
        .iter()
        .map(|p| p.find_iter(prompt).count())
        .sum();
    if format_matches < 2 {
        score -= 5;
    }

    if PROBLEMATIC_WORD_PATTERNS.iter().any(|(_, p)| p.is_match(prompt)) {
        score -= 50;
    }
    if prompt.contains(PROBLEMATIC_CHARS) {
        score -= 10;
    }

    ((score + 50).clamp(0, 100) as u8, notes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_formed_prompt_passes_unchanged() {
        let raw = "Dark Hybrid Film Score, Los Angeles, Studio recording, featuring pulsing synths and taiko percussion, tension building.";
        let checked = PromptChecker::default().check(raw);
        assert!(checked.ok);
        assert!(!checked.used_fallback);
        assert_eq!(checked.prompt, raw);
        assert_eq!(checked.score, 70);
    }

    #[test]
    fn test_strips_disallowed_terms_and_characters() {
        let checked = PromptChecker::default()
            .check("upbeat <b>jazz</b> with no copyright issues, ripped off from a BRAND jingle");
        assert!(!checked.ok);
        let lower = checked.prompt.to_lowercase();
        assert!(!lower.contains("copyright"));
        assert!(!lower.contains("ripped off"));
        assert!(!lower.contains("brand"));
        assert!(!checked.prompt.contains(PROBLEMATIC_CHARS));
        assert!(checked.prompt.starts_with("Upbeat b jazz b with no issues"));
        assert!(checked.prompt.ends_with('.'));
    }

    #[test]
    fn test_whole_words_only() {
        let checked = PromptChecker::default().check("Brandenburg concerto style classical strings");
        assert!(checked.ok);
        assert!(checked.prompt.starts_with("Brandenburg"));
    }

    #[test]
    fn test_empty_after_cleaning_uses_fallback() {
        for raw in ["", "   ", "<>&|", "copyright trademark"] {
            let checked = PromptChecker::default().check(raw);
            assert!(checked.used_fallback, "{raw:?}");
            assert!(!checked.ok);
            assert_eq!(checked.prompt, FALLBACK_PROMPT);
        }
    }

    #[test]
    fn test_adds_style_cue_from_mood() {
        let checked = PromptChecker::default().check("a dramatic chase across rooftops at night");
        assert_eq!(
            checked.prompt,
            "A dramatic chase across rooftops at night. Dramatic Film Score, featuring piano and strings."
        );
        assert!(checked.ok);
    }

    #[test]
    fn test_adds_contemporary_cue_without_mood() {
        let checked = PromptChecker::default().check("sunset over a quiet harbour!");
        assert_eq!(
            checked.prompt,
            "Sunset over a quiet harbour. Contemporary Film Score, featuring piano and strings."
        );
    }

    #[test]
    fn test_truncates_at_word_boundary_and_keeps_cue() {
        let checker = PromptChecker::new(120);
        let raw = "waves ".repeat(60);
        let checked = checker.check(&raw);
        assert!(!checked.ok);
        assert!(checked.prompt.chars().count() <= 120);
        assert!(checked.prompt.ends_with("Contemporary Film Score, featuring piano and strings."));
        assert!(checked.prompt.starts_with("Waves waves"));
        assert!(!checked.prompt.contains("wave. "));
    }

    #[test]
    fn test_cue_added_when_truncation_drops_the_only_instrument() {
        let checker = PromptChecker::new(120);
        let raw = format!("{}with soft piano", "calm evening light over the quiet harbour ".repeat(6));
        let checked = checker.check(&raw);
        assert!(!checked.ok);
        assert!(checked.prompt.chars().count() <= 120);
        assert!(checked.prompt.starts_with("Calm evening light"));
        assert!(checked.prompt.ends_with("Contemporary Film Score, featuring piano and strings."));
        assert!(checked.issues.iter().any(|i| i.starts_with("no style or instrument named")));
    }

    #[test]
    fn test_never_empty_never_too_long() {
        let checker = PromptChecker::new(150);
        let long_word = "x".repeat(400);
        let inputs = [
            String::new(),
            "piano".to_string(),
            long_word,
            "orchestral strings ".repeat(40),
            "ß".repeat(300),
            "copyright ".repeat(50),
            "...".to_string(),
        ];
        for raw in &inputs {
            let checked = checker.check(raw);
            assert!(!checked.prompt.trim().is_empty(), "{raw:?}");
            assert!(checked.prompt.chars().count() <= 150, "{raw:?} -> {}", checked.prompt);
        }
    }

    #[test]
    fn test_small_limits_are_raised() {
        assert_eq!(PromptChecker::new(10).max_length(), MIN_PROMPT_MAX_LENGTH);
    }

    #[test]
    fn test_score_penalises_sparse_prompts() {
        let (score, notes) = score_prompt("Piano.", DEFAULT_PROMPT_MAX_LENGTH);
        // -30 short, +5 instruments, -30 for three missing categories, -5 format
        assert_eq!(score, 0);
        assert_eq!(notes.len(), 4);
    }
}
