//! Content analysis: language, tables and images in freshly parsed text.
//!
//! Everything here is a cheap deterministic heuristic over the extracted
//! Markdown; no network call and no model. Language detection counts
//! function words ("stop words") per candidate language, which is reliable
//! for the paragraph-sized inputs a parsed PDF produces.

use crate::document::ContentAnalysis;
use once_cell::sync::Lazy;
use regex::Regex;

/// Returned when no language can be determined.
pub const UNKNOWN_LANGUAGE: &str = "unknown";

/// Only the first words are scored; more text rarely changes the answer.
const MAX_WORDS: usize = 2000;
/// Minimum stop-word hits before a language is reported.
const MIN_HITS: usize = 2;

static STOP_WORDS: &[(&str, &[&str])] = &[
    (
        "en",
        &[
            "the", "and", "of", "to", "is", "that", "it", "with", "for", "this", "are", "was",
            "be", "have", "from", "which", "not", "by", "on", "they", "you", "he",
        ],
    ),
    (
        "de",
        &[
            "der", "die", "das", "und", "ist", "nicht", "ein", "eine", "zu", "den", "dem", "mit",
            "sich", "auf", "für", "von", "auch", "es", "sind", "im", "des", "wird", "werden",
            "bei",
        ],
    ),
    (
        "fr",
        &[
            "le", "les", "et", "est", "une", "des", "du", "dans", "pour", "qui", "que", "pas",
            "sur", "au", "avec", "ce", "sont", "il", "elle", "nous", "vous", "aux", "mais",
        ],
    ),
    (
        "es",
        &[
            "el", "los", "las", "y", "es", "una", "del", "que", "en", "por", "con", "para", "se",
            "su", "al", "lo", "como", "más", "pero", "sus", "está", "son",
        ],
    ),
    (
        "it",
        &[
            "il", "di", "che", "e", "la", "per", "una", "sono", "non", "gli", "del", "della",
            "nel", "con", "si", "lo", "anche", "come", "più", "questo", "è",
        ],
    ),
    (
        "nl",
        &[
            "de", "het", "een", "en", "van", "is", "dat", "niet", "op", "te", "zijn", "voor",
            "met", "die", "ook", "als", "aan", "er", "maar", "wordt", "bij",
        ],
    ),
    (
        "pt",
        &[
            "o", "os", "as", "e", "de", "do", "da", "dos", "das", "que", "não", "em", "um", "uma",
            "para", "com", "por", "se", "mais", "é", "são", "está",
        ],
    ),
];

/// A GFM header row directly followed by a separator row.
static RE_MD_TABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*\|.*\|\s*\r?\n\s*\|\s*:?-+").unwrap());

/// `![alt](target)`
static RE_MD_IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").unwrap());

/// Analyse parsed text. `embedded_images` is the number of images the parse
/// service returned; any image counts as image presence.
pub fn analyze(text: &str, embedded_images: usize) -> ContentAnalysis {
    ContentAnalysis {
        language: detect_language(text),
        has_tables: contains_tables(text),
        has_images: embedded_images > 0 || contains_images(text),
    }
}

/// ISO 639-1 code of the dominant language, or [`UNKNOWN_LANGUAGE`].
pub fn detect_language(text: &str) -> String {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .take(MAX_WORDS)
        .collect();

    let mut best: Option<(&str, usize)> = None;
    for (code, list) in STOP_WORDS {
        let hits = words.iter().filter(|w| list.contains(w)).count();
        if best.is_none_or(|(_, top)| hits > top) {
            best = Some((code, hits));
        }
    }

    match best {
        Some((code, hits)) if hits >= MIN_HITS => code.to_string(),
        _ => UNKNOWN_LANGUAGE.to_string(),
    }
}

/// True when the text contains a Markdown (GFM) table.
pub fn contains_tables(text: &str) -> bool {
    RE_MD_TABLE.is_match(text)
}

/// True when the text references an image in Markdown syntax.
pub fn contains_images(text: &str) -> bool {
    RE_MD_IMAGE.is_match(text)
}
