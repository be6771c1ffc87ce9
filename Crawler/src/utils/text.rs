// src/utils/text.rs

//! Name normalization and keyword matching.

use unicode_segmentation::UnicodeSegmentation;

/// Characters treated as word separators in result names.
const SEPARATORS: &[char] = &[
    '\\', '/', '%', '_', ';', '-', '.', '(', ')', '[', ']', '&', '~', '{', '}', '*', '@', '^',
    '\'', '=', '!', ',', '|', '#', '+', ':',
];

/// Noise fragments removed before splitting.
const NOISE: &[&str] = &[".torrent", "www.", ".com", ".net"];

/// Normalize a display name: lowercase, strip common noise fragments,
/// punctuation to spaces, collapse whitespace.
///
/// Two names that differ only in separators or case normalize to the same
/// string, which makes this a good grouping key.
pub fn normalize_name(name: &str) -> String {
    let mut text = name.to_lowercase();
    for fragment in NOISE {
        text = text.replace(fragment, " ");
    }
    let text: String = text
        .chars()
        .map(|c| if SEPARATORS.contains(&c) { ' ' } else { c })
        .collect();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split search keywords into unique, normalized tokens, dropping stopwords.
pub fn tokenize_keywords(keywords: &str) -> Vec<String> {
    let normalized = normalize_name(keywords);
    let mut tokens: Vec<String> = Vec::new();
    for word in normalized.unicode_words() {
        if is_stopword(word) || tokens.iter().any(|t| t == word) {
            continue;
        }
        tokens.push(word.to_string());
    }
    tokens
}

/// True when any keyword is contained in the normalized name or is within
/// half its length in edit distance of it.
pub fn matches_any_keyword(keywords: &[String], name: &str) -> bool {
    let normalized = normalize_name(name);
    keywords.iter().any(|keyword| {
        let keyword = keyword.to_lowercase();
        normalized.contains(&keyword) || is_fuzzy_match(&normalized, &keyword)
    })
}

fn is_fuzzy_match(text: &str, keyword: &str) -> bool {
    let threshold = text.chars().count().max(keyword.chars().count()) / 2;
    strsim::levenshtein(text, keyword) <= threshold
}

/// Common stopwords (English, Spanish, German).
fn is_stopword(word: &str) -> bool {
    const STOPWORDS: &[&str] = &[
        // English
        "and", "the", "a", "on", "in", "of", "for", "to", "is", "it", "at", "by", "an", "or",
        "as", "be", "with", "this", "that", "from", "but", "about", "so", "than",
        // Spanish
        "y", "el", "la", "los", "las", "un", "una", "en", "de", "para", "por", "con", "del",
        // German
        "und", "der", "die", "ein", "eine", "im", "auf", "zu", "mit", "von", "das",
    ];
    STOPWORDS.contains(&word)
}
