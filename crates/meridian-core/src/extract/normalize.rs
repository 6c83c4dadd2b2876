//! HPI text normalization.
//!
//! Produces a lowercase working copy with a fixed abbreviation table
//! expanded, punctuation reduced to whitespace, and token offsets kept so
//! later passes can reason over token windows and report evidence spans.

/// A word token with byte offsets into the normalized text.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Normalized working copy of an HPI.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedText {
    pub text: String,
    pub tokens: Vec<Token>,
}

impl NormalizedText {
    /// Index of the first token starting at or after a byte offset.
    pub fn token_index_at(&self, byte_offset: usize) -> usize {
        self.tokens
            .iter()
            .position(|t| t.start >= byte_offset)
            .unwrap_or(self.tokens.len())
    }

    /// Snippet of up to `context` tokens either side of a token range,
    /// used for evidence spans.
    pub fn snippet(&self, token_start: usize, token_end: usize, context: usize) -> String {
        if self.tokens.is_empty() {
            return String::new();
        }
        let lo = token_start.saturating_sub(context);
        let hi = (token_end + context).min(self.tokens.len());
        let start = self.tokens[lo].start;
        let end = self.tokens[hi - 1].end;
        self.text[start..end].to_string()
    }
}

/// Fixed clinical abbreviation table, applied on word boundaries.
/// Slash forms are expanded before punctuation is stripped.
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("htn", "hypertension"),
    ("dm", "diabetes"),
    ("sob", "dyspnea"),
    ("osa", "obstructive sleep apnea"),
    ("uri", "upper respiratory infection"),
    ("cad", "coronary artery disease"),
    ("ckd", "chronic kidney disease"),
    ("chf", "congestive heart failure"),
    ("gerd", "gastroesophageal reflux disease"),
    ("pt", "patient"),
    ("h/o", "history of"),
    ("s/p", "status post"),
    ("w/o", "without"),
    ("m/o", "male"),
    ("f/o", "female"),
    ("y/o", "year old"),
    ("yo", "year old"),
];

/// Normalize raw HPI text into a tokenized working copy.
pub fn normalize(raw: &str) -> NormalizedText {
    let mut working = raw.to_lowercase();

    for (abbrev, expansion) in ABBREVIATIONS {
        working = expand_word(&working, abbrev, expansion);
    }

    // Reduce punctuation to whitespace so token scans see clean words.
    // Digits keep '.' for decimal weights.
    let mut cleaned = String::with_capacity(working.len());
    let chars: Vec<char> = working.chars().collect();
    for (i, c) in chars.iter().enumerate() {
        if c.is_alphanumeric() {
            cleaned.push(*c);
        } else if *c == '.'
            && i > 0
            && chars[i - 1].is_ascii_digit()
            && chars.get(i + 1).map(|n| n.is_ascii_digit()).unwrap_or(false)
        {
            cleaned.push(*c);
        } else {
            cleaned.push(' ');
        }
    }

    // Collapse whitespace.
    let text = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut tokens = Vec::new();
    let mut offset = 0usize;
    for word in text.split(' ') {
        if !word.is_empty() {
            tokens.push(Token {
                text: word.to_string(),
                start: offset,
                end: offset + word.len(),
            });
        }
        offset += word.len() + 1;
    }

    NormalizedText { text, tokens }
}

/// Replace whole-word occurrences of `word` with `replacement`.
fn expand_word(text: &str, word: &str, replacement: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < text.len() {
        if text[i..].starts_with(word) {
            let before_ok = i == 0 || !is_word_byte(bytes[i - 1]);
            let after = i + word.len();
            let after_ok = after >= text.len() || !is_word_byte(bytes[after]);
            if before_ok && after_ok {
                out.push_str(replacement);
                i = after;
                continue;
            }
        }
        // Advance one char, not one byte.
        let ch_len = text[i..].chars().next().map(|c| c.len_utf8()).unwrap_or(1);
        out.push_str(&text[i..i + ch_len]);
        i += ch_len;
    }
    out
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric()
}

/// Word-boundary search for a phrase in normalized text. Returns byte
/// offsets of every match.
pub fn find_word_boundary_matches(text: &str, phrase: &str) -> Vec<(usize, usize)> {
    let mut matches = Vec::new();
    if phrase.is_empty() {
        return matches;
    }
    let bytes = text.as_bytes();
    let mut from = 0;
    while let Some(pos) = text[from..].find(phrase) {
        let start = from + pos;
        let end = start + phrase.len();
        let before_ok = start == 0 || !is_word_byte(bytes[start - 1]);
        let after_ok = end >= text.len() || !is_word_byte(bytes[end]);
        if before_ok && after_ok {
            matches.push((start, end));
        }
        from = start + 1;
    }
    matches
}
