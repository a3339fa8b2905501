//! FTS query sanitization (spec §4.6.1): turns a free-form user query into a
//! safe, valid `symbols_fts` `MATCH` expression, or an empty string.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

/// Articles, prepositions, auxiliaries, and FTS5 operator words. `type` is
/// deliberately absent: it is common in this domain's symbol names and
/// carries search intent.
const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "of", "in", "on", "at", "to", "for", "with", "by", "from", "as", "is", "are",
    "was", "were", "be", "been", "being", "and", "or", "not", "near", "how", "do", "this", "it",
];

fn token_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z0-9_]+\*?").unwrap())
}

/// Lowercases, tokenizes on whitespace/punctuation, drops short tokens and
/// stop-words, dedupes preserving first-seen order, and joins the remainder
/// with `OR`. Trailing-`*` tokens are kept as FTS prefix queries and left
/// unquoted; everything else is double-quoted so punctuation inside a token
/// (there is none, by construction) can never break the expression.
pub fn sanitize_fts_query(input: &str) -> String {
    let lower = input.to_lowercase();
    let mut seen: HashSet<String> = HashSet::new();
    let mut tokens: Vec<(String, bool)> = Vec::new();

    for m in token_pattern().find_iter(&lower) {
        let raw = m.as_str();
        let (stem, is_wildcard) = match raw.strip_suffix('*') {
            Some(s) => (s, true),
            None => (raw, false),
        };
        if stem.len() < 2 {
            continue;
        }
        if !is_wildcard && STOP_WORDS.contains(&stem) {
            continue;
        }
        let token = if is_wildcard {
            format!("{stem}*")
        } else {
            stem.to_string()
        };
        if seen.insert(token.clone()) {
            tokens.push((token, is_wildcard));
        }
    }

    if tokens.is_empty() {
        return String::new();
    }

    tokens
        .into_iter()
        .map(|(tok, wildcard)| if wildcard { tok } else { format!("\"{tok}\"") })
        .collect::<Vec<_>>()
        .join(" OR ")
}
