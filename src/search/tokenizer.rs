//! Markup stripping and keyword filtering.

use std::collections::HashSet;
use std::sync::OnceLock;

/// Tokens of this length or shorter are discarded.
pub const MAX_DISCARDED_LEN: usize = 2;

const STOP_WORDS: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "you're", "you've",
    "you'll", "you'd", "your", "yours", "yourself", "yourselves", "he", "him", "his", "himself",
    "she", "she's", "her", "hers", "herself", "it", "it's", "its", "itself", "they", "them",
    "their", "theirs", "themselves", "what", "which", "who", "whom", "this", "that", "that'll",
    "these", "those", "am", "is", "are", "was", "were", "be", "been", "being", "have", "has",
    "had", "having", "do", "does", "did", "doing", "a", "an", "the", "and", "but", "if", "or",
    "because", "as", "until", "while", "of", "at", "by", "for", "with", "about", "against",
    "between", "into", "through", "during", "before", "after", "above", "below", "to", "from",
    "up", "down", "in", "out", "on", "off", "over", "under", "again", "further", "then", "once",
    "here", "there", "when", "where", "why", "how", "all", "any", "both", "each", "few", "more",
    "most", "other", "some", "such", "no", "nor", "not", "only", "own", "same", "so", "than",
    "too", "very", "s", "t", "can", "will", "just", "don", "don't", "should", "should've", "now",
    "d", "ll", "m", "o", "re", "ve", "y", "ain", "aren", "aren't", "couldn", "couldn't", "didn",
    "didn't", "doesn", "doesn't", "hadn", "hadn't", "hasn", "hasn't", "haven", "haven't", "isn",
    "isn't", "ma", "mightn", "mightn't", "mustn", "mustn't", "needn", "needn't", "shan", "shan't",
    "shouldn", "shouldn't", "wasn", "wasn't", "weren", "weren't", "won", "won't", "wouldn",
    "wouldn't",
];

fn stop_words() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| STOP_WORDS.iter().copied().collect())
}

pub fn is_stop_word(word: &str) -> bool {
    stop_words().contains(word)
}

/// Lowercases ASCII letters and turns every other run of bytes into a single
/// space. Anything between `<` and `>` is dropped, nested or not.
pub fn strip_content(body: &[u8]) -> String {
    let mut out = String::with_capacity(body.len());
    let mut depth = 0usize;
    let mut pending_space = false;

    for &byte in body {
        match byte {
            b'<' => {
                depth += 1;
                pending_space = true;
            }
            b'>' => {
                depth = depth.saturating_sub(1);
                pending_space = true;
            }
            _ if depth == 0 && byte.is_ascii_alphabetic() => {
                if pending_space && !out.is_empty() {
                    out.push(' ');
                }
                pending_space = false;
                out.push(char::from(byte.to_ascii_lowercase()));
            }
            _ => pending_space = true,
        }
    }
    out
}

/// Keywords of `body` in order of appearance.
pub fn tokenize_and_filter(body: &[u8]) -> Vec<String> {
    strip_content(body)
        .split(' ')
        .filter(|token| token.len() > MAX_DISCARDED_LEN && !is_stop_word(token))
        .map(str::to_string)
        .collect()
}
