//! Inverted keyword index over cached documents.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::search::tokenizer::tokenize_and_filter;

/// Results returned per query, and postings considered per keyword.
pub const NUM_TOP_RESULTS: usize = 5;

/// Keywords recorded for each admitted document.
pub const KEYWORDS_PER_DOCUMENT: usize = 5;

/// One document's score for a keyword. `url` names a cache entry; it is a
/// lookup key, not an owner.
#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    pub url: String,
    pub tf: f32,
}

/// Up to [`NUM_TOP_RESULTS`] URLs, best first, empty slots last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResults {
    pub slots: [Option<String>; NUM_TOP_RESULTS],
}

impl SearchResults {
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().flatten().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots[0].is_none()
    }
}

#[derive(Debug, Default)]
pub struct SearchIndex {
    keywords: HashMap<String, Vec<Posting>>,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes the top keywords of `body` under `url`.
    ///
    /// Each keyword's tf is its count divided by the number of distinct words
    /// in the document. The most frequent words win, earlier words first on
    /// equal counts, and each posting goes to the tail of its keyword's list.
    pub fn extract_keywords(&mut self, body: &[u8], url: &str) {
        let mut vocabulary: Vec<(String, usize)> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for token in tokenize_and_filter(body) {
            match positions.get(&token) {
                Some(&at) => vocabulary[at].1 += 1,
                None => {
                    positions.insert(token.clone(), vocabulary.len());
                    vocabulary.push((token, 1));
                }
            }
        }
        if vocabulary.is_empty() {
            return;
        }

        let distinct = vocabulary.len() as f32;
        // Stable: equal counts keep encounter order.
        vocabulary.sort_by(|a, b| b.1.cmp(&a.1));

        for (word, count) in vocabulary.into_iter().take(KEYWORDS_PER_DOCUMENT) {
            tracing::trace!(url, word = %word, count, "Indexed keyword");
            self.keywords.entry(word).or_default().push(Posting {
                url: url.to_string(),
                tf: count as f32 / distinct,
            });
        }
    }

    /// Removes every posting for `url`. Keywords left without postings are
    /// dropped.
    pub fn prune(&mut self, url: &str) -> usize {
        let mut removed = 0;
        self.keywords.retain(|_, postings| {
            let before = postings.len();
            postings.retain(|posting| posting.url != url);
            removed += before - postings.len();
            !postings.is_empty()
        });
        if removed > 0 {
            tracing::debug!(url, removed, "Pruned search postings");
        }
        removed
    }

    /// Postings for `word` in insertion order.
    pub fn postings(&self, word: &str) -> &[Posting] {
        self.keywords.get(word).map(Vec::as_slice).unwrap_or_default()
    }

    #[cfg(test)]
    fn keyword_count(&self) -> usize {
        self.keywords.len()
    }

    /// Whether any posting still names `url`.
    pub fn references(&self, url: &str) -> bool {
        self.keywords
            .values()
            .any(|postings| postings.iter().any(|posting| posting.url == url))
    }

    /// Best postings of `word`: highest tf first, insertion order on ties.
    fn top_postings(&self, word: &str) -> Vec<Posting> {
        let mut postings = self.postings(word).to_vec();
        postings.sort_by(|a, b| descending(a.tf, b.tf));
        postings.truncate(NUM_TOP_RESULTS);
        postings
    }

    /// Ranks cached URLs against the keywords of `query`.
    ///
    /// Keyword lists are folded left: URLs present in both the running total
    /// and the next list come first with a combined tf of `a * b / 2`,
    /// followed by the total's URLs missing from that list with tf unchanged.
    /// Keywords that index nothing are skipped.
    pub fn find_relevant(&self, query: &str) -> SearchResults {
        let mut lists = tokenize_and_filter(query.as_bytes())
            .into_iter()
            .map(|word| self.top_postings(&word))
            .filter(|postings| !postings.is_empty());

        let mut total = lists.next().unwrap_or_default();
        for list in lists {
            total = combine(&total, &list);
        }

        total.sort_by(|a, b| descending(a.tf, b.tf));

        let mut results = SearchResults::default();
        for (slot, posting) in results.slots.iter_mut().zip(total) {
            *slot = Some(posting.url);
        }
        results
    }
}

fn descending(a: f32, b: f32) -> Ordering {
    b.total_cmp(&a)
}

/// One fold step: intersection of `total` and `list`, then the rest of
/// `total`.
fn combine(total: &[Posting], list: &[Posting]) -> Vec<Posting> {
    let mut intersection = Vec::new();
    let mut remainder = Vec::new();

    for posting in total {
        match list.iter().find(|other| other.url == posting.url) {
            Some(other) => intersection.push(Posting {
                url: posting.url.clone(),
                tf: posting.tf * other.tf / 2.0,
            }),
            None => remainder.push(posting.clone()),
        }
    }
    intersection.extend(remainder);
    intersection
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(results: &SearchResults) -> Vec<&str> {
        results.urls().collect()
    }

    #[test]
    fn term_frequency_uses_distinct_word_count() {
        let mut index = SearchIndex::new();
        index.extract_keywords(b"apple apple banana", "u1");
        assert_eq!(index.postings("apple"), &[Posting { url: "u1".into(), tf: 1.0 }]);
        assert_eq!(index.postings("banana"), &[Posting { url: "u1".into(), tf: 0.5 }]);
    }

    #[test]
    fn only_top_five_words_are_indexed() {
        let mut index = SearchIndex::new();
        index.extract_keywords(
            b"zeta alpha beta gamma delta epsilon alpha epsilon",
            "doc",
        );
        // alpha and epsilon lead on count, then encounter order.
        for word in ["alpha", "epsilon", "zeta", "beta", "gamma"] {
            assert_eq!(index.postings(word).len(), 1, "{word}");
        }
        assert!(index.postings("delta").is_empty());
        assert_eq!(index.keyword_count(), 5);
    }

    #[test]
    fn postings_append_in_admission_order() {
        let mut index = SearchIndex::new();
        index.extract_keywords(b"apple", "first");
        index.extract_keywords(b"apple", "second");
        let order: Vec<&str> = index.postings("apple").iter().map(|p| p.url.as_str()).collect();
        assert_eq!(order, vec!["first", "second"]);
    }

    #[test]
    fn single_keyword_ranking() {
        let mut index = SearchIndex::new();
        index.extract_keywords(b"apple apple banana", "u1");
        index.extract_keywords(b"apple cherry", "u2");

        let results = index.find_relevant("apple");
        assert_eq!(urls(&results), vec!["u1", "u2"]);
        assert_eq!(results.len(), 2);
        assert!(results.slots[2..].iter().all(Option::is_none));
    }

    #[test]
    fn fold_puts_intersection_before_remainder() {
        let mut index = SearchIndex::new();
        // u1: apple 1/2, cherry 1/2. u2: apple 2/2.
        index.extract_keywords(b"apple cherry", "u1");
        index.extract_keywords(b"apple apple orange", "u2");

        let combined = combine(&index.top_postings("apple"), &index.top_postings("cherry"));
        assert_eq!(
            combined,
            vec![
                Posting { url: "u1".into(), tf: 0.125 },
                Posting { url: "u2".into(), tf: 1.0 },
            ]
        );

        // Final ordering is by tf alone.
        assert_eq!(urls(&index.find_relevant("apple cherry")), vec!["u2", "u1"]);
    }

    #[test]
    fn unknown_keywords_do_not_empty_results() {
        let mut index = SearchIndex::new();
        index.extract_keywords(b"banana split", "u1");
        assert_eq!(urls(&index.find_relevant("zucchini banana")), vec!["u1"]);
        assert!(index.find_relevant("zucchini").is_empty());
        assert!(index.find_relevant("the and of").is_empty());
    }

    #[test]
    fn at_most_five_results() {
        let mut index = SearchIndex::new();
        for i in 0..8 {
            index.extract_keywords(b"rust", &format!("u{i}"));
        }
        let results = index.find_relevant("rust");
        assert_eq!(results.len(), NUM_TOP_RESULTS);
        // Equal tf keeps insertion order.
        assert_eq!(urls(&results), vec!["u0", "u1", "u2", "u3", "u4"]);
    }

    #[test]
    fn prune_removes_every_reference() {
        let mut index = SearchIndex::new();
        index.extract_keywords(b"apple banana", "u1");
        index.extract_keywords(b"apple cherry", "u2");

        assert_eq!(index.prune("u1"), 2);
        assert!(!index.references("u1"));
        assert!(index.postings("banana").is_empty());
        assert_eq!(index.keyword_count(), 2);
        assert_eq!(urls(&index.find_relevant("apple banana")), vec!["u2"]);
        assert_eq!(index.prune("u1"), 0);
    }
}
