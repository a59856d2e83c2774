// src/analyzer/ranking.rs

use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::sync::Arc;
use ahash::AHashMap;

use crate::types::RankedWord;

/// Ordering key of the ranking: count ascending, then word descending, so the
/// first element is always the next one to evict. Among equal counts the
/// alphabetically later word goes first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct RankKey {
    count: u64,
    word: Reverse<Arc<str>>,
}

impl RankKey {
    fn new(count: u64, word: Arc<str>) -> Self {
        Self { count, word: Reverse(word) }
    }
}

/// Word counts together with an incrementally maintained top-N.
///
/// Every increment moves the word's entry in the ordered index and trims the
/// lowest entries past `limit`, so the index always holds exactly the `limit`
/// highest-ranked words seen so far. Word strings are shared between the map
/// and the index.
#[derive(Debug, Clone)]
pub struct FrequencyTable {
    limit: usize,
    counts: AHashMap<Arc<str>, u64>,
    ranking: BTreeSet<RankKey>,
    total: u64,
}

impl FrequencyTable {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            counts: AHashMap::new(),
            ranking: BTreeSet::new(),
            total: 0,
        }
    }

    /// Count one occurrence of `word`, returning its new count.
    pub fn record(&mut self, word: &str) -> u64 {
        self.record_many(word, 1)
    }

    /// Count `occurrences` of `word` at once, returning its new count.
    pub fn record_many(&mut self, word: &str, occurrences: u64) -> u64 {
        let (key, old) = match self.counts.get_key_value(word) {
            Some((key, count)) => (Arc::clone(key), *count),
            None => (Arc::<str>::from(word), 0),
        };
        if occurrences == 0 {
            return old;
        }

        let new = old + occurrences;
        self.counts.insert(Arc::clone(&key), new);
        self.total += occurrences;

        if old > 0 {
            // Absent when the word had already been trimmed out.
            self.ranking.remove(&RankKey::new(old, Arc::clone(&key)));
        }
        self.ranking.insert(RankKey::new(new, key));
        while self.ranking.len() > self.limit {
            self.ranking.pop_first();
        }
        new
    }

    pub fn count(&self, word: &str) -> u64 {
        self.counts.get(word).copied().unwrap_or(0)
    }

    /// Current ranking, highest count first, ties in alphabetical order.
    pub fn top(&self) -> Vec<RankedWord> {
        self.ranking
            .iter()
            .rev()
            .map(|key| RankedWord::new(key.count, &*key.word.0))
            .collect()
    }

    /// The same ranking computed from scratch over the whole table.
    pub fn recompute_top(&self) -> Vec<RankedWord> {
        let mut all: Vec<RankedWord> = self.counts
            .iter()
            .map(|(word, count)| RankedWord::new(*count, &**word))
            .collect();
        all.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.word.cmp(&b.word)));
        all.truncate(self.limit);
        all
    }

    pub fn ranked_len(&self) -> usize {
        self.ranking.len()
    }

    pub fn distinct_words(&self) -> usize {
        self.counts.len()
    }

    /// Sum of all counts.
    pub fn total_tokens(&self) -> u64 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn clear(&mut self) {
        self.counts.clear();
        self.ranking.clear();
        self.total = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_from(words: &str, limit: usize) -> FrequencyTable {
        let mut table = FrequencyTable::new(limit);
        for word in words.split_whitespace() {
            table.record(word);
        }
        table
    }

    #[test]
    fn keeps_the_highest_counts() {
        let table = table_from("a a a a a b b b b c c c d d e", 3);
        assert_eq!(table.top(), vec![
            RankedWord::new(5, "a"),
            RankedWord::new(4, "b"),
            RankedWord::new(3, "c"),
        ]);
        assert_eq!(table.distinct_words(), 5);
        assert_eq!(table.total_tokens(), 15);
    }

    #[test]
    fn trimmed_word_can_climb_back() {
        // "z" is evicted early, then overtakes everyone.
        let table = table_from("x y z x y z z z", 2);
        assert_eq!(table.top(), vec![RankedWord::new(4, "z"), RankedWord::new(2, "x")]);
        assert_eq!(table.top(), table.recompute_top());
    }

    #[test]
    fn ties_are_alphabetical() {
        let table = table_from("pear apple fig apple fig pear", 2);
        assert_eq!(table.top(), vec![RankedWord::new(2, "apple"), RankedWord::new(2, "fig")]);
    }

    #[test]
    fn matches_full_recomputation_on_a_long_stream() {
        let mut table = FrequencyTable::new(7);
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        for _ in 0..20_000 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            // Skewed distribution over 60 words.
            let pick = (seed % 60).min(seed % 23);
            table.record(&format!("w{}", pick));
        }
        assert_eq!(table.ranked_len(), 7);
        assert_eq!(table.top(), table.recompute_top());
        assert_eq!(table.total_tokens(), 20_000);
    }

    #[test]
    fn record_many_equals_repeated_records() {
        let mut bulk = FrequencyTable::new(2);
        bulk.record_many("b", 3);
        bulk.record_many("a", 3);
        bulk.record_many("c", 1);
        bulk.record_many("c", 0);
        let single = table_from("b b b a a a c", 2);
        assert_eq!(bulk.top(), single.top());
        assert_eq!(bulk.count("c"), 1);
    }

    #[test]
    fn fewer_words_than_limit() {
        let table = table_from("hello world hello", 15);
        assert_eq!(table.ranked_len(), 2);
        assert_eq!(table.top(), vec![RankedWord::new(2, "hello"), RankedWord::new(1, "world")]);
    }

    #[test]
    fn clear_resets_everything() {
        let mut table = table_from("a b c", 2);
        table.clear();
        assert!(table.is_empty());
        assert!(table.top().is_empty());
        assert_eq!(table.total_tokens(), 0);
        assert_eq!(table.count("a"), 0);
    }
}
