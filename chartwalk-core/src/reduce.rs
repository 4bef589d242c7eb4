//! Earliest-occurrence reduction over records that arrive in any order.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::{Mutex, PoisonError};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::Record;

/// Keeps, per key, the item with the smallest rank seen so far.
///
/// `key_of` names the logical subject of an item and `rank_of` orders items
/// of the same subject. An incoming item replaces the stored one only when
/// its rank is strictly smaller, so with a total rank the outcome does not
/// depend on arrival order.
pub struct EarliestWins<T, K, KF, RF> {
    key_of: KF,
    rank_of: RF,
    entries: HashMap<K, T>,
}

impl<T, K, R, KF, RF> EarliestWins<T, K, KF, RF>
where
    K: Eq + Hash,
    R: Ord,
    KF: Fn(&T) -> K,
    RF: Fn(&T) -> R,
{
    pub fn new(key_of: KF, rank_of: RF) -> Self {
        Self {
            key_of,
            rank_of,
            entries: HashMap::new(),
        }
    }

    /// Returns `true` when the item was stored.
    pub fn offer(&mut self, item: T) -> bool {
        let key = (self.key_of)(&item);
        match self.entries.entry(key) {
            Entry::Occupied(mut entry) => {
                if (self.rank_of)(&item) < (self.rank_of)(entry.get()) {
                    entry.insert(item);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(item);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_inner(self) -> HashMap<K, T> {
        self.entries
    }
}

impl<T, K, R, KF, RF> Extend<T> for EarliestWins<T, K, KF, RF>
where
    K: Eq + Hash,
    R: Ord,
    KF: Fn(&T) -> K,
    RF: Fn(&T) -> R,
{
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.offer(item);
        }
    }
}

type RecordRank = (NaiveDateTime, Option<String>, String);

type RecordReducer = EarliestWins<Record, String, fn(&Record) -> String, fn(&Record) -> RecordRank>;

fn record_key(record: &Record) -> String {
    record.key.clone()
}

// Ties on timestamp fall back to author and value so the winner is the same
// for every input order.
fn record_rank(record: &Record) -> RecordRank {
    (
        record.timestamp,
        record.author.clone(),
        record.value.clone(),
    )
}

fn record_reducer() -> RecordReducer {
    EarliestWins::new(
        record_key as fn(&Record) -> String,
        record_rank as fn(&Record) -> RecordRank,
    )
}

/// First attested occurrence of one key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReducedEntry {
    pub timestamp: NaiveDateTime,
    pub author: Option<String>,
    pub value: String,
}

/// Earliest entry per key, after reduction.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ReducedIndex {
    entries: BTreeMap<String, ReducedEntry>,
}

impl ReducedIndex {
    pub fn get(&self, key: &str) -> Option<&ReducedEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ReducedEntry)> {
        self.entries.iter().map(|(key, entry)| (key.as_str(), entry))
    }

    /// Entries ordered by first occurrence, then key.
    pub fn chronological(&self) -> Vec<(&str, &ReducedEntry)> {
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_by(|a, b| a.1.timestamp.cmp(&b.1.timestamp).then(a.0.cmp(b.0)));
        entries
    }

    fn from_winners(winners: HashMap<String, Record>) -> Self {
        let entries = winners
            .into_iter()
            .map(|(key, record)| {
                (
                    key,
                    ReducedEntry {
                        timestamp: record.timestamp,
                        author: record.author,
                        value: record.value,
                    },
                )
            })
            .collect();
        Self { entries }
    }
}

/// Fold a record stream into its earliest entry per key.
pub fn reduce<I>(records: I) -> ReducedIndex
where
    I: IntoIterator<Item = Record>,
{
    let mut reducer = record_reducer();
    reducer.extend(records);
    ReducedIndex::from_winners(reducer.into_inner())
}

/// Record reducer that several extraction passes can feed at once.
///
/// All updates go through one lock, so every key has a single writer.
pub struct SharedReducer {
    inner: Mutex<RecordReducer>,
}

impl SharedReducer {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(record_reducer()),
        }
    }

    pub fn offer(&self, record: Record) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .offer(record)
    }

    pub fn offer_all<I>(&self, records: I)
    where
        I: IntoIterator<Item = Record>,
    {
        let mut reducer = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        reducer.extend(records);
    }

    pub fn finish(self) -> ReducedIndex {
        let reducer = self
            .inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        ReducedIndex::from_winners(reducer.into_inner())
    }
}

impl Default for SharedReducer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2019, 5, d)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn diagnosis(label: &str, d: u32, attending: &str) -> Record {
        Record::new(label, day(d), Some(attending.to_string()), label)
    }

    #[test]
    fn earliest_occurrence_wins_in_either_order() {
        let early = diagnosis("Asthma", 2, "Lin");
        let late = diagnosis("Asthma", 5, "Chen");

        for records in [
            vec![early.clone(), late.clone()],
            vec![late.clone(), early.clone()],
        ] {
            let index = reduce(records);
            let entry = index.get("Asthma").unwrap();
            assert_eq!(entry.timestamp, day(2));
            assert_eq!(entry.author.as_deref(), Some("Lin"));
        }
    }

    #[test]
    fn same_timestamp_ties_go_to_smaller_author() {
        let chen = diagnosis("GERD", 3, "Chen");
        let wu = diagnosis("GERD", 3, "Wu");

        let mut reducer = record_reducer();
        assert!(reducer.offer(chen.clone()));
        assert!(!reducer.offer(wu.clone()));
        assert_eq!(reducer.len(), 1);
        assert_eq!(reducer.into_inner()["GERD"].author.as_deref(), Some("Chen"));

        // Arriving second, the smaller author replaces the stored entry.
        let mut reducer = record_reducer();
        assert!(reducer.offer(wu));
        assert!(reducer.offer(chen));
        assert_eq!(reducer.len(), 1);
        assert_eq!(reducer.into_inner()["GERD"].author.as_deref(), Some("Chen"));
    }

    #[test]
    fn every_permutation_reduces_identically() {
        let records = vec![
            diagnosis("Asthma", 9, "Chen"),
            diagnosis("Asthma", 4, "Lin"),
            diagnosis("Atopic dermatitis", 4, "Lin"),
            diagnosis("Atopic dermatitis", 4, "Wu"),
            diagnosis("Otitis media", 12, "Wu"),
            diagnosis("Asthma", 4, "Wu"),
        ];
        let expected = reduce(records.clone());

        // Heap's algorithm over all 720 orderings.
        let mut items = records;
        let mut counters = vec![0; items.len()];
        let mut i = 1;
        while i < items.len() {
            if counters[i] < i {
                if i % 2 == 0 {
                    items.swap(0, i);
                } else {
                    items.swap(counters[i], i);
                }
                assert_eq!(reduce(items.clone()), expected);
                counters[i] += 1;
                i = 1;
            } else {
                counters[i] = 0;
                i += 1;
            }
        }
    }

    #[test]
    fn generic_reducer_uses_supplied_key_and_rank() {
        let mut reducer = EarliestWins::new(|v: &(char, u32)| v.0, |v: &(char, u32)| v.1);
        reducer.extend([('a', 7), ('b', 3), ('a', 2), ('a', 5)]);
        let winners = reducer.into_inner();
        assert_eq!(winners[&'a'], ('a', 2));
        assert_eq!(winners[&'b'], ('b', 3));
    }

    #[test]
    fn chronological_view_orders_by_first_occurrence() {
        let index = reduce(vec![
            diagnosis("Otitis media", 12, "Wu"),
            diagnosis("Asthma", 4, "Lin"),
            diagnosis("Bronchiolitis", 4, "Lin"),
        ]);
        let keys: Vec<_> = index.chronological().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["Asthma", "Bronchiolitis", "Otitis media"]);
    }

    #[test]
    fn shared_reducer_matches_sequential_reduce() {
        let batches: Vec<Vec<Record>> = (0..4u32)
            .map(|worker| {
                (1..=20u32)
                    .map(|d| diagnosis(&format!("dx-{}", d % 5), (d + worker) % 28 + 1, "Lin"))
                    .collect()
            })
            .collect();
        let expected = reduce(batches.iter().flatten().cloned());

        let shared = SharedReducer::new();
        std::thread::scope(|scope| {
            for batch in &batches {
                let shared = &shared;
                scope.spawn(move || {
                    for record in batch {
                        shared.offer(record.clone());
                    }
                });
            }
        });

        assert_eq!(shared.finish(), expected);
    }
}
