//! Deduplicator
//!
//! Collapses buffered records to one per identity key. The record with the
//! smallest sequence number wins; later copies (upstream retransmits) are
//! dropped whole, never merged.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::types::BufferedRecord;

/// Compare identity keys for export ordering
///
/// Keys made only of ASCII digits compare by numeric value and sort before
/// every other key; other keys compare lexically. Numerically equal keys
/// (`"7"` and `"007"`) fall back to lexical order so the ordering is total.
pub fn compare_keys(a: &str, b: &str) -> Ordering {
    match (is_numeric(a), is_numeric(b)) {
        (true, true) => {
            let a_digits = a.trim_start_matches('0');
            let b_digits = b.trim_start_matches('0');
            a_digits
                .len()
                .cmp(&b_digits.len())
                .then_with(|| a_digits.cmp(b_digits))
                .then_with(|| a.cmp(b))
        }
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.cmp(b),
    }
}

fn is_numeric(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit())
}

/// The surviving record for one identity key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupEntry {
    pub identity_key: String,
    pub sequence_no: u64,
    pub serialized_form: String,
}

/// One entry per identity key, in ascending key order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeduplicatedSet {
    entries: Vec<DedupEntry>,
    discarded: usize,
}

impl DeduplicatedSet {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of records dropped as duplicates
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    pub fn iter(&self) -> impl Iterator<Item = &DedupEntry> {
        self.entries.iter()
    }

    /// Look up the surviving serialized form for a key
    pub fn get(&self, identity_key: &str) -> Option<&str> {
        self.entries
            .binary_search_by(|e| compare_keys(&e.identity_key, identity_key))
            .ok()
            .map(|i| self.entries[i].serialized_form.as_str())
    }
}

/// Deduplicate records by identity key, first sequence number wins
///
/// Grouping is a single pass over a key -> slot index; only the survivors
/// are sorted.
pub fn dedupe<I>(records: I) -> DeduplicatedSet
where
    I: IntoIterator<Item = BufferedRecord>,
{
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut entries: Vec<DedupEntry> = Vec::new();
    let mut discarded = 0;

    for record in records {
        match index.get(&record.identity_key) {
            Some(&slot) => {
                discarded += 1;
                let current = &mut entries[slot];
                if record.sequence_no < current.sequence_no {
                    current.sequence_no = record.sequence_no;
                    current.serialized_form = record.serialized_form;
                }
            }
            None => {
                index.insert(record.identity_key.clone(), entries.len());
                entries.push(DedupEntry {
                    identity_key: record.identity_key,
                    sequence_no: record.sequence_no,
                    serialized_form: record.serialized_form,
                });
            }
        }
    }

    entries.sort_by(|a, b| compare_keys(&a.identity_key, &b.identity_key));

    DeduplicatedSet { entries, discarded }
}
