//! KV state machine for the in-memory store.
//!
//! Keeps the current value of every live key with etcd's MVCC metadata. A
//! deleted key is removed outright, so recreating it yields a fresh
//! `create_revision` and `version == 1`.

use crate::store::{
    Compare, CompareResult, CompareTarget, EventType, KeyRange, KeyValue, WatchEvent,
};
use std::collections::BTreeMap;

/// KV state machine core.
#[derive(Debug, Default)]
pub struct KvStateMachine {
    /// Current store revision; every mutating request advances it by one.
    current_revision: i64,

    /// Live keys in order.
    index: BTreeMap<Vec<u8>, KeyValue>,

    /// Events produced since the last `take_events`.
    pending_events: Vec<WatchEvent>,
}

impl KvStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current revision.
    pub fn current_revision(&self) -> i64 {
        self.current_revision
    }

    /// The revision the next mutation will be applied at.
    pub fn next_revision(&self) -> i64 {
        self.current_revision + 1
    }

    /// Get a key's current value.
    pub fn get(&self, key: &[u8]) -> Option<&KeyValue> {
        self.index.get(key)
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Every live key in `range`, in key order.
    pub fn range(&self, range: &KeyRange) -> Vec<&KeyValue> {
        if range.is_single() {
            return self.get(&range.key).into_iter().collect();
        }
        if range.range_end == [0] {
            return self.index.range(range.key.clone()..).map(|(_, kv)| kv).collect();
        }
        if range.range_end <= range.key {
            return Vec::new();
        }
        self.index
            .range(range.key.clone()..range.range_end.clone())
            .map(|(_, kv)| kv)
            .collect()
    }

    /// Put a key-value pair at `revision`.
    ///
    /// Returns the previous record if the key existed.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>, revision: i64, lease: i64) -> Option<KeyValue> {
        self.current_revision = revision;

        let prev = self.index.get(&key).cloned();
        let (create_revision, version) = match &prev {
            Some(p) => (p.create_revision, p.version + 1),
            None => (revision, 1),
        };

        let record = KeyValue {
            key: key.clone(),
            value,
            create_revision,
            mod_revision: revision,
            version,
            lease,
        };

        self.pending_events.push(WatchEvent {
            event_type: EventType::Put,
            kv: record.clone(),
        });
        self.index.insert(key, record);

        prev
    }

    /// Delete a key at `revision`.
    ///
    /// Returns the deleted record if it existed. Deleting a missing key leaves
    /// the revision unchanged.
    pub fn delete(&mut self, key: &[u8], revision: i64) -> Option<KeyValue> {
        let prev = self.index.remove(key)?;
        self.current_revision = revision;

        self.pending_events.push(WatchEvent {
            event_type: EventType::Delete,
            kv: KeyValue {
                key: key.to_vec(),
                mod_revision: revision,
                ..KeyValue::default()
            },
        });

        Some(prev)
    }

    /// Delete every key in `range` at one revision.
    pub fn delete_range(&mut self, range: &KeyRange, revision: i64) -> Vec<KeyValue> {
        let keys: Vec<Vec<u8>> = self.range(range).into_iter().map(|kv| kv.key.clone()).collect();

        keys.iter()
            .filter_map(|key| self.delete(key, revision))
            .collect()
    }

    /// Take pending events for watch delivery.
    pub fn take_events(&mut self) -> Vec<WatchEvent> {
        std::mem::take(&mut self.pending_events)
    }

    /// Evaluate a transaction guard against current state.
    ///
    /// A missing key compares as zero for numeric targets and as the empty
    /// value for `Value`.
    pub fn evaluate(&self, compare: &Compare) -> bool {
        let record = self.get(&compare.key);

        match &compare.target {
            CompareTarget::Version(expected) => {
                compare_ord(record.map(|r| r.version).unwrap_or(0), *expected, compare.result)
            }
            CompareTarget::CreateRevision(expected) => compare_ord(
                record.map(|r| r.create_revision).unwrap_or(0),
                *expected,
                compare.result,
            ),
            CompareTarget::ModRevision(expected) => compare_ord(
                record.map(|r| r.mod_revision).unwrap_or(0),
                *expected,
                compare.result,
            ),
            CompareTarget::Lease(expected) => {
                compare_ord(record.map(|r| r.lease).unwrap_or(0), *expected, compare.result)
            }
            CompareTarget::Value(expected) => {
                let actual = record.map(|r| r.value.as_slice()).unwrap_or(&[]);
                compare_ord(actual, expected.as_slice(), compare.result)
            }
        }
    }

    /// Evaluate every guard; an empty list holds.
    pub fn evaluate_all(&self, compares: &[Compare]) -> bool {
        compares.iter().all(|c| self.evaluate(c))
    }
}

fn compare_ord<T: PartialOrd>(actual: T, expected: T, result: CompareResult) -> bool {
    match result {
        CompareResult::Equal => actual == expected,
        CompareResult::NotEqual => actual != expected,
        CompareResult::Greater => actual > expected,
        CompareResult::Less => actual < expected,
    }
}
