//! Lookup map registry
//!
//! Each materialized table gets a [`LookupMap`] from encoded natural key to the
//! surrogate id assigned in this run. Child tables resolve their foreign keys
//! against the maps of their parents, so a map must exist before any table
//! referencing it is materialized.

use std::collections::HashMap;

use serde_json::Value;

use crate::models::{Row, TableSchema};

use super::natural_key::KeyEncoding;

/// Natural key → surrogate id for one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupMap {
    table: String,
    ids: HashMap<String, String>,
    next: u64,
}

impl LookupMap {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ids: HashMap::new(),
            next: 1,
        }
    }

    /// Rebuild a map from previously stored rows of `schema`
    ///
    /// Ids are read back from the surrogate column. The counter continues
    /// after the highest `<table>_<n>` seen, so newly assigned ids never reuse
    /// a stored one. Tables without a surrogate column get fresh ids in stored
    /// order.
    pub fn rebuild_from_rows(schema: &TableSchema, rows: &[Row], encoding: KeyEncoding) -> Self {
        let mut map = LookupMap::new(&schema.name);
        let surrogate = schema.surrogate_column();

        for row in rows {
            let key = encoding.encode(row, &schema.natural_key);
            if map.ids.contains_key(&key) {
                continue;
            }
            let stored_id = surrogate.and_then(|col| match row.get(col) {
                Some(Value::String(s)) => Some(s.clone()),
                _ => None,
            });
            match stored_id {
                Some(id) => {
                    if let Some(n) = map.counter_of(&id) {
                        map.next = map.next.max(n + 1);
                    }
                    map.ids.insert(key, id);
                }
                None => {
                    map.assign(key);
                }
            }
        }
        map
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Surrogate id recorded for an encoded natural key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.ids.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.ids.contains_key(key)
    }

    /// Assign the next surrogate id to `key` and return it
    pub fn assign(&mut self, key: String) -> String {
        let id = format!("{}_{}", self.table, self.next);
        self.next += 1;
        self.ids.insert(key, id.clone());
        id
    }

    /// Counter value the next assigned id will carry
    pub fn next_counter(&self) -> u64 {
        self.next
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn counter_of(&self, id: &str) -> Option<u64> {
        id.strip_prefix(self.table.as_str())?
            .strip_prefix('_')?
            .parse()
            .ok()
    }
}

/// Lookup maps of every table materialized in one run
#[derive(Debug, Clone, Default)]
pub struct LookupRegistry {
    maps: HashMap<String, LookupMap>,
}

impl LookupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, table: &str) -> Option<&LookupMap> {
        self.maps.get(table)
    }

    pub fn contains(&self, table: &str) -> bool {
        self.maps.contains_key(table)
    }

    /// Register a map, replacing any previous map of the same table
    pub fn insert(&mut self, map: LookupMap) {
        self.maps.insert(map.table.clone(), map);
    }

    /// Take a table's map out for extension, or start a new one
    pub fn take_or_new(&mut self, table: &str) -> LookupMap {
        self.maps
            .remove(table)
            .unwrap_or_else(|| LookupMap::new(table))
    }

    pub fn remove(&mut self, table: &str) -> Option<LookupMap> {
        self.maps.remove(table)
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}
