//! Record and index storage for one object store.

use crate::engine::{IndexParameters, StoreParameters};
use crate::error::{EngineError, EngineResult};
use crate::key::{Key, KeyPath, KeyRange};
use recordb_codec::{from_cbor, to_canonical_cbor, Value};
use std::collections::{BTreeMap, BTreeSet};

/// One secondary index: index key to the primary keys carrying it.
#[derive(Debug, Clone)]
pub(crate) struct IndexData {
    pub(crate) key_path: KeyPath,
    pub(crate) parameters: IndexParameters,
    pub(crate) entries: BTreeMap<Key, BTreeSet<Key>>,
}

impl IndexData {
    fn new(key_path: KeyPath, parameters: IndexParameters) -> Self {
        Self {
            key_path,
            parameters,
            entries: BTreeMap::new(),
        }
    }

    /// Index keys a record contributes. Records without a valid key at the
    /// index path contribute none.
    pub(crate) fn keys_for(&self, record: &Value) -> BTreeSet<Key> {
        if self.parameters.multi_entry {
            if let KeyPath::Single(path) = &self.key_path {
                if let Some(Value::Array(items)) = record.get_path(path) {
                    return items.iter().filter_map(|v| Key::from_value(v).ok()).collect();
                }
            }
        }
        self.key_path
            .evaluate(record)
            .ok()
            .flatten()
            .into_iter()
            .collect()
    }

    fn check_unique(&self, name: &str, keys: &BTreeSet<Key>, primary: &Key) -> EngineResult<()> {
        if !self.parameters.unique {
            return Ok(());
        }
        for key in keys {
            if let Some(owners) = self.entries.get(key) {
                if owners.iter().any(|owner| owner != primary) {
                    return Err(EngineError::constraint(format!(
                        "index {name} already contains key {key}"
                    )));
                }
            }
        }
        Ok(())
    }

    fn insert(&mut self, keys: BTreeSet<Key>, primary: &Key) {
        for key in keys {
            self.entries.entry(key).or_default().insert(primary.clone());
        }
    }

    fn remove(&mut self, keys: BTreeSet<Key>, primary: &Key) {
        for key in keys {
            if let Some(owners) = self.entries.get_mut(&key) {
                owners.remove(primary);
                if owners.is_empty() {
                    self.entries.remove(&key);
                }
            }
        }
    }

    /// Number of (index key, primary key) pairs in `range`.
    pub(crate) fn count(&self, range: Option<&KeyRange>) -> u64 {
        let len = |owners: &BTreeSet<Key>| owners.len() as u64;
        match range {
            Some(range) => range.scan(&self.entries).map(|(_, o)| len(o)).sum(),
            None => self.entries.values().map(len).sum(),
        }
    }

    /// Primary key of the first entry in `range`.
    pub(crate) fn first(&self, range: &KeyRange) -> Option<&Key> {
        range
            .scan(&self.entries)
            .next()
            .and_then(|(_, owners)| owners.first())
    }
}

/// Records of one store plus its indexes and key generator.
#[derive(Debug, Clone)]
pub(crate) struct StoreData {
    pub(crate) parameters: StoreParameters,
    pub(crate) records: BTreeMap<Key, Vec<u8>>,
    pub(crate) indexes: BTreeMap<String, IndexData>,
    next_key: i64,
}

impl StoreData {
    pub(crate) fn new(parameters: StoreParameters) -> EngineResult<Self> {
        if parameters.auto_increment
            && parameters.key_path.as_ref().is_some_and(KeyPath::is_compound)
        {
            return Err(EngineError::data(
                "a store with a compound key path cannot generate keys",
            ));
        }
        Ok(Self {
            parameters,
            records: BTreeMap::new(),
            indexes: BTreeMap::new(),
            next_key: 1,
        })
    }

    pub(crate) fn index(&self, name: &str) -> EngineResult<&IndexData> {
        self.indexes
            .get(name)
            .ok_or_else(|| EngineError::not_found(format!("index {name}")))
    }

    pub(crate) fn decode(&self, key: &Key) -> EngineResult<Option<Value>> {
        self.records
            .get(key)
            .map(|bytes| from_cbor(bytes).map_err(EngineError::from))
            .transpose()
    }

    pub(crate) fn count(&self, range: Option<&KeyRange>) -> u64 {
        match range {
            Some(range) => range.scan(&self.records).count() as u64,
            None => self.records.len() as u64,
        }
    }

    pub(crate) fn first_key(&self, range: &KeyRange) -> Option<&Key> {
        range.scan(&self.records).next().map(|(key, _)| key)
    }

    /// Inserts a record, replacing an existing one only when `overwrite`.
    ///
    /// Every check runs before anything is mutated, so a failed insert leaves
    /// the store untouched.
    pub(crate) fn insert(
        &mut self,
        mut value: Value,
        explicit: Option<Key>,
        overwrite: bool,
    ) -> EngineResult<Key> {
        let mut generated = false;
        let key = match (&self.parameters.key_path, explicit) {
            (Some(path), Some(_)) => {
                return Err(EngineError::data(format!(
                    "store uses the inline key path {path}; an explicit key is not allowed"
                )))
            }
            (Some(path), None) => match path.evaluate(&value)? {
                Some(key) => key,
                None if self.parameters.auto_increment => {
                    let key = self.generate()?;
                    if let KeyPath::Single(field) = path {
                        value
                            .set_path(field, key.to_value())
                            .map_err(|e| EngineError::data(e.to_string()))?;
                    }
                    generated = true;
                    key
                }
                None => {
                    return Err(EngineError::data(format!(
                        "record has no key at path {path}"
                    )))
                }
            },
            (None, Some(key)) => key,
            (None, None) if self.parameters.auto_increment => {
                generated = true;
                self.generate()?
            }
            (None, None) => {
                return Err(EngineError::data(
                    "no key supplied and the store has no key generator",
                ))
            }
        };

        let previous = self.decode(&key)?;
        if previous.is_some() && !overwrite {
            return Err(EngineError::constraint(format!("key {key} already exists")));
        }

        let mut index_keys = Vec::with_capacity(self.indexes.len());
        for (name, index) in &self.indexes {
            let keys = index.keys_for(&value);
            index.check_unique(name, &keys, &key)?;
            index_keys.push(keys);
        }
        let bytes = to_canonical_cbor(&value)?;

        if let Some(old) = &previous {
            for index in self.indexes.values_mut() {
                let stale = index.keys_for(old);
                index.remove(stale, &key);
            }
        }
        for (index, keys) in self.indexes.values_mut().zip(index_keys) {
            index.insert(keys, &key);
        }
        self.records.insert(key.clone(), bytes);
        if self.parameters.auto_increment {
            self.bump_generator(&key, generated);
        }
        Ok(key)
    }

    /// Deletes the records in `range`.
    pub(crate) fn delete(&mut self, range: &KeyRange) -> EngineResult<usize> {
        let doomed: Vec<Key> = range.scan(&self.records).map(|(k, _)| k.clone()).collect();
        for key in &doomed {
            if let Some(old) = self.decode(key)? {
                for index in self.indexes.values_mut() {
                    let stale = index.keys_for(&old);
                    index.remove(stale, key);
                }
            }
            self.records.remove(key);
        }
        Ok(doomed.len())
    }

    /// Removes every record. The key generator keeps its position.
    pub(crate) fn clear(&mut self) {
        self.records.clear();
        for index in self.indexes.values_mut() {
            index.entries.clear();
        }
    }

    pub(crate) fn create_index(
        &mut self,
        name: &str,
        key_path: KeyPath,
        parameters: IndexParameters,
    ) -> EngineResult<()> {
        if self.indexes.contains_key(name) {
            return Err(EngineError::constraint(format!("index {name} already exists")));
        }
        if parameters.multi_entry && key_path.is_compound() {
            return Err(EngineError::data(format!(
                "multi-entry index {name} cannot have a compound key path"
            )));
        }
        let mut index = IndexData::new(key_path, parameters);
        for (primary, bytes) in &self.records {
            let record = from_cbor(bytes)?;
            let keys = index.keys_for(&record);
            index.check_unique(name, &keys, primary)?;
            index.insert(keys, primary);
        }
        self.indexes.insert(name.to_string(), index);
        Ok(())
    }

    pub(crate) fn delete_index(&mut self, name: &str) -> EngineResult<()> {
        self.indexes
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| EngineError::not_found(format!("index {name}")))
    }

    fn generate(&self) -> EngineResult<Key> {
        if self.next_key == i64::MAX {
            return Err(EngineError::constraint("key generator is exhausted"));
        }
        Ok(Key::Integer(self.next_key))
    }

    fn bump_generator(&mut self, key: &Key, generated: bool) {
        let n = match key {
            Key::Integer(n) => *n,
            // Float casts saturate at the i64 bounds.
            Key::Number(x) => x.floor() as i64,
            _ => return,
        };
        if generated || n >= self.next_key {
            self.next_key = n.saturating_add(1).max(self.next_key);
        }
    }
}
