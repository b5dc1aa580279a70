//! Cursors over the in-memory engine.
//!
//! A cursor remembers only its position and re-reads the transaction's
//! working state on every step, so it sees writes made through the same
//! transaction after it was opened.

use super::store::{IndexData, StoreData};
use super::transaction::TxnState;
use crate::engine::{CursorDirection, CursorRecord, CursorSource, EngineCursor};
use crate::error::{EngineError, EngineResult};
use crate::key::{Key, KeyRange};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use tracing::trace;

/// Where the next step starts from.
enum Seek<'a> {
    /// The first entry of the traversal.
    Start,
    /// The entry after this (key, primary key) position.
    After(&'a Key, &'a Key),
    /// The first entry at or past this key.
    To(&'a Key),
}

pub(crate) struct MemoryCursor {
    state: Arc<Mutex<TxnState>>,
    source: CursorSource,
    range: KeyRange,
    direction: CursorDirection,
    current: Option<CursorRecord>,
}

impl MemoryCursor {
    pub(crate) fn open(
        state: Arc<Mutex<TxnState>>,
        source: CursorSource,
        range: KeyRange,
        direction: CursorDirection,
    ) -> EngineResult<Self> {
        let mut cursor = Self {
            state,
            source,
            range,
            direction,
            current: None,
        };
        cursor.current = cursor.locate(Seek::Start)?;
        Ok(cursor)
    }

    fn locate(&self, seek: Seek<'_>) -> EngineResult<Option<CursorRecord>> {
        let state = self.state.lock();
        state.ensure_active()?;
        let data = state.store(self.source.store())?;
        let found = match &self.source {
            CursorSource::Store(_) => store_step(&data.records, &self.range, self.direction, seek)
                .map(|key| (key.clone(), key.clone())),
            CursorSource::Index { index, .. } => {
                index_step(data.index(index)?, &self.range, self.direction, seek)
                    .map(|(key, primary)| (key.clone(), primary.clone()))
            }
        };
        found
            .map(|(key, primary_key)| load(data, key, primary_key))
            .transpose()
    }

    fn position(&self) -> EngineResult<&CursorRecord> {
        self.current
            .as_ref()
            .ok_or_else(|| EngineError::invalid_state("cursor has no current entry"))
    }
}

fn load(data: &StoreData, key: Key, primary_key: Key) -> EngineResult<CursorRecord> {
    let value = data.decode(&primary_key)?.ok_or_else(|| {
        EngineError::invalid_state(format!("index refers to missing record {primary_key}"))
    })?;
    Ok(CursorRecord {
        key,
        primary_key,
        value,
    })
}

fn store_step<'a, V>(
    records: &'a BTreeMap<Key, V>,
    range: &KeyRange,
    direction: CursorDirection,
    seek: Seek<'_>,
) -> Option<&'a Key> {
    if direction.is_reverse() {
        let upper = match seek {
            Seek::Start => range.upper(),
            Seek::After(key, _) => Bound::Excluded(key),
            Seek::To(key) => Bound::Included(key),
        };
        records
            .range::<Key, _>((Bound::Unbounded, upper))
            .next_back()
            .map(|(key, _)| key)
            .filter(|key| range.admits_lower(key))
    } else {
        let lower = match seek {
            Seek::Start => range.lower(),
            Seek::After(key, _) => Bound::Excluded(key),
            Seek::To(key) => Bound::Included(key),
        };
        records
            .range::<Key, _>((lower, Bound::Unbounded))
            .next()
            .map(|(key, _)| key)
            .filter(|key| range.admits_upper(key))
    }
}

/// Entries are ordered by index key, then primary key. Unique directions
/// visit each index key once, at its lowest primary key.
fn index_step<'a>(
    index: &'a IndexData,
    range: &KeyRange,
    direction: CursorDirection,
    seek: Seek<'_>,
) -> Option<(&'a Key, &'a Key)> {
    let entries = &index.entries;
    if direction.is_reverse() {
        if let (Seek::After(key, primary), CursorDirection::Prev) = (&seek, direction) {
            let earlier = entries
                .get(*key)
                .and_then(|owners| owners.range::<Key, _>(..*primary).next_back());
            if let Some(earlier) = earlier {
                return entries.get_key_value(*key).map(|(k, _)| (k, earlier));
            }
        }
        let upper = match seek {
            Seek::Start => range.upper(),
            Seek::After(key, _) => Bound::Excluded(key),
            Seek::To(key) => Bound::Included(key),
        };
        let (key, owners) = entries
            .range::<Key, _>((Bound::Unbounded, upper))
            .next_back()
            .filter(|(key, _)| range.admits_lower(key))?;
        let primary = if direction.is_unique() {
            owners.first()
        } else {
            owners.last()
        }?;
        Some((key, primary))
    } else {
        if let (Seek::After(key, primary), CursorDirection::Next) = (&seek, direction) {
            let later = entries.get(*key).and_then(|owners| {
                owners
                    .range::<Key, _>((Bound::Excluded(*primary), Bound::Unbounded))
                    .next()
            });
            if let Some(later) = later {
                return entries.get_key_value(*key).map(|(k, _)| (k, later));
            }
        }
        let lower = match seek {
            Seek::Start => range.lower(),
            Seek::After(key, _) => Bound::Excluded(key),
            Seek::To(key) => Bound::Included(key),
        };
        let (key, owners) = entries
            .range::<Key, _>((lower, Bound::Unbounded))
            .next()
            .filter(|(key, _)| range.admits_upper(key))?;
        Some((key, owners.first()?))
    }
}

impl EngineCursor for MemoryCursor {
    fn record(&self) -> Option<&CursorRecord> {
        self.current.as_ref()
    }

    fn continue_key(&mut self, key: Option<&Key>) -> EngineResult<()> {
        let current = self.position()?;
        let next = match key {
            None => self.locate(Seek::After(&current.key, &current.primary_key))?,
            Some(target) => {
                let ahead = if self.direction.is_reverse() {
                    target < &current.key
                } else {
                    target > &current.key
                };
                if !ahead {
                    return Err(EngineError::data(format!(
                        "continue key {target} is not past the current key {}",
                        current.key
                    )));
                }
                self.locate(Seek::To(target))?
            }
        };
        trace!(found = next.is_some(), "cursor continue");
        self.current = next;
        Ok(())
    }

    fn advance(&mut self, count: u32) -> EngineResult<()> {
        if count == 0 {
            return Err(EngineError::data("advance count must be greater than zero"));
        }
        self.position()?;
        for _ in 0..count {
            let next = match &self.current {
                Some(current) => self.locate(Seek::After(&current.key, &current.primary_key))?,
                None => break,
            };
            self.current = next;
        }
        trace!(count, found = self.current.is_some(), "cursor advance");
        Ok(())
    }
}
