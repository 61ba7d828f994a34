//! Precomputed transliteration keys keyed by record id.
//!
//! Catalogs keep one of these next to their rows so that a query only pays for
//! lowercase substring checks, not for re-romanizing every name.

use std::collections::HashMap;
use std::hash::Hash;

use crate::matcher::MatchKeys;

/// Keys for one record: its display field and optional secondary field.
///
/// The text the keys were computed from is kept alongside them, so a reader
/// holding the current row can tell whether the keys still describe it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndexedKeys {
    pub primary: MatchKeys,
    pub secondary: Option<MatchKeys>,
    primary_source: String,
    secondary_source: String,
}

impl IndexedKeys {
    pub fn compute(primary: &str, secondary: Option<&str>) -> Self {
        let secondary = non_blank(secondary);
        Self {
            primary: MatchKeys::of(primary),
            secondary: secondary.map(MatchKeys::of),
            primary_source: primary.to_string(),
            secondary_source: secondary.unwrap_or_default().to_string(),
        }
    }

    /// True when these keys were computed from exactly this text.
    ///
    /// Blank and missing secondary fields are the same thing here.
    pub fn describes(&self, primary: &str, secondary: Option<&str>) -> bool {
        self.primary_source == primary
            && self.secondary_source == non_blank(secondary).unwrap_or_default()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}

#[derive(Debug, Clone)]
pub struct TransliterationIndex<K> {
    entries: HashMap<K, IndexedKeys>,
}

impl<K> Default for TransliterationIndex<K> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<K> TransliterationIndex<K>
where
    K: Copy + Eq + Hash,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from `(id, primary, secondary)` rows.
    pub fn rebuild<'a, I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (K, &'a str, Option<&'a str>)>,
    {
        let entries = rows
            .into_iter()
            .map(|(id, primary, secondary)| (id, IndexedKeys::compute(primary, secondary)))
            .collect();
        Self { entries }
    }

    /// Insert or replace the keys for `id`.
    pub fn upsert(&mut self, id: K, primary: &str, secondary: Option<&str>) {
        self.entries
            .insert(id, IndexedKeys::compute(primary, secondary));
    }

    pub fn remove(&mut self, id: K) -> Option<IndexedKeys> {
        self.entries.remove(&id)
    }

    pub fn get(&self, id: K) -> Option<&IndexedKeys> {
        self.entries.get(&id)
    }

    /// Keys for `id`, but only if they were computed from the given text.
    ///
    /// A row renamed behind the index's back gets `None`, and the caller
    /// computes keys for the current text instead.
    pub fn get_current(
        &self,
        id: K,
        primary: &str,
        secondary: Option<&str>,
    ) -> Option<&IndexedKeys> {
        self.get(id).filter(|keys| keys.describes(primary, secondary))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
