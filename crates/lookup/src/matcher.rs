//! Layered fuzzy matching over a candidate snapshot.
//!
//! Each candidate is tested in priority order and included on the first layer
//! that matches:
//!
//! 1. the raw display field (or the secondary field) contains the query
//! 2. the full transliteration key of either field contains it
//! 3. the initials key of either field contains it
//!
//! Matching is case-insensitive. Results keep candidate input order (they are
//! not re-sorted by layer) and are capped at [`MAX_MATCHES`]. The scan is
//! linear in the number of candidates.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::transliteration::{full_key, initials_key};

/// Hard cap on the number of matches returned by a single query.
pub const MAX_MATCHES: usize = 10;

/// Romanized keys of one display field.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MatchKeys {
    pub full: String,
    pub initials: String,
}

impl MatchKeys {
    /// Compute both keys for a display field.
    pub fn of(text: &str) -> Self {
        Self {
            full: full_key(text),
            initials: initials_key(text),
        }
    }

    /// Assemble keys from already computed parts (e.g. a persisted pinyin column).
    pub fn from_parts(full: impl Into<String>, initials: impl Into<String>) -> Self {
        Self {
            full: full.into(),
            initials: initials.into(),
        }
    }
}

/// Which layer a candidate matched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchLayer {
    Direct,
    FullKey,
    Initials,
}

/// Something that can be looked up by name.
///
/// Candidates that carry precomputed keys return them from `*_keys`; the
/// matcher computes keys on demand for everything else.
pub trait Candidate {
    /// The display field (patient name, medicine name).
    fn primary(&self) -> &str;

    /// An optional second searchable field (medicine specification).
    fn secondary(&self) -> Option<&str> {
        None
    }

    fn primary_keys(&self) -> Option<&MatchKeys> {
        None
    }

    fn secondary_keys(&self) -> Option<&MatchKeys> {
        None
    }
}

/// A matched candidate and the layer it matched on.
#[derive(Debug)]
pub struct Matched<'a, C> {
    pub candidate: &'a C,
    pub layer: MatchLayer,
}

impl<C> Clone for Matched<'_, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for Matched<'_, C> {}

/// Match `query` against `candidates`, returning at most [`MAX_MATCHES`]
/// candidates in input order.
///
/// An empty (or whitespace-only) query matches nothing.
pub fn match_candidates<'a, C, I>(query: &str, candidates: I) -> Vec<&'a C>
where
    C: Candidate + 'a,
    I: IntoIterator<Item = &'a C>,
{
    rank(query, candidates)
        .into_iter()
        .map(|m| m.candidate)
        .collect()
}

/// Like [`match_candidates`], but reports the layer each candidate matched on.
pub fn rank<'a, C, I>(query: &str, candidates: I) -> Vec<Matched<'a, C>>
where
    C: Candidate + 'a,
    I: IntoIterator<Item = &'a C>,
{
    let Some(needle) = normalize_query(query) else {
        return Vec::new();
    };

    candidates
        .into_iter()
        .filter_map(|candidate| {
            layer_for(&needle, candidate).map(|layer| Matched { candidate, layer })
        })
        .take(MAX_MATCHES)
        .collect()
}

/// The first layer on which a single candidate matches `query`, if any.
pub fn match_layer<C: Candidate + ?Sized>(query: &str, candidate: &C) -> Option<MatchLayer> {
    let needle = normalize_query(query)?;
    layer_for(&needle, candidate)
}

fn normalize_query(query: &str) -> Option<String> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

fn layer_for<C: Candidate + ?Sized>(needle: &str, candidate: &C) -> Option<MatchLayer> {
    let primary = candidate.primary();
    let secondary = candidate.secondary();

    if contains(primary, needle) || secondary.is_some_and(|s| contains(s, needle)) {
        return Some(MatchLayer::Direct);
    }

    let primary_keys = keys_for(primary, candidate.primary_keys());
    let secondary_keys = secondary.map(|s| keys_for(s, candidate.secondary_keys()));

    if contains(&primary_keys.full, needle)
        || secondary_keys
            .as_ref()
            .is_some_and(|k| contains(&k.full, needle))
    {
        return Some(MatchLayer::FullKey);
    }

    if contains(&primary_keys.initials, needle)
        || secondary_keys
            .as_ref()
            .is_some_and(|k| contains(&k.initials, needle))
    {
        return Some(MatchLayer::Initials);
    }

    None
}

fn keys_for<'k>(text: &str, precomputed: Option<&'k MatchKeys>) -> Cow<'k, MatchKeys> {
    match precomputed {
        Some(keys) => Cow::Borrowed(keys),
        None => Cow::Owned(MatchKeys::of(text)),
    }
}

fn contains(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}
