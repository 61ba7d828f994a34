//! Approximate name lookup for clinical records.
//!
//! Display names are written in Chinese; users type them as pinyin
//! (`amoxilin`) or as syllable initials (`amxl`). This crate turns names into
//! romanized keys and matches queries against them without a search index:
//!
//! - [`transliteration`]: name → full pinyin key / initials key
//! - [`matcher`]: layered, capped, order-preserving candidate matching
//! - [`index`]: id → precomputed keys, for catalogs that want to skip
//!   per-query recomputation

pub mod index;
pub mod matcher;
pub mod transliteration;

pub use index::{IndexedKeys, TransliterationIndex};
pub use matcher::{
    match_candidates, match_layer, rank, Candidate, MatchKeys, MatchLayer, Matched, MAX_MATCHES,
};
pub use transliteration::{full_key, initials_key, syllable_count};
