//! Token/index registry.
//!
//! A `Vocabulary` assigns contiguous indices `0..len` to tokens in first-seen order and
//! keeps the inverse mapping alongside. An optional unknown token is registered at
//! construction and returned for every lookup miss.
//!
//! Persistence goes through [`VocabularyRecord`], which only carries the forward map;
//! the inverse is rebuilt on load.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Unknown symbol used when none is given explicitly.
pub const DEFAULT_UNKNOWN: &str = "<UNK>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    token_to_idx: HashMap<String, usize>,
    /// Exact inverse of `token_to_idx`; position == index.
    idx_to_token: Vec<String>,
    unknown_enabled: bool,
    unknown_symbol: String,
    unknown_index: Option<usize>,
}

/// Plain serializable form of a [`Vocabulary`].
///
/// `forward_map` is a `BTreeMap` so the written file is stable across runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyRecord {
    pub forward_map: BTreeMap<String, usize>,
    pub unknown_enabled: bool,
    pub unknown_symbol: String,
}

impl Vocabulary {
    /// Vocabulary without unknown-token fallback.
    pub fn new() -> Self {
        Self {
            token_to_idx: HashMap::new(),
            idx_to_token: Vec::new(),
            unknown_enabled: false,
            unknown_symbol: DEFAULT_UNKNOWN.to_owned(),
            unknown_index: None,
        }
    }

    /// Vocabulary whose first entry (index 0) is `unknown_symbol`.
    pub fn with_unknown(unknown_symbol: &str) -> Self {
        let mut vocab = Self {
            unknown_enabled: true,
            unknown_symbol: unknown_symbol.to_owned(),
            ..Self::new()
        };
        let idx = vocab.add_token(unknown_symbol);
        vocab.unknown_index = Some(idx);
        vocab
    }

    /// Registers `token` and returns its index. Already-known tokens keep their index.
    pub fn add_token(&mut self, token: &str) -> usize {
        if let Some(&idx) = self.token_to_idx.get(token) {
            return idx;
        }
        let idx = self.idx_to_token.len();
        self.token_to_idx.insert(token.to_owned(), idx);
        self.idx_to_token.push(token.to_owned());
        idx
    }

    pub fn add_many<I, S>(&mut self, tokens: I) -> Vec<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        tokens
            .into_iter()
            .map(|t| self.add_token(t.as_ref()))
            .collect()
    }

    /// Index of `token`, falling back to the unknown index when enabled.
    pub fn lookup_token(&self, token: &str) -> Result<usize> {
        match (self.token_to_idx.get(token), self.unknown_index) {
            (Some(&idx), _) => Ok(idx),
            (None, Some(unk)) => Ok(unk),
            (None, None) => Err(Error::NotFound(format!(
                "token {token:?} is not in the vocabulary"
            ))),
        }
    }

    pub fn lookup_index(&self, index: usize) -> Result<&str> {
        self.idx_to_token
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "index {index} is not in the vocabulary (len {})",
                    self.len()
                ))
            })
    }

    #[inline]
    pub fn contains(&self, token: &str) -> bool {
        self.token_to_idx.contains_key(token)
    }

    /// Number of registered tokens, including the unknown symbol when enabled.
    #[inline]
    pub fn len(&self) -> usize {
        self.idx_to_token.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.idx_to_token.is_empty()
    }

    #[inline]
    pub fn unknown_index(&self) -> Option<usize> {
        self.unknown_index
    }

    #[inline]
    pub fn unknown_symbol(&self) -> &str {
        &self.unknown_symbol
    }

    /// Tokens in index order.
    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.idx_to_token.iter().map(String::as_str)
    }

    pub fn to_record(&self) -> VocabularyRecord {
        VocabularyRecord {
            forward_map: self
                .token_to_idx
                .iter()
                .map(|(t, &i)| (t.clone(), i))
                .collect(),
            unknown_enabled: self.unknown_enabled,
            unknown_symbol: self.unknown_symbol.clone(),
        }
    }

    /// Rebuilds a vocabulary by replaying the forward map in index order.
    ///
    /// The indices must be exactly `0..len`. When the unknown token is enabled and
    /// already present, it keeps its stored index; otherwise it is appended.
    pub fn from_record(record: VocabularyRecord) -> Result<Self> {
        let VocabularyRecord {
            forward_map,
            unknown_enabled,
            unknown_symbol,
        } = record;

        let mut by_index: Vec<(usize, String)> =
            forward_map.into_iter().map(|(t, i)| (i, t)).collect();
        by_index.sort_unstable_by_key(|(i, _)| *i);

        let mut vocab = Self {
            unknown_symbol: unknown_symbol.clone(),
            ..Self::new()
        };
        for (expected, (idx, token)) in by_index.into_iter().enumerate() {
            if idx != expected {
                return Err(Error::InvalidData(format!(
                    "vocabulary indices must be contiguous from 0; expected {expected}, got {idx} for {token:?}"
                )));
            }
            vocab.add_token(&token);
        }

        if unknown_enabled {
            vocab.unknown_enabled = true;
            vocab.unknown_index = Some(vocab.add_token(&unknown_symbol));
        }
        Ok(vocab)
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_token_is_idempotent() {
        let mut v = Vocabulary::new();
        let a = v.add_token("a");
        let b = v.add_token("b");
        assert_eq!((a, b), (0, 1));
        assert_eq!(v.add_token("a"), a);
        assert_eq!(v.lookup_token("a").unwrap(), a);
        assert_eq!(v.len(), 2);
    }

    #[test]
    fn add_many_preserves_input_order() {
        let mut v = Vocabulary::new();
        let ids = v.add_many(["x", "y", "x", "z"]);
        assert_eq!(ids, vec![0, 1, 0, 2]);
        assert_eq!(v.iter().collect::<Vec<_>>(), vec!["x", "y", "z"]);
    }

    #[test]
    fn unknown_token_is_registered_first_and_used_on_miss() {
        let mut v = Vocabulary::with_unknown("<UNK>");
        assert_eq!(v.unknown_index(), Some(0));
        assert_eq!(v.len(), 1);
        v.add_token("q");
        assert_eq!(v.lookup_token("q").unwrap(), 1);
        assert_eq!(v.lookup_token("never seen").unwrap(), 0);
    }

    #[test]
    fn miss_without_unknown_is_not_found() {
        let v = Vocabulary::new();
        assert!(matches!(v.lookup_token("a"), Err(Error::NotFound(_))));
        assert!(matches!(v.lookup_index(0), Err(Error::NotFound(_))));
    }

    #[test]
    fn record_roundtrip_preserves_lookups() {
        let mut v = Vocabulary::with_unknown("<UNK>");
        v.add_many(["s", "m", "i", "t", "h"]);

        let restored = Vocabulary::from_record(v.to_record()).unwrap();
        assert_eq!(restored, v);
        for (idx, token) in v.iter().enumerate() {
            assert_eq!(restored.lookup_token(token).unwrap(), idx);
            assert_eq!(restored.lookup_index(idx).unwrap(), token);
        }
        assert_eq!(restored.lookup_token("z").unwrap(), 0);
    }

    #[test]
    fn record_keeps_unknown_position() {
        // Unknown registered after other tokens must not be moved to index 0.
        let mut forward_map = BTreeMap::new();
        forward_map.insert("a".to_owned(), 0);
        forward_map.insert("@".to_owned(), 1);
        let v = Vocabulary::from_record(VocabularyRecord {
            forward_map,
            unknown_enabled: true,
            unknown_symbol: "@".to_owned(),
        })
        .unwrap();
        assert_eq!(v.unknown_index(), Some(1));
        assert_eq!(v.lookup_token("b").unwrap(), 1);
        assert_eq!(v.len(), 2);
    }

    #[test]
    fn record_with_gap_is_rejected() {
        let mut forward_map = BTreeMap::new();
        forward_map.insert("a".to_owned(), 0);
        forward_map.insert("b".to_owned(), 2);
        let err = Vocabulary::from_record(VocabularyRecord {
            forward_map,
            unknown_enabled: false,
            unknown_symbol: DEFAULT_UNKNOWN.to_owned(),
        })
        .unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }
}
