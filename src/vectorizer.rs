//! Surname -> multi-hot feature vector.
//!
//! The vectorizer owns two vocabularies: one over surname characters (with an unknown
//! token, since inference-time names may contain unseen letters) and one over
//! nationality labels (no unknown token). A surname becomes a bag of its distinct
//! characters: position `lookup_token(ch)` is set to `1.0` for every character.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::vocab::{Vocabulary, VocabularyRecord, DEFAULT_UNKNOWN};
use crate::{Error, Result, SurnameRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurnameVectorizer {
    surname_vocab: Vocabulary,
    nationality_vocab: Vocabulary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorizerRecord {
    pub surname_vocab: VocabularyRecord,
    pub nationality_vocab: VocabularyRecord,
}

impl SurnameVectorizer {
    pub fn new(surname_vocab: Vocabulary, nationality_vocab: Vocabulary) -> Self {
        Self {
            surname_vocab,
            nationality_vocab,
        }
    }

    /// Builds both vocabularies in one scan over `rows`.
    ///
    /// Characters are registered in first-seen order, which fixes the dimension each
    /// letter occupies in the output vector.
    pub fn from_corpus<'a, I>(rows: I) -> Self
    where
        I: IntoIterator<Item = &'a SurnameRecord>,
    {
        let mut surname_vocab = Vocabulary::with_unknown(DEFAULT_UNKNOWN);
        let mut nationality_vocab = Vocabulary::new();

        let mut buf = [0_u8; 4];
        for row in rows {
            for ch in row.surname.chars() {
                surname_vocab.add_token(ch.encode_utf8(&mut buf));
            }
            nationality_vocab.add_token(&row.nationality);
        }

        Self {
            surname_vocab,
            nationality_vocab,
        }
    }

    #[inline]
    pub fn surname_vocab(&self) -> &Vocabulary {
        &self.surname_vocab
    }

    #[inline]
    pub fn nationality_vocab(&self) -> &Vocabulary {
        &self.nationality_vocab
    }

    /// Length of every vector produced by [`Self::vectorize`].
    #[inline]
    pub fn input_dim(&self) -> usize {
        self.surname_vocab.len()
    }

    #[inline]
    pub fn num_classes(&self) -> usize {
        self.nationality_vocab.len()
    }

    pub fn vectorize(&self, surname: &str) -> Vec<f32> {
        let mut out = vec![0.0; self.input_dim()];
        self.vectorize_into(surname, &mut out);
        out
    }

    /// Writes the multi-hot vector for `surname` into `out` (overwrite semantics).
    ///
    /// Panics if `out.len() != self.input_dim()`.
    pub fn vectorize_into(&self, surname: &str, out: &mut [f32]) {
        assert_eq!(
            out.len(),
            self.input_dim(),
            "output len {} does not match vocabulary size {}",
            out.len(),
            self.input_dim()
        );
        out.fill(0.0);

        let mut buf = [0_u8; 4];
        for ch in surname.chars() {
            // The surname vocabulary always has an unknown token, so lookups cannot miss.
            if let Ok(idx) = self.surname_vocab.lookup_token(ch.encode_utf8(&mut buf)) {
                out[idx] = 1.0;
            }
        }
    }

    pub fn label_index(&self, nationality: &str) -> Result<usize> {
        self.nationality_vocab.lookup_token(nationality)
    }

    pub fn label(&self, index: usize) -> Result<&str> {
        self.nationality_vocab.lookup_index(index)
    }

    pub fn to_record(&self) -> VectorizerRecord {
        VectorizerRecord {
            surname_vocab: self.surname_vocab.to_record(),
            nationality_vocab: self.nationality_vocab.to_record(),
        }
    }

    pub fn from_record(record: VectorizerRecord) -> Result<Self> {
        let surname_vocab = Vocabulary::from_record(record.surname_vocab)?;
        if surname_vocab.unknown_index().is_none() {
            return Err(Error::InvalidData(
                "surname vocabulary must have the unknown token enabled".to_owned(),
            ));
        }
        let nationality_vocab = Vocabulary::from_record(record.nationality_vocab)?;
        Ok(Self {
            surname_vocab,
            nationality_vocab,
        })
    }

    pub fn to_json_string_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.to_record())
            .map_err(|e| Error::InvalidData(format!("failed to serialize vectorizer: {e}")))
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let record: VectorizerRecord = serde_json::from_str(s)
            .map_err(|e| Error::InvalidData(format!("failed to parse vectorizer json: {e}")))?;
        Self::from_record(record)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let s = self.to_json_string_pretty()?;
        let p = path.as_ref();
        std::fs::write(p, s)
            .map_err(|e| Error::Io(format!("failed to write {}: {e}", p.display())))?;
        Ok(())
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        let s = std::fs::read_to_string(p)
            .map_err(|e| Error::Io(format!("failed to read {}: {e}", p.display())))?;
        Self::from_json_str(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Split;

    fn rows() -> Vec<SurnameRecord> {
        vec![
            SurnameRecord::new("ab", "X", Split::Train),
            SurnameRecord::new("ba", "Y", Split::Train),
            SurnameRecord::new("cab", "X", Split::Val),
        ]
    }

    #[test]
    fn letters_are_indexed_in_first_seen_order() {
        let v = SurnameVectorizer::from_corpus(&rows());
        let letters: Vec<&str> = v.surname_vocab().iter().collect();
        assert_eq!(letters, vec![DEFAULT_UNKNOWN, "a", "b", "c"]);
        assert_eq!(v.label_index("X").unwrap(), 0);
        assert_eq!(v.label_index("Y").unwrap(), 1);
        assert_eq!(v.num_classes(), 2);
    }

    #[test]
    fn vectorize_is_a_bag_of_letters() {
        let v = SurnameVectorizer::from_corpus(&rows());
        assert_eq!(v.vectorize("ab"), vec![0.0, 1.0, 1.0, 0.0]);
        assert_eq!(v.vectorize("ab"), v.vectorize("ba"));
        assert_eq!(v.vectorize("aab"), v.vectorize("ab"));
    }

    #[test]
    fn unseen_letters_collapse_onto_unknown() {
        let v = SurnameVectorizer::from_corpus(&rows());
        assert_eq!(v.vectorize("zq"), vec![1.0, 0.0, 0.0, 0.0]);
        assert_eq!(v.vectorize("az"), vec![1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn empty_surname_is_all_zero() {
        let v = SurnameVectorizer::from_corpus(&rows());
        assert_eq!(v.vectorize(""), vec![0.0; 4]);
    }

    #[test]
    fn unknown_label_is_not_found() {
        let v = SurnameVectorizer::from_corpus(&rows());
        assert!(matches!(v.label_index("Z"), Err(Error::NotFound(_))));
    }

    #[test]
    fn json_roundtrip_preserves_behavior() {
        let v = SurnameVectorizer::from_corpus(&rows());
        let json = v.to_json_string_pretty().unwrap();
        let restored = SurnameVectorizer::from_json_str(&json).unwrap();
        assert_eq!(restored, v);
        assert_eq!(restored.vectorize("cz"), v.vectorize("cz"));
    }

    #[test]
    fn golden_json_is_stable() {
        let v = SurnameVectorizer::from_corpus(&rows());
        let golden = include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/golden/vectorizer_v1.json"
        ))
        .trim_end();
        assert_eq!(v.to_json_string_pretty().unwrap(), golden);
        assert_eq!(SurnameVectorizer::from_json_str(golden).unwrap(), v);
    }
}
