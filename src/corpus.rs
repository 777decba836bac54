//! Labeled surname corpora.
//!
//! Rows are read from CSV with a header. A split corpus carries a `split` column with
//! `train`, `val` or `test`; a raw corpus only has `surname` and `nationality` and can
//! be split with [`assign_splits`]. Extra columns are ignored.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Val, Split::Test];

    pub fn as_str(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Split {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "train" => Ok(Split::Train),
            "val" => Ok(Split::Val),
            "test" => Ok(Split::Test),
            other => Err(Error::InvalidSplit(other.to_owned())),
        }
    }
}

/// One labeled example.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurnameRecord {
    pub surname: String,
    pub nationality: String,
    pub split: Split,
}

impl SurnameRecord {
    pub fn new(surname: impl Into<String>, nationality: impl Into<String>, split: Split) -> Self {
        Self {
            surname: surname.into(),
            nationality: nationality.into(),
            split,
        }
    }
}

/// A labeled example that has not been assigned to a split yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSurname {
    pub surname: String,
    pub nationality: String,
}

/// Reads a split corpus (`surname,nationality,split`, header required).
pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Vec<SurnameRecord>> {
    read_rows(path.as_ref())
}

/// Reads an unsplit corpus (`surname,nationality`, header required).
pub fn load_raw_csv<P: AsRef<Path>>(path: P) -> Result<Vec<RawSurname>> {
    read_rows(path.as_ref())
}

fn read_rows<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>> {
    let mut rdr = csv::Reader::from_path(path)
        .map_err(|e| Error::Io(format!("failed to open {}: {e}", path.display())))?;
    let mut rows = Vec::new();
    for (line, row) in rdr.deserialize().enumerate() {
        let row: T = row.map_err(|e| {
            // +2: one for the header, one for 1-based lines.
            Error::InvalidData(format!("{} line {}: {e}", path.display(), line + 2))
        })?;
        rows.push(row);
    }
    tracing::debug!(rows = rows.len(), path = %path.display(), "loaded corpus");
    Ok(rows)
}

pub fn write_csv<P: AsRef<Path>>(path: P, records: &[SurnameRecord]) -> Result<()> {
    let p = path.as_ref();
    let mut wtr = csv::Writer::from_path(p)
        .map_err(|e| Error::Io(format!("failed to create {}: {e}", p.display())))?;
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()
        .map_err(|e| Error::Io(format!("failed to write {}: {e}", p.display())))?;
    Ok(())
}

/// Fractions of each nationality that go to train and val; test gets the remainder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitFractions {
    pub train: f64,
    pub val: f64,
}

impl Default for SplitFractions {
    fn default() -> Self {
        Self {
            train: 0.70,
            val: 0.15,
        }
    }
}

impl SplitFractions {
    pub fn validate(self) -> Result<()> {
        for (name, v) in [("train", self.train), ("val", self.val)] {
            if !(v.is_finite() && (0.0..=1.0).contains(&v)) {
                return Err(Error::InvalidConfig(format!(
                    "{name} fraction must be finite and in [0,1], got {v}"
                )));
            }
        }
        if self.train + self.val > 1.0 + 1e-9 {
            return Err(Error::InvalidConfig(format!(
                "train + val fractions must be <= 1, got {}",
                self.train + self.val
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn test(self) -> f64 {
        (1.0 - self.train - self.val).max(0.0)
    }
}

/// Stratified split assignment.
///
/// Rows are grouped by nationality (groups visited in sorted order), each group is
/// shuffled with one seeded RNG, then the first `floor(n * train)` rows go to train,
/// the next `floor(n * val)` to val and the rest to test. Every nationality keeps at
/// least one training row.
pub fn assign_splits(
    rows: Vec<RawSurname>,
    fractions: SplitFractions,
    seed: u64,
) -> Result<Vec<SurnameRecord>> {
    fractions.validate()?;

    let mut by_nationality: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for row in rows {
        by_nationality
            .entry(row.nationality)
            .or_default()
            .push(row.surname);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = Vec::new();
    for (nationality, mut surnames) in by_nationality {
        surnames.shuffle(&mut rng);

        let n = surnames.len();
        let n_train = share(n, fractions.train).max(1).min(n);
        let n_val = share(n, fractions.val).min(n - n_train);

        for (i, surname) in surnames.into_iter().enumerate() {
            let split = if i < n_train {
                Split::Train
            } else if i < n_train + n_val {
                Split::Val
            } else {
                Split::Test
            };
            out.push(SurnameRecord {
                surname,
                nationality: nationality.clone(),
                split,
            });
        }
    }
    Ok(out)
}

/// `floor(n * fraction)`, tolerant to representation error (0.7 * 20 is 14).
#[inline]
fn share(n: usize, fraction: f64) -> usize {
    (n as f64 * fraction + 1e-9).floor() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(surname: &str, nationality: &str) -> RawSurname {
        RawSurname {
            surname: surname.to_owned(),
            nationality: nationality.to_owned(),
        }
    }

    fn corpus() -> Vec<RawSurname> {
        let mut rows = Vec::new();
        for i in 0..20 {
            rows.push(raw(&format!("Smith{i}"), "English"));
        }
        for i in 0..10 {
            rows.push(raw(&format!("Rossi{i}"), "Italian"));
        }
        rows.push(raw("Nakamura", "Japanese"));
        rows
    }

    #[test]
    fn split_parses_known_names_only() {
        assert_eq!("train".parse::<Split>().unwrap(), Split::Train);
        assert_eq!("val".parse::<Split>().unwrap(), Split::Val);
        assert_eq!("test".parse::<Split>().unwrap(), Split::Test);
        assert_eq!(
            "dev".parse::<Split>().unwrap_err(),
            Error::InvalidSplit("dev".to_owned())
        );
    }

    #[test]
    fn assign_splits_is_stratified() {
        let records = assign_splits(corpus(), SplitFractions::default(), 1337).unwrap();
        assert_eq!(records.len(), 31);

        let count = |nat: &str, split: Split| {
            records
                .iter()
                .filter(|r| r.nationality == nat && r.split == split)
                .count()
        };
        assert_eq!(count("English", Split::Train), 14);
        assert_eq!(count("English", Split::Val), 3);
        assert_eq!(count("English", Split::Test), 3);
        assert_eq!(count("Italian", Split::Train), 7);
        assert_eq!(count("Italian", Split::Val), 1);
        assert_eq!(count("Italian", Split::Test), 2);
        // A singleton nationality still lands in train.
        assert_eq!(count("Japanese", Split::Train), 1);
    }

    #[test]
    fn assign_splits_is_reproducible_for_a_seed() {
        let a = assign_splits(corpus(), SplitFractions::default(), 7).unwrap();
        let b = assign_splits(corpus(), SplitFractions::default(), 7).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn fractions_are_validated() {
        let bad = SplitFractions {
            train: 0.9,
            val: 0.2,
        };
        assert!(bad.validate().is_err());
        assert!(assign_splits(corpus(), bad, 0).is_err());
        assert!((SplitFractions::default().test() - 0.15).abs() < 1e-9);
    }

    #[test]
    fn csv_roundtrip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("surnames.csv");
        let records = vec![
            SurnameRecord::new("Nguyen", "Vietnamese", Split::Train),
            SurnameRecord::new("Ivanov", "Russian", Split::Val),
        ];
        write_csv(&path, &records).unwrap();
        assert_eq!(load_csv(&path).unwrap(), records);
    }

    #[test]
    fn extra_columns_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("surnames.csv");
        std::fs::write(
            &path,
            "surname,nationality,nationality_index,split\nWoodford,English,4,train\n",
        )
        .unwrap();
        let rows = load_csv(&path).unwrap();
        assert_eq!(
            rows,
            vec![SurnameRecord::new("Woodford", "English", Split::Train)]
        );
    }

    #[test]
    fn bad_split_value_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("surnames.csv");
        std::fs::write(&path, "surname,nationality,split\nWoodford,English,dev\n").unwrap();
        assert!(matches!(load_csv(&path), Err(Error::InvalidData(_))));
    }
}
