//! Split-aware dataset and mini-batching.
//!
//! `SurnameDataset` owns every labeled row, the three split views (train/val/test) and
//! the vectorizer. A selector picks the active split; `len`, `get` and `batches` all
//! operate on it.
//!
//! Batches are produced lazily. Each call to [`SurnameDataset::batches`] draws a fresh
//! permutation of the active split and drops the trailing incomplete batch, so the
//! batches of one call cover `batch_count * batch_size` distinct rows.

use std::path::Path;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::corpus::{self, Split, SurnameRecord};
use crate::{Error, Result, SurnameVectorizer};

/// Row order used by [`SurnameDataset::batches`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Shuffle {
    /// Keep the split's row order.
    None,
    /// Fresh permutation from the thread RNG.
    #[default]
    Random,
    /// Permutation from an RNG seeded with the given value.
    Seeded(u64),
}

/// A single vectorized row.
#[derive(Debug, Clone, PartialEq)]
pub struct Example {
    pub features: Vec<f32>,
    pub label: usize,
}

/// A mini-batch in row-major layout: `inputs.len() == len * input_dim`.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    inputs: Vec<f32>,
    labels: Vec<usize>,
    input_dim: usize,
}

impl Batch {
    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    /// Returns the `idx`-th input row.
    ///
    /// Panics if `idx >= len`.
    #[inline]
    pub fn input(&self, idx: usize) -> &[f32] {
        let start = idx * self.input_dim;
        &self.inputs[start..start + self.input_dim]
    }

    #[inline]
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }
}

#[derive(Debug, Clone)]
pub struct SurnameDataset {
    records: Vec<SurnameRecord>,
    /// Record indices per split, in corpus order. Indexed by `slot(split)`.
    views: [Vec<usize>; 3],
    /// Nationality index per record.
    labels: Vec<usize>,
    class_weights: Vec<f32>,
    vectorizer: SurnameVectorizer,
    active: Split,
}

#[inline]
fn slot(split: Split) -> usize {
    match split {
        Split::Train => 0,
        Split::Val => 1,
        Split::Test => 2,
    }
}

impl SurnameDataset {
    /// Wraps `records` with an existing vectorizer.
    ///
    /// Fails if a record's nationality is unknown to the vectorizer, or if a nationality
    /// in the vectorizer has no rows (its class weight would be infinite).
    pub fn new(records: Vec<SurnameRecord>, vectorizer: SurnameVectorizer) -> Result<Self> {
        if records.is_empty() {
            return Err(Error::InvalidData("corpus must not be empty".to_owned()));
        }

        let mut views: [Vec<usize>; 3] = Default::default();
        let mut labels = Vec::with_capacity(records.len());
        let mut counts = vec![0_usize; vectorizer.num_classes()];

        for (i, record) in records.iter().enumerate() {
            let label = vectorizer.label_index(&record.nationality).map_err(|_| {
                Error::NotFound(format!(
                    "nationality {:?} of surname {:?} ({} split) was not seen when building the vectorizer",
                    record.nationality, record.surname, record.split
                ))
            })?;
            counts[label] += 1;
            labels.push(label);
            views[slot(record.split)].push(i);
        }

        let class_weights = class_weights_from_counts(&counts, &vectorizer)?;

        tracing::debug!(
            train = views[0].len(),
            val = views[1].len(),
            test = views[2].len(),
            classes = class_weights.len(),
            "built dataset"
        );

        Ok(Self {
            records,
            views,
            labels,
            class_weights,
            vectorizer,
            active: Split::Train,
        })
    }

    /// Builds the vectorizer from the train split only, then wraps all records.
    pub fn with_new_vectorizer(records: Vec<SurnameRecord>) -> Result<Self> {
        let train = records.iter().filter(|r| r.split == Split::Train);
        if train.clone().next().is_none() {
            return Err(Error::InvalidData(
                "corpus has no rows in the train split".to_owned(),
            ));
        }
        let vectorizer = SurnameVectorizer::from_corpus(train);
        Self::new(records, vectorizer)
    }

    pub fn from_csv_with_new_vectorizer<P: AsRef<Path>>(corpus_csv: P) -> Result<Self> {
        Self::with_new_vectorizer(corpus::load_csv(corpus_csv)?)
    }

    pub fn from_csv_with_vectorizer<P: AsRef<Path>, Q: AsRef<Path>>(
        corpus_csv: P,
        vectorizer_json: Q,
    ) -> Result<Self> {
        let records = corpus::load_csv(corpus_csv)?;
        let vectorizer = SurnameVectorizer::load_json(vectorizer_json)?;
        Self::new(records, vectorizer)
    }

    #[inline]
    pub fn vectorizer(&self) -> &SurnameVectorizer {
        &self.vectorizer
    }

    /// Inverse nationality frequency over the whole corpus, indexed by label.
    #[inline]
    pub fn class_weights(&self) -> &[f32] {
        &self.class_weights
    }

    #[inline]
    pub fn split(&self) -> Split {
        self.active
    }

    pub fn set_split(&mut self, split: Split) {
        self.active = split;
    }

    pub fn set_split_by_name(&mut self, name: &str) -> Result<()> {
        self.active = name.parse()?;
        Ok(())
    }

    /// Number of rows in the active split.
    #[inline]
    pub fn len(&self) -> usize {
        self.split_len(self.active)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn split_len(&self, split: Split) -> usize {
        self.views[slot(split)].len()
    }

    /// Rows of the active split, in corpus order.
    pub fn records(&self) -> impl Iterator<Item = &SurnameRecord> + '_ {
        self.views[slot(self.active)]
            .iter()
            .map(move |&i| &self.records[i])
    }

    pub fn get(&self, idx: usize) -> Result<Example> {
        let view = &self.views[slot(self.active)];
        let &record_idx = view.get(idx).ok_or(Error::IndexOutOfRange {
            index: idx,
            len: view.len(),
        })?;
        Ok(Example {
            features: self
                .vectorizer
                .vectorize(&self.records[record_idx].surname),
            label: self.labels[record_idx],
        })
    }

    /// Number of full batches in the active split; the trailing partial batch is
    /// dropped. Returns 0 for `batch_size == 0`.
    #[inline]
    pub fn batch_count(&self, batch_size: usize) -> usize {
        self.len().checked_div(batch_size).unwrap_or(0)
    }

    /// Lazy batches over the active split.
    pub fn batches(&self, batch_size: usize, shuffle: Shuffle) -> Result<Batches<'_>> {
        if batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be > 0".to_owned()));
        }

        let mut order = self.views[slot(self.active)].clone();
        match shuffle {
            Shuffle::None => {}
            Shuffle::Random => order.shuffle(&mut rand::thread_rng()),
            Shuffle::Seeded(seed) => order.shuffle(&mut StdRng::seed_from_u64(seed)),
        }

        Ok(Batches {
            dataset: self,
            num_batches: order.len() / batch_size,
            order,
            batch_size,
            next: 0,
        })
    }
}

fn class_weights_from_counts(counts: &[usize], vectorizer: &SurnameVectorizer) -> Result<Vec<f32>> {
    counts
        .iter()
        .enumerate()
        .map(|(label, &count)| {
            if count == 0 {
                let name = vectorizer.label(label).unwrap_or("?");
                return Err(Error::InvalidData(format!(
                    "nationality {name:?} has no rows in the corpus"
                )));
            }
            Ok(1.0 / count as f32)
        })
        .collect()
}

/// Iterator returned by [`SurnameDataset::batches`].
#[derive(Debug)]
pub struct Batches<'a> {
    dataset: &'a SurnameDataset,
    order: Vec<usize>,
    batch_size: usize,
    num_batches: usize,
    next: usize,
}

impl Iterator for Batches<'_> {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        if self.next >= self.num_batches {
            return None;
        }

        let ds = self.dataset;
        let dim = ds.vectorizer.input_dim();
        let start = self.next * self.batch_size;
        let rows = &self.order[start..start + self.batch_size];

        let mut inputs = vec![0.0_f32; self.batch_size * dim];
        let mut labels = Vec::with_capacity(self.batch_size);
        for (j, &record_idx) in rows.iter().enumerate() {
            ds.vectorizer.vectorize_into(
                &ds.records[record_idx].surname,
                &mut inputs[j * dim..(j + 1) * dim],
            );
            labels.push(ds.labels[record_idx]);
        }

        self.next += 1;
        Some(Batch {
            inputs,
            labels,
            input_dim: dim,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.num_batches - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Batches<'_> {}
