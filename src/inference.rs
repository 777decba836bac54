//! Nationality prediction for a single surname.

use std::path::Path;

use crate::metrics::{argmax, top_k_indices};
use crate::{Error, Result, SurnameClassifier, SurnameVectorizer};

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub nationality: String,
    /// Softmax probability in `[0, 1]`.
    pub probability: f32,
}

/// Most probable nationality for `surname`.
///
/// Empty or unseen surnames are valid input; they vectorize to the zero or unknown
/// vector.
pub fn predict_top1(
    surname: &str,
    classifier: &SurnameClassifier,
    vectorizer: &SurnameVectorizer,
) -> Result<Prediction> {
    let probs = probabilities(surname, classifier, vectorizer)?;
    let best = argmax(&probs);
    Ok(Prediction {
        nationality: vectorizer.label(best)?.to_owned(),
        probability: probs[best],
    })
}

/// The `k` most probable nationalities, highest first.
///
/// `k` is clamped to the number of nationalities.
pub fn predict_topk(
    surname: &str,
    classifier: &SurnameClassifier,
    vectorizer: &SurnameVectorizer,
    k: usize,
) -> Result<Vec<Prediction>> {
    let probs = probabilities(surname, classifier, vectorizer)?;
    top_k_indices(&probs, k)
        .into_iter()
        .map(|idx| {
            Ok(Prediction {
                nationality: vectorizer.label(idx)?.to_owned(),
                probability: probs[idx],
            })
        })
        .collect()
}

fn probabilities(
    surname: &str,
    classifier: &SurnameClassifier,
    vectorizer: &SurnameVectorizer,
) -> Result<Vec<f32>> {
    check_dims(classifier, vectorizer)?;
    let input = vectorizer.vectorize(surname);
    let mut scratch = classifier.scratch();
    Ok(classifier.forward(&input, &mut scratch, true).to_vec())
}

fn check_dims(classifier: &SurnameClassifier, vectorizer: &SurnameVectorizer) -> Result<()> {
    if classifier.input_dim() != vectorizer.input_dim()
        || classifier.output_dim() != vectorizer.num_classes()
    {
        return Err(Error::DimensionMismatch(format!(
            "classifier maps {} -> {} but vectorizer has {} characters and {} nationalities",
            classifier.input_dim(),
            classifier.output_dim(),
            vectorizer.input_dim(),
            vectorizer.num_classes()
        )));
    }
    Ok(())
}

/// A vectorizer and classifier loaded together from disk.
#[derive(Debug, Clone)]
pub struct Predictor {
    vectorizer: SurnameVectorizer,
    classifier: SurnameClassifier,
}

impl Predictor {
    pub fn new(vectorizer: SurnameVectorizer, classifier: SurnameClassifier) -> Result<Self> {
        check_dims(&classifier, &vectorizer)?;
        Ok(Self {
            vectorizer,
            classifier,
        })
    }

    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(vectorizer_path: P, model_path: Q) -> Result<Self> {
        let vectorizer = SurnameVectorizer::load_json(vectorizer_path)?;
        let classifier = SurnameClassifier::load_json(model_path)?;
        tracing::debug!(
            input_dim = classifier.input_dim(),
            hidden_dim = classifier.hidden_dim(),
            output_dim = classifier.output_dim(),
            "loaded classifier"
        );
        Self::new(vectorizer, classifier)
    }

    #[inline]
    pub fn vectorizer(&self) -> &SurnameVectorizer {
        &self.vectorizer
    }

    #[inline]
    pub fn classifier(&self) -> &SurnameClassifier {
        &self.classifier
    }

    pub fn predict(&self, surname: &str) -> Result<Prediction> {
        predict_top1(surname, &self.classifier, &self.vectorizer)
    }

    pub fn predict_topk(&self, surname: &str, k: usize) -> Result<Vec<Prediction>> {
        predict_topk(surname, &self.classifier, &self.vectorizer, k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{Split, SurnameRecord};

    fn fixture() -> (SurnameVectorizer, SurnameClassifier) {
        let rows = [
            SurnameRecord::new("ab", "X", Split::Train),
            SurnameRecord::new("cd", "Y", Split::Train),
            SurnameRecord::new("ef", "Z", Split::Train),
        ];
        let vectorizer = SurnameVectorizer::from_corpus(&rows);
        let classifier =
            SurnameClassifier::new_with_seed(vectorizer.input_dim(), 4, vectorizer.num_classes(), 3)
                .unwrap();
        (vectorizer, classifier)
    }

    #[test]
    fn top1_is_head_of_topk() {
        let (v, c) = fixture();
        let top1 = predict_top1("abc", &c, &v).unwrap();
        let topk = predict_topk("abc", &c, &v, 3).unwrap();
        assert_eq!(top1, topk[0]);
        assert!((0.0..=1.0).contains(&top1.probability));
    }

    #[test]
    fn topk_is_sorted_clamped_and_sums_to_one() {
        let (v, c) = fixture();
        let preds = predict_topk("ab", &c, &v, 10).unwrap();
        assert_eq!(preds.len(), 3);
        assert!(preds.windows(2).all(|w| w[0].probability >= w[1].probability));
        let total: f32 = preds.iter().map(|p| p.probability).sum();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[test]
    fn odd_surnames_still_predict() {
        let (v, c) = fixture();
        predict_top1("", &c, &v).unwrap();
        predict_top1("zzz", &c, &v).unwrap();
    }

    #[test]
    fn mismatched_artifacts_are_rejected() {
        let (v, _) = fixture();
        let other = SurnameClassifier::new_with_seed(2, 4, 3, 0).unwrap();
        assert!(matches!(
            Predictor::new(v, other),
            Err(Error::DimensionMismatch(_))
        ));
    }

    #[test]
    fn predictor_loads_saved_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let (v, c) = fixture();
        let vpath = dir.path().join("vectorizer.json");
        let mpath = dir.path().join("model.json");
        v.save_json(&vpath).unwrap();
        c.save_json(&mpath).unwrap();

        let predictor = Predictor::load(&vpath, &mpath).unwrap();
        assert_eq!(
            predictor.predict("cd").unwrap(),
            predict_top1("cd", &c, &v).unwrap()
        );
    }
}
