use std::path::Path;

use surname_mlp::corpus::{self, RawSurname, SplitFractions};
use surname_mlp::{
    predict_top1, predict_topk, Predictor, Split, SurnameClassifier, SurnameDataset,
    SurnameRecord, TrainConfig, TrainState, TrainingStatus,
};

fn model_for(ds: &SurnameDataset, cfg: &TrainConfig) -> SurnameClassifier {
    let v = ds.vectorizer();
    SurnameClassifier::new_with_seed(v.input_dim(), cfg.hidden_dim, v.num_classes(), cfg.seed)
        .unwrap()
}

#[test]
fn two_letter_corpus_trains_and_predicts() {
    let dir = tempfile::tempdir().unwrap();
    let mut rows = Vec::new();
    for split in Split::ALL {
        rows.push(SurnameRecord::new("a", "X", split));
        rows.push(SurnameRecord::new("b", "Y", split));
    }
    let mut ds = SurnameDataset::with_new_vectorizer(rows).unwrap();

    let cfg = TrainConfig {
        hidden_dim: 4,
        batch_size: 1,
        learning_rate: 0.05,
        num_epochs: 30,
        ..TrainConfig::default()
    };
    let mut model = model_for(&ds, &cfg);
    let state = model
        .fit(&mut ds, &cfg, &dir.path().join("model.json"), None)
        .unwrap();
    assert_ne!(state.status, TrainingStatus::Interrupted);

    let pred = predict_top1("a", &model, ds.vectorizer()).unwrap();
    assert!(pred.nationality == "X" || pred.nationality == "Y");
    assert!((0.0..=1.0).contains(&pred.probability));

    let all = predict_topk("a", &model, ds.vectorizer(), 10).unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0], pred);
}

const ENGLISH: &[&str] = &[
    "smith", "jones", "brown", "taylor", "wilson", "davies", "evans", "thomas", "roberts",
    "walker",
];
const ITALIAN: &[&str] = &[
    "rossi", "russo", "ferrari", "esposito", "bianchi", "romano", "colombo", "ricci", "marino",
    "greco",
];
const JAPANESE: &[&str] = &[
    "sato", "suzuki", "takahashi", "tanaka", "watanabe", "ito", "yamamoto", "nakamura",
    "kobayashi", "kato",
];

fn write_raw_corpus(path: &Path) {
    let mut wtr = csv::Writer::from_path(path).unwrap();
    for (nationality, surnames) in [
        ("English", ENGLISH),
        ("Italian", ITALIAN),
        ("Japanese", JAPANESE),
    ] {
        for surname in surnames {
            wtr.serialize(RawSurname {
                surname: (*surname).to_owned(),
                nationality: nationality.to_owned(),
            })
            .unwrap();
        }
    }
    wtr.flush().unwrap();
}

#[test]
fn csv_pipeline_writes_reloadable_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let raw_path = dir.path().join("raw.csv");
    let split_path = dir.path().join("split.csv");
    let vectorizer_path = dir.path().join("vectorizer.json");
    let model_path = dir.path().join("model.json");
    let state_path = dir.path().join("train_state.json");

    write_raw_corpus(&raw_path);
    let raw = corpus::load_raw_csv(&raw_path).unwrap();
    let records = corpus::assign_splits(raw, SplitFractions::default(), 7).unwrap();
    corpus::write_csv(&split_path, &records).unwrap();

    let mut ds = SurnameDataset::from_csv_with_new_vectorizer(&split_path).unwrap();
    // 10 rows per nationality: 7 train, 1 val, 2 test.
    assert_eq!(ds.split_len(Split::Train), 21);
    assert_eq!(ds.split_len(Split::Val), 3);
    assert_eq!(ds.split_len(Split::Test), 6);
    ds.vectorizer().save_json(&vectorizer_path).unwrap();

    let cfg = TrainConfig {
        hidden_dim: 16,
        batch_size: 3,
        learning_rate: 0.01,
        num_epochs: 15,
        ..TrainConfig::default()
    };
    let mut model = model_for(&ds, &cfg);
    let state = model.fit(&mut ds, &cfg, &model_path, None).unwrap();
    state.save_json(&state_path).unwrap();

    let reloaded_state = TrainState::load_json(&state_path).unwrap();
    assert_eq!(reloaded_state.status, state.status);
    assert_eq!(reloaded_state.val_loss.len(), state.val_loss.len());
    assert!(reloaded_state.test_acc.is_some());
    assert_eq!(reloaded_state.model_path, model_path);

    let predictor = Predictor::load(&vectorizer_path, &model_path).unwrap();
    assert_eq!(predictor.classifier(), &model);

    let top = predictor.predict_topk("yamada", 5).unwrap();
    assert_eq!(top.len(), 3);
    assert!(top.windows(2).all(|w| w[0].probability >= w[1].probability));

    // Reusing the saved vectorizer reproduces the same dataset.
    let ds2 = SurnameDataset::from_csv_with_vectorizer(&split_path, &vectorizer_path).unwrap();
    assert_eq!(ds2.vectorizer(), ds.vectorizer());
    assert_eq!(ds2.class_weights(), ds.class_weights());
}
