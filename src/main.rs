use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use surname_mlp::corpus::{self, SplitFractions};
use surname_mlp::{Predictor, SurnameClassifier, SurnameDataset, TrainConfig, TrainingStatus};

const VECTORIZER_FILE: &str = "vectorizer.json";
const MODEL_FILE: &str = "model.json";
const TRAIN_STATE_FILE: &str = "train_state.json";

#[derive(Parser, Debug)]
#[command(
    name = "surname-mlp",
    version,
    about = "Train and query a surname -> nationality classifier."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Assign stratified train/val/test splits to a `surname,nationality` CSV
    Split(SplitArgs),
    /// Train a classifier on a split corpus
    Train(TrainArgs),
    /// Predict nationalities for one or more surnames
    Predict(PredictArgs),
}

#[derive(Args, Debug)]
struct SplitArgs {
    /// CSV with `surname,nationality` columns
    #[arg(long)]
    input: PathBuf,

    /// Where to write the CSV with an added `split` column
    #[arg(long)]
    output: PathBuf,

    #[arg(long, default_value_t = 0.70)]
    train_fraction: f64,

    #[arg(long, default_value_t = 0.15)]
    val_fraction: f64,

    #[arg(long, default_value_t = 1337)]
    seed: u64,
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// CSV with `surname,nationality,split` columns
    #[arg(long)]
    corpus: PathBuf,

    /// Directory for the vectorizer, model checkpoint and train state
    #[arg(long, default_value = "model_storage")]
    out_dir: PathBuf,

    /// JSON training config; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Reuse an existing vectorizer instead of building one from the train split
    #[arg(long)]
    vectorizer: Option<PathBuf>,

    #[arg(long)]
    hidden_dim: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    lr: Option<f32>,

    #[arg(long)]
    epochs: Option<usize>,

    /// Early-stopping patience in epochs
    #[arg(long)]
    patience: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args, Debug)]
struct PredictArgs {
    /// Directory written by `train`
    #[arg(long, default_value = "model_storage")]
    model_dir: PathBuf,

    /// Number of nationalities to show per surname
    #[arg(short, long, default_value_t = 1)]
    k: usize,

    #[arg(required = true)]
    surnames: Vec<String>,
}

impl TrainArgs {
    fn resolve_config(&self) -> Result<TrainConfig> {
        let mut cfg = match &self.config {
            Some(path) => TrainConfig::from_json_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => TrainConfig::default(),
        };
        if let Some(v) = self.hidden_dim {
            cfg.hidden_dim = v;
        }
        if let Some(v) = self.batch_size {
            cfg.batch_size = v;
        }
        if let Some(v) = self.lr {
            cfg.learning_rate = v;
        }
        if let Some(v) = self.epochs {
            cfg.num_epochs = v;
        }
        if let Some(v) = self.patience {
            cfg.early_stopping_patience = v;
        }
        if let Some(v) = self.seed {
            cfg.seed = v;
        }
        cfg.validate().context("invalid training config")?;
        Ok(cfg)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("surname_mlp=info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Split(args) => run_split(args),
        Commands::Train(args) => run_train(args),
        Commands::Predict(args) => run_predict(args),
    }
}

fn run_split(args: SplitArgs) -> Result<()> {
    let rows = corpus::load_raw_csv(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let fractions = SplitFractions {
        train: args.train_fraction,
        val: args.val_fraction,
    };
    let records = corpus::assign_splits(rows, fractions, args.seed)?;
    corpus::write_csv(&args.output, &records)?;
    tracing::info!(
        rows = records.len(),
        output = %args.output.display(),
        "wrote split corpus"
    );
    Ok(())
}

fn run_train(args: TrainArgs) -> Result<()> {
    let cfg = args.resolve_config()?;

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("failed to create {}", args.out_dir.display()))?;

    let mut dataset = match &args.vectorizer {
        Some(path) => SurnameDataset::from_csv_with_vectorizer(&args.corpus, path),
        None => SurnameDataset::from_csv_with_new_vectorizer(&args.corpus),
    }
    .with_context(|| format!("failed to build dataset from {}", args.corpus.display()))?;

    let vectorizer_path = args.out_dir.join(VECTORIZER_FILE);
    dataset.vectorizer().save_json(&vectorizer_path)?;

    let v = dataset.vectorizer();
    let mut model =
        SurnameClassifier::new_with_seed(v.input_dim(), cfg.hidden_dim, v.num_classes(), cfg.seed)?;
    tracing::info!(
        input_dim = model.input_dim(),
        hidden_dim = model.hidden_dim(),
        output_dim = model.output_dim(),
        "model ready"
    );

    let interrupt = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&interrupt);
        ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
            .context("failed to install Ctrl-C handler")?;
    }

    let model_path = args.out_dir.join(MODEL_FILE);
    let state = model.fit(&mut dataset, &cfg, &model_path, Some(&*interrupt))?;

    let state_path = args.out_dir.join(TRAIN_STATE_FILE);
    state.save_json(&state_path)?;

    match state.status {
        TrainingStatus::Interrupted if state.checkpoint_written() => println!(
            "Interrupted after {} epochs. Best model: {}",
            state.epochs_completed(),
            model_path.display()
        ),
        TrainingStatus::Interrupted => println!(
            "Interrupted after {} epochs. No checkpoint was written.",
            state.epochs_completed()
        ),
        _ if !state.checkpoint_written() => println!(
            "Training finished ({:?}) after {} epochs without a finite validation loss. \
             No checkpoint was written.",
            state.status,
            state.epochs_completed()
        ),
        _ => println!(
            "Training finished ({:?}) after {} epochs. Test loss: {}, test accuracy: {}%",
            state.status,
            state.epochs_completed(),
            fmt_metric(state.test_loss),
            fmt_metric(state.test_acc.map(|a| a * 100.0)),
        ),
    }
    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<()> {
    let predictor = Predictor::load(
        args.model_dir.join(VECTORIZER_FILE),
        args.model_dir.join(MODEL_FILE),
    )
    .with_context(|| format!("failed to load model from {}", args.model_dir.display()))?;

    for surname in &args.surnames {
        let preds = predictor.predict_topk(surname, args.k)?;
        for p in preds {
            println!("{surname} -> {} (p={:.2})", p.nationality, p.probability);
        }
    }
    Ok(())
}

fn fmt_metric(v: Option<f32>) -> String {
    v.map_or_else(|| "n/a".to_owned(), |v| format!("{v:.3}"))
}
