/// Facial emotion training - train the CNN on a class-per-directory image tree
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use candle_core::Device;
use clap::{Parser, Subcommand, ValueHint};
use emotion_cnn::data::{
    sample_per_class, BatchDataLoader, ImageFolderDataset, ImageFolderLoader, InMemoryLoader,
};
use emotion_cnn::metrics::{ConfusionMatrix, Predictions};
use emotion_cnn::models::{load_model, EmotionCnn};
use emotion_cnn::plot::{plot_confusion_matrix, plot_training_history};
use emotion_cnn::training::{self, Trainer};
use emotion_cnn::ExperimentConfig;

#[derive(Parser)]
#[command(author, version, about = "Train and evaluate the facial emotion CNN")]
struct Cli {
    /// Built-in experiment: `full` (focal loss, whole dataset) or `balanced` (200 per class)
    #[arg(long, global = true, default_value = "full")]
    preset: String,

    /// JSON experiment config; overrides --preset
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    #[arg(long, global = true, value_hint = ValueHint::DirPath)]
    train_dir: Option<String>,

    #[arg(long, global = true, value_hint = ValueHint::DirPath)]
    test_dir: Option<String>,

    #[arg(long, global = true, value_hint = ValueHint::DirPath)]
    output_dir: Option<String>,

    #[arg(long, global = true)]
    epochs: Option<usize>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Train, then evaluate on the test split (default)
    Train,

    /// Evaluate saved weights on the test split
    Evaluate {
        #[arg(long, value_hint = ValueHint::FilePath)]
        weights: PathBuf,
    },
}

fn resolve_config(cli: &Cli) -> anyhow::Result<ExperimentConfig> {
    let mut config = match &cli.config {
        Some(path) => ExperimentConfig::load(path)
            .with_context(|| format!("loading config {:?}", path))?,
        None => ExperimentConfig::preset(&cli.preset)?,
    };

    if let Some(dir) = &cli.train_dir {
        config.train_dir = dir.clone();
    }
    if let Some(dir) = &cli.test_dir {
        config.test_dir = dir.clone();
    }
    if let Some(dir) = &cli.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(epochs) = cli.epochs {
        config.training.num_epochs = epochs;
    }

    config.validate()?;
    Ok(config)
}

fn load_split(dir: &str, config: &ExperimentConfig) -> anyhow::Result<ImageFolderDataset> {
    let dataset = ImageFolderDataset::from_directory(dir, config.model.image_size)
        .with_context(|| format!("loading images from {}", dir))?;

    log::info!(
        "Found {} images belonging to {} classes in {}",
        dataset.len(),
        dataset.num_classes(),
        dir
    );

    if dataset.num_classes() != config.model.num_classes {
        bail!(
            "{} has {} class directories, model expects {}",
            dir,
            dataset.num_classes(),
            config.model.num_classes
        );
    }

    Ok(dataset)
}

fn report(
    predictions: &Predictions,
    class_names: &[String],
    output_dir: &Path,
) -> anyhow::Result<ConfusionMatrix> {
    let matrix = predictions.confusion_matrix(class_names.len())?;

    log::info!("Confusion matrix:\n{}", matrix.with_names(class_names));
    plot_confusion_matrix(&matrix, class_names, output_dir.join("confusion_matrix.png"))?;

    log::info!("Class-wise accuracy (worst first):");
    for (class, accuracy) in matrix.ranked_class_accuracy() {
        log::info!("  {:<10} {:.2}%", class_names[class], accuracy * 100.0);
    }
    log::info!("Overall accuracy: {:.2}%", matrix.accuracy() * 100.0);

    Ok(matrix)
}

fn fit_and_report<T, V>(
    config: &ExperimentConfig,
    device: Device,
    train_loader: &mut T,
    valid_loader: &mut V,
    class_names: &[String],
) -> anyhow::Result<()>
where
    T: BatchDataLoader,
    V: BatchDataLoader,
{
    let output_dir = Path::new(&config.output_dir);

    let mut training_config = config.training.clone();
    if training_config.checkpoint_dir.is_none() {
        training_config.checkpoint_dir =
            Some(output_dir.join("checkpoints").to_string_lossy().into_owned());
    }

    log::info!("Initializing trainer...");
    let mut trainer = Trainer::new(config.model.clone(), training_config, device)?;

    let history = trainer.fit(train_loader, valid_loader)?;
    history.save(output_dir.join("history.json"))?;
    plot_training_history(&history, output_dir.join("training_history.png"))?;

    let weights = output_dir.join("model.safetensors");
    trainer.save_weights(&weights)?;
    log::info!("Saved weights to {:?}", weights);

    let predictions = trainer.predict(valid_loader)?;
    report(&predictions, class_names, output_dir)?;

    Ok(())
}

fn train(config: &ExperimentConfig, device: Device) -> anyhow::Result<()> {
    let output_dir = Path::new(&config.output_dir);
    config.save(output_dir.join("config.json"))?;

    let train_set = load_split(&config.train_dir, config)?;
    let test_set = load_split(&config.test_dir, config)?;

    if train_set.classes() != test_set.classes() {
        bail!(
            "class directories differ: {:?} vs {:?}",
            train_set.classes(),
            test_set.classes()
        );
    }
    let class_names = train_set.classes().to_vec();
    let batch_size = config.training.batch_size;
    let seed = config.training.seed;

    match &config.sampling {
        Some(sampling) => {
            log::info!(
                "Sampling {} images per class from each split",
                sampling.samples_per_class
            );

            let mut source = ImageFolderLoader::new(train_set, batch_size, true, seed);
            let train = sample_per_class(
                &mut source,
                sampling.samples_per_class,
                sampling.max_batches,
                &device,
            )?;

            let test_seed = seed.wrapping_add(1);
            let mut source = ImageFolderLoader::new(test_set, batch_size, true, test_seed);
            let test = sample_per_class(
                &mut source,
                sampling.samples_per_class,
                sampling.max_batches,
                &device,
            )?;

            log::info!("Balanced subsets: {} train, {} test", train.len(), test.len());

            let mut train_loader = InMemoryLoader::new(train, batch_size, true, seed);
            let mut valid_loader = InMemoryLoader::new(test, batch_size, false, seed);
            fit_and_report(config, device, &mut train_loader, &mut valid_loader, &class_names)
        }
        None => {
            let mut train_loader = ImageFolderLoader::new(train_set, batch_size, true, seed);
            let mut valid_loader = ImageFolderLoader::new(test_set, batch_size, false, seed);
            fit_and_report(config, device, &mut train_loader, &mut valid_loader, &class_names)
        }
    }
}

fn evaluate(config: &ExperimentConfig, device: Device, weights: &Path) -> anyhow::Result<()> {
    let test_set = load_split(&config.test_dir, config)?;
    let class_names = test_set.classes().to_vec();

    let model: EmotionCnn = load_model(config.model.clone(), weights, &device)
        .with_context(|| format!("loading weights {:?}", weights))?;

    let mut loader = ImageFolderLoader::new(test_set, config.training.batch_size, false, 0);

    let metrics = training::evaluate(&model, &config.training.loss, &mut loader, &device)?;
    log::info!(
        "Test loss={:.4} accuracy={:.4} over {} images",
        metrics.loss,
        metrics.accuracy,
        metrics.samples
    );

    let predictions = training::predict(&model, &mut loader, &device)?;
    report(&predictions, &class_names, Path::new(&config.output_dir))?;

    Ok(())
}

fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    log::info!("=== Emotion CNN - experiment '{}' ===", config.name);

    let device = emotion_cnn::utils::select_device()?;
    log::info!("Using device: {:?}", device);

    match cli.command.unwrap_or(Command::Train) {
        Command::Train => train(&config, device),
        Command::Evaluate { weights } => evaluate(&config, device, &weights),
    }
}
