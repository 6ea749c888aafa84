use std::{
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use trainer::{
    TrainingConfig, TrainingSession,
    checkpoint::CheckpointManager,
    config::ArchitectureConfig,
    data::{ImageDataset, mnist},
};

const SIDE: usize = 28;

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ezgan-{}-{name}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// Writes an IDX file of `n` striped digits-sized images into `dir`.
fn write_images(dir: &Path, n: usize) {
    let pixels = (0..n * SIDE * SIDE)
        .map(|i| ((i / SIDE + i / (SIDE * SIDE)) % 5) as f32 / 4.)
        .collect();
    let dataset = ImageDataset::new(pixels, SIDE, SIDE).unwrap();
    fs::write(dir.join(mnist::TRAIN_IMAGES), mnist::encode_images(&dataset)).unwrap();
}

fn small_config(root: &Path) -> TrainingConfig {
    TrainingConfig {
        data_dir: root.join("data"),
        validation_size: 4,
        batch_size: NonZeroUsize::new(2).unwrap(),
        iterations: 6,
        architecture: ArchitectureConfig {
            z_dim: 4,
            discriminator_filters: (2, 2),
            discriminator_hidden: 4,
        },
        report_every: NonZeroUsize::new(2).unwrap(),
        sample_every: NonZeroUsize::new(3).unwrap(),
        checkpoint_every: NonZeroUsize::new(2).unwrap(),
        keep_checkpoints: NonZeroUsize::new(2).unwrap(),
        checkpoint_dir: root.join("models"),
        metrics_path: root.join("logs/metrics.jsonl"),
        prefetch: 1,
        seed: Some(1),
        ..TrainingConfig::default()
    }
}

#[tokio::test]
async fn short_run_reports_and_checkpoints() {
    let root = temp_dir("session-run");
    let cfg = small_config(&root);
    fs::create_dir_all(&cfg.data_dir).unwrap();
    write_images(&cfg.data_dir, 12);

    let session = TrainingSession::new(cfg.clone()).unwrap();
    assert_eq!(session.start_iteration(), 0);

    let summary = session.run().await.unwrap();
    assert_eq!(summary.iterations, 6);
    assert!(summary.final_losses.is_finite());

    let metrics = fs::read_to_string(&cfg.metrics_path).unwrap();
    let iterations: Vec<u64> = metrics
        .lines()
        .map(|line| {
            let report: serde_json::Value = serde_json::from_str(line).unwrap();
            report["iteration"].as_u64().unwrap()
        })
        .collect();
    assert_eq!(iterations, vec![0, 2, 4]);

    let manager = CheckpointManager::new(&cfg.checkpoint_dir, cfg.keep_checkpoints);
    let kept: Vec<u64> = manager.list().unwrap().into_iter().map(|(i, _)| i).collect();
    assert_eq!(kept, vec![2, 4]);
}

#[tokio::test]
async fn resumes_after_the_checkpoint() {
    let root = temp_dir("session-resume");
    let mut cfg = small_config(&root);
    fs::create_dir_all(&cfg.data_dir).unwrap();
    write_images(&cfg.data_dir, 12);

    TrainingSession::new(cfg.clone()).unwrap().run().await.unwrap();

    let manager = CheckpointManager::new(&cfg.checkpoint_dir, cfg.keep_checkpoints);
    cfg.resume_from = manager.latest().unwrap();
    cfg.iterations = 8;

    let session = TrainingSession::new(cfg.clone()).unwrap();
    assert_eq!(session.start_iteration(), 5);

    let summary = session.run().await.unwrap();
    assert_eq!(summary.iterations, 3);

    let kept: Vec<u64> = manager.list().unwrap().into_iter().map(|(i, _)| i).collect();
    assert_eq!(kept, vec![4, 6]);
}

#[test]
fn checkpoint_of_another_architecture_is_rejected() {
    let root = temp_dir("session-mismatch");
    let mut cfg = small_config(&root);
    fs::create_dir_all(&cfg.data_dir).unwrap();
    write_images(&cfg.data_dir, 12);

    let manager = CheckpointManager::new(&cfg.checkpoint_dir, cfg.keep_checkpoints);
    let path = manager
        .save(&trainer::checkpoint::Checkpoint {
            iteration: 0,
            generator: vec![0.; 3],
            discriminator: vec![0.; 3],
        })
        .unwrap();
    cfg.resume_from = Some(path);

    assert!(TrainingSession::new(cfg).is_err());
}

#[test]
fn validation_split_must_leave_training_images() {
    let root = temp_dir("session-split");
    let mut cfg = small_config(&root);
    cfg.validation_size = 12;

    let pixels = vec![0.; 12 * SIDE * SIDE];
    let images = ImageDataset::new(pixels, SIDE, SIDE).unwrap();
    assert!(TrainingSession::with_dataset(cfg, images).is_err());
}

#[test]
fn missing_data_is_an_error() {
    let root = temp_dir("session-missing");
    assert!(TrainingSession::new(small_config(&root)).is_err());
}
