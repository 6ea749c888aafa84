use std::{num::NonZeroUsize, time::Instant};

use log::{debug, info, warn};
use rand::{Rng, SeedableRng, rngs::StdRng};
use tokio::task;

use crate::{
    balance::BalanceController,
    checkpoint::{Checkpoint, CheckpointManager},
    config::TrainingConfig,
    data::{BatchSource, DataLoader, ImageDataset, mnist},
    error::{ConfigErr, Result, TrainErr},
    gan::{Gan, architecture::IMAGE_SIDE},
    metrics::{MetricsSink, Report, Summary},
};

/// Generated images classified every `sample_every` iterations.
const SAMPLE_IMAGES: usize = 3;

/// Generated and real images classified once training is done.
const FINAL_IMAGES: usize = 10;

/// The state the compute closures need, moved into the blocking pool and back.
struct Engine {
    gan: Gan,
    controller: BalanceController,
}

/// Runs `f` on the blocking pool, handing the engine back once it's done.
async fn compute<T, F>(mut engine: Engine, f: F) -> Result<(Engine, T)>
where
    T: Send + 'static,
    F: FnOnce(&mut Engine) -> Result<T> + Send + 'static,
{
    let (engine, out) = task::spawn_blocking(move || {
        let out = f(&mut engine);
        (engine, out)
    })
    .await
    .map_err(|e| TrainErr::Join(e.to_string()))?;

    Ok((engine, out?))
}

/// A full training run: data, networks, balance controller, and the periodic reports,
/// samples and checkpoints.
pub struct TrainingSession {
    cfg: TrainingConfig,
    engine: Engine,
    loader: DataLoader,
    validation: DataLoader,
    checkpoints: CheckpointManager,
    metrics: MetricsSink,
    start: u64,
}

impl TrainingSession {
    /// Creates a new `TrainingSession`, reading the images from the configured data directory.
    ///
    /// # Errors
    /// If the configuration is invalid, the data can't be loaded or the checkpoint to resume
    /// from is unusable.
    pub fn new(cfg: TrainingConfig) -> Result<Self> {
        cfg.validate()?;
        let images = mnist::load_training_set(&cfg.data_dir)?;
        Self::with_dataset(cfg, images)
    }

    /// Creates a new `TrainingSession` over already loaded images.
    ///
    /// # Arguments
    /// * `cfg` - The configuration of the run.
    /// * `images` - The whole training set, the validation images are split off its front.
    pub fn with_dataset(cfg: TrainingConfig, images: ImageDataset) -> Result<Self> {
        cfg.validate()?;

        if (images.rows(), images.cols()) != (IMAGE_SIDE, IMAGE_SIDE) {
            return Err(TrainErr::MalformedData {
                path: cfg.data_dir.clone(),
                reason: format!(
                    "expected {IMAGE_SIDE}x{IMAGE_SIDE} images, got {}x{}",
                    images.rows(),
                    images.cols()
                ),
            });
        }

        if cfg.validation_size == 0 || cfg.validation_size >= images.len() {
            return Err(ConfigErr::Invalid {
                field: "validation_size",
                reason: format!(
                    "must leave images on both sides of the split, the dataset has {}",
                    images.len()
                ),
            }
            .into());
        }

        let mut rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let (train, validation) = images.split_validation(cfg.validation_size);
        info!(
            "{} training images, {} validation images",
            train.len(),
            validation.len()
        );

        let loader = DataLoader::new(train, cfg.batch_size, StdRng::seed_from_u64(rng.random()));
        let validation = DataLoader::new(
            validation,
            cfg.batch_size,
            StdRng::seed_from_u64(rng.random()),
        );

        let mut gan = Gan::new(
            &cfg.architecture,
            &cfg.optimizer,
            cfg.real_label,
            StdRng::seed_from_u64(rng.random()),
        )?;
        info!(
            "generator has {} parameters, discriminator has {}",
            gan.generator().size(),
            gan.discriminator().size()
        );

        let mut start = 0;
        if let Some(path) = &cfg.resume_from {
            let checkpoint = CheckpointManager::load(path)?;
            gan.load_params(checkpoint.generator, checkpoint.discriminator)
                .map_err(|e| TrainErr::Checkpoint {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;

            start = checkpoint.iteration + 1;
            info!("resuming from {} at iteration {start}", path.display());
        }

        let engine = Engine {
            gan,
            controller: BalanceController::new(cfg.thresholds)?,
        };

        Ok(Self {
            checkpoints: CheckpointManager::new(&cfg.checkpoint_dir, cfg.keep_checkpoints),
            metrics: MetricsSink::open(&cfg.metrics_path)?,
            engine,
            loader,
            validation,
            start,
            cfg,
        })
    }

    /// The first iteration this session will run.
    pub fn start_iteration(&self) -> u64 {
        self.start
    }

    /// Trains until the configured amount of iterations is reached.
    ///
    /// Must be called within a tokio runtime; the compute runs on its blocking pool.
    pub async fn run(self) -> Result<Summary> {
        let Self {
            cfg,
            mut engine,
            loader,
            mut validation,
            checkpoints,
            mut metrics,
            start,
        } = self;

        let began = Instant::now();
        let mut summary = Summary::default();
        let mut batches = BatchSource::new(loader, cfg.prefetch);
        let every = |i: u64, n: NonZeroUsize| i % n.get() as u64 == 0;

        if start >= cfg.iterations as u64 {
            warn!(
                "starting at iteration {start}, past the {} configured ones, nothing to train",
                cfg.iterations
            );
        } else {
            info!("training from iteration {start} up to {}", cfg.iterations);
        }

        for i in start..cfg.iterations as u64 {
            let batch = batches.next_batch().await?;
            let (back, iteration) = compute(engine, move |e| {
                Ok(e.controller.iterate(&mut e.gan, &batch)?)
            })
            .await?;
            engine = back;

            summary.bump_iteration();
            debug!("iteration {i} ran {:?}: {}", iteration.steps, iteration.losses);

            if every(i, cfg.report_every) {
                let batch = validation.next_batch();
                let (back, (losses, probe)) = compute(engine, move |e| {
                    Ok((e.gan.losses(&batch)?, e.gan.probe(&batch)?))
                })
                .await?;
                engine = back;

                let steps = engine.controller.reset_counters();
                summary.add_steps(steps);

                info!(
                    "iteration {i}: train [{}] validation [{losses}] steps d_real {} d_fake {} g {} \
                     mean d(x) {:.4} mean d(g(z)) {:.4}",
                    iteration.losses,
                    steps.real_steps,
                    steps.fake_steps,
                    steps.gen_steps,
                    probe.d_on_real,
                    probe.d_on_generated
                );

                metrics.record(&Report {
                    iteration: i,
                    train: iteration.losses,
                    validation: losses,
                    steps,
                    probe,
                })?;
            }

            if every(i, cfg.sample_every) {
                let (back, logits) = compute(engine, |e| {
                    Ok(e.gan.classify_generated(SAMPLE_IMAGES)?)
                })
                .await?;
                engine = back;

                info!(
                    "iteration {i} after {:.1?}, discriminator on generated images: {logits:?}",
                    began.elapsed()
                );
            }

            if every(i, cfg.checkpoint_every) {
                checkpoints.save(&Checkpoint {
                    iteration: i,
                    generator: engine.gan.generator().params().to_vec(),
                    discriminator: engine.gan.discriminator().params().to_vec(),
                })?;
            }
        }

        summary.add_steps(engine.controller.reset_counters());

        let real = validation.next_batch_of(FINAL_IMAGES);
        let (engine, (generated, real)) = compute(engine, move |e| {
            Ok((e.gan.classify_generated(FINAL_IMAGES)?, e.gan.classify(&real)?))
        })
        .await?;

        info!("discriminator on generated images: {generated:?}");
        info!("discriminator on real images: {real:?}");

        summary.final_losses = engine.controller.losses();
        summary.elapsed = began.elapsed();
        info!(
            "ran {} iterations in {:.1?}: {} discriminator steps on real images, {} on generated \
             images, {} generator steps",
            summary.iterations,
            summary.elapsed,
            summary.steps.real_steps,
            summary.steps.fake_steps,
            summary.steps.gen_steps
        );

        Ok(summary)
    }
}
