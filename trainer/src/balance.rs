//! Adaptive training balance between the generator and the discriminator.
//!
//! Every iteration the controller looks at the losses observed after the last optimizer step
//! and decides which of the three adversarial steps to run, so that neither network gets too
//! far ahead of the other:
//!
//! 1. discriminator on generated images, while `fake_loss` is above its watermark;
//! 2. generator, while `gen_loss` is above its watermark;
//! 3. discriminator on real images, while `real_loss` is above its watermark.
//!
//! The checks are independent and always run in that order. Each step that runs replaces the
//! whole [`LossTriple`], and the checks after it already see the new values.

use std::fmt;

use log::trace;
use serde::{Deserialize, Serialize};

use crate::error::ConfigErr;

/// The three most recently observed losses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LossTriple {
    pub real_loss: f32,
    pub fake_loss: f32,
    pub gen_loss: f32,
}

impl LossTriple {
    /// The losses the controller starts from: both discriminator losses high enough to train the
    /// discriminator first, the generator loss low.
    pub const INITIAL: Self = Self::new(1.0, 1.0, 0.0);

    pub const fn new(real_loss: f32, fake_loss: f32, gen_loss: f32) -> Self {
        Self {
            real_loss,
            fake_loss,
            gen_loss,
        }
    }

    /// Whether the three losses are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.real_loss.is_finite() && self.fake_loss.is_finite() && self.gen_loss.is_finite()
    }

    /// The loss a given step is meant to bring down.
    pub fn of(&self, kind: StepKind) -> f32 {
        match kind {
            StepKind::DiscriminatorOnFake => self.fake_loss,
            StepKind::Generator => self.gen_loss,
            StepKind::DiscriminatorOnReal => self.real_loss,
        }
    }
}

impl Default for LossTriple {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl fmt::Display for LossTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "real {:.4}, fake {:.4}, gen {:.4}",
            self.real_loss, self.fake_loss, self.gen_loss
        )
    }
}

/// How many steps of each kind ran since the last reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCounters {
    pub real_steps: u64,
    pub fake_steps: u64,
    pub gen_steps: u64,
}

impl StepCounters {
    pub fn get(&self, kind: StepKind) -> u64 {
        match kind {
            StepKind::DiscriminatorOnFake => self.fake_steps,
            StepKind::Generator => self.gen_steps,
            StepKind::DiscriminatorOnReal => self.real_steps,
        }
    }

    pub fn total(&self) -> u64 {
        self.real_steps + self.fake_steps + self.gen_steps
    }

    fn bump(&mut self, kind: StepKind) {
        match kind {
            StepKind::DiscriminatorOnFake => self.fake_steps += 1,
            StepKind::Generator => self.gen_steps += 1,
            StepKind::DiscriminatorOnReal => self.real_steps += 1,
        }
    }

    /// Adds the counts of another window to these.
    pub fn absorb(&mut self, other: StepCounters) {
        self.real_steps += other.real_steps;
        self.fake_steps += other.fake_steps;
        self.gen_steps += other.gen_steps;
    }
}

/// One of the three adversarial optimizer steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    DiscriminatorOnFake,
    Generator,
    DiscriminatorOnReal,
}

impl StepKind {
    /// The order in which the steps are considered within an iteration.
    pub const ORDER: [StepKind; 3] = [
        StepKind::DiscriminatorOnFake,
        StepKind::Generator,
        StepKind::DiscriminatorOnReal,
    ];
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepKind::DiscriminatorOnFake => "discriminator on fake",
            StepKind::Generator => "generator",
            StepKind::DiscriminatorOnReal => "discriminator on real",
        };

        f.write_str(s)
    }
}

fn default_fake_watermark() -> f32 {
    Thresholds::DEFAULT.fake_loss_high_watermark
}

fn default_gen_watermark() -> f32 {
    Thresholds::DEFAULT.gen_loss_high_watermark
}

fn default_real_watermark() -> f32 {
    Thresholds::DEFAULT.real_loss_high_watermark
}

/// The loss levels above which each step runs. A loss exactly at its watermark doesn't trigger
/// the step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default = "default_fake_watermark")]
    pub fake_loss_high_watermark: f32,
    #[serde(default = "default_gen_watermark")]
    pub gen_loss_high_watermark: f32,
    #[serde(default = "default_real_watermark")]
    pub real_loss_high_watermark: f32,
}

impl Thresholds {
    pub const DEFAULT: Self = Self {
        fake_loss_high_watermark: 0.6,
        gen_loss_high_watermark: 0.5,
        real_loss_high_watermark: 0.45,
    };

    /// Creates a new set of validated `Thresholds`.
    ///
    /// # Arguments
    /// * `fake` - Watermark of the discriminator loss on generated images.
    /// * `generator` - Watermark of the generator loss.
    /// * `real` - Watermark of the discriminator loss on real images.
    ///
    /// # Errors
    /// `ConfigErr::InvalidWatermark` if any of them is negative or not finite.
    pub fn new(fake: f32, generator: f32, real: f32) -> Result<Self, ConfigErr> {
        let thresholds = Self {
            fake_loss_high_watermark: fake,
            gen_loss_high_watermark: generator,
            real_loss_high_watermark: real,
        };

        thresholds.validate()?;
        Ok(thresholds)
    }

    /// Checks that every watermark is a finite, non negative number.
    pub fn validate(&self) -> Result<(), ConfigErr> {
        let watermarks = [
            ("fake_loss_high_watermark", self.fake_loss_high_watermark),
            ("gen_loss_high_watermark", self.gen_loss_high_watermark),
            ("real_loss_high_watermark", self.real_loss_high_watermark),
        ];

        for (name, value) in watermarks {
            if !value.is_finite() || value < 0. {
                return Err(ConfigErr::InvalidWatermark { name, value });
            }
        }

        Ok(())
    }

    pub fn watermark(&self, kind: StepKind) -> f32 {
        match kind {
            StepKind::DiscriminatorOnFake => self.fake_loss_high_watermark,
            StepKind::Generator => self.gen_loss_high_watermark,
            StepKind::DiscriminatorOnReal => self.real_loss_high_watermark,
        }
    }

    /// Which watermarks `losses` is above.
    pub fn classify(&self, losses: &LossTriple) -> BalanceState {
        let high = |kind| losses.of(kind) > self.watermark(kind);

        BalanceState {
            fake_high: high(StepKind::DiscriminatorOnFake),
            gen_high: high(StepKind::Generator),
            real_high: high(StepKind::DiscriminatorOnReal),
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// The subset of watermark conditions that currently hold. With none of them the training is
/// balanced and an iteration runs no step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BalanceState {
    pub fake_high: bool,
    pub gen_high: bool,
    pub real_high: bool,
}

impl BalanceState {
    pub fn is_balanced(&self) -> bool {
        !(self.fake_high || self.gen_high || self.real_high)
    }
}

/// The three adversarial optimizer steps the controller drives.
///
/// Every step draws what else it needs (e.g. generator noise) on its own, applies exactly one
/// update to the parameters it owns and returns the three losses observed after that update.
pub trait AdversarialSteps {
    /// The batch of real data handed to every step of an iteration.
    type Batch: ?Sized;
    type Error;

    /// One update of the discriminator on the loss of freshly generated images.
    fn step_discriminator_on_fake(&mut self, batch: &Self::Batch)
    -> Result<LossTriple, Self::Error>;

    /// One update of the generator on its loss.
    fn step_generator(&mut self, batch: &Self::Batch) -> Result<LossTriple, Self::Error>;

    /// One update of the discriminator on the loss of `batch`.
    fn step_discriminator_on_real(&mut self, batch: &Self::Batch)
    -> Result<LossTriple, Self::Error>;
}

fn run_step<S>(steps: &mut S, kind: StepKind, batch: &S::Batch) -> Result<LossTriple, S::Error>
where
    S: AdversarialSteps + ?Sized,
{
    match kind {
        StepKind::DiscriminatorOnFake => steps.step_discriminator_on_fake(batch),
        StepKind::Generator => steps.step_generator(batch),
        StepKind::DiscriminatorOnReal => steps.step_discriminator_on_real(batch),
    }
}

/// What a single iteration did.
#[derive(Debug, Clone, PartialEq)]
pub struct Iteration {
    /// The losses after the iteration.
    pub losses: LossTriple,
    /// The counters after the iteration.
    pub counters: StepCounters,
    /// The steps that ran, in order.
    pub steps: Vec<StepKind>,
}

/// Decides, iteration by iteration, which adversarial steps run.
///
/// The controller owns nothing but the last observed losses and the step counters of the
/// current reporting window; the networks stay with the [`AdversarialSteps`] implementation.
#[derive(Debug, Clone)]
pub struct BalanceController {
    thresholds: Thresholds,
    losses: LossTriple,
    counters: StepCounters,
}

impl BalanceController {
    /// Creates a new `BalanceController` starting from [`LossTriple::INITIAL`].
    ///
    /// # Arguments
    /// * `thresholds` - The watermarks for the whole run.
    ///
    /// # Errors
    /// `ConfigErr::InvalidWatermark` if `thresholds` is invalid.
    pub fn new(thresholds: Thresholds) -> Result<Self, ConfigErr> {
        Self::with_losses(thresholds, LossTriple::INITIAL)
    }

    /// Creates a new `BalanceController` starting from the given losses.
    pub fn with_losses(thresholds: Thresholds, losses: LossTriple) -> Result<Self, ConfigErr> {
        thresholds.validate()?;

        Ok(Self {
            thresholds,
            losses,
            counters: StepCounters::default(),
        })
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn losses(&self) -> LossTriple {
        self.losses
    }

    pub fn counters(&self) -> StepCounters {
        self.counters
    }

    /// The watermark conditions holding for the current losses.
    pub fn state(&self) -> BalanceState {
        self.thresholds.classify(&self.losses)
    }

    /// Zeroes the step counters, leaving the losses untouched.
    ///
    /// # Returns
    /// The counters of the window that just ended.
    pub fn reset_counters(&mut self) -> StepCounters {
        std::mem::take(&mut self.counters)
    }

    /// Runs one iteration: every step whose loss is above its watermark, in
    /// [`StepKind::ORDER`], each one deciding on the losses left by the previous.
    ///
    /// # Arguments
    /// * `steps` - The implementation of the adversarial steps.
    /// * `batch` - The real batch of this iteration, shared by every step.
    ///
    /// # Returns
    /// What the iteration did, or the error of the first failing step as is. Steps that ran
    /// before the failure are kept in the losses and the counters.
    pub fn iterate<S>(&mut self, steps: &mut S, batch: &S::Batch) -> Result<Iteration, S::Error>
    where
        S: AdversarialSteps + ?Sized,
    {
        let mut taken = Vec::with_capacity(StepKind::ORDER.len());

        for kind in StepKind::ORDER {
            let loss = self.losses.of(kind);
            let watermark = self.thresholds.watermark(kind);
            if loss <= watermark || loss.is_nan() {
                continue;
            }

            trace!("running the {kind} step, its loss {loss} is above {watermark}");
            self.losses = run_step(steps, kind, batch)?;
            self.counters.bump(kind);
            taken.push(kind);
        }

        Ok(Iteration {
            losses: self.losses,
            counters: self.counters,
            steps: taken,
        })
    }
}
