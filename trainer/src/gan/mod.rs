pub mod architecture;

use machine_learning::{
    MlErr, Result,
    arch::{
        Network,
        loss::{LossFn, SigmoidCrossEntropy},
    },
    initialization::TruncatedNormal,
    optimization::Optimizer,
};
use ndarray::{Array2, Array4, ArrayD, Ix2, Ix4};
use rand::{Rng, SeedableRng, distr::Distribution, rngs::StdRng};
use serde::Serialize;

use crate::{
    balance::{AdversarialSteps, LossTriple},
    config::{ArchitectureConfig, OptimizerConfig},
};

/// Target of the discriminator on generated images.
pub const FAKE_LABEL: f32 = 0.;

/// Target the generator wants the discriminator to give its images.
pub const GENERATOR_LABEL: f32 = 1.;

/// Mean raw discriminator output on generated and on real images.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Probe {
    pub d_on_generated: f32,
    pub d_on_real: f32,
}

/// The generator and the discriminator together with the optimizers of the three adversarial
/// steps.
///
/// The generator and the discriminator own disjoint parameter buffers. The two discriminator
/// optimizers are only ever applied to the discriminator and the generator optimizer to the
/// generator, each keeping its own state.
pub struct Gan {
    generator: Network,
    discriminator: Network,
    d_fake_optimizer: Box<dyn Optimizer + Send>,
    d_real_optimizer: Box<dyn Optimizer + Send>,
    g_optimizer: Box<dyn Optimizer + Send>,
    loss_fn: SigmoidCrossEntropy,
    real_label: f32,
    z_dim: usize,
    noise: TruncatedNormal,
    rng: StdRng,
}

impl Gan {
    /// Creates a new `Gan` with freshly initialized networks.
    ///
    /// # Arguments
    /// * `architecture` - The sizes of the networks.
    /// * `optimizer` - The optimizer each step gets an instance of.
    /// * `real_label` - The target of the discriminator on real images.
    /// * `rng` - Seeds the initialization and then draws the generator noise.
    ///
    /// # Returns
    /// A new `Gan` or an error if the networks can't be initialized.
    pub fn new(
        architecture: &ArchitectureConfig,
        optimizer: &OptimizerConfig,
        real_label: f32,
        mut rng: StdRng,
    ) -> Result<Self> {
        let generator = Network::init(
            architecture::generator(architecture.z_dim),
            StdRng::seed_from_u64(rng.random()),
        )?;
        let discriminator = Network::init(
            architecture::discriminator(
                architecture.discriminator_filters,
                architecture.discriminator_hidden,
            ),
            StdRng::seed_from_u64(rng.random()),
        )?;

        Ok(Self {
            d_fake_optimizer: optimizer.build(discriminator.size()),
            d_real_optimizer: optimizer.build(discriminator.size()),
            g_optimizer: optimizer.build(generator.size()),
            generator,
            discriminator,
            loss_fn: SigmoidCrossEntropy,
            real_label,
            z_dim: architecture.z_dim,
            noise: TruncatedNormal::new(0., 1.)?,
            rng,
        })
    }

    pub fn generator(&self) -> &Network {
        &self.generator
    }

    pub fn discriminator(&self) -> &Network {
        &self.discriminator
    }

    /// Replaces the parameters of both networks, e.g. with the ones of a checkpoint.
    pub fn load_params(&mut self, generator: Vec<f32>, discriminator: Vec<f32>) -> Result<()> {
        self.generator.load_params(generator)?;
        self.discriminator.load_params(discriminator)
    }

    /// Draws `n` noise vectors from a truncated standard normal.
    pub fn sample_noise(&mut self, n: usize) -> Array2<f32> {
        let (noise, rng) = (&self.noise, &mut self.rng);
        Array2::from_shape_simple_fn((n, self.z_dim), || noise.sample(rng))
    }

    /// Generates `n` images from fresh noise.
    pub fn generate(&mut self, n: usize) -> Result<Array4<f32>> {
        let z = self.sample_noise(n);
        into_images(self.generator.forward(z.into_dyn())?)
    }

    /// Raw discriminator outputs, one per image.
    pub fn classify(&mut self, images: &Array4<f32>) -> Result<Vec<f32>> {
        let logits = into_logits(self.discriminator.forward(images.clone().into_dyn())?)?;
        Ok(logits.into_iter().collect())
    }

    /// Raw discriminator outputs on `n` freshly generated images.
    pub fn classify_generated(&mut self, n: usize) -> Result<Vec<f32>> {
        let images = self.generate(n)?;
        self.classify(&images)
    }

    /// The three losses on `real` and as many freshly generated images, without training.
    pub fn losses(&mut self, real: &Array4<f32>) -> Result<LossTriple> {
        let z = self.sample_noise(real.dim().0);
        self.evaluate(real, &z)
    }

    /// Mean discriminator output on `real` and on as many generated images.
    pub fn probe(&mut self, real: &Array4<f32>) -> Result<Probe> {
        let generated = self.classify_generated(real.dim().0)?;
        let real = self.classify(real)?;

        Ok(Probe {
            d_on_generated: mean(&generated),
            d_on_real: mean(&real),
        })
    }

    fn evaluate(&mut self, real: &Array4<f32>, z: &Array2<f32>) -> Result<LossTriple> {
        let fake = self.generator.forward(z.clone().into_dyn())?;
        let fake_logits = into_logits(self.discriminator.forward(fake)?)?;
        let real_logits = into_logits(self.discriminator.forward(real.clone().into_dyn())?)?;

        let losses = LossTriple {
            real_loss: self.loss(&real_logits, self.real_label),
            fake_loss: self.loss(&fake_logits, FAKE_LABEL),
            gen_loss: self.loss(&fake_logits, GENERATOR_LABEL),
        };

        for (what, value) in [
            ("discriminator loss on real images", losses.real_loss),
            ("discriminator loss on generated images", losses.fake_loss),
            ("generator loss", losses.gen_loss),
        ] {
            if !value.is_finite() {
                return Err(MlErr::NonFinite { what, value });
            }
        }

        Ok(losses)
    }

    fn loss(&self, logits: &Array2<f32>, label: f32) -> f32 {
        let targets = Array2::from_elem(logits.raw_dim(), label);
        self.loss_fn.loss(logits.view(), targets.view())
    }

    fn loss_prime(&self, logits: &Array2<f32>, label: f32) -> ArrayD<f32> {
        let targets = Array2::from_elem(logits.raw_dim(), label);
        self.loss_fn
            .loss_prime(logits.view(), targets.view())
            .into_dyn()
    }

    /// Backpropagates the loss of the discriminator on `images` against `label`, leaving the
    /// gradient in the discriminator.
    fn discriminator_gradient(&mut self, images: ArrayD<f32>, label: f32) -> Result<()> {
        self.discriminator.zero_grad();
        let logits = into_logits(self.discriminator.forward(images)?)?;
        let d = self.loss_prime(&logits, label);
        self.discriminator.backward(d)?;
        Ok(())
    }
}

impl AdversarialSteps for Gan {
    type Batch = Array4<f32>;
    type Error = MlErr;

    fn step_discriminator_on_fake(&mut self, batch: &Array4<f32>) -> Result<LossTriple> {
        let z = self.sample_noise(batch.dim().0);
        let fake = self.generator.forward(z.clone().into_dyn())?;

        self.discriminator_gradient(fake, FAKE_LABEL)?;
        self.discriminator.optimize(self.d_fake_optimizer.as_mut())?;

        self.evaluate(batch, &z)
    }

    fn step_generator(&mut self, batch: &Array4<f32>) -> Result<LossTriple> {
        let z = self.sample_noise(batch.dim().0);

        self.generator.zero_grad();
        self.discriminator.zero_grad();

        let fake = self.generator.forward(z.clone().into_dyn())?;
        let logits = into_logits(self.discriminator.forward(fake)?)?;
        let d = self.loss_prime(&logits, GENERATOR_LABEL);
        let d_fake = self.discriminator.backward(d)?;
        self.generator.backward(d_fake)?;

        self.generator.optimize(self.g_optimizer.as_mut())?;

        self.evaluate(batch, &z)
    }

    fn step_discriminator_on_real(&mut self, batch: &Array4<f32>) -> Result<LossTriple> {
        let z = self.sample_noise(batch.dim().0);

        self.discriminator_gradient(batch.clone().into_dyn(), self.real_label)?;
        self.discriminator.optimize(self.d_real_optimizer.as_mut())?;

        self.evaluate(batch, &z)
    }
}

fn into_logits(x: ArrayD<f32>) -> Result<Array2<f32>> {
    let got = x.shape().to_vec();
    x.into_dimensionality::<Ix2>().map_err(|_| MlErr::InvalidShape {
        layer: "discriminator output",
        got,
        expected: "(batch, 1)",
    })
}

fn into_images(x: ArrayD<f32>) -> Result<Array4<f32>> {
    let got = x.shape().to_vec();
    x.into_dimensionality::<Ix4>().map_err(|_| MlErr::InvalidShape {
        layer: "generator output",
        got,
        expected: "(batch, 1, height, width)",
    })
}

fn mean(xs: &[f32]) -> f32 {
    if xs.is_empty() {
        return 0.;
    }

    xs.iter().sum::<f32>() / xs.len() as f32
}
