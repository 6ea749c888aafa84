use std::collections::VecDeque;

use trainer::{
    AdversarialSteps, BalanceController, LossTriple, StepCounters, StepKind, Thresholds,
};

#[derive(Debug, Clone, PartialEq)]
struct StepFailed(&'static str);

/// Replays scripted losses and records the steps called and the batches they got.
#[derive(Default)]
struct Scripted {
    replies: VecDeque<LossTriple>,
    fail_on: Option<StepKind>,
    calls: Vec<(StepKind, u32)>,
}

impl Scripted {
    fn replying(replies: impl IntoIterator<Item = LossTriple>) -> Self {
        Self {
            replies: replies.into_iter().collect(),
            ..Default::default()
        }
    }

    fn reply(&mut self, kind: StepKind, batch: &u32) -> Result<LossTriple, StepFailed> {
        self.calls.push((kind, *batch));
        if self.fail_on == Some(kind) {
            return Err(StepFailed("diverged"));
        }

        Ok(self
            .replies
            .pop_front()
            .expect("a step ran more times than scripted"))
    }

    fn kinds(&self) -> Vec<StepKind> {
        self.calls.iter().map(|(kind, _)| *kind).collect()
    }
}

impl AdversarialSteps for Scripted {
    type Batch = u32;
    type Error = StepFailed;

    fn step_discriminator_on_fake(&mut self, batch: &u32) -> Result<LossTriple, StepFailed> {
        self.reply(StepKind::DiscriminatorOnFake, batch)
    }

    fn step_generator(&mut self, batch: &u32) -> Result<LossTriple, StepFailed> {
        self.reply(StepKind::Generator, batch)
    }

    fn step_discriminator_on_real(&mut self, batch: &u32) -> Result<LossTriple, StepFailed> {
        self.reply(StepKind::DiscriminatorOnReal, batch)
    }
}

fn controller(losses: LossTriple) -> BalanceController {
    BalanceController::with_losses(Thresholds::default(), losses).unwrap()
}

#[test]
fn balanced_losses_run_nothing() {
    let losses = LossTriple::new(0.2, 0.3, 0.1);
    let mut controller = controller(losses);
    let mut steps = Scripted::default();

    let it = controller.iterate(&mut steps, &0).unwrap();

    assert!(it.steps.is_empty());
    assert!(steps.calls.is_empty());
    assert_eq!(it.losses, losses);
    assert_eq!(it.counters, StepCounters::default());
    assert!(controller.state().is_balanced());
}

#[test]
fn only_the_fake_loss_is_high() {
    let mut controller = controller(LossTriple::new(0.1, 0.9, 0.1));
    let mut steps = Scripted::replying([LossTriple::new(0.1, 0.5, 0.1)]);

    let it = controller.iterate(&mut steps, &0).unwrap();

    assert_eq!(it.steps, vec![StepKind::DiscriminatorOnFake]);
    assert_eq!(it.counters.fake_steps, 1);
    assert_eq!(it.counters.total(), 1);
}

#[test]
fn steps_run_in_order_on_the_latest_losses() {
    let mut controller = controller(LossTriple::new(0.9, 0.9, 0.9));
    let mut steps = Scripted::replying([
        LossTriple::new(0.9, 0.7, 0.9),
        LossTriple::new(0.9, 0.7, 0.8),
        LossTriple::new(0.7, 0.7, 0.8),
    ]);

    let it = controller.iterate(&mut steps, &7).unwrap();

    assert_eq!(it.steps, StepKind::ORDER.to_vec());
    assert_eq!(
        steps.calls,
        vec![
            (StepKind::DiscriminatorOnFake, 7),
            (StepKind::Generator, 7),
            (StepKind::DiscriminatorOnReal, 7),
        ]
    );
    assert_eq!(it.losses, LossTriple::new(0.7, 0.7, 0.8));
}

#[test]
fn a_step_can_disable_the_checks_after_it() {
    let mut controller = controller(LossTriple::new(0.9, 0.9, 0.9));
    let mut steps = Scripted::replying([LossTriple::new(0.1, 0.7, 0.2)]);

    let it = controller.iterate(&mut steps, &0).unwrap();

    assert_eq!(it.steps, vec![StepKind::DiscriminatorOnFake]);
    assert_eq!(it.losses, LossTriple::new(0.1, 0.7, 0.2));
}

#[test]
fn losses_equal_to_their_watermarks_run_nothing() {
    let mut controller = controller(LossTriple::new(0.45, 0.6, 0.5));
    let mut steps = Scripted::default();

    let it = controller.iterate(&mut steps, &0).unwrap();

    assert!(it.steps.is_empty());
    assert_eq!(it.counters.total(), 0);
}

#[test]
fn counters_add_up_and_reset_keeps_losses() {
    let mut controller = controller(LossTriple::new(0.9, 0.9, 0.9));
    let high = LossTriple::new(0.9, 0.9, 0.9);
    let mut steps = Scripted::replying([
        high,
        high,
        high,
        LossTriple::new(0.9, 0.1, 0.1),
        LossTriple::new(0.1, 0.1, 0.1),
    ]);

    controller.iterate(&mut steps, &0).unwrap();
    controller.iterate(&mut steps, &1).unwrap();

    let counters = controller.counters();
    assert_eq!(counters.fake_steps, 2);
    assert_eq!(counters.gen_steps, 1);
    assert_eq!(counters.real_steps, 2);
    assert_eq!(counters.total() as usize, steps.calls.len());

    let losses = controller.losses();
    assert_eq!(controller.reset_counters(), counters);
    assert_eq!(controller.counters(), StepCounters::default());
    assert_eq!(controller.losses(), losses);
}

#[test]
fn a_failing_step_aborts_the_iteration() {
    let mut controller = controller(LossTriple::new(0.9, 0.9, 0.9));
    let mut steps = Scripted {
        fail_on: Some(StepKind::Generator),
        ..Scripted::replying([LossTriple::new(0.9, 0.7, 0.9)])
    };

    let err = controller.iterate(&mut steps, &0).unwrap_err();

    assert_eq!(err, StepFailed("diverged"));
    assert_eq!(
        steps.kinds(),
        vec![StepKind::DiscriminatorOnFake, StepKind::Generator]
    );
    assert_eq!(controller.counters().gen_steps, 0);
    assert_eq!(controller.counters().real_steps, 0);
}

#[test]
fn first_iteration_from_the_initial_losses() {
    let mut controller = BalanceController::new(Thresholds::default()).unwrap();
    assert_eq!(controller.losses(), LossTriple::new(1.0, 1.0, 0.0));

    let mut steps = Scripted::replying([
        LossTriple::new(0.5, 0.4, 0.2),
        LossTriple::new(0.3, 0.35, 0.25),
    ]);

    let it = controller.iterate(&mut steps, &0).unwrap();

    assert_eq!(
        steps.kinds(),
        vec![StepKind::DiscriminatorOnFake, StepKind::DiscriminatorOnReal]
    );
    assert_eq!(it.counters.fake_steps, 1);
    assert_eq!(it.counters.real_steps, 1);
    assert_eq!(it.counters.gen_steps, 0);
    assert_eq!(it.losses, LossTriple::new(0.3, 0.35, 0.25));
}

#[test]
fn invalid_thresholds_fail_before_training() {
    assert!(Thresholds::new(0.6, 0.5, -0.45).is_err());

    let mut thresholds = Thresholds::default();
    thresholds.fake_loss_high_watermark = f32::INFINITY;
    assert!(BalanceController::new(thresholds).is_err());
}
