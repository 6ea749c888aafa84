#![cfg(test)]

use ndarray::{ArrayD, Ix2, IxDyn, Zip, array};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    arch::{
        Network, Sequential,
        layers::{Dense, Layer},
        loss::{LossFn, SigmoidCrossEntropy},
    },
    initialization::Init,
    optimization::Adam,
};

fn weighted_sum(layer: &mut Layer, params: &[f32], x: &ArrayD<f32>, r: &ArrayD<f32>) -> f32 {
    let y = layer.forward(params, x.clone()).unwrap();
    Zip::from(&y).and(r).fold(0f32, |acc, &y, &r| acc + y * r)
}

fn assert_close(what: &str, i: usize, analytic: f32, numeric: f32) {
    let tol = 2e-2 * (1. + analytic.abs().max(numeric.abs()));
    assert!(
        (analytic - numeric).abs() <= tol,
        "{what}[{i}]: backprop gave {analytic}, finite differences gave {numeric}"
    );
}

/// Compares the gradients computed by `layer.backward` against central finite differences of
/// the scalar `sum(layer(x) * r)` for random `x`, `r` and parameters.
pub(crate) fn check_gradients(mut layer: Layer, input_shape: &[usize]) {
    const EPS: f32 = 1e-2;

    let mut rng = StdRng::seed_from_u64(7);
    let mut params: Vec<f32> = (0..layer.size())
        .map(|_| rng.random_range(-1.0..1.0))
        .collect();
    let mut x = ArrayD::from_shape_fn(IxDyn(input_shape), |_| rng.random_range(-1.0..1.0));

    let y = layer.forward(&params, x.clone()).unwrap();
    let r = ArrayD::from_shape_fn(y.raw_dim(), |_| rng.random_range(-1.0..1.0));

    let mut grad = vec![0.; layer.size()];
    let dx = layer.backward(&params, &mut grad, r.clone()).unwrap();
    assert_eq!(dx.shape(), x.shape());

    for i in 0..params.len() {
        let original = params[i];
        params[i] = original + EPS;
        let plus = weighted_sum(&mut layer, &params, &x, &r);
        params[i] = original - EPS;
        let minus = weighted_sum(&mut layer, &params, &x, &r);
        params[i] = original;

        assert_close("param", i, grad[i], (plus - minus) / (2. * EPS));
    }

    let dx: Vec<f32> = dx.iter().copied().collect();
    for (i, &analytic) in dx.iter().enumerate() {
        let original = x.as_slice().unwrap()[i];
        x.as_slice_mut().unwrap()[i] = original + EPS;
        let plus = weighted_sum(&mut layer, &params, &x, &r);
        x.as_slice_mut().unwrap()[i] = original - EPS;
        let minus = weighted_sum(&mut layer, &params, &x, &r);
        x.as_slice_mut().unwrap()[i] = original;

        assert_close("input", i, analytic, (plus - minus) / (2. * EPS));
    }
}

#[test]
fn test_ml_or2_gate_convergence() {
    let wide = Init::Normal {
        mean: 0.,
        std_dev: 0.5,
    };
    let model = Sequential::new([
        Dense::new((2, 4)).weights(wide).into(),
        Layer::sigmoid(),
        Dense::new((4, 1)).weights(wide).into(),
    ]);
    let mut net = Network::init(model, StdRng::seed_from_u64(3)).unwrap();
    let mut optimizer = Adam::with_learning_rate(net.size(), 0.05);

    let x = array![[0., 0.], [0., 1.], [1., 0.], [1., 1.]].into_dyn();
    let y = array![[0.], [1.], [1.], [1.]];
    let loss_fn = SigmoidCrossEntropy;

    let mut loss = f32::INFINITY;
    for _ in 0..1_000 {
        net.zero_grad();
        let logits = net
            .forward(x.clone())
            .unwrap()
            .into_dimensionality::<Ix2>()
            .unwrap();
        loss = loss_fn.loss(logits.view(), y.view());
        let d = loss_fn.loss_prime(logits.view(), y.view());
        net.backward(d.into_dyn()).unwrap();
        net.optimize(&mut optimizer).unwrap();
    }

    assert!(loss < 0.1, "the network didn't learn the OR gate, loss {loss}");
}
