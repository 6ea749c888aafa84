use machine_learning::{
    arch::{
        Sequential,
        layers::{Conv2d, Dense, Layer},
    },
    initialization::Init,
};

/// Side of the square images the networks work on.
pub const IMAGE_SIDE: usize = 28;

const UPSAMPLED_SIDE: usize = 2 * IMAGE_SIDE;

/// The generator: noise of `z_dim` to a `(1, 28, 28)` image with pixels in `(0, 1)`.
///
/// The noise is projected onto a 56x56 map, then two strided convolutions with
/// `z_dim / 2` and `z_dim / 4` filters each halve it and get resized back, and a final 1x1
/// strided convolution brings it down to 28x28.
pub fn generator(z_dim: usize) -> Sequential {
    let biases = Init::truncated(0.02);
    let (first, second) = (z_dim / 2, z_dim / 4);

    Sequential::new([
        Dense::new((z_dim, UPSAMPLED_SIDE * UPSAMPLED_SIDE))
            .biases(biases)
            .into(),
        Layer::reshape(&[1, UPSAMPLED_SIDE, UPSAMPLED_SIDE]),
        Layer::batch_norm(1),
        Layer::relu(),
        Conv2d::new(1, first, 3, 2).biases(biases).into(),
        Layer::batch_norm(first),
        Layer::relu(),
        Layer::resize(UPSAMPLED_SIDE, UPSAMPLED_SIDE),
        Conv2d::new(first, second, 3, 2).biases(biases).into(),
        Layer::batch_norm(second),
        Layer::relu(),
        Layer::resize(UPSAMPLED_SIDE, UPSAMPLED_SIDE),
        Conv2d::new(second, 1, 1, 2).biases(biases).into(),
        Layer::sigmoid(),
    ])
}

/// The discriminator: a `(1, 28, 28)` image to a single logit, positive for "real".
pub fn discriminator(filters: (usize, usize), hidden: usize) -> Sequential {
    let (first, second) = filters;
    let side = IMAGE_SIDE / 4;
    let flat = side * side * second;

    Sequential::new([
        Layer::conv2d(1, first, 5, 1),
        Layer::relu(),
        Layer::avg_pool(2, 2),
        Layer::conv2d(first, second, 5, 1),
        Layer::relu(),
        Layer::avg_pool(2, 2),
        Layer::reshape(&[flat]),
        Layer::dense((flat, hidden)),
        Layer::relu(),
        Layer::dense((hidden, 1)),
    ])
}
