//! Reader for the IDX files MNIST is distributed in.

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::info;

use super::ImageDataset;
use crate::error::{Result, TrainErr};

/// File name of the training images inside the data directory.
pub const TRAIN_IMAGES: &str = "train-images-idx3-ubyte";

const IMAGES_MAGIC: u32 = 0x0000_0803;
const HEADER_LEN: usize = 16;

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Parses an IDX3 image file, scaling every pixel to `[0, 1]`.
///
/// # Errors
/// A description of the problem if the file isn't a well formed IDX3 unsigned byte file.
pub fn parse_images(bytes: &[u8]) -> std::result::Result<ImageDataset, String> {
    if bytes.len() < HEADER_LEN {
        return Err(format!("the header needs {HEADER_LEN} bytes, got {}", bytes.len()));
    }

    let magic = read_u32(bytes, 0);
    if magic != IMAGES_MAGIC {
        return Err(format!(
            "bad magic number {magic:#010x}, expected {IMAGES_MAGIC:#010x}"
        ));
    }

    let count = read_u32(bytes, 4) as usize;
    let rows = read_u32(bytes, 8) as usize;
    let cols = read_u32(bytes, 12) as usize;

    let body = &bytes[HEADER_LEN..];
    let expected = count
        .checked_mul(rows)
        .and_then(|n| n.checked_mul(cols))
        .ok_or_else(|| format!("{count} images of {rows}x{cols} don't fit in memory"))?;
    if body.len() != expected {
        return Err(format!(
            "{count} images of {rows}x{cols} need {expected} bytes, got {}",
            body.len()
        ));
    }

    if count == 0 || rows == 0 || cols == 0 {
        return Err("the file holds no pixels".to_string());
    }

    let pixels = body.iter().map(|&b| f32::from(b) / 255.).collect();
    ImageDataset::new(pixels, rows, cols).map_err(|e| e.to_string())
}

/// Encodes a dataset as an IDX3 image file, rounding every pixel to a byte.
pub fn encode_images(dataset: &ImageDataset) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + dataset.len() * dataset.image_len());

    for word in [
        IMAGES_MAGIC,
        dataset.len() as u32,
        dataset.rows() as u32,
        dataset.cols() as u32,
    ] {
        bytes.extend_from_slice(&word.to_be_bytes());
    }

    for i in 0..dataset.len() {
        bytes.extend(
            dataset
                .image(i)
                .iter()
                .map(|&p| (p.clamp(0., 1.) * 255.).round() as u8),
        );
    }

    bytes
}

/// Loads an IDX3 image file.
pub fn load_images(path: &Path) -> Result<ImageDataset> {
    let bytes = fs::read(path)?;
    parse_images(&bytes).map_err(|reason| TrainErr::MalformedData {
        path: path.to_path_buf(),
        reason,
    })
}

/// Loads the MNIST training images found in `dir`.
///
/// # Errors
/// If the file is missing (with a hint when only the compressed download is there) or malformed.
pub fn load_training_set(dir: &Path) -> Result<ImageDataset> {
    let path = dir.join(TRAIN_IMAGES);

    if !path.exists() {
        let compressed = PathBuf::from(format!("{}.gz", path.display()));
        if compressed.exists() {
            return Err(TrainErr::MalformedData {
                path: compressed,
                reason: "compressed files aren't supported, decompress it first".to_string(),
            });
        }
    }

    let dataset = load_images(&path)?;
    info!(
        "loaded {} images of {}x{} from {}",
        dataset.len(),
        dataset.rows(),
        dataset.cols(),
        path.display()
    );

    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(count: u32, rows: u32, cols: u32) -> Vec<u8> {
        [IMAGES_MAGIC, count, rows, cols]
            .iter()
            .flat_map(|w| w.to_be_bytes())
            .collect()
    }

    #[test]
    fn parses_and_scales_pixels() {
        let mut bytes = header(2, 1, 2);
        bytes.extend([0, 255, 51, 102]);

        let ds = parse_images(&bytes).unwrap();

        assert_eq!(ds.len(), 2);
        assert_eq!((ds.rows(), ds.cols()), (1, 2));
        assert_eq!(ds.image(0), &[0., 1.]);
        assert_eq!(ds.image(1), &[0.2, 0.4]);
    }

    #[test]
    fn encode_then_parse_keeps_the_bytes() {
        let mut bytes = header(3, 2, 2);
        bytes.extend((0..12).map(|i| i * 20));

        let ds = parse_images(&bytes).unwrap();
        assert_eq!(encode_images(&ds), bytes);
    }

    #[test]
    fn rejects_label_files() {
        let mut bytes = header(1, 1, 1);
        bytes[3] = 0x01;
        bytes.push(0);

        let err = parse_images(&bytes).unwrap_err();
        assert!(err.contains("magic"), "{err}");
    }

    #[test]
    fn rejects_truncated_files() {
        let mut bytes = header(2, 2, 2);
        bytes.extend([0; 7]);
        assert!(parse_images(&bytes).is_err());
        assert!(parse_images(&bytes[..10]).is_err());
    }

    #[test]
    fn rejects_oversized_headers() {
        let mut bytes = header(u32::MAX, u32::MAX, u32::MAX);
        bytes.extend([0; 16]);

        assert!(parse_images(&bytes).is_err());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = std::env::temp_dir().join("ezgan-mnist-missing");
        assert!(matches!(load_training_set(&dir), Err(TrainErr::Io(_))));
    }
}
