use std::{
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use log::{debug, info};

use crate::error::{Result, TrainErr};

/// Prefix of every checkpoint file, followed by the iteration it was taken at.
pub const FILE_PREFIX: &str = "pretrained_gan.ckpt-";

const MAGIC: &[u8; 4] = b"EZGC";
const VERSION: u32 = 1;
const BYTE_ORDER_PROBE: u32 = 0x0102_0304;
const HEADER_LEN: usize = 4 + 4 + 4 + 8 + 8 + 8;

/// The parameters of both networks at a given iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub iteration: u64,
    pub generator: Vec<f32>,
    pub discriminator: Vec<f32>,
}

impl Checkpoint {
    /// Serializes the checkpoint.
    ///
    /// Layout: magic, version, byte order probe, iteration, generator length,
    /// discriminator length, then the generator and discriminator parameters.
    /// Everything is in native byte order.
    pub fn to_bytes(&self) -> Vec<u8> {
        let params = self.generator.len() + self.discriminator.len();
        let mut buf = Vec::with_capacity(HEADER_LEN + params * size_of::<f32>());

        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&VERSION.to_ne_bytes());
        buf.extend_from_slice(&BYTE_ORDER_PROBE.to_ne_bytes());
        buf.extend_from_slice(&self.iteration.to_ne_bytes());
        buf.extend_from_slice(&(self.generator.len() as u64).to_ne_bytes());
        buf.extend_from_slice(&(self.discriminator.len() as u64).to_ne_bytes());
        buf.extend_from_slice(bytemuck::cast_slice(&self.generator));
        buf.extend_from_slice(bytemuck::cast_slice(&self.discriminator));

        buf
    }

    /// Deserializes a checkpoint, validating its header against its content.
    pub fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, String> {
        if bytes.len() < HEADER_LEN {
            return Err(format!("{} bytes is shorter than the header", bytes.len()));
        }

        let (header, body) = bytes.split_at(HEADER_LEN);
        if &header[..4] != MAGIC {
            return Err("not a checkpoint file".into());
        }

        let version: u32 = bytemuck::pod_read_unaligned(&header[4..8]);
        if version != VERSION {
            return Err(format!("unsupported version {version}"));
        }

        let probe: u32 = bytemuck::pod_read_unaligned(&header[8..12]);
        if probe != BYTE_ORDER_PROBE {
            return Err("written on a machine with a different byte order".into());
        }

        let iteration: u64 = bytemuck::pod_read_unaligned(&header[12..20]);
        let gen_len = bytemuck::pod_read_unaligned::<u64>(&header[20..28]) as usize;
        let disc_len = bytemuck::pod_read_unaligned::<u64>(&header[28..36]) as usize;

        let expected = gen_len
            .checked_add(disc_len)
            .and_then(|n| n.checked_mul(size_of::<f32>()))
            .ok_or("parameter lengths overflow")?;

        if body.len() != expected {
            return Err(format!(
                "header announces {expected} bytes of parameters, got {}",
                body.len()
            ));
        }

        let (generator, discriminator) = body.split_at(gen_len * size_of::<f32>());
        let generator = bytemuck::pod_collect_to_vec(generator);
        let discriminator = bytemuck::pod_collect_to_vec(discriminator);

        Ok(Self {
            iteration,
            generator,
            discriminator,
        })
    }
}

/// Saves checkpoints into a directory, keeping only the most recent ones.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir: PathBuf,
    keep: NonZeroUsize,
}

impl CheckpointManager {
    /// Creates a new `CheckpointManager`.
    ///
    /// # Arguments
    /// * `dir` - The directory the checkpoints are written to, created on the first save.
    /// * `keep` - The amount of checkpoints kept on disk.
    pub fn new<P: Into<PathBuf>>(dir: P, keep: NonZeroUsize) -> Self {
        Self {
            dir: dir.into(),
            keep,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The path of the checkpoint taken at `iteration`.
    pub fn path_for(&self, iteration: u64) -> PathBuf {
        self.dir.join(format!("{FILE_PREFIX}{iteration}"))
    }

    /// Writes `checkpoint` and removes the oldest ones beyond the retention limit.
    ///
    /// # Returns
    /// The path of the written checkpoint.
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;

        let path = self.path_for(checkpoint.iteration);
        let tmp = self
            .dir
            .join(format!("{FILE_PREFIX}{}.tmp", checkpoint.iteration));
        fs::write(&tmp, checkpoint.to_bytes())?;
        fs::rename(&tmp, &path)?;
        info!("saved checkpoint {}", path.display());

        let saved = self.list()?;
        let excess = saved.len().saturating_sub(self.keep.get());
        for (_, old) in &saved[..excess] {
            debug!("removing old checkpoint {}", old.display());
            fs::remove_file(old)?;
        }

        Ok(path)
    }

    /// The checkpoints in the directory, oldest first.
    pub fn list(&self) -> Result<Vec<(u64, PathBuf)>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let iteration = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| name.strip_prefix(FILE_PREFIX))
                .and_then(|suffix| suffix.parse::<u64>().ok());

            if let Some(iteration) = iteration {
                found.push((iteration, path));
            }
        }

        found.sort_unstable_by_key(|(iteration, _)| *iteration);
        Ok(found)
    }

    /// The most recent checkpoint, if any.
    pub fn latest(&self) -> Result<Option<PathBuf>> {
        Ok(self.list()?.pop().map(|(_, path)| path))
    }

    /// Reads a checkpoint.
    ///
    /// # Errors
    /// If the file can't be read or isn't a valid checkpoint.
    pub fn load(path: &Path) -> Result<Checkpoint> {
        let bytes = fs::read(path)?;
        Checkpoint::from_bytes(&bytes).map_err(|reason| TrainErr::Checkpoint {
            path: path.to_path_buf(),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("ezgan-{}-{name}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn checkpoint(iteration: u64) -> Checkpoint {
        Checkpoint {
            iteration,
            generator: vec![1., -2., 3.5],
            discriminator: vec![0.25, iteration as f32],
        }
    }

    #[test]
    fn save_then_load() {
        let manager = CheckpointManager::new(temp_dir("save-load"), NonZeroUsize::MIN);

        let path = manager.save(&checkpoint(7)).unwrap();
        assert!(path.ends_with("pretrained_gan.ckpt-7"));
        assert_eq!(CheckpointManager::load(&path).unwrap(), checkpoint(7));
    }

    #[test]
    fn keeps_only_the_most_recent() {
        let keep = NonZeroUsize::new(2).unwrap();
        let manager = CheckpointManager::new(temp_dir("rotation"), keep);

        for i in [0, 5, 10, 15] {
            manager.save(&checkpoint(i)).unwrap();
        }

        let left: Vec<_> = manager.list().unwrap().into_iter().map(|(i, _)| i).collect();
        assert_eq!(left, vec![10, 15]);
        assert_eq!(manager.latest().unwrap(), Some(manager.path_for(15)));
    }

    #[test]
    fn ordering_is_numeric() {
        let manager = CheckpointManager::new(temp_dir("numeric"), NonZeroUsize::new(5).unwrap());

        for i in [900, 10_000, 5000] {
            manager.save(&checkpoint(i)).unwrap();
        }

        assert_eq!(manager.latest().unwrap(), Some(manager.path_for(10_000)));
    }

    #[test]
    fn missing_directory_has_no_checkpoints() {
        let manager = CheckpointManager::new(temp_dir("missing"), NonZeroUsize::MIN);
        assert!(manager.list().unwrap().is_empty());
        assert_eq!(manager.latest().unwrap(), None);
    }

    #[test]
    fn decodes_from_unaligned_buffers() {
        let bytes = checkpoint(11).to_bytes();
        let mut shifted = vec![0u8];
        shifted.extend_from_slice(&bytes);

        assert_eq!(Checkpoint::from_bytes(&shifted[1..]).unwrap(), checkpoint(11));
    }

    #[test]
    fn corrupted_files_are_rejected() {
        let bytes = checkpoint(3).to_bytes();

        assert!(Checkpoint::from_bytes(&bytes[..10]).is_err());
        assert!(Checkpoint::from_bytes(&bytes[..bytes.len() - 4]).is_err());

        let mut wrong_magic = bytes.clone();
        wrong_magic[0] = b'X';
        assert!(Checkpoint::from_bytes(&wrong_magic).is_err());

        let mut wrong_version = bytes;
        wrong_version[4..8].copy_from_slice(&9u32.to_ne_bytes());
        assert!(Checkpoint::from_bytes(&wrong_version).is_err());
    }
}
