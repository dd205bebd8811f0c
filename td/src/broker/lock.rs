//! Filesystem advisory lock enforcing producer singularity: a second
//! producer that sees the lock held skips its pass rather than blocking.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, warn};

use super::BrokerError;

/// Holds an exclusive, non-blocking `flock` on `{base}/producer.lock` for
/// its lifetime. Dropping it releases the lock.
pub struct ProducerLock {
    _file: File,
    path: PathBuf,
}

impl ProducerLock {
    /// Try to acquire the lock without blocking. `Ok(None)` means another
    /// producer already holds it.
    pub fn try_acquire(base_dir: impl AsRef<Path>) -> Result<Option<Self>, BrokerError> {
        let path = base_dir.as_ref().join("producer.lock");
        let file = OpenOptions::new().create(true).write(true).open(&path).map_err(|e| BrokerError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!(path = %path.display(), "ProducerLock::try_acquire: acquired");
                Ok(Some(Self { _file: file, path }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                warn!(path = %path.display(), "ProducerLock::try_acquire: held by another producer, skipping pass");
                Ok(None)
            }
            Err(e) => Err(BrokerError::Io {
                path: path.display().to_string(),
                source: e,
            }),
        }
    }
}

impl Drop for ProducerLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self._file);
        debug!(path = %self.path.display(), "ProducerLock::drop: released");
    }
}
