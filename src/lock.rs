//! Single-flight lock.
//!
//! A marker file whose existence means "a run is active". Acquisition uses an
//! atomic create-if-absent, so two processes racing for the lock cannot both
//! win. The file holds the owner's process id, which is advisory only.
//!
//! There is no staleness timeout: a marker left behind by a crashed process
//! stays until an operator clears it (`ecom-pipeline unlock`).

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::LockError;

/// Cross-process mutual exclusion for orchestration runs.
#[derive(Debug, Clone)]
pub struct SingleFlightLock {
    path: PathBuf,
}

impl SingleFlightLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Attempts to take the lock without blocking.
    ///
    /// Returns `Ok(false)` if the lock is already held; the existing holder is
    /// left untouched.
    pub fn try_acquire(&self) -> Result<bool, LockError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!("Lock {} already held", self.path.display());
                return Ok(false);
            }
            Err(source) => {
                return Err(LockError::Create {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if let Err(source) = writeln!(file, "{}", std::process::id()) {
            // The marker exists but is unusable; do not leave it behind
            let _ = fs::remove_file(&self.path);
            return Err(LockError::Create {
                path: self.path.clone(),
                source,
            });
        }

        debug!("Lock {} acquired", self.path.display());
        Ok(true)
    }

    /// Takes the lock and returns a guard that releases it when dropped.
    ///
    /// Returns `Ok(None)` if the lock is already held.
    pub fn acquire_guard(&self) -> Result<Option<LockGuard>, LockError> {
        if self.try_acquire()? {
            Ok(Some(LockGuard {
                lock: self.clone(),
                released: false,
            }))
        } else {
            Ok(None)
        }
    }

    /// Removes the marker. Releasing a lock that is not held is a no-op.
    pub fn release(&self) -> Result<(), LockError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Lock {} released", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(LockError::Remove {
                path: self.path.clone(),
                source,
            }),
        }
    }

    pub fn is_held(&self) -> bool {
        self.path.exists()
    }

    /// Content of the marker (the owning process id), if the lock is held.
    pub fn holder(&self) -> Result<Option<String>, LockError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content.trim().to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LockError::Io(e)),
        }
    }

    /// Removes a marker regardless of who holds it.
    ///
    /// Returns the previous holder, or `None` if no lock was present.
    pub fn force_clear(&self) -> Result<Option<String>, LockError> {
        let holder = self.holder()?;
        if let Some(pid) = &holder {
            warn!(
                "Clearing lock {} held by process {}",
                self.path.display(),
                pid
            );
            self.release()?;
        }
        Ok(holder)
    }
}

/// Holds the lock until dropped or explicitly released.
#[derive(Debug)]
pub struct LockGuard {
    lock: SingleFlightLock,
    released: bool,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        self.lock.path()
    }

    /// Releases the lock now, surfacing any removal error.
    pub fn release(mut self) -> Result<(), LockError> {
        self.released = true;
        self.lock.release()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.lock.release() {
                warn!("Failed to release lock in LockGuard drop: {}", e);
            }
        }
    }
}
