//! Scratch files handed to external tools.
//!
//! A [`ScratchFile`] is written and closed before the tool sees it, and the
//! owner releases it once the tool is gone. Release retries a bounded number
//! of times while another process still holds the file open. Dropping an
//! unreleased scratch file makes one synchronous removal attempt so nothing
//! leaks when a task is torn down mid-flight.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use quire_worker::TaskClass;

use crate::{ProcessError, Result, holders};

/// Retry policy for [`ScratchFile::release`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleasePolicy {
	pub attempts: u32,
	pub delay: Duration,
	/// Check for other open handles before each removal attempt.
	pub probe_open_handles: bool,
}

impl Default for ReleasePolicy {
	fn default() -> Self {
		Self {
			attempts: 3,
			delay: Duration::from_millis(500),
			probe_open_handles: true,
		}
	}
}

/// Result of [`ScratchFile::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
	Removed { attempts: u32 },
	/// Someone else already removed it.
	Missing,
	/// Still present after every attempt.
	Failed { attempts: u32 },
}

/// A file holding source text for one tool invocation.
#[derive(Debug)]
pub struct ScratchFile {
	path: PathBuf,
	owner: String,
	policy: ReleasePolicy,
	released: bool,
}

impl ScratchFile {
	/// Writes `content` to a fresh, uniquely named file in `dir`.
	///
	/// The file is fully written and closed when this returns, and its name
	/// ends with `suffix`.
	pub fn allocate(dir: &Path, content: &str, suffix: &str, owner: impl Into<String>, policy: ReleasePolicy) -> Result<Self> {
		std::fs::create_dir_all(dir)?;
		let mut file = tempfile::Builder::new().prefix("quire-").suffix(suffix).tempfile_in(dir)?;
		file.write_all(content.as_bytes())?;
		file.flush()?;
		let (handle, path) = file.keep().map_err(|err| ProcessError::Io(err.error))?;
		drop(handle);
		let path = path.canonicalize().unwrap_or(path);

		let owner = owner.into();
		tracing::debug!(path = %path.display(), owner = %owner, bytes = content.len(), "scratch.allocate");
		Ok(Self {
			path,
			owner,
			policy,
			released: false,
		})
	}

	/// [`ScratchFile::allocate`] on the blocking pool.
	pub async fn create(dir: PathBuf, content: String, suffix: String, owner: String, policy: ReleasePolicy) -> Result<Self> {
		quire_worker::spawn_blocking(TaskClass::IoBlocking, move || Self::allocate(&dir, &content, &suffix, owner, policy))
			.await
			.map_err(|err| ProcessError::Io(std::io::Error::other(err)))?
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn owner(&self) -> &str {
		&self.owner
	}

	/// Deletes the file, retrying while it is held open or removal fails.
	pub async fn release(mut self) -> ReleaseOutcome {
		self.released = true;
		let attempts = self.policy.attempts.max(1);

		for attempt in 1..=attempts {
			if self.policy.probe_open_handles && holders::is_held_open(self.path.clone()).await {
				tracing::debug!(path = %self.path.display(), attempt, "scratch.release_busy");
			} else {
				match tokio::fs::remove_file(&self.path).await {
					Ok(()) => {
						tracing::debug!(path = %self.path.display(), owner = %self.owner, attempt, "scratch.release");
						return ReleaseOutcome::Removed { attempts: attempt };
					}
					Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
						tracing::debug!(path = %self.path.display(), "scratch.release_missing");
						return ReleaseOutcome::Missing;
					}
					Err(err) => {
						tracing::debug!(path = %self.path.display(), attempt, error = %err, "scratch.release_retry");
					}
				}
			}
			if attempt < attempts {
				tokio::time::sleep(self.policy.delay).await;
			}
		}

		tracing::warn!(path = %self.path.display(), owner = %self.owner, attempts, "scratch.release_failed");
		ReleaseOutcome::Failed { attempts }
	}
}

impl Drop for ScratchFile {
	fn drop(&mut self) {
		if self.released {
			return;
		}
		match std::fs::remove_file(&self.path) {
			Ok(()) => tracing::debug!(path = %self.path.display(), "scratch.drop_remove"),
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
			Err(err) => tracing::warn!(path = %self.path.display(), error = %err, "scratch.drop_remove_failed"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn quick_policy() -> ReleasePolicy {
		ReleasePolicy {
			attempts: 3,
			delay: Duration::from_millis(50),
			probe_open_handles: true,
		}
	}

	#[test]
	fn allocate_writes_closed_file_with_suffix() {
		let dir = tempfile::tempdir().unwrap();
		let scratch = ScratchFile::allocate(dir.path(), "print(1)\n", ".py", "run:1", quick_policy()).unwrap();
		assert!(scratch.path().starts_with(dir.path().canonicalize().unwrap()));
		assert_eq!(scratch.path().extension().and_then(|e| e.to_str()), Some("py"));
		assert_eq!(std::fs::read_to_string(scratch.path()).unwrap(), "print(1)\n");
		assert_eq!(scratch.owner(), "run:1");
	}

	#[test]
	fn allocations_never_collide() {
		let dir = tempfile::tempdir().unwrap();
		let a = ScratchFile::allocate(dir.path(), "a", ".py", "run:1", quick_policy()).unwrap();
		let b = ScratchFile::allocate(dir.path(), "b", ".py", "run:2", quick_policy()).unwrap();
		assert_ne!(a.path(), b.path());
	}

	#[test]
	fn allocate_creates_missing_directory() {
		let dir = tempfile::tempdir().unwrap();
		let nested = dir.path().join("scratch").join("deep");
		let scratch = ScratchFile::allocate(&nested, "", ".py", "lint:1", quick_policy()).unwrap();
		assert!(scratch.path().exists());
	}

	#[tokio::test]
	async fn release_removes_file() {
		let dir = tempfile::tempdir().unwrap();
		let scratch = ScratchFile::create(dir.path().to_path_buf(), "x".into(), ".py".into(), "run:1".into(), quick_policy())
			.await
			.unwrap();
		let path = scratch.path().to_path_buf();
		assert_eq!(scratch.release().await, ReleaseOutcome::Removed { attempts: 1 });
		assert!(!path.exists());
	}

	#[tokio::test]
	async fn release_of_vanished_file_is_missing() {
		let dir = tempfile::tempdir().unwrap();
		let scratch = ScratchFile::allocate(dir.path(), "x", ".py", "run:1", quick_policy()).unwrap();
		std::fs::remove_file(scratch.path()).unwrap();
		assert_eq!(scratch.release().await, ReleaseOutcome::Missing);
	}

	#[cfg(target_os = "linux")]
	#[tokio::test]
	async fn release_waits_for_holder_to_close() {
		let dir = tempfile::tempdir().unwrap();
		let policy = ReleasePolicy {
			delay: Duration::from_millis(200),
			..quick_policy()
		};
		let scratch = ScratchFile::allocate(dir.path(), "x", ".py", "debug:1", policy).unwrap();
		let path = scratch.path().to_path_buf();
		let held = std::fs::File::open(&path).unwrap();

		let closer = tokio::spawn(async move {
			tokio::time::sleep(Duration::from_millis(100)).await;
			drop(held);
		});
		let outcome = scratch.release().await;
		closer.await.unwrap();

		assert!(matches!(outcome, ReleaseOutcome::Removed { attempts } if attempts > 1));
		assert!(!path.exists());
	}

	#[cfg(target_os = "linux")]
	#[tokio::test]
	async fn release_gives_up_while_still_held() {
		let dir = tempfile::tempdir().unwrap();
		let scratch = ScratchFile::allocate(dir.path(), "x", ".py", "debug:1", quick_policy()).unwrap();
		let path = scratch.path().to_path_buf();
		let held = std::fs::File::open(&path).unwrap();

		assert_eq!(scratch.release().await, ReleaseOutcome::Failed { attempts: 3 });
		assert!(path.exists());
		drop(held);
	}

	#[test]
	fn drop_removes_unreleased_file() {
		let dir = tempfile::tempdir().unwrap();
		let scratch = ScratchFile::allocate(dir.path(), "x", ".py", "run:1", quick_policy()).unwrap();
		let path = scratch.path().to_path_buf();
		drop(scratch);
		assert!(!path.exists());
	}
}
