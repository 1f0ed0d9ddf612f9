//! Open-handle probe for scratch files.
//!
//! Deleting a file that another process still holds open succeeds on unix but
//! leaves the data alive, and fails outright elsewhere. The probe lets the
//! release loop wait for holders to go away instead.

use std::path::{Path, PathBuf};

use quire_worker::TaskClass;

/// Process ids holding `path` open, as far as this process can see.
#[cfg(target_os = "linux")]
pub fn holders(path: &Path) -> Vec<i32> {
	use procfs::process::{FDTarget, all_processes};

	let Ok(processes) = all_processes() else {
		return Vec::new();
	};
	let mut pids = Vec::new();
	for process in processes.flatten() {
		// Other users' descriptors are unreadable; skip them.
		let Ok(fds) = process.fd() else {
			continue;
		};
		if fds.flatten().any(|fd| matches!(&fd.target, FDTarget::Path(target) if target == path)) {
			pids.push(process.pid);
		}
	}
	pids
}

#[cfg(not(target_os = "linux"))]
pub fn holders(_path: &Path) -> Vec<i32> {
	Vec::new()
}

/// Runs [`holders`] on the blocking pool.
pub async fn is_held_open(path: PathBuf) -> bool {
	quire_worker::spawn_blocking(TaskClass::IoBlocking, move || !holders(&path).is_empty())
		.await
		.unwrap_or(false)
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
	use super::*;

	#[test]
	fn sees_own_open_handle() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("held.py");
		std::fs::write(&path, "x = 1\n").unwrap();
		let path = path.canonicalize().unwrap();

		assert!(holders(&path).is_empty());
		let file = std::fs::File::open(&path).unwrap();
		assert!(holders(&path).contains(&(std::process::id() as i32)));
		drop(file);
		assert!(holders(&path).is_empty());
	}
}
