use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, PoisonError};

/// Per-path critical sections shared by every apply call on one engine.
///
/// Two calls touching the same file serialize; calls on disjoint files run
/// in parallel. A caller takes all of its paths at once, so there is no
/// lock ordering to get wrong.
#[derive(Debug, Default)]
pub struct PathLocks {
    busy: Mutex<HashSet<PathBuf>>,
    released: Condvar,
}

/// Paths held for the duration of one hunk; released on drop.
#[must_use = "paths are released as soon as the guard is dropped"]
pub struct HeldPaths<'a> {
    locks: &'a PathLocks,
    paths: Vec<PathBuf>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until none of `paths` is held by another caller, then hold them all.
    pub fn acquire(&self, paths: &[&Path]) -> HeldPaths<'_> {
        let mut wanted: Vec<PathBuf> = paths.iter().map(|p| p.to_path_buf()).collect();
        wanted.sort();
        wanted.dedup();

        let mut busy = self.busy.lock().unwrap_or_else(PoisonError::into_inner);
        while wanted.iter().any(|path| busy.contains(path)) {
            busy = self
                .released
                .wait(busy)
                .unwrap_or_else(PoisonError::into_inner);
        }
        busy.extend(wanted.iter().cloned());

        HeldPaths {
            locks: self,
            paths: wanted,
        }
    }

    #[cfg(test)]
    fn held(&self) -> usize {
        self.busy.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Drop for HeldPaths<'_> {
    fn drop(&mut self) {
        let mut busy = self
            .locks
            .busy
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for path in &self.paths {
            busy.remove(path);
        }
        self.locks.released.notify_all();
    }
}
