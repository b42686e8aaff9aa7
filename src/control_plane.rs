//! Control-Plane State — spec.md §4.5. Three sentinel files under a
//! runtime directory encode operator intent; presence is the signal,
//! contents are irrelevant. Grounded in the original's `drain`/
//! `resume`/`kill` methods (`os.open(path, O_CREAT|O_EXCL)`).

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

const DRAIN_FILE: &str = "drain";
const DRAIN_STOP_FILE: &str = "drain-stop";
const FORCE_STOP_FILE: &str = "force-stop";

/// Snapshot of the three sentinel flags as read on a given tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlFlags {
    pub drain: bool,
    pub drain_stop: bool,
    pub force_stop: bool,
}

/// Abstraction spec.md §9 asks for: "abstract them behind a
/// `ControlPlane` capability (presence checks + unlink)". A future
/// implementation could back this with a local socket without
/// changing any caller.
pub trait ControlPlane: Send + Sync {
    fn read_flags(&self) -> io::Result<ControlFlags>;
    fn clear_force_stop(&self) -> io::Result<()>;
    fn clear_drain_stop(&self) -> io::Result<()>;
}

/// Sentinel-file backed implementation. Every sentinel lives directly
/// under `runtime_dir`; creating/removing them is the operator's job
/// (e.g. `touch runtime_dir/drain`), this type only reads and clears.
pub struct FsControlPlane {
    runtime_dir: PathBuf,
}

impl FsControlPlane {
    /// Ensures `runtime_dir` exists and is a directory. Failure here is
    /// fatal at init per spec.md §6 ("unreadable runtime directory").
    pub fn new(runtime_dir: impl Into<PathBuf>) -> io::Result<Self> {
        let runtime_dir = runtime_dir.into();
        fs::create_dir_all(&runtime_dir)?;
        Ok(Self { runtime_dir })
    }

    fn path(&self, name: &str) -> PathBuf {
        self.runtime_dir.join(name)
    }

    fn remove_if_present(path: &Path) -> io::Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl ControlPlane for FsControlPlane {
    fn read_flags(&self) -> io::Result<ControlFlags> {
        Ok(ControlFlags {
            drain: self.path(DRAIN_FILE).exists(),
            drain_stop: self.path(DRAIN_STOP_FILE).exists(),
            force_stop: self.path(FORCE_STOP_FILE).exists(),
        })
    }

    fn clear_force_stop(&self) -> io::Result<()> {
        Self::remove_if_present(&self.path(FORCE_STOP_FILE))
    }

    fn clear_drain_stop(&self) -> io::Result<()> {
        Self::remove_if_present(&self.path(DRAIN_STOP_FILE))
    }
}

/// Creates a zero-length sentinel atomically, failing if it already
/// exists. Exposed for tests and for an operator-facing CLI built atop
/// this module; the daemon itself never creates sentinels, only reads
/// and clears them.
pub fn touch_exclusive(path: &Path) -> io::Result<()> {
    OpenOptions::new().write(true).create_new(true).open(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("plancton-cp-test-{name}-{}", std::process::id()))
    }

    #[test]
    fn reads_no_flags_on_empty_dir() {
        let dir = temp_dir("empty");
        let cp = FsControlPlane::new(&dir).unwrap();
        let flags = cp.read_flags().unwrap();
        assert_eq!(flags, ControlFlags::default());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn reads_present_sentinels() {
        let dir = temp_dir("present");
        let cp = FsControlPlane::new(&dir).unwrap();
        touch_exclusive(&dir.join(DRAIN_FILE)).unwrap();
        touch_exclusive(&dir.join(FORCE_STOP_FILE)).unwrap();
        let flags = cp.read_flags().unwrap();
        assert!(flags.drain);
        assert!(flags.force_stop);
        assert!(!flags.drain_stop);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn clear_force_stop_is_idempotent() {
        let dir = temp_dir("clear");
        let cp = FsControlPlane::new(&dir).unwrap();
        cp.clear_force_stop().unwrap();
        touch_exclusive(&dir.join(FORCE_STOP_FILE)).unwrap();
        cp.clear_force_stop().unwrap();
        assert!(!cp.read_flags().unwrap().force_stop);
        cp.clear_force_stop().unwrap();
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn touch_exclusive_rejects_duplicate() {
        let dir = temp_dir("dup");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(DRAIN_FILE);
        touch_exclusive(&path).unwrap();
        assert!(touch_exclusive(&path).is_err());
        fs::remove_dir_all(&dir).ok();
    }
}
