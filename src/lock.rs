//! Process lock so only one driver talks to the keyboard at a time

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, Write};
use std::path::{Path, PathBuf};

use directories::ProjectDirs;

/// Held lock file, containing our pid. Released and removed on drop.
pub struct Lock {
    _file: File,
    path: PathBuf,
}

impl Lock {
    /// Take the driver lock in the config directory.
    pub fn acquire() -> io::Result<Self> {
        let path = ProjectDirs::from("", "", "vulcan-rgb")
            .map(|dirs| dirs.config_dir().join("vulcan-rgb.lock"))
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    "no home directory for the lock file",
                )
            })?;
        Self::acquire_at(&path)
    }

    /// Take an exclusive lock on `path` without blocking. When another process
    /// holds it, the error names that process's pid if it wrote one.
    pub fn acquire_at(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Not truncated until locked, the holder's pid has to survive a failed attempt
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if file.try_lock().is_err() {
            let mut holder = String::new();
            let _ = file.read_to_string(&mut holder);
            let msg = match holder.trim() {
                "" => "vulcan-rgb is already running".to_string(),
                pid => format!("vulcan-rgb is already running as pid {pid}"),
            };
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, msg));
        }

        file.set_len(0)?;
        file.rewind()?;
        writeln!(file, "{}", std::process::id())?;

        Ok(Self {
            _file: file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
