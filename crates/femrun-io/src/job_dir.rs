//! Job directories: exclusive claims, path containment and staged writes.
//!
//! A claim has two layers. Inside one process a registry rejects a second
//! claim of the same path immediately. Across processes the first write
//! creates a `.femrun.lock` marker with `create_new`; a run that finds the
//! marker already present fails with `DirectoryClaimed`. A marker left by a
//! killed process has to be removed by hand.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use log::debug;
use parking_lot::Mutex;

use crate::error::{IoError, Result};

/// Cross-process marker inside a created job directory.
pub const LOCK_FILE: &str = ".femrun.lock";

static CLAIMS: LazyLock<Mutex<HashSet<PathBuf>>> = LazyLock::new(|| Mutex::new(HashSet::new()));

/// One file of a staged write, named relative to the job directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl Artifact {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// A claimed job directory, released on drop. Nothing touches the
/// filesystem until the first write.
#[derive(Debug)]
pub struct JobDirectory {
    root: PathBuf,
    /// Whether this claim created the lock marker
    locked: Mutex<bool>,
}

impl JobDirectory {
    pub fn claim(path: impl AsRef<Path>) -> Result<Self> {
        let root = absolute_normalized(path.as_ref())?;
        let mut claims = CLAIMS.lock();
        if !claims.insert(root.clone()) {
            return Err(IoError::DirectoryClaimed { path: root });
        }
        debug!("claimed job directory {}", root.display());
        Ok(Self {
            root,
            locked: Mutex::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Map a relative name into the directory. Absolute paths and `..`
    /// components are refused.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let outside = || IoError::OutsideJobDirectory {
            path: relative.to_string(),
        };
        let candidate = Path::new(relative);
        if relative.is_empty() {
            return Err(outside());
        }
        for component in candidate.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(outside());
                }
            }
        }
        Ok(self.root.join(candidate))
    }

    /// Create the directory and take the cross-process lock on first use.
    pub fn ensure_created(&self) -> Result<()> {
        let mut locked = self.locked.lock();
        if *locked {
            return Ok(());
        }
        fs::create_dir_all(&self.root)?;
        let marker = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.root.join(LOCK_FILE));
        let mut marker = match marker {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(IoError::DirectoryClaimed {
                    path: self.root.clone(),
                });
            }
            Err(err) => return Err(err.into()),
        };
        writeln!(marker, "{}", std::process::id())?;
        *locked = true;
        debug!("locked job directory {}", self.root.display());
        Ok(())
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.resolve(relative).is_ok_and(|p| p.is_file())
    }

    pub fn read(&self, relative: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.resolve(relative)?)?)
    }

    pub fn read_to_string(&self, relative: &str) -> Result<String> {
        Ok(fs::read_to_string(self.resolve(relative)?)?)
    }

    /// Create (or truncate) a file, for logs written while a program runs.
    pub fn create_file(&self, relative: &str) -> Result<fs::File> {
        let path = self.resolve(relative)?;
        self.ensure_created()?;
        ensure_parent_dir(&path)?;
        Ok(fs::File::create(path)?)
    }

    /// Remove a file if it is there.
    pub fn remove_file(&self, relative: &str) -> Result<()> {
        match fs::remove_file(self.resolve(relative)?) {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }

    /// Names of the regular files directly inside the directory, sorted,
    /// without the lock marker. A directory that was never created lists as
    /// empty.
    pub fn list_files(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type()?.is_file() && name != LOCK_FILE {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Write every artifact or none of them.
    ///
    /// Files go to hidden temporary names first and are renamed into place
    /// once all of them are on disk. A file they replace is moved aside
    /// first. On failure the temporaries and any file already renamed are
    /// removed, the replaced files are put back and `PartialWrite` reports
    /// which of the expected files are left.
    pub fn write_all(&self, artifacts: &[Artifact]) -> Result<Vec<PathBuf>> {
        let expected: Vec<String> = artifacts.iter().map(|a| a.name.clone()).collect();
        let mut targets = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            let target = self.resolve(&artifact.name)?;
            targets.push((sibling(&target, "partial"), target));
        }
        self.ensure_created()?;

        let mut staged = Vec::new();
        let mut displaced = Vec::new();
        let mut committed = Vec::new();
        let outcome = (|| -> std::io::Result<()> {
            for ((temp, _), artifact) in targets.iter().zip(artifacts) {
                ensure_parent_dir(temp)?;
                fs::write(temp, &artifact.bytes)?;
                staged.push(temp.clone());
            }
            for (temp, target) in &targets {
                if target.is_file() {
                    let previous = sibling(target, "previous");
                    fs::rename(target, &previous)?;
                    displaced.push((previous, target.clone()));
                }
                fs::rename(temp, target)?;
                committed.push(target.clone());
            }
            Ok(())
        })();

        match outcome {
            Ok(()) => {
                for (previous, _) in &displaced {
                    let _ = fs::remove_file(previous);
                }
                for (_, target) in &targets {
                    debug!("wrote {}", target.display());
                }
                Ok(targets.into_iter().map(|(_, target)| target).collect())
            }
            Err(err) => {
                for path in staged.iter().chain(&committed) {
                    let _ = fs::remove_file(path);
                }
                for (previous, target) in &displaced {
                    let _ = fs::rename(previous, target);
                }
                let present = expected
                    .iter()
                    .filter(|name| self.exists(name))
                    .cloned()
                    .collect();
                Err(IoError::PartialWrite {
                    expected,
                    present,
                    reason: err.to_string(),
                })
            }
        }
    }
}

impl Drop for JobDirectory {
    fn drop(&mut self) {
        if *self.locked.get_mut() {
            let _ = fs::remove_file(self.root.join(LOCK_FILE));
        }
        CLAIMS.lock().remove(&self.root);
        debug!("released job directory {}", self.root.display());
    }
}

/// Whether some live [`JobDirectory`] holds `path`.
pub fn is_claimed(path: impl AsRef<Path>) -> bool {
    absolute_normalized(path.as_ref()).is_ok_and(|p| CLAIMS.lock().contains(&p))
}

/// Hidden neighbour of `target`: `.<name>.<suffix>`.
fn sibling(target: &Path, suffix: &str) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}.{suffix}"))
}

fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Absolute form of `path` with `.` and `..` folded lexically.
fn absolute_normalized(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    Ok(normalized)
}
