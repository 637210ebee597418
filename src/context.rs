// File: ./src/context.rs
//! Where prayerbell keeps its files.
//!
//! Everything lives in one of two areas: `config` (settings the user may edit
//! or that must survive reinstalls, such as `config.toml` and the reminder
//! policy) and `data` (the wake index and the log). `StandardContext` maps the
//! areas to the platform directories or to `<root>/config` and `<root>/data`
//! with `--root`. `TestContext` uses a throwaway directory.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Area {
    Config,
    Data,
}

impl Area {
    fn subdir(self) -> &'static str {
        match self {
            Area::Config => "config",
            Area::Data => "data",
        }
    }
}

/// Files the engine reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoredFile {
    Config,
    Policy,
    WakeIndex,
    Log,
}

impl StoredFile {
    pub fn file_name(self) -> &'static str {
        match self {
            StoredFile::Config => "config.toml",
            StoredFile::Policy => "reminders.json",
            StoredFile::WakeIndex => "wake_index.json",
            StoredFile::Log => "prayerbell.log",
        }
    }

    pub fn area(self) -> Area {
        match self {
            StoredFile::Config | StoredFile::Policy => Area::Config,
            StoredFile::WakeIndex | StoredFile::Log => Area::Data,
        }
    }
}

pub trait AppContext: Send + Sync + std::fmt::Debug {
    /// Directory for `area`, created if missing.
    fn area_dir(&self, area: Area) -> Result<PathBuf>;

    fn path_of(&self, file: StoredFile) -> Result<PathBuf> {
        Ok(self.area_dir(file.area())?.join(file.file_name()))
    }

    fn get_data_dir(&self) -> Result<PathBuf> {
        self.area_dir(Area::Data)
    }

    fn get_config_file_path(&self) -> Result<PathBuf> {
        self.path_of(StoredFile::Config)
    }

    fn get_policy_path(&self) -> Result<PathBuf> {
        self.path_of(StoredFile::Policy)
    }

    // The wake index and the log are optional extras; without a data
    // directory the engine runs without them.
    fn get_wake_index_path(&self) -> Option<PathBuf> {
        self.path_of(StoredFile::WakeIndex).ok()
    }

    fn get_log_path(&self) -> Option<PathBuf> {
        self.path_of(StoredFile::Log).ok()
    }
}

fn make_dir(path: PathBuf) -> Result<PathBuf> {
    std::fs::create_dir_all(&path)
        .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    Ok(path)
}

fn under_root(root: &Path, area: Area) -> Result<PathBuf> {
    make_dir(root.join(area.subdir()))
}

#[derive(Clone, Debug)]
pub struct StandardContext {
    root: Option<PathBuf>,
}

impl StandardContext {
    /// `root` replaces the platform directories when given.
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }
}

impl AppContext for StandardContext {
    fn area_dir(&self, area: Area) -> Result<PathBuf> {
        if let Some(root) = &self.root {
            return under_root(root, area);
        }
        let dirs = ProjectDirs::from("org", "prayerbell", "prayerbell")
            .context("No home directory")?;
        make_dir(match area {
            Area::Config => dirs.config_dir().to_path_buf(),
            Area::Data => dirs.data_dir().to_path_buf(),
        })
    }
}

/// Unique temporary root, removed on drop. Not `Clone`; share it via `Arc`.
#[derive(Debug)]
pub struct TestContext {
    pub root: PathBuf,
}

impl TestContext {
    pub fn new() -> Self {
        let root = std::env::temp_dir().join(format!("prayerbell_test_{}", uuid::Uuid::new_v4()));
        Self { root }
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl AppContext for TestContext {
    fn area_dir(&self, area: Area) -> Result<PathBuf> {
        under_root(&self.root, area)
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

pub type SharedContext = std::sync::Arc<dyn AppContext>;
