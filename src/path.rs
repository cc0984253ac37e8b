//! Path resolution
//!
//! Turns the names callers pass to `open_file` into concrete paths. The
//! surrounding application normally supplies its own resolver; the search
//! directory resolver here covers standalone use.

use std::path::{Path, PathBuf};

use crate::config::StoreConfig;

/// Resolves container names to paths
pub trait PathResolver: Send + Sync {
    /// Locate an existing file by name; `None` if it cannot be found
    fn find(&self, name: &str) -> Option<PathBuf>;

    /// Directory a new container with a bare filename is created in
    fn default_save_dir(&self) -> &Path;
}

/// Looks a name up as given, then in each search directory
#[derive(Debug, Clone)]
pub struct SearchPathResolver {
    search_dirs: Vec<PathBuf>,
    save_dir: PathBuf,
}

impl SearchPathResolver {
    pub fn new(search_dirs: Vec<PathBuf>, save_dir: impl Into<PathBuf>) -> Self {
        Self {
            search_dirs,
            save_dir: save_dir.into(),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.search_dirs.clone(), config.default_save_dir.clone())
    }
}

impl PathResolver for SearchPathResolver {
    fn find(&self, name: &str) -> Option<PathBuf> {
        let direct = PathBuf::from(name);
        if direct.is_file() {
            return Some(direct);
        }
        if direct.is_absolute() {
            return None;
        }

        self.search_dirs
            .iter()
            .chain(std::iter::once(&self.save_dir))
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
    }

    fn default_save_dir(&self) -> &Path {
        &self.save_dir
    }
}

/// True when `name` has no directory component
pub fn is_bare_filename(name: &str) -> bool {
    let path = Path::new(name);
    path.file_name().is_some() && path.parent().map_or(true, |p| p.as_os_str().is_empty())
}
