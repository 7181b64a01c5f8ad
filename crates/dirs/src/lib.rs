use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DirError {
    #[error("Directory not found: {0}")]
    DirNotFound(String),
    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type DirResult<T> = Result<T, DirError>;

/// Application name used to namespace directories.
pub static APP_NAME: &str = "repo-sync";

/// Subdirectory of the cache dir holding one working copy per remote.
pub static CHECKOUTS: &str = "checkouts";

const XDG_KEY: &str = "XDG_CACHE_HOME";
const REL_PATH: &str = ".cache";
const HINT: &str = "~/.cache/repo-sync";

/// Resolve the cache directory from XDG or fallback environment hints.
pub fn cache_dir() -> DirResult<PathBuf> {
    let home = env::home_dir()
        .or_else(|| env::var_os("HOME").map(PathBuf::from))
        .or_else(|| env::var_os("USERPROFILE").map(PathBuf::from));
    resolve_cache_dir(env::var_os(XDG_KEY), home)
}

fn resolve_cache_dir(xdg: Option<OsString>, home: Option<PathBuf>) -> DirResult<PathBuf> {
    if let Some(dir) = xdg.filter(|d| !d.is_empty()) {
        Ok(PathBuf::from(dir).join(APP_NAME))
    } else if let Some(home) = home {
        Ok(home.join(REL_PATH).join(APP_NAME))
    } else {
        Err(DirError::DirNotFound(HINT.to_string()))
    }
}

/// Default destination for the working copy of a remote repository.
///
/// The directory itself is not created: a sync wipes and recreates it anyway.
/// Only its parent is ensured to exist.
pub fn checkout_dir(repo_name: &str) -> DirResult<PathBuf> {
    let parent = cache_dir()?.join(CHECKOUTS);
    std::fs::create_dir_all(&parent)?;
    Ok(parent.join(repo_name))
}
