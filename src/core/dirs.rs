use crate::core::error::SyncError;
use std::path::PathBuf;

const APP_DIR: &str = "sf-sync-tracker";

pub fn get_config_directory() -> Result<PathBuf, SyncError> {
    let base = match std::env::consts::OS {
        "linux" | "freebsd" | "netbsd" | "openbsd" => std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .ok()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config"))),
        "macos" => dirs::home_dir().map(|home| home.join("Library/Application Support")),
        _ => dirs::config_dir(),
    };

    base.map(|base| base.join(APP_DIR))
        .ok_or(SyncError::ConfigDirectoryNotFound)
}

pub fn get_cache_directory() -> Result<PathBuf, SyncError> {
    let base = match std::env::consts::OS {
        "linux" | "freebsd" | "netbsd" | "openbsd" => std::env::var("XDG_CACHE_HOME")
            .map(PathBuf::from)
            .ok()
            .or_else(|| dirs::home_dir().map(|home| home.join(".cache"))),
        "macos" => dirs::home_dir().map(|home| home.join("Library/Caches")),
        _ => dirs::cache_dir(),
    };

    base.map(|base| base.join(APP_DIR))
        .ok_or(SyncError::ConfigDirectoryNotFound)
}

/// Nearest ancestor of `start` (inclusive) that contains `sfdx-project.json`
pub fn find_project_root(start: &std::path::Path) -> Result<PathBuf, SyncError> {
    start
        .ancestors()
        .find(|dir| dir.join("sfdx-project.json").is_file())
        .map(|dir| dir.to_path_buf())
        .ok_or(SyncError::NotInProject)
}
