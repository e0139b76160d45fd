/// Platform cache and config locations for repo-rag
///
/// Unix-like systems honour the XDG base directory variables.
use std::path::PathBuf;

const APP_DIR: &str = "repo-rag";

/// Where one kind of per-user directory lives on each platform
struct DirRule {
    windows_var: &'static str,
    macos_suffix: &'static str,
    xdg_var: &'static str,
    xdg_fallback: &'static str,
}

const CACHE: DirRule = DirRule {
    windows_var: "LOCALAPPDATA",
    macos_suffix: "Library/Caches",
    xdg_var: "XDG_CACHE_HOME",
    xdg_fallback: ".cache",
};

const CONFIG: DirRule = DirRule {
    windows_var: "APPDATA",
    macos_suffix: "Library/Application Support",
    xdg_var: "XDG_CONFIG_HOME",
    xdg_fallback: ".config",
};

fn home_join(suffix: &str) -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(suffix))
}

fn resolve(rule: &DirRule) -> PathBuf {
    let dir = if cfg!(target_os = "windows") {
        std::env::var_os(rule.windows_var).map(PathBuf::from)
    } else if cfg!(target_os = "macos") {
        home_join(rule.macos_suffix)
    } else {
        std::env::var_os(rule.xdg_var)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| home_join(rule.xdg_fallback))
    };
    dir.unwrap_or_else(|| PathBuf::from("."))
}

/// Per-user directories and default file locations
pub struct PlatformPaths;

impl PlatformPaths {
    /// `%LOCALAPPDATA%`, `~/Library/Caches`, or `$XDG_CACHE_HOME` (default `~/.cache`)
    pub fn cache_dir() -> PathBuf {
        resolve(&CACHE)
    }

    /// `%APPDATA%`, `~/Library/Application Support`, or `$XDG_CONFIG_HOME` (default `~/.config`)
    pub fn config_dir() -> PathBuf {
        resolve(&CONFIG)
    }

    pub fn project_cache_dir() -> PathBuf {
        Self::cache_dir().join(APP_DIR)
    }

    pub fn project_config_dir() -> PathBuf {
        Self::config_dir().join(APP_DIR)
    }

    /// `{cache_dir}/repo-rag/hash_cache.json`
    pub fn default_hash_cache_path() -> PathBuf {
        Self::project_cache_dir().join("hash_cache.json")
    }

    /// `{config_dir}/repo-rag/config.toml`
    pub fn default_config_path() -> PathBuf {
        Self::project_config_dir().join("config.toml")
    }
}
