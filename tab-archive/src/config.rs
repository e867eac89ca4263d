// Environment configuration for the tab archive
// Resolves the archive directory and the derived database/asset paths

use std::path::{Path, PathBuf};

/// Name of the live metadata database inside the data directory
pub const DB_FILE_NAME: &str = "archive.sqlite";

/// Bounds (width, height) used when rasterizing a tab
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSizes {
    pub full: (u32, u32),
    pub thumb: (u32, u32),
}

impl Default for CaptureSizes {
    fn default() -> Self {
        Self {
            full: (500, 500),
            thumb: (125, 125),
        }
    }
}

/// Configuration for archive paths and settings
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory holding the database, assets and lock file
    pub data_dir: PathBuf,
    /// Screenshot bounds for full images and thumbnails
    pub capture: CaptureSizes,
    /// Verbose diagnostics (TAB_ARCHIVE_DEBUG)
    pub debug: bool,
}

impl Config {
    /// Create configuration rooted at an explicit directory
    pub fn at(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            capture: CaptureSizes::default(),
            debug: false,
        }
    }

    /// Create configuration using default paths
    pub fn default_paths() -> Self {
        Self::at(Self::default_data_dir())
    }

    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        // TAB_ARCHIVE_DIR overrides the whole data directory
        let mut config = match std::env::var("TAB_ARCHIVE_DIR") {
            Ok(dir) if !dir.trim().is_empty() => Self::at(PathBuf::from(dir.trim())),
            _ => Self::default_paths(),
        };

        config.debug = std::env::var("TAB_ARCHIVE_DEBUG")
            .map(|v| !v.is_empty() && v != "0" && !v.eq_ignore_ascii_case("false"))
            .unwrap_or(false);

        config
    }

    /// Get the default data directory
    fn default_data_dir() -> PathBuf {
        // All platforms: ~/.tab-archive/ (or <tmp>/tab-archive if home unavailable)
        dirs::home_dir()
            .map(|h| h.join(".tab-archive"))
            .unwrap_or_else(|| std::env::temp_dir().join("tab-archive"))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Get the metadata database path
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }

    /// Get the directory holding image assets
    pub fn assets_dir(&self) -> PathBuf {
        self.data_dir.join("assets")
    }

    /// Get the single-writer lock file path
    pub fn lock_path(&self) -> PathBuf {
        self.data_dir.join(".lock")
    }

    /// Ensure the data and asset directories exist with 0700 permissions on Unix
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        let assets_dir = self.assets_dir();
        std::fs::create_dir_all(&assets_dir)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            for dir in [&self.data_dir, &assets_dir] {
                std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
            }
        }

        Ok(())
    }
}
