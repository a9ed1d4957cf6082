//! Tracing subscriber setup.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,avatar_overlay=debug";

/// Where log lines go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stdout,
    /// Required when stdout carries protocol messages.
    Stderr,
    /// Append to a file, creating parent directories.
    File(PathBuf),
}

impl LogTarget {
    /// File if one is given, otherwise `fallback`.
    pub fn file_or(path: Option<&Path>, fallback: LogTarget) -> Self {
        match path {
            Some(path) => LogTarget::File(path.to_path_buf()),
            None => fallback,
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber. A second call is a no-op.
pub fn init_tracing(target: LogTarget) -> std::io::Result<()> {
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter());
    let installed = match target {
        LogTarget::Stdout => builder.try_init(),
        LogTarget::Stderr => builder.with_writer(std::io::stderr).try_init(),
        LogTarget::File(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
    };
    if let Err(e) = installed {
        tracing::debug!("tracing already initialised: {}", e);
    }
    Ok(())
}
