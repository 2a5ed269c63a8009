use std::{fs, path::PathBuf};

use anyhow::{Context, Result};

use crate::config::DirectoryConfig;

#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub logs_dir: PathBuf,
}

pub fn ensure_directories(cfg: &DirectoryConfig) -> Result<ResolvedPaths> {
    let requested = PathBuf::from(cfg.logs_dir.trim());
    fs::create_dir_all(&requested)
        .with_context(|| format!("failed to create log directory {}", requested.display()))?;
    let logs_dir = requested.canonicalize().unwrap_or(requested);

    let probe = logs_dir.join(format!(".probe-{}", std::process::id()));
    fs::write(&probe, b"ok")
        .with_context(|| format!("log directory {} is not writable", logs_dir.display()))?;
    fs::remove_file(&probe)?;

    Ok(ResolvedPaths { logs_dir })
}
