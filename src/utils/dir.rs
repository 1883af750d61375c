use std::{env, io, path::PathBuf};

use anyhow::{anyhow, Result};

/// Directory for the store file and logs when none was given explicitly.
/// `$XDG_STATE_HOME/timeflow` or `$HOME/.local/state/timeflow`, `%APPDATA%\timeflow` on Windows.
pub fn application_default_path() -> Result<PathBuf> {
    let mut path = {
        #[cfg(windows)]
        {
            env::var("APPDATA")
                .map(PathBuf::from)
                .map_err(|_| anyhow!("APPDATA should be present on Windows"))?
        }
        #[cfg(not(windows))]
        {
            env::var("XDG_STATE_HOME")
                .map(PathBuf::from)
                .or_else(|_| {
                    env::var("HOME").map(|home| {
                        let mut path = PathBuf::from(home);
                        path.push(".local/state");
                        path
                    })
                })
                .map_err(|_| anyhow!("Couldn't find neither XDG_STATE_HOME nor HOME"))?
        }
    };
    path.push("timeflow");
    Ok(path)
}

pub fn ensure_dir(path: PathBuf) -> Result<PathBuf> {
    match std::fs::create_dir_all(&path) {
        Ok(_) => Ok(path),
        Err(v) if v.kind() == io::ErrorKind::AlreadyExists => Ok(path),
        Err(v) => Err(v.into()),
    }
}
