//! Headless Chromium launcher.
//!
//! Spawns a Chromium process with remote debugging enabled on an ephemeral
//! port, scrapes the DevTools WebSocket URL from its stderr, and hands back
//! a handle that kills the process (and removes its temporary profile) on
//! drop.

use std::env;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::error::CdpError;

/// Default timeout for browser launch.
const DEFAULT_LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Candidate Chromium executables, probed in order.
const CHROMIUM_PATHS: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/usr/bin/google-chrome",
    "/snap/bin/chromium",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
];

/// Flags every automation launch carries.
const DEFAULT_ARGS: &[&str] = &[
    "--headless=new",
    "--no-first-run",
    "--no-default-browser-check",
    "--disable-background-networking",
    "--disable-popup-blocking",
    "--disable-dev-shm-usage",
    "--mute-audio",
];

/// Builder for launching a Chromium process.
#[derive(Debug, Clone, Default)]
pub struct ChromiumLauncher {
    executable: Option<PathBuf>,
    extra_args: Vec<String>,
    launch_timeout: Option<Duration>,
}

/// A launched Chromium process.
///
/// Dropping this handle kills the process and deletes its temporary
/// profile directory.
#[derive(Debug)]
pub struct LaunchedBrowser {
    /// Browser-level DevTools WebSocket URL.
    pub ws_url: String,
    child: Child,
    _user_data_dir: TempDir,
}

impl ChromiumLauncher {
    /// Create a launcher with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific Chromium executable instead of probing.
    #[must_use]
    pub fn executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    /// Append extra command line arguments.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// Override the launch timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.launch_timeout = Some(timeout);
        self
    }

    /// Launch the browser and wait for its DevTools URL.
    ///
    /// # Errors
    ///
    /// Returns an error if no executable is found, the process cannot be
    /// spawned, or no DevTools URL appears before the timeout.
    #[instrument(level = "info", skip(self))]
    pub async fn launch(self) -> Result<LaunchedBrowser, CdpError> {
        let executable = match self.executable {
            Some(path) => path,
            None => find_chromium()?,
        };
        let launch_timeout = self.launch_timeout.unwrap_or(DEFAULT_LAUNCH_TIMEOUT);

        let user_data_dir = TempDir::with_prefix("agentlens-profile-")
            .map_err(|e| CdpError::SpawnFailed(format!("temp profile dir: {e}")))?;

        let mut command = Command::new(&executable);
        command
            .arg("--remote-debugging-port=0")
            .arg(format!("--user-data-dir={}", user_data_dir.path().display()))
            .args(DEFAULT_ARGS)
            .args(&self.extra_args)
            .arg("about:blank")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        info!(executable = %executable.display(), "Launching Chromium");
        let mut child = command
            .spawn()
            .map_err(|e| CdpError::SpawnFailed(format!("{}: {e}", executable.display())))?;

        let stderr = child.stderr.take().ok_or(CdpError::NoDebuggingUrl)?;
        let ws_url = timeout(launch_timeout, scrape_devtools_url(stderr))
            .await
            .map_err(|_| CdpError::LaunchTimeout(launch_timeout))??;

        info!(ws_url = %ws_url, "Browser ready");
        Ok(LaunchedBrowser {
            ws_url,
            child,
            _user_data_dir: user_data_dir,
        })
    }
}

impl LaunchedBrowser {
    /// Kill the browser process.
    ///
    /// Best effort; the process is also killed on drop.
    pub async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            warn!(error = %e, "Failed to kill browser process");
        }
    }
}

/// Read stderr lines until the DevTools URL shows up, then keep the pipe
/// drained so the browser never blocks on a full stderr buffer.
async fn scrape_devtools_url(stderr: tokio::process::ChildStderr) -> Result<String, CdpError> {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(line = %line, "browser stderr");
        if let Some(rest) = line.strip_prefix("DevTools listening on ") {
            let url = rest.trim().to_string();
            tokio::spawn(async move {
                while let Ok(Some(_)) = lines.next_line().await {}
            });
            return Ok(url);
        }
    }
    Err(CdpError::NoDebuggingUrl)
}

/// Locate a Chromium executable.
///
/// `CHROMIUM_PATH` wins; otherwise common install locations are probed
/// through `which`-style `PATH` lookup or as absolute paths.
fn find_chromium() -> Result<PathBuf, CdpError> {
    if let Ok(path) = env::var("CHROMIUM_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Ok(path);
        }
        warn!(path = %path.display(), "CHROMIUM_PATH does not exist, probing defaults");
    }

    for candidate in CHROMIUM_PATHS {
        let path = PathBuf::from(candidate);
        if path.is_absolute() {
            if path.exists() {
                return Ok(path);
            }
        } else if let Some(found) = lookup_in_path(candidate) {
            return Ok(found);
        }
    }

    Err(CdpError::ChromiumNotFound)
}

/// Resolve a bare executable name against `PATH`.
fn lookup_in_path(name: &str) -> Option<PathBuf> {
    let path_var = env::var_os("PATH")?;
    env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_in_path_finds_shell() {
        // `sh` exists on every unix PATH this crate targets.
        if cfg!(unix) {
            assert!(lookup_in_path("sh").is_some());
        }
    }

    #[test]
    fn lookup_in_path_misses_nonsense() {
        assert!(lookup_in_path("agentlens-no-such-binary-xyz").is_none());
    }
}
