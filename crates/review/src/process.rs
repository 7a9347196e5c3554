//! Test engine driven as a subprocess
//!
//! The engine executable is called with one subcommand per operation:
//!
//! ```text
//! <engine> list --config <cfg> [--grep <re>] [files...]     stdout: JSON test tree
//! <engine> run  --config <cfg> --temp-dir <dir>              stdin: JSON test tree
//!                                                            stdout: one JSON event per line
//! <engine> diff --config <cfg> --reference <p> --current <p> --out <p>
//! ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use shotdiff_common::config::EngineSettings;
use shotdiff_common::{
    EngineConfig, Error, Result, TestCollection, TestResult, TestSelection,
};

use crate::engine::{EngineEvent, Reporter, TestEngine};

/// Engine executable speaking the line-delimited JSON protocol
pub struct ProcessEngine {
    binary: PathBuf,
    config_path: PathBuf,
    config: EngineConfig,
    temp_dir: PathBuf,
}

impl ProcessEngine {
    /// Create an engine whose current captures go to `temp_dir`
    pub fn new(settings: &EngineSettings, temp_dir: impl Into<PathBuf>) -> Result<Self> {
        let config = EngineConfig::load(&settings.config_path)?;
        Ok(Self::with_config(settings, config, temp_dir))
    }

    pub fn with_config(
        settings: &EngineSettings,
        config: EngineConfig,
        temp_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            binary: settings.binary.clone(),
            config_path: settings.config_path.clone(),
            config,
            temp_dir: temp_dir.into(),
        }
    }

    fn command(&self, subcommand: &str) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg(subcommand)
            .arg("--config")
            .arg(&self.config_path)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    fn spawn_error(&self, e: std::io::Error) -> Error {
        Error::Engine(format!("failed to spawn {}: {}", self.binary.display(), e))
    }
}

#[async_trait]
impl TestEngine for ProcessEngine {
    fn browser_ids(&self) -> Vec<String> {
        self.config.browser_ids()
    }

    fn screenshots_dir(&self, browser_id: &str) -> Option<PathBuf> {
        self.config.screenshots_dir(browser_id).map(Path::to_path_buf)
    }

    async fn read_tests(&self, selection: &TestSelection) -> Result<TestCollection> {
        let mut cmd = self.command("list");
        if let Some(grep) = &selection.grep {
            cmd.arg("--grep").arg(grep);
        }
        cmd.args(&selection.files);

        let output = cmd.output().await.map_err(|e| self.spawn_error(e))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Engine(format!(
                "reading tests failed ({}): {}",
                output.status,
                stderr.trim()
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| Error::Engine(format!("unreadable test tree: {}", e)))
    }

    async fn test(&self, collection: &TestCollection, reporter: &dyn Reporter) -> Result<()> {
        let mut cmd = self.command("run");
        cmd.arg("--temp-dir")
            .arg(&self.temp_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| self.spawn_error(e))?;

        let tree = serde_json::to_vec(collection)?;
        if let Some(mut stdin) = child.stdin.take() {
            let written = async {
                stdin.write_all(&tree).await?;
                stdin.shutdown().await
            }
            .await;
            if let Err(e) = written {
                drop(stdin);
                let output = child.wait_with_output().await?;
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(Error::Engine(format!(
                    "run exited with {} before reading the test tree ({}): {}",
                    output.status,
                    e,
                    stderr.trim()
                )));
            }
        }

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("[engine] {}", line);
                }
            });
        }

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                if let Some(event) = parse_event_line(&line) {
                    reporter.report(event);
                }
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(Error::Engine(format!("run exited with {}", status)));
        }
        Ok(())
    }

    async fn save_diff(&self, failure: &TestResult, dest: &Path) -> Result<()> {
        let output = self
            .command("diff")
            .arg("--reference")
            .arg(&failure.reference_path)
            .arg("--current")
            .arg(&failure.current_path)
            .arg("--out")
            .arg(dest)
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Engine(format!(
                "building diff for {} failed: {}",
                failure.test,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

/// Decode one stdout line of `run`. Lines that are not events are engine
/// chatter and only logged.
pub fn parse_event_line(line: &str) -> Option<EngineEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    if !trimmed.starts_with('{') {
        debug!("[engine] {}", trimmed);
        return None;
    }
    match serde_json::from_str(trimmed) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!("Ignoring malformed engine event ({}): {}", e, trimmed);
            None
        }
    }
}
