//! Subprocess scanning backend.
//!
//! Runs the external engine as `<program> <args...> <dir>` and captures its
//! standard output as the scan result.
//!
//! # Requirements
//!
//! - The engine binary (`hmb` by default) must be on `PATH` or configured
//!   with an absolute path.
//! - The engine prints its JSON report on stdout and exits with status 0.

use crate::core::{ScanError, Scanner};

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Subprocess scanner configuration.
#[derive(Debug, Clone)]
pub struct CommandScannerConfig {
    /// Engine name used in logs and errors.
    pub name: String,

    /// Program to execute.
    pub program: PathBuf,

    /// Arguments placed before the scan directory.
    pub args: Vec<String>,

    /// File holding the engine's signature version.
    pub version_file: Option<PathBuf>,
}

impl Default for CommandScannerConfig {
    fn default() -> Self {
        Self {
            name: "hmb".to_string(),
            program: PathBuf::from("hmb"),
            args: vec!["call".to_string()],
            version_file: Some(PathBuf::from("/malware/VERSION")),
        }
    }
}

impl CommandScannerConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the engine name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the program to execute.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Replaces the leading arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the version file.
    pub fn with_version_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.version_file = Some(path.into());
        self
    }

    /// Disables version lookup.
    pub fn without_version_file(mut self) -> Self {
        self.version_file = None;
        self
    }
}

/// Scanner that shells out to an external engine.
///
/// # Example
///
/// ```rust,ignore
/// use scanspool::backends::{CommandScanner, CommandScannerConfig};
///
/// let scanner = CommandScanner::new(
///     CommandScannerConfig::new().with_program("/usr/local/bin/hmb"),
/// )?;
/// ```
#[derive(Debug)]
pub struct CommandScanner {
    config: CommandScannerConfig,
}

impl CommandScanner {
    /// Creates a new scanner with the given configuration.
    pub fn new(config: CommandScannerConfig) -> Result<Self, ScanError> {
        if config.program.as_os_str().is_empty() {
            return Err(ScanError::configuration("scanner program must not be empty"));
        }
        Ok(Self { config })
    }

    /// Creates a scanner for the default `hmb call <dir>` engine.
    pub fn with_defaults() -> Result<Self, ScanError> {
        Self::new(CommandScannerConfig::default())
    }

    /// Returns the configuration.
    pub fn config(&self) -> &CommandScannerConfig {
        &self.config
    }

    fn command(&self, dir: &Path) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args)
            .arg(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so a timeout can take down anything the engine forked.
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }

    /// Kills the engine and every process it started, then reaps it.
    async fn terminate(&self, child: &mut tokio::process::Child, pid: Option<u32>) {
        #[cfg(unix)]
        if let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
                tracing::debug!(
                    engine = %self.config.name,
                    pgid = pid,
                    error = %e,
                    "Failed to signal engine process group"
                );
            }
        }
        #[cfg(not(unix))]
        let _ = pid;

        if let Err(e) = child.kill().await {
            tracing::warn!(
                engine = %self.config.name,
                error = %e,
                "Failed to kill timed out engine"
            );
        }
    }
}

#[async_trait]
impl Scanner for CommandScanner {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn scan(&self, dir: &Path, timeout: Duration) -> Result<String, ScanError> {
        let start = Instant::now();
        tracing::info!(
            engine = %self.config.name,
            dir = %dir.display(),
            timeout = ?timeout,
            "Starting scan"
        );

        let mut child = self.command(dir).spawn().map_err(|e| {
            ScanError::execution(
                &self.config.name,
                format!("failed to start '{}': {e}", self.config.program.display()),
            )
        })?;
        let pid = child.id();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let run = async {
            let (status, out, err) =
                tokio::join!(child.wait(), read_pipe(stdout), read_pipe(stderr));
            Ok::<_, std::io::Error>((status?, out?, err?))
        };

        let outcome = tokio::time::timeout(timeout, run).await;
        match outcome {
            Ok(Ok((status, out, _))) if status.success() => {
                tracing::debug!(
                    engine = %self.config.name,
                    dir = %dir.display(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    bytes = out.len(),
                    "Scan finished"
                );
                Ok(String::from_utf8_lossy(&out).into_owned())
            }
            Ok(Ok((status, _, err))) => {
                let stderr = String::from_utf8_lossy(&err).trim().to_string();
                let message = if stderr.is_empty() {
                    format!("engine exited with {status}")
                } else {
                    format!("engine exited with {status}: {stderr}")
                };
                Err(ScanError::Execution {
                    engine: self.config.name.clone(),
                    message,
                    exit_code: status.code(),
                })
            }
            Ok(Err(e)) => Err(ScanError::execution(&self.config.name, e.to_string())),
            Err(_) => {
                self.terminate(&mut child, pid).await;
                Err(ScanError::timeout(
                    &self.config.name,
                    dir.display().to_string(),
                    start.elapsed(),
                ))
            }
        }
    }

    async fn signature_version(&self) -> Option<String> {
        let path = self.config.version_file.as_ref()?;
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Some(text.trim().to_string()),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "No engine version file");
                None
            }
        }
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn shell(script: &str) -> CommandScanner {
        CommandScanner::new(
            CommandScannerConfig::new()
                .with_name("sh")
                .with_program("sh")
                .with_args(["-c", script, "scan"])
                .without_version_file(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_captures_stdout() {
        let dir = tempdir().unwrap();
        let scanner = shell(r#"printf '{"dir":"%s"}' "$1""#);
        let out = scanner.scan(dir.path(), Duration::from_secs(5)).await.unwrap();
        assert_eq!(out, format!(r#"{{"dir":"{}"}}"#, dir.path().display()));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_execution_error() {
        let dir = tempdir().unwrap();
        let scanner = shell("echo boom >&2; exit 3");
        let err = scanner.scan(dir.path(), Duration::from_secs(5)).await.unwrap_err();
        match err {
            ScanError::Execution {
                message, exit_code, ..
            } => {
                assert_eq!(exit_code, Some(3));
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_execution_error() {
        let scanner = CommandScanner::new(
            CommandScannerConfig::new().with_program("/nonexistent/scan-engine"),
        )
        .unwrap();
        let err = scanner
            .scan(Path::new("/tmp"), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::Execution { .. }));
    }

    #[tokio::test]
    async fn test_timeout_kills_engine() {
        let dir = tempdir().unwrap();
        let scanner = shell(r#"echo $$ > "$1/pid"; exec sleep 5"#);
        let timeout = Duration::from_millis(300);

        let start = Instant::now();
        let err = scanner.scan(dir.path(), timeout).await.unwrap_err();
        assert!(err.is_timeout());
        assert!(start.elapsed() < timeout + Duration::from_secs(2));

        #[cfg(target_os = "linux")]
        {
            let pid = std::fs::read_to_string(dir.path().join("pid")).unwrap();
            let proc_entry = PathBuf::from(format!("/proc/{}", pid.trim()));
            assert!(!proc_entry.exists(), "engine process outlived its timeout");
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_kills_forked_children() {
        let dir = tempdir().unwrap();
        let scanner = shell(r#"sleep 30 & echo $! > "$1/pid"; wait"#);

        let err = scanner
            .scan(dir.path(), Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        let pid = std::fs::read_to_string(dir.path().join("pid")).unwrap();
        let proc_entry = PathBuf::from(format!("/proc/{}", pid.trim()));
        // The orphan is reparented to init, which may take a moment to reap it.
        let deadline = Instant::now() + Duration::from_secs(2);
        while proc_entry.exists() && !is_zombie(&proc_entry) && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(
            !proc_entry.exists() || is_zombie(&proc_entry),
            "forked engine child outlived the timeout"
        );
    }

    #[cfg(target_os = "linux")]
    fn is_zombie(proc_entry: &Path) -> bool {
        std::fs::read_to_string(proc_entry.join("stat"))
            .map(|stat| {
                stat.rsplit(')')
                    .next()
                    .map(|rest| rest.trim_start().starts_with('Z'))
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }

    #[tokio::test]
    async fn test_scan_does_not_remove_dir() {
        let dir = tempdir().unwrap();
        let scanner = shell("exit 0");
        scanner.scan(dir.path(), Duration::from_secs(5)).await.unwrap();
        assert!(dir.path().exists());
    }

    #[tokio::test]
    async fn test_signature_version() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("VERSION");
        std::fs::write(&file, "2024.06.01\n").unwrap();

        let scanner = CommandScanner::new(CommandScannerConfig::new().with_version_file(&file)).unwrap();
        assert_eq!(scanner.signature_version().await.as_deref(), Some("2024.06.01"));

        let scanner = CommandScanner::new(CommandScannerConfig::new().without_version_file()).unwrap();
        assert!(scanner.signature_version().await.is_none());
    }

    #[test]
    fn test_rejects_empty_program() {
        assert!(CommandScanner::new(CommandScannerConfig::new().with_program("")).is_err());
    }
}
