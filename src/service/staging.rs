//! Staging of uploads and parsing of caller-supplied timeouts.

use crate::core::ScanResult;

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Writes `bytes` into a fresh directory under `root` and returns that directory.
///
/// Only the final component of `name` is kept so an upload cannot escape its
/// directory; an empty name falls back to a generated one.
pub async fn stage_bytes(root: &Path, name: &str, bytes: &[u8]) -> ScanResult<PathBuf> {
    let dir = root.join(format!("file_{}", uuid::Uuid::new_v4().simple()));
    tokio::fs::create_dir_all(&dir).await?;

    let file_name = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| format!("scan_{}", uuid::Uuid::new_v4().simple()));

    if let Err(e) = tokio::fs::write(dir.join(&file_name), bytes).await {
        let _ = tokio::fs::remove_dir_all(&dir).await;
        return Err(e.into());
    }

    tracing::debug!(dir = %dir.display(), file = %file_name, size = bytes.len(), "Staged upload");
    Ok(dir)
}

/// Parses a caller-supplied timeout, falling back to `default`.
///
/// Absent, unparseable or zero values all yield `default`.
pub fn resolve_timeout(raw: Option<&str>, default: Duration) -> Duration {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return default;
    };
    match humantime::parse_duration(raw) {
        Ok(timeout) if !timeout.is_zero() => timeout,
        Ok(_) => default,
        Err(e) => {
            tracing::debug!(raw, error = %e, "Ignoring invalid timeout");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_timeout() {
        let default = Duration::from_secs(60);
        assert_eq!(resolve_timeout(None, default), default);
        assert_eq!(resolve_timeout(Some(""), default), default);
        assert_eq!(resolve_timeout(Some("soon"), default), default);
        assert_eq!(resolve_timeout(Some("0s"), default), default);
        assert_eq!(resolve_timeout(Some("2s"), default), Duration::from_secs(2));
        assert_eq!(
            resolve_timeout(Some(" 1m 30s "), default),
            Duration::from_secs(90)
        );
    }

    #[tokio::test]
    async fn test_stage_bytes_creates_unique_dirs() {
        let root = TempDir::new().unwrap();
        let a = stage_bytes(root.path(), "sample.exe", b"MZ").await.unwrap();
        let b = stage_bytes(root.path(), "sample.exe", b"MZ").await.unwrap();

        assert_ne!(a, b);
        assert!(a.starts_with(root.path()));
        assert_eq!(std::fs::read(a.join("sample.exe")).unwrap(), b"MZ");
    }

    #[tokio::test]
    async fn test_stage_bytes_strips_path_components() {
        let root = TempDir::new().unwrap();
        let dir = stage_bytes(root.path(), "../../etc/passwd", b"x")
            .await
            .unwrap();
        assert!(dir.join("passwd").exists());
        assert!(!root.path().join("etc").exists());
    }

    #[tokio::test]
    async fn test_stage_bytes_generates_name() {
        let root = TempDir::new().unwrap();
        let dir = stage_bytes(root.path(), "", b"x").await.unwrap();
        let entries: Vec<_> = std::fs::read_dir(&dir).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
