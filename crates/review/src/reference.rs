//! Accepting a failed screenshot as the new reference image

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info};

use shotdiff_common::{Error, Result, TestDescriptor};

use crate::failed::FailedTestIndex;
use crate::paths::PathMapper;

/// Lossless PNG recompression, writing `output` from `input`
#[async_trait]
pub trait Recompressor: Send + Sync {
    async fn recompress(&self, input: &Path, output: &Path) -> Result<()>;
}

/// `optipng -out <output> <input>`
///
/// optipng does not overwrite an existing output whose content differs from
/// the input: it keeps the old file and writes a backup next to it. Callers
/// must remove the destination first.
#[derive(Debug, Clone)]
pub struct Optipng {
    binary: PathBuf,
}

impl Optipng {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl Recompressor for Optipng {
    async fn recompress(&self, input: &Path, output: &Path) -> Result<()> {
        debug!(
            "Running {} -out {} {}",
            self.binary.display(),
            output.display(),
            input.display()
        );

        let result = Command::new(&self.binary)
            .arg("-out")
            .arg(output)
            .arg(input)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                Error::Compression(format!("failed to spawn {}: {}", self.binary.display(), e))
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(Error::Compression(format!(
                "{} exited with {}: {}",
                self.binary.display(),
                result.status,
                stderr.trim()
            )));
        }

        Ok(())
    }
}

/// File sizes of two paths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeComparison {
    pub before: u64,
    pub after: u64,
}

impl SizeComparison {
    pub async fn of(before: &Path, after: &Path) -> Result<Self> {
        let (before, after) = tokio::try_join!(tokio::fs::metadata(before), tokio::fs::metadata(after))?;
        Ok(Self {
            before: before.len(),
            after: after.len(),
        })
    }

    pub fn difference(&self) -> i64 {
        self.before as i64 - self.after as i64
    }

    /// Size saved, in whole percent of `before`. Negative when the file grew.
    pub fn percent(&self) -> i64 {
        compression_percent(self.before, self.after)
    }
}

/// `round((before - after) * 100 / before)`, halves rounded up
pub fn compression_percent(before: u64, after: u64) -> i64 {
    if before == 0 {
        return 0;
    }
    let ratio = (before as f64 - after as f64) * 100.0 / before as f64;
    (ratio + 0.5).floor() as i64
}

/// Outcome of an accepted reference
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedReference {
    #[serde(rename = "referenceURL")]
    pub reference_url: String,
    pub reference_path: PathBuf,
    pub compression_percent: i64,
}

/// Promotes the current capture of a failed test to its reference image
pub struct ReferenceUpdater {
    failed: Arc<Mutex<FailedTestIndex>>,
    paths: Arc<PathMapper>,
    recompressor: Arc<dyn Recompressor>,
}

impl ReferenceUpdater {
    pub fn new(
        failed: Arc<Mutex<FailedTestIndex>>,
        paths: Arc<PathMapper>,
        recompressor: Arc<dyn Recompressor>,
    ) -> Self {
        Self {
            failed,
            paths,
            recompressor,
        }
    }

    /// Replace the reference image of `test` with its current capture.
    ///
    /// Only tests recorded as failing can be accepted, and only when the
    /// reference lies under its browser's reference root. Filesystem and
    /// recompression errors are returned as they occur; a partially created
    /// directory tree is left in place.
    pub async fn update_reference(&self, test: &TestDescriptor) -> Result<AcceptedReference> {
        let result = self
            .failed
            .lock()
            .find(test)
            .cloned()
            .ok_or_else(|| Error::NotFound(test.to_string()))?;

        let reference_path = &result.reference_path;
        // Fail before touching the file if no URL can be handed back for it
        self.paths.ref_url(reference_path, &test.browser_id)?;

        if let Some(parent) = reference_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // optipng keeps a differing destination and writes a backup instead of
        // overwriting it.
        if tokio::fs::try_exists(reference_path).await? {
            tokio::fs::remove_file(reference_path).await?;
        }

        self.recompressor
            .recompress(&result.current_path, reference_path)
            .await?;

        let percent = SizeComparison::of(&result.current_path, reference_path)
            .await?
            .percent();
        info!(
            "Reference image {} updated, compressed by {}%",
            reference_path.display(),
            percent
        );

        let reference_url = self.paths.ref_url(reference_path, &test.browser_id)?;
        Ok(AcceptedReference {
            reference_url,
            reference_path: reference_path.clone(),
            compression_percent: percent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shotdiff_common::TestResult;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Behaves like optipng: refuses to replace a differing destination.
    struct FakeOptipng {
        calls: AtomicUsize,
        output: Vec<u8>,
    }

    #[async_trait]
    impl Recompressor for FakeOptipng {
        async fn recompress(&self, input: &Path, output: &Path) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let source = tokio::fs::read(input).await?;
            if let Ok(existing) = tokio::fs::read(output).await {
                if existing != source {
                    let backup = output.with_extension("png.bak");
                    tokio::fs::write(backup, &self.output).await?;
                    return Ok(());
                }
            }
            tokio::fs::write(output, &self.output).await?;
            Ok(())
        }
    }

    struct FailingCompressor;

    #[async_trait]
    impl Recompressor for FailingCompressor {
        async fn recompress(&self, _input: &Path, _output: &Path) -> Result<()> {
            Err(Error::Compression("exit status: 1".to_string()))
        }
    }

    struct Fixture {
        tmp: TempDir,
        failed: Arc<Mutex<FailedTestIndex>>,
        paths: Arc<PathMapper>,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            let refs = tmp.path().join("refs");
            let curr = tmp.path().join("curr");
            std::fs::create_dir_all(&curr).unwrap();
            let mut dirs = HashMap::new();
            dirs.insert("chrome".to_string(), refs);
            let paths = Arc::new(PathMapper::new(dirs, curr, tmp.path().join("diff")));
            Self {
                tmp,
                failed: Arc::new(Mutex::new(FailedTestIndex::new())),
                paths,
            }
        }

        fn record_failure(&self, current: &[u8]) -> TestDescriptor {
            let test = TestDescriptor::new(["header"], "plain", "chrome");
            let current_path = self.tmp.path().join("curr/capture.png");
            std::fs::write(&current_path, current).unwrap();
            self.failed.lock().add(TestResult {
                test: test.clone(),
                reference_path: self.reference_path(),
                current_path,
                equal: false,
            });
            test
        }

        fn reference_path(&self) -> PathBuf {
            self.tmp.path().join("refs/header/plain/chrome.png")
        }

        fn updater(&self, recompressor: Arc<dyn Recompressor>) -> ReferenceUpdater {
            ReferenceUpdater::new(self.failed.clone(), self.paths.clone(), recompressor)
        }
    }

    fn fake(output: &[u8]) -> Arc<FakeOptipng> {
        Arc::new(FakeOptipng {
            calls: AtomicUsize::new(0),
            output: output.to_vec(),
        })
    }

    #[test]
    fn test_compression_percent() {
        assert_eq!(compression_percent(30000, 15000), 50);
        assert_eq!(compression_percent(750, 1000), -33);
        assert_eq!(compression_percent(1000, 1000), 0);
        assert_eq!(compression_percent(200, 199), 1);
        assert_eq!(compression_percent(0, 10), 0);
    }

    #[tokio::test]
    async fn test_unknown_test_is_rejected_without_writes() {
        let fixture = Fixture::new();
        let compressor = fake(b"small");
        let updater = fixture.updater(compressor.clone());

        let err = updater
            .update_reference(&TestDescriptor::new(["header"], "plain", "chrome"))
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(compressor.calls.load(Ordering::SeqCst), 0);
        assert!(!fixture.tmp.path().join("refs").exists());
    }

    #[tokio::test]
    async fn test_accept_creates_reference_tree() {
        let fixture = Fixture::new();
        let test = fixture.record_failure(&[7u8; 400]);
        let updater = fixture.updater(fake(&[7u8; 300]));

        let accepted = updater.update_reference(&test).await.unwrap();

        assert_eq!(std::fs::read(fixture.reference_path()).unwrap(), vec![7u8; 300]);
        assert_eq!(accepted.compression_percent, 25);
        assert!(accepted
            .reference_url
            .starts_with("/ref/chrome/header/plain/chrome.png?t="));
    }

    #[tokio::test]
    async fn test_accept_replaces_existing_reference() {
        let fixture = Fixture::new();
        let test = fixture.record_failure(b"new capture");
        std::fs::create_dir_all(fixture.reference_path().parent().unwrap()).unwrap();
        std::fs::write(fixture.reference_path(), b"stale reference").unwrap();

        let updater = fixture.updater(fake(b"recompressed"));
        updater.update_reference(&test).await.unwrap();

        assert_eq!(std::fs::read(fixture.reference_path()).unwrap(), b"recompressed");
        assert!(!fixture.reference_path().with_extension("png.bak").exists());
    }

    #[tokio::test]
    async fn test_reference_outside_root_is_rejected_without_writes() {
        let fixture = Fixture::new();
        let test = TestDescriptor::new(["header"], "plain", "chrome");
        let current_path = fixture.tmp.path().join("curr/capture.png");
        std::fs::write(&current_path, b"capture").unwrap();
        let stray = fixture.tmp.path().join("elsewhere/header/plain/chrome.png");
        std::fs::create_dir_all(stray.parent().unwrap()).unwrap();
        std::fs::write(&stray, b"kept").unwrap();
        fixture.failed.lock().add(TestResult {
            test: test.clone(),
            reference_path: stray.clone(),
            current_path,
            equal: false,
        });

        let compressor = fake(b"small");
        let err = fixture
            .updater(compressor.clone())
            .update_reference(&test)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidPath { .. }));
        assert_eq!(compressor.calls.load(Ordering::SeqCst), 0);
        assert_eq!(std::fs::read(&stray).unwrap(), b"kept");
    }

    #[tokio::test]
    async fn test_compression_failure_is_surfaced() {
        let fixture = Fixture::new();
        let test = fixture.record_failure(b"capture");
        let updater = fixture.updater(Arc::new(FailingCompressor));

        let err = updater.update_reference(&test).await.unwrap_err();
        assert!(matches!(err, Error::Compression(_)));
        assert!(fixture.reference_path().parent().unwrap().is_dir());
    }

    #[tokio::test]
    async fn test_missing_current_capture_is_io_error() {
        let fixture = Fixture::new();
        let test = fixture.record_failure(b"capture");
        std::fs::remove_file(fixture.tmp.path().join("curr/capture.png")).unwrap();

        let err = fixture
            .updater(fake(b"x"))
            .update_reference(&test)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[tokio::test]
    async fn test_optipng_missing_binary() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("in.png");
        std::fs::write(&input, b"x").unwrap();
        let err = Optipng::new(tmp.path().join("no-such-optipng"))
            .recompress(&input, &tmp.path().join("out.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Compression(_)));
    }

    #[tokio::test]
    async fn test_size_comparison() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a");
        let b = tmp.path().join("b");
        std::fs::write(&a, vec![0u8; 750]).unwrap();
        std::fs::write(&b, vec![0u8; 1000]).unwrap();

        let sizes = SizeComparison::of(&a, &b).await.unwrap();
        assert_eq!(sizes.difference(), -250);
        assert_eq!(sizes.percent(), -33);
    }
}
