//! Mapping of staged artifacts on disk to viewer URLs
//!
//! Three namespaces are exposed: `/ref/<browserId>` for reference images,
//! `/curr` for current captures and `/diff` for generated diff images.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use shotdiff_common::{Error, Result};

pub const REF_PREFIX: &str = "/ref";
pub const CURRENT_PREFIX: &str = "/curr";
pub const DIFF_PREFIX: &str = "/diff";

/// Converts artifact paths into URLs under the viewer namespaces
#[derive(Debug, Clone)]
pub struct PathMapper {
    reference_dirs: HashMap<String, PathBuf>,
    current_dir: PathBuf,
    diff_dir: PathBuf,
}

impl PathMapper {
    pub fn new(
        reference_dirs: HashMap<String, PathBuf>,
        current_dir: impl Into<PathBuf>,
        diff_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            reference_dirs,
            current_dir: current_dir.into(),
            diff_dir: diff_dir.into(),
        }
    }

    /// Cache-busted URL of a reference image
    pub fn ref_url(&self, full_path: &Path, browser_id: &str) -> Result<String> {
        let root = self.reference_dirs.get(browser_id).ok_or_else(|| {
            Error::Config(format!("no reference directory for browser {}", browser_id))
        })?;
        let prefix = format!("{}/{}", REF_PREFIX, urlencoding::encode(browser_id));
        let url = to_url(root, full_path, &prefix)?;
        Ok(cache_busted(url))
    }

    /// Cache-busted URL of a current capture
    pub fn current_url(&self, full_path: &Path) -> Result<String> {
        let url = to_url(&self.current_dir, full_path, CURRENT_PREFIX)?;
        Ok(cache_busted(url))
    }

    /// URL of a diff image. Diff files get a fresh name on every build, so no
    /// cache-busting parameter is added.
    pub fn diff_url(&self, full_path: &Path) -> Result<String> {
        to_url(&self.diff_dir, full_path, DIFF_PREFIX)
    }

    pub fn reference_dirs(&self) -> &HashMap<String, PathBuf> {
        &self.reference_dirs
    }
}

/// Percent-encode the path of `full_path` relative to `root_dir` and put it
/// under `prefix`.
pub fn to_url(root_dir: &Path, full_path: &Path, prefix: &str) -> Result<String> {
    let relative = full_path
        .strip_prefix(root_dir)
        .map_err(|_| Error::InvalidPath {
            path: full_path.to_path_buf(),
            root: root_dir.to_path_buf(),
        })?;

    let mut url = prefix.trim_end_matches('/').to_string();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                url.push('/');
                url.push_str(&urlencoding::encode(&part.to_string_lossy()));
            }
            Component::CurDir => {}
            _ => {
                return Err(Error::InvalidPath {
                    path: full_path.to_path_buf(),
                    root: root_dir.to_path_buf(),
                })
            }
        }
    }

    Ok(url)
}

fn cache_busted(url: String) -> String {
    format!("{}?t={}", url, chrono::Utc::now().timestamp_millis())
}
