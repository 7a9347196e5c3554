//! Interface to the external test engine
//!
//! The engine owns screenshot capture, pixel comparison, browser drivers and
//! the test definitions. shotdiff only loads the test tree, asks for a run and
//! consumes the per-test outcomes reported back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use shotdiff_common::{
    Error, Result, TestCollection, TestDescriptor, TestResult, TestSelection,
};

/// Outcome notifications emitted by the engine during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum EngineEvent {
    Begin {
        #[serde(default)]
        total: usize,
    },
    #[serde(rename_all = "camelCase")]
    SuiteBegin { suite_path: Vec<String> },
    #[serde(rename_all = "camelCase")]
    SuiteEnd { suite_path: Vec<String> },
    StateBegin(TestDescriptor),
    TestResult(TestResult),
    NoReference(MissingReference),
    Skip(TestDescriptor),
    Warning { message: String },
    Error(EngineFailure),
    End,
}

/// A capture taken for a test that has no reference image yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingReference {
    #[serde(flatten)]
    pub test: TestDescriptor,
    pub current_path: PathBuf,
}

/// An error raised while executing a test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineFailure {
    pub message: String,
    #[serde(default)]
    pub stack: Option<String>,
    #[serde(default)]
    pub test: Option<TestDescriptor>,
}

/// Receives engine events as they happen, one call per outcome
pub trait Reporter: Send + Sync {
    fn report(&self, event: EngineEvent);
}

/// The external test engine
#[async_trait]
pub trait TestEngine: Send + Sync {
    /// Browsers declared in the engine configuration
    fn browser_ids(&self) -> Vec<String>;

    /// Reference screenshot root of a browser
    fn screenshots_dir(&self, browser_id: &str) -> Option<PathBuf>;

    /// Where the reference image of `test` lives
    fn screenshot_path(&self, test: &TestDescriptor) -> Result<PathBuf> {
        let mut path = self.screenshots_dir(&test.browser_id).ok_or_else(|| {
            Error::Config(format!("browser {} is not configured", test.browser_id))
        })?;
        path.extend(&test.suite_path);
        path.push(&test.state_name);
        path.push(format!("{}.png", test.browser_id));
        Ok(path)
    }

    /// Load the test tree, narrowed by file and grep selectors
    async fn read_tests(&self, selection: &TestSelection) -> Result<TestCollection>;

    /// Run `collection`, reporting every outcome to `reporter`
    async fn test(&self, collection: &TestCollection, reporter: &dyn Reporter) -> Result<()>;

    /// Write an image highlighting the differences of a failed test to `dest`
    async fn save_diff(&self, failure: &TestResult, dest: &Path) -> Result<()>;
}
