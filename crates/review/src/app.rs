//! The review application: workspace, test tree, runs and accepts

use parking_lot::{Mutex, RwLock};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use shotdiff_common::{
    Error, Result, RunState, TestCollection, TestDescriptor, TestResult, TestSelection,
};

use crate::engine::{MissingReference, TestEngine};
use crate::events::{EventChannel, EventKind, ViewerEvent};
use crate::failed::FailedTestIndex;
use crate::paths::PathMapper;
use crate::reference::{AcceptedReference, Recompressor, ReferenceUpdater};
use crate::reporter::ViewerReporter;
use crate::runner::Runner;
use crate::workspace::TempWorkspace;

/// Browsers to run, derived from the configured and the requested ids
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserSelection {
    /// Configured browsers that were requested, in configuration order
    pub effective: Vec<String>,
    /// Requested browsers that are not configured
    pub unknown: Vec<String>,
    known: Vec<String>,
}

impl BrowserSelection {
    pub fn resolve(known: &[String], requested: &[String]) -> Self {
        let effective = known
            .iter()
            .filter(|id| requested.contains(id))
            .cloned()
            .collect();
        let unknown = requested
            .iter()
            .filter(|id| !known.contains(id))
            .cloned()
            .collect();
        Self {
            effective,
            unknown,
            known: known.to_vec(),
        }
    }

    /// Warning naming the unknown ids and the valid ones, if any id is unknown
    pub fn warning(&self) -> Option<String> {
        if self.unknown.is_empty() {
            return None;
        }
        Some(format!(
            "Unknown browser ids: {}. Use one of the browser ids specified in the config file: {}",
            self.unknown.join(", "),
            self.known.join(", ")
        ))
    }
}

/// Paths and selectors an [`App`] is built from
#[derive(Debug, Clone)]
pub struct AppOptions {
    pub current_dir: PathBuf,
    pub diff_dir: PathBuf,
    pub selection: TestSelection,
    pub event_buffer: usize,
}

/// Orchestrates the review session
pub struct App {
    engine: Arc<dyn TestEngine>,
    workspace: TempWorkspace,
    paths: Arc<PathMapper>,
    failed: Arc<Mutex<FailedTestIndex>>,
    events: Arc<EventChannel>,
    updater: ReferenceUpdater,
    selection: TestSelection,
    tests: RwLock<TestCollection>,
    state: Mutex<RunState>,
}

impl App {
    pub fn new(
        engine: Arc<dyn TestEngine>,
        recompressor: Arc<dyn Recompressor>,
        options: AppOptions,
    ) -> Self {
        let reference_dirs = engine
            .browser_ids()
            .into_iter()
            .filter_map(|id| engine.screenshots_dir(&id).map(|dir| (id, dir)))
            .collect();
        let paths = Arc::new(PathMapper::new(
            reference_dirs,
            &options.current_dir,
            &options.diff_dir,
        ));
        let failed = Arc::new(Mutex::new(FailedTestIndex::new()));
        let updater = ReferenceUpdater::new(failed.clone(), paths.clone(), recompressor);

        Self {
            engine,
            workspace: TempWorkspace::new(options.current_dir, options.diff_dir),
            paths,
            failed,
            events: Arc::new(EventChannel::new(options.event_buffer)),
            updater,
            selection: options.selection,
            tests: RwLock::new(TestCollection::default()),
            state: Mutex::new(RunState::Uninitialized),
        }
    }

    /// Prepare the workspace and load the browser-filtered test tree.
    pub async fn initialize(&self) -> Result<()> {
        self.transition(RunState::Uninitialized, RunState::Initializing)?;

        match self.load_tests().await {
            Ok(collection) => {
                info!("Loaded {} test(s)", collection.test_count());
                *self.tests.write() = collection;
                *self.state.lock() = RunState::Ready;
                Ok(())
            }
            Err(e) => {
                *self.state.lock() = RunState::Uninitialized;
                Err(e)
            }
        }
    }

    async fn load_tests(&self) -> Result<TestCollection> {
        self.workspace.recreate().await?;
        let mut collection = self.engine.read_tests(&self.selection).await?;

        if !self.selection.browsers.is_empty() {
            let browsers =
                BrowserSelection::resolve(&self.engine.browser_ids(), &self.selection.browsers);
            if let Some(warning) = browsers.warning() {
                warn!("{}", warning);
            }
            for suite in collection.top_level_suites_mut() {
                suite.retain_browsers(&browsers.effective);
            }
        }

        Ok(collection)
    }

    /// Run all loaded tests, or only `tests` when given.
    ///
    /// The app must be `Ready`, so a call before initialization, after
    /// termination or during another run fails with `InvalidStateTransition`.
    /// A run with failing tests still succeeds; only engine errors are returned.
    pub async fn run(&self, tests: Option<Vec<TestDescriptor>>) -> Result<()> {
        self.transition(RunState::Ready, RunState::Running)?;

        let runner = Runner::from_request(tests);
        if runner.is_all() {
            self.failed.lock().clear();
        }
        let collection = self.tests.read().clone();

        let reporter = ViewerReporter::new(self);
        let result = runner
            .run(self.engine.as_ref(), &collection, &reporter)
            .await;
        self.finish_run();

        if let Err(e) = &result {
            error!("Run failed: {}", e);
            self.events.emit(ViewerEvent::new(
                EventKind::Error,
                json!({ "message": e.to_string() }),
            ));
        }
        result
    }

    fn finish_run(&self) {
        let mut state = self.state.lock();
        if *state == RunState::Running {
            *state = RunState::Ready;
        }
    }

    pub fn add_failed_test(&self, result: TestResult) {
        self.failed.lock().add(result);
    }

    /// Record a failure and broadcast `event` while holding the index lock, so
    /// viewers never see an outcome that a concurrent accept cannot find yet.
    pub fn record_failure(&self, result: TestResult, event: ViewerEvent) {
        let mut failed = self.failed.lock();
        failed.add(result);
        self.events.emit(event);
    }

    /// Record a capture without reference, attaching where its reference belongs
    pub fn add_no_reference_test(&self, missing: MissingReference) -> Result<TestResult> {
        let result = self.no_reference_result(missing)?;
        self.add_failed_test(result.clone());
        Ok(result)
    }

    /// The failure record of a capture without reference
    pub fn no_reference_result(&self, missing: MissingReference) -> Result<TestResult> {
        let reference_path = self.engine.screenshot_path(&missing.test)?;
        Ok(TestResult {
            test: missing.test,
            reference_path,
            current_path: missing.current_path,
            equal: false,
        })
    }

    pub fn find_failed_test(&self, test: &TestDescriptor) -> Option<TestResult> {
        self.failed.lock().find(test).cloned()
    }

    /// Write the diff image of `failure` into the diff workspace and return its URL
    pub async fn build_diff_image(&self, failure: &TestResult) -> Result<String> {
        let dest = self
            .workspace
            .diff_dir()
            .join(format!("{}.png", Uuid::new_v4()));
        self.engine.save_diff(failure, &dest).await?;
        self.paths.diff_url(&dest)
    }

    /// Accept the current capture of a failed test as its reference
    pub async fn update_reference_image(&self, test: &TestDescriptor) -> Result<AcceptedReference> {
        self.updater.update_reference(test).await
    }

    pub fn get_tests(&self) -> TestCollection {
        self.tests.read().clone()
    }

    pub fn state(&self) -> RunState {
        *self.state.lock()
    }

    pub fn terminate(&self) {
        *self.state.lock() = RunState::Terminated;
    }

    pub fn events(&self) -> &EventChannel {
        &self.events
    }

    pub fn paths(&self) -> &PathMapper {
        &self.paths
    }

    pub fn current_dir(&self) -> &Path {
        self.workspace.current_dir()
    }

    pub fn diff_dir(&self) -> &Path {
        self.workspace.diff_dir()
    }

    fn transition(&self, from: RunState, to: RunState) -> Result<()> {
        let mut state = self.state.lock();
        if *state != from {
            return Err(Error::InvalidStateTransition {
                from: state.to_string(),
                to: to.to_string(),
            });
        }
        *state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_selection_is_intersection_in_config_order() {
        let selection = BrowserSelection::resolve(
            &ids(&["chrome", "firefox", "safari"]),
            &ids(&["safari", "chrome"]),
        );
        assert_eq!(selection.effective, ids(&["chrome", "safari"]));
        assert!(selection.unknown.is_empty());
        assert_eq!(selection.warning(), None);
    }

    #[test]
    fn test_unknown_browsers_are_reported_not_selected() {
        let selection = BrowserSelection::resolve(
            &ids(&["chrome", "firefox"]),
            &ids(&["chrome", "opera", "ie6"]),
        );
        assert_eq!(selection.effective, ids(&["chrome"]));
        assert_eq!(selection.unknown, ids(&["opera", "ie6"]));

        let warning = selection.warning().unwrap();
        assert!(warning.contains("opera, ie6"));
        assert!(warning.contains("chrome, firefox"));
    }

    #[test]
    fn test_all_unknown_selects_nothing() {
        let selection = BrowserSelection::resolve(&ids(&["chrome"]), &ids(&["opera"]));
        assert!(selection.effective.is_empty());
        assert!(selection.warning().is_some());
    }
}
