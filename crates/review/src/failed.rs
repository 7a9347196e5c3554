//! Index of failing tests, keyed by (suite path, state name, browser id)

use std::collections::HashMap;

use shotdiff_common::{TestDescriptor, TestResult};

/// Latest failing result per test
///
/// Keys are plain values, so a descriptor deserialized from a viewer request
/// finds the entry recorded from the engine's report. A repeated failure of the
/// same test replaces the earlier one.
#[derive(Debug, Default)]
pub struct FailedTestIndex {
    entries: HashMap<TestDescriptor, TestResult>,
}

impl FailedTestIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the entry for `result.test`
    pub fn add(&mut self, result: TestResult) {
        self.entries.insert(result.test.clone(), result);
    }

    pub fn find(&self, test: &TestDescriptor) -> Option<&TestResult> {
        self.entries.get(test)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
