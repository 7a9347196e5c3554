//! Run selection: the whole collection or a chosen subset of tests

use std::collections::HashSet;
use tracing::info;

use shotdiff_common::{Result, Suite, TestCollection, TestDescriptor};

use crate::engine::{Reporter, TestEngine};

/// What a run executes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Runner {
    /// Every loaded test
    All,
    /// Only the listed tests; unknown ones are ignored
    Specific(Vec<TestDescriptor>),
}

impl Runner {
    /// `None` or an empty list runs everything
    pub fn from_request(tests: Option<Vec<TestDescriptor>>) -> Self {
        match tests {
            Some(tests) if !tests.is_empty() => Runner::Specific(tests),
            _ => Runner::All,
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Runner::All)
    }

    /// The part of `collection` this runner executes
    pub fn select(&self, collection: &TestCollection) -> TestCollection {
        match self {
            Runner::All => collection.clone(),
            Runner::Specific(tests) => {
                let wanted: HashSet<&TestDescriptor> = tests.iter().collect();
                let suites = collection
                    .top_level_suites()
                    .iter()
                    .filter_map(|suite| narrow(suite, &wanted))
                    .collect();
                TestCollection::new(suites)
            }
        }
    }

    pub async fn run(
        &self,
        engine: &dyn TestEngine,
        collection: &TestCollection,
        reporter: &dyn Reporter,
    ) -> Result<()> {
        let selected = self.select(collection);
        info!("Running {} test(s)", selected.test_count());
        engine.test(&selected, reporter).await
    }
}

/// Keep the states and browsers of `suite` that some wanted test refers to.
/// Returns `None` when nothing in the subtree is wanted.
fn narrow(suite: &Suite, wanted: &HashSet<&TestDescriptor>) -> Option<Suite> {
    let is_wanted = |state: &str, browser: &str| {
        wanted.iter().any(|t| {
            t.suite_path == suite.path && t.state_name == state && t.browser_id == browser
        })
    };

    let states: Vec<_> = suite
        .states
        .iter()
        .filter(|state| suite.browsers.iter().any(|b| is_wanted(&state.name, b)))
        .cloned()
        .collect();
    let browsers: Vec<_> = suite
        .browsers
        .iter()
        .filter(|b| states.iter().any(|state| is_wanted(&state.name, b)))
        .cloned()
        .collect();
    let children: Vec<_> = suite
        .children
        .iter()
        .filter_map(|child| narrow(child, wanted))
        .collect();

    if states.is_empty() && children.is_empty() {
        return None;
    }

    Some(Suite {
        name: suite.name.clone(),
        path: suite.path.clone(),
        states,
        browsers,
        children,
    })
}
