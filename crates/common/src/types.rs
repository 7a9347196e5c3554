//! Core types for shotdiff

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Identifies one screenshot test: a state of a suite captured in one browser.
///
/// Equality and hashing are by value over all three fields. Viewers send this
/// back as JSON, so lookups never depend on the identity of an in-memory object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDescriptor {
    pub suite_path: Vec<String>,
    pub state_name: String,
    pub browser_id: String,
}

impl TestDescriptor {
    pub fn new(
        suite_path: impl IntoIterator<Item = impl Into<String>>,
        state_name: impl Into<String>,
        browser_id: impl Into<String>,
    ) -> Self {
        Self {
            suite_path: suite_path.into_iter().map(Into::into).collect(),
            state_name: state_name.into(),
            browser_id: browser_id.into(),
        }
    }
}

impl fmt::Display for TestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} [{}]",
            self.suite_path.join("/"),
            self.state_name,
            self.browser_id
        )
    }
}

/// Outcome of one screenshot test as reported by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    #[serde(flatten)]
    pub test: TestDescriptor,
    pub reference_path: PathBuf,
    pub current_path: PathBuf,
    #[serde(default)]
    pub equal: bool,
}

/// A screenshotted state inside a suite
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    pub name: String,
    #[serde(default)]
    pub skipped: bool,
}

/// A node of the suite tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suite {
    pub name: String,
    /// Names from the top-level suite down to this one, inclusive
    pub path: Vec<String>,
    #[serde(default)]
    pub states: Vec<State>,
    #[serde(default)]
    pub browsers: Vec<String>,
    #[serde(default)]
    pub children: Vec<Suite>,
}

impl Suite {
    /// Keep only the browsers contained in `allowed`, in this suite and all of its children.
    pub fn retain_browsers(&mut self, allowed: &[String]) {
        self.browsers.retain(|b| allowed.contains(b));
        for child in &mut self.children {
            child.retain_browsers(allowed);
        }
    }

    /// Number of (state, browser) pairs in this subtree, skipped states excluded
    pub fn test_count(&self) -> usize {
        let own = self.states.iter().filter(|s| !s.skipped).count() * self.browsers.len();
        own + self.children.iter().map(Suite::test_count).sum::<usize>()
    }
}

/// The loaded set of suites
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCollection {
    pub suites: Vec<Suite>,
}

impl TestCollection {
    pub fn new(suites: Vec<Suite>) -> Self {
        Self { suites }
    }

    pub fn top_level_suites(&self) -> &[Suite] {
        &self.suites
    }

    pub fn top_level_suites_mut(&mut self) -> &mut [Suite] {
        &mut self.suites
    }

    pub fn test_count(&self) -> usize {
        self.suites.iter().map(Suite::test_count).sum()
    }
}

/// Lifecycle of the review application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Uninitialized,
    Initializing,
    Ready,
    Running,
    Terminated,
}

impl Default for RunState {
    fn default() -> Self {
        Self::Uninitialized
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Uninitialized => write!(f, "uninitialized"),
            RunState::Initializing => write!(f, "initializing"),
            RunState::Ready => write!(f, "ready"),
            RunState::Running => write!(f, "running"),
            RunState::Terminated => write!(f, "terminated"),
        }
    }
}

/// Which tests to load from the engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSelection {
    #[serde(default)]
    pub files: Vec<PathBuf>,
    #[serde(default)]
    pub grep: Option<String>,
    #[serde(default)]
    pub browsers: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suite(name: &str, browsers: &[&str], children: Vec<Suite>) -> Suite {
        Suite {
            name: name.to_string(),
            path: vec![name.to_string()],
            states: vec![
                State { name: "plain".into(), skipped: false },
                State { name: "hovered".into(), skipped: true },
            ],
            browsers: browsers.iter().map(|b| b.to_string()).collect(),
            children,
        }
    }

    #[test]
    fn test_descriptor_json_is_camel_case() {
        let test = TestDescriptor::new(["header", "logo"], "plain", "chrome");
        let json = serde_json::to_value(&test).unwrap();
        assert_eq!(json["suitePath"][1], "logo");
        assert_eq!(json["stateName"], "plain");
        assert_eq!(json["browserId"], "chrome");
    }

    #[test]
    fn test_result_flattens_descriptor() {
        let json = r#"{
            "suitePath": ["header"],
            "stateName": "plain",
            "browserId": "firefox",
            "referencePath": "/refs/header/plain/firefox.png",
            "currentPath": "/tmp/curr/abc.png"
        }"#;
        let result: TestResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.test, TestDescriptor::new(["header"], "plain", "firefox"));
        assert!(!result.equal);
    }

    #[test]
    fn test_retain_browsers_is_recursive() {
        let mut root = suite("root", &["chrome", "ie8"], vec![suite("child", &["ie8", "firefox"], vec![])]);
        root.retain_browsers(&["chrome".to_string(), "firefox".to_string()]);
        assert_eq!(root.browsers, vec!["chrome"]);
        assert_eq!(root.children[0].browsers, vec!["firefox"]);
    }

    #[test]
    fn test_count_skips_skipped_states() {
        let collection = TestCollection::new(vec![suite(
            "root",
            &["chrome", "firefox"],
            vec![suite("child", &["chrome"], vec![])],
        )]);
        assert_eq!(collection.test_count(), 3);
    }

    #[test]
    fn test_descriptor_display() {
        let test = TestDescriptor::new(["a", "b"], "c", "chrome");
        assert_eq!(test.to_string(), "a/b/c [chrome]");
    }
}
