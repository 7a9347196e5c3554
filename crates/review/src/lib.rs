//! shotdiff review core
//!
//! Orchestrates an interactive visual-regression review session around an
//! external test engine:
//! - stages current captures and diff images in ephemeral directories
//! - streams run progress to connected viewers
//! - indexes failing tests and accepts their captures as new references
//! - maps staged artifacts to cache-busted viewer URLs
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  App                                                        │
//! │    ├── initialize()  -> TempWorkspace::recreate,            │
//! │    │                    TestEngine::read_tests,             │
//! │    │                    browser filtering                   │
//! │    ├── run(tests?)   -> Runner -> TestEngine::test          │
//! │    │                    └── ViewerReporter                  │
//! │    │                          ├── FailedTestIndex           │
//! │    │                          └── EventChannel -> viewers   │
//! │    ├── build_diff_image()     -> TestEngine::save_diff      │
//! │    └── update_reference_image() -> ReferenceUpdater         │
//! │                                     └── Recompressor        │
//! │  PathMapper: /ref/<browser>, /curr, /diff                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod app;
pub mod engine;
pub mod events;
pub mod failed;
pub mod paths;
pub mod process;
pub mod reference;
pub mod reporter;
pub mod runner;
pub mod workspace;

pub use app::{App, AppOptions, BrowserSelection};
pub use engine::{EngineEvent, Reporter, TestEngine};
pub use events::{EventChannel, EventKind, ViewerEvent};
pub use failed::FailedTestIndex;
pub use paths::PathMapper;
pub use process::ProcessEngine;
pub use reference::{AcceptedReference, Optipng, Recompressor, ReferenceUpdater};
pub use runner::Runner;
pub use workspace::TempWorkspace;
