//! Turns engine outcomes into viewer events and failure records

use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use shotdiff_common::{Result, TestResult};

use crate::app::App;
use crate::engine::{EngineEvent, Reporter};
use crate::events::{EventKind, ViewerEvent};

/// Reporter attached to a run of an [`App`]
pub struct ViewerReporter<'a> {
    app: &'a App,
}

#[derive(Serialize)]
struct ResultPayload<'a> {
    #[serde(flatten)]
    result: &'a TestResult,
    #[serde(rename = "referenceURL", skip_serializing_if = "Option::is_none")]
    reference_url: Option<String>,
    #[serde(rename = "currentURL", skip_serializing_if = "Option::is_none")]
    current_url: Option<String>,
}

impl<'a> ViewerReporter<'a> {
    pub fn new(app: &'a App) -> Self {
        Self { app }
    }

    fn payload<'r>(&self, result: &'r TestResult, with_reference: bool) -> ResultPayload<'r> {
        let paths = self.app.paths();
        let reference_url = if with_reference {
            url(paths.ref_url(&result.reference_path, &result.test.browser_id))
        } else {
            None
        };
        ResultPayload {
            result,
            reference_url,
            current_url: url(paths.current_url(&result.current_path)),
        }
    }

    fn emit(&self, event: ViewerEvent) {
        self.app.events().emit(event);
    }
}

impl Reporter for ViewerReporter<'_> {
    fn report(&self, event: EngineEvent) {
        match event {
            EngineEvent::Begin { total } => {
                self.emit(ViewerEvent::new(EventKind::Begin, json!({ "total": total })));
            }
            EngineEvent::SuiteBegin { suite_path } => {
                self.emit(ViewerEvent::new(EventKind::SuiteBegin, json!({ "suitePath": suite_path })));
            }
            EngineEvent::SuiteEnd { suite_path } => {
                self.emit(ViewerEvent::new(EventKind::SuiteEnd, json!({ "suitePath": suite_path })));
            }
            EngineEvent::StateBegin(test) => {
                self.emit(ViewerEvent::with(EventKind::TestBegin, &test));
            }
            EngineEvent::Skip(test) => {
                self.emit(ViewerEvent::with(EventKind::Skip, &test));
            }
            EngineEvent::TestResult(result) => {
                let event = ViewerEvent::with(EventKind::TestEnd, &self.payload(&result, true));
                if result.equal {
                    self.emit(event);
                } else {
                    self.app.record_failure(result, event);
                }
            }
            EngineEvent::NoReference(missing) => match self.app.no_reference_result(missing) {
                Ok(result) => {
                    let event = ViewerEvent::with(EventKind::NoReference, &self.payload(&result, false));
                    self.app.record_failure(result, event);
                }
                Err(e) => {
                    warn!("Cannot record missing reference: {}", e);
                    self.emit(ViewerEvent::new(EventKind::Error, json!({ "message": e.to_string() })));
                }
            },
            EngineEvent::Warning { message } => {
                warn!("{}", message);
                self.emit(ViewerEvent::new(EventKind::Warning, json!({ "message": message })));
            }
            EngineEvent::Error(failure) => {
                warn!("Test error: {}", failure.message);
                self.emit(ViewerEvent::with(EventKind::Error, &failure));
            }
            EngineEvent::End => {
                self.emit(ViewerEvent::new(EventKind::End, serde_json::Value::Null));
            }
        }
    }
}

fn url(result: Result<String>) -> Option<String> {
    match result {
        Ok(url) => Some(url),
        Err(e) => {
            debug!("No URL for artifact: {}", e);
            None
        }
    }
}
