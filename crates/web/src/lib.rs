//! shotdiff viewer server
//!
//! Serves the review viewer: the test tree, run control, reference
//! acceptance and a live event stream over WebSocket.

pub mod server;
pub mod static_files;

pub use server::WebServer;
