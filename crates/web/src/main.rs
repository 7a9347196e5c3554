//! shotdiff
//!
//! Loads the screenshot tests, serves the review viewer and runs tests on demand.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use shotdiff_common::config::DEFAULT_ENGINE_CONFIG;
use shotdiff_common::{ReviewConfig, TestSelection};
use shotdiff_review::{App, AppOptions, Optipng, ProcessEngine};
use shotdiff_web::WebServer;

#[derive(Parser)]
#[command(name = "shotdiff")]
#[command(about = "Review failed screenshot tests and accept new references")]
#[command(version)]
struct Cli {
    /// Test files to load
    files: Vec<PathBuf>,

    /// Engine configuration file
    #[arg(short, long, default_value = DEFAULT_ENGINE_CONFIG)]
    config: PathBuf,

    /// Only run tests matching this regular expression
    #[arg(short, long)]
    grep: Option<String>,

    /// Only run in these browsers
    #[arg(short, long = "browser")]
    browsers: Vec<String>,

    /// Host to bind the viewer to
    #[arg(long, env = "SHOTDIFF_HOSTNAME")]
    hostname: Option<String>,

    /// Port to bind the viewer to
    #[arg(short, long, env = "SHOTDIFF_PORT")]
    port: Option<u16>,

    /// Start running tests right after loading them
    #[arg(short, long)]
    auto_run: bool,

    /// Test engine executable
    #[arg(long, env = "SHOTDIFF_ENGINE")]
    engine: Option<PathBuf>,

    /// PNG recompression executable
    #[arg(long, env = "SHOTDIFF_COMPRESSOR")]
    compressor: Option<PathBuf>,

    /// Settings file
    #[arg(long, default_value = "shotdiff.toml")]
    settings: PathBuf,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl Cli {
    fn apply(&self, config: &mut ReviewConfig) {
        if let Some(hostname) = &self.hostname {
            config.hostname = hostname.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if self.auto_run {
            config.auto_run = true;
        }
        if let Some(engine) = &self.engine {
            config.engine.binary = engine.clone();
        }
        if let Some(compressor) = &self.compressor {
            config.compressor.binary = compressor.clone();
        }
        config.engine.config_path = self.config.clone();
    }

    fn selection(&self) -> TestSelection {
        TestSelection {
            files: self.files.clone(),
            grep: self.grep.clone(),
            browsers: self.browsers.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("shotdiff v{}", env!("CARGO_PKG_VERSION"));

    let mut config = ReviewConfig::load(&cli.settings)?;
    cli.apply(&mut config);

    let current_dir = config.current_dir();
    let engine = ProcessEngine::new(&config.engine, &current_dir)?;
    let app = Arc::new(App::new(
        Arc::new(engine),
        Arc::new(Optipng::new(&config.compressor.binary)),
        AppOptions {
            current_dir,
            diff_dir: config.diff_dir(),
            selection: cli.selection(),
            event_buffer: config.event_buffer,
        },
    ));

    app.initialize().await?;

    let addr = resolve(&config.hostname, config.port).await?;
    let server = WebServer::new(app.clone(), config.auto_run);
    if config.auto_run && !server.start_run(None) {
        warn!("Auto-run skipped, app is {}", app.state());
    }

    let shutdown_app = app.clone();
    server
        .serve(addr, async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
            shutdown_app.terminate();
        })
        .await
}

async fn resolve(hostname: &str, port: u16) -> anyhow::Result<SocketAddr> {
    tokio::net::lookup_host((hostname, port))
        .await?
        .next()
        .ok_or_else(|| anyhow::anyhow!("cannot resolve {}:{}", hostname, port))
}
