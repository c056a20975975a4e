//! taketrack: terminal voice-over recorder.

mod app;
mod commands;
mod config;
mod document;
mod logging;
mod recording;
mod session;
mod timing;
mod ui;

#[tokio::main]
async fn main() {
    if let Err(e) = app::run().await {
        tracing::error!("Fatal: {:#}", e);
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
