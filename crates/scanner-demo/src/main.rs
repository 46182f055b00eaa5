//! Scanner Demo - Main Entry Point

use anyhow::Result;
use diag_advisor::{Advisor, LocalAdvisor};
use scanner_demo::{init_logging, print_report, run_demo};
use session_engine::{DiagnosticEngine, EngineConfig, VehicleContext};
use std::path::PathBuf;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = EngineConfig::load(config_path.as_deref())?;
    init_logging(&config.log_level)?;

    info!("=== Scanner Demo v{} ===", env!("CARGO_PKG_VERSION"));

    let engine = DiagnosticEngine::simulated(config)?;
    let advisor = Advisor::new(LocalAdvisor);
    let report = run_demo(&engine, &advisor, VehicleContext::new("Volkswagen", "Gol", 2014)).await?;
    print_report(&report)?;

    info!("Session closed");
    Ok(())
}
