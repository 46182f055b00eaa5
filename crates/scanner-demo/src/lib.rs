//! Scanner Demo
//!
//! Walks one simulated diagnostic session end to end: handshake, telemetry
//! with the engine off and on, a trouble-code scan and its explanation.

use anyhow::{bail, Context, Result};
use diag_advisor::{Advisor, DiagnosticAdvisor, Explanation};
use session_engine::{DecodedSample, DiagnosticEngine, SessionState, VehicleContext};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Extra wait on top of the nominal handshake time before giving up
const READY_GRACE: Duration = Duration::from_secs(5);

/// Initialize logging at the given level name, defaulting to INFO
pub fn init_logging(level: &str) -> Result<()> {
    let level = level.parse::<Level>().unwrap_or_else(|_| {
        eprintln!("Unknown log level {level:?}, using info");
        Level::INFO
    });
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// What the walkthrough observed
#[derive(Debug)]
pub struct DemoReport {
    /// Samples read with the engine off
    pub engine_off: Vec<DecodedSample>,
    /// Samples read with the engine running
    pub engine_on: Vec<DecodedSample>,
    /// Traffic log at the end of the session, oldest first
    pub traffic: Vec<(String, String)>,
    /// Explanation of the recorded fault, if the advisor answered
    pub explanation: Option<Explanation>,
    /// Workshop tip for the most probable cause
    pub tip: Option<String>,
}

/// Wait until the session reaches READY or fails
pub async fn wait_until_ready(engine: &DiagnosticEngine) -> Result<()> {
    let mut state_rx = engine.subscribe_state();
    let limit = engine.config().handshake_duration() + READY_GRACE;

    let reached = timeout(limit, async {
        loop {
            let state = *state_rx.borrow_and_update();
            match state {
                SessionState::Ready | SessionState::Error => return state,
                _ => {}
            }
            if state_rx.changed().await.is_err() {
                return SessionState::Error;
            }
        }
    })
    .await
    .context("Timed out waiting for the session to become ready")?;

    if reached == SessionState::Error {
        bail!(
            "Handshake failed: {}",
            engine.last_error().unwrap_or_else(|| "unknown".into())
        );
    }
    Ok(())
}

/// Run the walkthrough on `engine`, leaving it IDLE afterwards
pub async fn run_demo<A: DiagnosticAdvisor>(
    engine: &DiagnosticEngine,
    advisor: &Advisor<A>,
    vehicle: VehicleContext,
) -> Result<DemoReport> {
    engine.set_vehicle(Some(vehicle))?;
    let session = engine.start_session()?;
    info!("Session {} linking", session.id);

    let result = walkthrough(engine, advisor).await;
    engine.end_session();
    result
}

async fn walkthrough<A: DiagnosticAdvisor>(
    engine: &DiagnosticEngine,
    advisor: &Advisor<A>,
) -> Result<DemoReport> {
    wait_until_ready(engine).await?;
    let period = engine.config().sample_period();

    engine.set_engine_running(false);
    sleep(period + period / 4).await;
    let engine_off = engine.latest_samples();

    engine.set_engine_running(true);
    sleep(period).await;
    let engine_on = engine.latest_samples();

    let scan = engine.run_scan()?;
    info!("Scan result: {:?}", scan);

    let (explanation, tip) = match engine.current_fault() {
        Some(fault) => {
            let explanation = advisor.explain(&fault.code).await;
            let part = explanation
                .as_ref()
                .and_then(|e| e.ranked_causes().first().map(|c| c.part.clone()));
            let tip = match part {
                Some(part) => Some(advisor.tip(&fault.code, &part).await),
                None => {
                    warn!("No probable cause to ask about for {}", fault.code);
                    None
                }
            };
            (explanation, tip)
        }
        None => (None, None),
    };

    let traffic = engine
        .traffic()
        .into_iter()
        .map(|e| (e.command, e.response))
        .collect();

    Ok(DemoReport {
        engine_off,
        engine_on,
        traffic,
        explanation,
        tip,
    })
}

/// Print the report to stdout
pub fn print_report(report: &DemoReport) -> Result<()> {
    println!("--- Traffic log ---");
    for (command, response) in &report.traffic {
        println!("> {command:<8} < {response}");
    }
    println!("--- Engine off ---");
    println!("{}", serde_json::to_string_pretty(&report.engine_off)?);
    println!("--- Engine on ---");
    println!("{}", serde_json::to_string_pretty(&report.engine_on)?);
    if let Some(explanation) = &report.explanation {
        println!("--- {} ---", explanation.code);
        println!("{}", explanation.explanation);
        for step in &explanation.repair_steps {
            println!("  * {step}");
        }
    }
    if let Some(tip) = &report.tip {
        println!("Tip: {tip}");
    }
    Ok(())
}
