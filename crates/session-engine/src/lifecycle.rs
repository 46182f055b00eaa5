//! Connection Lifecycle Controller
//!
//! Drives a session through LINKING, PROTOCOL_INIT and ECU_SYNC to READY.
//! Each step waits its delay, exchanges its commands with the adapter, then
//! commits the traffic and the transition in one locked update. A step whose
//! session generation has been superseded is dropped without effect.

use crate::config::EngineConfig;
use crate::sampler::{run_sampler, TelemetrySampler};
use crate::session::{Shared, StepOutcome};
use crate::state::SessionState;
use obd_protocol::{handshake, Adapter, ObdError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One timed handshake step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeStep {
    /// State the step runs in
    pub state: SessionState,
    /// Wait before the exchanges
    pub delay: Duration,
    /// Adapter commands sent, in order
    pub commands: Vec<&'static str>,
}

/// Handshake steps for the given timing
pub fn handshake_plan(config: &EngineConfig) -> Vec<HandshakeStep> {
    vec![
        HandshakeStep {
            state: SessionState::Linking,
            delay: Duration::from_millis(config.pairing_delay_ms),
            commands: vec![handshake::PAIRING_PROBE],
        },
        HandshakeStep {
            state: SessionState::ProtocolInit,
            delay: Duration::from_millis(config.protocol_init_delay_ms),
            commands: handshake::init_sequence().to_vec(),
        },
        HandshakeStep {
            state: SessionState::EcuSync,
            delay: Duration::from_millis(config.ecu_sync_delay_ms),
            commands: vec![handshake::ECU_IDENTIFY],
        },
    ]
}

/// Everything the background task of one session needs
pub(crate) struct SessionTask {
    pub(crate) shared: Arc<Shared>,
    pub(crate) generation: u64,
    pub(crate) adapter: Arc<dyn Adapter>,
    pub(crate) sampler: Arc<Mutex<TelemetrySampler>>,
    pub(crate) config: EngineConfig,
}

/// Run the handshake, then sample until the session ends
pub(crate) async fn drive_session(task: SessionTask) {
    if run_handshake(&task).await {
        run_sampler(&task).await;
    }
    debug!("Session task for generation {} finished", task.generation);
}

/// Returns true once the session is READY
async fn run_handshake(task: &SessionTask) -> bool {
    for step in handshake_plan(&task.config) {
        tokio::time::sleep(step.delay).await;
        if !task.shared.is_current(task.generation) {
            debug!("Handshake timer for ended session ignored");
            return false;
        }

        let (exchanges, failure) = exchange_all(task.adapter.as_ref(), &step.commands);
        match task
            .shared
            .commit_step(task.generation, step.state, &exchanges, failure)
        {
            StepOutcome::Advanced(SessionState::Ready) => {
                info!("Session ready via {}", task.adapter.name());
                return true;
            }
            StepOutcome::Advanced(_) => {}
            StepOutcome::Failed | StepOutcome::Stale => return false,
        }
    }
    false
}

/// Send commands in order, stopping at the first failure
fn exchange_all(
    adapter: &dyn Adapter,
    commands: &[&str],
) -> (Vec<(String, String)>, Option<(String, ObdError)>) {
    let mut exchanges = Vec::with_capacity(commands.len());
    for command in commands {
        match adapter.exchange(command) {
            Ok(response) => exchanges.push((command.to_string(), response)),
            Err(err) => {
                warn!("{} failed on {}: {}", adapter.name(), command, err);
                return (exchanges, Some((command.to_string(), err)));
            }
        }
    }
    (exchanges, None)
}
