//! Per-session data and the single writer lock guarding it

use crate::error::SessionError;
use crate::sampler::{DecodedSample, SampleTick};
use crate::state::SessionState;
use dtc_registry::{DiagnosticTroubleCode, DtcRegistry};
use obd_protocol::ObdError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::AtomicBool;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use traffic_log::{TrafficEntry, TrafficLog};
use uuid::Uuid;

/// Oldest and newest model years the garage accepts
const MODEL_YEARS: std::ops::RangeInclusive<u16> = 1970..=2025;

/// Vehicle the session is annotated with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleContext {
    pub make: String,
    pub model: String,
    pub year: u16,
}

impl VehicleContext {
    /// Create a vehicle annotation
    pub fn new(make: impl Into<String>, model: impl Into<String>, year: u16) -> Self {
        Self {
            make: make.into(),
            model: model.into(),
            year,
        }
    }

    /// Reject blank names and model years outside 1970..=2025
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.make.trim().is_empty() || self.model.trim().is_empty() {
            return Err(SessionError::InvalidVehicle("make and model are required".into()));
        }
        if !MODEL_YEARS.contains(&self.year) {
            return Err(SessionError::InvalidVehicle(format!(
                "model year {} outside {}..={}",
                self.year,
                MODEL_YEARS.start(),
                MODEL_YEARS.end()
            )));
        }
        Ok(())
    }
}

impl fmt::Display for VehicleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.make, self.model, self.year)
    }
}

/// Identity of one diagnostic session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Unique session id
    pub id: Uuid,
    /// Vehicle annotation, if the caller supplied one
    pub vehicle: Option<VehicleContext>,
    /// Start time (Unix ms)
    pub started_at_ms: u64,
}

impl SessionInfo {
    fn new(vehicle: Option<VehicleContext>) -> Self {
        Self {
            id: Uuid::new_v4(),
            vehicle,
            started_at_ms: traffic_log::unix_time_ms(),
        }
    }
}

/// Notifications published to observers
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Session state changed
    StateChanged { from: SessionState, to: SessionState },
    /// An exchange was added to the traffic log
    Traffic(TrafficEntry),
    /// A new telemetry sample set replaced the previous one
    Telemetry(Vec<DecodedSample>),
    /// A scan recorded a fault
    FaultRecorded(DiagnosticTroubleCode),
    /// The fault registry was cleared
    FaultsCleared,
}

/// Mutable state of the current session
pub(crate) struct SessionCore {
    /// Current lifecycle state
    pub(crate) state: SessionState,
    /// Bumped on every start and end; timers compare against it
    pub(crate) generation: u64,
    /// Current session identity
    pub(crate) session: Option<SessionInfo>,
    /// Exchanges of the current session
    pub(crate) traffic: TrafficLog,
    /// Scan result of the current session
    pub(crate) dtc: DtcRegistry,
    /// Latest sample per PID
    pub(crate) samples: BTreeMap<String, DecodedSample>,
    /// Reason the session entered ERROR
    pub(crate) last_error: Option<String>,
}

impl SessionCore {
    fn new(traffic_capacity: usize) -> Self {
        Self {
            state: SessionState::Idle,
            generation: 0,
            session: None,
            traffic: TrafficLog::new(traffic_capacity),
            dtc: DtcRegistry::new(),
            samples: BTreeMap::new(),
            last_error: None,
        }
    }

    /// Whether a timer scheduled for `generation` may still act
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }
}

/// Result of committing one handshake step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StepOutcome {
    /// State advanced to the given state
    Advanced(SessionState),
    /// The step failed and the session is in ERROR
    Failed,
    /// The step belonged to an ended session and was dropped
    Stale,
}

/// State shared between the engine handle and its session task
pub(crate) struct Shared {
    pub(crate) core: Mutex<SessionCore>,
    pub(crate) engine_running: AtomicBool,
    state_tx: watch::Sender<SessionState>,
    events: broadcast::Sender<EngineEvent>,
}

impl Shared {
    pub(crate) fn new(traffic_capacity: usize, event_capacity: usize) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        let (events, _) = broadcast::channel(event_capacity);
        Self {
            core: Mutex::new(SessionCore::new(traffic_capacity)),
            engine_running: AtomicBool::new(false),
            state_tx,
            events,
        }
    }

    pub(crate) fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub(crate) fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: EngineEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    /// Apply one legal transition and publish it
    pub(crate) fn set_state(&self, core: &mut SessionCore, to: SessionState) -> Result<(), SessionError> {
        let from = core.state;
        if !from.can_transition_to(to) {
            warn!("Rejected session transition {} -> {}", from, to);
            return Err(SessionError::InvalidTransition { from, to });
        }
        core.state = to;
        info!("Session state {} -> {}", from, to);
        self.state_tx.send_replace(to);
        self.emit(EngineEvent::StateChanged { from, to });
        Ok(())
    }

    pub(crate) fn append_traffic(&self, core: &mut SessionCore, command: &str, response: &str) {
        let entry = core.traffic.append(command, response);
        self.emit(EngineEvent::Traffic(entry));
    }

    /// Open a new session: fresh buffers, new generation, LINKING
    pub(crate) fn begin(
        &self,
        traffic_capacity: usize,
        vehicle: Option<VehicleContext>,
    ) -> Result<(u64, SessionInfo), SessionError> {
        let mut core = self.core.lock();
        if core.state != SessionState::Idle {
            warn!("start_session rejected: session already {}", core.state);
            return Err(SessionError::AlreadyActive(core.state));
        }

        core.generation += 1;
        core.traffic = TrafficLog::new(traffic_capacity);
        core.dtc.clear();
        core.samples.clear();
        core.last_error = None;
        let info = SessionInfo::new(vehicle);
        core.session = Some(info.clone());
        self.set_state(&mut core, SessionState::Linking)?;
        Ok((core.generation, info))
    }

    /// Tear the session down to IDLE and invalidate its timers.
    ///
    /// Returns false if there was nothing to end.
    pub(crate) fn end(&self) -> bool {
        let mut core = self.core.lock();
        if core.state == SessionState::Idle {
            return false;
        }

        core.generation += 1;
        core.traffic.clear();
        core.dtc.clear();
        core.samples.clear();
        core.session = None;
        core.last_error = None;
        let idled = self.set_state(&mut core, SessionState::Idle);
        debug_assert!(idled.is_ok(), "{} must be able to return to IDLE", core.state);
        true
    }

    /// Commit one handshake step if it still belongs to the live session
    pub(crate) fn commit_step(
        &self,
        generation: u64,
        from: SessionState,
        exchanges: &[(String, String)],
        failure: Option<(String, ObdError)>,
    ) -> StepOutcome {
        let mut core = self.core.lock();
        if !core.is_current(generation) || core.state != from {
            debug!("Suppressed stale {} step (generation {})", from, generation);
            return StepOutcome::Stale;
        }

        for (command, response) in exchanges {
            self.append_traffic(&mut core, command, response);
        }

        if let Some((command, err)) = failure {
            warn!("Handshake failed during {}: {}", from, err);
            self.append_traffic(&mut core, &command, &format!("ERROR: {err}"));
            core.last_error = Some(err.to_string());
            return match self.set_state(&mut core, SessionState::Error) {
                Ok(()) => StepOutcome::Failed,
                Err(_) => StepOutcome::Stale,
            };
        }

        let Some(to) = from.next() else {
            return StepOutcome::Stale;
        };
        match self.set_state(&mut core, to) {
            Ok(()) => StepOutcome::Advanced(to),
            Err(_) => StepOutcome::Stale,
        }
    }

    /// Publish a telemetry tick if the session is still READY
    pub(crate) fn commit_sample(&self, generation: u64, tick: SampleTick) -> bool {
        let mut core = self.core.lock();
        if !core.is_current(generation) || core.state != SessionState::Ready {
            debug!("Dropped telemetry tick for inactive session (generation {})", generation);
            return false;
        }

        core.traffic.push(tick.entry.clone());
        self.emit(EngineEvent::Traffic(tick.entry));
        for sample in &tick.samples {
            core.samples.insert(sample.pid.clone(), sample.clone());
        }
        self.emit(EngineEvent::Telemetry(tick.samples));
        true
    }

    /// Whether the session with `generation` is live and READY
    pub(crate) fn is_ready(&self, generation: u64) -> bool {
        let core = self.core.lock();
        core.is_current(generation) && core.state == SessionState::Ready
    }

    /// Whether the session with `generation` is still live
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.core.lock().is_current(generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared() -> Shared {
        Shared::new(10, 16)
    }

    #[test]
    fn test_vehicle_validation() {
        assert!(VehicleContext::new("VW", "Gol", 2014).validate().is_ok());
        assert!(VehicleContext::new("VW", "Gol", 1965).validate().is_err());
        assert!(VehicleContext::new("VW", "Gol", 2030).validate().is_err());
        assert!(VehicleContext::new(" ", "Gol", 2014).validate().is_err());
        assert_eq!(VehicleContext::new("VW", "Gol", 2014).to_string(), "VW Gol 2014");
    }

    #[test]
    fn test_begin_rejects_second_session() {
        let shared = shared();
        let (generation, _) = shared.begin(10, None).unwrap();
        assert_eq!(generation, 1);

        let err = shared.begin(10, None).unwrap_err();
        assert_eq!(err, SessionError::AlreadyActive(SessionState::Linking));
        assert_eq!(shared.core.lock().generation, 1);
    }

    #[test]
    fn test_commit_step_advances_and_logs() {
        let shared = shared();
        let (generation, _) = shared.begin(10, None).unwrap();

        let exchanges = vec![("BT SCAN".to_string(), "DEVICE FOUND".to_string())];
        let outcome = shared.commit_step(generation, SessionState::Linking, &exchanges, None);

        assert_eq!(outcome, StepOutcome::Advanced(SessionState::ProtocolInit));
        let core = shared.core.lock();
        assert_eq!(core.state, SessionState::ProtocolInit);
        assert_eq!(core.traffic.len(), 1);
    }

    #[test]
    fn test_stale_generation_is_suppressed() {
        let shared = shared();
        let (old_generation, _) = shared.begin(10, None).unwrap();
        assert!(shared.end());
        shared.begin(10, None).unwrap();

        let exchanges = vec![("BT SCAN".to_string(), "DEVICE FOUND".to_string())];
        let outcome = shared.commit_step(old_generation, SessionState::Linking, &exchanges, None);

        assert_eq!(outcome, StepOutcome::Stale);
        let core = shared.core.lock();
        assert_eq!(core.state, SessionState::Linking);
        assert!(core.traffic.is_empty());
    }

    #[test]
    fn test_failure_moves_to_error() {
        let shared = shared();
        let (generation, _) = shared.begin(10, None).unwrap();

        let outcome = shared.commit_step(
            generation,
            SessionState::Linking,
            &[],
            Some(("BT SCAN".to_string(), ObdError::AdapterNotFound("no device".into()))),
        );

        assert_eq!(outcome, StepOutcome::Failed);
        let core = shared.core.lock();
        assert_eq!(core.state, SessionState::Error);
        assert!(core.last_error.as_deref().unwrap().contains("no device"));
        assert!(core.traffic.latest().unwrap().response.starts_with("ERROR:"));
    }

    #[test]
    fn test_end_returns_to_idle_from_every_active_state() {
        for target in [
            SessionState::Linking,
            SessionState::ProtocolInit,
            SessionState::EcuSync,
            SessionState::Ready,
            SessionState::Error,
        ] {
            let shared = shared();
            let mut events = shared.subscribe_events();
            shared.begin(10, None).unwrap();
            shared.core.lock().state = target;

            assert!(shared.end());
            assert_eq!(shared.core.lock().state, SessionState::Idle);
            assert_eq!(*shared.subscribe_state().borrow(), SessionState::Idle);

            let mut last = None;
            while let Ok(event) = events.try_recv() {
                last = Some(event);
            }
            assert_eq!(
                last,
                Some(EngineEvent::StateChanged {
                    from: target,
                    to: SessionState::Idle
                })
            );
        }
    }

    #[test]
    fn test_end_is_noop_when_idle() {
        let shared = shared();
        assert!(!shared.end());
        assert_eq!(shared.core.lock().generation, 0);
    }
}
