//! Device actuation
//!
//! Commands to door controllers, cameras and alarms go through the
//! [`ActuationClient`] trait. The engine always wraps the client in a
//! [`TimedActuator`] so every call is bounded.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::types::{CommandSource, ControlAction, DeviceId, DoorId, RuleId};

/// Control command addressed to one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlCommand {
    /// Receiving device
    pub device_id: DeviceId,
    /// Door on the device, when the action addresses one
    pub door_id: Option<DoorId>,
    /// What to do
    pub action: ControlAction,
    /// Engine path that issued the command
    pub source: CommandSource,
    /// Rule behind the command
    pub rule_id: Option<RuleId>,
}

impl ControlCommand {
    /// Create a command without a door or rule
    pub fn new(device_id: DeviceId, action: ControlAction, source: CommandSource) -> Self {
        Self {
            device_id,
            door_id: None,
            action,
            source,
            rule_id: None,
        }
    }

    /// Address a door
    pub fn for_door(mut self, door: Option<DoorId>) -> Self {
        self.door_id = door;
        self
    }

    /// Attach the originating rule
    pub fn for_rule(mut self, rule: RuleId) -> Self {
        self.rule_id = Some(rule);
        self
    }
}

/// Successful device response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlResponse {
    /// Responding device
    pub device_id: DeviceId,
    /// Raw response body
    pub payload: String,
}

/// Device command failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActuationError {
    /// No response within the bounded timeout
    #[error("{device} did not respond within {after:?}")]
    Timeout {
        /// Target device
        device: DeviceId,
        /// Timeout that elapsed
        after: Duration,
    },

    /// Device answered and refused the command
    #[error("{device} rejected command: {message}")]
    Rejected {
        /// Target device
        device: DeviceId,
        /// Device-supplied reason
        message: String,
    },

    /// Device could not be reached
    #[error("{device} unreachable: {message}")]
    Unreachable {
        /// Target device
        device: DeviceId,
        /// Transport detail
        message: String,
    },
}

impl ActuationError {
    /// Whether repeating the command may succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ActuationError::Rejected { .. })
    }
}

/// Device-communication collaborator
#[async_trait]
pub trait ActuationClient: Send + Sync + std::fmt::Debug {
    /// Send one command and wait for its outcome
    async fn send(&self, command: ControlCommand) -> Result<ControlResponse, ActuationError>;
}

/// Bounds every call to the wrapped client with a timeout
#[derive(Debug, Clone)]
pub struct TimedActuator {
    inner: Arc<dyn ActuationClient>,
    timeout: Duration,
}

impl TimedActuator {
    /// Wrap `inner` with `timeout`
    pub fn new(inner: Arc<dyn ActuationClient>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// Configured timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl ActuationClient for TimedActuator {
    #[instrument(skip(self), fields(device = %command.device_id, action = %command.action))]
    async fn send(&self, command: ControlCommand) -> Result<ControlResponse, ActuationError> {
        let device = command.device_id;
        match tokio::time::timeout(self.timeout, self.inner.send(command)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Command to {} timed out after {:?}", device, self.timeout);
                Err(ActuationError::Timeout {
                    device,
                    after: self.timeout,
                })
            }
        }
    }
}

/// How a simulated device misbehaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatedFault {
    /// Answer with a rejection
    Reject,
    /// Report the device unreachable
    Unreachable,
    /// Never answer
    Hang,
}

/// A command seen by the simulated actuator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentCommand {
    /// The command
    pub command: ControlCommand,
    /// Whether the device accepted it
    pub accepted: bool,
}

#[derive(Debug, Default)]
struct SimulatorState {
    sent: Vec<SentCommand>,
    faults: HashMap<DeviceId, SimulatedFault>,
    transient: HashMap<DeviceId, u32>,
}

/// In-process device layer that records every command
///
/// Devices accept everything unless a fault is configured for them.
#[derive(Debug, Default)]
pub struct SimulatedActuator {
    state: Mutex<SimulatorState>,
    latency: Duration,
}

impl SimulatedActuator {
    /// Create an actuator whose devices all accept commands immediately
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every response by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make `device` fail every command
    pub fn fail_device(&self, device: DeviceId, fault: SimulatedFault) {
        if let Ok(mut state) = self.state.lock() {
            state.faults.insert(device, fault);
        }
    }

    /// Make `device` report unreachable for its next `times` commands
    pub fn fail_times(&self, device: DeviceId, times: u32) {
        if let Ok(mut state) = self.state.lock() {
            state.transient.insert(device, times);
        }
    }

    /// Clear any configured fault for `device`
    pub fn recover_device(&self, device: DeviceId) {
        if let Ok(mut state) = self.state.lock() {
            state.faults.remove(&device);
            state.transient.remove(&device);
        }
    }

    /// Every command seen, in arrival order
    pub fn sent(&self) -> Vec<SentCommand> {
        self.state
            .lock()
            .map(|state| state.sent.clone())
            .unwrap_or_default()
    }

    /// Commands addressed to `device`
    pub fn commands_for(&self, device: DeviceId) -> Vec<ControlCommand> {
        self.sent()
            .into_iter()
            .filter(|sent| sent.command.device_id == device)
            .map(|sent| sent.command)
            .collect()
    }

    /// Accepted commands of `action` addressed to `device`
    pub fn accepted_count(&self, device: DeviceId, action: ControlAction) -> usize {
        self.sent()
            .iter()
            .filter(|sent| {
                sent.accepted && sent.command.device_id == device && sent.command.action == action
            })
            .count()
    }

    fn fault_for(&self, device: DeviceId) -> Option<SimulatedFault> {
        let mut state = self.state.lock().ok()?;
        if let Some(fault) = state.faults.get(&device) {
            return Some(*fault);
        }
        match state.transient.get_mut(&device) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Some(SimulatedFault::Unreachable)
            }
            _ => None,
        }
    }

    fn record(&self, command: ControlCommand, accepted: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.sent.push(SentCommand { command, accepted });
        }
    }
}

#[async_trait]
impl ActuationClient for SimulatedActuator {
    async fn send(&self, command: ControlCommand) -> Result<ControlResponse, ActuationError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let device = command.device_id;
        match self.fault_for(device) {
            None => {
                let payload = serde_json::json!({
                    "device": device,
                    "door": command.door_id,
                    "action": command.action,
                    "status": "OK",
                })
                .to_string();
                debug!("Simulated {} accepted {}", device, command.action);
                self.record(command, true);
                Ok(ControlResponse {
                    device_id: device,
                    payload,
                })
            }
            Some(SimulatedFault::Reject) => {
                self.record(command, false);
                Err(ActuationError::Rejected {
                    device,
                    message: "command refused by device".to_string(),
                })
            }
            Some(SimulatedFault::Unreachable) => {
                self.record(command, false);
                Err(ActuationError::Unreachable {
                    device,
                    message: "no route to device".to_string(),
                })
            }
            Some(SimulatedFault::Hang) => {
                self.record(command, false);
                std::future::pending().await
            }
        }
    }
}
