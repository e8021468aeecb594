//! The robot state cache: the most recently decoded output frame, exposed
//! through typed accessors and shared between the receive loop (sole
//! writer) and every reader via a single `RwLock`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::codec::FieldValue;

/// Snapshot of every subscribed output field, keyed by RTDE variable name.
/// A snapshot is always either the previous or the latest complete frame —
/// `RobotState::apply` replaces the whole map atomically under the writer's
/// exclusive lock, so readers never observe a torn decode.
#[derive(Debug, Clone, Default)]
pub struct RobotState {
    fields: HashMap<String, FieldValue>,
}

impl RobotState {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Replace the cached fields with a freshly decoded frame.
    pub fn apply(&mut self, decoded: HashMap<String, FieldValue>) {
        self.fields = decoded;
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn timestamp(&self) -> Option<f64> {
        self.fields.get("timestamp").and_then(FieldValue::as_f64)
    }

    pub fn actual_joint_positions(&self) -> Option<[f64; 6]> {
        self.fields.get("actual_q").and_then(FieldValue::as_vector6d)
    }

    pub fn target_joint_positions(&self) -> Option<[f64; 6]> {
        self.fields.get("target_q").and_then(FieldValue::as_vector6d)
    }

    pub fn actual_tcp_pose(&self) -> Option<[f64; 6]> {
        self.fields.get("actual_TCP_pose").and_then(FieldValue::as_vector6d)
    }

    pub fn target_tcp_pose(&self) -> Option<[f64; 6]> {
        self.fields.get("target_TCP_pose").and_then(FieldValue::as_vector6d)
    }

    pub fn robot_status_bits(&self) -> Option<u32> {
        match self.fields.get("robot_status_bits") {
            Some(FieldValue::Uint32(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn safety_status_bits(&self) -> Option<u32> {
        match self.fields.get("safety_status_bits") {
            Some(FieldValue::Uint32(v)) => Some(*v),
            _ => None,
        }
    }

    /// Bit 1 of `robot_status_bits`: a program is running on the controller.
    /// §9: a running→not-running transition while awaiting DONE is a
    /// controller error.
    pub fn is_program_running(&self) -> Option<bool> {
        self.robot_status_bits().map(|bits| bits & 0b10 != 0)
    }

    /// Bit 2 (protective stop) or bit 3 (emergency stop) set in
    /// `safety_status_bits` — used by the command channel to abort an
    /// in-flight wait with a controller error instead of timing out.
    pub fn is_stopped_by_safety(&self) -> Option<bool> {
        self.safety_status_bits().map(|bits| bits & 0b1100 != 0)
    }

    pub fn robot_mode(&self) -> Option<i32> {
        self.fields.get("robot_mode").and_then(FieldValue::as_i32)
    }

    /// `robot_mode` decoded to the controller's own name, e.g. "RUNNING".
    /// Unknown values render as "UNKNOWN(n)" rather than failing.
    pub fn robot_mode_name(&self) -> Option<String> {
        self.robot_mode().map(|m| mode_name(ROBOT_MODE_NAMES, m))
    }

    pub fn safety_mode(&self) -> Option<i32> {
        self.fields.get("safety_mode").and_then(FieldValue::as_i32)
    }

    pub fn safety_mode_name(&self) -> Option<String> {
        self.safety_mode().map(|m| mode_name(SAFETY_MODE_NAMES, m))
    }

    pub fn runtime_state(&self) -> Option<i32> {
        self.fields.get("runtime_state").and_then(FieldValue::as_i32)
    }

    pub fn runtime_state_name(&self) -> Option<String> {
        self.runtime_state().map(|s| mode_name(RUNTIME_STATE_NAMES, s))
    }

    pub fn actual_digital_output_bits(&self) -> Option<u32> {
        match self.fields.get("actual_digital_output_bits") {
            Some(FieldValue::Uint32(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn actual_digital_input_bits(&self) -> Option<u32> {
        match self.fields.get("actual_digital_input_bits") {
            Some(FieldValue::Uint32(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn output_int_register(&self, index: u32) -> Option<i32> {
        self.fields
            .get(&format!("output_int_register_{index}"))
            .and_then(FieldValue::as_i32)
    }

    pub fn output_double_register(&self, index: u32) -> Option<f64> {
        self.fields
            .get(&format!("output_double_register_{index}"))
            .and_then(FieldValue::as_f64)
    }
}

const ROBOT_MODE_NAMES: &[(i32, &str)] = &[
    (-1, "NO_CONTROLLER"),
    (0, "DISCONNECTED"),
    (1, "CONFIRM_SAFETY"),
    (2, "BOOTING"),
    (3, "POWER_OFF"),
    (4, "POWER_ON"),
    (5, "IDLE"),
    (6, "BACKDRIVE"),
    (7, "RUNNING"),
    (8, "UPDATING_FIRMWARE"),
];

const SAFETY_MODE_NAMES: &[(i32, &str)] = &[
    (1, "NORMAL"),
    (2, "REDUCED"),
    (3, "PROTECTIVE_STOP"),
    (4, "RECOVERY"),
    (5, "SAFEGUARD_STOP"),
    (6, "SYSTEM_EMERGENCY_STOP"),
    (7, "ROBOT_EMERGENCY_STOP"),
    (8, "EMERGENCY_STOP"),
    (9, "VIOLATION"),
    (10, "FAULT"),
    (11, "STOPPED_DUE_TO_SAFETY"),
];

const RUNTIME_STATE_NAMES: &[(i32, &str)] = &[
    (0, "STOPPING"),
    (1, "STOPPED"),
    (2, "PLAYING"),
    (3, "PAUSING"),
    (4, "PAUSED"),
    (5, "RESUMING"),
];

fn mode_name(table: &[(i32, &str)], value: i32) -> String {
    table
        .iter()
        .find(|(num, _)| *num == value)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| format!("UNKNOWN({value})"))
}

/// Shared handle: the receive loop is the sole writer; the command channel
/// and public accessors are readers. `RwLock` over a plain `Mutex` so
/// concurrent readers (an accessor call and a poll loop) don't serialize
/// against each other, only against the writer.
pub type SharedState = Arc<RwLock<RobotState>>;

pub fn new_shared_state() -> SharedState {
    Arc::new(RwLock::new(RobotState::empty()))
}
