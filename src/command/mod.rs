//! The register-mailbox command channel: a request/ack handshake between
//! the host and the control script, built on top of the RTDE session's
//! input/output recipes.

pub mod path;
pub mod validate;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::codec::FieldValue;
use crate::error::{Result, RtdeError};
use crate::session::RtdeSession;
use crate::state::SharedState;

const UR_CONTROLLER_RDY_FOR_CMD: i32 = 1;
const UR_CONTROLLER_DONE_WITH_CMD: i32 = 2;

/// Command codes written to `input_int_register_(base+0)`. Exact numeric
/// assignments must match the companion control script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum CommandCode {
    Noop = 0,
    MoveJ = 1,
    MoveL = 2,
    MoveJIk = 3,
    MoveLFk = 4,
    MoveP = 5,
    MoveC = 6,
    ServoJ = 7,
    ServoL = 8,
    SpeedJ = 9,
    SpeedL = 10,
    ServoC = 11,
    ForceMode = 12,
    ForceModeStop = 13,
    ZeroFtSensor = 14,
    StopL = 15,
    StopJ = 16,
    SetPayload = 17,
    TeachMode = 18,
    EndTeachMode = 19,
    ForceModeDamping = 20,
    ForceModeScaling = 21,
    ToolContact = 22,
    GetStepTime = 23,
    GetActualJointPosHistory = 24,
    GetTargetWaypoint = 25,
    SetTcp = 26,
    GetInverseKin = 27,
    ProtectiveStop = 28,
    TriggerProtectiveStop = 29,
    PoseTrans = 30,
    IsSteady = 31,
    SetWatchdog = 32,
    KickWatchdog = 33,
    IsPoseWithinLimits = 34,
    IsJointsWithinLimits = 35,
    GetJointTorques = 36,
    GetTcpOffset = 37,
    JogStart = 38,
    JogStop = 39,
    GetForwardKin = 40,
    MovePath = 41,
    ServoStop = 42,
    SpeedStop = 43,
}

impl CommandCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Register window + timeouts for one command channel instance. `base` is
/// 0 by default or 24 when the caller opts into the upper range to avoid
/// colliding with another program's command channel.
#[derive(Debug, Clone)]
pub struct CommandChannel {
    recipe_id: u8,
    base: u32,
    poll_interval: Duration,
    setup_timeout: Duration,
    command_timeout: Duration,
    path_timeout: Duration,
}

impl CommandChannel {
    pub fn new(
        recipe_id: u8,
        base: u32,
        poll_interval: Duration,
        setup_timeout: Duration,
        command_timeout: Duration,
        path_timeout: Duration,
    ) -> Self {
        Self {
            recipe_id,
            base,
            poll_interval,
            setup_timeout,
            command_timeout,
            path_timeout,
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    fn int_register(&self, offset: u32) -> String {
        format!("input_int_register_{}", self.base + offset)
    }

    fn double_register(&self, offset: u32) -> String {
        format!("input_double_register_{}", self.base + offset)
    }

    fn output_done_flag(&self, shared: &SharedState) -> Option<i32> {
        shared.read().unwrap().output_int_register(self.base)
    }

    /// Async-progress register: −1 idle, ≥0 the current waypoint index.
    pub fn async_progress(&self, shared: &SharedState) -> Option<i32> {
        shared.read().unwrap().output_int_register(self.base + 1)
    }

    /// Block until the controller reports ready for a command, bounded by
    /// `setup_timeout`. Called once after the script has been uploaded.
    pub fn wait_ready(&self, shared: &SharedState) -> Result<()> {
        self.poll_until(shared, self.setup_timeout, "controller ready", false, |flag| {
            flag == UR_CONTROLLER_RDY_FOR_CMD
        })
    }

    /// Poll the done/ready flag until `predicate` is satisfied or `timeout`
    /// elapses. When `track_running` is set, a robot_status_bits transition
    /// from program-running to not-running partway through the wait is
    /// treated as a controller error rather than left to time out (§9: the
    /// script crashing mid-command shows up there before anywhere else).
    fn poll_until(
        &self,
        shared: &SharedState,
        timeout: Duration,
        what: &str,
        track_running: bool,
        predicate: impl Fn(i32) -> bool,
    ) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut seen_running = false;
        loop {
            if let Some(stopped) = shared.read().unwrap().is_stopped_by_safety() {
                if stopped {
                    return Err(RtdeError::controller(
                        "protective or emergency stop observed while waiting for the controller",
                    ));
                }
            }
            if track_running {
                match shared.read().unwrap().is_program_running() {
                    Some(true) => seen_running = true,
                    Some(false) if seen_running => {
                        return Err(RtdeError::controller(
                            "program stopped running while a command was awaiting completion",
                        ));
                    }
                    _ => {}
                }
            }
            if let Some(flag) = self.output_done_flag(shared) {
                if predicate(flag) {
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                return Err(RtdeError::timeout(what, timeout));
            }
            std::thread::sleep(self.poll_interval);
        }
    }

    /// Send an input frame setting the command code plus the supplied
    /// integer/double payload slots. Offsets are relative to `base`; slot 0
    /// of the int registers is always overwritten with `code`.
    fn send_frame(
        &self,
        session: &RtdeSession,
        code: CommandCode,
        ints: &[(u32, i32)],
        doubles: &[(u32, f64)],
    ) -> Result<()> {
        let mut values: HashMap<String, FieldValue> = HashMap::new();
        values.insert(self.int_register(0), FieldValue::Int32(code.code()));
        for (offset, v) in ints {
            values.insert(self.int_register(*offset), FieldValue::Int32(*v));
        }
        for (offset, v) in doubles {
            values.insert(self.double_register(*offset), FieldValue::Double(*v));
        }
        session.send(self.recipe_id, &values)
    }

    /// Write the command code back to NOOP, re-arming `RDY_FOR_CMD`.
    fn clear(&self, session: &RtdeSession) -> Result<()> {
        self.send_frame(session, CommandCode::Noop, &[], &[])
    }

    /// Run one full request/ack cycle: send, wait for DONE, clear. Returns
    /// once the controller has acknowledged completion; does not wait for
    /// `async`-flagged motions to finish (the caller observes
    /// `async_progress` instead).
    pub fn execute(
        &self,
        session: &RtdeSession,
        shared: &SharedState,
        code: CommandCode,
        ints: &[(u32, i32)],
        doubles: &[(u32, f64)],
    ) -> Result<()> {
        tracing::debug!(code = code.code(), "sending command");
        self.send_frame(session, code, ints, doubles)?;
        self.poll_until(shared, self.command_timeout, "command DONE", true, |flag| {
            flag == UR_CONTROLLER_DONE_WITH_CMD
        })?;
        self.clear(session)
    }

    /// Same as `execute`, bounded by the longer path timeout (§4.4: 600 s
    /// for paths vs. 300 s for ordinary commands).
    pub fn execute_path(
        &self,
        session: &RtdeSession,
        shared: &SharedState,
        code: CommandCode,
        ints: &[(u32, i32)],
        doubles: &[(u32, f64)],
    ) -> Result<()> {
        self.send_frame(session, code, ints, doubles)?;
        self.poll_until(shared, self.path_timeout, "path DONE", true, |flag| {
            flag == UR_CONTROLLER_DONE_WITH_CMD
        })?;
        self.clear(session)
    }

    /// Execute a command whose result is the configured six-element output
    /// double-register block (inverse kinematics, pose transform, forward
    /// kinematics, ...).
    pub fn execute_returning_vector(
        &self,
        session: &RtdeSession,
        shared: &SharedState,
        code: CommandCode,
        ints: &[(u32, i32)],
        doubles: &[(u32, f64)],
    ) -> Result<[f64; 6]> {
        self.execute(session, shared, code, ints, doubles)?;
        let state = shared.read().unwrap();
        let mut out = [0.0; 6];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = state
                .output_double_register(i as u32)
                .ok_or_else(|| RtdeError::protocol("missing output double register in result vector"))?;
        }
        Ok(out)
    }

    /// Execute a command whose result is a single boolean, encoded by the
    /// script as 0/1 in output double register 0 (used by `TOOL_CONTACT`,
    /// `IS_STEADY`, `IS_POSE_WITHIN_LIMITS`, `IS_JOINTS_WITHIN_LIMITS`).
    pub fn execute_returning_bool(
        &self,
        session: &RtdeSession,
        shared: &SharedState,
        code: CommandCode,
        ints: &[(u32, i32)],
        doubles: &[(u32, f64)],
    ) -> Result<bool> {
        self.execute(session, shared, code, ints, doubles)?;
        let state = shared.read().unwrap();
        let value = state
            .output_double_register(0)
            .ok_or_else(|| RtdeError::protocol("missing output double register in result"))?;
        Ok(value != 0.0)
    }

    /// Fire-and-forget an async motion: send the frame with the async flag
    /// set and return as soon as the channel can observe progress leaving
    /// idle, instead of waiting for DONE.
    pub fn execute_async(
        &self,
        session: &RtdeSession,
        shared: &SharedState,
        code: CommandCode,
        ints: &[(u32, i32)],
        doubles: &[(u32, f64)],
    ) -> Result<()> {
        let mut ints = ints.to_vec();
        ints.push((1, 1)); // async flag, register base+1 on the input side
        self.send_frame(session, code, &ints, doubles)?;
        self.poll_until(shared, self.command_timeout, "async motion start", false, |_| {
            self.async_progress(shared).map(|p| p >= 0).unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::frame;
    use crate::codec::{FieldType, PacketType};
    use crate::recipe::FieldDescriptor;
    use crate::recipe::Recipe;
    use crate::state::{new_shared_state, RobotState};
    use std::net::TcpListener;
    use std::thread;

    fn channel() -> CommandChannel {
        CommandChannel::new(
            2,
            0,
            Duration::from_millis(1),
            Duration::from_millis(200),
            Duration::from_millis(200),
            Duration::from_millis(400),
        )
    }

    fn set_done_flag(shared: &SharedState, flag: i32) {
        let mut state = RobotState::empty();
        let mut frame = HashMap::new();
        frame.insert("output_int_register_0".to_string(), FieldValue::Int32(flag));
        frame.insert("output_int_register_1".to_string(), FieldValue::Int32(-1));
        state.apply(frame);
        *shared.write().unwrap() = state;
    }

    #[test]
    fn wait_ready_succeeds_once_flag_flips() {
        let shared = new_shared_state();
        set_done_flag(&shared, UR_CONTROLLER_RDY_FOR_CMD);
        channel().wait_ready(&shared).unwrap();
    }

    #[test]
    fn wait_ready_times_out_if_never_ready() {
        let shared = new_shared_state();
        let err = channel().wait_ready(&shared).unwrap_err();
        assert!(matches!(err, RtdeError::Timeout { .. }));
    }

    #[test]
    fn controller_stop_aborts_wait_with_controller_error() {
        let shared = new_shared_state();
        let mut state = RobotState::empty();
        let mut frame = HashMap::new();
        frame.insert("safety_status_bits".to_string(), FieldValue::Uint32(0b0100));
        state.apply(frame);
        *shared.write().unwrap() = state;

        let err = channel().wait_ready(&shared).unwrap_err();
        assert!(matches!(err, RtdeError::Controller(_)));
    }

    #[test]
    fn running_to_not_running_transition_is_a_controller_error() {
        let shared = new_shared_state();

        let mut state = RobotState::empty();
        let mut frame = HashMap::new();
        frame.insert("output_int_register_0".to_string(), FieldValue::Int32(0));
        frame.insert("robot_status_bits".to_string(), FieldValue::Uint32(0b10));
        state.apply(frame);
        *shared.write().unwrap() = state;

        let shared_for_thread = shared.clone();
        let toggler = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            let mut state = RobotState::empty();
            let mut frame = HashMap::new();
            frame.insert("output_int_register_0".to_string(), FieldValue::Int32(0));
            frame.insert("robot_status_bits".to_string(), FieldValue::Uint32(0));
            state.apply(frame);
            *shared_for_thread.write().unwrap() = state;
        });

        let err = channel()
            .poll_until(&shared, Duration::from_millis(500), "command DONE", true, |flag| {
                flag == UR_CONTROLLER_DONE_WITH_CMD
            })
            .unwrap_err();
        assert!(matches!(err, RtdeError::Controller(_)));
        toggler.join().unwrap();
    }

    #[test]
    fn execute_sends_command_waits_for_done_then_clears() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let shared = new_shared_state();
        let shared_for_thread = shared.clone();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let sent = frame::read_one(&mut stream).unwrap();
            assert_eq!(sent.type_code, PacketType::DataPackageInput.code());
            assert_eq!(sent.payload[0], 2); // recipe id
            // command code int32 big-endian right after the recipe id byte
            assert_eq!(&sent.payload[1..5], &(CommandCode::StopJ.code()).to_be_bytes());

            set_done_flag(&shared_for_thread, UR_CONTROLLER_DONE_WITH_CMD);

            let cleared = frame::read_one(&mut stream).unwrap();
            assert_eq!(&cleared.payload[1..5], &0i32.to_be_bytes());
        });

        let mut session = RtdeSession::new("127.0.0.1", port);
        session.connect().unwrap();

        // Register the command-channel input recipe directly, bypassing the
        // setup handshake (exercised separately in session.rs's own tests).
        session_inject_recipe(&mut session, 2, "input_int_register_0", FieldType::Int32);

        channel()
            .execute(&session, &shared, CommandCode::StopJ, &[], &[])
            .unwrap();
        server.join().unwrap();
    }

    /// Test-only helper: push a minimal input recipe into a session so
    /// command-channel tests don't need to run the full setup handshake.
    fn session_inject_recipe(session: &mut RtdeSession, id: u8, field: &str, ty: FieldType) {
        let recipe = Recipe::new(id, vec![FieldDescriptor::new(field, ty)]);
        session.test_inject_input_recipe(recipe);
    }
}
