//! Top-level facade: wires the session, receive loop, command channel,
//! script client, and I/O facade into the object a caller actually holds.

use crate::command::path::Path;
use crate::command::validate::{self, BLEND_RADIUS, JOINT_ACCELERATION, JOINT_VELOCITY, TOOL_ACCELERATION, TOOL_VELOCITY};
use crate::command::{CommandChannel, CommandCode};
use crate::config::RtdeConfig;
use crate::error::{Result, RtdeError};
use crate::io::IoFacade;
use crate::receive::ReceiveLoop;
use crate::recipe::Recipe;
use crate::script::ScriptClient;
use crate::session::RtdeSession;
use crate::state::{new_shared_state, RobotState, SharedState};
use crate::version::ControllerVersion;

/// Output fields the facade always subscribes to: pose/joint telemetry,
/// status bits, and the command-channel's own done/progress registers.
fn default_output_fields(base: u32) -> Vec<String> {
    vec![
        "timestamp".to_string(),
        "actual_q".to_string(),
        "target_q".to_string(),
        "actual_TCP_pose".to_string(),
        "target_TCP_pose".to_string(),
        "robot_status_bits".to_string(),
        "safety_status_bits".to_string(),
        "actual_digital_output_bits".to_string(),
        "actual_digital_input_bits".to_string(),
        "robot_mode".to_string(),
        "safety_mode".to_string(),
        "runtime_state".to_string(),
        format!("output_int_register_{base}"),
        format!("output_int_register_{}", base + 1),
        format!("output_double_register_{base}"),
        format!("output_double_register_{}", base + 1),
        format!("output_double_register_{}", base + 2),
        format!("output_double_register_{}", base + 3),
        format!("output_double_register_{}", base + 4),
        format!("output_double_register_{}", base + 5),
    ]
}

fn command_channel_input_fields(base: u32) -> Vec<String> {
    let mut fields = vec![format!("input_int_register_{base}")];
    for i in 1..=7 {
        fields.push(format!("input_int_register_{}", base + i));
    }
    for i in 0..=23 {
        fields.push(format!("input_double_register_{}", base + i));
    }
    fields
}

/// The control script text is supplied by the caller: generating or
/// packaging it is outside this core's scope, which treats the script as
/// an opaque collaborator (see the command-channel register contract).
pub struct Robot {
    session: RtdeSession,
    shared_state: SharedState,
    receive_loop: Option<ReceiveLoop>,
    command_channel: CommandChannel,
    io_facade: IoFacade,
    script_client: ScriptClient,
    config: RtdeConfig,
    controller_version: Option<ControllerVersion>,
}

impl Robot {
    pub fn new(config: RtdeConfig) -> Self {
        let base = config.register_base();
        Self {
            session: RtdeSession::new(config.host.clone(), config.rtde_port),
            shared_state: new_shared_state(),
            receive_loop: None,
            command_channel: CommandChannel::new(
                2,
                base,
                config.poll_interval(),
                config.setup_timeout(),
                config.command_timeout(),
                config.path_timeout(),
            ),
            io_facade: IoFacade::new(3),
            script_client: ScriptClient::new(config.host.clone(), config.script_port),
            config,
            controller_version: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub fn controller_version(&self) -> Option<ControllerVersion> {
        self.controller_version
    }

    /// Run connect → negotiate → output/input setup → upload script →
    /// wait-ready → start, and spawn the receive loop. `control_script` is
    /// the command-channel script text (templated with `$MN` markers as
    /// needed); it is uploaded once per session.
    pub fn connect(&mut self, control_script: &str) -> Result<()> {
        let base = self.command_channel.base();

        self.session.connect()?;
        self.session.negotiate_protocol_version(2)?;
        let version = self.session.request_controller_version()?;
        self.controller_version = Some(version);

        let output_fields = default_output_fields(base);
        let frequency = version.max_output_frequency();
        self.session.send_output_setup(&output_fields, frequency)?;

        let command_fields = command_channel_input_fields(base);
        let command_recipe_id = self.session.send_input_setup(&command_fields)?;
        self.command_channel = CommandChannel::new(
            command_recipe_id,
            base,
            self.config.poll_interval(),
            self.config.setup_timeout(),
            self.config.command_timeout(),
            self.config.path_timeout(),
        );

        let io_fields = vec![
            "standard_digital_output_mask".to_string(),
            "standard_digital_output".to_string(),
            "tool_digital_output_mask".to_string(),
            "tool_digital_output".to_string(),
            "standard_analog_output_mask".to_string(),
            "standard_analog_output_0".to_string(),
            "standard_analog_output_1".to_string(),
            "speed_slider_mask".to_string(),
            "speed_slider_fraction".to_string(),
        ];
        let io_recipe_id = self.session.send_input_setup(&io_fields)?;
        self.io_facade = IoFacade::new(io_recipe_id);

        self.script_client.upload_control_script(control_script, version)?;

        self.session.start()?;

        let read_stream = self.session.take_read_stream()?;
        let output_recipe: Recipe = self
            .session
            .output_recipe()
            .cloned()
            .ok_or_else(|| RtdeError::protocol("output recipe missing after setup"))?;
        self.receive_loop = Some(ReceiveLoop::spawn(
            read_stream,
            output_recipe,
            self.shared_state.clone(),
            self.session.connected_flag(),
        ));

        self.command_channel.wait_ready(&self.shared_state)?;
        tracing::info!("robot connected and command channel ready");
        Ok(())
    }

    /// Close the session and stop the receive loop.
    pub fn disconnect(&mut self) {
        if let Some(mut loop_handle) = self.receive_loop.take() {
            loop_handle.stop();
        }
        self.session.disconnect();
        *self.shared_state.write().unwrap() = RobotState::empty();
    }

    /// Tear down and re-run the full connect sequence. Per the bounded
    /// retry decision for the source's unguarded recursive reconnect, this
    /// makes exactly one attempt; the caller decides whether to retry.
    pub fn reconnect(&mut self, control_script: &str) -> Result<()> {
        tracing::warn!("reconnecting RTDE session");
        self.disconnect();
        self.connect(control_script)
    }

    pub fn shared_state(&self) -> SharedState {
        self.shared_state.clone()
    }

    pub fn io(&self) -> &IoFacade {
        &self.io_facade
    }

    pub fn set_standard_digital_out(&self, id: u8, level: bool) -> Result<()> {
        self.io_facade.set_standard_digital_out(&self.session, id, level)
    }

    pub fn set_tool_digital_out(&self, id: u8, level: bool) -> Result<()> {
        self.io_facade.set_tool_digital_out(&self.session, id, level)
    }

    pub fn set_speed_slider(&self, fraction: f64) -> Result<()> {
        self.io_facade.set_speed_slider(&self.session, fraction)
    }

    pub fn set_analog_out(&self, id: u8, value: f64) -> Result<()> {
        self.io_facade.set_analog_out(&self.session, id, value)
    }

    pub fn script_client(&self) -> &ScriptClient {
        &self.script_client
    }

    fn require_version(&self) -> Result<ControllerVersion> {
        self.controller_version
            .ok_or_else(|| RtdeError::version("controller version unknown; connect() has not completed"))
    }

    pub fn move_j(&self, q: [f64; 6], velocity: f64, acceleration: f64) -> Result<()> {
        validate::verify_within("joint_velocity", velocity, JOINT_VELOCITY)?;
        validate::verify_within("joint_acceleration", acceleration, JOINT_ACCELERATION)?;
        let doubles = pose_payload(q, velocity, acceleration);
        self.command_channel
            .execute(&self.session, &self.shared_state, CommandCode::MoveJ, &[], &doubles)
    }

    pub fn move_l(&self, pose: [f64; 6], velocity: f64, acceleration: f64) -> Result<()> {
        validate::verify_within("tool_velocity", velocity, TOOL_VELOCITY)?;
        validate::verify_within("tool_acceleration", acceleration, TOOL_ACCELERATION)?;
        let doubles = pose_payload(pose, velocity, acceleration);
        self.command_channel
            .execute(&self.session, &self.shared_state, CommandCode::MoveL, &[], &doubles)
    }

    pub fn move_p(&self, pose: [f64; 6], velocity: f64, acceleration: f64, blend_radius: f64) -> Result<()> {
        validate::verify_within("tool_velocity", velocity, TOOL_VELOCITY)?;
        validate::verify_within("tool_acceleration", acceleration, TOOL_ACCELERATION)?;
        validate::verify_within("blend_radius", blend_radius, BLEND_RADIUS)?;
        let mut doubles = pose_payload(pose, velocity, acceleration);
        doubles.push((8, blend_radius));
        self.command_channel
            .execute(&self.session, &self.shared_state, CommandCode::MoveP, &[], &doubles)
    }

    pub fn move_c(&self, via: [f64; 6], pose: [f64; 6], velocity: f64, acceleration: f64, blend_radius: f64) -> Result<()> {
        validate::verify_within("tool_velocity", velocity, TOOL_VELOCITY)?;
        validate::verify_within("tool_acceleration", acceleration, TOOL_ACCELERATION)?;
        validate::verify_within("blend_radius", blend_radius, BLEND_RADIUS)?;
        let mut doubles: Vec<(u32, f64)> = via.iter().enumerate().map(|(i, v)| (i as u32, *v)).collect();
        for (i, v) in pose.iter().enumerate() {
            doubles.push((6 + i as u32, *v));
        }
        doubles.push((12, velocity));
        doubles.push((13, acceleration));
        doubles.push((14, blend_radius));
        self.command_channel
            .execute(&self.session, &self.shared_state, CommandCode::MoveC, &[], &doubles)
    }

    pub fn move_j_async(&self, q: [f64; 6], velocity: f64, acceleration: f64) -> Result<()> {
        validate::verify_within("joint_velocity", velocity, JOINT_VELOCITY)?;
        validate::verify_within("joint_acceleration", acceleration, JOINT_ACCELERATION)?;
        let doubles = pose_payload(q, velocity, acceleration);
        self.command_channel
            .execute_async(&self.session, &self.shared_state, CommandCode::MoveJ, &[], &doubles)
    }

    pub fn servo_j(
        &self,
        q: [f64; 6],
        velocity: f64,
        acceleration: f64,
        lookahead: f64,
        gain: f64,
    ) -> Result<()> {
        validate::verify_within("joint_velocity", velocity, JOINT_VELOCITY)?;
        validate::verify_within("joint_acceleration", acceleration, JOINT_ACCELERATION)?;
        validate::verify_within("servo_lookahead", lookahead, validate::SERVO_LOOKAHEAD)?;
        validate::verify_within("servo_gain", gain, validate::SERVO_GAIN)?;
        let mut doubles = pose_payload(q, velocity, acceleration);
        doubles.push((8, lookahead));
        doubles.push((9, gain));
        self.command_channel
            .execute(&self.session, &self.shared_state, CommandCode::ServoJ, &[], &doubles)
    }

    pub fn speed_j(&self, qd: [f64; 6], acceleration: f64) -> Result<()> {
        validate::verify_within("joint_acceleration", acceleration, JOINT_ACCELERATION)?;
        let doubles = pose_payload(qd, 0.0, acceleration);
        self.command_channel
            .execute(&self.session, &self.shared_state, CommandCode::SpeedJ, &[], &doubles)
    }

    pub fn stop_j(&self, deceleration: f64) -> Result<()> {
        validate::verify_within("joint_acceleration", deceleration, JOINT_ACCELERATION)?;
        self.command_channel.execute(
            &self.session,
            &self.shared_state,
            CommandCode::StopJ,
            &[],
            &[(7, deceleration)],
        )
    }

    pub fn stop_l(&self, deceleration: f64) -> Result<()> {
        validate::verify_within("tool_acceleration", deceleration, TOOL_ACCELERATION)?;
        self.command_channel.execute(
            &self.session,
            &self.shared_state,
            CommandCode::StopL,
            &[],
            &[(7, deceleration)],
        )
    }

    pub fn set_payload(&self, mass: f64, center_of_gravity: [f64; 3]) -> Result<()> {
        let mut doubles = vec![(0, mass)];
        for (i, v) in center_of_gravity.iter().enumerate() {
            doubles.push((1 + i as u32, *v));
        }
        self.command_channel
            .execute(&self.session, &self.shared_state, CommandCode::SetPayload, &[], &doubles)
    }

    pub fn set_tcp(&self, pose: [f64; 6]) -> Result<()> {
        let doubles = pose.iter().enumerate().map(|(i, v)| (i as u32, *v)).collect::<Vec<_>>();
        self.command_channel
            .execute(&self.session, &self.shared_state, CommandCode::SetTcp, &[], &doubles)
    }

    pub fn teach_mode(&self) -> Result<()> {
        self.command_channel
            .execute(&self.session, &self.shared_state, CommandCode::TeachMode, &[], &[])
    }

    pub fn end_teach_mode(&self) -> Result<()> {
        self.command_channel
            .execute(&self.session, &self.shared_state, CommandCode::EndTeachMode, &[], &[])
    }

    pub fn protective_stop(&self) -> Result<()> {
        self.command_channel
            .execute(&self.session, &self.shared_state, CommandCode::ProtectiveStop, &[], &[])
    }

    pub fn trigger_protective_stop(&self) -> Result<()> {
        self.command_channel.execute(
            &self.session,
            &self.shared_state,
            CommandCode::TriggerProtectiveStop,
            &[],
            &[],
        )
    }

    pub fn servo_l(&self, pose: [f64; 6], velocity: f64, acceleration: f64, lookahead: f64, gain: f64) -> Result<()> {
        validate::verify_within("tool_velocity", velocity, TOOL_VELOCITY)?;
        validate::verify_within("tool_acceleration", acceleration, TOOL_ACCELERATION)?;
        validate::verify_within("servo_lookahead", lookahead, validate::SERVO_LOOKAHEAD)?;
        validate::verify_within("servo_gain", gain, validate::SERVO_GAIN)?;
        let mut doubles = pose_payload(pose, velocity, acceleration);
        doubles.push((8, lookahead));
        doubles.push((9, gain));
        self.command_channel
            .execute(&self.session, &self.shared_state, CommandCode::ServoL, &[], &doubles)
    }

    pub fn servo_c(&self, pose: [f64; 6], velocity: f64, acceleration: f64, blend_radius: f64) -> Result<()> {
        validate::verify_within("tool_velocity", velocity, TOOL_VELOCITY)?;
        validate::verify_within("tool_acceleration", acceleration, TOOL_ACCELERATION)?;
        validate::verify_within("blend_radius", blend_radius, BLEND_RADIUS)?;
        let mut doubles = pose_payload(pose, velocity, acceleration);
        doubles.push((8, blend_radius));
        self.command_channel
            .execute(&self.session, &self.shared_state, CommandCode::ServoC, &[], &doubles)
    }

    pub fn speed_l(&self, xd: [f64; 6], acceleration: f64) -> Result<()> {
        validate::verify_within("tool_acceleration", acceleration, TOOL_ACCELERATION)?;
        let doubles = pose_payload(xd, 0.0, acceleration);
        self.command_channel
            .execute(&self.session, &self.shared_state, CommandCode::SpeedL, &[], &doubles)
    }

    pub fn servo_stop(&self, acceleration: f64) -> Result<()> {
        validate::verify_within("joint_acceleration", acceleration, JOINT_ACCELERATION)?;
        self.command_channel.execute(
            &self.session,
            &self.shared_state,
            CommandCode::ServoStop,
            &[],
            &[(0, acceleration)],
        )
    }

    pub fn speed_stop(&self, acceleration: f64) -> Result<()> {
        validate::verify_within("joint_acceleration", acceleration, JOINT_ACCELERATION)?;
        self.command_channel.execute(
            &self.session,
            &self.shared_state,
            CommandCode::SpeedStop,
            &[],
            &[(0, acceleration)],
        )
    }

    pub fn force_mode(
        &self,
        task_frame: [f64; 6],
        selection_vector: [i32; 6],
        wrench: [f64; 6],
        force_type: i32,
        limits: [f64; 6],
    ) -> Result<()> {
        let mut doubles: Vec<(u32, f64)> = task_frame.iter().enumerate().map(|(i, v)| (i as u32, *v)).collect();
        for (i, v) in wrench.iter().enumerate() {
            doubles.push((6 + i as u32, *v));
        }
        for (i, v) in limits.iter().enumerate() {
            doubles.push((12 + i as u32, *v));
        }
        let mut ints: Vec<(u32, i32)> = selection_vector.iter().enumerate().map(|(i, v)| (2 + i as u32, *v)).collect();
        ints.push((1, force_type));
        self.command_channel
            .execute(&self.session, &self.shared_state, CommandCode::ForceMode, &ints, &doubles)
    }

    pub fn force_mode_stop(&self) -> Result<()> {
        self.command_channel
            .execute(&self.session, &self.shared_state, CommandCode::ForceModeStop, &[], &[])
    }

    pub fn force_mode_damping(&self, damping: f64) -> Result<()> {
        self.command_channel.execute(
            &self.session,
            &self.shared_state,
            CommandCode::ForceModeDamping,
            &[],
            &[(0, damping)],
        )
    }

    pub fn force_mode_scaling(&self, scaling: f64) -> Result<()> {
        self.command_channel.execute(
            &self.session,
            &self.shared_state,
            CommandCode::ForceModeScaling,
            &[],
            &[(0, scaling)],
        )
    }

    pub fn zero_ft_sensor(&self) -> Result<()> {
        self.command_channel
            .execute(&self.session, &self.shared_state, CommandCode::ZeroFtSensor, &[], &[])
    }

    pub fn jog_start(&self, speeds: [f64; 6], feature: i32) -> Result<()> {
        let doubles: Vec<(u32, f64)> = speeds.iter().enumerate().map(|(i, v)| (i as u32, *v)).collect();
        self.command_channel
            .execute(&self.session, &self.shared_state, CommandCode::JogStart, &[(1, feature)], &doubles)
    }

    pub fn jog_stop(&self) -> Result<()> {
        self.command_channel
            .execute(&self.session, &self.shared_state, CommandCode::JogStop, &[], &[])
    }

    pub fn get_step_time(&self) -> Result<f64> {
        self.command_channel
            .execute_returning_vector(&self.session, &self.shared_state, CommandCode::GetStepTime, &[], &[])
            .map(|v| v[0])
    }

    pub fn get_target_waypoint(&self) -> Result<[f64; 6]> {
        self.command_channel
            .execute_returning_vector(&self.session, &self.shared_state, CommandCode::GetTargetWaypoint, &[], &[])
    }

    pub fn get_joint_torques(&self) -> Result<[f64; 6]> {
        self.command_channel
            .execute_returning_vector(&self.session, &self.shared_state, CommandCode::GetJointTorques, &[], &[])
    }

    pub fn get_tcp_offset(&self) -> Result<[f64; 6]> {
        self.command_channel
            .execute_returning_vector(&self.session, &self.shared_state, CommandCode::GetTcpOffset, &[], &[])
    }

    pub fn pose_trans(&self, pose_from: [f64; 6], pose_from_to: [f64; 6]) -> Result<[f64; 6]> {
        let mut doubles: Vec<(u32, f64)> = pose_from.iter().enumerate().map(|(i, v)| (i as u32, *v)).collect();
        for (i, v) in pose_from_to.iter().enumerate() {
            doubles.push((6 + i as u32, *v));
        }
        self.command_channel
            .execute_returning_vector(&self.session, &self.shared_state, CommandCode::PoseTrans, &[], &doubles)
    }

    pub fn is_joints_within_limits(&self, q: [f64; 6]) -> Result<bool> {
        let doubles = q.iter().enumerate().map(|(i, v)| (i as u32, *v)).collect::<Vec<_>>();
        self.command_channel.execute_returning_bool(
            &self.session,
            &self.shared_state,
            CommandCode::IsJointsWithinLimits,
            &[],
            &doubles,
        )
    }

    pub fn set_watchdog(&self, min_frequency_hz: f64) -> Result<()> {
        self.command_channel.execute(
            &self.session,
            &self.shared_state,
            CommandCode::SetWatchdog,
            &[],
            &[(0, min_frequency_hz)],
        )
    }

    pub fn kick_watchdog(&self) -> Result<()> {
        self.command_channel
            .execute(&self.session, &self.shared_state, CommandCode::KickWatchdog, &[], &[])
    }

    pub fn tool_contact(&self) -> Result<bool> {
        self.command_channel
            .execute_returning_bool(&self.session, &self.shared_state, CommandCode::ToolContact, &[], &[])
    }

    pub fn is_steady(&self) -> Result<bool> {
        self.command_channel
            .execute_returning_bool(&self.session, &self.shared_state, CommandCode::IsSteady, &[], &[])
    }

    pub fn is_pose_within_limits(&self, pose: [f64; 6]) -> Result<bool> {
        let doubles = pose.iter().enumerate().map(|(i, v)| (i as u32, *v)).collect::<Vec<_>>();
        self.command_channel.execute_returning_bool(
            &self.session,
            &self.shared_state,
            CommandCode::IsPoseWithinLimits,
            &[],
            &doubles,
        )
    }

    pub fn get_inverse_kin(&self, pose: [f64; 6]) -> Result<[f64; 6]> {
        let doubles = pose.iter().enumerate().map(|(i, v)| (i as u32, *v)).collect::<Vec<_>>();
        self.command_channel.execute_returning_vector(
            &self.session,
            &self.shared_state,
            CommandCode::GetInverseKin,
            &[],
            &doubles,
        )
    }

    pub fn get_forward_kin(&self, q: [f64; 6]) -> Result<[f64; 6]> {
        let doubles = q.iter().enumerate().map(|(i, v)| (i as u32, *v)).collect::<Vec<_>>();
        self.command_channel.execute_returning_vector(
            &self.session,
            &self.shared_state,
            CommandCode::GetForwardKin,
            &[],
            &doubles,
        )
    }

    /// MOVEJ_IK: move to a TCP pose via an inverse-kinematics joint move.
    pub fn move_j_ik(&self, pose: [f64; 6], velocity: f64, acceleration: f64) -> Result<()> {
        validate::verify_within("joint_velocity", velocity, JOINT_VELOCITY)?;
        validate::verify_within("joint_acceleration", acceleration, JOINT_ACCELERATION)?;
        let doubles = pose_payload(pose, velocity, acceleration);
        self.command_channel
            .execute(&self.session, &self.shared_state, CommandCode::MoveJIk, &[], &doubles)
    }

    /// MOVEL_FK: move to a joint configuration via a linear (forward-kinematics) TCP move.
    pub fn move_l_fk(&self, q: [f64; 6], velocity: f64, acceleration: f64) -> Result<()> {
        validate::verify_within("tool_velocity", velocity, TOOL_VELOCITY)?;
        validate::verify_within("tool_acceleration", acceleration, TOOL_ACCELERATION)?;
        let doubles = pose_payload(q, velocity, acceleration);
        self.command_channel
            .execute(&self.session, &self.shared_state, CommandCode::MoveLFk, &[], &doubles)
    }

    pub fn get_actual_joint_pos_history(&self, steps_back: i32) -> Result<[f64; 6]> {
        self.command_channel.execute_returning_vector(
            &self.session,
            &self.shared_state,
            CommandCode::GetActualJointPosHistory,
            &[(1, steps_back)],
            &[],
        )
    }

    /// Run a client-composed path asynchronously: upload it as a one-shot
    /// custom function, then kick off execution via the command channel and
    /// return once the script acknowledges it has started.
    pub fn move_path_async(&self, path: &Path) -> Result<()> {
        if path.is_empty() {
            return Err(RtdeError::validation("path has no waypoints"));
        }
        for waypoint in &path.waypoints {
            validate::verify_within("blend_radius", waypoint.blend_radius, BLEND_RADIUS)?;
        }
        let version = self.require_version()?;
        let base = self.command_channel.base();
        let function_name = "rtde_core_path";
        let script = path.to_script(function_name, base, base + 1);
        self.script_client.send_custom_script(&script, version)?;
        self.command_channel
            .execute_async(&self.session, &self.shared_state, CommandCode::MovePath, &[], &[])
    }

    pub fn async_progress(&self) -> Option<i32> {
        self.command_channel.async_progress(&self.shared_state)
    }

    pub fn state_snapshot(&self) -> RobotState {
        self.shared_state.read().unwrap().clone()
    }
}

/// Lay a six-vector plus velocity/acceleration into the double-register
/// payload offsets the command channel's canonical script expects: the
/// vector at 0..5, velocity at 6, acceleration at 7.
fn pose_payload(vector: [f64; 6], velocity: f64, acceleration: f64) -> Vec<(u32, f64)> {
    let mut doubles: Vec<(u32, f64)> = vector.iter().enumerate().map(|(i, v)| (i as u32, *v)).collect();
    doubles.push((6, velocity));
    doubles.push((7, acceleration));
    doubles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{frame, PacketType};
    use crate::command::path::{MoveType, PositionType, Waypoint};
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    fn reply_controller_version(stream: &mut std::net::TcpStream) {
        let _req = frame::read_one(stream).unwrap();
        let mut payload = Vec::new();
        for part in [5u32, 10, 0, 0] {
            payload.extend_from_slice(&(part as i32).to_be_bytes());
        }
        frame::write_one(stream, PacketType::RequestControllerVersion.code(), &payload).unwrap();
    }

    /// Spawn a mock RTDE controller that runs the whole connect handshake
    /// once, then holds the connection open briefly so the receive loop has
    /// something to read before the test tears it down.
    fn spawn_mock_controller(listener: TcpListener) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();

            let _version_req = frame::read_one(&mut stream).unwrap();
            frame::write_one(&mut stream, PacketType::RequestProtocolVersion.code(), &[1]).unwrap();

            reply_controller_version(&mut stream);

            let _output_setup = frame::read_one(&mut stream).unwrap();
            let mut out_reply = vec![1u8];
            out_reply.extend_from_slice(
                b"DOUBLE,VECTOR6D,VECTOR6D,VECTOR6D,VECTOR6D,UINT32,UINT32,UINT32,UINT32,INT32,INT32,INT32,INT32,INT32,DOUBLE,DOUBLE,DOUBLE,DOUBLE,DOUBLE,DOUBLE",
            );
            frame::write_one(&mut stream, PacketType::ControlPackageSetupOutputs.code(), &out_reply).unwrap();

            let _command_setup = frame::read_one(&mut stream).unwrap();
            let mut cmd_reply = vec![2u8];
            cmd_reply.extend_from_slice(b"INT32,INT32,INT32,INT32,INT32,INT32,INT32,INT32,DOUBLE,DOUBLE,DOUBLE,DOUBLE,DOUBLE,DOUBLE,DOUBLE,DOUBLE,DOUBLE,DOUBLE,DOUBLE,DOUBLE,DOUBLE,DOUBLE,DOUBLE,DOUBLE,DOUBLE,DOUBLE,DOUBLE,DOUBLE,DOUBLE,DOUBLE,DOUBLE,DOUBLE");
            frame::write_one(&mut stream, PacketType::ControlPackageSetupInputs.code(), &cmd_reply).unwrap();

            let _io_setup = frame::read_one(&mut stream).unwrap();
            let mut io_reply = vec![3u8];
            io_reply.extend_from_slice(b"UINT8,UINT8,UINT8,UINT8,UINT8,DOUBLE,DOUBLE,UINT32,DOUBLE");
            frame::write_one(&mut stream, PacketType::ControlPackageSetupInputs.code(), &io_reply).unwrap();

            let _start_req = frame::read_one(&mut stream).unwrap();
            frame::write_one(&mut stream, PacketType::ControlPackageStart.code(), &[1]).unwrap();

            let mut payload = vec![1u8];
            payload.extend_from_slice(&0.0f64.to_be_bytes()); // timestamp
            payload.extend_from_slice(&[0u8; 48 * 4]); // four VECTOR6D fields
            payload.extend_from_slice(&0u32.to_be_bytes()); // robot_status_bits
            payload.extend_from_slice(&0u32.to_be_bytes()); // safety_status_bits
            payload.extend_from_slice(&0u32.to_be_bytes()); // actual_digital_output_bits
            payload.extend_from_slice(&0u32.to_be_bytes()); // actual_digital_input_bits
            payload.extend_from_slice(&7i32.to_be_bytes()); // robot_mode = RUNNING
            payload.extend_from_slice(&1i32.to_be_bytes()); // safety_mode = NORMAL
            payload.extend_from_slice(&2i32.to_be_bytes()); // runtime_state = PLAYING
            payload.extend_from_slice(&1i32.to_be_bytes()); // output_int_register_base = READY
            payload.extend_from_slice(&(-1i32).to_be_bytes()); // output_int_register_base+1 = idle
            for _ in 0..6 {
                payload.extend_from_slice(&0.0f64.to_be_bytes());
            }
            frame::write_one(&mut stream, PacketType::DataPackageOutput.code(), &payload).unwrap();

            thread::sleep(Duration::from_millis(300));
        })
    }

    /// The script-upload channel only needs to accept and drain; the client
    /// never waits for a reply on it.
    fn spawn_mock_script_port(listener: TcpListener) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            use std::io::Read;
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = Vec::new();
            let _ = stream.read_to_end(&mut buf);
        })
    }

    #[test]
    fn pose_payload_lays_out_vector_velocity_and_acceleration() {
        let doubles = pose_payload([1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 0.5, 0.8);
        assert_eq!(doubles[0], (0, 1.0));
        assert_eq!(doubles[5], (5, 6.0));
        assert_eq!(doubles[6], (6, 0.5));
        assert_eq!(doubles[7], (7, 0.8));
    }

    #[test]
    fn move_j_rejects_out_of_range_velocity_without_sending_a_frame() {
        let config = RtdeConfig::new("127.0.0.1");
        let robot = Robot::new(config);
        let err = robot.move_j([0.0; 6], 10.0, 1.0).unwrap_err();
        assert!(matches!(err, RtdeError::Validation(_)));
    }

    #[test]
    fn move_path_rejects_empty_path() {
        let config = RtdeConfig::new("127.0.0.1");
        let robot = Robot::new(config);
        let path = Path::new();
        let err = robot.move_path_async(&path).unwrap_err();
        assert!(matches!(err, RtdeError::Validation(_)));
    }

    #[test]
    fn move_path_rejects_out_of_range_blend_radius() {
        let config = RtdeConfig::new("127.0.0.1");
        let mut robot = Robot::new(config);
        robot.controller_version = Some(ControllerVersion::new(5, 10, 0, 0));
        let mut path = Path::new();
        path.push(Waypoint::new(
            MoveType::MoveJ,
            PositionType::JointVector,
            [0.0; 6],
            1.0,
            1.0,
            5.0,
        ));
        let err = robot.move_path_async(&path).unwrap_err();
        assert!(matches!(err, RtdeError::Validation(_)));
    }

    #[test]
    fn full_connect_sequence_reaches_ready_state() {
        let rtde_listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let rtde_port = rtde_listener.local_addr().unwrap().port();
        let script_listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let script_port = script_listener.local_addr().unwrap().port();

        let rtde_server = spawn_mock_controller(rtde_listener);
        let script_server = spawn_mock_script_port(script_listener);

        let mut config = RtdeConfig::new("127.0.0.1");
        config.rtde_port = rtde_port;
        config.script_port = script_port;
        let mut robot = Robot::new(config);
        robot.connect("def prog():\nend\n").unwrap();
        assert!(robot.is_connected());
        assert_eq!(robot.controller_version(), Some(ControllerVersion::new(5, 10, 0, 0)));
        robot.disconnect();

        rtde_server.join().unwrap();
        script_server.join().unwrap();
    }
}
