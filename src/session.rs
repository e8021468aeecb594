//! The RTDE session: socket ownership, the connect/negotiate/setup/start
//! state machine, and per-tick frame dispatch.

use std::collections::HashMap;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use socket2::Socket;

use crate::codec::{frame, FieldValue, PacketType};
use crate::error::{Result, RtdeError};
use crate::recipe::{self, Recipe};
use crate::state::SharedState;
use crate::version::ControllerVersion;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Started,
    Paused,
}

/// Owns the RTDE socket and walks the session state machine described in
/// SPEC_FULL §4.2. Writes (setup, start/pause, command frames) are
/// serialized through `write_stream`'s mutex; the cloned `read_stream` is
/// handed off to the receive loop once streaming starts, since a `TcpStream`
/// clone shares the underlying socket and can be read concurrently with
/// writes on the original handle.
pub struct RtdeSession {
    host: String,
    port: u16,
    state: ConnectionState,
    write_stream: Mutex<Option<TcpStream>>,
    read_stream: Option<TcpStream>,
    protocol_version: u16,
    output_recipe: Option<Recipe>,
    input_recipes: Vec<Recipe>,
    next_input_recipe_id: u8,
    /// Shared with the receive loop so it can flip this to `false` the
    /// moment it exits on an I/O error, instead of `is_connected` only
    /// catching up once the caller happens to call `reconnect`.
    connected: Arc<AtomicBool>,
}

impl RtdeSession {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            state: ConnectionState::Disconnected,
            write_stream: Mutex::new(None),
            read_stream: None,
            protocol_version: 1,
            output_recipe: None,
            input_recipes: Vec::new(),
            next_input_recipe_id: 2,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// A clone of the shared connected flag, handed to the receive loop so
    /// it can report a transport failure back to the session without a
    /// reference cycle.
    pub fn connected_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.connected)
    }

    pub fn protocol_version(&self) -> u16 {
        self.protocol_version
    }

    pub fn output_recipe(&self) -> Option<&Recipe> {
        self.output_recipe.as_ref()
    }

    /// Open a TCP connection with `TCP_NODELAY` and `SO_REUSEADDR` set, per
    /// SPEC_FULL §4.2.
    pub fn connect(&mut self) -> Result<()> {
        let stream = TcpStream::connect((self.host.as_str(), self.port)).map_err(|e| {
            RtdeError::transport(format!("failed to connect to {}:{}: {e}", self.host, self.port))
        })?;

        let socket = Socket::from(stream);
        socket
            .set_nodelay(true)
            .map_err(|e| RtdeError::transport(format!("failed to set TCP_NODELAY: {e}")))?;
        socket
            .set_reuse_address(true)
            .map_err(|e| RtdeError::transport(format!("failed to set SO_REUSEADDR: {e}")))?;
        let stream: TcpStream = socket.into();

        let read_stream = stream
            .try_clone()
            .map_err(|e| RtdeError::transport(format!("failed to clone socket: {e}")))?;

        *self.write_stream.lock().unwrap() = Some(stream);
        self.read_stream = Some(read_stream);
        self.state = ConnectionState::Connected;
        self.connected.store(true, Ordering::Relaxed);
        tracing::info!(host = %self.host, port = self.port, "connected to RTDE interface");
        Ok(())
    }

    fn with_write_stream<T>(&self, f: impl FnOnce(&mut TcpStream) -> Result<T>) -> Result<T> {
        let mut guard = self.write_stream.lock().unwrap();
        let stream = guard
            .as_mut()
            .ok_or_else(|| RtdeError::transport("not connected"))?;
        f(stream)
    }

    /// Attempt protocol version 2; pin to 1 if the controller rejects it.
    pub fn negotiate_protocol_version(&mut self, requested: u16) -> Result<u16> {
        let reply = self.with_write_stream(|stream| {
            frame::write_one(stream, PacketType::RequestProtocolVersion.code(), &requested.to_be_bytes())?;
            frame::read_one(stream)
        })?;

        if reply.type_code != PacketType::RequestProtocolVersion.code() {
            return Err(RtdeError::protocol(format!(
                "expected protocol version reply, got type {}",
                reply.type_code
            )));
        }
        let accepted = reply.payload.first().copied().unwrap_or(0) != 0;
        self.protocol_version = if accepted { requested } else { 1 };
        tracing::info!(pinned = self.protocol_version, "negotiated RTDE protocol version");
        Ok(self.protocol_version)
    }

    /// Request controller version (major/minor/bugfix/build as four i32s).
    pub fn request_controller_version(&mut self) -> Result<ControllerVersion> {
        let reply = self.with_write_stream(|stream| {
            frame::write_one(stream, PacketType::RequestControllerVersion.code(), &[])?;
            frame::read_one(stream)
        })?;
        if reply.type_code != PacketType::RequestControllerVersion.code() {
            return Err(RtdeError::protocol(format!(
                "expected controller version reply, got type {}",
                reply.type_code
            )));
        }
        if reply.payload.len() != 16 {
            return Err(RtdeError::protocol(format!(
                "controller version payload must be 16 bytes, got {}",
                reply.payload.len()
            )));
        }
        let read_i32 = |slice: &[u8]| i32::from_be_bytes(slice.try_into().unwrap()) as u32;
        Ok(ControllerVersion::new(
            read_i32(&reply.payload[0..4]),
            read_i32(&reply.payload[4..8]),
            read_i32(&reply.payload[8..12]),
            read_i32(&reply.payload[12..16]),
        ))
    }

    /// Negotiate the output recipe. `frequency` is sent only under protocol
    /// 2; under protocol 1 the controller streams at its implicit 125 Hz.
    pub fn send_output_setup(&mut self, names: &[String], frequency: f64) -> Result<&Recipe> {
        let mut payload = Vec::new();
        if self.protocol_version >= 2 {
            payload.extend_from_slice(&frequency.to_be_bytes());
        }
        payload.extend_from_slice(names.join(",").as_bytes());

        let reply = self.with_write_stream(|stream| {
            frame::write_one(stream, PacketType::ControlPackageSetupOutputs.code(), &payload)?;
            frame::read_one(stream)
        })?;
        if reply.type_code != PacketType::ControlPackageSetupOutputs.code() {
            return Err(RtdeError::protocol(format!(
                "expected output setup reply, got type {}",
                reply.type_code
            )));
        }
        if reply.payload.is_empty() {
            return Err(RtdeError::protocol("empty output setup reply"));
        }
        let recipe_id = reply.payload[0];
        let type_list = String::from_utf8_lossy(&reply.payload[1..]).to_string();
        let fields = recipe::parse_type_list(names, &type_list)?;

        let recipe = Recipe::new(recipe_id, fields);
        tracing::info!(recipe_id, variables = names.len(), "output recipe established");
        self.output_recipe = Some(recipe);
        Ok(self.output_recipe.as_ref().unwrap())
    }

    /// Declare one more input recipe; each call is independently addressed
    /// by the id the controller assigns in its reply.
    pub fn send_input_setup(&mut self, names: &[String]) -> Result<u8> {
        let payload = names.join(",").into_bytes();
        let reply = self.with_write_stream(|stream| {
            frame::write_one(stream, PacketType::ControlPackageSetupInputs.code(), &payload)?;
            frame::read_one(stream)
        })?;
        if reply.type_code != PacketType::ControlPackageSetupInputs.code() {
            return Err(RtdeError::protocol(format!(
                "expected input setup reply, got type {}",
                reply.type_code
            )));
        }
        if reply.payload.is_empty() {
            return Err(RtdeError::protocol("empty input setup reply"));
        }
        let recipe_id = reply.payload[0];
        let type_list = String::from_utf8_lossy(&reply.payload[1..]).to_string();
        let fields = recipe::parse_type_list(names, &type_list)?;

        let recipe = Recipe::new(recipe_id, fields);
        tracing::info!(recipe_id, variables = names.len(), "input recipe established");
        self.input_recipes.push(recipe);
        self.next_input_recipe_id = self.next_input_recipe_id.max(recipe_id + 1);
        Ok(recipe_id)
    }

    pub fn start(&mut self) -> Result<()> {
        let reply = self.with_write_stream(|stream| {
            frame::write_one(stream, PacketType::ControlPackageStart.code(), &[])?;
            frame::read_one(stream)
        })?;
        let accepted = reply.payload.first().copied().unwrap_or(0) != 0;
        if !accepted {
            return Err(RtdeError::protocol("controller rejected start request"));
        }
        self.state = ConnectionState::Started;
        tracing::info!("RTDE streaming started");
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        let reply = self.with_write_stream(|stream| {
            frame::write_one(stream, PacketType::ControlPackagePause.code(), &[])?;
            frame::read_one(stream)
        })?;
        let accepted = reply.payload.first().copied().unwrap_or(0) != 0;
        if !accepted {
            return Err(RtdeError::protocol("controller rejected pause request"));
        }
        self.state = ConnectionState::Paused;
        tracing::info!("RTDE streaming paused");
        Ok(())
    }

    pub fn disconnect(&mut self) {
        *self.write_stream.lock().unwrap() = None;
        self.read_stream = None;
        self.state = ConnectionState::Disconnected;
        self.connected.store(false, Ordering::Relaxed);
        tracing::info!("RTDE session disconnected");
    }

    /// Hand the read half off to the receive loop. Only valid once, right
    /// before spawning the background thread.
    pub fn take_read_stream(&mut self) -> Result<TcpStream> {
        self.read_stream
            .take()
            .ok_or_else(|| RtdeError::transport("read stream already taken or not connected"))
    }

    /// Look up a previously declared input recipe by id.
    pub fn input_recipe(&self, id: u8) -> Option<&Recipe> {
        self.input_recipes.iter().find(|r| r.id == id)
    }

    /// Register an input recipe without running the setup handshake, so
    /// tests of the command channel and I/O facade don't need a full mock
    /// controller just to get a recipe in place.
    #[cfg(test)]
    pub fn test_inject_input_recipe(&mut self, recipe: Recipe) {
        self.input_recipes.push(recipe);
    }

    /// Encode and send an input data package against `recipe_id`.
    pub fn send(&self, recipe_id: u8, values: &HashMap<String, FieldValue>) -> Result<()> {
        let recipe = self
            .input_recipe(recipe_id)
            .ok_or_else(|| RtdeError::protocol(format!("unknown input recipe id {recipe_id}")))?;
        let mut payload = vec![recipe_id];
        payload.extend_from_slice(&recipe.encode(values));
        self.with_write_stream(|stream| frame::write_one(stream, PacketType::DataPackageInput.code(), &payload))
    }
}

/// Read one output data package from `stream` into the shared snapshot,
/// using `output_recipe` to decode it. Stray text-message packets are
/// logged and skipped rather than treated as errors, per SPEC_FULL §4.2.
pub fn receive_data(stream: &mut TcpStream, output_recipe: &Recipe, shared: &SharedState) -> Result<()> {
    loop {
        let packet = frame::read_one(stream)?;
        match packet.type_code {
            t if t == PacketType::TextMessage.code() => {
                tracing::warn!(
                    message = %String::from_utf8_lossy(&packet.payload),
                    "RTDE text message from controller"
                );
                continue;
            }
            t if t == PacketType::DataPackageOutput.code() => {
                if packet.payload.is_empty() {
                    return Err(RtdeError::protocol("empty data package"));
                }
                let decoded = output_recipe.decode(&packet.payload[1..])?;
                let mut state = shared.write().unwrap();
                state.apply(decoded);
                return Ok(());
            }
            other => {
                return Err(RtdeError::protocol(format!("unexpected packet type {other} while streaming")));
            }
        }
    }
}
