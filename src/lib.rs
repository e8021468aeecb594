//! ur_rtde_core
//!
//! Pure Rust implementation of the RTDE (Real-Time Data Exchange) transport
//! and command-orchestration core for Universal Robots controllers.
//! Based on UR's official RTDE specification.

pub mod codec;
pub mod command;
pub mod config;
pub mod error;
pub mod io;
pub mod receive;
pub mod recipe;
pub mod robot;
pub mod script;
pub mod session;
pub mod state;
pub mod version;

pub use codec::{FieldType, FieldValue, PacketType};
pub use command::path::{MoveType, Path, PositionType, Waypoint};
pub use command::{CommandChannel, CommandCode};
pub use config::RtdeConfig;
pub use error::{Result, RtdeError};
pub use io::IoFacade;
pub use recipe::{FieldDescriptor, Recipe};
pub use robot::Robot;
pub use script::ScriptClient;
pub use session::{ConnectionState, RtdeSession};
pub use state::{RobotState, SharedState};
pub use version::ControllerVersion;
