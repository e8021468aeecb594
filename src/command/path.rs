//! Client-side path composition: a sequence of waypoints serialized into
//! robot-script text for the secondary channel, per §4.5.

use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveType {
    MoveJ,
    MoveL,
    MoveP,
    MoveC,
}

impl MoveType {
    fn function_name(self) -> &'static str {
        match self {
            MoveType::MoveJ => "movej",
            MoveType::MoveL => "movel",
            MoveType::MoveP => "movep",
            MoveType::MoveC => "movec",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionType {
    TcpPose,
    JointVector,
}

/// One leg of a path: a target (pose or joint vector), the move that
/// reaches it, and the motion profile applied to that leg.
#[derive(Debug, Clone, Copy)]
pub struct Waypoint {
    pub move_type: MoveType,
    pub position_type: PositionType,
    pub values: [f64; 6],
    pub velocity: f64,
    pub acceleration: f64,
    pub blend_radius: f64,
}

impl Waypoint {
    pub fn new(
        move_type: MoveType,
        position_type: PositionType,
        values: [f64; 6],
        velocity: f64,
        acceleration: f64,
        blend_radius: f64,
    ) -> Self {
        Self {
            move_type,
            position_type,
            values,
            velocity,
            acceleration,
            blend_radius,
        }
    }

    fn target_literal(&self) -> String {
        let mut s = String::new();
        match self.position_type {
            PositionType::TcpPose => write!(s, "p[").unwrap(),
            PositionType::JointVector => write!(s, "[").unwrap(),
        }
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                s.push(',');
            }
            write!(s, "{v}").unwrap();
        }
        s.push(']');
        s
    }

    fn script_line(&self) -> String {
        format!(
            "  {}({}, a={}, v={}, r={})",
            self.move_type.function_name(),
            self.target_literal(),
            self.acceleration,
            self.velocity,
            self.blend_radius
        )
    }
}

/// An ordered set of waypoints, serialized as one custom-function body.
#[derive(Debug, Clone, Default)]
pub struct Path {
    pub waypoints: Vec<Waypoint>,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, waypoint: Waypoint) -> &mut Self {
        self.waypoints.push(waypoint);
        self
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// Render the path as a `def`-wrapped function body. `function_name`
    /// must be unique per upload; `done_register` and `progress_register`
    /// are write-targets the script touches so the host can observe
    /// completion and per-waypoint progress the same way it observes any
    /// other command-channel acknowledgement.
    pub fn to_script(&self, function_name: &str, done_register: u32, progress_register: u32) -> String {
        let mut out = String::new();
        writeln!(out, "def {function_name}():").unwrap();
        for (i, waypoint) in self.waypoints.iter().enumerate() {
            out.push_str(&waypoint.script_line());
            out.push('\n');
            writeln!(out, "  write_output_integer_register({progress_register}, {i})").unwrap();
        }
        writeln!(out, "  write_output_integer_register({progress_register}, -1)").unwrap();
        writeln!(out, "  write_output_integer_register({done_register}, 2)").unwrap();
        writeln!(out, "end").unwrap();
        out
    }
}
