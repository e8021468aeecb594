//! The I/O facade: digital/analog/speed-slider outputs written directly to
//! the robot's own I/O mailbox fields, orthogonal to the control script.

use std::collections::HashMap;

use crate::codec::FieldValue;
use crate::error::Result;
use crate::session::RtdeSession;

/// Writes a fixed input recipe containing the standard/tool/analog/speed
/// I/O fields. Each output is a mask-plus-value pair so untouched bits are
/// preserved; mask for output `id` is `1 << id`.
#[derive(Debug, Clone, Copy)]
pub struct IoFacade {
    recipe_id: u8,
}

impl IoFacade {
    pub fn new(recipe_id: u8) -> Self {
        Self { recipe_id }
    }

    fn write_mask_value(
        &self,
        session: &RtdeSession,
        mask_field: &str,
        value_field: &str,
        mask: u8,
        value: u8,
    ) -> Result<()> {
        let mut values = HashMap::new();
        values.insert(mask_field.to_string(), FieldValue::Uint8(mask));
        values.insert(value_field.to_string(), FieldValue::Uint8(value));
        session.send(self.recipe_id, &values)
    }

    pub fn set_standard_digital_out(&self, session: &RtdeSession, id: u8, level: bool) -> Result<()> {
        let mask = 1u8 << id;
        let value = if level { mask } else { 0 };
        self.write_mask_value(
            session,
            "standard_digital_output_mask",
            "standard_digital_output",
            mask,
            value,
        )
    }

    pub fn set_tool_digital_out(&self, session: &RtdeSession, id: u8, level: bool) -> Result<()> {
        let mask = 1u8 << id;
        let value = if level { mask } else { 0 };
        self.write_mask_value(
            session,
            "tool_digital_output_mask",
            "tool_digital_output",
            mask,
            value,
        )
    }

    /// `fraction` is clamped by the caller; the controller expects 0.0–1.0.
    pub fn set_speed_slider(&self, session: &RtdeSession, fraction: f64) -> Result<()> {
        let mut values = HashMap::new();
        values.insert("speed_slider_mask".to_string(), FieldValue::Uint32(1));
        values.insert("speed_slider_fraction".to_string(), FieldValue::Double(fraction));
        session.send(self.recipe_id, &values)
    }

    pub fn set_analog_out(&self, session: &RtdeSession, id: u8, value: f64) -> Result<()> {
        let mask = 1u8 << id;
        let mut values = HashMap::new();
        values.insert("standard_analog_output_mask".to_string(), FieldValue::Uint8(mask));
        values.insert(format!("standard_analog_output_{id}"), FieldValue::Double(value));
        session.send(self.recipe_id, &values)
    }
}
