//! Output/input recipe tables: the name↔type↔offset mapping agreed at setup.

use std::collections::HashMap;

use crate::codec::{FieldType, FieldValue};
use crate::error::{Result, RtdeError};

/// One field in a recipe, in wire order.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// An ordered, controller-assigned set of fields agreed at setup time.
#[derive(Debug, Clone)]
pub struct Recipe {
    pub id: u8,
    pub fields: Vec<FieldDescriptor>,
}

impl Recipe {
    pub fn new(id: u8, fields: Vec<FieldDescriptor>) -> Self {
        Self { id, fields }
    }

    /// Index of `name` within this recipe's field order, if present.
    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Decode one data package payload (recipe id already stripped) into a
    /// name-keyed map, in the recipe's declared field order.
    pub fn decode(&self, mut payload: &[u8]) -> Result<HashMap<String, FieldValue>> {
        let mut out = HashMap::with_capacity(self.fields.len());
        for field in &self.fields {
            let width = field.field_type.byte_width();
            if payload.len() < width {
                return Err(RtdeError::protocol(format!(
                    "data package too short: missing field '{}' ({} bytes needed, {} left)",
                    field.name,
                    width,
                    payload.len()
                )));
            }
            let (head, rest) = payload.split_at(width);
            let value = FieldValue::decode(field.field_type, head)?;
            out.insert(field.name.clone(), value);
            payload = rest;
        }
        Ok(out)
    }

    /// Encode an input data package: every field in recipe order is written,
    /// defaulting to zero when `values` has no entry for that name.
    pub fn encode(&self, values: &HashMap<String, FieldValue>) -> Vec<u8> {
        let mut out = Vec::new();
        for field in &self.fields {
            match values.get(&field.name) {
                Some(v) => v.encode(&mut out),
                None => zero_value(field.field_type).encode(&mut out),
            }
        }
        out
    }
}

fn zero_value(field_type: FieldType) -> FieldValue {
    match field_type {
        FieldType::Bool => FieldValue::Bool(false),
        FieldType::Uint8 => FieldValue::Uint8(0),
        FieldType::Uint32 => FieldValue::Uint32(0),
        FieldType::Uint64 => FieldValue::Uint64(0),
        FieldType::Int32 => FieldValue::Int32(0),
        FieldType::Double => FieldValue::Double(0.0),
        FieldType::Vector3D => FieldValue::Vector3D([0.0; 3]),
        FieldType::Vector6D => FieldValue::Vector6D([0.0; 6]),
        FieldType::Vector6Int32 => FieldValue::Vector6Int32([0; 6]),
        FieldType::Vector6Uint32 => FieldValue::Vector6Uint32([0; 6]),
    }
}

/// Parse a setup reply's comma-separated type string into descriptors,
/// zipped against the variable names that were requested. A `NOT_FOUND`
/// entry anywhere is fatal per the setup handshake contract.
pub fn parse_type_list(names: &[String], type_list: &str) -> Result<Vec<FieldDescriptor>> {
    let types: Vec<&str> = type_list.split(',').collect();
    if types.len() != names.len() {
        return Err(RtdeError::protocol(format!(
            "setup reply has {} types but {} variables were requested",
            types.len(),
            names.len()
        )));
    }
    let mut fields = Vec::with_capacity(names.len());
    for (name, ty) in names.iter().zip(types.iter()) {
        if *ty == "NOT_FOUND" {
            return Err(RtdeError::protocol(format!(
                "controller does not recognize variable '{name}'"
            )));
        }
        let field_type = FieldType::from_wire_name(ty)
            .ok_or_else(|| RtdeError::protocol(format!("unknown field type '{ty}' for '{name}'")))?;
        fields.push(FieldDescriptor::new(name.clone(), field_type));
    }
    Ok(fields)
}
