//! RTDE primitive field types and their big-endian wire encoding.

use crate::error::{Result, RtdeError};

/// One RTDE primitive type, with its fixed wire width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Bool,
    Uint8,
    Uint32,
    Uint64,
    Int32,
    Double,
    Vector3D,
    Vector6D,
    Vector6Int32,
    Vector6Uint32,
}

impl FieldType {
    /// Wire width in bytes.
    pub fn byte_width(self) -> usize {
        match self {
            FieldType::Bool => 1,
            FieldType::Uint8 => 1,
            FieldType::Uint32 => 4,
            FieldType::Uint64 => 8,
            FieldType::Int32 => 4,
            FieldType::Double => 8,
            FieldType::Vector3D => 24,
            FieldType::Vector6D => 48,
            FieldType::Vector6Int32 => 24,
            FieldType::Vector6Uint32 => 24,
        }
    }

    /// The name used on the wire in setup-reply type strings, e.g. "VECTOR6D".
    pub fn wire_name(self) -> &'static str {
        match self {
            FieldType::Bool => "BOOL",
            FieldType::Uint8 => "UINT8",
            FieldType::Uint32 => "UINT32",
            FieldType::Uint64 => "UINT64",
            FieldType::Int32 => "INT32",
            FieldType::Double => "DOUBLE",
            FieldType::Vector3D => "VECTOR3D",
            FieldType::Vector6D => "VECTOR6D",
            FieldType::Vector6Int32 => "VECTOR6INT32",
            FieldType::Vector6Uint32 => "VECTOR6UINT32",
        }
    }

    pub fn from_wire_name(s: &str) -> Option<Self> {
        Some(match s {
            "BOOL" => FieldType::Bool,
            "UINT8" => FieldType::Uint8,
            "UINT32" => FieldType::Uint32,
            "UINT64" => FieldType::Uint64,
            "INT32" => FieldType::Int32,
            "DOUBLE" => FieldType::Double,
            "VECTOR3D" => FieldType::Vector3D,
            "VECTOR6D" => FieldType::Vector6D,
            "VECTOR6INT32" => FieldType::Vector6Int32,
            "VECTOR6UINT32" => FieldType::Vector6Uint32,
            _ => return None,
        })
    }
}

/// A decoded field value. Scalars and vectors are both represented as an
/// `f64` sequence so the robot state cache can treat every field uniformly;
/// callers needing the exact integer type read it back through the typed
/// accessors in `state.rs`.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    Uint8(u8),
    Uint32(u32),
    Uint64(u64),
    Int32(i32),
    Double(f64),
    Vector3D([f64; 3]),
    Vector6D([f64; 6]),
    Vector6Int32([i32; 6]),
    Vector6Uint32([u32; 6]),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Bool(_) => FieldType::Bool,
            FieldValue::Uint8(_) => FieldType::Uint8,
            FieldValue::Uint32(_) => FieldType::Uint32,
            FieldValue::Uint64(_) => FieldType::Uint64,
            FieldValue::Int32(_) => FieldType::Int32,
            FieldValue::Double(_) => FieldType::Double,
            FieldValue::Vector3D(_) => FieldType::Vector3D,
            FieldValue::Vector6D(_) => FieldType::Vector6D,
            FieldValue::Vector6Int32(_) => FieldType::Vector6Int32,
            FieldValue::Vector6Uint32(_) => FieldType::Vector6Uint32,
        }
    }

    /// Best-effort scalar view, used by accessors that only care about a
    /// single numeric value (e.g. register reads).
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            FieldValue::Bool(b) => Some(b as u8 as f64),
            FieldValue::Uint8(v) => Some(v as f64),
            FieldValue::Uint32(v) => Some(v as f64),
            FieldValue::Uint64(v) => Some(v as f64),
            FieldValue::Int32(v) => Some(v as f64),
            FieldValue::Double(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_vector6d(&self) -> Option<[f64; 6]> {
        match self {
            FieldValue::Vector6D(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            FieldValue::Int32(v) => Some(v),
            FieldValue::Uint32(v) => Some(v as i32),
            _ => None,
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            FieldValue::Bool(b) => out.push(*b as u8),
            FieldValue::Uint8(v) => out.push(*v),
            FieldValue::Uint32(v) => out.extend_from_slice(&v.to_be_bytes()),
            FieldValue::Uint64(v) => out.extend_from_slice(&v.to_be_bytes()),
            FieldValue::Int32(v) => out.extend_from_slice(&v.to_be_bytes()),
            FieldValue::Double(v) => out.extend_from_slice(&v.to_be_bytes()),
            FieldValue::Vector3D(v) => {
                for x in v {
                    out.extend_from_slice(&x.to_be_bytes());
                }
            }
            FieldValue::Vector6D(v) => {
                for x in v {
                    out.extend_from_slice(&x.to_be_bytes());
                }
            }
            FieldValue::Vector6Int32(v) => {
                for x in v {
                    out.extend_from_slice(&x.to_be_bytes());
                }
            }
            FieldValue::Vector6Uint32(v) => {
                for x in v {
                    out.extend_from_slice(&x.to_be_bytes());
                }
            }
        }
    }

    pub fn decode(field_type: FieldType, bytes: &[u8]) -> Result<Self> {
        if bytes.len() != field_type.byte_width() {
            return Err(RtdeError::protocol(format!(
                "field {} expects {} bytes, got {}",
                field_type.wire_name(),
                field_type.byte_width(),
                bytes.len()
            )));
        }
        Ok(match field_type {
            FieldType::Bool => FieldValue::Bool(bytes[0] != 0),
            FieldType::Uint8 => FieldValue::Uint8(bytes[0]),
            FieldType::Uint32 => FieldValue::Uint32(u32::from_be_bytes(bytes.try_into().unwrap())),
            FieldType::Uint64 => FieldValue::Uint64(u64::from_be_bytes(bytes.try_into().unwrap())),
            FieldType::Int32 => FieldValue::Int32(i32::from_be_bytes(bytes.try_into().unwrap())),
            FieldType::Double => FieldValue::Double(f64::from_be_bytes(bytes.try_into().unwrap())),
            FieldType::Vector3D => {
                let mut v = [0.0f64; 3];
                for (i, slot) in v.iter_mut().enumerate() {
                    *slot = f64::from_be_bytes(bytes[i * 8..i * 8 + 8].try_into().unwrap());
                }
                FieldValue::Vector3D(v)
            }
            FieldType::Vector6D => {
                let mut v = [0.0f64; 6];
                for (i, slot) in v.iter_mut().enumerate() {
                    *slot = f64::from_be_bytes(bytes[i * 8..i * 8 + 8].try_into().unwrap());
                }
                FieldValue::Vector6D(v)
            }
            FieldType::Vector6Int32 => {
                let mut v = [0i32; 6];
                for (i, slot) in v.iter_mut().enumerate() {
                    *slot = i32::from_be_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap());
                }
                FieldValue::Vector6Int32(v)
            }
            FieldType::Vector6Uint32 => {
                let mut v = [0u32; 6];
                for (i, slot) in v.iter_mut().enumerate() {
                    *slot = u32::from_be_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap());
                }
                FieldValue::Vector6Uint32(v)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_round_trips() {
        let v = FieldValue::Double(-3.14159);
        let mut buf = Vec::new();
        v.encode(&mut buf);
        assert_eq!(buf.len(), 8);
        let decoded = FieldValue::decode(FieldType::Double, &buf).unwrap();
        assert_eq!(decoded, v);
    }

    #[test]
    fn vector6d_round_trips() {
        let v = FieldValue::Vector6D([1.0, -2.0, 3.5, 0.0, -0.25, 100.0]);
        let mut buf = Vec::new();
        v.encode(&mut buf);
        assert_eq!(buf.len(), 48);
        assert_eq!(FieldValue::decode(FieldType::Vector6D, &buf).unwrap(), v);
    }

    #[test]
    fn uint32_is_big_endian() {
        let v = FieldValue::Uint32(0x01020304);
        let mut buf = Vec::new();
        v.encode(&mut buf);
        assert_eq!(buf, vec![0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn decode_rejects_wrong_length() {
        let err = FieldValue::decode(FieldType::Double, &[0u8; 4]).unwrap_err();
        assert!(matches!(err, RtdeError::Protocol(_)));
    }

    #[test]
    fn wire_name_round_trips_through_from_wire_name() {
        for ty in [
            FieldType::Bool,
            FieldType::Uint8,
            FieldType::Uint32,
            FieldType::Uint64,
            FieldType::Int32,
            FieldType::Double,
            FieldType::Vector3D,
            FieldType::Vector6D,
            FieldType::Vector6Int32,
            FieldType::Vector6Uint32,
        ] {
            assert_eq!(FieldType::from_wire_name(ty.wire_name()), Some(ty));
        }
    }
}
