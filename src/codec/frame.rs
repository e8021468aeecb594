//! RTDE packet framing: `[u16 total_length][u8 type][payload]`, big-endian.

use std::io::{Read, Write};

use crate::error::{Result, RtdeError};

/// RTDE packet type codes, bit-exact per the wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    RequestProtocolVersion = 86,   // 'V'
    RequestControllerVersion = 118, // 'v'
    TextMessage = 85,              // 'U'
    DataPackageOutput = 79,        // 'O'
    DataPackageInput = 73,         // 'I'
    ControlPackageSetupInputs = 77, // 'M'
    ControlPackageSetupOutputs = 79, // 'O' (shares the code with data-package output)
    ControlPackageStart = 83,      // 'S'
    ControlPackagePause = 80,      // 'P'
}

impl PacketType {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// One decoded packet: its raw type byte (kept raw because 'O' is shared
/// between data packages and output-setup replies; the session disambiguates
/// by context) and payload bytes.
#[derive(Debug, Clone)]
pub struct RawPacket {
    pub type_code: u8,
    pub payload: Vec<u8>,
}

/// Encode a packet: `len(payload)+3` as u16, the type byte, then payload.
pub fn encode(type_code: u8, payload: &[u8]) -> Result<Vec<u8>> {
    let total_len = payload.len() + 3;
    if total_len > u16::MAX as usize {
        return Err(RtdeError::protocol(format!(
            "packet payload too large: {} bytes",
            payload.len()
        )));
    }
    let mut out = Vec::with_capacity(total_len);
    out.extend_from_slice(&(total_len as u16).to_be_bytes());
    out.push(type_code);
    out.extend_from_slice(payload);
    Ok(out)
}

pub fn write_one(stream: &mut impl Write, type_code: u8, payload: &[u8]) -> Result<()> {
    let frame = encode(type_code, payload)?;
    stream
        .write_all(&frame)
        .map_err(|e| RtdeError::transport(format!("failed to write packet: {e}")))
}

/// Read exactly one packet. Refuses a declared length < 3 as a corrupt frame;
/// a short/failed payload read surfaces as a transport error since it means
/// the peer closed or the socket misbehaved mid-frame.
pub fn read_one(stream: &mut impl Read) -> Result<RawPacket> {
    let mut header = [0u8; 3];
    stream.read_exact(&mut header).map_err(wrap_read_error)?;

    let total_len = u16::from_be_bytes([header[0], header[1]]) as usize;
    if total_len < 3 {
        return Err(RtdeError::protocol(format!(
            "corrupt frame: declared length {total_len} is less than the 3-byte header"
        )));
    }
    let type_code = header[2];
    let payload_len = total_len - 3;

    let mut payload = vec![0u8; payload_len];
    if payload_len > 0 {
        stream.read_exact(&mut payload).map_err(wrap_read_error)?;
    }

    Ok(RawPacket { type_code, payload })
}

/// Preserve the `io::ErrorKind` for timeouts (the receive loop polls a
/// socket with a read deadline and needs to tell "nothing arrived yet"
/// apart from a genuine transport failure); everything else collapses to
/// a descriptive transport error.
fn wrap_read_error(e: std::io::Error) -> RtdeError {
    match e.kind() {
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => RtdeError::Io(e),
        _ => RtdeError::transport(format!("failed to read packet: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn encode_produces_expected_header() {
        let frame = encode(PacketType::ControlPackageStart.code(), &[]).unwrap();
        assert_eq!(frame, vec![0x00, 0x03, 83]);
    }

    #[test]
    fn round_trips_through_write_and_read() {
        let mut buf = Vec::new();
        write_one(&mut buf, PacketType::TextMessage.code(), b"hello").unwrap();
        let mut cursor = Cursor::new(buf);
        let packet = read_one(&mut cursor).unwrap();
        assert_eq!(packet.type_code, PacketType::TextMessage.code());
        assert_eq!(packet.payload, b"hello");
    }

    #[test]
    fn rejects_length_under_three() {
        let mut cursor = Cursor::new(vec![0x00, 0x02, 83]);
        let err = read_one(&mut cursor).unwrap_err();
        assert!(matches!(err, RtdeError::Protocol(_)));
    }

    #[test]
    fn rejects_truncated_payload() {
        // Declares 10 bytes total (7 payload) but only provides 2.
        let mut cursor = Cursor::new(vec![0x00, 0x0a, 79, 0x01, 0x02]);
        let err = read_one(&mut cursor).unwrap_err();
        assert!(matches!(err, RtdeError::Transport(_)));
    }

    #[test]
    fn reads_back_to_back_packets() {
        let mut buf = Vec::new();
        write_one(&mut buf, PacketType::ControlPackageStart.code(), &[1]).unwrap();
        write_one(&mut buf, PacketType::ControlPackagePause.code(), &[0]).unwrap();
        let mut cursor = Cursor::new(buf);
        let first = read_one(&mut cursor).unwrap();
        let second = read_one(&mut cursor).unwrap();
        assert_eq!(first.payload, vec![1]);
        assert_eq!(second.payload, vec![0]);
    }
}
