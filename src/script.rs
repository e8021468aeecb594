//! The script-upload collaborator: a one-shot plain-text TCP connection to
//! port 30002 that feeds the control script (and later, custom functions)
//! to the controller.

use std::io::Write;
use std::net::TcpStream;

use regex::Regex;

use crate::error::{Result, RtdeError};
use crate::version::ControllerVersion;

/// One line of the canonical script, optionally gated by a `$MN` marker
/// (major/minor version prefix): keep the line if the live controller is
/// at least that version, drop it otherwise.
fn marker_regex() -> Regex {
    Regex::new(r"^\$(\d+)\.(\d+)\s").expect("static $MN regex is valid")
}

/// Apply the `$MN` template-substitution pass described in §4.7. A line
/// that starts with `$M.N ` keeps everything after the marker if
/// `version.is_at_least(M, N)`; the whole line is dropped otherwise. A line
/// starting with `$` that doesn't parse as `$M.N ` is a fatal upload error.
pub fn apply_template(text: &str, version: ControllerVersion) -> Result<String> {
    let re = marker_regex();
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix('$') {
            let caps = re.captures(line).ok_or_else(|| {
                RtdeError::protocol(format!("malformed $MN marker in script line: '{line}'"))
            })?;
            let major: u32 = caps[1].parse().unwrap();
            let minor: u32 = caps[2].parse().unwrap();
            if version.is_at_least(major, minor) {
                let space = rest.find(' ').unwrap_or(rest.len());
                out.push_str(rest[space..].trim_start());
                out.push('\n');
            }
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    Ok(out)
}

/// Connects to the secondary (script-upload) port for each call; the
/// controller expects a short-lived connection per upload, not a
/// persistent one.
#[derive(Debug, Clone)]
pub struct ScriptClient {
    host: String,
    port: u16,
}

impl ScriptClient {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    fn send_raw(&self, text: &str) -> Result<()> {
        let mut stream = TcpStream::connect((self.host.as_str(), self.port)).map_err(|e| {
            RtdeError::transport(format!(
                "failed to connect to script channel {}:{}: {e}",
                self.host, self.port
            ))
        })?;
        stream
            .write_all(text.as_bytes())
            .map_err(|e| RtdeError::transport(format!("failed to upload script: {e}")))?;
        if !text.ends_with('\n') {
            stream
                .write_all(b"\n")
                .map_err(|e| RtdeError::transport(format!("failed to upload script: {e}")))?;
        }
        Ok(())
    }

    /// Upload the command-channel control script, once per session, after
    /// applying the `$MN` template pass against the live controller version.
    pub fn upload_control_script(&self, text: &str, version: ControllerVersion) -> Result<()> {
        let rendered = apply_template(text, version)?;
        tracing::info!(bytes = rendered.len(), "uploading control script");
        self.send_raw(&rendered)
    }

    /// Send a one-shot custom function body (used by `sendCustomScript`,
    /// `sendCustomScriptFile`, and asynchronous path execution).
    pub fn send_custom_script(&self, text: &str, version: ControllerVersion) -> Result<()> {
        let rendered = apply_template(text, version)?;
        tracing::debug!(bytes = rendered.len(), "sending custom script");
        self.send_raw(&rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;
    use std::thread;

    fn v(major: u32, minor: u32) -> ControllerVersion {
        ControllerVersion::new(major, minor, 0, 0)
    }

    #[test]
    fn keeps_lines_whose_marker_version_is_satisfied() {
        let text = "def prog():\n$5.1 set_gravity([0,0,-9.82])\nend\n";
        let rendered = apply_template(text, v(5, 10)).unwrap();
        assert!(rendered.contains("set_gravity"));
    }

    #[test]
    fn drops_lines_whose_marker_version_is_not_satisfied() {
        let text = "def prog():\n$5.11 some_new_feature()\nend\n";
        let rendered = apply_template(text, v(5, 10)).unwrap();
        assert!(!rendered.contains("some_new_feature"));
    }

    #[test]
    fn malformed_marker_is_fatal() {
        let text = "$bogus line\n";
        let err = apply_template(text, v(5, 10)).unwrap_err();
        assert!(matches!(err, RtdeError::Protocol(_)));
    }

    #[test]
    fn upload_sends_bytes_over_the_script_port() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = std::sync::mpsc::channel();

        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = String::new();
            stream.read_to_string(&mut buf).unwrap();
            tx.send(buf).unwrap();
        });

        let client = ScriptClient::new("127.0.0.1", port);
        client
            .upload_control_script("def prog():\nend", v(5, 10))
            .unwrap();

        let received = rx.recv_timeout(std::time::Duration::from_secs(1)).unwrap();
        assert!(received.contains("def prog():"));
    }
}
