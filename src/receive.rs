//! The dedicated receive thread: one per session, the sole writer of the
//! shared robot state, cooperatively stopped rather than killed.

use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::error::RtdeError;
use crate::recipe::Recipe;
use crate::session;
use crate::state::SharedState;

/// Handle to the background receive thread. Dropping this without calling
/// `stop` leaves the thread running until the socket errors out on its own;
/// `stop` + `join` is the orderly shutdown path used by `disconnect`.
pub struct ReceiveLoop {
    stop: Arc<AtomicBool>,
    last_error: Arc<Mutex<Option<RtdeError>>>,
    handle: Option<JoinHandle<()>>,
}

impl ReceiveLoop {
    /// Spawn the thread. `stream` should be the session's cloned read half,
    /// obtained via `RtdeSession::take_read_stream` after `start()`. `connected`
    /// is the session's shared flag (`RtdeSession::connected_flag`); the loop
    /// clears it the moment it exits on a transport error, so `is_connected`
    /// reflects a silent failure immediately instead of only after the next
    /// `reconnect()` call.
    pub fn spawn(
        mut stream: TcpStream,
        output_recipe: Recipe,
        shared: SharedState,
        connected: Arc<AtomicBool>,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let last_error = Arc::new(Mutex::new(None));

        let stop_clone = Arc::clone(&stop);
        let last_error_clone = Arc::clone(&last_error);

        // A short read timeout keeps the loop responsive to the stop flag
        // even when the controller has nothing new to send.
        let _ = stream.set_read_timeout(Some(std::time::Duration::from_millis(200)));

        let handle = thread::Builder::new()
            .name("rtde-receive".into())
            .spawn(move || {
                while !stop_clone.load(Ordering::Relaxed) {
                    match session::receive_data(&mut stream, &output_recipe, &shared) {
                        Ok(()) => {}
                        Err(RtdeError::Io(e))
                            if e.kind() == std::io::ErrorKind::WouldBlock
                                || e.kind() == std::io::ErrorKind::TimedOut =>
                        {
                            continue;
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "receive loop terminating on error");
                            connected.store(false, Ordering::Relaxed);
                            *last_error_clone.lock().unwrap() = Some(e);
                            break;
                        }
                    }
                }
                tracing::debug!("receive loop exiting");
            })
            .expect("failed to spawn rtde-receive thread");

        Self {
            stop,
            last_error,
            handle: Some(handle),
        }
    }

    /// Signal the loop to stop after its current read and join it.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// The error that terminated the loop, if it has already exited on its
    /// own (e.g. the controller closed the connection).
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap().as_ref().map(|e| e.to_string())
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some() && !self.stop.load(Ordering::Relaxed)
    }
}

impl Drop for ReceiveLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{FieldType, PacketType};
    use crate::codec::frame;
    use crate::recipe::FieldDescriptor;
    use crate::state::new_shared_state;
    use std::net::TcpListener;
    use std::time::Duration;

    #[test]
    fn receive_loop_applies_frames_until_stopped() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            for i in 0..3 {
                let mut payload = vec![1u8];
                payload.extend_from_slice(&(i as f64).to_be_bytes());
                frame::write_one(&mut stream, PacketType::DataPackageOutput.code(), &payload).unwrap();
                thread::sleep(Duration::from_millis(20));
            }
            // Keep the connection open past the last write so the receive
            // loop's stop() wins the race instead of hitting EOF.
            thread::sleep(Duration::from_millis(300));
        });

        let stream = TcpStream::connect(addr).unwrap();
        let recipe = Recipe::new(1, vec![FieldDescriptor::new("timestamp", FieldType::Double)]);
        let shared = new_shared_state();
        let connected = Arc::new(AtomicBool::new(true));

        let mut loop_handle = ReceiveLoop::spawn(stream, recipe, Arc::clone(&shared), Arc::clone(&connected));
        thread::sleep(Duration::from_millis(150));
        loop_handle.stop();

        assert_eq!(shared.read().unwrap().timestamp(), Some(2.0));
        assert!(loop_handle.last_error().is_none());
        assert!(connected.load(Ordering::Relaxed));
        server.join().unwrap();
    }

    #[test]
    fn transport_error_clears_the_shared_connected_flag() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            // Dropping the stream immediately closes the connection, so the
            // next read on the client side sees EOF.
            drop(stream);
        });

        let stream = TcpStream::connect(addr).unwrap();
        let recipe = Recipe::new(1, vec![FieldDescriptor::new("timestamp", FieldType::Double)]);
        let shared = new_shared_state();
        let connected = Arc::new(AtomicBool::new(true));

        let mut loop_handle = ReceiveLoop::spawn(stream, recipe, shared, Arc::clone(&connected));
        server.join().unwrap();

        // Poll briefly for the loop to observe the EOF and exit; avoids a
        // fixed sleep racing the thread scheduler.
        for _ in 0..50 {
            if !connected.load(Ordering::Relaxed) {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }

        assert!(!connected.load(Ordering::Relaxed));
        assert!(loop_handle.last_error().is_some());
        loop_handle.stop();
    }
}
