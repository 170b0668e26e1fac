// src/transport/video_source.rs
//
// Inbound framed stream: each message is a 4-byte big-endian length prefix
// followed by an opaque encoded image. Reads are blocking with a deadline;
// any short read, closed connection, or timeout yields "no frame" and the
// caller reconnects and skips the cycle.

use std::io::{self, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

/// Reject absurd length prefixes from a corrupted or hostile stream.
const MAX_FRAME_BYTES: u32 = 32 * 1024 * 1024;

/// Read one length-prefixed frame from any byte stream. Short reads surface
/// as `UnexpectedEof` from `read_exact`; the caller treats every error the
/// same way (drop the connection, no frame this cycle).
pub fn read_frame_from<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut header = [0u8; 4];
    reader.read_exact(&mut header)?;
    let len = u32::from_be_bytes(header);
    if len > MAX_FRAME_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame length {} exceeds limit", len),
        ));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

/// Auto-reconnecting framed video source.
///
/// State machine: DISCONNECTED → CONNECTING → CONNECTED → (on any I/O
/// error) → DISCONNECTED. Reconnects retry forever with a fixed delay —
/// this is an always-on field link — but stop when the shutdown flag drops.
pub struct TcpVideoSource {
    host: String,
    port: u16,
    connect_timeout: Duration,
    read_timeout: Duration,
    reconnect_delay: Duration,
    stream: Option<TcpStream>,
    running: Arc<AtomicBool>,
}

impl TcpVideoSource {
    pub fn new(
        host: &str,
        port: u16,
        connect_timeout: Duration,
        read_timeout: Duration,
        reconnect_delay: Duration,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            host: host.to_string(),
            port,
            connect_timeout,
            read_timeout,
            reconnect_delay,
            stream: None,
            running,
        }
    }

    /// Block until connected, retrying with the fixed delay. Returns false
    /// only when shutdown was requested while still disconnected.
    pub fn connect(&mut self) -> bool {
        if self.stream.is_some() {
            return true;
        }
        let addr = format!("{}:{}", self.host, self.port);
        while self.running.load(Ordering::SeqCst) {
            match self.try_connect(&addr) {
                Ok(stream) => {
                    info!("video stream connected to {}", addr);
                    self.stream = Some(stream);
                    return true;
                }
                Err(e) => {
                    warn!(
                        "video connect to {} failed: {}; retry in {:.1}s",
                        addr,
                        e,
                        self.reconnect_delay.as_secs_f64()
                    );
                    std::thread::sleep(self.reconnect_delay);
                }
            }
        }
        false
    }

    fn try_connect(&self, addr: &str) -> io::Result<TcpStream> {
        let sock_addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no address resolved"))?;
        let stream = TcpStream::connect_timeout(&sock_addr, self.connect_timeout)?;
        stream.set_read_timeout(Some(self.read_timeout))?;
        Ok(stream)
    }

    /// Read one frame payload. `None` means the connection is gone or the
    /// deadline passed; the stream is dropped so the next `connect` call
    /// re-establishes it.
    pub fn read_frame(&mut self) -> Option<Vec<u8>> {
        let stream = self.stream.as_mut()?;
        match read_frame_from(stream) {
            Ok(payload) => {
                debug!("got frame: {} bytes", payload.len());
                Some(payload)
            }
            Err(e) => {
                warn!("frame read failed: {}; dropping connection", e);
                self.stream = None;
                None
            }
        }
    }

    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }
}

impl Drop for TcpVideoSource {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn framed(payload: &[u8]) -> Vec<u8> {
        let mut buf = (payload.len() as u32).to_be_bytes().to_vec();
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn test_reads_exact_payload() {
        let payload = b"jpeg-bytes-here".to_vec();
        let mut cursor = Cursor::new(framed(&payload));
        assert_eq!(read_frame_from(&mut cursor).unwrap(), payload);
    }

    #[test]
    fn test_two_frames_back_to_back() {
        let mut wire = framed(b"one");
        wire.extend(framed(b"two"));
        let mut cursor = Cursor::new(wire);
        assert_eq!(read_frame_from(&mut cursor).unwrap(), b"one");
        assert_eq!(read_frame_from(&mut cursor).unwrap(), b"two");
    }

    #[test]
    fn test_truncated_payload_is_an_error_not_a_panic() {
        let mut wire = framed(b"full-payload");
        wire.truncate(wire.len() - 4); // connection closed mid-payload
        let mut cursor = Cursor::new(wire);
        let err = read_frame_from(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_truncated_header_is_an_error() {
        let mut cursor = Cursor::new(vec![0u8, 0]);
        assert!(read_frame_from(&mut cursor).is_err());
    }

    #[test]
    fn test_zero_length_frame_is_empty_payload() {
        let mut cursor = Cursor::new(framed(b""));
        assert!(read_frame_from(&mut cursor).unwrap().is_empty());
    }

    #[test]
    fn test_oversized_length_prefix_rejected() {
        let mut wire = (u32::MAX).to_be_bytes().to_vec();
        wire.extend_from_slice(&[0u8; 16]);
        let mut cursor = Cursor::new(wire);
        let err = read_frame_from(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
