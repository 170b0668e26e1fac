// src/transport/command_sink.rs
//
// Outbound command connection to the robot's actuation endpoint. Commands
// go out either as newline-delimited JSON twists (the original desktop wire
// format) or as fixed 4-byte binary packets. A failed write closes the
// socket, reconnects once, and retries the single write; a second failure
// surfaces as SendError so the loop can skip the cycle.

use std::io::{self, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::controller::{Command, CommandMode};
use crate::transport::packet::CommandPacket;
use crate::types::WireFormat;

#[derive(Debug, Error)]
pub enum SendError {
    #[error("not connected and reconnect failed: {0}")]
    Reconnect(#[source] io::Error),
    #[error("write failed after reconnect: {0}")]
    Write(#[source] io::Error),
}

/// JSON wire shape expected by the robot:
/// `{"type":"STOP","data":{...}}` / `{"type":"SET_TWIST","data":{...}}`.
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data")]
enum WireCommand {
    #[serde(rename = "STOP")]
    Stop { distance_cm: f32 },
    #[serde(rename = "SET_TWIST")]
    SetTwist {
        vx: f32,
        wz: f32,
        distance_cm: f32,
    },
}

impl From<&Command> for WireCommand {
    fn from(cmd: &Command) -> Self {
        match cmd.mode {
            CommandMode::Stop => WireCommand::Stop {
                distance_cm: cmd.distance_cm,
            },
            // SEARCH rides the same twist message as GO
            CommandMode::Go | CommandMode::Search => WireCommand::SetTwist {
                vx: cmd.vx,
                wz: cmd.wz,
                distance_cm: cmd.distance_cm,
            },
        }
    }
}

/// Serialize a command for the configured wire format. Pure so tests cover
/// it without a socket.
pub fn encode_command(
    cmd: &Command,
    format: WireFormat,
    stop_distance_cm: f32,
) -> Vec<u8> {
    match format {
        WireFormat::Json => {
            // serde_json can't fail on this enum shape
            let mut line = serde_json::to_vec(&WireCommand::from(cmd)).unwrap_or_default();
            line.push(b'\n');
            line
        }
        WireFormat::Binary => CommandPacket::from_command(cmd, stop_distance_cm)
            .encode()
            .to_vec(),
    }
}

pub struct CommandSink {
    host: String,
    port: u16,
    format: WireFormat,
    stop_distance_cm: f32,
    connect_timeout: Duration,
    reconnect_delay: Duration,
    print_cmd: bool,
    stream: Option<TcpStream>,
    running: Arc<AtomicBool>,
}

impl CommandSink {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        host: &str,
        port: u16,
        format: WireFormat,
        stop_distance_cm: f32,
        connect_timeout: Duration,
        reconnect_delay: Duration,
        print_cmd: bool,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            host: host.to_string(),
            port,
            format,
            stop_distance_cm,
            connect_timeout,
            reconnect_delay,
            print_cmd,
            stream: None,
            running,
        }
    }

    /// Block until the actuation endpoint accepts, retrying with the fixed
    /// delay. Returns false only if shutdown was requested first.
    pub fn connect(&mut self) -> bool {
        if self.stream.is_some() {
            return true;
        }
        while self.running.load(Ordering::SeqCst) {
            match self.try_connect() {
                Ok(stream) => {
                    info!("command link connected to {}:{}", self.host, self.port);
                    self.stream = Some(stream);
                    return true;
                }
                Err(e) => {
                    warn!(
                        "command connect failed: {}; retry in {:.1}s",
                        e,
                        self.reconnect_delay.as_secs_f64()
                    );
                    std::thread::sleep(self.reconnect_delay);
                }
            }
        }
        false
    }

    fn try_connect(&self) -> io::Result<TcpStream> {
        let addr = format!("{}:{}", self.host, self.port);
        let sock_addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no address resolved"))?;
        let stream = TcpStream::connect_timeout(&sock_addr, self.connect_timeout)?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    /// Send one command. On a write failure the connection is closed and
    /// re-established once, then the write retried; the second failure is
    /// the caller's to handle (skip this cycle, never crash the loop).
    pub fn send(&mut self, cmd: &Command) -> Result<(), SendError> {
        let buf = encode_command(cmd, self.format, self.stop_distance_cm);
        if self.print_cmd {
            debug!("CMD: {}", cmd.reason);
        }

        if self.stream.is_none() {
            self.stream = Some(self.try_connect().map_err(SendError::Reconnect)?);
        }
        if self.write_all(&buf).is_ok() {
            return Ok(());
        }

        // Reconnect once, retry the single write
        warn!("command write failed; reconnecting");
        self.close();
        self.stream = Some(self.try_connect().map_err(SendError::Reconnect)?);
        self.write_all(&buf).map_err(SendError::Write)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self.stream.as_mut() {
            Some(stream) => stream.write_all(buf),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "no stream")),
        }
    }

    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }
}

impl Drop for CommandSink {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{Command, CommandMode};

    fn go_command() -> Command {
        Command {
            mode: CommandMode::Go,
            vx: 0.25,
            wz: -0.5,
            distance_cm: 125.0,
            angle_deg: -28.6,
            target_class: 39,
            reason: "GO".to_string(),
        }
    }

    #[test]
    fn test_json_line_wire_shape() {
        let buf = encode_command(&go_command(), WireFormat::Json, 55.0);
        assert_eq!(*buf.last().unwrap(), b'\n');
        let v: serde_json::Value = serde_json::from_slice(&buf[..buf.len() - 1]).unwrap();
        assert_eq!(v["type"], "SET_TWIST");
        assert!((v["data"]["vx"].as_f64().unwrap() - 0.25).abs() < 1e-6);
        assert!((v["data"]["distance_cm"].as_f64().unwrap() - 125.0).abs() < 1e-6);
    }

    #[test]
    fn test_stop_json_carries_unknown_distance() {
        let buf = encode_command(&Command::stop_no_data(), WireFormat::Json, 55.0);
        let v: serde_json::Value = serde_json::from_slice(&buf[..buf.len() - 1]).unwrap();
        assert_eq!(v["type"], "STOP");
        assert_eq!(v["data"]["distance_cm"], -1.0);
    }

    #[test]
    fn test_binary_format_is_fixed_four_bytes() {
        let buf = encode_command(&go_command(), WireFormat::Binary, 55.0);
        assert_eq!(buf.len(), 4);
        // 125 cm → 50% band, bearing rounds to -29, state = class
        assert_eq!(buf[0], 50);
        assert_eq!(i16::from_be_bytes([buf[1], buf[2]]), -29);
        assert_eq!(buf[3], 39);
    }
}
