// src/transport/packet.rs
//
// Fixed 4-byte big-endian command packet:
//   [speed_pct: u8 0..=100][angle_deg: i16 -180..=180][state: u8]
// All fields are clamped before encoding — never rely on wraparound.

use crate::controller::{search_speed_percent, speed_percent, Command, CommandMode};

pub const PACKET_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandPacket {
    pub speed_pct: u8,
    pub angle_deg: i16,
    pub state: u8,
}

impl CommandPacket {
    /// Build a packet from wider inputs, clamping every field to its
    /// wire range.
    pub fn new(speed_pct: i32, angle_deg: i32, state: i32) -> Self {
        Self {
            speed_pct: speed_pct.clamp(0, 100) as u8,
            angle_deg: angle_deg.clamp(-180, 180) as i16,
            state: state.clamp(0, 255) as u8,
        }
    }

    /// Derive the compact form from a structured command. Speed comes from
    /// the piecewise distance map, the angle is the rounded bearing, and
    /// `state` carries the tracked class (0 while searching or stopped
    /// without a target).
    pub fn from_command(cmd: &Command, stop_distance_cm: f32) -> Self {
        let speed = match cmd.mode {
            CommandMode::Stop => 0,
            CommandMode::Go => speed_percent(cmd.distance_cm, stop_distance_cm) as i32,
            CommandMode::Search => search_speed_percent() as i32,
        };
        Self::new(
            speed,
            cmd.angle_deg.round() as i32,
            cmd.target_class as i32,
        )
    }

    pub fn encode(&self) -> [u8; PACKET_LEN] {
        let angle = self.angle_deg.to_be_bytes();
        [self.speed_pct.min(100), angle[0], angle[1], self.state]
    }

    /// Decode the peer-side view of a packet, clamping out-of-range values
    /// a lenient sender may have produced.
    pub fn decode(bytes: &[u8; PACKET_LEN]) -> Self {
        let angle = i16::from_be_bytes([bytes[1], bytes[2]]);
        Self {
            speed_pct: bytes[0].min(100),
            angle_deg: angle.clamp(-180, 180),
            state: bytes[3],
        }
    }
}
