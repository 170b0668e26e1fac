// src/transport/mod.rs
//
// Framed stream transport: length-prefixed video frames in, command
// packets out, both over blocking TCP with bounded deadlines and a fixed
// reconnect delay.

pub mod command_sink;
pub mod packet;
pub mod video_source;

pub use command_sink::{CommandSink, SendError};
pub use packet::CommandPacket;
pub use video_source::TcpVideoSource;
