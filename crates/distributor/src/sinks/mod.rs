//! Sink implementations

mod file;
mod log;
mod network;

pub use file::{FileSink, FileSinkConfig};
pub use log::LogSink;
pub use network::{
    FragmentHeader, Framing, NetworkSink, NetworkSinkConfig, DEFAULT_PACKET_SIZE, MAX_UDP_PAYLOAD,
    MIN_PACKET_SIZE,
};
