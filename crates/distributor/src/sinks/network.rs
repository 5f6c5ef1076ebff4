//! NetworkSink - best-effort UDP streaming
//!
//! Each frame is cut into datagrams of at most `max_packet_size` bytes.
//! With `fragmented` framing every datagram starts with a small bincode
//! header so a receiver can reassemble frames and spot losses; `raw`
//! framing sends the bare bitstream, which players reading Annex-B over
//! UDP accept directly. Send failures are logged and never stop the sink.

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use contracts::{ContractError, DataSink, Frame, SinkType};
pub use contracts::{MAX_UDP_PAYLOAD, MIN_PACKET_SIZE};
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tracing::{debug, info, instrument, warn};

/// Default datagram size, fits a typical Ethernet MTU
pub const DEFAULT_PACKET_SIZE: usize = 1400;

/// Datagram framing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// Bare bitstream chunks
    Raw,
    /// Chunks prefixed with a [`FragmentHeader`]
    #[default]
    Fragmented,
}

/// Per-datagram header for `fragmented` framing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentHeader {
    /// Frame sequence number
    pub seq: u64,
    /// Index of this fragment within the frame
    pub index: u16,
    /// Number of fragments the frame was cut into
    pub count: u16,
}

impl FragmentHeader {
    /// Encoded header size
    pub const LEN: usize = 12;

    fn encode_into(&self, buf: &mut Vec<u8>) -> Result<(), bincode::Error> {
        bincode::serialize_into(buf, self)
    }

    /// Split a received datagram into its header and payload
    pub fn decode(datagram: &[u8]) -> Option<(Self, &[u8])> {
        if datagram.len() < Self::LEN {
            return None;
        }
        let header = bincode::deserialize(&datagram[..Self::LEN]).ok()?;
        Some((header, &datagram[Self::LEN..]))
    }
}

/// Configuration for NetworkSink
#[derive(Debug, Clone)]
pub struct NetworkSinkConfig {
    /// Target address
    pub addr: SocketAddr,
    /// Datagram framing
    pub framing: Framing,
    /// Max datagram size, header included
    pub max_packet_size: usize,
}

impl NetworkSinkConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            framing: Framing::default(),
            max_packet_size: DEFAULT_PACKET_SIZE,
        }
    }

    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let addr_str = params
            .get("addr")
            .ok_or_else(|| "missing 'addr' parameter".to_string())?;

        let addr: SocketAddr = addr_str
            .parse()
            .map_err(|e| format!("invalid address '{}': {}", addr_str, e))?;

        let framing = match params.get("framing").map(String::as_str) {
            Some("raw") => Framing::Raw,
            Some("fragmented") | None => Framing::Fragmented,
            Some(other) => return Err(format!("unknown framing '{}'", other)),
        };

        let max_packet_size = match params.get("max_packet_size") {
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|e| format!("invalid max_packet_size '{}': {}", raw, e))?,
            None => DEFAULT_PACKET_SIZE,
        };
        if !(MIN_PACKET_SIZE..=MAX_UDP_PAYLOAD).contains(&max_packet_size) {
            return Err(format!(
                "max_packet_size {} out of range ({}..={})",
                max_packet_size, MIN_PACKET_SIZE, MAX_UDP_PAYLOAD
            ));
        }

        Ok(Self {
            addr,
            framing,
            max_packet_size,
        })
    }

    /// Payload bytes carried by one datagram
    fn chunk_size(&self) -> usize {
        match self.framing {
            Framing::Raw => self.max_packet_size,
            Framing::Fragmented => self.max_packet_size - FragmentHeader::LEN,
        }
    }
}

/// Sink that streams frames to a UDP peer
pub struct NetworkSink {
    name: String,
    config: NetworkSinkConfig,
    socket: Option<UdpSocket>,
    packet: Vec<u8>,
    packets_sent: u64,
    send_errors: u64,
}

impl NetworkSink {
    /// Create a new NetworkSink; the socket is opened on `start()`
    pub fn new(name: impl Into<String>, config: NetworkSinkConfig) -> Self {
        Self {
            name: name.into(),
            packet: Vec::with_capacity(config.max_packet_size),
            config,
            socket: None,
            packets_sent: 0,
            send_errors: 0,
        }
    }

    /// Create from params (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let config = NetworkSinkConfig::from_params(params)
            .map_err(|e| ContractError::config_validation(format!("sinks.{}.params", name), e))?;
        Ok(Self::new(name, config))
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets_sent
    }

    pub fn send_errors(&self) -> u64 {
        self.send_errors
    }
}

impl DataSink for NetworkSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SinkType {
        SinkType::Network
    }

    #[instrument(name = "network_sink_start", skip(self), fields(sink = %self.name))]
    async fn start(&mut self) -> Result<(), ContractError> {
        if self.socket.is_some() {
            return Ok(());
        }

        let bind: SocketAddr = if self.config.addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let connection_error = |e: std::io::Error| ContractError::SinkConnection {
            sink_name: self.name.clone(),
            message: e.to_string(),
        };

        let socket = UdpSocket::bind(bind).await.map_err(connection_error)?;
        socket
            .connect(self.config.addr)
            .await
            .map_err(connection_error)?;

        info!(
            sink = %self.name,
            target = %self.config.addr,
            framing = ?self.config.framing,
            max_packet_size = self.config.max_packet_size,
            "NetworkSink connected"
        );
        self.socket = Some(socket);
        Ok(())
    }

    /// Send one frame; fails only (non-fatally) when no datagram got out
    async fn forward(&mut self, frame: &Frame) -> Result<(), ContractError> {
        let socket = self
            .socket
            .as_ref()
            .ok_or_else(|| ContractError::SinkConnection {
                sink_name: self.name.clone(),
                message: "socket not connected".to_string(),
            })?;
        let chunk_size = self.config.chunk_size();
        let chunks: Vec<&[u8]> = if frame.is_empty() {
            vec![&[][..]]
        } else {
            frame.data.chunks(chunk_size).collect()
        };
        let count = u16::try_from(chunks.len()).map_err(|_| {
            ContractError::sink_transmit(
                &self.name,
                format!("frame {} needs {} datagrams", frame.seq, chunks.len()),
            )
        })?;

        let mut sent = 0u64;
        let mut last_error = None;
        for (index, chunk) in chunks.iter().enumerate() {
            self.packet.clear();
            if self.config.framing == Framing::Fragmented {
                let header = FragmentHeader {
                    seq: frame.seq,
                    index: index as u16,
                    count,
                };
                header
                    .encode_into(&mut self.packet)
                    .map_err(|e| ContractError::sink_transmit(&self.name, e.to_string()))?;
            }
            self.packet.extend_from_slice(chunk);

            match socket.send(&self.packet).await {
                Ok(_) => sent += 1,
                Err(e) => {
                    debug!(sink = %self.name, seq = frame.seq, index, error = %e, "UDP send failed");
                    last_error = Some(e);
                }
            }
        }

        self.packets_sent += sent;
        let failed = chunks.len() as u64 - sent;
        self.send_errors += failed;

        match last_error {
            Some(e) if sent == 0 => Err(ContractError::sink_transmit(
                &self.name,
                format!("frame {} not sent: {}", frame.seq, e),
            )),
            Some(e) => {
                warn!(sink = %self.name, seq = frame.seq, failed, error = %e, "frame partially sent");
                Ok(())
            }
            None => Ok(()),
        }
    }

    #[instrument(name = "network_sink_stop", skip(self), fields(sink = %self.name))]
    async fn stop(&mut self) -> Result<(), ContractError> {
        if self.socket.take().is_some() {
            info!(
                sink = %self.name,
                packets_sent = self.packets_sent,
                send_errors = self.send_errors,
                "NetworkSink closed"
            );
        }
        Ok(())
    }
}
