use std::fmt;

use jiff::Timestamp;

/// Addressable unit of board memory. Boards and the station agree on this
/// out of band, it is not negotiated over the wire.
pub const PAYLOAD_LEN: usize = 513;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderType {
    Ack,
    Ping,
    Read,
    Write,
    Exec,
}

impl HeaderType {
    /// Canonical name used in persisted documents
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ack => "ACK",
            Self::Ping => "PING",
            Self::Read => "READ",
            Self::Write => "WRITE",
            Self::Exec => "EXEC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyType {
    Memory,
    Sensors,
    Code,
}

impl BodyType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Memory => "MEMORY",
            Self::Sensors => "SENSORS",
            Self::Code => "CODE",
        }
    }
}

/// 96-bit board id, three words as reported by the board.
/// Displays as `0x` + 24 hex digits (each word zero-padded to 8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoardId {
    pub high: u32,
    pub medium: u32,
    pub low: u32,
}

impl BoardId {
    pub fn new(high: u32, medium: u32, low: u32) -> Self {
        Self { high, medium, low }
    }
}

impl fmt::Display for BoardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}{:08X}{:08X}", self.high, self.medium, self.low)
    }
}

/// Renders a memory address the way it is persisted
pub fn format_mem_address(addr: u32) -> String {
    format!("0x{addr:08x}")
}

/// A control packet from a board. The CRC has already been validated by
/// the transport and is stored verbatim.
#[derive(Debug, Clone)]
pub struct Header {
    pub kind: HeaderType,
    pub crc: u32,
    pub ttl: u32,
    pub board: BoardId,
    /// Capture time (UTC), stamped by the transport
    pub created: Timestamp,
}

/// A data packet: one payload sampled from a board at one address
#[derive(Debug, Clone)]
pub struct Body {
    pub kind: BodyType,
    pub crc: u32,
    pub board: BoardId,
    pub mem_address: u32,
    pub created: Timestamp,
    pub data: [u8; PAYLOAD_LEN],
}

/// What the transport hands to ingestion, already parsed
#[derive(Debug, Clone)]
pub enum Packet {
    Header(Header),
    Body(Body),
}
