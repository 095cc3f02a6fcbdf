use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Default size of a data frame payload in bytes.
pub const DATA_PAYLOAD_SIZE: usize = 1024;

/// Size of an acknowledgment frame in bytes.
pub const ACK_SIZE: usize = 10;

/// The two hosts of the point-to-point link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeId {
    Sender,
    Receiver,
}

impl NodeId {
    pub fn peer(&self) -> Self {
        match self {
            NodeId::Sender => NodeId::Receiver,
            NodeId::Receiver => NodeId::Sender,
        }
    }

    /// Fixed interface address of the node on the 10.1.1.0/24 link.
    pub fn address(&self) -> Ipv4Addr {
        match self {
            NodeId::Sender => Ipv4Addr::new(10, 1, 1, 1),
            NodeId::Receiver => Ipv4Addr::new(10, 1, 1, 2),
        }
    }
}

/// An (address, port) pair a node can bind to or send to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub addr: Ipv4Addr,
    pub port: u16,
}

impl Endpoint {
    pub const fn new(addr: Ipv4Addr, port: u16) -> Self {
        Self { addr, port }
    }

    /// Wildcard endpoint on `port`, resolved to the node's own address on bind.
    pub const fn any(port: u16) -> Self {
        Self::new(Ipv4Addr::UNSPECIFIED, port)
    }

    pub fn is_unspecified(&self) -> bool {
        self.addr.is_unspecified()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}

/// Single alternating bit identifying consecutive stop-and-wait frames.
///
/// Only the sender keeps one. It is never written into a [`Frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SequenceBit {
    #[default]
    Zero,
    One,
}

impl SequenceBit {
    pub fn flip(self) -> Self {
        match self {
            SequenceBit::Zero => SequenceBit::One,
            SequenceBit::One => SequenceBit::Zero,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            SequenceBit::Zero => 0,
            SequenceBit::One => 1,
        }
    }
}

impl fmt::Display for SequenceBit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// A frame on the wire: opaque bytes, no header.
///
/// Data frames and acks differ only in size. There is no sequence or
/// correlation field, so a receiver cannot tell a retransmission from a new
/// packet and a sender cannot tell which packet an ack belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub payload: Bytes,
}

impl Frame {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Zero-filled data frame of `size` bytes.
    pub fn data(size: usize) -> Self {
        Self::new(vec![0u8; size])
    }

    /// Fixed-size acknowledgment frame.
    pub fn ack() -> Self {
        Self::new(vec![0u8; ACK_SIZE])
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_bit_alternates() {
        let mut bit = SequenceBit::default();
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(bit.as_u8());
            bit = bit.flip();
        }
        assert_eq!(seen, vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn frames_have_fixed_sizes() {
        assert_eq!(Frame::data(DATA_PAYLOAD_SIZE).len(), 1024);
        assert_eq!(Frame::ack().len(), 10);
        assert!(Frame::new(Vec::new()).is_empty());
    }

    #[test]
    fn node_addresses_are_distinct() {
        assert_ne!(NodeId::Sender.address(), NodeId::Receiver.address());
        assert_eq!(NodeId::Sender.peer(), NodeId::Receiver);
        assert_eq!(Endpoint::any(8080).to_string(), "0.0.0.0:8080");
        assert!(Endpoint::any(8080).is_unspecified());
    }
}
