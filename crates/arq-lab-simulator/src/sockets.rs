//! Endpoint bookkeeping: which node owns which (address, port).

use arq_lab_abstract::{ChannelError, Endpoint, NodeId};
use std::collections::HashMap;

/// First port handed out by [`SocketTable::connect`].
pub const EPHEMERAL_PORT_BASE: u16 = 49153;

#[derive(Debug, Default)]
pub struct SocketTable {
    bound: HashMap<Endpoint, NodeId>,
    open: HashMap<NodeId, Endpoint>,
    next_ephemeral: u16,
}

impl SocketTable {
    pub fn bind(&mut self, node: NodeId, local: Endpoint) -> Result<Endpoint, ChannelError> {
        if self.open.contains_key(&node) {
            return Err(ChannelError::AlreadyOpen(node));
        }
        let resolved = if local.is_unspecified() {
            Endpoint::new(node.address(), local.port)
        } else if local.addr == node.address() {
            local
        } else {
            return Err(ChannelError::ForeignAddress {
                node,
                endpoint: local,
            });
        };
        if self.bound.contains_key(&resolved) {
            return Err(ChannelError::EndpointInUse(resolved));
        }
        self.bound.insert(resolved, node);
        self.open.insert(node, resolved);
        Ok(resolved)
    }

    pub fn connect(&mut self, node: NodeId) -> Result<Endpoint, ChannelError> {
        let port = EPHEMERAL_PORT_BASE.wrapping_add(self.next_ephemeral);
        let local = self.bind(node, Endpoint::new(node.address(), port))?;
        self.next_ephemeral = self.next_ephemeral.wrapping_add(1);
        Ok(local)
    }

    pub fn close(&mut self, node: NodeId) {
        if let Some(endpoint) = self.open.remove(&node) {
            self.bound.remove(&endpoint);
        }
    }

    pub fn local(&self, node: NodeId) -> Option<Endpoint> {
        self.open.get(&node).copied()
    }

    pub fn owner(&self, endpoint: &Endpoint) -> Option<NodeId> {
        self.bound.get(endpoint).copied()
    }
}
