use crate::packet::{Endpoint, NodeId};
use thiserror::Error;

/// Failures reported by the channel to an application.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("endpoint {0} is already bound")]
    EndpointInUse(Endpoint),

    #[error("{node:?} cannot bind {endpoint}: address belongs to another node")]
    ForeignAddress { node: NodeId, endpoint: Endpoint },

    #[error("{0:?} already has an open endpoint")]
    AlreadyOpen(NodeId),
}
