pub mod config;
pub mod error;
pub mod interface;
pub mod packet;
pub mod scenario;

pub use config::{DEFAULT_PORT, ReceiverConfig, SenderConfig, SimConfig};
pub use error::ChannelError;
pub use interface::{Application, Channel, Clock, NodeContext, TimerHandle};
pub use packet::{ACK_SIZE, DATA_PAYLOAD_SIZE, Endpoint, Frame, NodeId, SequenceBit};

pub use scenario::{
    ReceiverConfigOverride, SenderConfigOverride, SimConfigOverride, TestAction, TestAssertion,
    TestScenario,
};
