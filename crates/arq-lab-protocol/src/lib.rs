//! Stop-and-wait ARQ sender and receiver.
//!
//! Both are plain state machines driven by [`arq_lab_abstract::Application`] callbacks. They
//! never touch a clock or a socket directly; everything goes through the
//! [`arq_lab_abstract::NodeContext`] handed to each callback.

mod receiver;
mod sender;

#[cfg(test)]
mod test_context;

pub use receiver::Receiver;
pub use sender::{PendingTransmission, Sender, SenderPhase};

