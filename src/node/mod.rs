//! Bus participants. Each node owns its state and is driven by one
//! cooperative polling loop; nodes share nothing but the bus.

pub mod adversary;
pub mod consumer;
pub mod producer;

use crate::bus::TransportError;
use crate::codec::FrameError;
use crate::config::ConfigError;
use crate::secure::SealError;
use thiserror::Error;

pub use adversary::{AdversaryNode, AdversaryStats, NaiveConsumer};
pub use consumer::{ConsumerNode, ConsumerStats, FrameOutcome, RejectReason};
pub use producer::{ProducerNode, ProducerStats};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("seal: {0}")]
    Seal(#[from] SealError),
    #[error("frame: {0}")]
    Frame(#[from] FrameError),
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
}
