use super::NodeError;
use crate::bus::{hex_dump, BusFrame, Transport};
use crate::codec::{FrameError, MessageId};
use crate::config::NodeConfig;
use crate::dashboard::{Dashboard, DispatchOutcome, Dispatcher};
use crate::secure::{wire_len, AuthError, SecureChannel};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct ConsumerStats {
    pub frames_received: u32,
    pub frames_authenticated: u32,
    pub auth_failures: u32,
    pub length_mismatches: u32,
    pub unknown_identifiers: u32,
    pub transport_errors: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Auth(AuthError),
    Frame(FrameError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Accepted(MessageId),
    UnknownIdentifier(u32),
    Rejected(RejectReason),
}

/// Compliant receiver: length check, tag verification, then dispatch.
/// Nothing reaches the dashboard without passing the first two.
#[derive(Debug)]
pub struct ConsumerNode {
    config: NodeConfig,
    // Receive only, so the channel never needs a nonce source
    channel: SecureChannel<()>,
    dispatcher: Dispatcher,
    stats: ConsumerStats,
}

impl ConsumerNode {
    pub fn new(config: NodeConfig) -> Result<Self, NodeError> {
        config.validate()?;
        let codec = config.codec()?;

        Ok(Self {
            channel: SecureChannel::new(&config.key, ()),
            dispatcher: Dispatcher::new(codec),
            stats: ConsumerStats::default(),
            config,
        })
    }

    pub fn handle_frame(&mut self, frame: &BusFrame) -> FrameOutcome {
        self.stats.frames_received = self.stats.frames_received.wrapping_add(1);

        if self.config.debug_output {
            info!("RX 0x{:03X} [{}] {}", frame.id, frame.data.len(), hex_dump(&frame.data));
        }

        // Foreign traffic is not ours to authenticate
        if MessageId::from_raw(frame.id).is_none() {
            self.stats.unknown_identifiers = self.stats.unknown_identifiers.wrapping_add(1);
            debug!("Ignoring identifier 0x{:03X}", frame.id);
            return FrameOutcome::UnknownIdentifier(frame.id);
        }

        let payload_len = self.dispatcher.codec().payload_len();
        let expected = wire_len(payload_len);
        if frame.data.len() != expected {
            self.stats.length_mismatches = self.stats.length_mismatches.wrapping_add(1);
            warn!(
                "Rejected 0x{:03X}: {} bytes, expected {}",
                frame.id,
                frame.data.len(),
                expected
            );
            return FrameOutcome::Rejected(RejectReason::Frame(FrameError::LengthMismatch {
                expected,
                actual: frame.data.len(),
            }));
        }

        let payload = match self.channel.open(&frame.data, payload_len) {
            Ok(payload) => payload,
            Err(e) => {
                self.stats.auth_failures = self.stats.auth_failures.wrapping_add(1);
                warn!("Rejected 0x{:03X}: {}", frame.id, e);
                return FrameOutcome::Rejected(RejectReason::Auth(e));
            }
        };
        self.stats.frames_authenticated = self.stats.frames_authenticated.wrapping_add(1);

        match self.dispatcher.on_frame(frame.id, &payload) {
            Ok(DispatchOutcome::Updated(id)) => FrameOutcome::Accepted(id),
            Ok(DispatchOutcome::Ignored(raw)) => FrameOutcome::UnknownIdentifier(raw),
            Err(e) => {
                self.stats.length_mismatches = self.stats.length_mismatches.wrapping_add(1);
                FrameOutcome::Rejected(RejectReason::Frame(e))
            }
        }
    }

    /// Drain the frames currently waiting on `transport`. Returns how many
    /// reached the dashboard.
    pub fn poll<T: Transport>(&mut self, transport: &mut T) -> usize {
        let pending = transport.poll_available();
        let mut accepted = 0;

        for _ in 0..pending {
            match transport.receive() {
                Ok(frame) => {
                    if let FrameOutcome::Accepted(_) = self.handle_frame(&frame) {
                        accepted += 1;
                    }
                }
                Err(nb::Error::WouldBlock) => break,
                Err(nb::Error::Other(e)) => {
                    self.stats.transport_errors = self.stats.transport_errors.wrapping_add(1);
                    warn!("Receive failed: {}", e);
                    break;
                }
            }
        }

        accepted
    }

    pub fn dashboard(&self) -> &Dashboard {
        self.dispatcher.dashboard()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn get_stats(&self) -> &ConsumerStats {
        &self.stats
    }
}
