use super::NodeError;
use crate::bus::{hex_dump, BusFrame, Transport, MAX_FD_PAYLOAD};
use crate::codec::{FrameCodec, EMPTY_BYTE};
use crate::config::NodeConfig;
use crate::dashboard::Dashboard;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct AdversaryStats {
    pub frames_sniffed: u32,
    pub frames_injected: u32,
    pub naive_updates: u32,
    pub transport_errors: u32,
}

/// What a node without integrity checks would show: the leading payload
/// bytes are decoded straight off the wire.
#[derive(Debug, Clone, Default)]
pub struct NaiveConsumer {
    codec: FrameCodec,
    dashboard: Dashboard,
}

impl NaiveConsumer {
    pub fn new(codec: FrameCodec) -> Self {
        Self {
            codec,
            dashboard: Dashboard::new(),
        }
    }

    /// Returns true when the frame changed the naive dashboard.
    pub fn observe(&mut self, frame: &BusFrame) -> bool {
        let Some(raw) = frame.data.get(..self.codec.payload_len()) else {
            return false;
        };

        match self.codec.decode(frame.id, raw) {
            Ok(Some(update)) => {
                self.dashboard.apply(update);
                true
            }
            _ => false,
        }
    }

    pub fn dashboard(&self) -> &Dashboard {
        &self.dashboard
    }
}

/// Listens to everything on the bus and, when configured to, forges
/// all-`0xFF` frames under legitimate identifiers.
#[derive(Debug)]
pub struct AdversaryNode {
    config: NodeConfig,
    naive: NaiveConsumer,
    next_injection: u64,
    stats: AdversaryStats,
}

impl AdversaryNode {
    pub fn new(config: NodeConfig) -> Result<Self, NodeError> {
        config.validate()?;
        let codec = config.codec()?;

        Ok(Self {
            config,
            naive: NaiveConsumer::new(codec),
            next_injection: 0,
            stats: AdversaryStats::default(),
        })
    }

    pub fn sniff(&mut self, frame: &BusFrame) {
        self.stats.frames_sniffed = self.stats.frames_sniffed.wrapping_add(1);

        if self.config.debug_output {
            info!(
                "SNIFF 0x{:03X} DLC {} [{}] {}",
                frame.id,
                frame.dlc(),
                frame.declared_len(),
                hex_dump(&frame.data)
            );
        }

        if self.naive.observe(frame) {
            self.stats.naive_updates = self.stats.naive_updates.wrapping_add(1);
        }
    }

    /// Send one forged frame per target. Returns the number sent.
    pub fn inject<T: Transport>(&mut self, transport: &mut T) -> usize {
        let forged = [EMPTY_BYTE; MAX_FD_PAYLOAD];
        let len = self.config.inject_len.min(MAX_FD_PAYLOAD);
        let mut sent = 0;

        for &target in &self.config.inject_targets {
            match transport.send(target, &forged[..len]) {
                Ok(()) => {
                    sent += 1;
                    self.stats.frames_injected = self.stats.frames_injected.wrapping_add(1);
                    debug!("Injected {} bytes under 0x{:03X}", len, target);
                }
                Err(e) => {
                    self.stats.transport_errors = self.stats.transport_errors.wrapping_add(1);
                    warn!("Injection under 0x{:03X} failed: {}", target, e);
                }
            }
        }

        sent
    }

    /// Sniff everything pending, then inject if active and the standard
    /// interval has elapsed. Returns the number of frames injected.
    pub fn poll<T: Transport>(&mut self, now: u64, transport: &mut T) -> usize {
        let pending = transport.poll_available();
        for _ in 0..pending {
            match transport.receive() {
                Ok(frame) => self.sniff(&frame),
                Err(nb::Error::WouldBlock) => break,
                Err(nb::Error::Other(e)) => {
                    self.stats.transport_errors = self.stats.transport_errors.wrapping_add(1);
                    warn!("Receive failed: {}", e);
                    break;
                }
            }
        }

        if !self.config.inject_malicious_frames || now < self.next_injection {
            return 0;
        }
        self.next_injection = now + self.config.intervals.standard_ms;
        self.inject(transport)
    }

    pub fn naive_dashboard(&self) -> &Dashboard {
        self.naive.dashboard()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn get_stats(&self) -> &AdversaryStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::VirtualBus;
    use crate::codec::ID_ENGINE_CONTROLLER;
    use crate::config::Role;

    fn active_config() -> NodeConfig {
        NodeConfig {
            inject_malicious_frames: true,
            ..NodeConfig::for_role(Role::Adversary)
        }
    }

    #[test]
    fn test_naive_consumer_reads_forged_frame() {
        let mut naive = NaiveConsumer::default();
        let frame = BusFrame::new(ID_ENGINE_CONTROLLER, &[EMPTY_BYTE; 48]).unwrap();

        assert!(naive.observe(&frame));
        assert_eq!(naive.dashboard().engine_speed, 8191.0);
    }

    #[test]
    fn test_naive_consumer_skips_short_frames() {
        let mut naive = NaiveConsumer::default();
        let frame = BusFrame::new(ID_ENGINE_CONTROLLER, &[0u8; 8]).unwrap();
        assert!(!naive.observe(&frame));
    }

    #[test]
    fn test_passive_adversary_never_sends() {
        let bus = VirtualBus::new();
        let mut port = bus.attach();
        let mut adversary = AdversaryNode::new(NodeConfig::for_role(Role::Adversary)).unwrap();

        for now in 0..500 {
            assert_eq!(adversary.poll(now, &mut port), 0);
        }
        assert_eq!(bus.get_stats().frames_sent, 0);
    }

    #[test]
    fn test_injection_cadence() {
        let bus = VirtualBus::new();
        let mut port = bus.attach();
        let mut victim = bus.attach();
        let mut adversary = AdversaryNode::new(active_config()).unwrap();

        let injected: usize = (0..250).map(|now| adversary.poll(now, &mut port)).sum();
        assert_eq!(injected, 3);

        let frame = victim.receive().unwrap();
        assert_eq!(frame.id, ID_ENGINE_CONTROLLER);
        assert_eq!(frame.data, vec![EMPTY_BYTE; 48]);
    }
}
