use super::NodeError;
use crate::bus::{hex_dump, Transport};
use crate::codec::{FrameCodec, MessageId};
use crate::config::NodeConfig;
use crate::scheduler::{RateClass, RateScheduler, RATE_CLASS_COUNT};
use crate::secure::SecureChannel;
use crate::signals::SignalSimulator;
use rand::rngs::{OsRng, StdRng};
use rand::{CryptoRng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct ProducerStats {
    pub frames_sealed: u32,
    pub frames_sent: u32,
    pub transport_errors: u32,
    pub signal_updates: u32,
    pub class_firings: [u32; RATE_CLASS_COUNT],
}

/// Publishes the simulated vehicle signals as sealed frames at three rates.
#[derive(Debug)]
pub struct ProducerNode<N, S> {
    config: NodeConfig,
    codec: FrameCodec,
    channel: SecureChannel<N>,
    signals: SignalSimulator,
    signal_rng: S,
    scheduler: RateScheduler,
    stats: ProducerStats,
}

impl ProducerNode<OsRng, StdRng> {
    /// Nonces from the operating system, signal jitter from a seeded PRNG.
    pub fn from_entropy(config: NodeConfig) -> Result<Self, NodeError> {
        Self::new(config, OsRng, StdRng::from_entropy())
    }
}

impl<N: RngCore + CryptoRng, S: RngCore> ProducerNode<N, S> {
    pub fn new(config: NodeConfig, nonce_rng: N, signal_rng: S) -> Result<Self, NodeError> {
        config.validate()?;
        let codec = config.codec()?;

        Ok(Self {
            codec,
            channel: SecureChannel::new(&config.key, nonce_rng),
            signals: SignalSimulator::new(),
            signal_rng,
            scheduler: RateScheduler::new(config.intervals),
            stats: ProducerStats::default(),
            config,
        })
    }

    /// One loop iteration: refresh due signals, then service every due rate
    /// class in deadline order. Returns the number of frames handed to the bus.
    pub fn poll<T: Transport>(&mut self, now: u64, transport: &mut T) -> Result<usize, NodeError> {
        let updated = self.signals.advance_due(now, &mut self.signal_rng);
        self.stats.signal_updates = self.stats.signal_updates.wrapping_add(u32::from(updated));

        let mut sent = 0;
        for class in self.scheduler.due_classes(now) {
            sent += self.fire_class(class, transport)?;
            self.scheduler.mark_fired(class, now);
            self.stats.class_firings[class.index()] = self.stats.class_firings[class.index()].wrapping_add(1);
        }

        Ok(sent)
    }

    fn fire_class<T: Transport>(&mut self, class: RateClass, transport: &mut T) -> Result<usize, NodeError> {
        let mut sent = 0;
        for &id in MessageId::in_class(class) {
            if self.send_message(id, transport)? {
                sent += 1;
            }
        }
        Ok(sent)
    }

    /// Encode the current value for `id`, seal and transmit it. A transport
    /// failure drops the frame and returns `Ok(false)`.
    pub fn send_message<T: Transport>(&mut self, id: MessageId, transport: &mut T) -> Result<bool, NodeError> {
        let payload = self.codec.encode(id, &self.signals.snapshot());
        let frame = self.channel.seal(id.raw(), &payload)?;
        self.stats.frames_sealed = self.stats.frames_sealed.wrapping_add(1);

        if let Err(e) = transport.send(frame.id(), frame.as_bytes()) {
            self.stats.transport_errors = self.stats.transport_errors.wrapping_add(1);
            warn!("Dropped {} frame: {}", id.name(), e);
            return Ok(false);
        }
        self.stats.frames_sent = self.stats.frames_sent.wrapping_add(1);

        if self.config.debug_output {
            info!(
                "TX 0x{:03X} {} [{}] {}",
                frame.id(),
                id.name(),
                frame.len(),
                hex_dump(frame.as_bytes())
            );
        } else {
            debug!("TX 0x{:03X} {} [{}]", frame.id(), id.name(), frame.len());
        }

        Ok(true)
    }

    pub fn signals(&self) -> &SignalSimulator {
        &self.signals
    }

    pub fn signals_mut(&mut self) -> &mut SignalSimulator {
        &mut self.signals
    }

    pub fn scheduler(&self) -> &RateScheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn get_stats(&self) -> &ProducerStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::VirtualBus;

    fn producer() -> ProducerNode<StdRng, StdRng> {
        ProducerNode::new(NodeConfig::default(), StdRng::seed_from_u64(1), StdRng::seed_from_u64(2)).unwrap()
    }

    #[test]
    fn test_first_poll_sends_every_message() {
        let bus = VirtualBus::new();
        let mut tx = bus.attach();
        let mut rx = bus.attach();
        let mut producer = producer();

        assert_eq!(producer.poll(0, &mut tx).unwrap(), 5);
        assert_eq!(rx.poll_available(), 5);

        let mut ids = Vec::new();
        while let Ok(frame) = rx.receive() {
            assert_eq!(frame.data.len(), 48);
            ids.push(frame.id);
        }
        assert_eq!(ids, vec![0x6F, 0x14D, 0x309, 0x3E7, 0x7B5]);
    }

    #[test]
    fn test_rate_classes_over_one_second() {
        let bus = VirtualBus::new();
        let mut tx = bus.attach();
        let mut producer = producer();

        for now in 0..1000 {
            producer.poll(now, &mut tx).unwrap();
        }

        let stats = producer.get_stats();
        assert_eq!(stats.class_firings, [40, 10, 1]);
        assert_eq!(stats.frames_sent, 40 + 10 + 3);
        assert_eq!(stats.frames_sealed, stats.frames_sent);
    }

    #[test]
    fn test_transport_error_does_not_stop_loop() {
        struct Unplugged;
        impl Transport for Unplugged {
            fn send(&mut self, _id: u32, _payload: &[u8]) -> Result<(), crate::bus::TransportError> {
                Err(crate::bus::TransportError::Disconnected)
            }
            fn poll_available(&mut self) -> usize {
                0
            }
            fn receive(&mut self) -> nb::Result<crate::bus::BusFrame, crate::bus::TransportError> {
                Err(nb::Error::WouldBlock)
            }
        }

        let mut producer = producer();
        assert_eq!(producer.poll(0, &mut Unplugged).unwrap(), 0);
        assert_eq!(producer.get_stats().transport_errors, 5);
        assert_eq!(producer.scheduler().next_fire_time(RateClass::High), 25);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = NodeConfig::default();
        config.payload_len = 30;
        assert!(ProducerNode::new(config, StdRng::seed_from_u64(1), StdRng::seed_from_u64(2)).is_err());
    }
}
