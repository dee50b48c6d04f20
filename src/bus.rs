use arrayvec::ArrayString;
use core::fmt::Write;
use heapless::Deque;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use thiserror::Error;

pub const MAX_FD_PAYLOAD: usize = 64;
pub const STANDARD_ID_MAX: u32 = 0x7FF;
pub const EXTENDED_ID_MAX: u32 = 0x1FFF_FFFF;

const RX_FIFO_DEPTH: usize = 64;

// Data Length Code to payload size in bytes
const DLC_TO_LEN: [usize; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 12, 16, 20, 24, 32, 48, 64];

/// Returns the CAN-FD DLC for a payload length, if the length is encodable.
pub fn dlc_for_len(len: usize) -> Option<u8> {
    DLC_TO_LEN.iter().position(|&l| l == len).map(|dlc| dlc as u8)
}

pub fn len_for_dlc(dlc: u8) -> usize {
    DLC_TO_LEN[(dlc & 0x0F) as usize]
}

/// Space separated uppercase hex, e.g. `"FF 40 06 "`.
pub fn hex_dump(data: &[u8]) -> ArrayString<{ MAX_FD_PAYLOAD * 3 }> {
    let mut out = ArrayString::new();
    for byte in data.iter().take(MAX_FD_PAYLOAD) {
        let _ = write!(out, "{:02X} ", byte);
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("identifier 0x{0:X} outside the 29-bit identifier space")]
    InvalidIdentifier(u32),
    #[error("payload length {0} has no CAN-FD data length code")]
    InvalidLength(usize),
    #[error("transmit queue full")]
    TxQueueFull,
    #[error("bus disconnected")]
    Disconnected,
}

/// One frame as seen on the wire: identifier plus raw data bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusFrame {
    pub id: u32,
    #[serde(with = "serde_bytes")]
    pub data: alloc::vec::Vec<u8>,
}

impl BusFrame {
    pub fn new(id: u32, data: &[u8]) -> Result<Self, TransportError> {
        if id > EXTENDED_ID_MAX {
            return Err(TransportError::InvalidIdentifier(id));
        }
        if dlc_for_len(data.len()).is_none() {
            return Err(TransportError::InvalidLength(data.len()));
        }

        Ok(Self {
            id,
            data: data.to_vec(),
        })
    }

    pub fn is_extended(&self) -> bool {
        self.id > STANDARD_ID_MAX
    }

    pub fn dlc(&self) -> u8 {
        // Constructed frames always have an exact DLC; deserialized ones may not
        dlc_for_len(self.data.len()).unwrap_or(0x0F)
    }

    /// Length announced by the frame's DLC.
    pub fn declared_len(&self) -> usize {
        len_for_dlc(self.dlc())
    }
}

/// Node-side view of the shared bus.
pub trait Transport {
    fn send(&mut self, id: u32, payload: &[u8]) -> Result<(), TransportError>;

    /// Number of frames ready to be read with [`Transport::receive`].
    fn poll_available(&mut self) -> usize;

    fn receive(&mut self) -> nb::Result<BusFrame, TransportError>;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct BusStats {
    pub frames_sent: u32,
    pub frames_delivered: u32,
    pub fifo_overruns: u32,
    pub attached_ports: u8,
}

#[derive(Debug, Default)]
struct BusInner {
    fifos: alloc::vec::Vec<Deque<BusFrame, RX_FIFO_DEPTH>>,
    stats: BusStats,
}

/// In-process broadcast medium. Every frame sent by one port lands in the
/// receive FIFO of every other attached port.
#[derive(Debug, Clone, Default)]
pub struct VirtualBus {
    inner: Arc<Mutex<BusInner>>,
}

impl VirtualBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self) -> BusPort {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let index = inner.fifos.len();
        inner.fifos.push(Deque::new());
        inner.stats.attached_ports = inner.stats.attached_ports.saturating_add(1);

        BusPort {
            index,
            bus: Arc::clone(&self.inner),
        }
    }

    pub fn get_stats(&self) -> BusStats {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).stats
    }
}

#[derive(Debug)]
pub struct BusPort {
    index: usize,
    bus: Arc<Mutex<BusInner>>,
}

impl Transport for BusPort {
    fn send(&mut self, id: u32, payload: &[u8]) -> Result<(), TransportError> {
        let frame = BusFrame::new(id, payload)?;
        let mut inner = self.bus.lock().map_err(|_| TransportError::Disconnected)?;
        let BusInner { fifos, stats } = &mut *inner;

        stats.frames_sent = stats.frames_sent.wrapping_add(1);
        for (index, fifo) in fifos.iter_mut().enumerate() {
            if index == self.index {
                continue;
            }
            // A full FIFO loses the new frame, like a controller overrun
            if fifo.push_back(frame.clone()).is_ok() {
                stats.frames_delivered = stats.frames_delivered.wrapping_add(1);
            } else {
                stats.fifo_overruns = stats.fifo_overruns.wrapping_add(1);
            }
        }

        Ok(())
    }

    fn poll_available(&mut self) -> usize {
        match self.bus.lock() {
            Ok(inner) => inner.fifos.get(self.index).map_or(0, Deque::len),
            Err(_) => 0,
        }
    }

    fn receive(&mut self) -> nb::Result<BusFrame, TransportError> {
        let mut inner = self
            .bus
            .lock()
            .map_err(|_| nb::Error::Other(TransportError::Disconnected))?;

        inner
            .fifos
            .get_mut(self.index)
            .and_then(Deque::pop_front)
            .ok_or(nb::Error::WouldBlock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dlc_table() {
        assert_eq!(dlc_for_len(8), Some(8));
        assert_eq!(dlc_for_len(20), Some(11));
        assert_eq!(dlc_for_len(48), Some(14));
        assert_eq!(dlc_for_len(64), Some(15));
        assert_eq!(dlc_for_len(9), None);
        assert_eq!(dlc_for_len(65), None);
        assert_eq!(len_for_dlc(14), 48);
    }

    #[test]
    fn test_frame_validation() {
        assert!(BusFrame::new(0x6F, &[0u8; 48]).is_ok());
        assert_eq!(
            BusFrame::new(0x6F, &[0u8; 47]),
            Err(TransportError::InvalidLength(47))
        );
        assert_eq!(
            BusFrame::new(0x2000_0000, &[]),
            Err(TransportError::InvalidIdentifier(0x2000_0000))
        );
        assert!(BusFrame::new(0x1ABC_DEF0, &[1]).unwrap().is_extended());
    }

    #[test]
    fn test_broadcast_skips_sender() {
        let bus = VirtualBus::new();
        let mut a = bus.attach();
        let mut b = bus.attach();
        let mut c = bus.attach();

        a.send(0x14D, &[1, 2, 3]).unwrap();

        assert_eq!(a.poll_available(), 0);
        assert_eq!(b.poll_available(), 1);
        assert_eq!(c.poll_available(), 1);

        let frame = b.receive().unwrap();
        assert_eq!(frame.id, 0x14D);
        assert_eq!(frame.data, vec![1, 2, 3]);
        assert!(matches!(b.receive(), Err(nb::Error::WouldBlock)));
        assert_eq!(bus.get_stats().frames_delivered, 2);
    }

    #[test]
    fn test_fifo_overrun_drops_newest() {
        let bus = VirtualBus::new();
        let mut tx = bus.attach();
        let mut rx = bus.attach();

        for i in 0..(RX_FIFO_DEPTH as u8 + 4) {
            tx.send(0x100, &[i]).unwrap();
        }

        assert_eq!(rx.poll_available(), RX_FIFO_DEPTH);
        assert_eq!(bus.get_stats().fifo_overruns, 4);
        assert_eq!(rx.receive().unwrap().data, vec![0]);
    }

    #[test]
    fn test_hex_dump() {
        assert_eq!(hex_dump(&[0xFF, 0x40, 0x06]).as_str(), "FF 40 06 ");
    }
}
