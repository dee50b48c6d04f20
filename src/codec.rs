use crate::scheduler::RateClass;
use heapless::Vec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ID_ENGINE_CONTROLLER: u32 = 0x6F;
pub const ID_TACHOGRAPH: u32 = 0x14D;
pub const ID_ENGINE_TEMPERATURE: u32 = 0x309;
pub const ID_FUEL: u32 = 0x3E7;
pub const ID_DISTANCE: u32 = 0x7B5;
/// Counter frames emitted by the seal timing benchmark.
pub const ID_STATISTICS: u32 = 0x1F;

pub const DEFAULT_PAYLOAD_LEN: usize = 20;
/// Largest plaintext that still fits a 64 byte CAN-FD frame after tag and nonce.
pub const MAX_PAYLOAD_LEN: usize = 36;
/// Highest field offset is byte 7, so shorter payloads cannot carry every message.
pub const MIN_PAYLOAD_LEN: usize = 8;
pub const EMPTY_BYTE: u8 = 0xFF;

pub type Payload = Vec<u8, MAX_PAYLOAD_LEN>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("payload length {actual} does not match expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("payload length {0} outside supported range 8..=36")]
    UnsupportedLength(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageId {
    EngineController,
    Tachograph,
    EngineTemperature,
    Fuel,
    Distance,
}

impl MessageId {
    pub const ALL: [MessageId; 5] = [
        MessageId::EngineController,
        MessageId::Tachograph,
        MessageId::EngineTemperature,
        MessageId::Fuel,
        MessageId::Distance,
    ];

    pub const fn raw(self) -> u32 {
        match self {
            MessageId::EngineController => ID_ENGINE_CONTROLLER,
            MessageId::Tachograph => ID_TACHOGRAPH,
            MessageId::EngineTemperature => ID_ENGINE_TEMPERATURE,
            MessageId::Fuel => ID_FUEL,
            MessageId::Distance => ID_DISTANCE,
        }
    }

    pub fn from_raw(raw: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|id| id.raw() == raw)
    }

    pub const fn name(self) -> &'static str {
        match self {
            MessageId::EngineController => "engine-controller",
            MessageId::Tachograph => "tachograph",
            MessageId::EngineTemperature => "engine-temperature",
            MessageId::Fuel => "fuel",
            MessageId::Distance => "distance",
        }
    }

    pub const fn rate_class(self) -> RateClass {
        match self {
            MessageId::EngineController => RateClass::High,
            MessageId::Tachograph => RateClass::Standard,
            MessageId::EngineTemperature | MessageId::Fuel | MessageId::Distance => RateClass::Low,
        }
    }

    /// Messages transmitted when `class` fires, in transmission order.
    pub fn in_class(class: RateClass) -> &'static [MessageId] {
        match class {
            RateClass::High => &[MessageId::EngineController],
            RateClass::Standard => &[MessageId::Tachograph],
            RateClass::Low => &[MessageId::EngineTemperature, MessageId::Fuel, MessageId::Distance],
        }
    }
}

/// Producer-side physical values, in engineering units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub engine_speed: f64,
    pub engine_temperature: f64,
    pub vehicle_speed: f64,
    pub distance: f64,
    pub fuel_level: f64,
}

/// A single decoded field destined for the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DashboardUpdate {
    EngineSpeed(f64),
    EngineTemperature(f64),
    VehicleSpeed(f64),
    Distance(f64),
    FuelLevel(f64),
}

/// Fixed byte layout shared by producer and consumer. Multi-byte fields are
/// little-endian; bytes not owned by the message stay `0xFF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    payload_len: usize,
}

impl FrameCodec {
    pub fn new(payload_len: usize) -> Result<Self, FrameError> {
        if !(MIN_PAYLOAD_LEN..=MAX_PAYLOAD_LEN).contains(&payload_len) {
            return Err(FrameError::UnsupportedLength(payload_len));
        }
        Ok(Self { payload_len })
    }

    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    pub fn blank_payload(&self) -> Payload {
        let mut payload = Payload::new();
        // Length is validated against capacity in new()
        let _ = payload.resize(self.payload_len, EMPTY_BYTE);
        payload
    }

    pub fn encode(&self, id: MessageId, snapshot: &TelemetrySnapshot) -> Payload {
        let mut payload = self.blank_payload();

        match id {
            MessageId::EngineController => {
                let raw = (snapshot.engine_speed * 8.0) as u32 as u16;
                payload[4..6].copy_from_slice(&raw.to_le_bytes());
            }
            MessageId::Tachograph => {
                let raw = (snapshot.vehicle_speed * 256.0) as u32 as u16;
                payload[6..8].copy_from_slice(&raw.to_le_bytes());
            }
            MessageId::EngineTemperature => {
                payload[7] = (snapshot.engine_temperature + 40.0) as u32 as u8;
            }
            MessageId::Fuel => {
                payload[1] = (snapshot.fuel_level / 0.4) as u32 as u8;
            }
            MessageId::Distance => {
                let raw = (snapshot.distance / 5.0) as u32;
                payload[0..4].copy_from_slice(&raw.to_le_bytes());
            }
        }

        payload
    }

    /// Unknown identifiers decode to `Ok(None)`; only a known identifier with
    /// the wrong payload length is an error.
    pub fn decode(&self, raw_id: u32, bytes: &[u8]) -> Result<Option<DashboardUpdate>, FrameError> {
        let Some(id) = MessageId::from_raw(raw_id) else {
            return Ok(None);
        };

        if bytes.len() != self.payload_len {
            return Err(FrameError::LengthMismatch {
                expected: self.payload_len,
                actual: bytes.len(),
            });
        }

        let update = match id {
            MessageId::EngineController => {
                let raw = u16::from_le_bytes([bytes[4], bytes[5]]);
                DashboardUpdate::EngineSpeed(f64::from(raw / 8))
            }
            MessageId::Tachograph => {
                let raw = u16::from_le_bytes([bytes[6], bytes[7]]);
                DashboardUpdate::VehicleSpeed(f64::from(raw / 256))
            }
            MessageId::EngineTemperature => DashboardUpdate::EngineTemperature(f64::from(bytes[7]) - 40.0),
            MessageId::Fuel => DashboardUpdate::FuelLevel(f64::from(bytes[1]) * 0.4),
            MessageId::Distance => {
                let raw = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                DashboardUpdate::Distance(f64::from(raw) * 5.0)
            }
        };

        Ok(Some(update))
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self {
            payload_len: DEFAULT_PAYLOAD_LEN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> TelemetrySnapshot {
        TelemetrySnapshot {
            engine_speed: 200.0,
            engine_temperature: 90.0,
            vehicle_speed: 88.5,
            distance: 123_455.0,
            fuel_level: 62.0,
        }
    }

    #[test]
    fn test_engine_controller_layout() {
        let payload = FrameCodec::default().encode(MessageId::EngineController, &snapshot());
        assert_eq!(payload.len(), DEFAULT_PAYLOAD_LEN);
        assert_eq!(&payload[4..6], &[0x40u8, 0x06]);
        assert!(payload.iter().enumerate().all(|(i, b)| i == 4 || i == 5 || *b == EMPTY_BYTE));
    }

    #[test]
    fn test_tachograph_keeps_fraction() {
        let payload = FrameCodec::default().encode(MessageId::Tachograph, &snapshot());
        // 88.5 * 256 = 22656 = 0x5880
        assert_eq!(&payload[6..8], &[0x80u8, 0x58]);
    }

    #[test]
    fn test_single_byte_fields() {
        let codec = FrameCodec::default();
        let temp = codec.encode(MessageId::EngineTemperature, &snapshot());
        assert_eq!(temp[7], 130);
        let fuel = codec.encode(MessageId::Fuel, &snapshot());
        assert_eq!(fuel[1], 155);
    }

    #[test]
    fn test_distance_layout() {
        let payload = FrameCodec::default().encode(MessageId::Distance, &snapshot());
        assert_eq!(u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]), 24_691);
        assert_eq!(payload[4], EMPTY_BYTE);
    }

    #[test]
    fn test_decode_applies_scaling() {
        let codec = FrameCodec::default();
        let snap = snapshot();

        let speed = codec.decode(ID_TACHOGRAPH, &codec.encode(MessageId::Tachograph, &snap)).unwrap();
        assert_eq!(speed, Some(DashboardUpdate::VehicleSpeed(88.0)));

        let distance = codec.decode(ID_DISTANCE, &codec.encode(MessageId::Distance, &snap)).unwrap();
        assert_eq!(distance, Some(DashboardUpdate::Distance(123_455.0)));

        let temp = codec
            .decode(ID_ENGINE_TEMPERATURE, &codec.encode(MessageId::EngineTemperature, &snap))
            .unwrap();
        assert_eq!(temp, Some(DashboardUpdate::EngineTemperature(90.0)));
    }

    #[test]
    fn test_unknown_identifier_is_no_update() {
        let codec = FrameCodec::default();
        assert_eq!(codec.decode(0x123, &[0u8; 3]), Ok(None));
    }

    #[test]
    fn test_length_mismatch() {
        let codec = FrameCodec::default();
        assert_eq!(
            codec.decode(ID_FUEL, &[0u8; 19]),
            Err(FrameError::LengthMismatch { expected: 20, actual: 19 })
        );
    }

    #[test]
    fn test_payload_length_bounds() {
        assert!(FrameCodec::new(7).is_err());
        assert!(FrameCodec::new(37).is_err());
        assert_eq!(FrameCodec::new(36).unwrap().payload_len(), 36);
    }

    #[test]
    fn test_rate_class_assignment() {
        for class in RateClass::ALL {
            for id in MessageId::in_class(class) {
                assert_eq!(id.rate_class(), class);
            }
        }
        assert_eq!(MessageId::from_raw(0x7B5), Some(MessageId::Distance));
    }
}
