use crate::bus::{dlc_for_len, EXTENDED_ID_MAX, MAX_FD_PAYLOAD};
use crate::codec::{FrameCodec, FrameError, DEFAULT_PAYLOAD_LEN, ID_ENGINE_CONTROLLER};
use crate::scheduler::RateIntervals;
use crate::secure::{wire_len, Key, DEFAULT_KEY};
use core::str::FromStr;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Fills a whole DLC 14 frame, the size of a legitimate sealed frame
const DEFAULT_INJECT_LEN: usize = 48;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Payload(#[from] FrameError),
    #[error("sealed frame of {0} bytes has no CAN-FD data length code")]
    WireLength(usize),
    #[error("injected frame of {0} bytes has no CAN-FD data length code")]
    InjectLength(usize),
    #[error("injection target 0x{0:X} outside the 29-bit identifier space")]
    InjectTarget(u32),
    #[error("rate interval for {0} must be non-zero")]
    ZeroInterval(&'static str),
    #[error("key must be 32 bytes, got {0}")]
    KeyLength(usize),
    #[error("key is not valid hex: {0}")]
    KeyHex(String),
    #[error("unknown role '{0}'")]
    UnknownRole(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Producer,
    Consumer,
    Adversary,
}

impl Role {
    pub const fn name(self) -> &'static str {
        match self {
            Role::Producer => "producer",
            Role::Consumer => "consumer",
            Role::Adversary => "adversary",
        }
    }
}

impl FromStr for Role {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "producer" => Ok(Role::Producer),
            "consumer" => Ok(Role::Consumer),
            "adversary" => Ok(Role::Adversary),
            other => Err(ConfigError::UnknownRole(other.to_string())),
        }
    }
}

/// Construction-time behavior of a node. One binary serves every role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub role: Role,
    /// Log every frame sent or received with a hex dump.
    pub debug_output: bool,
    /// Adversary only: forge frames instead of just listening.
    pub inject_malicious_frames: bool,
    pub payload_len: usize,
    pub key: Key,
    pub intervals: RateIntervals,
    pub inject_targets: Vec<u32>,
    pub inject_len: usize,
}

impl NodeConfig {
    pub fn for_role(role: Role) -> Self {
        Self {
            role,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        FrameCodec::new(self.payload_len)?;

        let sealed = wire_len(self.payload_len);
        if sealed > MAX_FD_PAYLOAD || dlc_for_len(sealed).is_none() {
            return Err(ConfigError::WireLength(sealed));
        }

        if dlc_for_len(self.inject_len).is_none() {
            return Err(ConfigError::InjectLength(self.inject_len));
        }
        if let Some(&target) = self.inject_targets.iter().find(|&&id| id > EXTENDED_ID_MAX) {
            return Err(ConfigError::InjectTarget(target));
        }

        for (name, interval) in [
            ("high", self.intervals.high_ms),
            ("standard", self.intervals.standard_ms),
            ("low", self.intervals.low_ms),
        ] {
            if interval == 0 {
                return Err(ConfigError::ZeroInterval(name));
            }
        }

        Ok(())
    }

    pub fn codec(&self) -> Result<FrameCodec, ConfigError> {
        Ok(FrameCodec::new(self.payload_len)?)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            role: Role::Consumer,
            debug_output: false,
            inject_malicious_frames: false,
            payload_len: DEFAULT_PAYLOAD_LEN,
            key: DEFAULT_KEY,
            intervals: RateIntervals::default(),
            inject_targets: vec![ID_ENGINE_CONTROLLER],
            inject_len: DEFAULT_INJECT_LEN,
        }
    }
}

pub fn parse_key(text: &str) -> Result<Key, ConfigError> {
    let bytes = hex::decode(text.trim()).map_err(|e| ConfigError::KeyHex(e.to_string()))?;
    Key::try_from(bytes.as_slice()).map_err(|_| ConfigError::KeyLength(bytes.len()))
}
