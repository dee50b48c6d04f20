//! # fdguard
//!
//! Authenticated-encrypted vehicle telemetry over a simulated CAN-FD bus.
//!
//! A producer node synthesizes engine and vehicle signals and publishes them
//! under fixed identifiers at three independent rates. Every payload is
//! sealed with AES-256-GCM and travels as `ciphertext || tag || nonce`.
//! Consumer nodes verify and decode the frames into a live dashboard, while
//! an adversary node shows what an unauthenticated receiver would accept.
//!
//! ## Features
//!
//! - **Signal simulation**: oscillating and cumulative generators with jitter
//! - **Fixed frame layout**: little-endian fields, unused bytes `0xFF`
//! - **Secure channel**: fresh random nonce per frame, tag checked before decode
//! - **Multi-rate scheduling**: 25 ms / 100 ms / 1 s classes, no catch-up bursts
//! - **Buses**: in-process [`bus::VirtualBus`] and a TCP hub ([`link`])
//!
//! ## Quick Start
//!
//! ```rust
//! use fdguard::bus::VirtualBus;
//! use fdguard::config::{NodeConfig, Role};
//! use fdguard::node::{ConsumerNode, ProducerNode};
//!
//! let bus = VirtualBus::new();
//! let mut tx = bus.attach();
//! let mut rx = bus.attach();
//!
//! let mut producer = ProducerNode::from_entropy(NodeConfig::for_role(Role::Producer)).unwrap();
//! let mut consumer = ConsumerNode::new(NodeConfig::for_role(Role::Consumer)).unwrap();
//!
//! producer.poll(0, &mut tx).unwrap();
//! assert_eq!(consumer.poll(&mut rx), 5);
//! println!("{}", consumer.dashboard().render());
//! ```
//!
//! ## Architecture
//!
//! - [`signals`] - Simulated physical quantities
//! - [`codec`] - Payload layout per identifier
//! - [`secure`] - AEAD sealing and opening
//! - [`scheduler`] - Rate class deadlines
//! - [`dashboard`] - Authenticated dispatch into the dashboard
//! - [`bus`] - Transport trait, DLC table and the in-process bus
//! - [`link`] - TCP hub and client transport
//! - [`node`] - Producer, consumer and adversary roles
//! - [`config`] - Node configuration

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]

extern crate alloc;

pub mod bus;
pub mod codec;
pub mod config;
pub mod dashboard;
pub mod link;
pub mod node;
pub mod scheduler;
pub mod secure;
pub mod signals;

// Re-export main public types for convenience
pub use bus::{BusFrame, Transport, TransportError, VirtualBus};
pub use codec::{FrameCodec, FrameError, MessageId, TelemetrySnapshot};
pub use config::{NodeConfig, Role};
pub use dashboard::{Dashboard, Dispatcher};
pub use node::{AdversaryNode, ConsumerNode, NodeError, ProducerNode};
pub use scheduler::{RateClass, RateScheduler};
pub use secure::{AuthError, AuthenticatedPayload, SealError, SecureChannel, WireFrame};
pub use signals::{SignalSimulator, SimulatedSignal};
