#![doc(html_root_url = "https://docs.rs/relaycore/latest")]
//! Transport and dispatch core for a message router.
//!
//! `relaycore` turns byte streams into length-prefixed chunks and turns
//! decoded requests into ordered, asynchronously processed work:
//!
//! - [`queue::SingleConsumerQueue`]: multi-producer queue drained by at most
//!   one processor at a time.
//! - [`pipeline::DrainingPipelineQueue`]: a queue bound to an executor lane
//!   and a visitor, drained cooperatively on a shared [`pipeline::LanePool`].
//! - [`join::CallbackJoin`]: fan-in barrier firing one continuation after N
//!   completions.
//! - [`frame::FrameReader`] and [`frame::FrameWriter`]: the chunk codec.
//!
//! The [`router`] module wires these together into a small echo router.

pub mod byte_order;
pub mod error;
pub mod frame;
pub mod id;
pub mod join;
pub mod message;
pub mod metrics;
pub mod panic;
pub mod pipeline;
pub mod queue;
#[cfg(not(loom))]
pub mod router;
pub mod transport;

pub use error::{RelayError, Result};
pub use frame::{ChunkListener, FrameConfig, FrameReader, FrameWriter, FramingError};
pub use join::{CallbackJoin, JoinError, JoinOutcome};
pub use metrics::{Direction, DropReason};
pub use pipeline::{DrainingPipelineQueue, Executor, LanePool, LaneToken, Visitable};
pub use queue::{QueueConfig, QueueHooks, SingleConsumerQueue};
