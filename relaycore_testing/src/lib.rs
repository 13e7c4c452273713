//! Utilities for exercising `relaycore` in tests.
//!
//! - [`ManualExecutor`] parks dispatched tasks so a test decides exactly when
//!   each one runs.
//! - [`CollectingListener`], [`encode_chunks`] and [`drip_feed`] drive the
//!   chunk codec without a socket.
//! - [`RouterHarness`] runs a router on an ephemeral port.
//!
//! ```rust
//! use relaycore::frame::{FrameConfig, FrameReader};
//! use relaycore_testing::{CollectingListener, drip_feed, encode_chunks};
//!
//! let wire = encode_chunks(&[&b"ab"[..], &b"cde"[..]]);
//! let mut reader = FrameReader::new(FrameConfig::default(), CollectingListener::default());
//! drip_feed(&mut reader, &wire, 1).expect("well-formed");
//! assert_eq!(reader.listener().chunks(), [b"ab".to_vec(), b"cde".to_vec()]);
//! ```

pub mod codec;
pub mod executor;
pub mod macros;
#[cfg(not(loom))]
pub mod router;

pub use codec::{CollectingListener, drain_writer, drip_feed, encode_chunks};
pub use executor::ManualExecutor;
#[cfg(not(loom))]
pub use router::RouterHarness;
