//! Wire messages exchanged with router clients.
//!
//! Each request and reply occupies one chunk body, encoded with bincode's
//! standard configuration through [`Message`](crate::message::Message).

use bincode::{Decode, Encode};

/// Client to router.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub enum Request {
    /// Liveness check answered with [`Reply::Pong`].
    Ping {
        /// Value echoed in the reply.
        nonce: u64,
    },
    /// Body returned verbatim in [`Reply::Echo`].
    Echo {
        /// Opaque payload.
        body: Vec<u8>,
    },
    /// Items processed concurrently, answered by one [`Reply::BatchDone`].
    Batch {
        /// Client-chosen identifier copied into the reply.
        id: u64,
        /// Opaque items; an empty item is rejected.
        items: Vec<Vec<u8>>,
    },
}

/// Router to client.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub enum Reply {
    /// Answer to [`Request::Ping`].
    Pong {
        /// Nonce from the request.
        nonce: u64,
    },
    /// Answer to [`Request::Echo`].
    Echo {
        /// Body from the request.
        body: Vec<u8>,
    },
    /// Answer to [`Request::Batch`], sent once every item has completed.
    ///
    /// May arrive after replies to requests sent later on the same
    /// connection.
    BatchDone {
        /// Identifier from the request.
        id: u64,
        /// Items processed successfully.
        accepted: u32,
        /// Items that failed.
        rejected: u32,
        /// Reason the first failing item gave, if any.
        first_error: Option<String>,
    },
    /// A chunk that did not decode as a request.
    Rejected {
        /// Decoder diagnostic.
        reason: String,
    },
}
