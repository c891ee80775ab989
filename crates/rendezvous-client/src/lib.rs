//! Rendezvous client.
//!
//! Async orchestration of the Rendezvous protocol core: a [`Device`] that
//! registers, distributes keys, creates topics, posts and receives updates;
//! an [`Admin`] client for the control surface; and the [`ServerTransport`]
//! seam the both of them speak through.
//!
//! # Architecture
//!
//! The device is a single logical actor. All state mutation happens behind
//! `&mut self`, suspension points exist only at transport requests, and the
//! receive pipeline returns a list of [`Event`]s the caller executes;
//! there is no delegate object to keep alive.
//!
//! The server is untrusted: it stores and forwards, the device verifies.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod admin;
mod device;
mod transport;

pub use admin::Admin;
pub use device::{Device, OutgoingFile, Registration};
pub use rendezvous_core::{Event, RendezvousError, Result, Topic, Update};
pub use rendezvous_proto::{Role, TopicId};
pub use transport::{
    HttpTransport, Method, Request, ServerTransport, decode_header, decode_segment,
    encode_header, encode_segment, headers,
};
