//! Rendezvous protocol core.
//!
//! Pure state machines for the client side of the Rendezvous protocol: the
//! per-user topic-key lifecycle, the per-topic hash-chain verifier, signed
//! user-record merging, and the persisted client state. Nothing in this
//! crate performs I/O; the orchestration layer feeds it records and executes
//! the [`Event`]s it returns.
//!
//! # Trust model
//!
//! The server is an untrusted courier. Every record entering this crate is
//! verified against a key the client already trusts before it mutates any
//! state: user records against the user identity key, prekeys against the
//! issuing device key, topic keys and member entries against their owner's
//! user key, updates against the sender's topic signing key, and the chain
//! output against the locally computed SHA-256 fold.

#![forbid(unsafe_code)]

mod error;
mod event;
mod persist;
mod topic;
mod topic_keys;
mod user_info;

pub use error::{RendezvousError, Result};
pub use event::Event;
pub use persist::{ClientData, PrekeyPair};
pub use topic::{Member, Topic, Update, chain_output, verify_topic_record};
pub use topic_keys::{TopicKeys, encrypt_member_key, verify_topic_key, verify_topic_key_response};
pub use user_info::{build_user_info, merge_user_info};
