//! Test harness for the Rendezvous client.
//!
//! Provides [`SimServer`], an in-memory implementation of the full server
//! endpoint surface behind the client's transport seam. Tests drive real
//! devices against it without any networking, and can reach into the
//! server state to reorder or corrupt data the way a hostile courier would.

#![forbid(unsafe_code)]

mod sim_server;

pub use sim_server::SimServer;
