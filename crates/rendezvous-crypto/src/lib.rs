//! Rendezvous Cryptographic Primitives
//!
//! Cryptographic building blocks for the Rendezvous client. Pure functions
//! with deterministic outputs; callers provide the RNG so tests can run
//! against a seeded generator.
//!
//! # Key Hierarchy
//!
//! The Rendezvous protocol layers four kinds of asymmetric keys, each signed
//! by the level above it:
//!
//! ```text
//! User identity key (Ed25519)
//!        │ signs
//!        ▼
//! Device identity keys (Ed25519, listed in the signed user record)
//!        │ sign
//!        ▼
//! Device prekeys (X25519, consumed once per topic-key delivery)
//!        │ carry
//!        ▼
//! Topic keys (Ed25519 + X25519 pair, consumed once per topic admission)
//! ```
//!
//! Topic keys in turn protect a per-topic AES-256-GCM message key that
//! encrypts metadata and files.
//!
//! # Security
//!
//! - Asymmetric encryption is ephemeral X25519 ECDH + HKDF-SHA256 +
//!   AES-256-GCM; compromise of one ephemeral key affects one message.
//! - Secret key material is zeroized on drop.
//! - A failed GCM tag or key agreement is fatal for the message; nothing in
//!   this crate retries.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod cipher;
mod error;
mod keys;

pub use cipher::{
    GCM_NONCE_LEN, GCM_TAG_LEN, HKDF_SALT, MessageKey, SealedFile, decrypt_from, encrypt_to,
    open, open_file, random_array, seal, seal_file, sha256,
};
pub use error::CryptoError;
pub use keys::{
    AgreementPrivateKey, AgreementPublicKey, KEY_LEN, Signature, SigningPrivateKey,
    SigningPublicKey,
};
