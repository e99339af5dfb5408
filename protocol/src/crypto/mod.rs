//! # Cryptographic Primitives
//!
//! Everything the SQRL core does with keys flows through here:
//!
//! - **AES-256-GCM** seals nuts and ident tokens (`encryption`).
//! - **BLAKE3** derives the client binding tag carried in a nut (`hash`).
//! - **Ed25519** signature checks live with the value types in
//!   [`crate::identity`], since an identity *is* a verifying key.
//!
//! Everything here is a thin, type-safe wrapper around audited
//! implementations. If you're tempted to optimize these functions, please
//! reconsider.

pub mod encryption;
pub mod hash;

pub use encryption::{decode_b64, encode_b64, EncryptionError, SealingKey};
pub use hash::{blake3_hash, client_tag, UNBOUND_TAG};
