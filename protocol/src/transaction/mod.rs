//! # Transaction Module
//!
//! Inbound requests, the transaction chain they form, and the verification
//! state machine every request passes through.
//!
//! ```text
//! types.rs         Request and Transaction records
//! verification.rs  verify / verify_with_policy and VerifyError
//! ```
//!
//! The state machine is a plain function, not an object: session state lives
//! in the [`Store`](crate::store::Store), and the caller looks up the first
//! transaction before calling [`verify`].

pub mod types;
pub mod verification;

pub use types::{Request, Transaction};
pub use verification::{verify, verify_with_policy, IdentPolicy, VerifyError};
