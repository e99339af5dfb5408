//! # Message Codec
//!
//! Encoding and decoding of the `client` and `server` form parameters that
//! every SQRL request carries, plus the TIF bitset attached to each reply.

mod common;
pub mod client;
pub mod error;
pub mod server;
pub mod tif;

pub use client::{ClientMsg, Command, Opt};
pub use error::CodecError;
pub use server::ServerMsg;
pub use tif::Tif;
