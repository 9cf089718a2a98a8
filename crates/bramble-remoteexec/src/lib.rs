//! Encrypted remote execution.
//!
//! A [`Client`] wraps an action in an [`AnyEnvelope`], encrypts it for a
//! worker's public key and streams back progress events followed by one
//! completion. Keys come from a single P-256 ECDH exchange between the
//! client's long-term key and the worker's key; events and the completion
//! are bound to the action by using the SHA-256 digest of its ciphertext as
//! associated data.
//!
//! The [`worker`] module implements the receiving side, and
//! [`LocalTransport`] runs both ends in one process over the frame codec.
//!
//! # Key Types
//!
//! - [`Client`] / [`Execution`] -- submit an action and consume its events
//! - [`ExecutionTransport`] -- the seam to the network
//! - [`Worker`] / [`WorkerSession`] -- accept actions and seal responses
//! - [`ExecutionError`] -- failures, classified by [`Code`]

pub mod client;
pub mod codec;
pub mod config;
pub mod envelope;
pub mod error;
pub mod message;
pub mod transport;
pub mod worker;

pub use client::{Client, Execution};
pub use codec::ExecutionCodec;
pub use config::ClientConfig;
pub use envelope::{ActionMessage, AnyEnvelope};
pub use error::{Code, ExecutionError, ExecutionResult};
pub use message::{ExecuteRequest, ExecuteResponse, Frame, SealedEvent, MAX_FRAME_SIZE};
pub use transport::{ExecutionTransport, LocalTransport, RequestHandler, ResponseSender, ResponseStream};
pub use worker::{ClientVerifier, PinnedClientKeys, Worker, WorkerSession};
