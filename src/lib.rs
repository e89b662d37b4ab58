//! MangoChain: a mock supply-chain ledger for mango batches.
//!
//! A batch walks through five journey steps (harvest, packing, transport,
//! display, purchase). Each accepted step appends a block to an in-memory,
//! append-only ledger, and a QR payload describing the batch is rebuilt from
//! the live state whenever it is shown. Scanned strings are "verified" by
//! plain string matching against the current batch id and the verification
//! domain.
//!
//! Block tokens are random, not content hashes; there is no chaining,
//! consensus or persistence. State lives for one session.

pub mod autoplay;
pub mod config;
pub mod error;
pub mod journey;
pub mod model;
pub mod qr;
pub mod routes;
pub mod scan;
pub mod sink;
pub mod token;
pub mod verify;

pub use error::{Error, Result};
pub use journey::{MangoChain, Rejection, SharedChain, StepOutcome};
pub use model::{BatchId, Block, Ledger};
pub use verify::{BatchMatch, Verdict, VerifiedProduct};
