//! Data model for journey blocks, batch identity and the in-memory ledger.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use time::{macros::format_description, OffsetDateTime};

use crate::token::generate_integrity_token;

pub const GENESIS_FROM: &str = "GENESIS";
pub const GENESIS_TO: &str = "SYSTEM";
pub const GENESIS_ACTION: &str = "Blockchain initialized for MangoChain";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// 0 for genesis; always equal to the block's position in the ledger.
    pub index: u64,
    /// Display timestamp, `HH:MM • DD/MM/YYYY` (UTC).
    pub timestamp: String,
    pub from: String,
    pub to: String,
    pub action: String,
    /// Random token, see [`crate::token`]. Not a content hash.
    pub integrity_token: String,
}

/// Append-only block sequence for the current batch.
///
/// Never empty: construction and [`Ledger::initialize`] both leave exactly the
/// genesis block in place, and blocks are only ever pushed.
#[derive(Debug, Clone)]
pub struct Ledger {
    blocks: Vec<Block>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    pub fn new() -> Self {
        let mut ledger = Self { blocks: Vec::new() };
        ledger.initialize();
        ledger
    }

    /// Drop every block and start over from a fresh genesis block.
    pub fn initialize(&mut self) {
        self.blocks.clear();
        self.push(GENESIS_FROM, GENESIS_TO, GENESIS_ACTION);
    }

    /// Append a block. Any strings are accepted, including empty ones.
    pub fn append(
        &mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        action: impl Into<String>,
    ) -> &Block {
        self.push(from, to, action)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn latest(&self) -> &Block {
        // initialize() guarantees a genesis block, so the sequence is never empty
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    fn push(
        &mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        action: impl Into<String>,
    ) -> &Block {
        let block = Block {
            index: self.blocks.len() as u64,
            timestamp: display_timestamp(OffsetDateTime::now_utc()),
            from: from.into(),
            to: to.into(),
            action: action.into(),
            integrity_token: generate_integrity_token(),
        };
        self.blocks.push(block);
        self.latest()
    }
}

/// Batch identifier, `<prefix>-NNN`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(String);

impl BatchId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Fresh id with a random three-digit suffix (100..=999).
    ///
    /// Collisions with earlier batches of the same session are possible.
    pub fn generate(prefix: &str) -> Self {
        let suffix: u16 = rand::thread_rng().gen_range(100..=999);
        Self(format!("{prefix}-{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `14:05 • 18/10/2026`
pub fn display_timestamp(at: OffsetDateTime) -> String {
    let clock = at
        .format(format_description!("[hour]:[minute]"))
        .unwrap_or_default();
    let date = at
        .format(format_description!("[day]/[month]/[year]"))
        .unwrap_or_default();
    format!("{clock} • {date}")
}

/// `18 October 2026`
pub fn long_date(at: OffsetDateTime) -> String {
    at.format(format_description!(
        "[day padding:none] [month repr:long] [year]"
    ))
    .unwrap_or_default()
}
