//! Streamer cursor — tracks the last fully processed block.

use serde::{Deserialize, Serialize};

/// The streamer's position in the chain.
///
/// A cursor at `0` is "cold": it has never processed a block and will be
/// placed just behind the head on the first successful poll, so a fresh
/// streamer never replays from genesis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Last block that was fully processed.
    pub last_block_number: u64,
}

impl Cursor {
    pub fn new(last_block_number: u64) -> Self {
        Self { last_block_number }
    }

    /// Returns `true` if the cursor has never been positioned.
    pub fn is_cold(&self) -> bool {
        self.last_block_number == 0
    }

    /// Position a cold cursor one block behind `head`. No-op otherwise.
    pub fn warm_up(&mut self, head: u64) {
        if self.is_cold() {
            self.last_block_number = head.saturating_sub(1);
        }
    }

    /// Returns the next block to process (cursor + 1).
    pub fn next_block(&self) -> u64 {
        self.last_block_number + 1
    }

    /// Record `block_number` as processed. Only the next block is accepted.
    pub fn advance(&mut self, block_number: u64) {
        debug_assert_eq!(block_number, self.next_block(), "cursor must not skip blocks");
        self.last_block_number = block_number;
    }

    /// Blocks between the cursor and `head`.
    pub fn lag(&self, head: u64) -> u64 {
        head.saturating_sub(self.last_block_number)
    }

    /// Returns `true` if there are unprocessed blocks up to `head`.
    pub fn is_behind(&self, head: u64) -> bool {
        self.last_block_number < head
    }
}
