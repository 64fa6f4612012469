//! hivestream-streamer — Hive block fetcher, catch-up loop and builder.

pub mod builder;
pub mod fetcher;
pub mod streamer;

pub use builder::StreamerBuilder;
pub use fetcher::{block_from_json, parse_timestamp, BlockFetcher};
pub use streamer::{Streamer, StreamerStats, TickOutcome};
