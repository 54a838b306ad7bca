//! Tracks which web domain holds the user's attention, accumulating elapsed
//! seconds into daily and lifetime totals with optional per-domain daily
//! limits. The engine is fed tab and focus events by a host browser and keeps
//! all state in a single locked json file, so the dashboard commands can read
//! it from another process.

pub mod browser;
pub mod cli;
pub mod engine;
pub mod storage;
pub mod utils;
