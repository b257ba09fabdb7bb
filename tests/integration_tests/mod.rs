//! Integration tests module
//!
//! End-to-end tests for castwave running fully offline: a scripted
//! in-process provider, in-memory repositories and in-memory or temporary
//! SQLite job stores.
//! - Submit → extract → analyze → COMPLETED
//! - Show request → script, music, timing, audio → READY
//! - Curation passes, nudges and the personalized feed
//! - Retry, dead-lettering and deduplication in the job queue

pub mod curation_test;
pub mod feed_test;
pub mod fixtures;
pub mod pipeline_test;
pub mod queue_test;
pub mod show_test;
