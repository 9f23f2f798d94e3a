//! Market-aware quote synchronization for fund and stock watch lists.

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod crawler;
pub mod declare;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod logging;
pub mod scheduler;
pub mod snapshot;
pub mod sort;
pub mod time_gate;
pub mod util;

#[cfg(test)]
pub(crate) mod test_support;
