//! Git integration for fetching lesson upstreams
//!
//! Upstreams are plain git repositories. [`GitFetcher`] clones one with git2 into a
//! temporary staging directory and hands the working tree back as a snapshot.

pub mod remote;

pub use remote::{GitFetcher, UpstreamRef};
