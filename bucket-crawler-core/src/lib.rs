#![doc = "bucket-crawler-core: discovery and reconciliation logic for the bucket crawler."]

//! This crate contains the crawl orchestration, the collaborator traits it talks
//! through, and the data models crossing those boundaries. Concrete GitHub, index
//! and queue clients live in the `bucket-crawler` crate.
//!
//! # Usage
//! Build a [`config::BucketsConfig`], provide implementations of the traits in
//! [`contract`], and call [`synchronise::synchronise`] once per scheduled run.

pub mod concurrency;
pub mod config;
pub mod contract;
pub mod identity;
pub mod reconcile;
pub mod search;
pub mod sources;
pub mod synchronise;
