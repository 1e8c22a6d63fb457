//! # ipvsim
//!
//! Ipvsim is a library for simulating set-associative caches under the
//! LRU-IPV (Insertion/Promotion-Vector) replacement policy
//!
//! The core is the replacement engine, which keeps a per-set recency stack
//! and redistributes ranks on every hit, fill, and invalidation according to
//! a configurable promotion vector. Plain LRU is the degenerate vector that
//! always promotes and inserts at rank 0; richer vectors give scan and thrash
//! resistant behaviour with the same O(ways) bookkeeping
//!
//! Around the core sits a tag-only cache model and a simulator which runs
//! layered cache configurations over memory-trace files

/// Contains the set-associative cache model hosting the replacement engine
pub mod cache;

/// Contains definitions for the JSON input format
pub mod config;

/// Contains utilities for reading trace files
pub mod io;

/// Contains the replacement engine, its per-set recency stacks, and the
/// promotion table
pub mod replacement;

/// Contains the simulator used to run a trace against a cache configuration
pub mod simulator;
