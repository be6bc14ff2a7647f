//! NoAPI - a reason to say no, on demand
//!
//! This crate implements a small HTTP service that answers every request with
//! a randomly chosen refusal. Each client is throttled by a fixed-window rate
//! limiter that blocks clients for a cooldown period once they exceed it.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
pub mod reasons;
