//! Integration test binary. All integration tests share one binary to keep
//! link time down.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod helpers;

mod chat_flow;
mod config_roundtrip;
mod worker_flow;
