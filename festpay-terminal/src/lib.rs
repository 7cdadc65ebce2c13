#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(unsafe_code)]

//! Terminal-side wiring of `festpay-core`.
//!
//! Loads `festpay-terminal.toml`, opens the durable queue and builds the
//! payment components from it. The device app embeds [`state::TerminalState`]
//! and passes in its tag reader and card SDK; the `festpay-terminal` binary
//! runs the replay daemon and the operator commands on the same state.

pub mod commands;
pub mod config;
pub mod shutdown;
pub mod state;
