#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

//! Payment reliability core of a festival top-up terminal.
//!
//! A payment is taken in three steps: the customer tag is scanned and
//! validated ([`tags`]), the money is collected in cash or through the card
//! reader ([`card`]), and the booking is written to a durable queue that a
//! background processor replays against the backend until it is confirmed
//! ([`queue`], [`processors`]). [`orchestrator`] ties the steps together.

pub mod card;
pub mod config;
pub mod entities;
pub mod events;
pub mod framework;
pub mod orchestrator;
pub mod processors;
pub mod queue;
pub mod tags;
