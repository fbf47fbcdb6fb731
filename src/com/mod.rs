//! Pool/wallet HTTP wire types and client, built here because a runnable
//! miner needs a concrete submitter behind the coordinator's `Submitter`
//! trait.

pub mod api;
pub mod client;
