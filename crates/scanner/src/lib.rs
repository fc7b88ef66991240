//! locmap scanner library.
//!
//! A scanner process owns one session id, N worker loops, a heartbeat
//! task, and a pool of recursive resolvers. Workers claim batches of
//! FQDNs from the coordinator, look up LOC records through the pool,
//! parse them leniently, and submit the findings with retries.

pub mod client;
pub mod dns;
pub mod metrics;
pub mod scanner;
pub mod worker;

pub use client::CoordinatorClient;
pub use scanner::Scanner;
