//! Local emulator of the SNS topic/subscription API.
//!
//! Topics and subscriptions live in memory. Published messages fan out to
//! HTTP endpoints and SQS queues, gated by subscription filter policies.

pub mod arn;
pub mod bootstrap;
pub mod codec;
pub mod config;
pub mod delivery;
pub mod envelope;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod registry;
pub mod responses;
pub mod state;

pub use config::Config;
pub use delivery::Dispatcher;
pub use error::SnsError;
pub use registry::Registry;
pub use state::{AppState, SharedState};
