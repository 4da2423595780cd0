pub mod context;
pub mod error;
pub mod metrics;
pub mod progress;
pub mod retry;
pub mod state;
