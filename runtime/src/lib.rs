//! # Homestay Runtime
//!
//! Execution machinery shared by every saga participant.
//!
//! ## Core Components
//!
//! - **Retry**: explicit [`retry::RetryPolicy`] objects wrapped around call
//!   sites (gateway calls, message handlers) instead of declarative annotations.
//! - **Consumer**: [`consumer::EventConsumer`], the subscribe-process-reconnect
//!   loop that applies the acknowledgement policy: poison messages are acked
//!   and dropped, retryable failures are retried in place and then moved to the
//!   dead-letter topic.
//! - **Metrics**: Prometheus exporter for the counters the consumers and
//!   services emit.

/// Retry logic with exponential backoff
pub mod retry;

/// Event bus consumer with acknowledgement and dead-letter policy
pub mod consumer;

/// Prometheus metrics for observability
pub mod metrics;

pub use consumer::{EventConsumer, HandlerError, MessageHandler};
pub use retry::RetryPolicy;
