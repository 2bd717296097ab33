//! Prometheus metrics exporter.
//!
//! Services record counters through the `metrics` facade
//! (`metrics::counter!("booking.reservations.created").increment(1)`). The
//! worker binary installs this exporter once at start-up so the counters are
//! scrapeable over HTTP.
//!
//! # Example
//!
//! ```rust,no_run
//! use homestay_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! # Ok(())
//! # }
//! ```

use metrics::describe_counter;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
pub struct MetricsServer {
    addr: SocketAddr,
    started: bool,
}

impl MetricsServer {
    /// Create a new metrics server bound to `addr` once started.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            started: false,
        }
    }

    /// Install the recorder and start the HTTP listener.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Install`] if another recorder is installed or
    /// the listener cannot be created.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        if self.started {
            return Ok(());
        }

        PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .install()
            .map_err(|e| MetricsError::Install(e.to_string()))?;

        register_metrics();
        self.started = true;
        tracing::info!(addr = %self.addr, "Metrics available at http://{}/metrics", self.addr);
        Ok(())
    }

    /// Whether [`Self::start`] succeeded.
    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.started
    }
}

fn register_metrics() {
    describe_counter!(
        "consumer.messages.poison",
        "Messages dropped because they could not be parsed"
    );
    describe_counter!(
        "consumer.messages.dead_lettered",
        "Messages moved to the dead-letter topic after retries were exhausted"
    );
    describe_counter!("booking.reservations.created", "Reservations written in PAYMENT_PENDING");
    describe_counter!("booking.outbox.appended", "Outbox rows written, by event type");
    describe_counter!("booking.compensations", "Payment compensations, by outcome");
    describe_counter!("gateway.calls", "Payment gateway calls, by operation and outcome");
}
