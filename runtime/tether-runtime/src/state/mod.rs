pub(crate) mod exception;
pub(crate) mod lifecycle;
pub(crate) mod metrics;
pub(crate) mod temps;
pub(crate) mod tls;

pub use metrics::MetricsSnapshot;
pub(crate) use tls::with_thread_state;
