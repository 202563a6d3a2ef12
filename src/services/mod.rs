pub mod health;
pub mod ingest;
pub mod metrics;
pub mod pipeline;

pub use health::{check_health, ComponentHealth, HealthResponse, HealthStatus};
pub use ingest::{IngestReceipt, IngestService, IngestStatus};
pub use metrics::{IngestMetrics, MetricsSnapshot};
pub use pipeline::Pipeline;
