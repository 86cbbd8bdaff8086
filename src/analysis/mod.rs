pub mod metrics;
pub mod quality;

pub use metrics::{derive, GrowthObservation, HistoricalMetrics, MarginObservation};
pub use quality::DataQualityGate;
