pub mod errors;
pub mod models;

// Re-export common types for convenience
pub use errors::{
    AppError, AppResult, AssumptionError, DiscountError, HardStop, MetricsError,
    ProjectionError, SensitivityError, Warning,
};
pub use models::{
    DataQualityReport, DropReason, DroppedYear, EquityBridge, FcfMode, FetchDiagnostics,
    HistoricalRecord, ProjectionRow, RequiredField, UsableYear,
};
