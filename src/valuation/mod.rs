pub mod assumptions;
pub mod discounting;
pub mod orchestrator;
pub mod projection;
pub mod sensitivity;

pub use assumptions::{
    AssumptionEngine, AssumptionOverrides, FadeCurve, PathSource, RatePath, RatePathOverride,
    ReinvestmentPolicy, ScenarioSet, ValuationAssumptions, WaccInputs,
};
pub use discounting::{discount, discount_at, DiscountedValue};
pub use orchestrator::{
    ScenarioValuations, Valuation, ValuationOrchestrator, ValuationRequest, ValuationResult,
};
pub use projection::{project, project_with};
pub use sensitivity::{
    centered_axis, sweep, SensitivityCell, SensitivityResult, SweepInputs, UndefinedReason,
};
