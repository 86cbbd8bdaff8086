// src/config.rs
use crate::domain::errors::{AppError, AppResult};
use crate::valuation::assumptions::{FadeCurve, ReinvestmentPolicy, WaccInputs};
use dotenv::dotenv;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

/// Valuation pipeline configuration. Passed explicitly into every component
/// so concurrent runs with different settings never interfere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Data quality gate rules
    pub quality: QualityConfig,

    /// Assumption defaults
    pub assumptions: AssumptionConfig,

    /// Sensitivity grid layout
    pub sensitivity: SensitivityConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Data quality gate configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Minimum number of years with every required field present
    pub min_complete_years: usize,

    /// FCF coefficient of variation above which a warning is raised
    pub fcf_cv_threshold: Decimal,

    /// Sector/industry keywords that exclude a company (lower case)
    pub excluded_keywords: Vec<String>,
}

/// Assumption engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssumptionConfig {
    /// Forecast horizon used when neither caller nor overrides give one
    pub default_horizon: u32,

    /// Statutory tax rate applied to projected EBIT
    pub tax_rate: Decimal,

    /// Long-run growth used when no override is supplied
    pub terminal_growth: Option<Decimal>,

    /// Inputs for the WACC formula, used when no WACC override is supplied
    pub capital_structure: Option<WaccInputs>,

    /// Shape of the revenue growth fade
    pub fade_curve: FadeCurve,

    /// Reinvestment relationship used by the projection
    pub reinvestment: ReinvestmentPolicy,

    /// Growth/margin shift between base and bear/bull scenarios
    pub scenario_spread: Decimal,
}

/// Sensitivity grid configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityConfig {
    /// Build a sensitivity grid alongside the base case
    pub enabled: bool,

    /// Distance between adjacent WACC values
    pub wacc_step: Decimal,

    /// Distance between adjacent terminal growth values
    pub terminal_growth_step: Decimal,

    /// Points on each side of the base value
    pub steps_each_side: u32,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "warn", "error")
    pub level: String,

    /// Log to file
    pub to_file: bool,

    /// Log file path
    pub file_path: Option<String>,
}

fn env_parse<T: FromStr>(key: &str) -> AppResult<Option<T>> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| AppError::Config(format!("Invalid value for {}: '{}'", key, raw))),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(AppError::Config(format!("Cannot read {}: {}", key, e))),
    }
}

impl Config {
    /// Load configuration from environment variables on top of the defaults.
    /// A variable that is set but unparsable is an error, never ignored.
    pub fn from_env() -> AppResult<Self> {
        // Load .env file if it exists
        dotenv().ok();

        let mut config = Config::default();

        if let Some(years) = env_parse::<usize>("DCF_MIN_COMPLETE_YEARS")? {
            config.quality.min_complete_years = years;
        }
        if let Some(threshold) = env_parse::<Decimal>("DCF_FCF_CV_THRESHOLD")? {
            config.quality.fcf_cv_threshold = threshold;
        }

        if let Some(horizon) = env_parse::<u32>("DCF_DEFAULT_HORIZON")? {
            config.assumptions.default_horizon = horizon;
        }
        if let Some(tax_rate) = env_parse::<Decimal>("DCF_TAX_RATE")? {
            config.assumptions.tax_rate = tax_rate;
        }
        if let Some(growth) = env_parse::<Decimal>("DCF_TERMINAL_GROWTH")? {
            config.assumptions.terminal_growth = Some(growth);
        }
        if let Some(roic) = env_parse::<Decimal>("DCF_ROIC")? {
            config.assumptions.reinvestment = ReinvestmentPolicy::GrowthOverRoic { roic };
        }
        config.assumptions.capital_structure = Self::wacc_inputs_from_env(config.assumptions.tax_rate)?;

        config.logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            to_file: env_parse::<bool>("LOG_TO_FILE")?.unwrap_or(false),
            file_path: env::var("LOG_FILE_PATH").ok(),
        };

        Ok(config)
    }

    /// WACC inputs are all-or-none: a partial set is a configuration error.
    fn wacc_inputs_from_env(tax_rate: Decimal) -> AppResult<Option<WaccInputs>> {
        let keys = [
            "DCF_RISK_FREE_RATE",
            "DCF_BETA",
            "DCF_EQUITY_RISK_PREMIUM",
            "DCF_COST_OF_DEBT",
            "DCF_EQUITY_WEIGHT",
            "DCF_DEBT_WEIGHT",
        ];
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(env_parse::<Decimal>(key)?);
        }

        let present = values.iter().filter(|v| v.is_some()).count();
        if present == 0 {
            return Ok(None);
        }
        if present != keys.len() {
            return Err(AppError::Config(format!(
                "WACC inputs are partially configured; set all of {}",
                keys.join(", ")
            )));
        }

        let values: Vec<Decimal> = values.into_iter().flatten().collect();
        Ok(Some(WaccInputs {
            risk_free_rate: values[0],
            beta: values[1],
            equity_risk_premium: values[2],
            cost_of_debt: values[3],
            tax_rate,
            equity_weight: values[4],
            debt_weight: values[5],
        }))
    }

    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let mut file = File::open(path).map_err(|e| {
            AppError::Config(format!("Failed to open config file: {}", e))
        })?;

        let mut contents = String::new();
        file.read_to_string(&mut contents).map_err(|e| {
            AppError::Config(format!("Failed to read config file: {}", e))
        })?;

        let config: Config = serde_json::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file: {}", e))
        })?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> AppResult<()> {
        let contents = serde_json::to_string_pretty(self).map_err(|e| {
            AppError::Config(format!("Failed to serialize config: {}", e))
        })?;

        std::fs::write(path, contents).map_err(|e| {
            AppError::Config(format!("Failed to write config file: {}", e))
        })?;

        Ok(())
    }

    /// Initialize logging based on configuration
    pub fn init_logging(&self) -> AppResult<()> {
        let mut builder = env_logger::Builder::new();

        let log_level = match self.logging.level.to_lowercase().as_str() {
            "trace" => log::LevelFilter::Trace,
            "debug" => log::LevelFilter::Debug,
            "info" => log::LevelFilter::Info,
            "warn" => log::LevelFilter::Warn,
            "error" => log::LevelFilter::Error,
            other => {
                return Err(AppError::Config(format!("Unknown log level: {}", other)));
            }
        };

        builder.filter_level(log_level);

        if self.logging.to_file {
            if let Some(file_path) = &self.logging.file_path {
                let file = File::create(file_path).map_err(|e| {
                    AppError::Config(format!("Failed to create log file: {}", e))
                })?;

                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
        }

        builder
            .try_init()
            .map_err(|e| AppError::Config(format!("Failed to initialize logger: {}", e)))?;

        Ok(())
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        let keywords = [
            "bank",
            "banks",
            "financial services",
            "insurance",
            "insurer",
            "capital markets",
            "diversified financial",
            "investment banking",
            "asset management",
            "thrifts & mortgage",
            "consumer finance",
        ];
        Self {
            min_complete_years: 3,
            fcf_cv_threshold: dec!(1.0),
            excluded_keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl Default for AssumptionConfig {
    fn default() -> Self {
        Self {
            default_horizon: 5,
            tax_rate: dec!(0.21),
            terminal_growth: Some(dec!(0.025)),
            capital_structure: None,
            fade_curve: FadeCurve::Linear,
            reinvestment: ReinvestmentPolicy::GrowthOverRoic { roic: dec!(0.12) },
            scenario_spread: dec!(0.03),
        }
    }
}

impl Default for SensitivityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            wacc_step: dec!(0.01),
            terminal_growth_step: dec!(0.005),
            steps_each_side: 2,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            to_file: false,
            file_path: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            quality: QualityConfig::default(),
            assumptions: AssumptionConfig::default(),
            sensitivity: SensitivityConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dcf.json");

        let mut config = Config::default();
        config.assumptions.tax_rate = dec!(0.25);
        config.assumptions.capital_structure = Some(WaccInputs {
            risk_free_rate: dec!(0.04),
            beta: dec!(1.1),
            equity_risk_premium: dec!(0.05),
            cost_of_debt: dec!(0.06),
            tax_rate: dec!(0.25),
            equity_weight: dec!(0.7),
            debt_weight: dec!(0.3),
        });
        config.to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_from_file_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_default_excludes_banks() {
        let config = QualityConfig::default();
        assert!(config.excluded_keywords.iter().any(|k| k == "bank"));
        assert_eq!(config.min_complete_years, 3);
    }
}
