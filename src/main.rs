// src/main.rs
use dcf_valuation::config::Config;
use dcf_valuation::domain::errors::{AppError, AppResult};
use dcf_valuation::valuation::{ValuationOrchestrator, ValuationRequest, ValuationResult};

use std::env;
use std::sync::Arc;

#[tokio::main]
async fn main() -> AppResult<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let requests_path = args.first().ok_or_else(|| {
        AppError::Config("Usage: dcf_valuation <requests.json> [config.json]".to_string())
    })?;

    // Load configuration
    let config = match args.get(1) {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    // Initialize logging
    config.init_logging()?;

    log::info!("Starting dcf_valuation v{}", env!("CARGO_PKG_VERSION"));

    let contents = std::fs::read_to_string(requests_path)?;
    let requests: Vec<ValuationRequest> = serde_json::from_str(&contents)?;
    log::info!("Loaded {} valuation requests from {}", requests.len(), requests_path);

    let results = run_all(Arc::new(ValuationOrchestrator::new(config)), requests).await?;

    let failed = results.iter().filter(|r| !r.success).count();
    if failed > 0 {
        log::warn!("{} of {} valuations stopped", failed, results.len());
    }

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

/// Companies are independent, so each run goes to the blocking pool.
/// Results come back in request order.
async fn run_all(
    orchestrator: Arc<ValuationOrchestrator>,
    requests: Vec<ValuationRequest>,
) -> AppResult<Vec<ValuationResult>> {
    let handles: Vec<_> = requests
        .into_iter()
        .map(|request| {
            let orchestrator = orchestrator.clone();
            tokio::task::spawn_blocking(move || orchestrator.run_request(&request))
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        let result = handle
            .await
            .map_err(|e| AppError::Task(format!("Valuation task failed: {}", e)))?;
        results.push(result);
    }
    Ok(results)
}
