//! Timeout-bounded advisory calls shared by the decision engines.

use std::time::{Duration, Instant};
use trader_core::ports::Advisor;
use trader_core::types::{Advice, AdvisoryRequest};
use trader_core::AdvisoryError;

/// Ask the advisor, turning an expired timeout or an out-of-range confidence
/// into an advisory error.
pub(crate) async fn consult(
    advisor: &dyn Advisor,
    request: &AdvisoryRequest,
    timeout: Duration,
) -> Result<Advice, AdvisoryError> {
    let start = Instant::now();
    let advice = match tokio::time::timeout(timeout, advisor.advise(request)).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(AdvisoryError::Timeout {
                elapsed_ms: start.elapsed().as_millis() as u64,
            })
        }
    };

    if !advice.confidence.is_finite() || !(0.0..=1.0).contains(&advice.confidence) {
        return Err(AdvisoryError::InvalidResponse {
            message: format!("confidence {} outside [0, 1]", advice.confidence),
        });
    }

    Ok(advice)
}
