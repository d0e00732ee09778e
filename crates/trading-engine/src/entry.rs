//! Entry decision engine for flat instruments.
//!
//! Filters run cheapest first: the technical gate, then secondary
//! corroboration, then advisory confirmation. If the advisory service fails,
//! a deterministic score over the same indicators decides instead.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use trader_core::ports::Advisor;
use trader_core::types::{
    AdviceAction, AdvisoryContext, AdvisoryRequest, DecisionSource, EntryDecision,
    IndicatorResult, MarketSnapshot,
};
use trader_core::{ContractViolation, TradingConfig};

use crate::advisory::consult;

/// Fallback score weights.
const RSI_OVERSOLD_POINTS: u32 = 30;
const MACD_GOLDEN_CROSS_POINTS: u32 = 30;
const MACD_BULLISH_POINTS: u32 = 15;
const BOLLINGER_LOWER_POINTS: u32 = 25;
const FIBONACCI_SUPPORT_POINTS: u32 = 15;
const MAX_FALLBACK_SCORE: u32 = 100;

/// Secondary corroboration thresholds.
const HIGH_VOLUME_RATIO: f64 = 1.5;
const STOCHASTIC_OVERSOLD: f64 = 20.0;

/// Configuration for the entry engine.
#[derive(Debug, Clone)]
pub struct EntryConfig {
    /// Minimum satisfied technical conditions.
    pub min_signal_count: u8,
    /// Minimum advisory confidence to accept an ENTER recommendation.
    pub min_ai_confidence: f64,
    /// Minimum fallback score (0-100) to enter without the advisory service.
    pub fallback_min_score: u32,
    /// Cap on fallback confidence.
    pub fallback_max_confidence: f64,
    pub advisory_timeout: Duration,
}

impl Default for EntryConfig {
    fn default() -> Self {
        Self {
            min_signal_count: 3,
            min_ai_confidence: 0.7,
            fallback_min_score: 60,
            fallback_max_confidence: 0.85,
            advisory_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&TradingConfig> for EntryConfig {
    fn from(config: &TradingConfig) -> Self {
        Self {
            min_ai_confidence: config.min_ai_confidence,
            advisory_timeout: config.advisory_timeout(),
            ..Default::default()
        }
    }
}

/// Decides whether to open a position in a flat instrument.
pub struct EntryEngine {
    config: EntryConfig,
    advisor: Arc<dyn Advisor>,
}

impl EntryEngine {
    pub fn new(config: EntryConfig, advisor: Arc<dyn Advisor>) -> Self {
        Self { config, advisor }
    }

    /// Evaluate an instrument with no open position.
    ///
    /// Advisory failures are absorbed by fallback scoring. A malformed
    /// indicator result is returned as an error.
    pub async fn decide(
        &self,
        snapshot: &MarketSnapshot,
        indicators: &IndicatorResult,
    ) -> Result<Option<EntryDecision>, ContractViolation> {
        indicators.validate_for(&snapshot.instrument)?;

        if indicators.signal_count < self.config.min_signal_count {
            debug!(
                instrument = %snapshot.instrument,
                signal_count = indicators.signal_count,
                "Technical gate not met"
            );
            return Ok(None);
        }

        let secondary = secondary_score(snapshot);
        let request = AdvisoryRequest {
            instrument: snapshot.instrument.clone(),
            price: snapshot.price,
            indicators: indicators.clone(),
            context: AdvisoryContext::Entry {
                secondary_score: secondary,
            },
        };

        match consult(self.advisor.as_ref(), &request, self.config.advisory_timeout).await {
            Ok(advice)
                if advice.action == AdviceAction::Enter
                    && advice.confidence >= self.config.min_ai_confidence =>
            {
                info!(
                    instrument = %snapshot.instrument,
                    confidence = advice.confidence,
                    signal_count = indicators.signal_count,
                    secondary_score = secondary,
                    "Entry confirmed by advisory"
                );
                Ok(Some(EntryDecision {
                    instrument: snapshot.instrument.clone(),
                    confidence: advice.confidence,
                    secondary_score: secondary,
                    source: DecisionSource::Advisory,
                    rationale: format!(
                        "{} [signals {}/4, secondary {}/3]",
                        advice.rationale, indicators.signal_count, secondary
                    ),
                }))
            }
            Ok(advice) => {
                info!(
                    instrument = %snapshot.instrument,
                    action = ?advice.action,
                    confidence = advice.confidence,
                    rationale = %advice.rationale,
                    "Entry not confirmed by advisory"
                );
                Ok(None)
            }
            Err(e) => {
                let score = fallback_score(indicators);
                warn!(
                    instrument = %snapshot.instrument,
                    error = %e,
                    fallback_score = score,
                    "Advisory unavailable, using fallback scoring"
                );
                if score < self.config.fallback_min_score {
                    return Ok(None);
                }

                let confidence =
                    (score as f64 / 100.0).min(self.config.fallback_max_confidence);
                Ok(Some(EntryDecision {
                    instrument: snapshot.instrument.clone(),
                    confidence,
                    secondary_score: secondary,
                    source: DecisionSource::Fallback,
                    rationale: format!(
                        "fallback score {score}/100 after advisory error ({e}) [signals {}/4, secondary {}/3]",
                        indicators.signal_count, secondary
                    ),
                }))
            }
        }
    }
}

/// Auxiliary corroboration (0-3): aligned moving averages, high relative
/// volume, oversold stochastic.
pub fn secondary_score(snapshot: &MarketSnapshot) -> u8 {
    let mut score = 0;
    if snapshot.moving_averages_aligned() {
        score += 1;
    }
    if snapshot
        .volume_ratio
        .is_some_and(|ratio| ratio >= HIGH_VOLUME_RATIO)
    {
        score += 1;
    }
    if snapshot
        .stochastic_k
        .is_some_and(|k| k <= STOCHASTIC_OVERSOLD)
    {
        score += 1;
    }
    score
}

/// Deterministic entry score (0-100) used when the advisory service fails.
pub fn fallback_score(indicators: &IndicatorResult) -> u32 {
    let mut score = 0;
    if indicators.rsi.oversold {
        score += RSI_OVERSOLD_POINTS;
    }
    if indicators.macd.golden_cross {
        score += MACD_GOLDEN_CROSS_POINTS;
    } else if indicators.macd.momentum.is_bullish() {
        score += MACD_BULLISH_POINTS;
    }
    if indicators.bollinger.lower_touch {
        score += BOLLINGER_LOWER_POINTS;
    }
    if indicators.fibonacci.near_support {
        score += FIBONACCI_SUPPORT_POINTS;
    }
    score.min(MAX_FALLBACK_SCORE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use trader_core::ports::MockAdvisor;
    use trader_core::types::{Advice, MacdMomentum};
    use trader_core::AdvisoryError;

    const INSTRUMENT: &str = "BTC/USDT";

    fn snapshot() -> MarketSnapshot {
        MarketSnapshot::new(INSTRUMENT, Decimal::new(100, 0), Utc::now())
    }

    fn indicators(signal_count: u8) -> IndicatorResult {
        let mut result = IndicatorResult::neutral(INSTRUMENT);
        result.signal_count = signal_count;
        result
    }

    fn engine(advisor: MockAdvisor) -> EntryEngine {
        EntryEngine::new(EntryConfig::default(), Arc::new(advisor))
    }

    #[tokio::test]
    async fn test_technical_gate_skips_advisory() {
        let mut advisor = MockAdvisor::new();
        advisor.expect_advise().never();

        let decision = engine(advisor)
            .decide(&snapshot(), &indicators(2))
            .await
            .unwrap();
        assert!(decision.is_none());
    }

    #[tokio::test]
    async fn test_confirmed_entry() {
        let mut advisor = MockAdvisor::new();
        advisor
            .expect_advise()
            .times(1)
            .returning(|_| Ok(Advice::new(AdviceAction::Enter, 0.82, "breakout with volume")));

        let decision = engine(advisor)
            .decide(&snapshot(), &indicators(3))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(decision.source, DecisionSource::Advisory);
        assert_eq!(decision.confidence, 0.82);
        assert!(decision.rationale.contains("breakout with volume"));
    }

    #[tokio::test]
    async fn test_secondary_score_forwarded_to_advisory() {
        let mut advisor = MockAdvisor::new();
        advisor
            .expect_advise()
            .withf(|request| {
                request.context == AdvisoryContext::Entry { secondary_score: 3 }
            })
            .times(1)
            .returning(|_| Ok(Advice::new(AdviceAction::Enter, 0.9, "ok")));

        let snapshot = snapshot()
            .with_moving_averages(Decimal::new(99, 0), Decimal::new(95, 0))
            .with_volume_ratio(2.0)
            .with_stochastic_k(15.0);

        let decision = engine(advisor)
            .decide(&snapshot, &indicators(4))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(decision.secondary_score, 3);
    }

    #[tokio::test]
    async fn test_low_confidence_rejected() {
        let mut advisor = MockAdvisor::new();
        advisor
            .expect_advise()
            .returning(|_| Ok(Advice::new(AdviceAction::Enter, 0.69, "weak")));

        let decision = engine(advisor)
            .decide(&snapshot(), &indicators(4))
            .await
            .unwrap();
        assert!(decision.is_none());
    }

    #[tokio::test]
    async fn test_wait_recommendation_rejected() {
        let mut advisor = MockAdvisor::new();
        advisor
            .expect_advise()
            .returning(|_| Ok(Advice::new(AdviceAction::Wait, 0.95, "overextended")));

        let decision = engine(advisor)
            .decide(&snapshot(), &indicators(4))
            .await
            .unwrap();
        assert!(decision.is_none());
    }

    #[tokio::test]
    async fn test_fallback_entry_on_advisory_error() {
        let mut advisor = MockAdvisor::new();
        advisor.expect_advise().returning(|_| {
            Err(AdvisoryError::Unavailable {
                message: "503".to_string(),
            })
        });

        let mut result = indicators(3);
        result.rsi.oversold = true;
        result.macd.golden_cross = true;

        let decision = engine(advisor)
            .decide(&snapshot(), &result)
            .await
            .unwrap()
            .unwrap();

        assert!(decision.is_fallback());
        assert!(decision.confidence <= 0.85);
        assert_eq!(decision.confidence, 0.6);
    }

    #[tokio::test]
    async fn test_fallback_below_threshold_rejected() {
        let mut advisor = MockAdvisor::new();
        advisor
            .expect_advise()
            .returning(|_| Err(AdvisoryError::Timeout { elapsed_ms: 30_000 }));

        let mut result = indicators(3);
        result.rsi.oversold = true;
        result.fibonacci.near_support = true;

        let decision = engine(advisor)
            .decide(&snapshot(), &result)
            .await
            .unwrap();
        assert!(decision.is_none());
    }

    #[tokio::test]
    async fn test_fallback_confidence_capped() {
        let mut advisor = MockAdvisor::new();
        advisor.expect_advise().returning(|_| {
            Err(AdvisoryError::Unavailable {
                message: "down".to_string(),
            })
        });

        let mut result = indicators(4);
        result.rsi.oversold = true;
        result.macd.golden_cross = true;
        result.bollinger.lower_touch = true;
        result.fibonacci.near_support = true;

        let decision = engine(advisor)
            .decide(&snapshot(), &result)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(decision.confidence, 0.85);
    }

    #[tokio::test]
    async fn test_out_of_range_confidence_uses_fallback() {
        let mut advisor = MockAdvisor::new();
        advisor
            .expect_advise()
            .returning(|_| Ok(Advice::new(AdviceAction::Enter, 1.7, "broken")));

        let decision = engine(advisor)
            .decide(&snapshot(), &indicators(3))
            .await
            .unwrap();
        // Neutral indicators score 0 in fallback
        assert!(decision.is_none());
    }

    #[tokio::test]
    async fn test_malformed_indicators_propagate() {
        let mut advisor = MockAdvisor::new();
        advisor.expect_advise().never();

        let result = engine(advisor).decide(&snapshot(), &indicators(9)).await;
        assert!(matches!(
            result,
            Err(ContractViolation::SignalCountOutOfRange { count: 9, .. })
        ));
    }

    #[test]
    fn test_fallback_score_weights() {
        let mut result = indicators(0);
        assert_eq!(fallback_score(&result), 0);

        result.macd.momentum = MacdMomentum::Bullish;
        assert_eq!(fallback_score(&result), 15);

        // Golden cross replaces the momentum points
        result.macd.golden_cross = true;
        assert_eq!(fallback_score(&result), 30);

        result.rsi.oversold = true;
        result.bollinger.lower_touch = true;
        result.fibonacci.near_support = true;
        assert_eq!(fallback_score(&result), 100);
    }

    #[test]
    fn test_secondary_score_partial() {
        let snapshot = snapshot()
            .with_moving_averages(Decimal::new(101, 0), Decimal::new(95, 0))
            .with_volume_ratio(1.5);
        // Price below the fast average
        assert_eq!(secondary_score(&snapshot), 1);
    }
}
