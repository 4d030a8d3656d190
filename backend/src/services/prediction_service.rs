use tracing::debug;

use crate::errors::AppError;
use crate::models::{JobFailure, JobKey, Symbol, TrainedModel};
use crate::services::job_registry::{JobRegistry, JobView};

/// A trained model as served to `GET predict`.
#[derive(Debug, Clone)]
pub struct PredictionLookup {
    pub model: TrainedModel,
    /// A retrain is in flight; this is the previous model's forecast.
    pub retraining: bool,
    /// The latest retrain failed; this is the last model that trained successfully.
    pub last_error: Option<JobFailure>,
}

/// Read the forecast for `symbol` from the registry without starting work.
///
/// Holds no state of its own: whatever the registry has for the Train key
/// is the answer.
pub fn fetch_prediction(registry: &JobRegistry, symbol: &Symbol) -> Result<PredictionLookup, AppError> {
    let key = JobKey::train(symbol.clone());

    let (payload, retraining, last_error) = match registry.view(&key) {
        JobView::Succeeded(payload) => (payload, false, None),
        JobView::Running { previous: Some(payload) } => (payload, true, None),
        JobView::Failed {
            error,
            last_success: Some(payload),
        } => {
            debug!("Serving last good model for {} after failed retrain: {}", symbol, error);
            (payload, false, Some(error))
        }
        JobView::Running { previous: None } => {
            debug!("Prediction for {} requested while first training runs", symbol);
            return Err(AppError::Pending {
                run_id: registry.peek(&key).run_id,
                key,
            });
        }
        JobView::Failed {
            error,
            last_success: None,
        } => {
            return Err(AppError::NotTrained {
                symbol: symbol.clone(),
                last_error: Some(error),
            });
        }
        JobView::Idle => {
            return Err(AppError::NotTrained {
                symbol: symbol.clone(),
                last_error: None,
            });
        }
    };

    let model = payload
        .as_model()
        .cloned()
        .ok_or_else(|| AppError::Internal(format!("train record for {} holds a non-model payload", symbol)))?;

    Ok(PredictionLookup {
        model,
        retraining,
        last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JobPayload, PredictionResult};
    use crate::services::job_registry::ExpiryPolicy;
    use crate::services::process_invoker::Invoker;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    /// Calls listed in `fail_on` fail, others succeed with a forecast equal to the call number.
    struct FlakyTrainer {
        calls: AtomicUsize,
        fail_on: &'static [usize],
    }

    #[async_trait]
    impl Invoker for FlakyTrainer {
        async fn invoke(&self, key: &JobKey) -> Result<JobPayload, JobFailure> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail_on.contains(&n) {
                return Err(JobFailure::DecodeFailure {
                    reason: "expected value at line 1".to_string(),
                });
            }
            Ok(JobPayload::Model(TrainedModel {
                symbol: key.symbol.clone(),
                prediction: PredictionResult {
                    last_actual_price: 100.0,
                    next_day_prediction: n as f64,
                    training_range: "From 2000-01-03 to present".to_string(),
                },
                model_path: None,
            }))
        }
    }

    fn registry(fail_on: &'static [usize]) -> Arc<JobRegistry> {
        JobRegistry::new(
            Arc::new(FlakyTrainer {
                calls: AtomicUsize::new(0),
                fail_on,
            }),
            ExpiryPolicy::never(),
        )
    }

    #[tokio::test]
    async fn test_prediction_lifecycle() {
        let registry = registry(&[1]);
        let aapl = Symbol::parse("AAPL").unwrap();
        let key = JobKey::train(aapl.clone());

        assert!(matches!(
            fetch_prediction(&registry, &aapl),
            Err(AppError::NotTrained { last_error: None, .. })
        ));

        let ticket = registry.get_or_start(key.clone());
        assert!(matches!(fetch_prediction(&registry, &aapl), Err(AppError::Pending { .. })));

        ticket.outcome(WAIT).await.unwrap().unwrap_err();
        assert!(matches!(
            fetch_prediction(&registry, &aapl),
            Err(AppError::NotTrained { last_error: Some(JobFailure::DecodeFailure { .. }), .. })
        ));

        registry.get_or_start(key.clone()).outcome(WAIT).await.unwrap().unwrap();
        let lookup = fetch_prediction(&registry, &aapl).unwrap();
        assert_eq!(lookup.model.prediction.next_day_prediction, 2.0);
        assert!(!lookup.retraining);

        let retrain = registry.invalidate(key).unwrap();
        let stale = fetch_prediction(&registry, &aapl).unwrap();
        assert_eq!(stale.model.prediction.next_day_prediction, 2.0);
        assert!(stale.retraining);

        retrain.outcome(WAIT).await.unwrap().unwrap();
        let fresh = fetch_prediction(&registry, &aapl).unwrap();
        assert_eq!(fresh.model.prediction.next_day_prediction, 3.0);
    }

    #[tokio::test]
    async fn test_failed_retrain_keeps_serving_last_good_model() {
        let registry = registry(&[2]);
        let msft = Symbol::parse("MSFT").unwrap();
        let key = JobKey::train(msft.clone());

        registry.get_or_start(key.clone()).outcome(WAIT).await.unwrap().unwrap();
        let retrain = registry.invalidate(key.clone()).unwrap();
        retrain.outcome(WAIT).await.unwrap().unwrap_err();

        let lookup = fetch_prediction(&registry, &msft).unwrap();
        assert_eq!(lookup.model.prediction.next_day_prediction, 1.0);
        assert!(!lookup.retraining);
        assert!(matches!(lookup.last_error, Some(JobFailure::DecodeFailure { .. })));

        registry.invalidate(key).unwrap().outcome(WAIT).await.unwrap().unwrap();
        let fresh = fetch_prediction(&registry, &msft).unwrap();
        assert_eq!(fresh.model.prediction.next_day_prediction, 3.0);
        assert!(fresh.last_error.is_none());
    }
}
