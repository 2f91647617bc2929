//! Composable resilience pipeline.
//!
//! Composition order is fixed: RateLimiter -> CircuitBreaker ->
//! TimeoutGuard -> operation. Over-quota calls are rejected before they
//! consume a circuit breaker trial slot; open-circuit calls are rejected
//! before any timeout tracking; the timeout applies only to calls that
//! actually reach the upstream. The pipeline performs no retries; retry
//! policy, if desired, is composed by the caller around `execute`.

use std::future::Future;

use bulwark_core::{BulwarkError, BulwarkResult, PipelineConfig};
use tracing::debug;

use crate::circuit_breaker::{CallOutcome, CircuitBreaker};
use crate::rate_limiter::FixedWindowRateLimiter;
use crate::timeout::TimeoutGuard;

/// A named, independently stateful resilience pipeline.
///
/// Operations must map their own upstream faults into
/// [`BulwarkError::Upstream`]; the pipeline's stage rejections
/// (`RateLimited`, `CircuitOpen`, `TimedOut`) are produced here and
/// propagated unchanged.
#[derive(Debug)]
pub struct ResiliencePipeline {
    name: String,
    rate_limiter: Option<FixedWindowRateLimiter>,
    circuit_breaker: Option<CircuitBreaker>,
    timeout: TimeoutGuard,
}

impl ResiliencePipeline {
    /// Build a pipeline from a validated configuration.
    pub fn new(name: impl Into<String>, config: PipelineConfig) -> BulwarkResult<Self> {
        config.validate()?;
        let name = name.into();
        Ok(Self {
            rate_limiter: config.rate_limit.map(FixedWindowRateLimiter::new),
            circuit_breaker: config
                .circuit_breaker
                .map(|cb| CircuitBreaker::new(name.clone(), cb)),
            timeout: TimeoutGuard::new(name.clone(), config.timeout),
            name,
        })
    }

    /// Execute `operation` under this pipeline's policies.
    ///
    /// Each stage rejection short-circuits without invoking the upstream.
    /// Only an [`BulwarkError::Upstream`] outcome feeds the circuit
    /// breaker's failure accounting; a timed-out attempt releases its
    /// circuit permit without a health verdict.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> BulwarkResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = BulwarkResult<T>>,
    {
        if let Some(rate_limiter) = &self.rate_limiter {
            if !rate_limiter.try_acquire() {
                return Err(BulwarkError::RateLimited {
                    pipeline: self.name.clone(),
                    permit_limit: rate_limiter.permit_limit(),
                    retry_after: rate_limiter.retry_after(),
                });
            }
        }

        let permit = match &self.circuit_breaker {
            Some(circuit_breaker) => Some(circuit_breaker.before_call()?),
            None => None,
        };

        let result = self.timeout.run(operation()).await;

        if let (Some(circuit_breaker), Some(permit)) = (&self.circuit_breaker, permit) {
            let outcome = match &result {
                Ok(_) => CallOutcome::Success,
                Err(BulwarkError::Upstream { .. }) => CallOutcome::Failure,
                Err(_) => CallOutcome::Discarded,
            };
            circuit_breaker.on_result(permit, outcome);
        }

        if let Err(error) = &result {
            debug!(pipeline = %self.name, %error, "Pipeline execution failed");
        }
        result
    }

    /// Pipeline name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The circuit breaker protecting this pipeline, if enabled.
    pub fn circuit_breaker(&self) -> Option<&CircuitBreaker> {
        self.circuit_breaker.as_ref()
    }
}
