//! Progress and heartbeat bookkeeping shared by all text generators.
//!
//! The outstanding call and the heartbeat ticker are polled by the same
//! task, so heartbeats stop the moment the call resolves and no timer
//! outlives `generate` on either the success or the failure path.

use std::future::Future;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use super::{GenerateRequest, GenerationEvent, GenerationProgress, ProviderError};

/// Drive `call` to completion under the generation contract.
///
/// Emits LOADING_MODEL and GENERATING up front, a HEARTBEAT every
/// `heartbeat_interval` while `call` is pending, then DONE or ERROR.
/// `request.timeout` bounds the whole call.
pub async fn run_with_progress<F>(
    request: &GenerateRequest,
    progress: &GenerationProgress<'_>,
    call: F,
) -> Result<String, ProviderError>
where
    F: Future<Output = Result<String, ProviderError>>,
{
    let started = Instant::now();
    progress(GenerationEvent::Loading {
        model: request.model.clone(),
    });
    progress(GenerationEvent::Generating {
        model: request.model.clone(),
    });

    let call = tokio::time::timeout(request.timeout, call);
    tokio::pin!(call);

    let mut ticker = heartbeat_ticker(request);

    let result = loop {
        tokio::select! {
            biased;

            outcome = &mut call => {
                break outcome.unwrap_or(Err(ProviderError::Timeout(request.timeout)));
            }
            _ = next_tick(&mut ticker) => {
                progress(GenerationEvent::Heartbeat {
                    elapsed: started.elapsed(),
                });
            }
        }
    };

    let elapsed = started.elapsed();
    match &result {
        Ok(text) => progress(GenerationEvent::Done {
            chars: text.chars().count(),
            elapsed,
        }),
        Err(e) => progress(GenerationEvent::Error {
            reason: e.to_string(),
            elapsed,
        }),
    }

    result
}

fn heartbeat_ticker(request: &GenerateRequest) -> Option<Interval> {
    if request.heartbeat_interval.is_zero() {
        return None;
    }

    let period = request.heartbeat_interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    Some(ticker)
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
