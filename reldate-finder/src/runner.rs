//! Source Runner
//!
//! Executes one source's probe chain for one item and always produces a
//! [`Candidate`]. Nothing a probe does (error, timeout, panic) propagates past
//! this boundary, so one failing source never aborts its siblings.
//!
//! # Chain semantics
//! - Non-terminal steps feed their value into the next step; `NotFound` (or a
//!   blank value) short-circuits to `no match` without invoking later steps.
//! - The terminal extract step yields the raw date; `NotFound` or a blank value
//!   means `no date` (item found, date unavailable).
//!
//! # Resource scoping
//! Every step runs inside `open` → `step` → `close`. `close` is awaited to
//! completion on every path once `open` has succeeded, including timeout,
//! cancellation and a panicking `step`. It is not bounded by the step timeout,
//! so acquisitions and releases always pair up. A panicking `close` fails only
//! its own source.

use crate::types::{
    Candidate, ProbeError, ResourceHandle, SourceDescriptor, SourceFailure, SourceProbe,
    StepOutcome, StepSpec,
};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Per-source chain executor
#[derive(Debug, Clone)]
pub struct SourceRunner {
    step_timeout: Duration,
}

impl SourceRunner {
    /// Create runner with the per-step timeout
    pub fn new(step_timeout: Duration) -> Self {
        Self { step_timeout }
    }

    /// Per-step timeout
    pub fn step_timeout(&self) -> Duration {
        self.step_timeout
    }

    /// Run `descriptor`'s chain for `item`
    ///
    /// # Returns
    /// A dated candidate, or a failed candidate whose reason is one of
    /// `no match`, `no date`, `timeout`, `cancelled`, `probe error: <cause>`.
    pub async fn run(
        &self,
        item: &str,
        descriptor: &SourceDescriptor,
        probe: &dyn SourceProbe,
        cancel: &CancellationToken,
    ) -> Candidate {
        let source = descriptor.name.as_str();
        let mut input = item.to_string();

        for step in &descriptor.steps {
            if cancel.is_cancelled() {
                return Candidate::failed(source, SourceFailure::Cancelled);
            }

            debug!(item = %item, source, step = %step.name, "Running probe step");

            let outcome = match self.run_step(probe, step, &input, cancel).await {
                Ok(outcome) => outcome,
                Err(failure) => {
                    warn!(
                        item = %item,
                        source,
                        step = %step.name,
                        reason = %failure,
                        "Source failed (per-source error isolation)"
                    );
                    return Candidate::failed(source, failure);
                }
            };

            let value = match outcome {
                StepOutcome::Value(value) if !value.trim().is_empty() => value.trim().to_string(),
                _ => {
                    let failure = if step.is_terminal() {
                        SourceFailure::NoDate
                    } else {
                        SourceFailure::NoMatch
                    };
                    debug!(
                        item = %item,
                        source,
                        step = %step.name,
                        reason = %failure,
                        "Chain stopped"
                    );
                    return Candidate::failed(source, failure);
                }
            };

            if step.is_terminal() {
                debug!(item = %item, source, raw_date = %value, "Source produced a date");
                return Candidate::dated(source, value);
            }

            input = value;
        }

        // Validated descriptors always end in an extract step
        Candidate::failed(source, SourceFailure::NoDate)
    }

    /// Run one step with scoped resource acquisition
    async fn run_step(
        &self,
        probe: &dyn SourceProbe,
        step: &StepSpec,
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<StepOutcome, SourceFailure> {
        let opened = self
            .bounded(AssertUnwindSafe(probe.open(step)).catch_unwind(), cancel)
            .await?;
        let handle = flatten(opened)?;

        let outcome = self
            .bounded(
                AssertUnwindSafe(probe.step(&handle, step, input)).catch_unwind(),
                cancel,
            )
            .await;

        let released = release(probe, step, handle).await;

        let outcome = flatten(outcome?)?;
        released.map(|()| outcome)
    }

    /// Race `fut` against the step timeout and cancellation
    async fn bounded<F, T>(&self, fut: F, cancel: &CancellationToken) -> Result<T, SourceFailure>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SourceFailure::Cancelled),
            result = tokio::time::timeout(self.step_timeout, fut) => {
                result.map_err(|_| SourceFailure::Timeout)
            }
        }
    }
}

/// Release a handle, containing a panicking `close`
async fn release(
    probe: &dyn SourceProbe,
    step: &StepSpec,
    handle: ResourceHandle,
) -> Result<(), SourceFailure> {
    let id = handle.id();
    match AssertUnwindSafe(probe.close(handle)).catch_unwind().await {
        Ok(()) => Ok(()),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(
                step = %step.name,
                resource = id,
                error = %message,
                "Resource release panicked"
            );
            Err(SourceFailure::Probe(format!("panicked: {}", message)))
        }
    }
}

fn flatten<T>(
    caught: Result<Result<T, ProbeError>, Box<dyn Any + Send>>,
) -> Result<T, SourceFailure> {
    match caught {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(SourceFailure::Probe(e.to_string())),
        Err(payload) => Err(SourceFailure::Probe(format!(
            "panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ============================================================================
// Mock Probe for Testing
// ============================================================================

#[cfg(test)]
pub mod mock {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted step behavior
    #[derive(Debug, Clone)]
    pub enum Behavior {
        Value(String),
        NotFound,
        Fail(String),
        Delay(Duration, String),
        Panic,
    }

    /// Scripted release behavior
    #[derive(Debug, Clone, Default)]
    pub enum Release {
        #[default]
        Normal,
        Slow(Duration),
        Panic,
    }

    /// Probe answering each step name from a script, counting open/close
    #[derive(Default)]
    pub struct MockProbe {
        script: HashMap<String, Behavior>,
        release: Release,
        next_id: AtomicU64,
        pub opened: AtomicUsize,
        pub closed: AtomicUsize,
        pub calls: Mutex<Vec<(String, String)>>,
    }

    impl MockProbe {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn on(mut self, step: &str, behavior: Behavior) -> Self {
            self.script.insert(step.to_string(), behavior);
            self
        }

        pub fn releasing(mut self, release: Release) -> Self {
            self.release = release;
            self
        }

        pub fn opened(&self) -> usize {
            self.opened.load(Ordering::SeqCst)
        }

        pub fn closed(&self) -> usize {
            self.closed.load(Ordering::SeqCst)
        }

        pub fn called_steps(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(step, _)| step.clone())
                .collect()
        }
    }

    #[async_trait]
    impl SourceProbe for MockProbe {
        async fn open(&self, _step: &StepSpec) -> Result<ResourceHandle, ProbeError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(ResourceHandle::new(
                self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            ))
        }

        async fn step(
            &self,
            _handle: &ResourceHandle,
            step: &StepSpec,
            input: &str,
        ) -> Result<StepOutcome, ProbeError> {
            self.calls
                .lock()
                .unwrap()
                .push((step.name.clone(), input.to_string()));

            match self.script.get(&step.name) {
                Some(Behavior::Value(v)) => Ok(StepOutcome::Value(v.clone())),
                Some(Behavior::NotFound) | None => Ok(StepOutcome::NotFound),
                Some(Behavior::Fail(msg)) => Err(ProbeError::Other(msg.clone())),
                Some(Behavior::Delay(d, v)) => {
                    tokio::time::sleep(*d).await;
                    Ok(StepOutcome::Value(v.clone()))
                }
                Some(Behavior::Panic) => panic!("probe exploded"),
            }
        }

        async fn close(&self, _handle: ResourceHandle) {
            match &self.release {
                Release::Normal => {}
                Release::Slow(d) => tokio::time::sleep(*d).await,
                Release::Panic => panic!("close bug"),
            }
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
