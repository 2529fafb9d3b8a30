//! Local saga runner.
//!
//! A saga is an ordered list of steps sharing a mutable context. Each step
//! may define a compensation. When step `k` fails, the compensations of
//! steps `0..k` run in reverse order and the saga reports step `k`'s error.
//! A failing compensation is logged and does not stop the ones after it.

use std::fmt::Display;

use tracing::{debug, error, info};

use crate::store::BoxFuture;

pub trait SagaStep<C, E>: Send + Sync {
    fn name(&self) -> &'static str;

    fn execute<'a>(&'a self, ctx: &'a mut C) -> BoxFuture<'a, Result<(), E>>;

    /// Undo a successful `execute`. Steps with nothing to undo return `Ok`.
    fn compensate<'a>(&'a self, ctx: &'a mut C) -> BoxFuture<'a, Result<(), E>>;
}

/// Which step failed, and whether every compensation succeeded.
#[derive(Debug)]
pub struct SagaFailure<E> {
    pub step: &'static str,
    pub error: E,
    pub compensated: bool,
}

pub struct Saga<C, E> {
    name: &'static str,
    steps: Vec<Box<dyn SagaStep<C, E>>>,
}

impl<C, E> Saga<C, E>
where
    C: Send,
    E: Display + Send,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, step: impl SagaStep<C, E> + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub async fn run(&self, ctx: &mut C) -> Result<(), SagaFailure<E>> {
        for (index, step) in self.steps.iter().enumerate() {
            debug!(saga = self.name, step = step.name(), "executing saga step");

            if let Err(error) = step.execute(ctx).await {
                error!(
                    saga = self.name,
                    step = step.name(),
                    error = %error,
                    "saga step failed, compensating"
                );
                let compensated = self.compensate(ctx, index).await;
                return Err(SagaFailure {
                    step: step.name(),
                    error,
                    compensated,
                });
            }
        }

        info!(saga = self.name, steps = self.steps.len(), "saga completed");
        Ok(())
    }

    /// Compensate steps `0..failed` newest first.
    async fn compensate(&self, ctx: &mut C, failed: usize) -> bool {
        let mut clean = true;
        for step in self.steps[..failed].iter().rev() {
            match step.compensate(ctx).await {
                Ok(()) => debug!(saga = self.name, step = step.name(), "compensated"),
                Err(e) => {
                    clean = false;
                    error!(
                        saga = self.name,
                        step = step.name(),
                        error = %e,
                        "compensation failed"
                    );
                }
            }
        }
        clean
    }
}
