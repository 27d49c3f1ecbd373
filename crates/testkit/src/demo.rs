//! Workloads bundled with the `testkit-worker` binary.

use std::time::Duration;

use async_trait::async_trait;

use crate::workload::{ExecutionContext, Workload, WorkloadRegistry};

/// Completes immediately.
#[derive(Debug, Default)]
pub struct DemoWorkload;

#[async_trait]
impl Workload for DemoWorkload {
    async fn execute_app(&self, ctx: &ExecutionContext) -> anyhow::Result<()> {
        tracing::info!(label = ctx.label(), "Demo workload running");
        Ok(())
    }
}

/// Always fails.
#[derive(Debug, Default)]
pub struct FailingWorkload;

#[async_trait]
impl Workload for FailingWorkload {
    async fn execute_app(&self, ctx: &ExecutionContext) -> anyhow::Result<()> {
        anyhow::bail!("failing workload invoked with label '{}'", ctx.label())
    }
}

/// Runs long enough for several heartbeats at short intervals.
#[derive(Debug)]
pub struct SlowWorkload {
    duration: Duration,
}

impl Default for SlowWorkload {
    fn default() -> Self {
        Self {
            duration: Duration::from_millis(500),
        }
    }
}

#[async_trait]
impl Workload for SlowWorkload {
    async fn execute_app(&self, ctx: &ExecutionContext) -> anyhow::Result<()> {
        tracing::info!(label = ctx.label(), duration = ?self.duration, "Slow workload running");
        tokio::time::sleep(self.duration).await;
        Ok(())
    }
}

/// Panics instead of returning an error.
#[derive(Debug, Default)]
pub struct PanickingWorkload;

#[async_trait]
impl Workload for PanickingWorkload {
    async fn execute_app(&self, _ctx: &ExecutionContext) -> anyhow::Result<()> {
        panic!("panicking workload invoked")
    }
}

pub fn registry() -> WorkloadRegistry {
    WorkloadRegistry::new()
        .with::<DemoWorkload>("DemoWorkload")
        .with::<FailingWorkload>("FailingWorkload")
        .with::<SlowWorkload>("SlowWorkload")
        .with::<PanickingWorkload>("PanickingWorkload")
}
