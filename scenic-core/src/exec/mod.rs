//! The phase/test driver.
//!
//! `Test::run` walks phases starting at the spec's initial phase. Each step
//! returns the name of the next phase: empty means fall through, and a
//! non-empty name is only legal from the last step of a phase. When the main
//! sequence terminates, cleanly or not, every final phase runs in
//! declaration order, and the first error wins.

mod recv;
mod steps;

use tracing::{debug, info, warn};

use crate::ctx::Ctx;
use crate::error::Error;
use crate::spec::{Phase, Spec, Step};
use crate::test::Test;

impl Test {
    /// Executes the spec against this test.
    pub async fn run(&mut self, ctx: &Ctx, spec: &Spec) -> Result<(), Error> {
        spec.validate()?;
        let mut result = self.run_from(ctx, spec, &spec.initial_phase).await;
        for name in &spec.final_phases {
            info!(target: "scenic::test", phase = %name, "running final phase");
            if let Err(e) = self.run_from(ctx, spec, name).await {
                warn!(target: "scenic::test", phase = %name, error = %e, "final phase failed");
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }

    async fn run_from(&mut self, ctx: &Ctx, spec: &Spec, initial: &str) -> Result<(), Error> {
        let mut name = initial.to_string();
        loop {
            let phase = spec
                .phases
                .get(&name)
                .ok_or_else(|| Error::broken(format!("no phase named '{name}'")))?;
            info!(target: "scenic::test", test = %self.id, phase = %name, "phase");
            let next = self.exec_phase(ctx, phase).await?;
            if next.is_empty() {
                return Ok(());
            }
            name = next;
        }
    }

    async fn exec_phase(&mut self, ctx: &Ctx, phase: &Phase) -> Result<String, Error> {
        let last = phase.steps.len().saturating_sub(1);
        let mut next = String::new();
        for (i, step) in phase.steps.iter().enumerate() {
            debug!(
                target: "scenic::step",
                step = i,
                bindings = %serde_json::to_string(&self.bindings).unwrap_or_default(),
            );
            next = self
                .exec_step(ctx, step)
                .await
                .map_err(|e| e.wrap_step(i))?;
            if i < last && !next.is_empty() {
                return Err(Error::broken(format!(
                    "Goto or Branch not last (step {i} names phase '{next}')"
                )));
            }
        }
        if !next.is_empty() {
            debug!(target: "scenic::step", phase = %next, "next phase");
        }
        Ok(next)
    }

    /// Runs one step, downgrading expected failures.
    async fn exec_step(&mut self, ctx: &Ctx, step: &Step) -> Result<String, Error> {
        match self.exe(ctx, step).await {
            Ok(next) => Ok(next),
            Err(e) if e.is_broken() => Err(e),
            Err(e) if step.fails => {
                info!(target: "scenic::step", error = %e, "step failed as expected");
                Ok(step.goto.clone())
            }
            Err(e) => Err(e),
        }
    }

    async fn exe(&mut self, ctx: &Ctx, step: &Step) -> Result<String, Error> {
        self.tick();

        if step.skip {
            debug!(target: "scenic::step", "skip");
            return Ok(String::new());
        }
        if step.action_count() > 1 {
            warn!(
                target: "scenic::step",
                "step sets more than one action; they run in a fixed order, but specify one"
            );
        }

        if let Some(p) = &step.publish {
            steps::publish(self, ctx, p).await?;
        }
        if let Some(s) = &step.sub {
            steps::subscribe(self, ctx, s).await?;
        }
        if let Some(r) = &step.recv {
            recv::recv(self, ctx, r).await?;
        }
        if let Some(r) = &step.reconnect {
            steps::reconnect(self, ctx, r).await?;
        }
        if let Some(i) = &step.ingest {
            steps::ingest(self, ctx, i).await?;
        }
        if let Some(k) = &step.kill {
            steps::kill(self, ctx, k).await?;
        }

        if !step.branch.is_empty() {
            return steps::branch(self, ctx, &step.branch);
        }
        if !step.run.is_empty() {
            steps::run(self, ctx, &step.run)?;
            return Ok(String::new());
        }
        if !step.wait.is_empty() {
            steps::wait(self, ctx, &step.wait).await?;
            return Ok(String::new());
        }

        Ok(step.goto.clone())
    }
}
