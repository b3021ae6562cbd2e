use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use cadence_core::types::{ChainConfig, ChainId};
use chrono::{DateTime, Utc};
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    admission::can_proceed,
    context::SchedulerContext,
    executor::{ChainExecutor, RunOutcome},
    schedule::Schedule,
};

/// Resolution of the tick loop.
const TICK: Duration = Duration::from_secs(1);

/// How long in-flight runs get to notice cancellation before they are aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// A chain definition with its parsed schedule and next fire time.
struct Planned {
    chain: ChainConfig,
    schedule: Schedule,
    next: Option<DateTime<Utc>>,
}

/// Held for the duration of one run. Exclusive chains take the write side so
/// nothing else runs alongside them.
enum Permit {
    Shared(#[allow(dead_code)] OwnedRwLockReadGuard<()>),
    Exclusive(#[allow(dead_code)] OwnedRwLockWriteGuard<()>),
}

/// The tick loop: reloads live chains every poll interval and starts every
/// chain whose schedule is due.
///
/// Must only run in the process holding the scheduler identity.
pub struct SchedulerEngine {
    ctx: SchedulerContext,
    executor: Arc<ChainExecutor>,
    gate: Arc<RwLock<()>>,
    plans: HashMap<ChainId, Planned>,
    /// Chain definitions that failed to parse, keyed by the offending `run_at`.
    rejected: HashMap<ChainId, String>,
    last_reload: Option<DateTime<Utc>>,
    booted: bool,
}

impl SchedulerEngine {
    pub fn new(ctx: SchedulerContext) -> Self {
        let executor = Arc::new(ChainExecutor::new(ctx.clone()));
        Self {
            ctx,
            executor,
            gate: Arc::new(RwLock::new(())),
            plans: HashMap::new(),
            rejected: HashMap::new(),
            last_reload: None,
            booted: false,
        }
    }

    /// Main event loop. Returns once `shutdown` is cancelled and in-flight
    /// runs have wound down.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(client = %self.ctx.client_name, "scheduler engine started");
        let mut runs: JoinSet<(ChainId, RunOutcome)> = JoinSet::new();
        let mut interval = tokio::time::interval(TICK);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    for chain in self.due(Utc::now()) {
                        self.spawn_run(&mut runs, chain, &shutdown);
                    }
                }
                Some(joined) = runs.join_next(), if !runs.is_empty() => {
                    match joined {
                        Ok((chain_id, outcome)) => debug!(chain_id, ?outcome, "chain run finished"),
                        Err(e) => error!("chain run task failed: {e}"),
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("scheduler engine shutting down");
                    break;
                }
            }
        }

        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while runs.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(remaining = runs.len(), "aborting chain runs that ignored shutdown");
            runs.abort_all();
        }
    }

    /// Chains due at `now`. Reloads definitions when the poll interval passed
    /// and advances the next fire time of everything returned.
    fn due(&mut self, now: DateTime<Utc>) -> Vec<ChainConfig> {
        let reload_due = self.last_reload.map_or(true, |last| {
            (now - last).to_std().unwrap_or_default() >= self.ctx.poll_interval
        });
        if reload_due {
            self.reload(now);
        }

        let mut due = Vec::new();
        for plan in self.plans.values_mut() {
            let Some(next) = plan.next else { continue };
            if next <= now {
                plan.next = plan.schedule.next_after(now);
                due.push(plan.chain.clone());
            }
        }
        self.booted = true;
        due
    }

    /// Sync the plan table with the store's live chains.
    fn reload(&mut self, now: DateTime<Utc>) {
        let chains = match self.ctx.store.live_chains(&self.ctx.client_name) {
            Ok(chains) => chains,
            Err(e) => {
                error!("failed to load chain definitions: {e}");
                return;
            }
        };
        self.last_reload = Some(now);

        let live: HashMap<ChainId, ChainConfig> = chains.into_iter().map(|c| (c.id, c)).collect();
        self.plans.retain(|id, _| live.contains_key(id));
        self.rejected.retain(|id, _| live.contains_key(id));

        for (id, chain) in live {
            if let Some(plan) = self.plans.get_mut(&id) {
                if plan.chain.run_at == chain.run_at {
                    plan.chain = chain;
                    continue;
                }
            }
            if self.rejected.get(&id) == Some(&chain.run_at) {
                continue;
            }

            match chain.run_at.parse::<Schedule>() {
                Ok(schedule) => {
                    self.rejected.remove(&id);
                    let next = if schedule.is_reboot() {
                        // Only chains known when the loop starts count as rebooted.
                        (!self.booted).then_some(now)
                    } else {
                        schedule.next_after(now)
                    };
                    debug!(chain_id = id, run_at = %chain.run_at, ?next, "chain scheduled");
                    self.plans.insert(id, Planned { chain, schedule, next });
                }
                Err(e) => {
                    self.plans.remove(&id);
                    self.ctx.journal().error(Some(id), format!("chain not scheduled: {e}"));
                    self.rejected.insert(id, chain.run_at);
                }
            }
        }
    }

    fn spawn_run(
        &self,
        runs: &mut JoinSet<(ChainId, RunOutcome)>,
        chain: ChainConfig,
        shutdown: &CancellationToken,
    ) {
        let ctx = self.ctx.clone();
        let executor = self.executor.clone();
        let gate = self.gate.clone();
        let cancel = shutdown.child_token();

        runs.spawn(async move {
            let chain_id = chain.id;
            let permit = tokio::select! {
                permit = acquire(gate, chain.exclusive) => permit,
                _ = cancel.cancelled() => return (chain_id, RunOutcome::NotStarted),
            };

            if !can_proceed(&ctx, chain_id, chain.max_instances) {
                debug!(chain_id, "chain not admitted");
                return (chain_id, RunOutcome::NotStarted);
            }

            let elements = match ctx.store.chain_elements(chain_id) {
                Ok(elements) => elements,
                Err(e) => {
                    ctx.journal()
                        .error(Some(chain_id), format!("cannot load chain elements: {e}"));
                    return (chain_id, RunOutcome::NotStarted);
                }
            };

            let outcome = executor.execute_chain(&chain, &elements, &cancel).await;
            drop(permit);
            (chain_id, outcome)
        });
    }
}

async fn acquire(gate: Arc<RwLock<()>>, exclusive: bool) -> Permit {
    if exclusive {
        Permit::Exclusive(gate.write_owned().await)
    } else {
        Permit::Shared(gate.read_owned().await)
    }
}
