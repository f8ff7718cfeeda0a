// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Orchestration loop.
//!
//! Starts every explorer's background task once, then repeats forever:
//!
//! 1. pre-exploration hooks, group by group, handler by handler;
//! 2. one exploration per explorer, all sharing a single [`Deadline`];
//! 3. reconciliation of every group once all explorations finished or the
//!    deadline elapsed, whichever comes first;
//! 4. post-exploration hooks.
//!
//! The next cycle starts no earlier than the previous cycle's deadline.
//!
//! Explorations that ignore their deadline are detached, not aborted: they keep
//! running in the background and may report into a later cycle. Background
//! tasks are supervised in a [`JoinSet`]; a background task ending with an
//! error (or panicking) stops the loop with
//! [`OrchestratorError::ExplorerFailed`].

use crate::config::PeerdConfig;
use crate::group::{Group, Membership};
use crate::plugin::{Deadline, PluginError, PluginRegistry};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Grace period granted to background tasks after shutdown is requested.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Orchestrator errors.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Could not initialize explorer '{name}' for group '{group}': {source}")]
    Explorer {
        group: String,
        name: String,
        #[source]
        source: PluginError,
    },

    #[error("Could not initialize handler '{name}' for group '{group}': {source}")]
    Handler {
        group: String,
        name: String,
        #[source]
        source: PluginError,
    },

    #[error("Explorer '{explorer}' for group '{group}' could not be run: {reason:#}")]
    ExplorerFailed {
        group: String,
        explorer: String,
        reason: anyhow::Error,
    },
}

/// Timing policy of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleSettings {
    /// Silence after which an active peer is evicted
    pub ttl: Duration,
    /// Per-cycle exploration window
    pub exploration_timeout: Duration,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30),
            exploration_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&PeerdConfig> for CycleSettings {
    fn from(config: &PeerdConfig) -> Self {
        Self {
            ttl: config.ttl,
            exploration_timeout: config.exploration_timeout,
        }
    }
}

/// Termination record of an exploration task.
struct TaskExit {
    group: String,
    explorer: String,
    result: anyhow::Result<()>,
}

type BackgroundExit = Option<Result<(Id, anyhow::Result<()>), JoinError>>;

enum Wake {
    Shutdown,
    Elapsed,
    Background(BackgroundExit),
    Explored(Option<Result<TaskExit, JoinError>>),
}

/// Drives all groups.
pub struct Orchestrator {
    groups: Vec<Group>,
    settings: CycleSettings,
    shutdown: CancellationToken,
    background: JoinSet<anyhow::Result<()>>,
    /// (group, explorer label) of each background task
    labels: HashMap<Id, (String, String)>,
    cycle: u64,
}

impl Orchestrator {
    /// Create an orchestrator over already-built groups.
    pub fn new(groups: Vec<Group>, settings: CycleSettings) -> Self {
        Self {
            groups,
            settings,
            shutdown: CancellationToken::new(),
            background: JoinSet::new(),
            labels: HashMap::new(),
            cycle: 0,
        }
    }

    /// Build every configured group, resolving plugins by qualified name.
    ///
    /// Any unresolved name or factory error aborts the build.
    pub fn from_config(
        config: &PeerdConfig,
        plugins: &PluginRegistry,
    ) -> Result<Self, OrchestratorError> {
        let mut groups = Vec::with_capacity(config.groups.len());

        for (name, group_config) in &config.groups {
            let mut group = Group::new(name.clone());

            for explorer in &group_config.explorers {
                let instance = plugins
                    .explorer(&explorer.name, &explorer.configuration)
                    .map_err(|source| OrchestratorError::Explorer {
                        group: name.clone(),
                        name: explorer.name.clone(),
                        source,
                    })?;
                group.add_explorer(instance);
            }

            for handler in &group_config.handlers {
                let instance = plugins
                    .handler(&handler.name, &handler.configuration)
                    .map_err(|source| OrchestratorError::Handler {
                        group: name.clone(),
                        name: handler.name.clone(),
                        source,
                    })?;
                group.add_handler(instance);
            }

            groups.push(group);
        }

        Ok(Self::new(groups, CycleSettings::from(config)))
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn settings(&self) -> CycleSettings {
        self.settings
    }

    /// Token that stops the loop when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until shutdown or a fatal background failure.
    pub async fn run(mut self) -> Result<(), OrchestratorError> {
        info!(
            "Starting {} groups (ttl {:?}, exploration timeout {:?})",
            self.groups.len(),
            self.settings.ttl,
            self.settings.exploration_timeout
        );

        self.start_background();
        let result = self.drive().await;
        self.stop_background().await;

        if let Err(e) = &result {
            error!("{}", e);
        }
        result
    }

    async fn drive(&mut self) -> Result<(), OrchestratorError> {
        loop {
            let deadline = match self.run_cycle().await? {
                Some(deadline) => deadline,
                None => return Ok(()),
            };

            if !self.idle_until(deadline.instant()).await? {
                return Ok(());
            }
        }
    }

    fn start_background(&mut self) {
        for group in &self.groups {
            for instance in group.explorers() {
                let explorer = instance.explorer();
                let token = self.shutdown.child_token();
                let group = group.name().to_string();
                let label = instance.label().to_string();

                debug!("Starting explorer '{}' for group '{}'", label, group);
                let handle = self
                    .background
                    .spawn(async move { explorer.run(token).await });
                self.labels.insert(handle.id(), (group, label));
            }
        }
    }

    async fn stop_background(&mut self) {
        self.shutdown.cancel();

        let background = &mut self.background;
        let labels = &mut self.labels;
        let drain = async {
            while let Some(exit) = background.join_next_with_id().await {
                let (id, result) = match exit {
                    Ok((id, result)) => (id, result),
                    Err(e) => (e.id(), Err(join_failure(&e))),
                };
                let (group, explorer) = labels.remove(&id).unwrap_or_default();
                if let Err(e) = result {
                    warn!(
                        "Explorer '{}' for group '{}' stopped with error: {:#}",
                        explorer, group, e
                    );
                }
            }
        };

        if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
            warn!(
                "{} background tasks ignored shutdown, detaching them",
                self.background.len()
            );
            self.background.detach_all();
        }
    }

    /// One full cycle. Returns the cycle's deadline, or `None` on shutdown.
    async fn run_cycle(&mut self) -> Result<Option<Deadline>, OrchestratorError> {
        if self.shutdown.is_cancelled() {
            return Ok(None);
        }

        self.cycle += 1;
        debug!("Cycle {} starting", self.cycle);

        for group in &self.groups {
            group.pre_exploration().await;
        }

        let deadline = Deadline::new(
            Instant::now() + self.settings.exploration_timeout,
            self.shutdown.child_token(),
        );

        let mut explorations = JoinSet::new();
        for group in &self.groups {
            for instance in group.explorers() {
                let explorer = instance.explorer();
                let sink = group.sink();
                let explore_deadline = deadline.clone();
                let group = group.name().to_string();
                let label = instance.label().to_string();

                explorations.spawn(async move {
                    let result = supervised(async move {
                        explorer.explore(&explore_deadline, sink).await
                    })
                    .await;
                    TaskExit {
                        group,
                        explorer: label,
                        result,
                    }
                });
            }
        }

        let completed = self.await_explorations(&mut explorations, &deadline).await;
        deadline.expire();

        if !explorations.is_empty() {
            warn!(
                "Cycle {}: {} explorations still running after the deadline",
                self.cycle,
                explorations.len()
            );
            explorations.detach_all();
        }

        if !completed? {
            return Ok(None);
        }

        let mut memberships = Vec::with_capacity(self.groups.len());
        for group in &self.groups {
            memberships.push(group.reconcile(self.settings.ttl).await);
        }

        for (group, membership) in self.groups.iter().zip(&memberships) {
            log_membership(group, membership);
            group.post_exploration(membership).await;
        }

        Ok(Some(deadline))
    }

    /// Wait for every exploration or the deadline. Returns `false` on shutdown.
    async fn await_explorations(
        &mut self,
        explorations: &mut JoinSet<TaskExit>,
        deadline: &Deadline,
    ) -> Result<bool, OrchestratorError> {
        while !explorations.is_empty() {
            let wake = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => Wake::Shutdown,
                exit = self.background.join_next_with_id(), if !self.background.is_empty() => {
                    Wake::Background(exit)
                }
                exit = explorations.join_next() => Wake::Explored(exit),
                _ = tokio::time::sleep_until(deadline.instant()) => Wake::Elapsed,
            };

            match wake {
                Wake::Shutdown => return Ok(false),
                Wake::Elapsed => return Ok(true),
                Wake::Background(exit) => self.on_background_exit(exit)?,
                Wake::Explored(Some(Ok(exit))) => {
                    if let Err(e) = exit.result {
                        warn!(
                            "Failed exploring peers for group '{}' with explorer '{}': {:#}",
                            exit.group, exit.explorer, e
                        );
                    }
                }
                Wake::Explored(Some(Err(e))) => warn!("Exploration task failed to join: {}", e),
                Wake::Explored(None) => {}
            }
        }

        Ok(true)
    }

    /// Sleep until `at`, still watching background tasks. Returns `false` on
    /// shutdown.
    async fn idle_until(&mut self, at: Instant) -> Result<bool, OrchestratorError> {
        loop {
            let wake = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => Wake::Shutdown,
                exit = self.background.join_next_with_id(), if !self.background.is_empty() => {
                    Wake::Background(exit)
                }
                _ = tokio::time::sleep_until(at) => Wake::Elapsed,
            };

            match wake {
                Wake::Shutdown => return Ok(false),
                Wake::Elapsed => return Ok(true),
                Wake::Background(exit) => self.on_background_exit(exit)?,
                Wake::Explored(_) => {}
            }
        }
    }

    /// Termination policy for background tasks: a clean return is tolerated,
    /// an error or a panic is fatal.
    fn on_background_exit(&mut self, exit: BackgroundExit) -> Result<(), OrchestratorError> {
        let (id, result) = match exit {
            Some(Ok((id, result))) => (id, result),
            Some(Err(e)) => (e.id(), Err(join_failure(&e))),
            None => return Ok(()),
        };
        let (group, explorer) = self.labels.remove(&id).unwrap_or_default();

        match result {
            Ok(()) => {
                debug!(
                    "Explorer '{}' for group '{}' has no background work left",
                    explorer, group
                );
                Ok(())
            }
            Err(reason) => Err(OrchestratorError::ExplorerFailed {
                group,
                explorer,
                reason,
            }),
        }
    }
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("groups", &self.groups)
            .field("settings", &self.settings)
            .field("cycle", &self.cycle)
            .finish_non_exhaustive()
    }
}

/// Run `fut` on its own task so a panic surfaces as an error.
async fn supervised<F>(fut: F) -> anyhow::Result<()>
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    match tokio::spawn(fut).await {
        Ok(result) => result,
        Err(e) => Err(join_failure(&e)),
    }
}

fn join_failure(e: &JoinError) -> anyhow::Error {
    if e.is_panic() {
        anyhow::anyhow!("task panicked")
    } else {
        anyhow::anyhow!("task failed: {}", e)
    }
}

fn log_membership(group: &Group, membership: &Membership) {
    if membership.new_peers.is_empty() && membership.lost_peers.is_empty() {
        debug!(
            "Group '{}': {} peers, no change",
            group.name(),
            membership.peers.len()
        );
    } else {
        info!(
            "Group '{}': {} peers ({} new, {} lost)",
            group.name(),
            membership.peers.len(),
            membership.new_peers.len(),
            membership.lost_peers.len()
        );
    }
}
