use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, instrument, trace, warn, Level};

use crate::config::CrawlerConfig;
use crate::errors::{AutomationError, CrawlError};
use crate::node::Node;
use crate::platforms::{Host, ScreenState, TreeEvent};
use crate::snapshot::NodeSnapshot;
use crate::step::{BranchSignal, EventFilter, NodeTest, Step};
use crate::tree::crawl_with_limits;

/// How a step ended when `crawl` did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Completed,
    /// The step's action decided the step does not apply
    Skipped { reason: String },
}

#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub label: String,
    pub attempts: u32,
    pub elapsed: Duration,
    pub outcome: StepOutcome,
}

impl CrawlReport {
    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, StepOutcome::Skipped { .. })
    }
}

/// Why an attempt stopped short of success
enum Interrupt {
    Branch(BranchSignal),
    Failure(AutomationError),
}

impl From<AutomationError> for Interrupt {
    fn from(error: AutomationError) -> Self {
        Interrupt::Failure(error)
    }
}

enum Search {
    Found(Node),
    NotFound,
    Branch(BranchSignal),
}

#[derive(Default)]
struct Progress {
    attempts: u32,
    last_failure: Option<AutomationError>,
    last_root: Option<Node>,
}

/// Runs steps against a [`Host`]
#[derive(Clone)]
pub struct Crawler {
    host: Arc<dyn Host>,
    config: CrawlerConfig,
}

impl Crawler {
    pub fn new(host: Arc<dyn Host>, config: CrawlerConfig) -> Self {
        Self { host, config }
    }

    pub fn with_default_config(host: Arc<dyn Host>) -> Self {
        Self::new(host, CrawlerConfig::default())
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.config
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    /// Run one step to completion, retrying ordinary failures until the
    /// step's budget runs out.
    ///
    /// A [`BranchSignal`] raised by the step's tests comes back untouched as
    /// [`CrawlError::Branch`] and is never retried.
    #[instrument(level = "debug", skip(self, step), fields(step = %step.label()))]
    pub async fn crawl(&self, step: &Step) -> Result<CrawlReport, CrawlError> {
        let budget = step.get_timeout().unwrap_or(self.config.step_timeout());
        let started = Instant::now();
        let mut progress = Progress::default();
        debug!("Crawling {} with budget {:?}", step, budget);

        // None: the screen went away before the step finished
        let finished = {
            let attempts = timeout(budget, self.run_attempts(step, &mut progress));
            tokio::pin!(attempts);
            match self.host.screen_state() {
                Some(screen) => tokio::select! {
                    biased;
                    _ = screen_lost(screen) => None,
                    result = &mut attempts => Some(result),
                },
                None => Some(attempts.await),
            }
        };

        let label = step.label().to_string();
        let elapsed = started.elapsed();
        match finished {
            None => {
                warn!("Screen became unavailable while crawling '{}'", label);
                Err(CrawlError::Aborted {
                    label,
                    source: AutomationError::ScreenUnavailable(format!(
                        "after {} attempts",
                        progress.attempts
                    )),
                })
            }
            Some(Err(_)) => {
                warn!(
                    "'{}' timed out after {} attempts ({:?})",
                    label, progress.attempts, elapsed
                );
                Err(CrawlError::Timeout {
                    label,
                    attempts: progress.attempts,
                    timeout: budget,
                    last_failure: progress.last_failure,
                })
            }
            Some(Ok(Err(error))) => Err(error),
            Some(Ok(Ok(outcome))) => {
                info!(
                    "'{}' finished in {:?} after {} attempts: {:?}",
                    label, elapsed, progress.attempts, outcome
                );
                Ok(CrawlReport {
                    label,
                    attempts: progress.attempts,
                    elapsed,
                    outcome,
                })
            }
        }
    }

    async fn run_attempts(
        &self,
        step: &Step,
        progress: &mut Progress,
    ) -> Result<StepOutcome, CrawlError> {
        let attempt_timeout = self.config.attempt_timeout();
        loop {
            let attempt = progress.attempts;
            progress.attempts += 1;

            let result = match timeout(
                attempt_timeout,
                self.attempt(step, attempt, &mut progress.last_root),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(Interrupt::Failure(AutomationError::Timeout(format!(
                    "attempt {attempt} exceeded {attempt_timeout:?}"
                )))),
            };

            match result {
                Ok(()) => return Ok(StepOutcome::Completed),
                Err(Interrupt::Branch(signal)) => {
                    info!("'{}' branched: {}", step.label(), signal);
                    return Err(CrawlError::Branch(signal));
                }
                Err(Interrupt::Failure(AutomationError::StepAborted(reason))) => {
                    info!("'{}' skipped: {}", step.label(), reason);
                    return Ok(StepOutcome::Skipped { reason });
                }
                Err(Interrupt::Failure(error)) if error.is_fatal() => {
                    warn!("'{}' aborted: {}", step.label(), error);
                    return Err(CrawlError::Aborted {
                        label: step.label().to_string(),
                        source: error,
                    });
                }
                Err(Interrupt::Failure(error)) => {
                    warn!("'{}' attempt {} failed: {}", step.label(), attempt, error);
                    self.dump_tree(step, progress.last_root.as_ref());
                    progress.last_failure = Some(error);
                    sleep(self.config.retry_backoff()).await;
                }
            }
        }
    }

    async fn attempt(
        &self,
        step: &Step,
        attempt: u32,
        last_root: &mut Option<Node>,
    ) -> Result<(), Interrupt> {
        if attempt > self.config.clear_interference_after {
            if let Err(e) = self.host.clear_interference(attempt).await {
                debug!("Clearing interference failed: {}", e);
            }
        }

        // Subscribe before launching; later subscribers miss the launch's events
        let events = match step.get_window_intent() {
            Some(intent) => {
                let events = self.host.events();
                self.host.launch(intent).await?;
                Some(events)
            }
            None => None,
        };

        sleep(self.config.settle_delay()).await;

        let root = self.acquire_window(step, events).await?;
        *last_root = Some(root.clone());

        let target = match step.get_node_test() {
            Some(test) => self.find_target(step, test, root, last_root).await?,
            None => root,
        };

        let target = match step.get_node_mapping() {
            Some(mapping) => mapping(&target)?,
            None => target,
        };

        let Some(action) = step.get_action() else {
            return Ok(());
        };
        let description = target.short_description();
        debug!("Running action on {}", description);
        match action(target.clone(), attempt).await {
            Ok(true) => Ok(()),
            Ok(false) if !target.refresh() => Err(Interrupt::Failure(
                AutomationError::StaleNode(format!("{description} is gone after the action")),
            )),
            Ok(false) => Err(Interrupt::Failure(AutomationError::ActionFailed(format!(
                "action on {description} returned false"
            )))),
            Err(e) => Err(Interrupt::Failure(e)),
        }
    }

    async fn acquire_window(
        &self,
        step: &Step,
        events: Option<broadcast::Receiver<TreeEvent>>,
    ) -> Result<Node, Interrupt> {
        let window_timeout = self.config.window_timeout();
        let poll_delay = self.config.window_poll_delay();

        let acquire = async {
            if let (Some(mut events), Some(filter)) = (events, step.get_window_event_filter()) {
                wait_for_event(&mut events, filter).await;
            }

            loop {
                let root = match self.host.current_root().await {
                    Ok(root) => root,
                    Err(e) if e.is_fatal() => return Err(Interrupt::Failure(e)),
                    Err(e) => {
                        debug!("Fetching root failed: {}", e);
                        sleep(poll_delay).await;
                        continue;
                    }
                };

                let Some(test) = step.get_window_node_test() else {
                    return Ok(root);
                };
                match test(&root) {
                    Ok(true) => return Ok(root),
                    Ok(false) => {
                        trace!("Window rejected: {}", root.short_description());
                        sleep(poll_delay).await;
                    }
                    Err(signal) => return Err(Interrupt::Branch(signal)),
                }
            }
        };

        match timeout(window_timeout, acquire).await {
            Ok(result) => result,
            Err(_) => Err(Interrupt::Failure(AutomationError::WindowNotFound(format!(
                "no acceptable window for '{}' within {:?}",
                step.label(),
                window_timeout
            )))),
        }
    }

    async fn find_target(
        &self,
        step: &Step,
        test: &NodeTest,
        root: Node,
        last_root: &mut Option<Node>,
    ) -> Result<Node, Interrupt> {
        let mut root = root;
        loop {
            match self.search(&root, test) {
                Search::Found(node) => return Ok(node),
                Search::Branch(signal) => return Err(Interrupt::Branch(signal)),
                Search::NotFound => {}
            }

            match step.get_node_recovery() {
                Some(recovery) => {
                    let recovered = recovery(root.clone()).await;
                    debug!("No target for '{}', recovery: {}", step.label(), recovered);
                    sleep(self.config.recovery_delay()).await;
                }
                None => sleep(self.config.node_poll_delay()).await,
            }

            root = self.host.current_root().await?;
            *last_root = Some(root.clone());
        }
    }

    fn search(&self, root: &Node, test: &NodeTest) -> Search {
        for candidate in crawl_with_limits(root, self.config.traversal) {
            match test(&candidate.node) {
                Ok(true) => {
                    trace!("Matched {}", candidate.info_short());
                    return Search::Found(candidate.node);
                }
                Ok(false) => {}
                Err(signal) => return Search::Branch(signal),
            }
        }
        Search::NotFound
    }

    fn dump_tree(&self, step: &Step, root: Option<&Node>) {
        if !tracing::enabled!(Level::TRACE) {
            return;
        }
        let Some(root) = root else {
            return;
        };
        let snapshot = NodeSnapshot::capture(root, self.config.traversal);
        match snapshot.to_json() {
            Ok(json) => trace!("Tree after failed attempt of '{}':\n{}", step.label(), json),
            Err(e) => trace!("Could not serialize tree: {}", e),
        }
    }
}

async fn wait_for_event(events: &mut broadcast::Receiver<TreeEvent>, filter: &EventFilter) {
    loop {
        match events.recv().await {
            Ok(event) if filter(&event) => {
                debug!("Window event accepted: {:?}", event);
                return;
            }
            Ok(event) => trace!("Window event ignored: {:?}", event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Event receiver lagged, {} events dropped", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("Event channel closed, polling for the window instead");
                return;
            }
        }
    }
}

/// Resolves once the screen is reported unavailable
async fn screen_lost(mut screen: watch::Receiver<ScreenState>) {
    loop {
        if !screen.borrow_and_update().is_available() {
            return;
        }
        if screen.changed().await.is_err() {
            // Sender dropped, the state can no longer change
            std::future::pending::<()>().await;
        }
    }
}
