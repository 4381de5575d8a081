use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::Client;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::category::CategoryTable;
use crate::config::ServiceConfig;
use crate::error::{PollError, SettingsError};
use crate::headline::{Article, CachedState};
use crate::message::{Inbound, Outbound};
use crate::observer::ObserverRegistry;
use crate::poller::{fetch_headlines, spawn_poller, validate_api_key, KeyValidation, PollerHandle};
use crate::settings::{Settings, SettingsUpdate};
use crate::storage::LocalStore;

/// Hard cap on articles kept per cycle, whatever the config says.
pub const MAX_ARTICLES: usize = 10;

pub const EMPTY_MESSAGE: &str = "No headlines available right now.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Startup,
    Timer,
    Reconfigure,
    Manual,
}

impl Trigger {
    /// Timer ticks that collide with a running cycle are dropped; everything
    /// else asks for a follow-up cycle.
    fn wants_rerun(self) -> bool {
        !matches!(self, Trigger::Timer)
    }
}

#[derive(Debug)]
pub enum PollOutcome {
    Success(Vec<Article>),
    Empty,
    Failed(PollError),
    /// Another cycle was already running.
    Skipped,
}

#[derive(Debug, Default)]
struct CycleState {
    busy: bool,
    rerun: bool,
}

struct Inner {
    client: Client,
    config: ServiceConfig,
    categories: Arc<CategoryTable>,
    store: LocalStore,
    observers: ObserverRegistry,
    settings: RwLock<Settings>,
    timer: tokio::sync::Mutex<Option<PollerHandle>>,
    latest: RwLock<Option<Outbound>>,
    cycle: Mutex<CycleState>,
}

/// Polls the headlines provider on a timer, caches each outcome in the
/// store and pushes it to the registered observers.
#[derive(Clone)]
pub struct TickerService {
    inner: Arc<Inner>,
}

impl TickerService {
    pub fn new(
        client: Client,
        config: ServiceConfig,
        categories: Arc<CategoryTable>,
        store: LocalStore,
        observers: ObserverRegistry,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                config,
                categories,
                store,
                observers,
                settings: RwLock::new(Settings::default()),
                timer: tokio::sync::Mutex::new(None),
                latest: RwLock::new(None),
                cycle: Mutex::new(CycleState::default()),
            }),
        }
    }

    pub fn observers(&self) -> &ObserverRegistry {
        &self.inner.observers
    }

    pub fn store(&self) -> &LocalStore {
        &self.inner.store
    }

    pub async fn settings(&self) -> Settings {
        self.inner.settings.read().await.clone()
    }

    /// Last state pushed to observers, replayed to late joiners.
    pub async fn latest(&self) -> Option<Outbound> {
        self.inner.latest.read().await.clone()
    }

    pub async fn timer_period(&self) -> Option<Duration> {
        self.inner.timer.lock().await.as_ref().map(PollerHandle::period)
    }

    /// Loads persisted settings and the last cached state, starts the timer
    /// and runs the first cycle.
    pub async fn start(&self) -> PollOutcome {
        let settings = match self.inner.store.load_settings().await {
            Some(settings) => settings.sanitized(),
            None => {
                let settings = Settings::default();
                if let Err(e) = self.inner.store.save_settings(&settings).await {
                    warn!(error = %e, "failed to persist default settings");
                }
                settings
            }
        };
        *self.inner.settings.write().await = settings.clone();

        let cached = self.inner.store.load_cached_state().await;
        let replay = match cached.error {
            Some(message) => Some(Outbound::error(message)),
            None if !cached.articles.is_empty() => Some(Outbound::headlines(cached.articles)),
            // A stored empty fetch still has a timestamp; nothing stored has none.
            None if cached.last_update.is_some() => Some(Outbound::info(EMPTY_MESSAGE)),
            None => None,
        };
        *self.inner.latest.write().await = replay;

        info!(
            refresh_minutes = settings.refresh_interval,
            has_credential = settings.has_credential(),
            categories = self.inner.categories.len(),
            "ticker service starting"
        );
        self.restart_timer(self.inner.config.refresh_period(&settings)).await;
        self.poll(Trigger::Startup).await
    }

    /// Merges a partial update, restarts the timer if the cadence changed and
    /// runs one cycle right away. Invalid updates change nothing.
    pub async fn reconfigure(&self, update: SettingsUpdate) -> Result<(), SettingsError> {
        let (previous, next) = {
            let mut settings = self.inner.settings.write().await;
            let previous = settings.clone();
            let next = previous.merged(&update)?;
            *settings = next.clone();
            (previous, next)
        };
        self.apply_settings(&previous, &next).await;
        Ok(())
    }

    /// Replaces the settings wholesale with defaults.
    pub async fn reset(&self) {
        let next = Settings::default();
        let previous = {
            let mut settings = self.inner.settings.write().await;
            std::mem::replace(&mut *settings, next.clone())
        };
        self.apply_settings(&previous, &next).await;
    }

    async fn apply_settings(&self, previous: &Settings, next: &Settings) {
        if let Err(e) = self.inner.store.save_settings(next).await {
            warn!(error = %e, "failed to persist settings");
        }

        if previous.scroll_speed != next.scroll_speed || previous.enable_ticker != next.enable_ticker {
            self.inner
                .observers
                .broadcast(&Outbound::settings_changed(next))
                .await;
        }

        let timer_running = self.inner.timer.lock().await.is_some();
        if previous.refresh_interval != next.refresh_interval || !timer_running {
            info!(
                from = previous.refresh_interval,
                to = next.refresh_interval,
                "restarting refresh timer"
            );
            self.restart_timer(self.inner.config.refresh_period(next)).await;
        }

        self.poll(Trigger::Reconfigure).await;
    }

    async fn restart_timer(&self, period: Duration) {
        let weak = Arc::downgrade(&self.inner);
        let handle = spawn_poller(period, move || {
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(inner) => {
                        TickerService { inner }.poll(Trigger::Timer).await;
                        true
                    }
                    None => false,
                }
            }
        });
        if let Some(old) = self.inner.timer.lock().await.replace(handle) {
            old.cancel();
        }
    }

    /// Runs one poll cycle now.
    pub async fn fetch_and_publish(&self) -> PollOutcome {
        self.poll(Trigger::Manual).await
    }

    async fn poll(&self, trigger: Trigger) -> PollOutcome {
        if !self.begin_cycle(trigger) {
            debug!(?trigger, "poll cycle already running");
            return PollOutcome::Skipped;
        }
        loop {
            let outcome = self.run_cycle(trigger).await;
            if !self.finish_cycle() {
                return outcome;
            }
            debug!("running follow-up poll cycle");
        }
    }

    fn begin_cycle(&self, trigger: Trigger) -> bool {
        let mut cycle = self.inner.cycle.lock().unwrap_or_else(|e| e.into_inner());
        if cycle.busy {
            if trigger.wants_rerun() {
                cycle.rerun = true;
            }
            return false;
        }
        cycle.busy = true;
        true
    }

    /// Returns true when another cycle was requested while this one ran.
    fn finish_cycle(&self) -> bool {
        let mut cycle = self.inner.cycle.lock().unwrap_or_else(|e| e.into_inner());
        if cycle.rerun {
            cycle.rerun = false;
            return true;
        }
        cycle.busy = false;
        false
    }

    async fn run_cycle(&self, trigger: Trigger) -> PollOutcome {
        let inner = &self.inner;
        let api_key = inner.settings.read().await.api_key.clone();
        debug!(?trigger, "poll cycle started");

        let (outcome, state, message) =
            match fetch_headlines(&inner.client, &inner.config, &api_key).await {
                Ok(items) if items.is_empty() => {
                    info!("provider returned no headlines");
                    (PollOutcome::Empty, CachedState::empty(), Outbound::info(EMPTY_MESSAGE))
                }
                Ok(items) => {
                    let categories = inner.config.annotate_emoji.then(|| inner.categories.as_ref());
                    let limit = inner.config.max_articles.min(MAX_ARTICLES);
                    let articles: Vec<Article> = items
                        .iter()
                        .take(limit)
                        .map(|item| Article::from_provider(item, categories))
                        .collect();
                    info!(count = articles.len(), "headlines updated");
                    (
                        PollOutcome::Success(articles.clone()),
                        CachedState::success(articles.clone()),
                        Outbound::headlines(articles),
                    )
                }
                Err(err) => {
                    match &err {
                        PollError::MissingCredential => info!("no API key configured, skipping fetch"),
                        other => warn!(error = %other, "failed to fetch headlines"),
                    }
                    let message = err.user_message();
                    let last_update = inner.store.load_cached_state().await.last_update;
                    (
                        PollOutcome::Failed(err),
                        CachedState::failed(message.clone(), last_update),
                        Outbound::error(message),
                    )
                }
            };

        if let Err(e) = inner.store.save_cached_state(&state).await {
            warn!(error = %e, "failed to persist cached state");
        }
        *inner.latest.write().await = Some(message.clone());
        inner.observers.broadcast(&message).await;
        outcome
    }

    /// Replays the last published state to a newly attached observer.
    pub async fn on_observer_ready(&self, observer_id: &str) {
        let latest = self.latest().await;
        match latest {
            Some(message) => {
                self.inner.observers.send_to(observer_id, &message).await;
            }
            None => debug!(observer = observer_id, "nothing cached to replay yet"),
        }
    }

    pub async fn validate_api_key(&self, api_key: &str) -> KeyValidation {
        validate_api_key(&self.inner.client, &self.inner.config, api_key).await
    }

    /// Routes an inbound message. `sender` identifies the observer that sent
    /// it, when there is one.
    pub async fn handle(&self, sender: Option<&str>, message: Inbound) -> Result<(), SettingsError> {
        match message {
            Inbound::ContentScriptReady => match sender {
                Some(id) => self.on_observer_ready(id).await,
                None => debug!("ready message without a sender"),
            },
            Inbound::ContentScriptClosed => match sender {
                Some(id) => {
                    self.inner.observers.unregister(id).await;
                    debug!(observer = id, "observer detached");
                }
                None => debug!("closed message without a sender"),
            },
            Inbound::OpenOptions => info!(sender, "options surface requested"),
            Inbound::UpdateSettings(update) => self.reconfigure(update).await?,
            Inbound::UpdateRefreshInterval { interval } => {
                self.reconfigure(SettingsUpdate::refresh_interval(interval))
                    .await?
            }
            Inbound::ResetSettings => self.reset().await,
            Inbound::RefreshNow => {
                self.fetch_and_publish().await;
            }
            Inbound::ValidateApiKey { api_key } => {
                let validation = self.validate_api_key(&api_key).await;
                debug!(valid = validation.valid, "api key validated");
                if let Some(id) = sender {
                    let reply = if validation.valid {
                        Outbound::info(validation.message)
                    } else {
                        Outbound::error(validation.message)
                    };
                    self.inner.observers.send_to(id, &reply).await;
                }
            }
        }
        Ok(())
    }

    /// Stops the timer and waits for its task to finish.
    pub async fn shutdown(&self) {
        let handle = self.inner.timer.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.stop().await {
                warn!(error = %e, "poller task failed");
            }
        }
        info!("ticker service stopped");
    }
}
