//! Session: single-owner event loop for the dial's state.
//!
//! One `Session` exists per host connection.  It owns the snapshot, icon
//! cache, fetch generations and renderer exclusively; nothing else touches
//! them.  Host frames, poll ticks and the results of background HTTP calls
//! all arrive as `SessionEvent`s on one channel and are handled one at a
//! time, so a reconcile and the render that follows it are never interleaved
//! with anything else.
//!
//! Network calls never run on the loop itself.  They are spawned as tasks
//! that post their result back as an event; every such task is tied to the
//! session's `CancellationToken` and stops at teardown.

use std::collections::HashMap;
use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use dial_proto::config::{Capabilities, Config};
use dial_proto::protocol::{AppEntry, HostEvent, InboundMessage};
use dial_proto::store::{reconcile, FetchGenerations, Snapshot};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::daemon::{DaemonClient, DaemonError};
use crate::host::DisplaySink;
use crate::icons::IconCache;
use crate::inspector;
use crate::mutate::{self, RemoteUpdate, Rotation, WriteKind};
use crate::render::Renderer;

// ── SessionEvent ──────────────────────────────────────────────────────────────

/// All inputs into the session loop.
#[derive(Debug)]
pub enum SessionEvent {
    /// A frame from the dial host.
    Host(InboundMessage),
    /// Host socket closed; ends the session.
    HostClosed,
    /// Periodic `/apps` poll.
    PollTick,
    AppsFetched {
        generation: u64,
        result: Result<Vec<AppEntry>, DaemonError>,
    },
    /// `icon` is `None` when the daemon had none or the fetch failed.
    IconFetched { name: String, icon: Option<String> },
    InspectorDone {
        action: Option<String>,
        context: String,
        reply: Value,
        refetch: bool,
    },
}

// ── Session ───────────────────────────────────────────────────────────────────

pub struct Session<S> {
    daemon: DaemonClient,
    sink: S,
    plugin_uuid: String,
    /// Host context of our action instance.  Until the host names one we
    /// address it by plugin UUID.
    action_context: Option<String>,
    snapshot: Snapshot,
    icons: IconCache,
    generations: FetchGenerations,
    renderer: Renderer,
    capabilities: Capabilities,
    volume_step: f64,
    poll_interval: Duration,
    /// Handed to spawned tasks so their results re-enter the loop.
    event_tx: mpsc::Sender<SessionEvent>,
    cancel: CancellationToken,
    /// Latest write per daemon-side value; a newer one cancels it.
    writes: HashMap<(WriteKind, String), CancellationToken>,
}

impl<S: DisplaySink> Session<S> {
    pub fn new(
        config: &Config,
        daemon: DaemonClient,
        sink: S,
        plugin_uuid: impl Into<String>,
        event_tx: mpsc::Sender<SessionEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            daemon,
            sink,
            plugin_uuid: plugin_uuid.into(),
            action_context: None,
            snapshot: Snapshot::default(),
            icons: IconCache::default(),
            generations: FetchGenerations::default(),
            renderer: Renderer::from_config(config),
            capabilities: config.capabilities,
            volume_step: config.dial.volume_step,
            poll_interval: config.polling.interval(),
            event_tx,
            cancel,
            writes: HashMap::new(),
        }
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    #[cfg(test)]
    pub fn icons(&self) -> &IconCache {
        &self.icons
    }

    pub async fn run(mut self, mut event_rx: mpsc::Receiver<SessionEvent>) -> anyhow::Result<()> {
        info!(
            "session: starting, daemon at {}, polling every {:?}",
            self.daemon.base_url(),
            self.poll_interval
        );

        self.spawn_poller();
        self.request_refresh();

        while let Some(event) = event_rx.recv().await {
            if self.handle_event(event).is_break() {
                break;
            }
        }

        self.teardown();
        Ok(())
    }

    pub fn handle_event(&mut self, event: SessionEvent) -> ControlFlow<()> {
        match event {
            SessionEvent::Host(msg) => self.handle_host(msg),
            SessionEvent::HostClosed => {
                info!("session: host closed the connection");
                return ControlFlow::Break(());
            }
            SessionEvent::PollTick => self.request_refresh(),
            SessionEvent::AppsFetched { generation, result } => self.apply_fetch(generation, result),
            SessionEvent::IconFetched { name, icon } => self.apply_icon(&name, icon),
            SessionEvent::InspectorDone {
                action,
                context,
                reply,
                refetch,
            } => {
                if let Err(e) = self.sink.send_to_inspector(action, &context, reply) {
                    warn!("session: inspector reply failed: {}", e);
                }
                if refetch {
                    self.request_refresh();
                }
            }
        }
        ControlFlow::Continue(())
    }

    fn handle_host(&mut self, msg: InboundMessage) {
        let event = msg.host_event();

        if let Some(context) = &msg.context {
            if self.action_context.is_none() || event == HostEvent::WillAppear {
                self.action_context = Some(context.clone());
            }
        }

        match event {
            HostEvent::WillAppear => {
                self.publish();
                self.request_refresh();
            }
            HostEvent::DidReceiveSettings => self.request_refresh(),
            HostEvent::DialDown => self.rotate_next_app(),
            HostEvent::TouchTap => self.adjust_mute(),
            HostEvent::SendToPlugin { payload } => {
                self.relay_inspector(msg.action.clone(), msg.context.clone(), payload)
            }
            HostEvent::WillDisappear => debug!("session: action disappeared"),
            // Rotation is read off every frame below.
            HostEvent::DialRotate { .. } => {}
            HostEvent::Other(name) => debug!("session: unhandled host event {}", name),
        }

        let ticks = msg.ticks();
        if ticks != 0 {
            self.adjust_volume(ticks);
        }
    }

    // ── Sync ──────────────────────────────────────────────────────────────────

    /// Issue an `/apps` fetch.  Its result comes back as `AppsFetched`.
    pub fn request_refresh(&mut self) {
        let generation = self.generations.issue();
        let daemon = self.daemon.clone();
        let tx = self.event_tx.clone();
        self.spawn(async move {
            let result = daemon.list_apps().await;
            let _ = tx.send(SessionEvent::AppsFetched { generation, result }).await;
        });
    }

    fn apply_fetch(&mut self, generation: u64, result: Result<Vec<AppEntry>, DaemonError>) {
        let apps = match result {
            Ok(apps) => apps,
            Err(e) => {
                warn!("session: app list fetch failed: {}", e);
                return;
            }
        };
        if !self.generations.accept(generation) {
            debug!(
                "session: discarding listing from generation {} (already applied {})",
                generation,
                self.generations.latest_applied()
            );
            return;
        }

        self.snapshot = reconcile(&self.snapshot, apps);
        self.request_icons();
        self.publish();
    }

    fn request_icons(&mut self) {
        let wanted: Vec<(String, u32)> = self
            .snapshot
            .apps()
            .iter()
            .filter_map(|app| app.pid.map(|pid| (app.name.clone(), pid)))
            .collect();

        for (name, pid) in wanted {
            if !self.icons.begin_fetch(&name) {
                continue;
            }
            let daemon = self.daemon.clone();
            let tx = self.event_tx.clone();
            self.spawn(async move {
                let icon = match daemon.fetch_icon(pid).await {
                    Ok(icon) => icon,
                    Err(e) => {
                        debug!("session: no icon for {} (pid {}): {}", name, pid, e);
                        None
                    }
                };
                let _ = tx.send(SessionEvent::IconFetched { name, icon }).await;
            });
        }
    }

    fn apply_icon(&mut self, name: &str, icon: Option<String>) {
        let stored = self.icons.finish_fetch(name, icon);
        if stored {
            debug!("session: cached icon for {} ({} total)", name, self.icons.len());
        }
        let is_active = self
            .snapshot
            .active_app()
            .is_some_and(|app| app.name == name);
        if stored && is_active {
            self.publish();
        }
    }

    // ── Output ────────────────────────────────────────────────────────────────

    fn display_context(&self) -> &str {
        self.action_context.as_deref().unwrap_or(&self.plugin_uuid)
    }

    /// Render the active app and push it to the host.  A failed feedback
    /// update falls back to a plain title.
    pub fn publish(&self) {
        let indicator = self.renderer.render(self.snapshot.active_app(), &self.icons);
        let context = self.display_context();
        debug!("session: publishing {:?} {:?}", indicator.title, indicator.layers);

        let result = indicator
            .feedback()
            .map_err(anyhow::Error::from)
            .and_then(|payload| self.sink.set_feedback(context, payload));

        if let Err(e) = result {
            warn!("session: setFeedback failed: {}", e);
            if let Err(e) = self.sink.set_title(context, &indicator.title) {
                warn!("session: setTitle fallback failed: {}", e);
            }
        }
    }

    // ── Dial input ────────────────────────────────────────────────────────────

    pub fn adjust_volume(&mut self, ticks: i64) {
        if let Some(update) = mutate::adjust_volume(&mut self.snapshot, ticks, self.volume_step) {
            self.publish();
            self.push_remote(update);
        }
    }

    pub fn adjust_mute(&mut self) {
        if !self.capabilities.mute {
            return;
        }
        if let Some(update) = mutate::adjust_mute(&mut self.snapshot) {
            self.publish();
            self.push_remote(update);
        }
    }

    pub fn rotate_next_app(&mut self) {
        match mutate::rotate_next_app(&mut self.snapshot) {
            Rotation::Refresh => self.request_refresh(),
            Rotation::Selected(index) => {
                debug!("session: selected app {} of {}", index, self.snapshot.len());
                self.publish();
                self.request_refresh();
            }
        }
    }

    /// Fire-and-forget write to the daemon.  Local state is never rolled
    /// back; the next poll is the only correction.  At most one write per
    /// app and value is in flight: a newer one cancels its predecessor, so
    /// stale values can't land after fresh ones.
    fn push_remote(&mut self, update: RemoteUpdate) {
        let (kind, name) = update.target();
        let key = (kind, name.to_string());
        if let Some(previous) = self.writes.remove(&key) {
            previous.cancel();
        }
        let token = self.cancel.child_token();
        self.writes.insert(key, token.clone());

        let daemon = self.daemon.clone();
        tokio::spawn(async move {
            let write = async {
                match &update {
                    RemoteUpdate::Volume { name, volume } => daemon.set_volume(name, *volume).await,
                    RemoteUpdate::Mute { name, mute } => daemon.set_mute(name, *mute).await,
                }
            };
            tokio::select! {
                biased;
                _ = token.cancelled() => debug!("session: {:?} superseded", update),
                result = write => {
                    if let Err(e) = result {
                        warn!("session: {:?} not confirmed: {}", update, e);
                    }
                }
            }
        });
    }

    fn relay_inspector(&self, action: Option<String>, context: Option<String>, payload: Value) {
        let Some(request) = inspector::parse_request(&payload) else {
            return;
        };
        let context = context.unwrap_or_else(|| self.display_context().to_string());
        let daemon = self.daemon.clone();
        let tx = self.event_tx.clone();
        self.spawn(async move {
            let (reply, refetch) = inspector::handle_request(&daemon, request).await;
            let _ = tx
                .send(SessionEvent::InspectorDone {
                    action,
                    context,
                    reply,
                    refetch,
                })
                .await;
        });
    }

    // ── Tasks ─────────────────────────────────────────────────────────────────

    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = task => {}
            }
        });
    }

    fn spawn_poller(&self) {
        let tx = self.event_tx.clone();
        let period = self.poll_interval;
        self.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; `run` already fetched.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if tx.send(SessionEvent::PollTick).await.is_err() {
                    break;
                }
            }
        });
    }

    fn teardown(&mut self) {
        info!("session: tearing down");
        self.cancel.cancel();
    }
}
