//! Forwards WARN and ERROR events to the daemon's `/_log` console.
//!
//! The layer only formats and enqueues; a background task drains the queue
//! and makes the HTTP calls, so logging never blocks the session loop.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::daemon::DaemonClient;

pub struct DebugSinkLayer {
    sender: mpsc::UnboundedSender<String>,
}

impl DebugSinkLayer {
    pub fn new(sender: mpsc::UnboundedSender<String>) -> Self {
        Self { sender }
    }
}

impl<S> tracing_subscriber::Layer<S> for DebugSinkLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let level = event.metadata().level();
        if !matches!(*level, tracing::Level::WARN | tracing::Level::ERROR) {
            return;
        }

        let mut message = String::new();
        let now = chrono::Local::now();
        message.push_str(&format!("{} ", now.format("%H:%M:%S")));
        message.push_str(&format!("[{}] ", level));

        let mut visitor = MessageVisitor(&mut message);
        event.record(&mut visitor);

        // Receiver gone means forwarding is off or shutting down.
        let _ = self.sender.send(message);
    }
}

struct MessageVisitor<'a>(&'a mut String);

impl<'a> tracing::field::Visit for MessageVisitor<'a> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0.push_str(&format!("{:?}", value));
        } else {
            self.0.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}

/// Drain `rx` into `GET /_log`.  Failures are dropped: logging them would
/// feed straight back into this queue.
pub fn spawn_forwarder(
    mut rx: mpsc::UnboundedReceiver<String>,
    client: DaemonClient,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => break,
                message = rx.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            let _ = client.log(&message).await;
        }
    })
}
