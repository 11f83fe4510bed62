//! Dial host connection.
//!
//! The host starts us with its websocket port and registration details on
//! the command line.  After registering, a reader task turns every text frame
//! into a `SessionEvent::Host`, and a writer task drains the outbound queue
//! that `HostSink` feeds.  When the socket closes the reader reports
//! `SessionEvent::HostClosed` and the session ends.

use anyhow::Context;
use clap::Parser;
use dial_proto::platform::host_ws_url;
use dial_proto::protocol::{FeedbackPayload, InboundMessage, Outbound, Registration, TitlePayload};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::SessionEvent;

#[derive(Parser, Debug, Clone)]
#[command(name = "dial-mixer", version, about = "Per-application volume mixer for dial controllers")]
pub struct Args {
    /// Host websocket port.
    #[arg(long)]
    pub port: u16,
    #[arg(long = "pluginUUID")]
    pub plugin_uuid: String,
    #[arg(long = "registerEvent")]
    pub register_event: String,
    /// Host/device description JSON; logged, otherwise unused.
    #[arg(long)]
    pub info: Option<String>,
    /// Alternate config file.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Args {
    pub fn from_env() -> Self {
        Self::parse_from(normalize_args(std::env::args()))
    }
}

/// Hosts pass long flags with a single dash (`-port 1234`).  Rewrite them to
/// the double-dash form clap expects.
pub fn normalize_args<I>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    args.into_iter()
        .enumerate()
        .map(|(i, arg)| {
            if i > 0 && arg.len() > 2 && arg.starts_with('-') && !arg.starts_with("--") {
                format!("-{arg}")
            } else {
                arg
            }
        })
        .collect()
}

/// Where rendered output goes.
pub trait DisplaySink {
    fn set_feedback(&self, context: &str, payload: FeedbackPayload) -> anyhow::Result<()>;
    fn set_title(&self, context: &str, title: &str) -> anyhow::Result<()>;
    fn send_to_inspector(
        &self,
        action: Option<String>,
        context: &str,
        payload: Value,
    ) -> anyhow::Result<()>;
}

/// Queues outbound messages for the websocket writer task.
#[derive(Debug, Clone)]
pub struct HostSink {
    tx: mpsc::UnboundedSender<String>,
}

impl HostSink {
    fn send(&self, message: Outbound) -> anyhow::Result<()> {
        let text = message.encode()?;
        self.tx
            .send(text)
            .map_err(|_| anyhow::anyhow!("host connection closed"))
    }
}

impl DisplaySink for HostSink {
    fn set_feedback(&self, context: &str, payload: FeedbackPayload) -> anyhow::Result<()> {
        self.send(Outbound::SetFeedback {
            context: context.to_string(),
            payload,
        })
    }

    fn set_title(&self, context: &str, title: &str) -> anyhow::Result<()> {
        self.send(Outbound::SetTitle {
            context: context.to_string(),
            payload: TitlePayload {
                title: title.to_string(),
            },
        })
    }

    fn send_to_inspector(
        &self,
        action: Option<String>,
        context: &str,
        payload: Value,
    ) -> anyhow::Result<()> {
        self.send(Outbound::SendToPropertyInspector {
            action,
            context: context.to_string(),
            payload,
        })
    }
}

/// Open the host websocket, register, and start the reader/writer tasks.
/// Both tasks stop when `cancel` fires.
pub async fn connect(
    args: &Args,
    events: mpsc::Sender<SessionEvent>,
    cancel: CancellationToken,
) -> anyhow::Result<HostSink> {
    let url = host_ws_url(args.port);
    let (ws, _) = connect_async(url.as_str())
        .await
        .with_context(|| format!("connecting to host at {url}"))?;
    let (mut write, mut read) = ws.split();

    let registration = serde_json::to_string(&Registration {
        event: args.register_event.clone(),
        uuid: args.plugin_uuid.clone(),
    })?;
    write
        .send(Message::Text(registration))
        .await
        .context("sending registration")?;
    info!("host: registered {} on {}", args.plugin_uuid, url);

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

    let writer_cancel = cancel.clone();
    tokio::spawn(async move {
        loop {
            let text = tokio::select! {
                _ = writer_cancel.cancelled() => break,
                text = out_rx.recv() => match text {
                    Some(text) => text,
                    None => break,
                },
            };
            if let Err(e) = write.send(Message::Text(text)).await {
                warn!("host: write failed: {}", e);
                break;
            }
        }
        let _ = write.close().await;
    });

    tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => return,
                frame = read.next() => frame,
            };
            match frame {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<InboundMessage>(&text) {
                    Ok(msg) => {
                        if events.send(SessionEvent::Host(msg)).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => debug!("host: ignoring unparseable message: {}", e),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("host: websocket error: {}", e);
                    break;
                }
            }
        }
        info!("host: connection closed");
        let _ = events.send(SessionEvent::HostClosed).await;
    });

    Ok(HostSink { tx: out_tx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dial_proto::protocol::{HostEvent, IndicatorValue};
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_single_dash_flags() {
        let normalized = normalize_args(args(&[
            "dial-mixer",
            "-port",
            "28196",
            "-pluginUUID",
            "ABC",
            "--registerEvent",
            "registerPlugin",
            "-v",
        ]));
        assert_eq!(
            normalized,
            args(&[
                "dial-mixer",
                "--port",
                "28196",
                "--pluginUUID",
                "ABC",
                "--registerEvent",
                "registerPlugin",
                "-v",
            ])
        );
    }

    #[test]
    fn test_parse_host_launch_line() {
        let parsed = Args::parse_from(normalize_args(args(&[
            "dial-mixer",
            "-port",
            "28196",
            "-pluginUUID",
            "ABC",
            "-registerEvent",
            "registerPlugin",
            "-info",
            r#"{"application":{}}"#,
        ])));
        assert_eq!(parsed.port, 28196);
        assert_eq!(parsed.plugin_uuid, "ABC");
        assert_eq!(parsed.register_event, "registerPlugin");
        assert!(parsed.info.is_some());
        assert!(parsed.config.is_none());
    }

    #[tokio::test]
    async fn test_register_relay_and_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // Fake host: check registration, send one rotation, read one
        // feedback frame, then close.
        let host = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();

            let Some(Ok(Message::Text(reg))) = ws.next().await else {
                panic!("expected registration");
            };
            let reg: Value = serde_json::from_str(&reg).unwrap();
            assert_eq!(reg, json!({"event": "registerPlugin", "uuid": "ABC"}));

            let rotate = json!({"event": "dialRotate", "context": "ctx-1", "payload": {"ticks": 2}});
            ws.send(Message::Text(rotate.to_string())).await.unwrap();

            let Some(Ok(Message::Text(out))) = ws.next().await else {
                panic!("expected feedback");
            };
            ws.close(None).await.unwrap();
            serde_json::from_str::<Value>(&out).unwrap()
        });

        let args = Args {
            port,
            plugin_uuid: "ABC".to_string(),
            register_event: "registerPlugin".to_string(),
            info: None,
            config: None,
        };
        let (tx, mut rx) = mpsc::channel(16);
        let sink = connect(&args, tx, CancellationToken::new()).await.unwrap();

        let Some(SessionEvent::Host(msg)) = rx.recv().await else {
            panic!("expected host event");
        };
        assert_eq!(msg.context.as_deref(), Some("ctx-1"));
        assert_eq!(msg.host_event(), HostEvent::DialRotate { ticks: 2 });

        sink.set_feedback(
            "ctx-1",
            FeedbackPayload {
                title: "Spotify".to_string(),
                value: "53%".to_string(),
                indicator: IndicatorValue { value: 53 },
                icon: None,
            },
        )
        .unwrap();

        let out = host.await.unwrap();
        assert_eq!(out["event"], "setFeedback");
        assert_eq!(out["context"], "ctx-1");
        assert_eq!(out["payload"]["value"], "53%");

        assert!(matches!(rx.recv().await, Some(SessionEvent::HostClosed)));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let args = Args {
            port,
            plugin_uuid: "ABC".to_string(),
            register_event: "registerPlugin".to_string(),
            info: None,
            config: None,
        };
        let (tx, _rx) = mpsc::channel(1);
        assert!(connect(&args, tx, CancellationToken::new()).await.is_err());
    }
}
