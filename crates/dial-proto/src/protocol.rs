//! Wire formats.
//!
//! Two peers talk to the plugin:
//!
//! * the audio-control daemon, over plain HTTP GETs returning JSON
//!   (`AppEntry`, `IconResponse`);
//! * the dial host, over a websocket carrying one JSON object per text frame
//!   (`InboundMessage` in, `Outbound` out).
//!
//! The property inspector piggybacks on the host socket via `sendToPlugin` /
//! `sendToPropertyInspector`; its payloads are `InspectorRequest` and
//! `InspectorReply`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ── Daemon ────────────────────────────────────────────────────────────────────

/// One controllable application as reported by `GET /apps`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppEntry {
    /// Used for icon lookup only.
    #[serde(default)]
    pub pid: Option<u32>,
    /// Audio-session grouping id.  Carried through, never interpreted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
    /// Primary key for mutation requests; unique within one listing.
    pub name: String,
    /// Absent when the daemon's mixer backend is unavailable.
    #[serde(default, deserialize_with = "deserialize_volume")]
    pub volume: f64,
    #[serde(default)]
    pub mute: bool,
}

impl AppEntry {
    pub fn new(name: impl Into<String>, volume: f64) -> Self {
        Self {
            pid: None,
            guid: None,
            name: name.into(),
            volume: volume.clamp(0.0, 1.0),
            mute: false,
        }
    }

    /// Volume rounded to a whole percentage.
    pub fn volume_percent(&self) -> u8 {
        volume_percent(self.volume)
    }
}

pub fn volume_percent(volume: f64) -> u8 {
    (volume.clamp(0.0, 1.0) * 100.0).round() as u8
}

fn deserialize_volume<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?;
    Ok(raw.unwrap_or(0.0).clamp(0.0, 1.0))
}

/// Response body of `GET /icon?pid=`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IconResponse {
    #[serde(default)]
    pub data_url: Option<String>,
}

// ── Host → plugin ─────────────────────────────────────────────────────────────

/// Sent once right after the websocket opens.
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub event: String,
    pub uuid: String,
}

/// Raw envelope of every message the host sends.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundMessage {
    pub event: String,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
}

/// Host events the sync core reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    WillAppear,
    WillDisappear,
    /// Settings or appearance changed; treated as a refresh request.
    DidReceiveSettings,
    DialDown,
    DialRotate { ticks: i64 },
    TouchTap,
    SendToPlugin { payload: Value },
    Other(String),
}

impl InboundMessage {
    /// Rotation carried by this message.  Hosts disagree on the field name,
    /// so `ticks`, `rotation` and `delta` are tried in that order.
    pub fn ticks(&self) -> i64 {
        let Some(payload) = self.payload.as_ref() else {
            return 0;
        };
        ["ticks", "rotation", "delta"]
            .iter()
            .find_map(|key| payload.get(*key))
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f.round() as i64)))
            .unwrap_or(0)
    }

    pub fn host_event(&self) -> HostEvent {
        match self.event.as_str() {
            "willAppear" => HostEvent::WillAppear,
            "willDisappear" => HostEvent::WillDisappear,
            "didReceiveSettings" | "appearance" => HostEvent::DidReceiveSettings,
            "dialDown" => HostEvent::DialDown,
            "dialRotate" => HostEvent::DialRotate {
                ticks: self.ticks(),
            },
            "touchTap" => HostEvent::TouchTap,
            "sendToPlugin" => HostEvent::SendToPlugin {
                payload: self.payload.clone().unwrap_or(Value::Null),
            },
            other => HostEvent::Other(other.to_string()),
        }
    }
}

// ── Plugin → host ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorValue {
    pub value: u8,
}

/// Payload of `setFeedback`: the dial's live readout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackPayload {
    pub title: String,
    pub value: String,
    pub indicator: IndicatorValue,
    /// `data:` URL of the rendered indicator image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TitlePayload {
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum Outbound {
    SetFeedback {
        context: String,
        payload: FeedbackPayload,
    },
    SetTitle {
        context: String,
        payload: TitlePayload,
    },
    SendToPropertyInspector {
        #[serde(skip_serializing_if = "Option::is_none")]
        action: Option<String>,
        context: String,
        payload: Value,
    },
}

impl Outbound {
    pub fn encode(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ── Property inspector ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "request", rename_all = "lowercase")]
pub enum InspectorRequest {
    Refresh,
    Exclude { name: String },
    Unexclude { name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InspectorApp {
    pub pid: Option<u32>,
    pub name: String,
    pub volume_pct: u8,
    pub mute: bool,
}

impl From<&AppEntry> for InspectorApp {
    fn from(app: &AppEntry) -> Self {
        Self {
            pid: app.pid,
            name: app.name.clone(),
            volume_pct: app.volume_percent(),
            mute: app.mute,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InspectorReply {
    Apps { apps: Vec<InspectorApp> },
    Error { error: String },
}
