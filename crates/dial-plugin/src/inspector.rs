//! Property-inspector relay.
//!
//! The inspector page can't reach the daemon itself, so it asks through the
//! host socket (`sendToPlugin`) and we answer with `sendToPropertyInspector`.

use dial_proto::protocol::{InspectorApp, InspectorReply, InspectorRequest};
use serde_json::Value;
use tracing::debug;

use crate::daemon::DaemonClient;

pub fn parse_request(payload: &Value) -> Option<InspectorRequest> {
    match serde_json::from_value(payload.clone()) {
        Ok(request) => Some(request),
        Err(e) => {
            debug!("inspector: ignoring payload {}: {}", payload, e);
            None
        }
    }
}

/// Run one inspector request against the daemon.  Returns the reply payload
/// and whether the core should refetch its own listing.
pub async fn handle_request(daemon: &DaemonClient, request: InspectorRequest) -> (Value, bool) {
    let (result, refetch) = match &request {
        InspectorRequest::Refresh => (Ok(()), false),
        InspectorRequest::Exclude { name } => (daemon.exclude(name).await, true),
        InspectorRequest::Unexclude { name } => (daemon.unexclude(name).await, true),
    };

    let reply = match result {
        Ok(()) => match daemon.list_apps().await {
            Ok(apps) => InspectorReply::Apps {
                apps: apps.iter().map(InspectorApp::from).collect(),
            },
            Err(e) => InspectorReply::Error {
                error: e.to_string(),
            },
        },
        Err(e) => InspectorReply::Error {
            error: e.to_string(),
        },
    };

    let payload = serde_json::to_value(&reply).unwrap_or(Value::Null);
    (payload, refetch)
}
