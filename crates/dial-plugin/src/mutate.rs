//! Local mutations driven by dial input.
//!
//! Each operation edits the snapshot in place, so the next render reflects
//! it immediately, and hands back the `RemoteUpdate` the caller must push to
//! the daemon.  Nothing here waits on the network.

use dial_proto::store::Snapshot;

/// A change to mirror on the daemon, keyed by app name.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteUpdate {
    Volume { name: String, volume: f64 },
    Mute { name: String, mute: bool },
}

/// The daemon-side value a `RemoteUpdate` writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteKind {
    Volume,
    Mute,
}

impl RemoteUpdate {
    /// Updates with the same target supersede each other.
    pub fn target(&self) -> (WriteKind, &str) {
        match self {
            RemoteUpdate::Volume { name, .. } => (WriteKind::Volume, name),
            RemoteUpdate::Mute { name, .. } => (WriteKind::Mute, name),
        }
    }
}

/// What a press did to the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    /// Nothing to rotate through; the caller should refetch.
    Refresh,
    Selected(usize),
}

pub fn step_volume(old: f64, ticks: i64, step: f64) -> f64 {
    (old + ticks as f64 * step).clamp(0.0, 1.0)
}

/// Apply `ticks` detents to the active app's volume.
pub fn adjust_volume(snapshot: &mut Snapshot, ticks: i64, step: f64) -> Option<RemoteUpdate> {
    if ticks == 0 {
        return None;
    }
    let app = snapshot.active_app_mut()?;
    app.volume = step_volume(app.volume, ticks, step);
    Some(RemoteUpdate::Volume {
        name: app.name.clone(),
        volume: app.volume,
    })
}

/// Flip the active app's mute flag.
pub fn adjust_mute(snapshot: &mut Snapshot) -> Option<RemoteUpdate> {
    let app = snapshot.active_app_mut()?;
    app.mute = !app.mute;
    Some(RemoteUpdate::Mute {
        name: app.name.clone(),
        mute: app.mute,
    })
}

pub fn rotate_next_app(snapshot: &mut Snapshot) -> Rotation {
    match snapshot.rotate_next() {
        Some(index) => Rotation::Selected(index),
        None => Rotation::Refresh,
    }
}
