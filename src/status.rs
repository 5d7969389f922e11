use serde::Serialize;
use std::fmt;

/// Which channel a status refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Audio,
    Scroll,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Audio => write!(f, "audio"),
            ChannelKind::Scroll => write!(f, "scroll"),
        }
    }
}

/// Coarse lifecycle state of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    Stopped,
    /// Acquiring what the channel needs before it can play.
    Starting,
    Playing,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelState::Stopped => write!(f, "stopped"),
            ChannelState::Starting => write!(f, "starting"),
            ChannelState::Playing => write!(f, "playing"),
        }
    }
}

/// What crosses the UI boundary. No timing detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "lowercase")]
pub enum ChannelStatus {
    Started,
    Stopped,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEvent {
    pub channel: ChannelKind,
    #[serde(flatten)]
    pub status: ChannelStatus,
}

impl StatusEvent {
    pub fn new(channel: ChannelKind, status: ChannelStatus) -> Self {
        StatusEvent { channel, status }
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            ChannelStatus::Started => write!(f, "{} started", self.channel),
            ChannelStatus::Stopped => write!(f, "{} stopped", self.channel),
            ChannelStatus::Failed(msg) => write!(f, "{} failed: {}", self.channel, msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_human_readable() {
        let evt = StatusEvent::new(ChannelKind::Audio, ChannelStatus::Failed("no device".into()));
        assert_eq!(evt.to_string(), "audio failed: no device");
        assert_eq!(
            StatusEvent::new(ChannelKind::Scroll, ChannelStatus::Started).to_string(),
            "scroll started"
        );
    }

    #[test]
    fn serializes_flat() {
        let evt = StatusEvent::new(ChannelKind::Audio, ChannelStatus::Failed("closed".into()));
        let json = serde_json::to_value(&evt).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"channel": "audio", "status": "failed", "message": "closed"})
        );
        let started = serde_json::to_value(StatusEvent::new(ChannelKind::Scroll, ChannelStatus::Started)).unwrap();
        assert_eq!(started, serde_json::json!({"channel": "scroll", "status": "started"}));
    }
}
