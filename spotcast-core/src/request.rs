//! Play and control payloads accepted by the event entry points.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::warn;

/// Repeat mode applied after playback starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatMode {
    Track,
    Context,
    #[default]
    Off,
}

impl RepeatMode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Track => "track",
            Self::Context => "context",
            Self::Off => "off",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "track" => Some(Self::Track),
            "context" => Some(Self::Context),
            "off" => Some(Self::Off),
            _ => None,
        }
    }
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `track` field takes one name-or-uri or a list of track uris.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TrackField {
    One(String),
    Many(Vec<String>),
}

/// The intent behind a play request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionRequest {
    pub track: Option<TrackField>,
    pub playlist: Option<String>,
    pub album: Option<String>,
    pub artist: Option<String>,
    pub genre: Option<String>,
    pub category: Option<String>,
    /// Playlist owner; alias mapped, defaults to the configured user
    pub username: Option<String>,
    /// Recommend something like the reference instead of the reference itself
    #[serde(deserialize_with = "lenient_flag")]
    pub similar: bool,
    /// Pick randomly wherever the cascade chooses between candidates
    #[serde(deserialize_with = "lenient_flag")]
    pub random_search: bool,
    #[serde(deserialize_with = "lenient_flag")]
    pub single: bool,
    #[serde(deserialize_with = "lenient_flag")]
    pub multiple: bool,
    #[serde(rename = "number_tracks", deserialize_with = "lenient_count")]
    pub requested_count: u32,
    #[serde(deserialize_with = "lenient_flag")]
    pub random_start: bool,
    #[serde(deserialize_with = "lenient_flag")]
    pub shuffle: bool,
    #[serde(rename = "repeat", deserialize_with = "lenient_repeat")]
    pub repeat_mode: RepeatMode,
    #[serde(deserialize_with = "lenient_flag")]
    pub featured: bool,
    #[serde(deserialize_with = "lenient_flag")]
    pub new_releases: bool,
}

impl ResolutionRequest {
    /// The requested count after `single` and `multiple` take precedence.
    #[must_use]
    pub const fn effective_count(&self) -> u32 {
        if self.single || self.multiple {
            0
        } else {
            self.requested_count
        }
    }

    /// `multiple` only has effect when `single` is not set.
    #[must_use]
    pub const fn wants_multiple(&self) -> bool {
        self.multiple && !self.single
    }

    /// First track name-or-uri, if the field holds a single value.
    #[must_use]
    pub fn track_name(&self) -> Option<&str> {
        match &self.track {
            Some(TrackField::One(track)) => Some(track.as_str()),
            Some(TrackField::Many(_)) | None => None,
        }
    }
}

/// A play event: the intent plus the target device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayRequest {
    #[serde(default)]
    pub device: Option<String>,
    #[serde(flatten)]
    pub request: ResolutionRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    Pause,
    Resume,
    /// Spotify has no stop, this pauses
    Stop,
    #[serde(alias = "skip", alias = "next_track")]
    Next,
    #[serde(alias = "previous_track")]
    Previous,
    #[serde(alias = "adjust_volume")]
    SetVolume,
    IncreaseVolume,
    DecreaseVolume,
    Mute,
    Snapshot,
    Restore,
}

/// A control event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlRequest {
    pub action: Option<ControlAction>,
    pub device: Option<String>,
    #[serde(alias = "volume", deserialize_with = "lenient_volume")]
    pub volume_level: Option<u8>,
    /// Move current playback to `device` without changing what plays
    #[serde(deserialize_with = "lenient_flag")]
    pub transfer_playback: bool,
}

/// Truthy like the event payloads send them; `"false"`, `"off"` and `"0"` count as false.
fn lenient_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n.abs() > f64::EPSILON),
        Some(Value::String(s)) => !matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "" | "0" | "false" | "no" | "off"
        ),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
    })
}

fn lenient_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or_else(|| {
                warn!("number_tracks must be a positive number, got {}", n);
                0
            }),
        Some(Value::String(s)) => s.trim().parse().unwrap_or_else(|_| {
            warn!("Please specify a number for number_tracks, got \"{}\"", s);
            0
        }),
        Some(other) => {
            warn!("Please specify a number for number_tracks, got {}", other);
            0
        }
    })
}

fn lenient_repeat<'de, D: Deserializer<'de>>(deserializer: D) -> Result<RepeatMode, D::Error> {
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.map_or(RepeatMode::Off, |raw| {
        RepeatMode::parse(&raw).unwrap_or_else(|| {
            warn!(
                "Invalid repeat state specified: {}, choose one of 'track', 'context', 'off'",
                raw
            );
            RepeatMode::Off
        })
    }))
}

fn lenient_volume<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u8>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    let parsed = match &value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };
    match parsed {
        Some(level) if (0.0..=100.0).contains(&level) => Ok(Some(volume_percent(level))),
        _ => {
            warn!(
                "Please specify a volume_level between 0 and 100, got {}",
                value.unwrap_or(serde_json::Value::Null)
            );
            Ok(None)
        }
    }
}

/// Levels below 1.0 are treated as a fraction, anything above as a percentage.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn volume_percent(level: f64) -> u8 {
    let percent = if level > 0.0 && level < 1.0 { level * 100.0 } else { level };
    percent.round().clamp(0.0, 100.0) as u8
}
