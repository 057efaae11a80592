//! Wire messages exchanged between the host page and the game iframe
//!
//! Every message is a JSON object with a string `type` discriminant and a
//! numeric `timestamp` (ms since epoch). Game-side numbers are JS numbers,
//! so inbound timestamps and levels are `f64`. Inbound values go through
//! [`GameToHost::from_value`], which rejects unknown tags before looking at
//! any other field.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::utils::now_millis;

/// Why an inbound value was not accepted as a message
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("message is not a JSON object")]
    NotAnObject,
    #[error("message has no string `type` field")]
    MissingType,
    #[error("unknown message type: {0}")]
    UnknownType(String),
    #[error("malformed {ty} message: {source}")]
    Malformed {
        ty: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Messages posted by game code to the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameToHost {
    /// Game finished loading
    GameReady {
        #[serde(default)]
        timestamp: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
    },
    /// Serialized game state; `state` is null when nothing was saved yet
    GameState {
        #[serde(default)]
        timestamp: f64,
        #[serde(default)]
        state: Option<String>,
        #[serde(rename = "requestId", default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
    },
    /// Uncaught exception inside the game
    GameError {
        #[serde(default)]
        timestamp: f64,
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stack: Option<String>,
    },
    GameLog {
        #[serde(default)]
        timestamp: f64,
        message: String,
    },
    GameScore {
        #[serde(default)]
        timestamp: f64,
        score: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        level: Option<f64>,
    },
    GameComplete {
        #[serde(default)]
        timestamp: f64,
        score: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        time: Option<f64>,
    },
}

/// Commands posted by the host into the game iframe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostToGame {
    LoadState {
        timestamp: u64,
        state: String,
    },
    ResetGame {
        timestamp: u64,
    },
    PauseGame {
        timestamp: u64,
    },
    ResumeGame {
        timestamp: u64,
    },
    /// Ask the game for its current state; the reply echoes `requestId`
    RequestState {
        timestamp: u64,
        #[serde(rename = "requestId")]
        request_id: u64,
    },
}

/// Read the `type` tag of a raw value
fn message_type(value: &Value) -> Result<&str, MessageError> {
    let obj = value.as_object().ok_or(MessageError::NotAnObject)?;
    obj.get("type")
        .and_then(Value::as_str)
        .ok_or(MessageError::MissingType)
}

impl GameToHost {
    pub const TYPES: [&'static str; 6] = [
        "GAME_READY",
        "GAME_STATE",
        "GAME_ERROR",
        "GAME_LOG",
        "GAME_SCORE",
        "GAME_COMPLETE",
    ];

    /// Validate and decode a value received from a game frame
    pub fn from_value(value: &Value) -> Result<Self, MessageError> {
        let ty = message_type(value)?;
        if !Self::TYPES.contains(&ty) {
            return Err(MessageError::UnknownType(ty.to_string()));
        }
        serde_json::from_value(value.clone()).map_err(|source| MessageError::Malformed {
            ty: ty.to_string(),
            source,
        })
    }

    pub fn tag(&self) -> &'static str {
        match self {
            GameToHost::GameReady { .. } => "GAME_READY",
            GameToHost::GameState { .. } => "GAME_STATE",
            GameToHost::GameError { .. } => "GAME_ERROR",
            GameToHost::GameLog { .. } => "GAME_LOG",
            GameToHost::GameScore { .. } => "GAME_SCORE",
            GameToHost::GameComplete { .. } => "GAME_COMPLETE",
        }
    }

    pub fn timestamp(&self) -> f64 {
        match self {
            GameToHost::GameReady { timestamp, .. }
            | GameToHost::GameState { timestamp, .. }
            | GameToHost::GameError { timestamp, .. }
            | GameToHost::GameLog { timestamp, .. }
            | GameToHost::GameScore { timestamp, .. }
            | GameToHost::GameComplete { timestamp, .. } => *timestamp,
        }
    }
}

impl HostToGame {
    pub const TYPES: [&'static str; 5] = [
        "LOAD_STATE",
        "RESET_GAME",
        "PAUSE_GAME",
        "RESUME_GAME",
        "REQUEST_STATE",
    ];

    pub fn load_state(state: impl Into<String>) -> Self {
        HostToGame::LoadState {
            timestamp: now_millis(),
            state: state.into(),
        }
    }

    pub fn reset() -> Self {
        HostToGame::ResetGame {
            timestamp: now_millis(),
        }
    }

    pub fn pause() -> Self {
        HostToGame::PauseGame {
            timestamp: now_millis(),
        }
    }

    pub fn resume() -> Self {
        HostToGame::ResumeGame {
            timestamp: now_millis(),
        }
    }

    pub fn request_state(request_id: u64) -> Self {
        HostToGame::RequestState {
            timestamp: now_millis(),
            request_id,
        }
    }

    /// Validate and decode a value received from the host
    pub fn from_value(value: &Value) -> Result<Self, MessageError> {
        let ty = message_type(value)?;
        if !Self::TYPES.contains(&ty) {
            return Err(MessageError::UnknownType(ty.to_string()));
        }
        serde_json::from_value(value.clone()).map_err(|source| MessageError::Malformed {
            ty: ty.to_string(),
            source,
        })
    }

    pub fn tag(&self) -> &'static str {
        match self {
            HostToGame::LoadState { .. } => "LOAD_STATE",
            HostToGame::ResetGame { .. } => "RESET_GAME",
            HostToGame::PauseGame { .. } => "PAUSE_GAME",
            HostToGame::ResumeGame { .. } => "RESUME_GAME",
            HostToGame::RequestState { .. } => "REQUEST_STATE",
        }
    }

    pub fn to_value(&self) -> Value {
        // Plain struct/enum data with string keys always serializes
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
