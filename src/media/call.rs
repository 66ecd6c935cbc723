//! Operations a media handle forwards, and their action/argument encoding.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::bridge::Invocation;

/// Playback options honoured by iOS-style native players.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_loops: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub play_audio_when_screen_is_locked: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MediaCall {
    Play(PlayOptions),
    Pause,
    Stop,
    SeekTo(u64),
    SetVolume(f32),
    StartRecord,
    StopRecord,
    PauseRecord,
    ResumeRecord,
    Release,
    GetCurrentPosition,
    GetCurrentAmplitude,
}

impl MediaCall {
    pub fn action(&self) -> &'static str {
        match self {
            Self::Play(_) => "play",
            Self::Pause => "pause",
            Self::Stop => "stop",
            Self::SeekTo(_) => "seekTo",
            Self::SetVolume(_) => "setVolume",
            Self::StartRecord => "startRecord",
            Self::StopRecord => "stopRecord",
            Self::PauseRecord => "pauseRecord",
            Self::ResumeRecord => "resumeRecord",
            Self::Release => "release",
            Self::GetCurrentPosition => "getCurrentPosition",
            Self::GetCurrentAmplitude => "getCurrentAmplitude",
        }
    }

    /// Decode an invocation received on the native side.
    pub fn from_invocation(action: &str, args: &serde_json::Value) -> Result<Self, String> {
        let call = match action {
            "play" => {
                let options = if args.is_null() {
                    PlayOptions::default()
                } else {
                    serde_json::from_value(args.clone()).map_err(|e| format!("bad play options: {}", e))?
                };
                Self::Play(options)
            }
            "pause" => Self::Pause,
            "stop" => Self::Stop,
            "seekTo" => {
                let ms = args
                    .get("milliseconds")
                    .and_then(|v| v.as_u64())
                    .ok_or("seekTo requires milliseconds")?;
                Self::SeekTo(ms)
            }
            "setVolume" => {
                let volume = args
                    .get("volume")
                    .and_then(|v| v.as_f64())
                    .ok_or("setVolume requires volume")?;
                Self::SetVolume(volume as f32)
            }
            "startRecord" => Self::StartRecord,
            "stopRecord" => Self::StopRecord,
            "pauseRecord" => Self::PauseRecord,
            "resumeRecord" => Self::ResumeRecord,
            "release" => Self::Release,
            "getCurrentPosition" => Self::GetCurrentPosition,
            "getCurrentAmplitude" => Self::GetCurrentAmplitude,
            other => return Err(format!("unknown media action '{}'", other)),
        };
        Ok(call)
    }
}

impl From<MediaCall> for Invocation {
    fn from(call: MediaCall) -> Self {
        let action = call.action();
        let args = match call {
            MediaCall::Play(options) => serde_json::to_value(options).unwrap_or(serde_json::Value::Null),
            MediaCall::SeekTo(ms) => json!({ "milliseconds": ms }),
            MediaCall::SetVolume(volume) => json!({ "volume": volume }),
            _ => serde_json::Value::Null,
        };
        Invocation::new(action, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_play_options_use_camel_case() {
        let invocation: Invocation = MediaCall::Play(PlayOptions {
            number_of_loops: Some(2),
            play_audio_when_screen_is_locked: Some(false),
        })
        .into();
        assert_eq!(invocation.action, "play");
        assert_eq!(invocation.args["numberOfLoops"], 2);
        assert_eq!(invocation.args["playAudioWhenScreenIsLocked"], false);
    }

    #[test]
    fn test_seek_decodes_back() {
        let invocation: Invocation = MediaCall::SeekTo(10_000).into();
        let call = MediaCall::from_invocation(&invocation.action, &invocation.args).unwrap();
        assert_eq!(call, MediaCall::SeekTo(10_000));
    }

    #[test]
    fn test_unknown_action_rejected() {
        assert!(MediaCall::from_invocation("rewind", &serde_json::Value::Null).is_err());
        assert!(MediaCall::from_invocation("seekTo", &serde_json::Value::Null).is_err());
    }
}
