//! Text command vocabulary shared by moderators and chat bridges
//!
//! Commands are parsed from free text and executed against the same
//! services the control API uses, so a chat `!skip` and `POST
//! /api/session/skip` are indistinguishable to the rest of the system.

use erwin_protocol::timeline::{expected_position_secs, format_clock};
use serde::Serialize;

use super::{PlaybackService, VoteService};
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum ChatCommand {
    /// 0-based option index (typed 1-based)
    Vote {
        #[serde(rename = "optionIndex")]
        option_index: usize,
    },
    Skip,
    Pause,
    Resume,
    NowPlaying,
}

impl ChatCommand {
    /// Parse a chat line. Unknown text yields `None`.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let text = text.strip_prefix('!').unwrap_or(text);
        let mut words = text.split_whitespace();
        let verb = words.next()?.to_lowercase();

        let command = match verb.as_str() {
            "vote" => {
                let n: usize = words.next()?.parse().ok()?;
                Self::Vote {
                    option_index: n.checked_sub(1)?,
                }
            }
            "skip" => Self::Skip,
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            "np" | "song" | "nowplaying" => Self::NowPlaying,
            _ => return None,
        };
        Some(command)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandReply {
    pub command: ChatCommand,
    /// Text to post back to the chat, if any
    pub reply: Option<String>,
}

#[derive(Clone)]
pub struct CommandService {
    playback: PlaybackService,
    votes: VoteService,
}

impl CommandService {
    pub fn new(playback: PlaybackService, votes: VoteService) -> Self {
        Self { playback, votes }
    }

    #[tracing::instrument(skip(self))]
    pub async fn execute(&self, author: &str, text: &str) -> ApiResult<CommandReply> {
        let command = ChatCommand::parse(text)
            .ok_or_else(|| ApiError::ValidationError(format!("unrecognized command: {}", text.trim())))?;

        let reply = match command {
            ChatCommand::Vote { option_index } => {
                self.votes.cast(author, option_index).await?;
                None
            }
            ChatCommand::Skip => {
                self.playback.skip().await?;
                None
            }
            ChatCommand::Pause => {
                self.playback.pause().await?;
                None
            }
            ChatCommand::Resume => {
                self.playback.resume().await?;
                None
            }
            ChatCommand::NowPlaying => Some(self.now_playing().await?),
        };

        tracing::info!(author, command = ?command, "Chat command executed");
        Ok(CommandReply { command, reply })
    }

    async fn now_playing(&self) -> ApiResult<String> {
        let snapshot = self.playback.snapshot().await?;
        let Some(track) = snapshot.current_track else {
            return Ok("Nothing is playing".to_string());
        };
        let position =
            expected_position_secs(&snapshot.play_state, track.duration_sec, snapshot.server_now);
        Ok(format!(
            "Now playing: {} [{}/{}]",
            track.label(),
            format_clock(position),
            format_clock(track.duration_sec.unwrap_or(0.0))
        ))
    }
}
