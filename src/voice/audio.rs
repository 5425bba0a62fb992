//! Audio output for synthesized speech

use std::io::Write;
use std::process::Stdio;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::process::{Child, Command};

use crate::{Error, Result};

/// Why audio could not be played
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum PlaybackError {
    /// The platform refused to start audio on its own
    #[error("playback not allowed: {0}")]
    NotAllowed(String),

    /// Audio could not be decoded or the output failed
    #[error("playback failed: {0}")]
    Failed(String),
}

/// Audio that has started emitting
#[async_trait]
pub trait ActivePlayback: Send {
    /// Wait until playback ends
    ///
    /// # Errors
    ///
    /// Returns error if playback stopped abnormally
    async fn finished(&mut self) -> std::result::Result<(), PlaybackError>;

    /// Stop playback immediately
    fn stop(&mut self);
}

/// Destination for encoded audio
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Begin playing `audio`, returning once sound is being emitted
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError::NotAllowed`] when the platform refuses to
    /// start audio, [`PlaybackError::Failed`] otherwise
    async fn start(&self, audio: &[u8])
    -> std::result::Result<Box<dyn ActivePlayback>, PlaybackError>;
}

/// Plays audio by handing a temporary file to an external player
pub struct CommandAudioSink {
    program: String,
    args: Vec<String>,
}

impl CommandAudioSink {
    /// Create a sink from a command line such as `mpv --no-video`
    ///
    /// # Errors
    ///
    /// Returns error if the command line is empty
    pub fn new(command_line: &str) -> Result<Self> {
        let mut parts = command_line.split_whitespace().map(ToString::to_string);
        let program = parts
            .next()
            .ok_or_else(|| Error::Config("audio player command is empty".to_string()))?;

        Ok(Self {
            program,
            args: parts.collect(),
        })
    }
}

#[async_trait]
impl AudioSink for CommandAudioSink {
    async fn start(
        &self,
        audio: &[u8],
    ) -> std::result::Result<Box<dyn ActivePlayback>, PlaybackError> {
        let mut file = tempfile::Builder::new()
            .prefix("docent-")
            .suffix(".mp3")
            .tempfile()
            .map_err(|e| PlaybackError::Failed(format!("temp file: {e}")))?;
        file.write_all(audio)
            .and_then(|()| file.flush())
            .map_err(|e| PlaybackError::Failed(format!("temp file: {e}")))?;

        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(file.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::PermissionDenied => {
                    PlaybackError::NotAllowed(format!("{}: {e}", self.program))
                }
                _ => PlaybackError::Failed(format!("failed to spawn {}: {e}", self.program)),
            })?;

        tracing::debug!(player = %self.program, bytes = audio.len(), "audio playback started");

        Ok(Box::new(ProcessPlayback { child, _file: file }))
    }
}

/// A running player process and the file it reads
struct ProcessPlayback {
    child: Child,
    _file: NamedTempFile,
}

#[async_trait]
impl ActivePlayback for ProcessPlayback {
    async fn finished(&mut self) -> std::result::Result<(), PlaybackError> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| PlaybackError::Failed(e.to_string()))?;

        if status.success() {
            Ok(())
        } else {
            Err(PlaybackError::Failed(format!("player exited with {status}")))
        }
    }

    fn stop(&mut self) {
        if let Err(e) = self.child.start_kill() {
            tracing::debug!(error = %e, "player already exited");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_split() {
        let sink = CommandAudioSink::new("mpv --no-video --really-quiet").unwrap();
        assert_eq!(sink.program, "mpv");
        assert_eq!(sink.args, vec!["--no-video", "--really-quiet"]);
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(matches!(CommandAudioSink::new(""), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_missing_player_fails() {
        let sink = CommandAudioSink::new("docent-no-such-player-binary").unwrap();
        let err = sink.start(b"ID3").await.err().unwrap();
        assert!(matches!(err, PlaybackError::Failed(_)));
    }
}
