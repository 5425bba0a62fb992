//! Local speech synthesis fallback

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Notify;

use crate::{Error, Result};

/// Language requested for fallback utterances
pub const DEFAULT_LANG: &str = "en-US";

/// Marker of an English voice in a language tag
const ENGLISH_TAG: &str = "en-";

/// espeak-ng default speaking rate in words per minute
const BASE_WORDS_PER_MINUTE: f32 = 175.0;

/// espeak-ng default pitch (0-99)
const BASE_PITCH: f32 = 50.0;

/// A voice offered by a local engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    /// Identifier the engine accepts when selecting the voice
    pub id: String,
    /// Human readable name
    pub name: String,
    /// Language tag such as `en-us`
    pub lang: String,
}

/// A single piece of text to speak locally
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub voice: Option<Voice>,
    pub lang: String,
    /// Relative speaking rate, 1.0 is normal
    pub rate: f32,
    /// Relative pitch, 1.0 is normal
    pub pitch: f32,
}

impl Utterance {
    /// Utterance with the default language, rate and pitch
    #[must_use]
    pub fn new(text: impl Into<String>, voice: Option<Voice>) -> Self {
        Self {
            text: text.into(),
            voice,
            lang: DEFAULT_LANG.to_string(),
            rate: 1.0,
            pitch: 1.0,
        }
    }
}

/// Speech engine running on the local machine
#[async_trait]
pub trait LocalSpeechEngine: Send + Sync {
    /// Speak the utterance, resolving when speech ends
    ///
    /// # Errors
    ///
    /// Returns error if the engine cannot speak
    async fn speak(&self, utterance: &Utterance) -> Result<()>;

    /// Stop any utterance in progress
    fn cancel(&self);

    /// Voices the engine offers
    ///
    /// # Errors
    ///
    /// Returns error if the engine cannot be queried
    async fn list_voices(&self) -> Result<Vec<Voice>>;
}

/// First English voice, else the first voice
#[must_use]
pub fn select_default_voice(voices: &[Voice]) -> Option<&Voice> {
    voices
        .iter()
        .find(|v| v.lang.contains(ENGLISH_TAG))
        .or_else(|| voices.first())
}

/// Speech engine backed by an `espeak-ng` compatible command
pub struct CommandSpeechEngine {
    program: String,
    args: Vec<String>,
    cancel: Notify,
}

impl CommandSpeechEngine {
    /// Create an engine from a command line such as `espeak-ng`
    ///
    /// # Errors
    ///
    /// Returns error if the command line is empty
    pub fn new(command_line: &str) -> Result<Self> {
        let mut parts = command_line.split_whitespace().map(ToString::to_string);
        let program = parts
            .next()
            .ok_or_else(|| Error::Config("speech engine command is empty".to_string()))?;

        Ok(Self {
            program,
            args: parts.collect(),
            cancel: Notify::new(),
        })
    }

    fn speak_command(&self, utterance: &Utterance) -> Command {
        let voice = utterance
            .voice
            .as_ref()
            .map_or_else(|| utterance.lang.to_lowercase(), |v| v.id.clone());

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg("-v")
            .arg(voice)
            .arg("-s")
            .arg(scaled(BASE_WORDS_PER_MINUTE, utterance.rate))
            .arg("-p")
            .arg(scaled(BASE_PITCH, utterance.pitch))
            .arg("--")
            .arg(&utterance.text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scaled(base: f32, factor: f32) -> String {
    ((base * factor).round().max(0.0) as u32).to_string()
}

#[async_trait]
impl LocalSpeechEngine for CommandSpeechEngine {
    async fn speak(&self, utterance: &Utterance) -> Result<()> {
        let mut child = self
            .speak_command(utterance)
            .spawn()
            .map_err(|e| Error::Speech(format!("failed to spawn {}: {e}", self.program)))?;

        tracing::debug!(
            engine = %self.program,
            chars = utterance.text.len(),
            "speaking locally"
        );

        tokio::select! {
            status = child.wait() => {
                let status = status?;
                if status.success() {
                    Ok(())
                } else {
                    Err(Error::Speech(format!("{} exited with {status}", self.program)))
                }
            }
            () = self.cancel.notified() => {
                child.kill().await?;
                tracing::debug!("local speech cancelled");
                Ok(())
            }
        }
    }

    fn cancel(&self) {
        self.cancel.notify_waiters();
    }

    async fn list_voices(&self) -> Result<Vec<Voice>> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg("--voices")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::Speech(format!("failed to run {}: {e}", self.program)))?;

        if !output.status.success() {
            return Err(Error::Speech(format!(
                "{} --voices failed: {}",
                self.program,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(parse_voice_list(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parse `espeak-ng --voices` output
///
/// Columns: `Pty Language Age/Gender VoiceName File Other Languages`
fn parse_voice_list(output: &str) -> Vec<Voice> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            let _priority = cols.next()?;
            let lang = cols.next()?;
            let _age_gender = cols.next()?;
            let name = cols.next()?;

            Some(Voice {
                id: lang.to_string(),
                name: name.replace('_', " "),
                lang: lang.to_string(),
            })
        })
        .collect()
}
