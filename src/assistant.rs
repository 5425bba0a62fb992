//! Voice assistant session
//!
//! Turns transcripts into spoken answers: the transcript is corrected,
//! resolved against the knowledge sources, and the answer is queued on the
//! sequencer together with the query it answers.

use crate::Result;
use crate::query::{KnowledgeBase, QueryResolver, Resolution, correct_transcript};
use crate::voice::SequencerHandle;

/// Voice used for remote synthesis in a session
///
/// The knowledge base's own voice wins, then the gateway's default, then the
/// locally configured voice. Empty ids are skipped.
#[must_use]
pub fn session_voice_id(
    knowledge: Option<&KnowledgeBase>,
    gateway_voice: Option<&str>,
    configured: &str,
) -> String {
    knowledge
        .and_then(KnowledgeBase::voice_id)
        .filter(|v| !v.is_empty())
        .or_else(|| gateway_voice.filter(|v| !v.is_empty()))
        .unwrap_or(configured)
        .to_string()
}

/// A single user's question-answering session
pub struct Assistant {
    resolver: QueryResolver,
    speech: SequencerHandle,
}

impl Assistant {
    #[must_use]
    pub const fn new(resolver: QueryResolver, speech: SequencerHandle) -> Self {
        Self { resolver, speech }
    }

    /// Answer a transcript and queue the answer for speaking
    ///
    /// Returns as soon as the answer is queued; speech happens in the
    /// background in arrival order.
    ///
    /// # Errors
    ///
    /// Returns error if the sequencer has stopped
    pub fn handle_transcript(&mut self, transcript: &str) -> Result<Resolution> {
        let query = correct_transcript(transcript);
        let resolution = self.resolver.resolve(&query);

        tracing::debug!(
            query = %query,
            source = ?resolution.source,
            "resolved transcript"
        );

        let context = (!query.trim().is_empty()).then_some(query);
        self.speech.speak(resolution.answer.clone(), context)?;

        Ok(resolution)
    }

    #[must_use]
    pub const fn resolver(&self) -> &QueryResolver {
        &self.resolver
    }

    /// Speech sequencer handle
    #[must_use]
    pub const fn speech(&self) -> &SequencerHandle {
        &self.speech
    }

    /// Stop taking transcripts and wait for queued speech to finish
    ///
    /// # Errors
    ///
    /// Returns error if the sequencer task failed
    pub async fn finish(self) -> Result<()> {
        self.speech.finish().await
    }
}
