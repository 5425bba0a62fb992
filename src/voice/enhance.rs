//! First-person rephrasing of answers via `OpenAI` chat completions

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// `OpenAI` API root
pub const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// Model used when none is configured
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o";

const MAX_TOKENS: u32 = 500;
const TEMPERATURE: f32 = 0.7;

/// Rewrites answers in the document author's voice
pub struct Enhancer {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    persona: String,
    base_url: String,
}

impl Enhancer {
    /// Create an enhancer speaking as `persona`
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: SecretString, model: String, persona: String) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for enhancement".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            persona,
            base_url: OPENAI_API_URL.to_string(),
        })
    }

    /// Point the client at a different API root
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Rephrase `text` in first person, returning it unchanged on any failure
    pub async fn enhance(&self, text: &str, context: Option<&str>) -> String {
        match self.try_enhance(text, context).await {
            Ok(enhanced) => {
                tracing::debug!(chars = enhanced.len(), "enhanced answer to first person");
                enhanced
            }
            Err(e) => {
                tracing::warn!(error = %e, "enhancement failed, using original text");
                text.to_string()
            }
        }
    }

    async fn try_enhance(&self, text: &str, context: Option<&str>) -> Result<String> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: self.system_prompt(),
                },
                Message {
                    role: "user",
                    content: self.user_prompt(text, context),
                },
            ],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Enhancement(format!("OpenAI request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Enhancement(format!(
                "OpenAI API error: {status} - {body}"
            )));
        }

        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Enhancement(format!("failed to parse OpenAI response: {e}")))?;

        result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::Enhancement("OpenAI returned no content".to_string()))
    }

    fn system_prompt(&self) -> String {
        format!(
            "You are {persona}. You respond to questions in first person, as if you are \
             {persona}. Your tone is confident and thoughtful. Only use information from \
             the document and don't invent new details.",
            persona = self.persona
        )
    }

    fn user_prompt(&self, text: &str, context: Option<&str>) -> String {
        let mut prompt = format!(
            "Respond to the question as {persona}, in first person.\n\n\
             Guidelines:\n\
             1. Express opinions and thoughts as your own\n\
             2. Stick to the content of the original response and do not invent details\n\
             3. Keep the facts, only change the perspective\n\n\
             Original response: \"{text}\"\n",
            persona = self.persona
        );

        if let Some(context) = context.filter(|c| !c.trim().is_empty()) {
            prompt.push_str(&format!("\nUser's question: {context}\n"));
        }

        prompt.push_str("\nFirst-person response:");
        prompt
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}
