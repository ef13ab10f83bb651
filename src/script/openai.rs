//! Script writer backed by a search-enabled OpenAI chat model.

use super::{GeneratedScript, ScriptSource};
use crate::config::{Prompts, ScriptSettings};
use crate::error::{ReelcastError, Result};
use crate::openai::create_client;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, instrument};

/// Researches a query on the web and writes a narration script.
pub struct OpenAIScriptWriter {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    target_words: u32,
    prompts: Prompts,
}

impl OpenAIScriptWriter {
    pub fn with_config(settings: &ScriptSettings, prompts: Prompts) -> Result<Self> {
        Ok(Self {
            client: create_client(Duration::from_secs(settings.timeout_secs))?,
            model: settings.model.clone(),
            target_words: settings.target_words,
            prompts,
        })
    }
}

#[async_trait]
impl ScriptSource for OpenAIScriptWriter {
    #[instrument(skip(self), fields(query = %query))]
    async fn generate(&self, query: &str) -> Result<GeneratedScript> {
        let mut vars = HashMap::new();
        vars.insert("query".to_string(), query.to_string());
        vars.insert("target_words".to_string(), self.target_words.to_string());

        let system = self.prompts.render_with_custom(&self.prompts.script.system, &vars);
        let user = self.prompts.render_with_custom(&self.prompts.script.user, &vars);

        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system)
                .build()
                .map_err(|e| ReelcastError::Script(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user)
                .build()
                .map_err(|e| ReelcastError::Script(e.to_string()))?
                .into(),
        ];

        // Search models reject sampling parameters such as temperature.
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .build()
            .map_err(|e| ReelcastError::Script(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| ReelcastError::OpenAI(format!("Script generation failed: {}", e)))?;

        let text = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ReelcastError::Script("Empty response from LLM".to_string()))?;

        let script = GeneratedScript::from_text(query, text);
        info!(
            "Script generated - chars: {}, sections: ~{}, sources: {}",
            script.text.len(),
            script.text.matches("###").count(),
            script.sources.len()
        );
        Ok(script)
    }
}
