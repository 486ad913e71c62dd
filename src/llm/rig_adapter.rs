//! Bridge from rig-core's `CompletionModel` to our `LlmProvider` trait.

use async_trait::async_trait;
use rig::completion::{AssistantContent, CompletionModel, Message};

use crate::error::ClassifierError;
use crate::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider};

/// Adapts any rig `CompletionModel` to the engine's provider trait.
pub struct RigAdapter<M: CompletionModel> {
    model: M,
    model_name: String,
}

impl<M: CompletionModel> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }
}

#[async_trait]
impl<M: CompletionModel> LlmProvider for RigAdapter<M> {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ClassifierError> {
        let mut builder = self
            .model
            .completion_request(Message::user(request.user_prompt()));

        if let Some(system) = request.system_prompt() {
            builder = builder.preamble(system);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(temperature);
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(max_tokens);
        }

        let response = self.model.completion(builder.build()).await.map_err(|e| {
            ClassifierError::RequestFailed {
                provider: self.model_name.clone(),
                reason: e.to_string(),
            }
        })?;

        let content = response
            .choice
            .into_iter()
            .filter_map(|part| match part {
                AssistantContent::Text(text) => Some(text.text),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        if content.is_empty() {
            return Err(ClassifierError::InvalidResponse {
                provider: self.model_name.clone(),
                reason: "empty completion".into(),
            });
        }

        Ok(CompletionResponse { content })
    }
}
