//! Optional LLM narration for reports, via an OpenAI-compatible
//! chat-completions endpoint. Absent credentials degrade to a typed
//! error, never a crash.

use serde_json::{json, Value};

use crate::{errors::ApiError, state::NarrativeConfig};

pub struct NarrativeClient {
    client: reqwest::Client,
    config: NarrativeConfig,
}

impl NarrativeClient {
    pub fn new(config: NarrativeConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Asks the model for a short management narrative over the report
    /// aggregates serialized in `context`.
    pub async fn narrate(&self, context: &str) -> Result<String, ApiError> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            return Err(ApiError::NarrativeUnavailable);
        };

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let prompt = format!(
            "Você é o gerente de uma barbearia. Com base nos números abaixo, \
             escreva um resumo curto (até 5 frases) em português destacando \
             receita, despesas e desempenho dos agendamentos.\n\n{context}"
        );

        let request_body = json!({
            "model": self.config.model,
            "messages": [
                { "role": "user", "content": prompt }
            ],
            "temperature": 0.3,
            "max_tokens": 400
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            log::error!("Narrative API error: HTTP {status}: {body}");
            return Err(ApiError::Internal(format!("narrative API returned {status}")));
        }

        let payload: Value = response.json().await?;
        let content = payload
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|msg| msg.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| ApiError::Internal("invalid narrative response format".into()))?;

        Ok(content.trim().to_string())
    }
}
