//! Translation stage: translates a JSON `{text, to, from?}` request.

use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use relay_core::{CanonicalPayload, ReplyPayload, RequestContext};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{expect_text, Stage, StageOutcome};
use crate::error::DomainOperationError;
use crate::traits::TranslationApi;

#[derive(Debug, Deserialize)]
struct TranslationRequest {
    text: String,
    to: String,
    #[serde(default)]
    from: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TranslationReply {
    translated_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detected_source_language: Option<String>,
}

pub struct TranslateStage {
    api: Arc<dyn TranslationApi>,
}

impl TranslateStage {
    #[must_use]
    pub fn new(api: Arc<dyn TranslationApi>) -> Self {
        Self { api }
    }
}

fn parse_request(text: &str) -> Result<TranslationRequest, DomainOperationError> {
    let request: TranslationRequest = serde_json::from_str(text)
        .map_err(|e| DomainOperationError::Rejected(format!("invalid translation request: {e}")))?;
    if request.text.trim().is_empty() {
        return Err(DomainOperationError::Rejected("`text` is empty".to_string()));
    }
    if request.to.trim().is_empty() {
        return Err(DomainOperationError::Rejected("`to` is empty".to_string()));
    }
    Ok(request)
}

#[async_trait]
impl Stage for TranslateStage {
    fn name(&self) -> &'static str {
        "translate"
    }

    async fn invoke(
        &self,
        payload: CanonicalPayload,
        ctx: &RequestContext,
    ) -> Result<StageOutcome, DomainOperationError> {
        let request = parse_request(&expect_text(self.name(), payload)?)?;
        let source = request.from.as_deref().filter(|s| !s.is_empty());

        let translation = self
            .api
            .translate(&request.text, &request.to, source)
            .await
            .with_context(|| format!("translating into {}", request.to))?;
        info!(
            request_id = %ctx.request_id,
            target = %request.to,
            detected = ?translation.detected_source_language,
            "text translated"
        );

        let reply = ReplyPayload::from_serializable(&TranslationReply {
            translated_text: translation.translated_text,
            detected_source_language: translation.detected_source_language,
        })
        .context("encoding translation reply")?;
        Ok(StageOutcome::Reply(reply))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::traits::Translation;

    struct Upper;

    #[async_trait]
    impl TranslationApi for Upper {
        async fn translate(
            &self,
            text: &str,
            target: &str,
            source: Option<&str>,
        ) -> anyhow::Result<Translation> {
            Ok(Translation {
                translated_text: format!("{}:{target}", text.to_uppercase()),
                detected_source_language: source.is_none().then(|| "en".to_string()),
            })
        }
    }

    async fn run(body: &str) -> Result<StageOutcome, DomainOperationError> {
        TranslateStage::new(Arc::new(Upper))
            .invoke(CanonicalPayload::Text(body.to_string()), &RequestContext::new("r"))
            .await
    }

    #[tokio::test]
    async fn detected_language_is_reported() {
        let outcome = run(r#"{"text":"hello","to":"fr"}"#).await.unwrap();
        assert_eq!(
            outcome,
            StageOutcome::Reply(ReplyPayload::new(json!({
                "translatedText": "HELLO:fr",
                "detectedSourceLanguage": "en",
            })))
        );
    }

    #[tokio::test]
    async fn explicit_source_omits_detection() {
        let outcome = run(r#"{"text":"hola","to":"en","from":"es"}"#).await.unwrap();
        assert_eq!(
            outcome,
            StageOutcome::Reply(ReplyPayload::new(json!({"translatedText": "HOLA:en"})))
        );
    }

    #[tokio::test]
    async fn malformed_requests_are_rejected() {
        for body in ["not json", r#"{"to":"fr"}"#, r#"{"text":"","to":"fr"}"#, r#"{"text":"x","to":" "}"#] {
            let err = run(body).await.unwrap_err();
            assert!(matches!(err, DomainOperationError::Rejected(_)), "{body}");
        }
    }
}
