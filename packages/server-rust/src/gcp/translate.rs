//! Cloud Translation [`TranslationApi`] over the v2 REST API.

use anyhow::{anyhow, Context as _};
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};

use super::{ensure_success, GcpClient};
use crate::traits::{Translation, TranslationApi};

/// Production endpoint.
pub const TRANSLATE_URL: &str = "https://translation.googleapis.com";

const TRANSLATE_PATH: &str = "/language/translate/v2";

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    target: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'a str>,
    format: &'static str,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    data: TranslateData,
}

#[derive(Debug, Deserialize)]
struct TranslateData {
    #[serde(default)]
    translations: Vec<WireTranslation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTranslation {
    translated_text: String,
    detected_source_language: Option<String>,
}

pub struct TranslateClient {
    client: GcpClient,
}

impl TranslateClient {
    #[must_use]
    pub fn new(client: GcpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TranslationApi for TranslateClient {
    async fn translate(
        &self,
        text: &str,
        target: &str,
        source: Option<&str>,
    ) -> anyhow::Result<Translation> {
        let body = TranslateRequest {
            q: text,
            target,
            source,
            format: "text",
        };
        let response = self
            .client
            .request(Method::POST, TRANSLATE_PATH)
            .await?
            .json(&body)
            .send()
            .await
            .context("calling translate")?;
        let parsed: TranslateResponse = ensure_success(response, "translation")
            .await?
            .json()
            .await
            .context("parsing translation response")?;
        let first = parsed
            .data
            .translations
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("translation response was empty"))?;
        Ok(Translation {
            translated_text: first.translated_text,
            detected_source_language: first.detected_source_language,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_is_omitted_for_detection() {
        let body = TranslateRequest {
            q: "hi",
            target: "fr",
            source: None,
            format: "text",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("source").is_none());
        assert_eq!(json["target"], "fr");
    }

    #[test]
    fn response_parses_detected_language() {
        let raw = r#"{"data":{"translations":[{"translatedText":"Bonjour","detectedSourceLanguage":"en"}]}}"#;
        let parsed: TranslateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.data.translations[0].translated_text, "Bonjour");
        assert_eq!(
            parsed.data.translations[0].detected_source_language.as_deref(),
            Some("en")
        );
    }
}
