//! Image classification client.
//!
//! Predictions come from a Clarifai model run against a publicly reachable
//! image URL. Concepts are returned in the ranked order Clarifai reports.

use crate::config::ClassifierConfig;
use crate::error::{NarratorError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument};

/// Clarifai status code for a successful request
const STATUS_SUCCESS: u32 = 10000;

/// A ranked label for an image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    /// Concept identifier, used verbatim as the spoken label
    pub id: String,
    /// Human-readable concept name
    #[serde(default)]
    pub name: String,
    /// Confidence score (0.0 - 1.0)
    #[serde(default)]
    pub value: f32,
}

/// Classifies images by public address
#[async_trait]
pub trait ImageClassifier: Send + Sync {
    /// Ranked concepts for the image at `image_url`, best first
    async fn classify_url(&self, image_url: &str) -> Result<Vec<Concept>>;
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    status: ApiStatus,
    #[serde(default)]
    outputs: Vec<PredictOutput>,
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    code: u32,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct PredictOutput {
    #[serde(default)]
    data: OutputData,
}

#[derive(Debug, Default, Deserialize)]
struct OutputData {
    #[serde(default)]
    concepts: Vec<Concept>,
}

/// Clarifai REST client
pub struct ClarifaiClassifier {
    client: Client,
    config: ClassifierConfig,
}

impl ClarifaiClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(NarratorError::Config(
                "classifier.api_key must be set (NARRATOR__CLASSIFIER__API_KEY or CLARIFAI_API_KEY)"
                    .to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| NarratorError::Config(format!("failed to build HTTP client: {}", e)))?;

        info!(model_id = %config.model_id, "Clarifai classifier initialized");

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn predict_url(&self) -> String {
        format!(
            "{}/v2/models/{}/outputs",
            self.config.base_url.trim_end_matches('/'),
            self.config.model_id
        )
    }
}

#[async_trait]
impl ImageClassifier for ClarifaiClassifier {
    #[instrument(skip(self))]
    async fn classify_url(&self, image_url: &str) -> Result<Vec<Concept>> {
        let body = json!({
            "inputs": [
                { "data": { "image": { "url": image_url } } }
            ]
        });

        let response = self
            .client
            .post(self.predict_url())
            .header("Authorization", format!("Key {}", self.config.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| NarratorError::Classification(format!("request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| NarratorError::Classification(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            let description = serde_json::from_str::<PredictResponse>(&text)
                .map(|r| r.status.description)
                .unwrap_or(text);
            return Err(NarratorError::Classification(format!(
                "HTTP {}: {}",
                status, description
            )));
        }

        let concepts = parse_predict_response(&text)?;

        debug!(
            concept_count = concepts.len(),
            top = concepts.first().map(|c| c.id.as_str()).unwrap_or(""),
            "Image classified"
        );

        Ok(concepts)
    }
}

/// Extract the ranked concepts of the first output
fn parse_predict_response(body: &str) -> Result<Vec<Concept>> {
    let response: PredictResponse = serde_json::from_str(body)
        .map_err(|e| NarratorError::Classification(format!("malformed response: {}", e)))?;

    if response.status.code != STATUS_SUCCESS {
        return Err(NarratorError::Classification(format!(
            "status {}: {}",
            response.status.code, response.status.description
        )));
    }

    Ok(response
        .outputs
        .into_iter()
        .next()
        .map(|output| output.data.concepts)
        .unwrap_or_default())
}
