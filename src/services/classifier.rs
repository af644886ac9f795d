//! Image classification strategies.
//!
//! The pipeline only ever sees a [`Classification`]; which strategy produced
//! it is a deployment choice:
//! - [`MockClassifier`] flips a weighted coin and stands in for a real model.
//! - [`RemoteClassifier`] forwards the image to an inference service's
//!   `POST /predict` endpoint.

use crate::models::inspection::Classification;
use async_trait::async_trait;
use bytes::Bytes;
use rand::Rng;
use reqwest::{Client, multipart};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Random draws above this are classified as defects.
pub const MOCK_DEFECT_THRESHOLD: f64 = 0.5;
/// Confidence reported by the mock classifier.
pub const MOCK_CONFIDENCE: f64 = 0.95;
/// Defect type reported by the mock classifier.
pub const MOCK_DEFECT_TYPE: &str = "Screen Crack";

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("inference request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("inference service returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("malformed inference response: {0}")]
    Malformed(String),
    #[error("inference call timed out after {0:?}")]
    Timeout(Duration),
}

/// The image handed to a classifier.
#[derive(Debug, Clone)]
pub struct ImageInput {
    pub bytes: Bytes,
    pub filename: String,
    pub content_type: String,
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, image: &ImageInput) -> Result<Classification, InferenceError>;

    /// Strategy name for logs.
    fn name(&self) -> &'static str;
}

/// Source of uniform draws in `[0, 1)`.
pub trait RandomSource: Send + Sync {
    fn next_unit(&self) -> f64;
}

/// Draws from the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_unit(&self) -> f64 {
        rand::thread_rng().r#gen::<f64>()
    }
}

/// Always returns the same value.
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom(pub f64);

impl RandomSource for FixedRandom {
    fn next_unit(&self) -> f64 {
        self.0
    }
}

/// Placeholder classifier driven by a random draw.
pub struct MockClassifier {
    random: Box<dyn RandomSource>,
}

impl MockClassifier {
    pub fn new(random: impl RandomSource + 'static) -> Self {
        Self {
            random: Box::new(random),
        }
    }

    fn decide(draw: f64) -> Classification {
        if draw > MOCK_DEFECT_THRESHOLD {
            Classification::defect(MOCK_DEFECT_TYPE, MOCK_CONFIDENCE)
        } else {
            Classification::clean(MOCK_CONFIDENCE)
        }
    }
}

impl Default for MockClassifier {
    fn default() -> Self {
        Self::new(ThreadRandom)
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    async fn classify(&self, _image: &ImageInput) -> Result<Classification, InferenceError> {
        Ok(Self::decide(self.random.next_unit()))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    prediction: String,
    defect_type: String,
    confidence: f64,
}

/// Delegates classification to a remote inference service.
#[derive(Clone, Debug)]
pub struct RemoteClassifier {
    client: Client,
    predict_url: String,
}

impl RemoteClassifier {
    /// `base_url` is the service origin; requests go to `{base_url}/predict`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, InferenceError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            predict_url: format!("{}/predict", base_url.trim_end_matches('/')),
        }
    }

    pub fn predict_url(&self) -> &str {
        &self.predict_url
    }
}

#[async_trait]
impl Classifier for RemoteClassifier {
    async fn classify(&self, image: &ImageInput) -> Result<Classification, InferenceError> {
        let build = || {
            multipart::Part::bytes(image.bytes.to_vec()).file_name(image.filename.clone())
        };
        // an unparseable MIME type is dropped rather than failing the call
        let part = build()
            .mime_str(&image.content_type)
            .unwrap_or_else(|_| build());
        let form = multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&self.predict_url)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(InferenceError::Status {
                status: status.as_u16(),
                message: text,
            });
        }

        let body: PredictResponse =
            serde_json::from_str(&text).map_err(|err| InferenceError::Malformed(err.to_string()))?;
        let classification = Classification {
            prediction: body.prediction,
            defect_type: body.defect_type,
            confidence: body.confidence,
        };
        classification.validate().map_err(InferenceError::Malformed)?;
        Ok(classification)
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::inspection::{DEFECT_NONE, PREDICTION_CLEAN, PREDICTION_DEFECT};

    fn image() -> ImageInput {
        ImageInput {
            bytes: Bytes::from_static(b"0123456789"),
            filename: "photo.png".into(),
            content_type: "image/png".into(),
        }
    }

    #[tokio::test]
    async fn high_draw_is_a_defect() {
        let result = MockClassifier::new(FixedRandom(0.9))
            .classify(&image())
            .await
            .unwrap();
        assert_eq!(result.prediction, PREDICTION_DEFECT);
        assert_eq!(result.defect_type, MOCK_DEFECT_TYPE);
        assert_eq!(result.confidence, MOCK_CONFIDENCE);
    }

    #[tokio::test]
    async fn low_draw_is_clean() {
        let result = MockClassifier::new(FixedRandom(0.1))
            .classify(&image())
            .await
            .unwrap();
        assert_eq!(result.prediction, PREDICTION_CLEAN);
        assert_eq!(result.defect_type, DEFECT_NONE);
    }

    #[tokio::test]
    async fn threshold_itself_is_clean() {
        let result = MockClassifier::new(FixedRandom(MOCK_DEFECT_THRESHOLD))
            .classify(&image())
            .await
            .unwrap();
        assert!(!result.is_defect());
    }

    #[tokio::test]
    async fn thread_random_results_always_validate() {
        let classifier = MockClassifier::default();
        for _ in 0..64 {
            let result = classifier.classify(&image()).await.unwrap();
            assert!(result.validate().is_ok());
        }
    }

    #[test]
    fn predict_url_is_joined_once() {
        let classifier = RemoteClassifier::with_client(Client::new(), "http://127.0.0.1:5001/");
        assert_eq!(classifier.predict_url(), "http://127.0.0.1:5001/predict");
    }
}
