//! Classification results, the persisted inspection record, and the JSON
//! summary returned to the client.

use serde::{Deserialize, Serialize};

/// Prediction label for an image with a detected defect.
pub const PREDICTION_DEFECT: &str = "Defect Detected";
/// Prediction label for an image without defects.
pub const PREDICTION_CLEAN: &str = "Clean";
/// Sentinel defect type used when nothing was found.
pub const DEFECT_NONE: &str = "None";
/// Fallback for requests that did not name a device.
pub const UNKNOWN_DEVICE: &str = "Unknown Device";

/// True when a prediction label denotes a defect.
pub fn is_defect(prediction: &str) -> bool {
    prediction.contains("Defect")
}

/// Output of a classifier: `(prediction, defect_type, confidence)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub prediction: String,
    pub defect_type: String,
    pub confidence: f64,
}

impl Classification {
    pub fn defect(defect_type: impl Into<String>, confidence: f64) -> Self {
        Self {
            prediction: PREDICTION_DEFECT.to_string(),
            defect_type: defect_type.into(),
            confidence,
        }
    }

    pub fn clean(confidence: f64) -> Self {
        Self {
            prediction: PREDICTION_CLEAN.to_string(),
            defect_type: DEFECT_NONE.to_string(),
            confidence,
        }
    }

    pub fn is_defect(&self) -> bool {
        is_defect(&self.prediction)
    }

    /// Check the confidence range and the defect/defect_type pairing.
    ///
    /// Returns a human-readable reason when the triple is not usable.
    pub fn validate(&self) -> Result<(), String> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!(
                "confidence {} is outside [0, 1]",
                self.confidence
            ));
        }
        let names_defect = self.defect_type != DEFECT_NONE;
        if self.is_defect() != names_defect {
            return Err(format!(
                "prediction `{}` does not agree with defect_type `{}`",
                self.prediction, self.defect_type
            ));
        }
        Ok(())
    }
}

/// One row in the `inspections` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectionRecord {
    pub filename: String,
    pub image_url: String,
    pub prediction: String,
    pub defect_type: String,
    pub confidence: f64,
    pub user_id: String,
    pub device_name: String,
}

impl InspectionRecord {
    pub fn new(
        filename: impl Into<String>,
        image_url: impl Into<String>,
        classification: Classification,
        user_id: impl Into<String>,
        device_name: impl Into<String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            image_url: image_url.into(),
            prediction: classification.prediction,
            defect_type: classification.defect_type,
            confidence: classification.confidence,
            user_id: user_id.into(),
            device_name: device_name.into(),
        }
    }
}

/// Body of a successful `POST /api/analyze`.
///
/// `status`/`type` duplicate `prediction`/`defect_type` so clients written
/// against either historical shape keep working.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub status: String,
    pub prediction: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub defect_type: String,
    pub confidence: String,
    pub confidence_score: f64,
    pub image_url: String,
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub warning: Option<String>,
}

impl AnalyzeResponse {
    pub fn from_record(record: &InspectionRecord, warning: Option<String>) -> Self {
        Self {
            status: record.prediction.clone(),
            prediction: record.prediction.clone(),
            kind: record.defect_type.clone(),
            defect_type: record.defect_type.clone(),
            confidence: format_confidence(record.confidence),
            confidence_score: record.confidence,
            image_url: record.image_url.clone(),
            color: display_color(&record.prediction).to_string(),
            warning,
        }
    }
}

/// `"red"` for defects, `"green"` otherwise.
pub fn display_color(prediction: &str) -> &'static str {
    if is_defect(prediction) { "red" } else { "green" }
}

/// Render a `[0, 1]` confidence as a percentage, e.g. `0.95` -> `"95%"`.
///
/// Rounded to two decimals; trailing zeros are dropped.
pub fn format_confidence(confidence: f64) -> String {
    let percent = (confidence * 100.0 * 100.0).round() / 100.0;
    format!("{}%", percent)
}
