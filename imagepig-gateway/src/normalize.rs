//! Request shaping for the seven ImagePig operations.
//!
//! Each operation validates its required fields, trims strings, substitutes
//! defaults, and omits fields that are still absent afterwards. Nothing here
//! touches the network.

use rand::Rng;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{GatewayError, Result};

const DEFAULT_LANGUAGE: &str = "en";
const DEFAULT_FORMAT: &str = "JPEG";
const DEFAULT_PROPORTION: &str = "landscape";
const DEFAULT_UPSCALING_FACTOR: i64 = 2;
/// Exclusive upper bound of a defaulted seed.
const SEED_RANGE: i64 = 1_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    GenerateDefault,
    GenerateXl,
    GenerateFlux,
    FaceSwap,
    Cutout,
    Upscale,
    Outpaint,
}

impl Operation {
    pub const ALL: [Operation; 7] = [
        Operation::GenerateDefault,
        Operation::GenerateXl,
        Operation::GenerateFlux,
        Operation::FaceSwap,
        Operation::Cutout,
        Operation::Upscale,
        Operation::Outpaint,
    ];

    /// Route segment under `/api/images`.
    pub fn route(self) -> &'static str {
        match self {
            Operation::GenerateDefault => "generate-default",
            Operation::GenerateXl => "generate-xl",
            Operation::GenerateFlux => "generate-flux",
            Operation::FaceSwap => "faceswap",
            Operation::Cutout => "cutout",
            Operation::Upscale => "upscale",
            Operation::Outpaint => "outpaint",
        }
    }

    /// Provider path for this operation.
    pub fn provider_path(self) -> &'static str {
        match self {
            Operation::GenerateDefault => "/",
            Operation::GenerateXl => "/xl",
            Operation::GenerateFlux => "/flux",
            Operation::FaceSwap => "/faceswap",
            Operation::Cutout => "/cutout",
            Operation::Upscale => "/upscale",
            Operation::Outpaint => "/outpaint",
        }
    }

    /// Actionable text returned next to a provider failure.
    pub fn failure_hint(self) -> &'static str {
        match self {
            Operation::GenerateDefault => {
                "Failed to generate image. Please try a different prompt."
            }
            Operation::GenerateXl => "Failed to generate XL image. Please try a different prompt.",
            Operation::GenerateFlux => {
                "Failed to generate FLUX image. Please try a different prompt."
            }
            Operation::FaceSwap => {
                "Failed to perform face swap. Please check your images and try again."
            }
            Operation::Cutout => {
                "Failed to remove background. Please check your image and try again."
            }
            Operation::Upscale => "Failed to upscale image. Please check your image and try again.",
            Operation::Outpaint => {
                "Failed to outpaint image. Please check your image and prompt, then try again."
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound field access
// ---------------------------------------------------------------------------

/// Read-only view over an inbound JSON object.
struct Fields<'a>(&'a Map<String, Value>);

impl Fields<'_> {
    /// Trimmed string value; blank and non-string values count as absent.
    fn text(&self, key: &str) -> Option<String> {
        let trimmed = self.0.get(key)?.as_str()?.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    fn text_or(&self, key: &str, default: &str) -> String {
        self.text(key).unwrap_or_else(|| default.to_string())
    }

    /// Integer from a JSON number or a numeric string. Fractions truncate;
    /// anything unparseable counts as absent.
    fn integer(&self, key: &str) -> Option<i64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>().ok().or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite())
                        .map(|f| f.trunc() as i64)
                })
            }
            _ => None,
        }
    }

    fn integer_or(&self, key: &str, default: i64) -> i64 {
        self.integer(key).unwrap_or(default)
    }

    fn seed(&self) -> i64 {
        self.integer("seed").unwrap_or_else(random_seed)
    }

    /// Require `key`, failing with the given caller-facing text.
    fn require_text(&self, key: &str, missing: (&str, &str)) -> Result<String> {
        self.text(key)
            .ok_or_else(|| GatewayError::invalid_request(missing.0, missing.1))
    }

    /// Read an either-of pair, failing when both sides are absent.
    fn require_either(
        &self,
        data_key: &str,
        url_key: &str,
        missing: (&str, &str),
    ) -> Result<(Option<String>, Option<String>)> {
        let data = self.text(data_key);
        let url = self.text(url_key);
        if data.is_none() && url.is_none() {
            return Err(GatewayError::invalid_request(missing.0, missing.1));
        }
        Ok((data, url))
    }
}

fn random_seed() -> i64 {
    rand::thread_rng().gen_range(0..SEED_RANGE)
}

const MISSING_PROMPT: (&str, &str) = (
    "Prompt is required",
    "Please provide a description of what you want to generate.",
);
const MISSING_SOURCE: (&str, &str) = (
    "Source image is required",
    "Please provide either source_image_data or source_image_url.",
);
const MISSING_TARGET: (&str, &str) = (
    "Target image is required",
    "Please provide either target_image_data or target_image_url.",
);
const MISSING_IMAGE: (&str, &str) = (
    "Image is required",
    "Please provide either image_data or image_url.",
);

// ---------------------------------------------------------------------------
// Shaped payloads
// ---------------------------------------------------------------------------

/// Body for `/` and `/xl`.
#[derive(Debug, Serialize)]
pub struct GeneratePayload {
    pub prompt: String,
    pub negative_prompt: String,
    pub language: String,
    pub format: String,
    pub seed: i64,
    pub storage_days: i64,
}

#[derive(Debug, Serialize)]
pub struct FluxPayload {
    pub prompt: String,
    pub proportion: String,
    pub language: String,
    pub format: String,
    pub seed: i64,
    pub storage_days: i64,
}

#[derive(Debug, Serialize)]
pub struct FaceSwapPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_image_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_image_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_image_url: Option<String>,
    pub format: String,
    pub storage_days: i64,
}

#[derive(Debug, Serialize)]
pub struct CutoutPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub seed: i64,
    pub storage_days: i64,
}

#[derive(Debug, Serialize)]
pub struct UpscalePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub upscaling_factor: i64,
    pub format: String,
    pub seed: i64,
    pub storage_days: i64,
}

#[derive(Debug, Serialize)]
pub struct OutpaintPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub prompt: String,
    pub negative_prompt: String,
    pub language: String,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
    pub left: i64,
    pub format: String,
    pub seed: i64,
    pub storage_days: i64,
}

fn shape_generate(fields: &Fields<'_>) -> Result<GeneratePayload> {
    Ok(GeneratePayload {
        prompt: fields.require_text("prompt", MISSING_PROMPT)?,
        negative_prompt: fields.text_or("negative_prompt", ""),
        language: fields.text_or("language", DEFAULT_LANGUAGE),
        format: fields.text_or("format", DEFAULT_FORMAT),
        seed: fields.seed(),
        storage_days: fields.integer_or("storage_days", 0),
    })
}

fn shape_flux(fields: &Fields<'_>) -> Result<FluxPayload> {
    Ok(FluxPayload {
        prompt: fields.require_text("prompt", MISSING_PROMPT)?,
        proportion: fields.text_or("proportion", DEFAULT_PROPORTION),
        language: fields.text_or("language", DEFAULT_LANGUAGE),
        format: fields.text_or("format", DEFAULT_FORMAT),
        seed: fields.seed(),
        storage_days: fields.integer_or("storage_days", 0),
    })
}

fn shape_face_swap(fields: &Fields<'_>) -> Result<FaceSwapPayload> {
    let (source_image_data, source_image_url) =
        fields.require_either("source_image_data", "source_image_url", MISSING_SOURCE)?;
    let (target_image_data, target_image_url) =
        fields.require_either("target_image_data", "target_image_url", MISSING_TARGET)?;
    Ok(FaceSwapPayload {
        source_image_data,
        source_image_url,
        target_image_data,
        target_image_url,
        format: fields.text_or("format", DEFAULT_FORMAT),
        storage_days: fields.integer_or("storage_days", 0),
    })
}

fn shape_cutout(fields: &Fields<'_>) -> Result<CutoutPayload> {
    let (image_data, image_url) = fields.require_either("image_data", "image_url", MISSING_IMAGE)?;
    Ok(CutoutPayload {
        image_data,
        image_url,
        seed: fields.seed(),
        storage_days: fields.integer_or("storage_days", 0),
    })
}

fn shape_upscale(fields: &Fields<'_>) -> Result<UpscalePayload> {
    let (image_data, image_url) = fields.require_either("image_data", "image_url", MISSING_IMAGE)?;
    Ok(UpscalePayload {
        image_data,
        image_url,
        upscaling_factor: fields.integer_or("upscaling_factor", DEFAULT_UPSCALING_FACTOR),
        format: fields.text_or("format", DEFAULT_FORMAT),
        seed: fields.seed(),
        storage_days: fields.integer_or("storage_days", 0),
    })
}

fn shape_outpaint(fields: &Fields<'_>) -> Result<OutpaintPayload> {
    let (image_data, image_url) = fields.require_either("image_data", "image_url", MISSING_IMAGE)?;
    Ok(OutpaintPayload {
        image_data,
        image_url,
        prompt: fields.text_or("prompt", ""),
        negative_prompt: fields.text_or("negative_prompt", ""),
        language: fields.text_or("language", DEFAULT_LANGUAGE),
        top: fields.integer_or("top", 0),
        right: fields.integer_or("right", 0),
        bottom: fields.integer_or("bottom", 0),
        left: fields.integer_or("left", 0),
        format: fields.text_or("format", DEFAULT_FORMAT),
        seed: fields.seed(),
        storage_days: fields.integer_or("storage_days", 0),
    })
}

fn to_payload<T: Serialize>(payload: T) -> Result<Value> {
    serde_json::to_value(payload)
        .map_err(|err| GatewayError::Internal(format!("Failed to encode payload: {err}")))
}

/// Validate `request` for `operation` and build the body sent to the provider.
pub fn normalize(operation: Operation, request: &Map<String, Value>) -> Result<Value> {
    let fields = Fields(request);
    match operation {
        Operation::GenerateDefault | Operation::GenerateXl => to_payload(shape_generate(&fields)?),
        Operation::GenerateFlux => to_payload(shape_flux(&fields)?),
        Operation::FaceSwap => to_payload(shape_face_swap(&fields)?),
        Operation::Cutout => to_payload(shape_cutout(&fields)?),
        Operation::Upscale => to_payload(shape_upscale(&fields)?),
        Operation::Outpaint => to_payload(shape_outpaint(&fields)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn shaped(operation: Operation, value: Value) -> Value {
        normalize(operation, &body(value)).unwrap()
    }

    fn rejected(operation: Operation, value: Value) -> (String, String) {
        match normalize(operation, &body(value)) {
            Err(GatewayError::InvalidRequest { error, message }) => (error, message),
            other => panic!("expected invalid request for {operation:?}, got {other:?}"),
        }
    }

    /// Smallest body that satisfies each operation's required fields.
    fn minimal(operation: Operation) -> Value {
        match operation {
            Operation::GenerateDefault | Operation::GenerateXl | Operation::GenerateFlux => {
                json!({ "prompt": "a red fox" })
            }
            Operation::FaceSwap => json!({
                "source_image_data": "c291cmNl",
                "target_image_url": "https://example.com/target.jpg"
            }),
            Operation::Cutout | Operation::Upscale | Operation::Outpaint => {
                json!({ "image_url": "https://example.com/in.jpg" })
            }
        }
    }

    #[test]
    fn every_operation_rejects_an_empty_body() {
        for operation in Operation::ALL {
            let (error, message) = rejected(operation, json!({}));
            assert!(!error.is_empty());
            assert!(!message.is_empty());
        }
    }

    #[test]
    fn blank_prompt_is_rejected() {
        for operation in [
            Operation::GenerateDefault,
            Operation::GenerateXl,
            Operation::GenerateFlux,
        ] {
            let (error, _) = rejected(operation, json!({ "prompt": "   \n" }));
            assert_eq!(error, "Prompt is required");
        }
    }

    #[test]
    fn blank_image_fields_are_rejected() {
        let (error, message) =
            rejected(Operation::Cutout, json!({ "image_data": " ", "image_url": "" }));
        assert_eq!(error, "Image is required");
        assert_eq!(message, "Please provide either image_data or image_url.");
    }

    #[test]
    fn face_swap_reports_the_missing_side() {
        let (error, _) = rejected(
            Operation::FaceSwap,
            json!({ "target_image_url": "https://example.com/t.jpg" }),
        );
        assert_eq!(error, "Source image is required");

        let (error, message) =
            rejected(Operation::FaceSwap, json!({ "source_image_data": "abc" }));
        assert_eq!(error, "Target image is required");
        assert!(message.contains("target_image_url"));
    }

    #[test]
    fn generate_defaults() {
        let payload = shaped(Operation::GenerateDefault, json!({ "prompt": "  a red fox  " }));
        assert_eq!(payload["prompt"], "a red fox");
        assert_eq!(payload["negative_prompt"], "");
        assert_eq!(payload["language"], "en");
        assert_eq!(payload["format"], "JPEG");
        assert_eq!(payload["storage_days"], 0);
        let seed = payload["seed"].as_i64().unwrap();
        assert!((0..1_000_000).contains(&seed));
    }

    #[test]
    fn generate_overrides() {
        let payload = shaped(
            Operation::GenerateXl,
            json!({
                "prompt": "castle",
                "negative_prompt": " blurry ",
                "language": "de",
                "format": "PNG",
                "seed": "42",
                "storage_days": 3
            }),
        );
        assert_eq!(payload["negative_prompt"], "blurry");
        assert_eq!(payload["language"], "de");
        assert_eq!(payload["format"], "PNG");
        assert_eq!(payload["seed"], 42);
        assert_eq!(payload["storage_days"], 3);
    }

    #[test]
    fn flux_defaults_proportion_and_has_no_negative_prompt() {
        let payload = shaped(Operation::GenerateFlux, json!({ "prompt": "city" }));
        assert_eq!(payload["proportion"], "landscape");
        assert!(payload.get("negative_prompt").is_none());

        let payload = shaped(
            Operation::GenerateFlux,
            json!({ "prompt": "city", "proportion": "portrait" }),
        );
        assert_eq!(payload["proportion"], "portrait");
    }

    #[test]
    fn face_swap_omits_absent_image_fields() {
        let payload = shaped(Operation::FaceSwap, minimal(Operation::FaceSwap));
        let object = payload.as_object().unwrap();
        assert_eq!(object["source_image_data"], "c291cmNl");
        assert_eq!(object["target_image_url"], "https://example.com/target.jpg");
        assert!(!object.contains_key("source_image_url"));
        assert!(!object.contains_key("target_image_data"));
        assert_eq!(object["format"], "JPEG");
        assert_eq!(object["storage_days"], 0);
        assert!(!object.contains_key("seed"));
    }

    #[test]
    fn cutout_defaults() {
        let payload = shaped(Operation::Cutout, json!({ "image_data": " aGVsbG8= " }));
        let object = payload.as_object().unwrap();
        assert_eq!(object["image_data"], "aGVsbG8=");
        assert!(!object.contains_key("image_url"));
        assert!(!object.contains_key("format"));
        assert!(object["seed"].is_i64());
        assert_eq!(object["storage_days"], 0);
    }

    #[test]
    fn upscale_defaults_and_overrides() {
        let payload = shaped(Operation::Upscale, minimal(Operation::Upscale));
        assert_eq!(payload["upscaling_factor"], 2);
        assert_eq!(payload["format"], "JPEG");

        let payload = shaped(
            Operation::Upscale,
            json!({ "image_url": "https://example.com/in.jpg", "upscaling_factor": 4 }),
        );
        assert_eq!(payload["upscaling_factor"], 4);
    }

    #[test]
    fn outpaint_defaults_every_edge() {
        let payload = shaped(Operation::Outpaint, minimal(Operation::Outpaint));
        for edge in ["top", "right", "bottom", "left"] {
            assert_eq!(payload[edge], 0, "edge {edge}");
        }
        assert_eq!(payload["prompt"], "");
        assert_eq!(payload["negative_prompt"], "");
        assert_eq!(payload["language"], "en");
        assert!(payload.get("image_data").is_none());

        let payload = shaped(
            Operation::Outpaint,
            json!({
                "image_url": "https://example.com/in.jpg",
                "prompt": " sky ",
                "top": 128,
                "left": "64"
            }),
        );
        assert_eq!(payload["prompt"], "sky");
        assert_eq!(payload["top"], 128);
        assert_eq!(payload["left"], 64);
        assert_eq!(payload["right"], 0);
    }

    #[test]
    fn unparseable_numbers_fall_back_to_defaults() {
        let payload = shaped(
            Operation::Upscale,
            json!({
                "image_url": "https://example.com/in.jpg",
                "upscaling_factor": "lots",
                "storage_days": null,
                "seed": "abc"
            }),
        );
        assert_eq!(payload["upscaling_factor"], 2);
        assert_eq!(payload["storage_days"], 0);
        let seed = payload["seed"].as_i64().unwrap();
        assert!((0..1_000_000).contains(&seed));
    }

    #[test]
    fn fractional_numbers_truncate() {
        let payload = shaped(
            Operation::GenerateDefault,
            json!({ "prompt": "x", "seed": 12.9, "storage_days": "7.5" }),
        );
        assert_eq!(payload["seed"], 12);
        assert_eq!(payload["storage_days"], 7);
    }

    #[test]
    fn explicit_zero_seed_is_kept() {
        let payload = shaped(Operation::Cutout, json!({ "image_url": "u", "seed": 0 }));
        assert_eq!(payload["seed"], 0);
    }

    #[test]
    fn no_payload_contains_nulls() {
        for operation in Operation::ALL {
            let payload = shaped(operation, minimal(operation));
            for (key, value) in payload.as_object().unwrap() {
                assert!(!value.is_null(), "{operation:?} serialized {key} as null");
            }
        }
    }

    #[test]
    fn provider_paths_are_distinct() {
        let mut paths: Vec<_> = Operation::ALL.iter().map(|op| op.provider_path()).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), Operation::ALL.len());
        assert_eq!(Operation::GenerateDefault.provider_path(), "/");
    }
}
