use std::collections::BTreeMap;

use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use crate::error::ProcessError;

/// Output format used when the caller does not request one.
pub const DEFAULT_FORMAT: &str = "png";

/// A requested transformation's parameter set.
///
/// Parameters live in a key-sorted map, so two logically identical requests
/// built in different orders share one canonical encoding and therefore one
/// digest. Unknown keys are kept and passed through to the backend.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Variation {
    transformations: BTreeMap<String, Value>,
}

impl Variation {
    /// Start a variation that fits the source within `width` x `height`.
    pub fn resize_to_limit(width: u32, height: u32) -> Self {
        let mut transformations = BTreeMap::new();
        transformations.insert("resize_to_limit".to_string(), json!([width, height]));
        Self { transformations }
    }

    /// Build from a raw parameter map (e.g. deserialized caller input).
    pub fn from_transformations(transformations: BTreeMap<String, Value>) -> Self {
        Self { transformations }
    }

    pub fn rotation(mut self, degrees: i64) -> Self {
        self.transformations
            .insert("rotation".to_string(), json!(degrees));
        self
    }

    pub fn format(mut self, format: &str) -> Self {
        self.transformations
            .insert("format".to_string(), json!(format));
        self
    }

    pub fn quality(mut self, quality: u8) -> Self {
        self.transformations
            .insert("quality".to_string(), json!(quality));
        self
    }

    /// Fill parameters absent here from `defaults`, leaving present ones
    /// untouched. Used to derive a preview image's own variant.
    pub fn default_to(&self, defaults: &Variation) -> Variation {
        let mut transformations = self.transformations.clone();
        for (key, value) in &defaults.transformations {
            transformations
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        Variation { transformations }
    }

    pub fn transformations(&self) -> &BTreeMap<String, Value> {
        &self.transformations
    }

    /// Target box as (width, height). Required; its absence is a caller
    /// contract violation, never silently defaulted.
    pub fn dimensions(&self) -> Result<(u32, u32), ProcessError> {
        let value = self
            .transformations
            .get("resize_to_limit")
            .ok_or_else(|| ProcessError::InvalidVariation("resize_to_limit is required".into()))?;
        let pair = value.as_array().filter(|a| a.len() == 2).ok_or_else(|| {
            ProcessError::InvalidVariation("resize_to_limit must be a [width, height] pair".into())
        })?;
        let mut dims = [0u32; 2];
        for (slot, v) in dims.iter_mut().zip(pair) {
            *slot = v
                .as_u64()
                .filter(|n| *n > 0 && *n <= u64::from(u32::MAX))
                .ok_or_else(|| {
                    ProcessError::InvalidVariation(
                        "resize_to_limit dimensions must be positive integers".into(),
                    )
                })? as u32;
        }
        Ok((dims[0], dims[1]))
    }

    /// Rotation in degrees; explicitly optional, defaults to 0.
    pub fn rotation_degrees(&self) -> i64 {
        self.transformations
            .get("rotation")
            .and_then(Value::as_i64)
            .unwrap_or(0)
    }

    /// Requested output format, or the engine default.
    pub fn output_format(&self) -> &str {
        self.transformations
            .get("format")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_FORMAT)
    }

    /// Requested output quality, if any; defaults are backend-specific.
    pub fn output_quality(&self) -> Option<u8> {
        self.transformations
            .get("quality")
            .and_then(Value::as_u64)
            .and_then(|q| u8::try_from(q).ok())
    }

    /// MIME type of the output, derived from the output format.
    pub fn content_type(&self) -> String {
        mime_guess::from_ext(self.output_format())
            .first()
            .map(|m| m.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string())
    }

    /// Canonical output file name for a given source base name.
    pub fn output_filename(&self, base: &str) -> String {
        format!("{base}.{}", self.output_format())
    }

    /// Check the caller's contract before any side effect.
    pub fn validate(&self) -> Result<(), ProcessError> {
        self.dimensions()?;
        if let Some(rotation) = self.transformations.get("rotation")
            && rotation.as_i64().is_none()
        {
            return Err(ProcessError::InvalidVariation(
                "rotation must be an integer".into(),
            ));
        }
        if let Some(quality) = self.transformations.get("quality") {
            match quality.as_u64() {
                Some(q) if (1..=100).contains(&q) => {}
                _ => {
                    return Err(ProcessError::InvalidVariation(
                        "quality must be an integer between 1 and 100".into(),
                    ));
                }
            }
        }
        if let Some(format) = self.transformations.get("format") {
            match format.as_str() {
                Some(f) if !f.is_empty() && f.chars().all(|c| c.is_ascii_alphanumeric()) => {}
                _ => {
                    return Err(ProcessError::InvalidVariation(
                        "format must be a bare file extension".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Canonical byte encoding: compact JSON with sorted keys.
    pub fn canonical_encoding(&self) -> String {
        // BTreeMap (and serde_json's default map) keep keys sorted, so the
        // encoding is insertion-order independent.
        serde_json::to_string(&self.transformations).unwrap_or_default()
    }

    /// Deterministic identity of this variation: SHA-256 hex over the
    /// canonical encoding. Stable across processes and time.
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.canonical_encoding().as_bytes()))
    }
}

/// Filename without its final extension.
pub fn filename_base(filename: &str) -> &str {
    filename
        .rsplit_once('.')
        .map(|(base, _)| base)
        .unwrap_or(filename)
}
