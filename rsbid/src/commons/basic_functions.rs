use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;

/// Standard base64 with padding
pub fn base64_encode_image(image_bytes: &[u8]) -> String {
    STANDARD.encode(image_bytes)
}

/// Read and encode each image, in order
pub fn load_and_encode_all_images<P: AsRef<Path>>(image_paths: &[P]) -> Result<Vec<String>> {
    image_paths
        .iter()
        .map(|path| {
            let path = path.as_ref();
            let bytes = fs::read(path).with_context(|| format!("Failed to read image {:?}", path))?;
            Ok(base64_encode_image(&bytes))
        })
        .collect()
}

/// Chat message content part for a vision model, chosen by model name prefix
pub fn format_image_for_model(base64_image: &str, model: &str) -> Result<Value> {
    let data_url = format!("data:image/jpeg;base64,{}", base64_image);
    if model.starts_with("gemini") {
        Ok(json!({ "type": "image_url", "image_url": data_url }))
    } else if model.starts_with("gpt") || model.starts_with("claude") {
        Ok(json!({ "type": "image_url", "image_url": { "url": data_url } }))
    } else {
        bail!("Unsupported model type: {}", model)
    }
}

/// Read a YAML file and render it as pretty-printed JSON
pub fn load_yaml_to_json<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let value: Value = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse YAML {:?}", path))?;
    serde_json::to_string_pretty(&value).context("Failed to serialize YAML as JSON")
}
