// Tagging Backends
//
// Three inference variants behind one interface: "clip" (vectorised
// batch), "ollama" (item-by-item), and "combined". Backend hosts come
// from environment variables read here, not in the job engine.

mod backend;
mod clip_client;
mod combined;
mod ollama_client;

pub use backend::{InferenceBackend, TagPrediction};
pub use clip_client::ClipServerTagger;
pub use combined::CombinedTagger;
pub use ollama_client::OllamaTagger;

use crate::shared::error::TaggingError;

const DEFAULT_CLIP_URL: &str = "http://localhost:8093";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Loads a backend by kind
///
/// # Environment Variables
/// - `CLIP_SERVER_URL`: CLIP tagging sidecar (default: http://localhost:8093)
/// - `OLLAMA_HOST`: Ollama API (default: http://localhost:11434)
///
/// # Errors
/// Returns `BackendUnavailable` for an unknown kind.
pub fn load_backend(
    kind: &str,
    model: Option<String>,
) -> Result<Box<dyn InferenceBackend>, TaggingError> {
    let clip_url =
        std::env::var("CLIP_SERVER_URL").unwrap_or_else(|_| DEFAULT_CLIP_URL.to_string());
    let ollama_url =
        std::env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_OLLAMA_URL.to_string());

    match kind {
        "clip" => Ok(Box::new(ClipServerTagger::new(&clip_url, model))),
        "ollama" => Ok(Box::new(OllamaTagger::new(&ollama_url, model))),
        "combined" => Ok(Box::new(CombinedTagger::new(
            ClipServerTagger::new(&clip_url, model),
            OllamaTagger::new(&ollama_url, None),
        ))),
        other => Err(TaggingError::BackendUnavailable(format!(
            "unknown tagging backend: {}",
            other
        ))),
    }
}
