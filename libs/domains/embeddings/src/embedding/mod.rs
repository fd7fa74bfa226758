mod cohere;
mod openai;
mod provider;
mod vertexai;

pub use cohere::{CohereConfig, CohereEmbedder};
pub use openai::{OpenAIConfig, OpenAIEmbedder};
pub use provider::Embedder;
#[cfg(test)]
pub use provider::MockEmbedder;
pub use vertexai::{VertexAIConfig, VertexAIEmbedder};

/// Longest label, in characters, attached to a text embedding
pub const MAX_LABEL_CHARS: usize = 100;

/// Builds the label stored with the embedding of `chunk`.
///
/// The label is `"<label>: <chunk>"`, or just the chunk when `label` is
/// empty. Labels over [`MAX_LABEL_CHARS`] fall back to the leading
/// characters of the chunk.
pub fn chunk_label(label: &str, chunk: &str) -> String {
    let full = if label.is_empty() {
        chunk.to_string()
    } else {
        format!("{}: {}", label, chunk)
    };

    if full.chars().count() > MAX_LABEL_CHARS {
        chunk.chars().take(MAX_LABEL_CHARS).collect()
    } else {
        full
    }
}
