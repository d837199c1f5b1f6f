
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A piece of document text ready to be stored as a chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// The chunk text
    pub content: String,
    /// Position of this chunk within its document
    pub chunk_index: usize,
    /// Estimated token count
    pub token_count: usize,
}

/// Configuration for document chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in tokens
    pub target_chunk_size: usize,
    /// Maximum chunk size in tokens before forced splitting
    pub max_chunk_size: usize,
    /// Minimum chunk size in tokens (smaller chunks will be merged)
    pub min_chunk_size: usize,
    /// Overlap size in tokens between adjacent chunks
    pub overlap_size: usize,
    /// Whether to break at sentence boundaries when possible
    pub sentence_boundary_splitting: bool,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            target_chunk_size: 400,
            max_chunk_size: 800,
            min_chunk_size: 50,
            overlap_size: 40,
            sentence_boundary_splitting: true,
        }
    }
}

/// Split a document into embedding-ready chunks
#[inline]
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<TextChunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let splits = split_by_paragraphs(text, config);
    let chunks = splits
        .into_iter()
        .filter(|split| !split.trim().is_empty())
        .enumerate()
        .map(|(chunk_index, content)| TextChunk {
            token_count: estimate_token_count(&content),
            content,
            chunk_index,
        })
        .collect();

    let processed = post_process_chunks(chunks, config);

    debug!(
        "Chunked document into {} chunks (avg {} tokens)",
        processed.len(),
        processed.iter().map(|c| c.token_count).sum::<usize>() / processed.len().max(1)
    );

    processed
}

/// Greedily pack paragraphs up to the target size, splitting oversized ones
fn split_by_paragraphs(content: &str, config: &ChunkingConfig) -> Vec<String> {
    let mut splits = Vec::new();
    let mut current_split = String::new();
    let mut current_token_count = 0;

    for paragraph in content.split("\n\n") {
        if paragraph.trim().is_empty() {
            continue;
        }

        let paragraph_tokens = estimate_token_count(paragraph);

        let pieces = if paragraph_tokens > config.max_chunk_size {
            if config.sentence_boundary_splitting {
                split_by_sentences(paragraph, config)
            } else {
                split_by_words(paragraph, config)
            }
        } else {
            vec![paragraph.trim().to_string()]
        };

        for piece in pieces {
            let piece_tokens = estimate_token_count(&piece);
            if current_token_count + piece_tokens > config.target_chunk_size
                && !current_split.trim().is_empty()
            {
                splits.push(current_split.trim().to_string());
                current_split.clear();
                current_token_count = 0;
            }

            current_split.push_str(&piece);
            current_split.push_str("\n\n");
            current_token_count += piece_tokens;
        }
    }

    if !current_split.trim().is_empty() {
        splits.push(current_split.trim().to_string());
    }

    splits
}

/// Split text by sentences
fn split_by_sentences(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let mut splits = Vec::new();
    let mut current_split = String::new();
    let mut current_token_count = 0;

    let sentences = text
        .split_inclusive(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    for sentence in sentences {
        // A single run-on sentence can still exceed the limit
        let pieces = if estimate_token_count(sentence) > config.max_chunk_size {
            split_by_words(sentence, config)
        } else {
            vec![sentence.to_string()]
        };

        for piece in pieces {
            let piece_tokens = estimate_token_count(&piece);

            if current_token_count + piece_tokens > config.target_chunk_size
                && !current_split.trim().is_empty()
            {
                splits.push(current_split.trim().to_string());
                current_split.clear();
                current_token_count = 0;
            }

            current_split.push_str(&piece);
            current_split.push(' ');
            current_token_count += piece_tokens;
        }
    }

    if !current_split.trim().is_empty() {
        splits.push(current_split.trim().to_string());
    }

    splits
}

/// Split text by words as a last resort
fn split_by_words(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let mut splits = Vec::new();
    let mut current_split = String::new();
    let mut current_token_count = 0;

    for word in text.split_whitespace() {
        let word_tokens = estimate_token_count(word).max(1);

        if current_token_count + word_tokens > config.target_chunk_size
            && !current_split.trim().is_empty()
        {
            splits.push(current_split.trim().to_string());
            current_split.clear();
            current_token_count = 0;
        }

        current_split.push_str(word);
        current_split.push(' ');
        current_token_count += word_tokens;
    }

    if !current_split.trim().is_empty() {
        splits.push(current_split.trim().to_string());
    }

    splits
}

/// Merge undersized chunks into their predecessor and add overlap
fn post_process_chunks(chunks: Vec<TextChunk>, config: &ChunkingConfig) -> Vec<TextChunk> {
    let mut processed: Vec<TextChunk> = Vec::with_capacity(chunks.len());

    for chunk in chunks {
        match processed.last_mut() {
            Some(previous)
                if chunk.token_count < config.min_chunk_size
                    && previous.token_count + chunk.token_count <= config.max_chunk_size =>
            {
                previous.content.push_str("\n\n");
                previous.content.push_str(&chunk.content);
                previous.token_count += chunk.token_count;
            }
            _ => processed.push(chunk),
        }
    }

    if config.overlap_size > 0 {
        add_overlap(&mut processed, config.overlap_size);
    }

    for (i, chunk) in processed.iter_mut().enumerate() {
        chunk.chunk_index = i;
    }

    processed
}

/// Prefix each chunk with the tail of the one before it
fn add_overlap(chunks: &mut [TextChunk], overlap_tokens: usize) {
    for i in (1..chunks.len()).rev() {
        let overlap_text = extract_overlap_text(&chunks[i - 1].content, overlap_tokens);
        if !overlap_text.is_empty() {
            let current = &mut chunks[i];
            current.content = format!("{}\n\n{}", overlap_text, current.content);
            current.token_count += estimate_token_count(&overlap_text);
        }
    }
}

/// Extract overlap text from the end of a chunk
fn extract_overlap_text(content: &str, overlap_tokens: usize) -> String {
    let words: Vec<&str> = content.split_whitespace().collect();
    let word_count = (overlap_tokens as f64 * 0.75) as usize; // Rough word-to-token ratio

    if words.len() <= word_count {
        return String::new();
    }

    words[words.len() - word_count..].join(" ")
}

/// Estimate token count using a simple heuristic
/// This is a rough approximation - actual tokenization would be more accurate
#[inline]
pub fn estimate_token_count(text: &str) -> usize {
    // Rough heuristic: 1 token ≈ 0.75 words for English text
    // Add extra tokens for punctuation and special characters
    let word_count = text.split_whitespace().count();
    let punct_count = text.chars().filter(|c| c.is_ascii_punctuation()).count();

    (punct_count as f64).mul_add(0.1, word_count as f64 / 0.75) as usize
}
