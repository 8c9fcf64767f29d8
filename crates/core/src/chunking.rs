use crate::error::IngestError;
use crate::models::{PageText, TextChunk};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
    pub min_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: 1_000,
            overlap_chars: 200,
            min_chars: 20,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "max_chars must be positive".to_string(),
            ));
        }

        if self.overlap_chars >= self.max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than max {}",
                self.overlap_chars, self.max_chars
            )));
        }

        Ok(())
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Packs blank-line separated paragraphs up to `max_chars`, then cuts any
/// oversize piece into overlapping windows.
pub fn chunk_by_paragraph(text: &str, config: ChunkingConfig) -> Vec<String> {
    let paragraphs = text
        .split("\n\n")
        .map(normalize_whitespace)
        .filter(|paragraph| !paragraph.is_empty())
        .collect::<Vec<_>>();

    let mut packed = Vec::new();
    let mut current = String::new();

    for paragraph in paragraphs {
        if current.is_empty() {
            current = paragraph;
            continue;
        }

        if char_len(&current) + char_len(&paragraph) + 1 <= config.max_chars {
            current.push(' ');
            current.push_str(&paragraph);
        } else {
            packed.push(std::mem::take(&mut current));
            current = paragraph;
        }
    }

    if !current.is_empty() {
        packed.push(current);
    }

    let mut windows = Vec::new();
    for piece in packed {
        if char_len(&piece) <= config.max_chars {
            windows.push(piece);
            continue;
        }

        let chars: Vec<char> = piece.chars().collect();
        let stride = config.max_chars - config.overlap_chars;
        let mut start = 0;
        while start < chars.len() {
            let end = (start + config.max_chars).min(chars.len());
            windows.push(chars[start..end].iter().collect::<String>());
            if end == chars.len() {
                break;
            }
            start += stride;
        }
    }

    let has_long_enough = windows.iter().any(|chunk| char_len(chunk) >= config.min_chars);
    if has_long_enough {
        windows.retain(|chunk| char_len(chunk) >= config.min_chars);
    }

    windows
}

pub fn build_chunks(pages: &[PageText], config: ChunkingConfig) -> Result<Vec<TextChunk>, IngestError> {
    config.validate()?;

    let mut chunks = Vec::new();
    let mut cursor = 0u64;

    for page in pages {
        for text in chunk_by_paragraph(&page.text, config) {
            chunks.push(TextChunk {
                chunk_id: make_chunk_id(&page.document, page.number, cursor, &text),
                document: page.document.clone(),
                page: page.number,
                chunk_index: cursor,
                text,
            });
            cursor = cursor.saturating_add(1);
        }
    }

    Ok(chunks)
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn make_chunk_id(document: &str, page: u32, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document.as_bytes());
    hasher.update(page.to_le_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
