use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{ChunkMethod, ChunkerConfig};

/// A piece of chunked content with a dense 0-based index and structural
/// metadata (at minimum the `method` key).
#[derive(Debug, Clone)]
pub struct Chunk {
    pub content: String,
    pub index: usize,
    pub metadata: HashMap<String, String>,
}

/// Splits text into chunks under one of three strategies. Sizes are word
/// counts used as a token proxy. Chunking never fails: blank input yields
/// an empty list.
pub struct Chunker {
    config: ChunkerConfig,
}

static HEADER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^(#{1,6})\s+(.+)$").unwrap());
static CODE_BLOCK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```(\w*)\n(.*?)```").unwrap());
static TABLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\|.+\|$").unwrap());
static BLANK_LINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").unwrap());
static ORDERED_LIST_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.\s").unwrap());

// Trailing abbreviations that do not end a sentence.
const ABBREVIATIONS: &[&str] = &[
    "mr.", "mrs.", "ms.", "dr.", "prof.", "inc.", "ltd.", "corp.", "etc.", "e.g.", "i.e.", "vs.",
    "v.", "st.", "ave.", "blvd.", "no.", "vol.", "pg.",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockType {
    Header,
    Paragraph,
    Code,
    Table,
    List,
}

#[derive(Debug, Clone)]
struct ContentBlock {
    block_type: BlockType,
    content: String,
    /// Section header context this block falls under.
    header: String,
    level: usize,
}

impl Chunker {
    pub fn new(mut config: ChunkerConfig) -> Self {
        if config.target_size == 0 {
            config.target_size = 512;
        }
        if config.max_size == 0 {
            config.max_size = 1024;
        }

        Self { config }
    }

    pub fn chunk(&self, content: &str) -> Vec<Chunk> {
        let content = content.trim();
        if content.is_empty() {
            return Vec::new();
        }

        match self.config.method {
            ChunkMethod::Fixed => self.chunk_fixed(content),
            ChunkMethod::Sentence => self.chunk_sentence(content),
            ChunkMethod::Semantic => self.chunk_semantic(content),
        }
    }

    // Stride through the word stream; the guard keeps the stride positive
    // when overlap would swallow the whole window.
    fn stride(&self) -> usize {
        if self.config.target_size > self.config.overlap {
            self.config.target_size - self.config.overlap
        } else {
            (self.config.target_size / 2).max(1)
        }
    }

    // ------------------------------------------------------------------
    // Fixed chunking
    // ------------------------------------------------------------------

    fn chunk_fixed(&self, content: &str) -> Vec<Chunk> {
        let words: Vec<&str> = content.split_whitespace().collect();
        if words.is_empty() {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        let mut start = 0;

        loop {
            let end = (start + self.config.target_size).min(words.len());
            let window = &words[start..end];

            let mut metadata = HashMap::new();
            metadata.insert("method".to_string(), "fixed".to_string());
            metadata.insert("word_count".to_string(), window.len().to_string());

            chunks.push(Chunk {
                content: window.join(" "),
                index: chunks.len(),
                metadata,
            });

            if end >= words.len() {
                break;
            }
            start += self.stride();
        }

        chunks
    }

    // ------------------------------------------------------------------
    // Sentence chunking
    // ------------------------------------------------------------------

    fn chunk_sentence(&self, content: &str) -> Vec<Chunk> {
        let sentences = split_sentences(content);
        if sentences.is_empty() {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut current_words = 0;

        for sentence in sentences {
            let sentence_words = word_count(&sentence);

            // Hard flush: adding this sentence would exceed the ceiling.
            if current_words + sentence_words > self.config.max_size && current_words > 0 {
                chunks.push(self.sentence_chunk(&current, chunks.len()));
                (current, current_words) = self.sentence_overlap(&current);
            }

            // A single sentence above the ceiling falls back to fixed
            // windowing.
            if sentence_words > self.config.max_size {
                if current_words > 0 {
                    chunks.push(self.sentence_chunk(&current, chunks.len()));
                    current = Vec::new();
                    current_words = 0;
                }
                let split = self.split_long_sentence(&sentence, chunks.len());
                chunks.extend(split);
                continue;
            }

            current.push(sentence);
            current_words += sentence_words;

            // Soft flush at the target size.
            if current_words >= self.config.target_size {
                chunks.push(self.sentence_chunk(&current, chunks.len()));
                (current, current_words) = self.sentence_overlap(&current);
            }
        }

        if !current.is_empty() {
            chunks.push(self.sentence_chunk(&current, chunks.len()));
        }

        chunks
    }

    fn sentence_chunk(&self, sentences: &[String], index: usize) -> Chunk {
        let content = sentences.join(" ");

        let mut metadata = HashMap::new();
        metadata.insert("method".to_string(), "sentence".to_string());
        metadata.insert("sentence_count".to_string(), sentences.len().to_string());
        metadata.insert("word_count".to_string(), word_count(&content).to_string());

        Chunk {
            content: content.trim().to_string(),
            index,
            metadata,
        }
    }

    // Carry back the trailing sentences whose aggregated word count first
    // reaches the configured overlap.
    fn sentence_overlap(&self, sentences: &[String]) -> (Vec<String>, usize) {
        if self.config.overlap == 0 || sentences.is_empty() {
            return (Vec::new(), 0);
        }

        let mut overlap_sentences = Vec::new();
        let mut overlap_words = 0;

        for sentence in sentences.iter().rev() {
            if overlap_words >= self.config.overlap {
                break;
            }
            overlap_sentences.insert(0, sentence.clone());
            overlap_words += word_count(sentence);
        }

        (overlap_sentences, overlap_words)
    }

    fn split_long_sentence(&self, sentence: &str, start_index: usize) -> Vec<Chunk> {
        let words: Vec<&str> = sentence.split_whitespace().collect();
        let mut chunks = Vec::new();
        let mut start = 0;

        loop {
            let end = (start + self.config.target_size).min(words.len());
            let window = &words[start..end];

            let mut metadata = HashMap::new();
            metadata.insert("method".to_string(), "sentence".to_string());
            metadata.insert("word_count".to_string(), window.len().to_string());
            metadata.insert("split".to_string(), "true".to_string());

            chunks.push(Chunk {
                content: window.join(" "),
                index: start_index + chunks.len(),
                metadata,
            });

            if end >= words.len() {
                break;
            }
            start += self.stride();
        }

        chunks
    }

    // ------------------------------------------------------------------
    // Semantic chunking (markdown-aware)
    // ------------------------------------------------------------------

    // Preserves code blocks and tables as atomic units, carries header
    // context into each chunk, and groups related blocks together.
    fn chunk_semantic(&self, content: &str) -> Vec<Chunk> {
        let blocks = parse_into_blocks(content);
        let mut chunks = self.group_blocks_into_chunks(blocks);

        if self.config.overlap > 0 {
            chunks = self.add_semantic_overlap(chunks);
        }

        for (i, chunk) in chunks.iter_mut().enumerate() {
            chunk.index = i;
        }

        chunks
    }

    fn group_blocks_into_chunks(&self, blocks: Vec<ContentBlock>) -> Vec<Chunk> {
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut current_blocks: Vec<ContentBlock> = Vec::new();
        let mut current_words = 0;
        let mut current_header = String::new();

        fn flush(
            chunks: &mut Vec<Chunk>,
            current_blocks: &mut Vec<ContentBlock>,
            current_words: &mut usize,
            current_header: &str,
        ) {
            if current_blocks.is_empty() {
                return;
            }

            let mut content_parts: Vec<String> = Vec::new();
            let mut header_added = false;

            for block in current_blocks.iter() {
                if !block.header.is_empty() && !header_added {
                    // Prefix a section marker unless the chunk opens with
                    // that very header line.
                    let prefix = format!("{} {}", "#".repeat(block.level), block.header);
                    if current_blocks[0].block_type != BlockType::Header
                        || current_blocks[0].content != prefix
                    {
                        content_parts.push(format!("[Section: {}]", block.header));
                        header_added = true;
                    }
                }
                content_parts.push(block.content.clone());
            }

            let content = content_parts.join("\n\n");

            let mut metadata = HashMap::new();
            metadata.insert("method".to_string(), "semantic".to_string());
            metadata.insert("word_count".to_string(), word_count(&content).to_string());
            if current_blocks
                .iter()
                .any(|b| b.block_type == BlockType::Code)
            {
                metadata.insert("contains_code".to_string(), "true".to_string());
            }
            if current_blocks
                .iter()
                .any(|b| b.block_type == BlockType::Table)
            {
                metadata.insert("contains_table".to_string(), "true".to_string());
            }
            if !current_header.is_empty() {
                metadata.insert("section".to_string(), current_header.to_string());
            }

            chunks.push(Chunk {
                content: content.trim().to_string(),
                index: chunks.len(),
                metadata,
            });

            current_blocks.clear();
            *current_words = 0;
        }

        for block in blocks {
            let block_words = word_count(&block.content);

            if block.block_type == BlockType::Header {
                current_header = block.header.clone();
            }

            let is_atomic =
                block.block_type == BlockType::Code || block.block_type == BlockType::Table;

            // A block above the ceiling gets its own chunk: atomic blocks
            // are emitted whole, others are split sentence-wise.
            if block_words > self.config.max_size {
                flush(
                    &mut chunks,
                    &mut current_blocks,
                    &mut current_words,
                    &current_header,
                );

                if is_atomic {
                    current_blocks.push(block);
                    flush(
                        &mut chunks,
                        &mut current_blocks,
                        &mut current_words,
                        &current_header,
                    );
                } else {
                    let split = self.split_large_block(&block);
                    chunks.extend(split);
                }
                continue;
            }

            if current_words + block_words > self.config.target_size && current_words > 0 {
                // Atomic blocks ride along with their accumulated context
                // when the combined size still fits under the ceiling.
                if is_atomic && current_words + block_words <= self.config.max_size {
                    current_words += block_words;
                    current_blocks.push(block);
                    flush(
                        &mut chunks,
                        &mut current_blocks,
                        &mut current_words,
                        &current_header,
                    );
                    continue;
                }

                flush(
                    &mut chunks,
                    &mut current_blocks,
                    &mut current_words,
                    &current_header,
                );
            }

            current_words += block_words;
            current_blocks.push(block);
        }

        flush(
            &mut chunks,
            &mut current_blocks,
            &mut current_words,
            &current_header,
        );

        chunks
    }

    fn split_large_block(&self, block: &ContentBlock) -> Vec<Chunk> {
        let sentences = split_sentences(&block.content);
        let mut chunks = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut current_words = 0;

        let mut emit = |sentences: &[String], words: usize, chunks: &mut Vec<Chunk>| {
            let mut content = sentences.join(" ");
            if !block.header.is_empty() {
                content = format!("[Section: {}]\n\n{content}", block.header);
            }

            let mut metadata = HashMap::new();
            metadata.insert("method".to_string(), "semantic".to_string());
            metadata.insert("word_count".to_string(), words.to_string());
            if !block.header.is_empty() {
                metadata.insert("section".to_string(), block.header.clone());
            }
            metadata.insert("split".to_string(), "true".to_string());

            chunks.push(Chunk {
                content: content.trim().to_string(),
                index: chunks.len(),
                metadata,
            });
        };

        for sentence in sentences {
            let sentence_words = word_count(&sentence);

            if current_words + sentence_words > self.config.target_size && current_words > 0 {
                emit(&current, current_words, &mut chunks);
                current.clear();
                current_words = 0;
            }

            current.push(sentence);
            current_words += sentence_words;
        }

        if !current.is_empty() {
            emit(&current, current_words, &mut chunks);
        }

        chunks
    }

    // Prepend the trailing words of each previous chunk so retrieval keeps
    // cross-chunk context. Skipped when the carried text is only a section
    // marker.
    fn add_semantic_overlap(&self, chunks: Vec<Chunk>) -> Vec<Chunk> {
        if chunks.len() <= 1 {
            return chunks;
        }

        let mut result: Vec<Chunk> = Vec::with_capacity(chunks.len());

        for (i, chunk) in chunks.iter().enumerate() {
            let mut out = chunk.clone();

            if i > 0 {
                let prev_words: Vec<&str> = chunks[i - 1].content.split_whitespace().collect();
                if !prev_words.is_empty() {
                    let overlap_count = self.config.overlap.min(prev_words.len());
                    let overlap_text = prev_words[prev_words.len() - overlap_count..].join(" ");

                    if !overlap_text.starts_with("[Section:") {
                        out.content = format!("[...] {overlap_text}\n\n{}", out.content);
                        out.metadata
                            .insert("has_overlap".to_string(), "true".to_string());
                        out.metadata
                            .insert("overlap_words".to_string(), overlap_count.to_string());
                    }
                }
            }

            result.push(out);
        }

        result
    }
}

// Parse markdown content into semantic blocks. Code fences are extracted
// first and replaced by placeholders so the blank-line split can never
// cut through them.
fn parse_into_blocks(content: &str) -> Vec<ContentBlock> {
    let mut code_blocks: HashMap<String, String> = HashMap::new();
    let mut processed = content.to_string();

    let matches: Vec<(usize, usize)> = CODE_BLOCK_RE
        .find_iter(content)
        .map(|m| (m.start(), m.end()))
        .collect();
    for (i, (start, end)) in matches.iter().enumerate().rev() {
        let placeholder = format!("___CODE_BLOCK_{i}___");
        code_blocks.insert(placeholder.clone(), content[*start..*end].to_string());
        processed.replace_range(*start..*end, &placeholder);
    }

    let mut blocks = Vec::new();
    let mut current_header = String::new();
    let mut current_level = 0;

    for para in BLANK_LINE_RE.split(&processed) {
        let para = para.trim();
        if para.is_empty() {
            continue;
        }

        if para.starts_with("___CODE_BLOCK_") && para.ends_with("___") {
            if let Some(code) = code_blocks.get(para) {
                blocks.push(ContentBlock {
                    block_type: BlockType::Code,
                    content: code.clone(),
                    header: current_header.clone(),
                    level: current_level,
                });
                continue;
            }
        }

        if let Some(caps) = HEADER_RE.captures(para) {
            current_level = caps[1].len();
            current_header = caps[2].to_string();
            blocks.push(ContentBlock {
                block_type: BlockType::Header,
                content: para.to_string(),
                header: current_header.clone(),
                level: current_level,
            });
            continue;
        }

        if TABLE_RE.is_match(para) {
            blocks.push(ContentBlock {
                block_type: BlockType::Table,
                content: para.to_string(),
                header: current_header.clone(),
                level: current_level,
            });
            continue;
        }

        if is_list_block(para) {
            blocks.push(ContentBlock {
                block_type: BlockType::List,
                content: para.to_string(),
                header: current_header.clone(),
                level: current_level,
            });
            continue;
        }

        blocks.push(ContentBlock {
            block_type: BlockType::Paragraph,
            content: para.to_string(),
            header: current_header.clone(),
            level: current_level,
        });
    }

    blocks
}

fn is_list_block(content: &str) -> bool {
    let Some(first_line) = content.lines().next() else {
        return false;
    };
    let first_line = first_line.trim();

    first_line.starts_with("- ")
        || first_line.starts_with("* ")
        || first_line.starts_with("+ ")
        || ORDERED_LIST_RE.is_match(first_line)
}

// Split text into sentences on terminal punctuation followed by whitespace
// or end-of-string, suppressing splits after common abbreviations.
fn split_sentences(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let mut sentences = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = text.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        current.push(c);

        if matches!(c, '.' | '!' | '?') {
            let at_boundary = i + 1 >= chars.len() || chars[i + 1].is_whitespace();
            if at_boundary {
                let sentence = current.trim();
                if !sentence.is_empty() && !ends_with_abbreviation(sentence) {
                    sentences.push(sentence.to_string());
                    current.clear();
                }
            }
        }
    }

    let remaining = current.trim();
    if !remaining.is_empty() {
        sentences.push(remaining.to_string());
    }

    sentences
}

fn ends_with_abbreviation(text: &str) -> bool {
    let lower = text.to_lowercase();
    ABBREVIATIONS.iter().any(|abbr| lower.ends_with(abbr))
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
