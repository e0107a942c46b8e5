//! Story-boundary text chunker.
//!
//! A story collection is split so that each chunk holds one complete story.
//! Blank-line separation is tried first (the common layout for `.txt`
//! collections); when that does not produce several stories, headings such
//! as `Story 3:`, `Chapter 2-` or `4. The Crow` are used as boundaries.
//!
//! Stories longer than three times `chunk_size` characters are split again
//! with a recursive character splitter, which prefers paragraph, line,
//! sentence, and word boundaries in that order and carries `chunk_overlap`
//! characters between consecutive pieces.

use regex::Regex;
use std::collections::VecDeque;
use std::sync::LazyLock;

use crate::config::ChunkingConfig;

/// Headings that open a new story. Matched case-insensitively against a trimmed line.
static STORY_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:story\s+\d+[:\-]|chapter\s+\d+[:\-]|\d+\.\s+[a-z]|[a-z][a-z]+\s+\d+[:\-])",
    )
    .expect("story heading pattern is valid")
});

/// Separators tried by the recursive splitter, coarsest first.
const SPLIT_SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " ", ""];

/// A line this long or longer is never treated as a title.
const MAX_TITLE_CHARS: usize = 100;

/// Splits raw document text into story chunks.
pub trait TextChunker: Send + Sync {
    fn chunk_text(&self, text: &str) -> Vec<String>;
}

#[derive(Debug, Clone)]
pub struct StoryChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl StoryChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Push `story` onto `out`, splitting it further if it is far over size.
    fn push_story(&self, story: &str, out: &mut Vec<String>) {
        if char_len(story) > self.chunk_size * 3 {
            out.extend(self.split_recursive(story, SPLIT_SEPARATORS));
        } else {
            out.push(story.to_string());
        }
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut separator = "";
        let mut remaining: &[&str] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                break;
            }
            if text.contains(sep) {
                separator = sep;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let mut out = Vec::new();
        let mut good: Vec<String> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(&piece) < self.chunk_size {
                good.push(piece);
                continue;
            }
            if !good.is_empty() {
                out.extend(self.merge_pieces(&good));
                good.clear();
            }
            if remaining.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    out.push(trimmed.to_string());
                }
            } else {
                out.extend(self.split_recursive(&piece, remaining));
            }
        }
        if !good.is_empty() {
            out.extend(self.merge_pieces(&good));
        }
        out
    }

    /// Greedily pack small pieces into chunks of at most `chunk_size`
    /// characters, keeping up to `chunk_overlap` characters of tail between
    /// consecutive chunks.
    fn merge_pieces(&self, pieces: &[String]) -> Vec<String> {
        let mut docs = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                push_joined(&window, &mut docs);
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }
            window.push_back(piece);
            total += len;
        }
        push_joined(&window, &mut docs);
        docs
    }
}

impl Default for StoryChunker {
    fn default() -> Self {
        Self::from_config(&ChunkingConfig::default())
    }
}

impl TextChunker for StoryChunker {
    fn chunk_text(&self, text: &str) -> Vec<String> {
        let newlines = text.matches('\n').count();
        let spaces = text.matches(' ').count();

        if text.contains("\n\n") || newlines * 10 > spaces {
            let stories: Vec<&str> = text
                .split("\n\n")
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect();
            if stories.len() > 1 {
                let mut out = Vec::with_capacity(stories.len());
                for story in stories {
                    self.push_story(story, &mut out);
                }
                return out;
            }
        }

        let boundaries = find_story_boundaries(text);
        let mut out = Vec::new();
        for (i, &start) in boundaries.iter().enumerate() {
            let end = boundaries.get(i + 1).copied().unwrap_or(text.len());
            let story = text[start..end].trim();
            if !story.is_empty() {
                self.push_story(story, &mut out);
            }
        }
        out
    }
}

/// Byte offsets at which stories start. Always begins with `0`.
fn find_story_boundaries(text: &str) -> Vec<usize> {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut boundaries = vec![0];
    let mut pos = 0usize;

    for (i, line) in lines.iter().enumerate() {
        let stripped = line.trim();
        let mut is_boundary = STORY_HEADING.is_match(stripped);

        // A blank line followed by something short that is not a sentence
        // reads as a title.
        if !is_boundary && i > 0 && i + 1 < lines.len() && stripped.is_empty() {
            let next = lines[i + 1].trim();
            if !next.is_empty() && char_len(next) < MAX_TITLE_CHARS && !next.ends_with('.') {
                is_boundary = true;
            }
        }

        if is_boundary && pos > 0 {
            boundaries.push(pos);
        }
        pos += line.len() + 1;
    }

    boundaries
}

/// Split on `separator`, attaching each separator to the start of the piece
/// that follows it. An empty separator splits into characters.
fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }

    let mut pieces = Vec::new();
    let mut last = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > last {
            pieces.push(text[last..idx].to_string());
        }
        last = idx;
    }
    if last < text.len() {
        pieces.push(text[last..].to_string());
    }
    pieces.retain(|p| !p.is_empty());
    pieces
}

fn push_joined(window: &VecDeque<&str>, docs: &mut Vec<String>) {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
