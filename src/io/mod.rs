//! Byte/char-boundary-safe text utilities shared across the pipeline.

pub mod unicode;

pub use unicode::{
    find_char_boundary, find_char_boundary_forward, grapheme_count, last_word_boundary_before,
    truncate_bytes, truncate_graphemes,
};
