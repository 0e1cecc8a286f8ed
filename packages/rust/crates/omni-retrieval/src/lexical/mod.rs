//! Keyword (lexical) signal: TF-IDF vectors with cosine similarity.
//!
//! Layout: `tokenize` (shared build/query tokenizer), `index` (snapshot + atomic swap).

mod index;
mod tokenize;

pub use index::{LexicalIndex, LexicalSnapshot};
pub use tokenize::tokenize;
