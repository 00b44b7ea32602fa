//! Pipeline stages for transcript table-of-contents generation.
//!
//! Each submodule implements one transformation step and is testable on its
//! own; only [`oracle`] talks to the network.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ normalize ──▶ window ──▶ classify ──▶ anchor ──▶ consolidate
//! (path/URL) (pdfium/txt) (lemmas)   (overlap)  (oracle)    (validate)  (merge)
//! ```
//!
//! 1. [`input`]    : resolve a path or URL to a local PDF or text transcript
//! 2. [`extract`]  : raw text per page; pdfium runs in `spawn_blocking`
//! 3. [`normalize`]: line-numbered, lemmatised page text and terminal-page
//!    detection, backed by the word lists in [`lexicon`]
//! 4. [`window`]   : overlapping windows of consecutive pages (batch mode)
//! 5. [`classify`] : oracle calls with retry/backoff and tolerant JSON parsing
//! 6. [`anchor`]   : keep only candidates whose page and line exist
//! 7. [`consolidate`]: merge per-unit entries into one ordered table

pub mod anchor;
pub mod classify;
pub mod consolidate;
pub mod extract;
pub mod input;
pub mod lexicon;
pub mod normalize;
pub mod oracle;
pub mod window;
