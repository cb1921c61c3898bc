//! Extraction stages.
//!
//! Each submodule implements one step; the strategies in [`strategy`] wire
//! them together.
//!
//! ## Data Flow
//!
//! ```text
//!            ┌─ text layer ──▶ normalize ──▶ matchers ─┐
//! document ──┤                                         ├──▶ strategy (merge)
//!            └─ render ──▶ encode ──▶ vision ──────────┘
//!            (pdfium)    (png/base64)  (two tiers)
//! ```
//!
//! 1. [`document`]  — classify uploads, read the PDF text layer
//! 2. [`normalize`] — uppercase, fold diacritics, keep line boundaries
//! 3. [`matchers`]  — share-code and date regexes with label-proximity scores
//! 4. [`render`]    — rasterise page 1 plus three bands; `spawn_blocking`
//!    because pdfium is not async-safe
//! 5. [`encode`]    — PNG and base64 `ImageData` for the chat API
//! 6. [`vision`]    — the fast-then-strong model call and lenient parsing
//! 7. [`strategy`]  — ordered strategies under a confidence threshold

pub mod document;
pub mod encode;
pub mod matchers;
pub mod normalize;
pub mod pdfium;
pub mod render;
pub mod strategy;
pub mod vision;
