//! Markdown rendering for streamed answers.
//!
//! - `render()`: parse the full answer text into a `RenderTree`
//! - `highlight_code()`: syntect highlighting for one code block
//! - `wrap_styled_spans()`: width-aware wrapping that keeps span styles
//!
//! The tree is recomputed from scratch on every change; nothing is patched.

mod highlight;
mod parse;
mod wrap;

pub use highlight::{PLAIN_TEXT, detect_language, highlight_code};
pub use parse::{CodeBlockDescriptor, CodeBlockView, RenderBlock, RenderTree, render};
pub use wrap::{WrapOptions, wrap_styled_spans};
