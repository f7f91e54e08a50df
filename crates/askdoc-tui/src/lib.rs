//! Terminal presentation for askdoc answers.
//!
//! Rendering is a pure function of the answer text: `markdown::render` turns
//! the current snapshot into a `RenderTree`, `live::LiveView` paints it, and
//! `copy::CopyStates` tracks the per-block copy affordance.

pub mod clipboard;
pub mod copy;
pub mod live;
pub mod markdown;
pub mod style;

pub use clipboard::{ClipboardError, ClipboardSink, SystemClipboard};
pub use copy::{CopyAffordance, CopyStates};
pub use live::{LiveView, ViewMode};
pub use markdown::{CodeBlockDescriptor, CodeBlockView, RenderBlock, RenderTree, render};
pub use style::{Style, StyledLine, StyledSpan};
