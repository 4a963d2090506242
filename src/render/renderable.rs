//! Render results and how they are written to a destination

use crate::app::Response;
use crate::error::TrellisResult;
use crate::render::chunk::{RenderChunk, RenderInstruction};
use crate::render::destination::RenderDestination;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::fmt;

/// Escape text for inclusion in HTML content or attribute values
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Buffered slot output.
///
/// The type itself marks the value as slot output rather than user text;
/// `instructions` is a payload that never appears in `content`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotString {
    pub content: String,
    pub instructions: Vec<RenderInstruction>,
}

impl SlotString {
    pub fn as_str(&self) -> &str {
        &self.content
    }
}

impl fmt::Display for SlotString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content)
    }
}

/// Something that can be written to a destination
pub enum Renderable {
    /// Trusted markup
    Html(String),
    /// Text escaped on write
    Text(String),
    /// Buffered slot output; instructions are written before content
    Slot(SlotString),
    Instruction(RenderInstruction),
    /// Children written in order
    Fragment(Vec<Renderable>),
    /// Resolved when reached, then written in place
    Deferred(BoxFuture<'static, TrellisResult<Renderable>>),
    /// Terminal pass-through of a complete response
    Response(Response),
    Empty,
}

impl fmt::Debug for Renderable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Html(s) => f.debug_tuple("Html").field(s).finish(),
            Self::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Self::Slot(s) => f.debug_tuple("Slot").field(s).finish(),
            Self::Instruction(i) => f.debug_tuple("Instruction").field(i).finish(),
            Self::Fragment(children) => f.debug_tuple("Fragment").field(children).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
            Self::Response(r) => f.debug_tuple("Response").field(&r.status).finish(),
            Self::Empty => f.write_str("Empty"),
        }
    }
}

impl From<String> for Renderable {
    fn from(html: String) -> Self {
        Self::Html(html)
    }
}

impl From<&str> for Renderable {
    fn from(html: &str) -> Self {
        Self::Html(html.to_string())
    }
}

impl From<SlotString> for Renderable {
    fn from(slot: SlotString) -> Self {
        Self::Slot(slot)
    }
}

/// Write `child` to `dest`, resolving deferred parts in order.
pub fn render_child<'a>(
    dest: &'a mut dyn RenderDestination,
    child: Renderable,
) -> BoxFuture<'a, TrellisResult<()>> {
    async move {
        match child {
            Renderable::Html(html) => dest.write(RenderChunk::Content(html)),
            Renderable::Text(text) => dest.write(RenderChunk::Content(escape_html(&text))),
            Renderable::Slot(slot) => {
                for instruction in slot.instructions {
                    dest.write(RenderChunk::Instruction(instruction));
                }
                if !slot.content.is_empty() {
                    dest.write(RenderChunk::Content(slot.content));
                }
            }
            Renderable::Instruction(instruction) => {
                dest.write(RenderChunk::Instruction(instruction))
            }
            Renderable::Fragment(children) => {
                for child in children {
                    render_child(&mut *dest, child).await?;
                }
            }
            Renderable::Deferred(pending) => {
                let resolved = pending.await?;
                render_child(dest, resolved).await?;
            }
            Renderable::Response(response) => dest.write(RenderChunk::Passthrough(response)),
            Renderable::Empty => {}
        }
        Ok(())
    }
    .boxed()
}
