//! Streaming render engine
//!
//! Pages render into a [`RenderDestination`] as an ordered sequence of
//! [`RenderChunk`]s. Nested component slots are resolved concurrently and
//! buffered, with their instructions hoisted ahead of the buffered text.

pub mod chunk;
pub mod context;
pub mod destination;
pub mod engine;
pub mod page;
pub mod renderable;
pub mod slot;

pub use chunk::{RenderChunk, RenderInstruction};
pub use context::RenderContext;
pub use destination::{ChannelDestination, RenderDestination};
pub use engine::{build, Scope};
pub use page::PageEncoder;
pub use renderable::{escape_html, render_child, Renderable, SlotString};
pub use slot::{
    render_slot, render_slot_to_string, render_slots, RenderInstance, RenderedSlots, SlotContext,
    SlotFn, SlotValue,
};
