//! Slot resolution
//!
//! A slot is either already rendered or a function of the render context.
//! `render_slots` resolves every slot of a component concurrently and
//! hoists their instructions so the caller can forward them to the parent
//! stream before the buffered text.

use crate::error::TrellisResult;
use crate::render::chunk::{RenderChunk, RenderInstruction};
use crate::render::context::RenderContext;
use crate::render::destination::RenderDestination;
use crate::render::renderable::{render_child, Renderable, SlotString};
use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Arbitrary keyed data handed to a slot function
pub type SlotContext = serde_json::Map<String, serde_json::Value>;

/// Slot render function
pub type SlotFn = Arc<
    dyn Fn(RenderContext, SlotContext) -> BoxFuture<'static, TrellisResult<Renderable>>
        + Send
        + Sync,
>;

/// Content supplied for one named slot
pub enum SlotValue {
    Rendered(Renderable),
    Deferred(SlotFn),
}

impl SlotValue {
    /// Wrap an async function of the render context
    pub fn deferred<F>(f: F) -> Self
    where
        F: Fn(RenderContext, SlotContext) -> BoxFuture<'static, TrellisResult<Renderable>>
            + Send
            + Sync
            + 'static,
    {
        Self::Deferred(Arc::new(f))
    }
}

impl From<Renderable> for SlotValue {
    fn from(rendered: Renderable) -> Self {
        Self::Rendered(rendered)
    }
}

/// A slot bound to its render context, ready to write
pub struct RenderInstance {
    ctx: RenderContext,
    slot: SlotValue,
    data: SlotContext,
}

impl RenderInstance {
    /// Data passed to a deferred slot function
    pub fn with_data(mut self, data: SlotContext) -> Self {
        self.data = data;
        self
    }

    /// Evaluate the slot and forward its output into `dest` in order
    pub async fn render(self, dest: &mut dyn RenderDestination) -> TrellisResult<()> {
        let child = match self.slot {
            SlotValue::Rendered(rendered) => rendered,
            SlotValue::Deferred(f) => f(self.ctx, self.data).await?,
        };
        render_child(dest, child).await
    }
}

pub fn render_slot(ctx: &RenderContext, slot: SlotValue) -> RenderInstance {
    RenderInstance {
        ctx: ctx.clone(),
        slot,
        data: SlotContext::new(),
    }
}

/// Private destination that splits text from instructions
#[derive(Default)]
struct SlotCollector {
    content: String,
    instructions: Vec<RenderInstruction>,
}

impl RenderDestination for SlotCollector {
    fn write(&mut self, chunk: RenderChunk) {
        match chunk {
            RenderChunk::Content(text) => self.content.push_str(&text),
            RenderChunk::Instruction(instruction) => self.instructions.push(instruction),
            RenderChunk::Passthrough(response) => {
                debug!("Ignoring {} response written inside a slot", response.status);
            }
        }
    }
}

/// Render a slot into a buffered string, keeping its instructions aside
pub async fn render_slot_to_string(
    ctx: &RenderContext,
    slot: SlotValue,
) -> TrellisResult<SlotString> {
    let mut collector = SlotCollector::default();
    render_slot(ctx, slot).render(&mut collector).await?;
    Ok(SlotString {
        content: collector.content,
        instructions: collector.instructions,
    })
}

/// Every slot of one component, rendered
#[derive(Debug, Default)]
pub struct RenderedSlots {
    /// Instructions from all slots, in the order the slots finished
    pub instructions: Vec<RenderInstruction>,
    pub children: HashMap<String, SlotString>,
}

/// Resolve all slots concurrently.
///
/// The first failing slot fails the whole call and sibling results are
/// dropped. Instruction order across slots follows completion order.
pub async fn render_slots(
    ctx: &RenderContext,
    slots: HashMap<String, SlotValue>,
) -> TrellisResult<RenderedSlots> {
    let mut pending: FuturesUnordered<_> = slots
        .into_iter()
        .map(|(name, slot)| async move {
            let rendered = render_slot_to_string(ctx, slot).await?;
            Ok::<_, crate::error::TrellisError>((name, rendered))
        })
        .collect();

    let mut result = RenderedSlots::default();
    while let Some(finished) = pending.next().await {
        let (name, rendered) = finished?;
        result
            .instructions
            .extend(rendered.instructions.iter().cloned());
        result.children.insert(name, rendered);
    }

    Ok(result)
}
