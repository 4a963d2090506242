//! Top-level application of render instructions
//!
//! Turns the chunk stream of a page into body bytes. Instructions are
//! rendered at most once per page: the island runtime, each hydration
//! directive, and the first head instruction.

use crate::config::SiteConfig;
use crate::render::chunk::{RenderChunk, RenderInstruction};
use bytes::Bytes;
use std::collections::HashSet;
use tracing::warn;

/// Client runtime that hydrates `<trellis-island>` elements
const ISLAND_RUNTIME: &str = r#"<script>(()=>{const T=self.Trellis||(self.Trellis={});customElements.define("trellis-island",class extends HTMLElement{connectedCallback(){const d=T[this.getAttribute("client")]||(l=>l());d(()=>import(this.getAttribute("component-url")).then(m=>m.default&&m.default(this,JSON.parse(this.getAttribute("props")||"{}"))),this)}})})();</script>"#;

/// Loader script for one hydration directive
fn directive_script(directive: &str) -> String {
    let body = match directive {
        "idle" => r#"l=>("requestIdleCallback" in self?requestIdleCallback(l):setTimeout(l,200))"#,
        "visible" => {
            r#"(l,el)=>{const o=new IntersectionObserver(e=>{if(e.some(x=>x.isIntersecting)){o.disconnect();l()}});o.observe(el)}"#
        }
        "media" => {
            r#"(l,el)=>{const q=matchMedia(el.getAttribute("media")||"all");q.matches?l():q.addEventListener("change",l,{once:true})}"#
        }
        _ => "l=>l()",
    };
    format!(
        r#"<script>(self.Trellis||(self.Trellis={{}}))[{}]={};</script>"#,
        serde_json::Value::String(directive.to_string()),
        body
    )
}

/// Per-page encoder from chunks to body bytes
pub struct PageEncoder {
    site: SiteConfig,
    runtime_written: bool,
    head_written: bool,
    directives: HashSet<String>,
}

impl PageEncoder {
    pub fn new(site: SiteConfig) -> Self {
        Self {
            site,
            runtime_written: false,
            head_written: false,
            directives: HashSet::new(),
        }
    }

    /// Bytes for one chunk, or `None` when it renders to nothing
    pub fn encode(&mut self, chunk: RenderChunk) -> Option<Bytes> {
        let text = match chunk {
            RenderChunk::Content(text) => text,
            RenderChunk::Instruction(instruction) => self.apply(instruction)?,
            RenderChunk::Passthrough(response) => {
                warn!(
                    "Dropping {} response produced after the page started streaming",
                    response.status
                );
                return None;
            }
        };
        (!text.is_empty()).then(|| Bytes::from(text))
    }

    fn apply(&mut self, instruction: RenderInstruction) -> Option<String> {
        match instruction {
            RenderInstruction::HydrationScript if !self.runtime_written => {
                self.runtime_written = true;
                Some(ISLAND_RUNTIME.to_string())
            }
            RenderInstruction::Directive { directive } => self
                .directives
                .insert(directive.clone())
                .then(|| directive_script(&directive)),
            RenderInstruction::Head { styles } if !self.head_written => {
                self.head_written = true;
                Some(
                    styles
                        .iter()
                        .map(|href| {
                            format!(
                                r#"<link rel="stylesheet" href="{}">"#,
                                crate::render::escape_html(&self.site.asset_url(href))
                            )
                        })
                        .collect(),
                )
            }
            _ => None,
        }
    }
}
