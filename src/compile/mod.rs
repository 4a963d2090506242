//! Template compilation and the compiled-artifact cache
//!
//! Compiled artifacts are cached in two tiers:
//!
//! | Tier | Key | Lifetime |
//! |------|-----|----------|
//! | Memory | configuration identity + filename | Until the configuration is dropped |
//! | Persistent | `compiler-cache-` + sha256(config json + source) | Durable, survives restarts |
//!
//! Persistent-tier failures degrade to a cache miss and never fail a compile.

pub mod artifact;
pub mod cache;
pub mod compiler;
pub mod digest;
pub mod store;
pub mod template;

pub use artifact::{CompiledArtifact, Diagnostic, Directive, Node, Prop, PropValue, Severity, SlotFill};
pub use cache::{CacheStats, CompilationCache};
pub use compiler::{Compiler, TemplateCompiler};
pub use digest::{content_digest, store_key};
pub use store::{ArtifactStore, DiskStore, MemoryStore, StoreEntry, StoredArtifact};
pub use template::DEFAULT_SLOT;
