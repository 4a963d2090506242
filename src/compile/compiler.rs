//! Compiler boundary
//!
//! The cache treats compilation as an opaque, side-effect-free function of
//! `(configuration, filename, source)`. Duplicate concurrent invocations for
//! the same input are allowed and must converge on equal artifacts.

use crate::compile::artifact::CompiledArtifact;
use crate::compile::template::parse_template;
use crate::config::SiteConfig;
use crate::error::TrellisResult;
use async_trait::async_trait;
use tracing::warn;

/// Abstract template compiler
#[async_trait]
pub trait Compiler: Send + Sync {
    /// Compile one template. Fails only with `TrellisError::Compile`.
    async fn compile(
        &self,
        config: &SiteConfig,
        filename: &str,
        source: &str,
    ) -> TrellisResult<CompiledArtifact>;
}

/// Compiler for the built-in template syntax
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateCompiler;

impl TemplateCompiler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Compiler for TemplateCompiler {
    async fn compile(
        &self,
        config: &SiteConfig,
        filename: &str,
        source: &str,
    ) -> TrellisResult<CompiledArtifact> {
        let parsed = parse_template(filename, source, config.compress_html)?;

        for diagnostic in &parsed.diagnostics {
            warn!("{}:{}: {}", filename, diagnostic.line, diagnostic.message);
        }

        Ok(CompiledArtifact {
            filename: filename.to_string(),
            frontmatter: parsed.frontmatter,
            program: parsed.program,
            css_deps: parsed.css_deps,
            diagnostics: parsed.diagnostics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrellisError;

    #[tokio::test]
    async fn compiles_template() {
        let artifact = TemplateCompiler::new()
            .compile(&SiteConfig::default(), "page.tmpl", "<h1>Hi</h1>")
            .await
            .unwrap();

        assert_eq!(artifact.filename, "page.tmpl");
        assert_eq!(artifact.program.len(), 1);
        assert!(artifact.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn config_changes_output() {
        let source = "<p>\n  spaced\n</p>";
        let mut config = SiteConfig::default();
        let compressed = TemplateCompiler.compile(&config, "p", source).await.unwrap();

        config.compress_html = false;
        let verbatim = TemplateCompiler.compile(&config, "p", source).await.unwrap();

        assert_ne!(compressed.program, verbatim.program);
    }

    #[tokio::test]
    async fn reports_compile_errors() {
        let err = TemplateCompiler
            .compile(&SiteConfig::default(), "bad.tmpl", "{% if x %}")
            .await
            .unwrap_err();

        assert!(matches!(err, TrellisError::Compile { ref filename, .. } if filename == "bad.tmpl"));
    }
}
