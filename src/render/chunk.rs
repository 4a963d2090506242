//! Values written to a render destination

use crate::app::Response;
use serde::{Deserialize, Serialize};

/// Out-of-band directive carried alongside textual output.
///
/// Serialized with a string `type` discriminator so a buffered slot can
/// hand its instructions to the parent stream without touching the text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RenderInstruction {
    /// Register the loader for one client hydration directive
    Directive { directive: String },
    /// Load the island runtime
    HydrationScript,
    /// Head content for the page
    Head { styles: Vec<String> },
}

/// One write into a destination
#[derive(Debug)]
pub enum RenderChunk {
    /// Markup, already escaped where needed
    Content(String),
    /// Structured out-of-band instruction
    Instruction(RenderInstruction),
    /// A complete response that replaces the page, not content
    Passthrough(Response),
}

impl RenderChunk {
    pub fn is_instruction(&self) -> bool {
        matches!(self, Self::Instruction(_))
    }
}

impl From<RenderInstruction> for RenderChunk {
    fn from(instruction: RenderInstruction) -> Self {
        Self::Instruction(instruction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn instruction_serializes_with_type_tag() {
        let value = serde_json::to_value(RenderInstruction::Directive {
            directive: "idle".into(),
        })
        .unwrap();
        assert_eq!(value, json!({"type": "directive", "directive": "idle"}));

        let value = serde_json::to_value(RenderInstruction::HydrationScript).unwrap();
        assert_eq!(value, json!({"type": "hydration-script"}));
    }

    #[test]
    fn tagged_records_parse_as_instructions() {
        let parsed: RenderInstruction =
            serde_json::from_value(json!({"type": "head", "styles": ["a.css"]})).unwrap();
        assert!(RenderChunk::from(parsed.clone()).is_instruction());
        assert_eq!(
            parsed,
            RenderInstruction::Head {
                styles: vec!["a.css".into()]
            }
        );
        assert!(serde_json::from_value::<RenderInstruction>(json!({"type": "unknown"})).is_err());
    }
}
