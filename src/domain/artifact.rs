//! Payload artifact model - tool-ready templates derived from a finding

use serde::{Deserialize, Serialize};

use super::FindingId;

/// Target tool format of an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolFormat {
    /// Intercepting-proxy fuzzer with `§...§` position markers
    Intruder,
    /// Single editable request
    Repeater,
    /// Shell command
    Curl,
    /// Bare HTTP request text
    Raw,
}

impl ToolFormat {
    pub const ALL: [ToolFormat; 4] = [
        ToolFormat::Intruder,
        ToolFormat::Repeater,
        ToolFormat::Curl,
        ToolFormat::Raw,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolFormat::Intruder => "intruder",
            ToolFormat::Repeater => "repeater",
            ToolFormat::Curl => "curl",
            ToolFormat::Raw => "raw",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "intruder" | "burp" | "fuzz" => Some(ToolFormat::Intruder),
            "repeater" | "request" => Some(ToolFormat::Repeater),
            "curl" | "shell" => Some(ToolFormat::Curl),
            "raw" | "http" => Some(ToolFormat::Raw),
            _ => None,
        }
    }
}

impl std::fmt::Display for ToolFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Location of a fuzzing position inside the payload body (byte offsets,
/// `start` points at the opening marker, `end` one past the closing marker)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertionPoint {
    pub parameter: String,
    pub start: usize,
    pub end: usize,
}

/// An inert exploitation template. Purely derived; no lifecycle of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadArtifact {
    /// Deterministic ID: `<finding>:<format>`
    pub id: String,
    pub finding_id: FindingId,
    pub format: ToolFormat,
    pub body: String,
    pub insertion_points: Vec<InsertionPoint>,
    /// Response grep pattern; see the payload generator for capture semantics
    pub grep_pattern: String,
    pub methodology: String,
}

impl PayloadArtifact {
    pub fn artifact_id(finding_id: &str, format: ToolFormat) -> String {
        format!("{finding_id}:{}", format.as_str())
    }
}
