//! Vulnerability categories (one per analysis module)

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Category of vulnerability research.
///
/// Built-in categories map to the built-in modules; `Custom` covers
/// operator-registered modules and is keyed by its lowercase name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Idor,
    AuthBypass,
    BusinessLogic,
    CryptoSpecific,
    Custom(String),
}

impl Category {
    pub fn as_str(&self) -> &str {
        match self {
            Category::Idor => "idor",
            Category::AuthBypass => "auth_bypass",
            Category::BusinessLogic => "business_logic",
            Category::CryptoSpecific => "crypto_specific",
            Category::Custom(name) => name.as_str(),
        }
    }

    /// Parse a category name. Unknown non-empty names become `Custom`.
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        match normalized.as_str() {
            "" => None,
            "idor" | "bola" => Some(Category::Idor),
            "auth_bypass" | "auth" | "authbypass" => Some(Category::AuthBypass),
            "business_logic" | "logic" | "businesslogic" => Some(Category::BusinessLogic),
            "crypto_specific" | "crypto" | "cryptospecific" => Some(Category::CryptoSpecific),
            _ => Some(Category::Custom(normalized)),
        }
    }

    /// Human-readable label used in reports
    pub fn label(&self) -> String {
        match self {
            Category::Idor => "Insecure Direct Object Reference".to_string(),
            Category::AuthBypass => "Authentication Bypass".to_string(),
            Category::BusinessLogic => "Business Logic".to_string(),
            Category::CryptoSpecific => "Cryptocurrency Platform".to_string(),
            Category::Custom(name) => format!("Custom ({name})"),
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Category::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom("category name must not be empty"))
    }
}
