use serde::{Deserialize, Serialize};

/// One entry of the upstream symbol catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolInfo {
    /// Listing code (e.g., "7203").
    pub code: String,
    /// Company name.
    pub name: String,
    /// Sector label, when the upstream provides one.
    pub sector: Option<String>,
}
