//! Graph Schema
//!
//! Labels, unique node indexes and relationship types written by the
//! subgraph builder.

use regex::Regex;

// ============================================================================
// Node Labels
// ============================================================================

pub const NPI_LABEL: &str = "Npi";
pub const NAME_LABEL: &str = "Name";
pub const ADDRESS_LABEL: &str = "Address";
pub const LICENSE_LABEL: &str = "License";
pub const IDENTIFIER_LABEL: &str = "Identifier";

// ============================================================================
// Node Indexes
// ============================================================================

/// A store-wide unique node index: nodes under `name` are unique by the
/// value of `key`. `label` is used by stores that index by label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeIndex {
    pub name: &'static str,
    pub key: &'static str,
    pub label: &'static str,
}

pub const PROVIDERS: NodeIndex = NodeIndex {
    name: "providers",
    key: "npi",
    label: "Provider",
};

pub const ZIPCODES: NodeIndex = NodeIndex {
    name: "zipcodes",
    key: "code",
    label: "Zipcode",
};

/// Keyed by `"<city>, <state>"`
pub const CITIES: NodeIndex = NodeIndex {
    name: "cities",
    key: "name",
    label: "City",
};

pub const STATES: NodeIndex = NodeIndex {
    name: "states",
    key: "code",
    label: "State",
};

pub const ALL_NODE_INDEXES: [NodeIndex; 4] = [PROVIDERS, ZIPCODES, CITIES, STATES];

// ============================================================================
// Relationship Types
// ============================================================================

pub const HAS_NPI: &str = "has_npi";
pub const HAS_NAME: &str = "has_name";
pub const HAS_ADDRESS: &str = "has_address";
pub const IN_ZIPCODE: &str = "in_zipcode";
pub const IN_CITY: &str = "in_city";
pub const IN_STATE: &str = "in_state";

/// Property under which a relationship's composite key is indexed
pub const RELATIONSHIP_INDEX_KEY: &str = "composite_key";

/// License and other-identifier sub-records share one wiring pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityGroup {
    License,
    Identifier,
}

impl EntityGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityGroup::License => "license",
            EntityGroup::Identifier => "identifier",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EntityGroup::License => LICENSE_LABEL,
            EntityGroup::Identifier => IDENTIFIER_LABEL,
        }
    }

    /// `has_license` / `has_identifier`
    pub fn has_relationship(&self) -> String {
        format!("has_{}", self.as_str())
    }

    /// `license_in_state` / `identifier_in_state`
    pub fn state_relationship(&self) -> String {
        format!("{}_in_state", self.as_str())
    }
}

// ============================================================================
// State Codes
// ============================================================================

/// Accepts exactly two uppercase ASCII letters
pub struct StateCodeMatcher {
    pattern: Regex,
}

impl StateCodeMatcher {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(r"^[A-Z]{2}$")?,
        })
    }

    pub fn is_valid(&self, state: &str) -> bool {
        self.pattern.is_match(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_code_validity() {
        let matcher = StateCodeMatcher::new().unwrap();

        assert!(matcher.is_valid("CA"));
        assert!(!matcher.is_valid("ca"));
        assert!(!matcher.is_valid("California"));
        assert!(!matcher.is_valid(""));
        assert!(!matcher.is_valid("C1"));
        assert!(!matcher.is_valid("CA "));
    }

    #[test]
    fn test_entity_group_relationship_names() {
        assert_eq!(EntityGroup::License.has_relationship(), "has_license");
        assert_eq!(EntityGroup::Identifier.state_relationship(), "identifier_in_state");
    }
}
