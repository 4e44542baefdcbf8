//! Sort Orders
//!
//! Sort orders define how query results should be ordered. `SortItem` is the
//! raw, user-supplied form carried by a filter model; `SortCriterion` is the
//! resolved form held by a specification, with the field's declared casing.

use serde::{Deserialize, Serialize};

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Ascending order (A-Z, 1-9, oldest first)
    #[default]
    #[serde(alias = "asc", alias = "Ascending", alias = "ASC")]
    Ascending,
    /// Descending order (Z-A, 9-1, newest first)
    #[serde(alias = "desc", alias = "Descending", alias = "DESC")]
    Descending,
}

impl SortDirection {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "asc" | "ascending" => Some(Self::Ascending),
            "desc" | "descending" => Some(Self::Descending),
            _ => None,
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ascending => "asc",
            Self::Descending => "desc",
        }
    }

    /// Get the opposite direction
    pub fn reverse(&self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }

    pub fn is_ascending(&self) -> bool {
        matches!(self, Self::Ascending)
    }
}

/// A sort request from a filter model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortItem {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortItem {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    pub fn asc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Ascending)
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Descending)
    }
}

/// A resolved sort key on a specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortCriterion {
    /// Canonical field path
    pub field: String,
    pub direction: SortDirection,
}

impl SortCriterion {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    /// Reverse the sort direction
    pub fn reversed(mut self) -> Self {
        self.direction = self.direction.reverse();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_direction() {
        assert_eq!(SortDirection::from_str("asc"), Some(SortDirection::Ascending));
        assert_eq!(SortDirection::from_str("DESC"), Some(SortDirection::Descending));
        assert_eq!(SortDirection::from_str("sideways"), None);
        assert_eq!(SortDirection::Ascending.reverse(), SortDirection::Descending);
    }

    #[test]
    fn test_sort_item_deserialize_aliases() {
        let item: SortItem = serde_json::from_str(r#"{"field":"Price","direction":"desc"}"#).unwrap();
        assert_eq!(item, SortItem::desc("Price"));

        let item: SortItem = serde_json::from_str(r#"{"field":"Name"}"#).unwrap();
        assert_eq!(item.direction, SortDirection::Ascending);
    }

    #[test]
    fn test_sort_criterion_reversed() {
        let criterion = SortCriterion::new("CreatedAt", SortDirection::Ascending).reversed();
        assert_eq!(criterion.direction, SortDirection::Descending);
    }
}
