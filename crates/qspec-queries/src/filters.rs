//! Filter Model
//!
//! The flat, string-based filter form used for externally supplied criteria.
//! A filter model is pure data: a search term, field/operator/value triples,
//! AND/OR groups of triples, and sort requests. Operators stay textual until
//! compilation so that unknown operators are reported by the compiler.

use serde::{Deserialize, Serialize};

use crate::sorts::{SortDirection, SortItem};

/// Canonical filter operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    Contains,
    StartsWith,
    EndsWith,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    IsNull,
    IsNotNull,
    IsEmpty,
    IsNotEmpty,
    In,
    NotIn,
}

impl FilterOperator {
    pub const ALL: [FilterOperator; 15] = [
        Self::Equals,
        Self::NotEquals,
        Self::Contains,
        Self::StartsWith,
        Self::EndsWith,
        Self::GreaterThan,
        Self::GreaterOrEqual,
        Self::LessThan,
        Self::LessOrEqual,
        Self::IsNull,
        Self::IsNotNull,
        Self::IsEmpty,
        Self::IsNotEmpty,
        Self::In,
        Self::NotIn,
    ];

    /// Resolve an operator name or alias.
    ///
    /// Matching ignores case, dashes, underscores and spaces, so
    /// `greater-or-equal`, `GreaterOrEqual` and `greater_or_equal` all
    /// resolve, as do the short and symbolic aliases (`gte`, `>=`).
    pub fn resolve(s: &str) -> Option<Self> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .flat_map(char::to_lowercase)
            .collect();

        match normalized.as_str() {
            "equals" | "equal" | "eq" | "=" | "==" => Some(Self::Equals),
            "notequals" | "notequal" | "ne" | "neq" | "!=" | "<>" => Some(Self::NotEquals),
            "contains" | "like" | "~" => Some(Self::Contains),
            "startswith" | "sw" => Some(Self::StartsWith),
            "endswith" | "ew" => Some(Self::EndsWith),
            "greaterthan" | "gt" | ">" => Some(Self::GreaterThan),
            "greaterorequal" | "greaterthanorequal" | "gte" | "ge" | ">=" => {
                Some(Self::GreaterOrEqual)
            }
            "lessthan" | "lt" | "<" => Some(Self::LessThan),
            "lessorequal" | "lessthanorequal" | "lte" | "le" | "<=" => Some(Self::LessOrEqual),
            "isnull" | "null" => Some(Self::IsNull),
            "isnotnull" | "notnull" => Some(Self::IsNotNull),
            "isempty" | "empty" => Some(Self::IsEmpty),
            "isnotempty" | "notempty" => Some(Self::IsNotEmpty),
            "in" => Some(Self::In),
            "notin" | "nin" => Some(Self::NotIn),
            _ => None,
        }
    }

    /// Canonical name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not-equals",
            Self::Contains => "contains",
            Self::StartsWith => "starts-with",
            Self::EndsWith => "ends-with",
            Self::GreaterThan => "greater-than",
            Self::GreaterOrEqual => "greater-or-equal",
            Self::LessThan => "less-than",
            Self::LessOrEqual => "less-or-equal",
            Self::IsNull => "is-null",
            Self::IsNotNull => "is-not-null",
            Self::IsEmpty => "is-empty",
            Self::IsNotEmpty => "is-not-empty",
            Self::In => "in",
            Self::NotIn => "not-in",
        }
    }

    /// Check if this operator requires a value
    pub fn requires_value(&self) -> bool {
        !matches!(
            self,
            Self::IsNull | Self::IsNotNull | Self::IsEmpty | Self::IsNotEmpty
        )
    }

    pub fn is_set(&self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::Contains | Self::StartsWith | Self::EndsWith)
    }
}

/// A single field/operator/value triple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterItem {
    /// Field name or dotted path (e.g. "Customer.Name")
    pub field: String,
    /// Operator name or alias
    pub operator: String,
    /// Culture-invariant textual value; comma-separated for set operators
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl FilterItem {
    /// Create a filter with a canonical operator
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator: operator.as_str().to_string(),
            value: Some(value.into()),
        }
    }

    /// Create a filter from raw, unvalidated parts
    pub fn raw(field: impl Into<String>, operator: impl Into<String>, value: Option<String>) -> Self {
        Self {
            field: field.into(),
            operator: operator.into(),
            value,
        }
    }

    /// Create a filter for an operator that takes no value
    pub fn valueless(field: impl Into<String>, operator: FilterOperator) -> Self {
        Self {
            field: field.into(),
            operator: operator.as_str().to_string(),
            value: None,
        }
    }

    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::Equals, value)
    }

    pub fn contains(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::Contains, value)
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Self::valueless(field, FilterOperator::IsNull)
    }

    /// Membership test against a list of values
    pub fn one_of<I, S>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = values
            .into_iter()
            .map(|v| v.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(",");
        Self::new(field, FilterOperator::In, joined)
    }
}

/// How members of a group combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterLogic {
    #[default]
    #[serde(alias = "AND", alias = "And")]
    And,
    #[serde(alias = "OR", alias = "Or")]
    Or,
}

/// A group of filters combined with one logic
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterGroup {
    #[serde(default)]
    pub logic: FilterLogic,
    #[serde(default)]
    pub items: Vec<FilterItem>,
}

impl FilterGroup {
    pub fn and(items: Vec<FilterItem>) -> Self {
        Self {
            logic: FilterLogic::And,
            items,
        }
    }

    pub fn or(items: Vec<FilterItem>) -> Self {
        Self {
            logic: FilterLogic::Or,
            items,
        }
    }
}

/// The complete filter model as received from a caller
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_term: Option<String>,
    #[serde(default)]
    pub items: Vec<FilterItem>,
    #[serde(default)]
    pub groups: Vec<FilterGroup>,
    #[serde(default)]
    pub sorts: Vec<SortItem>,
}

impl FilterModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the global search term
    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search_term = Some(term.into());
        self
    }

    /// Add a filter item (builder pattern)
    pub fn with(mut self, item: FilterItem) -> Self {
        self.items.push(item);
        self
    }

    /// Add a filter from its parts
    pub fn where_field(
        self,
        field: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<String>,
    ) -> Self {
        self.with(FilterItem::new(field, operator, value))
    }

    /// Add a group of filters
    pub fn group(mut self, group: FilterGroup) -> Self {
        self.groups.push(group);
        self
    }

    /// Add a sort request
    pub fn sort_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sorts.push(SortItem::new(field, direction));
        self
    }

    /// True when the model constrains nothing
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
            && self.groups.iter().all(|g| g.items.is_empty())
            && self
                .search_term
                .as_deref()
                .map_or(true, |t| t.trim().is_empty())
    }

    /// Total number of filter items, including grouped ones
    pub fn item_count(&self) -> usize {
        self.items.len() + self.groups.iter().map(|g| g.items.len()).sum::<usize>()
    }
}
