//! Filter Expression Compiler
//!
//! Turns a [`FilterModel`] into a [`Predicate`] over an entity type.
//!
//! Field names arrive from untrusted callers, so every name is checked
//! against the entity schema and anything that does not resolve compiles to
//! a constant non-match. Operators, on the other hand, are chosen by the
//! developer wiring the endpoint, so an unknown operator is an error.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use qspec_core::{
    Entity, FieldDescriptor, FieldType, ParseFailurePolicy, QueryConfig, QueryError, QueryResult,
    ResolvedField, Value,
};
use regex::Regex;
use tracing::debug;
use uuid::Uuid;

use crate::filters::{FilterGroup, FilterItem, FilterLogic, FilterModel, FilterOperator};
use crate::predicate::{CompareOp, Expr, Predicate, TextOp};
use crate::sorts::{SortCriterion, SortItem};

static FIELD_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9.]*$").expect("field name pattern is valid")
});

/// Check a field name against the accepted syntax
pub fn is_valid_field_name(name: &str) -> bool {
    FIELD_NAME.is_match(name)
}

/// Compiles filter models against entity schemas
#[derive(Debug, Clone, Default)]
pub struct FilterCompiler {
    config: QueryConfig,
}

impl FilterCompiler {
    pub fn new(config: QueryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Compile a whole filter model.
    ///
    /// Flat items, groups and the search term are AND-combined. An empty
    /// model yields the identity predicate.
    pub fn compile<T: Entity>(&self, model: &FilterModel) -> QueryResult<Predicate<T>> {
        // Operators are checked up front so a bad operator is always reported
        let flat = resolve_operators(&model.items)?;
        let grouped = model
            .groups
            .iter()
            .map(|g| resolve_operators(&g.items).map(|ops| (g, ops)))
            .collect::<QueryResult<Vec<_>>>()?;

        if let Some(reason) = self.oversized(model) {
            debug!(entity = T::type_name(), reason, "Filter payload exceeds limits");
            return Ok(Predicate::never());
        }

        let mut parts = Vec::with_capacity(model.items.len() + model.groups.len() + 1);
        for (item, op) in model.items.iter().zip(flat) {
            parts.push(self.compile_resolved::<T>(item, op));
        }
        for (group, ops) in grouped {
            parts.push(self.compile_group::<T>(group, ops));
        }
        if let Some(term) = model.search_term.as_deref() {
            parts.push(self.search_expr::<T>(term));
        }

        Ok(Predicate::from_expr(Expr::all(parts)))
    }

    /// Compile a single filter item
    pub fn compile_item<T: Entity>(&self, item: &FilterItem) -> QueryResult<Predicate<T>> {
        let op = resolve_operator(&item.operator)?;
        Ok(Predicate::from_expr(self.compile_resolved::<T>(item, op)))
    }

    /// The global search constraint for `term`
    pub fn compile_search<T: Entity>(&self, term: &str) -> Predicate<T> {
        Predicate::from_expr(self.search_expr::<T>(term))
    }

    /// Resolve sort requests, silently dropping unknown fields
    pub fn compile_sorts<T: Entity>(&self, sorts: &[SortItem]) -> Vec<SortCriterion> {
        sorts
            .iter()
            .filter_map(|sort| match resolve_field::<T>(&sort.field) {
                Some(resolved) => Some(SortCriterion::new(resolved.path, sort.direction)),
                None => {
                    debug!(entity = T::type_name(), field = %sort.field, "Dropping sort on unknown field");
                    None
                }
            })
            .collect()
    }

    fn oversized(&self, model: &FilterModel) -> Option<&'static str> {
        let limits = &self.config;
        if model.items.len() > limits.max_filter_items {
            return Some("too many filter items");
        }
        if model.groups.len() > limits.max_filter_groups {
            return Some("too many filter groups");
        }
        if model.groups.iter().any(|g| g.items.len() > limits.max_group_items) {
            return Some("too many items in a group");
        }
        None
    }

    fn compile_group<T: Entity>(&self, group: &FilterGroup, ops: Vec<FilterOperator>) -> Expr {
        let members = group
            .items
            .iter()
            .zip(ops)
            .map(|(item, op)| self.compile_resolved::<T>(item, op));
        match group.logic {
            FilterLogic::And => Expr::all(members),
            // An empty OR group constrains nothing
            FilterLogic::Or if group.items.is_empty() => Expr::TRUE,
            FilterLogic::Or => Expr::any(members),
        }
    }

    fn search_expr<T: Entity>(&self, term: &str) -> Expr {
        let term = term.trim();
        if term.is_empty() {
            return Expr::TRUE;
        }
        if term.len() > self.config.max_value_length {
            debug!(entity = T::type_name(), "Search term exceeds maximum length");
            return Expr::FALSE;
        }

        let fields = T::schema().string_fields();
        if fields.is_empty() {
            return Expr::TRUE;
        }
        Expr::any(
            fields
                .into_iter()
                .map(|f| Expr::text(f, TextOp::Contains, term)),
        )
    }

    fn compile_resolved<T: Entity>(&self, item: &FilterItem, op: FilterOperator) -> Expr {
        let Some(resolved) = resolve_field::<T>(&item.field) else {
            debug!(entity = T::type_name(), field = %item.field, "Unknown filter field, matching nothing");
            return Expr::FALSE;
        };

        let text = item.value.as_deref().unwrap_or("");
        if op.requires_value() && text.len() > self.config.max_value_length {
            debug!(field = %resolved.path, "Filter value exceeds maximum length");
            return Expr::FALSE;
        }

        let descriptor = resolved.descriptor;
        let path = resolved.path.clone();

        match op {
            FilterOperator::IsNull | FilterOperator::IsNotNull => {
                let negated = op == FilterOperator::IsNotNull;
                if resolved.nullable {
                    Expr::null(path, negated)
                } else {
                    Expr::constant(negated)
                }
            }
            FilterOperator::IsEmpty | FilterOperator::IsNotEmpty => {
                if descriptor.field_type.is_string() {
                    Expr::empty(path, op == FilterOperator::IsNotEmpty)
                } else {
                    Expr::FALSE
                }
            }
            FilterOperator::Contains | FilterOperator::StartsWith | FilterOperator::EndsWith => {
                if !descriptor.field_type.is_string() {
                    return Expr::FALSE;
                }
                let text_op = match op {
                    FilterOperator::Contains => TextOp::Contains,
                    FilterOperator::StartsWith => TextOp::StartsWith,
                    _ => TextOp::EndsWith,
                };
                Expr::text(path, text_op, text)
            }
            FilterOperator::In | FilterOperator::NotIn => {
                let tokens: Vec<&str> = text
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .collect();
                if tokens.len() > self.config.max_set_values {
                    debug!(field = %path, count = tokens.len(), "Set filter has too many values");
                    return Expr::FALSE;
                }
                let mut values = Vec::with_capacity(tokens.len());
                for token in tokens {
                    match self.coerce(descriptor, token) {
                        Some(value) => values.push(value),
                        None => return Expr::FALSE,
                    }
                }
                Expr::one_of(path, values, op == FilterOperator::NotIn)
            }
            FilterOperator::Equals
            | FilterOperator::NotEquals
            | FilterOperator::GreaterThan
            | FilterOperator::GreaterOrEqual
            | FilterOperator::LessThan
            | FilterOperator::LessOrEqual => {
                let Some(value) = self.coerce(descriptor, text) else {
                    return Expr::FALSE;
                };
                let compare = match op {
                    FilterOperator::Equals => CompareOp::Eq,
                    FilterOperator::NotEquals => CompareOp::Ne,
                    FilterOperator::GreaterThan => CompareOp::Gt,
                    FilterOperator::GreaterOrEqual => CompareOp::Ge,
                    FilterOperator::LessThan => CompareOp::Lt,
                    _ => CompareOp::Le,
                };
                Expr::compare(path, compare, value)
            }
        }
    }

    /// Coerce text to the field's type, applying the parse-failure policy.
    ///
    /// `None` means the condition cannot match.
    fn coerce(&self, descriptor: &FieldDescriptor, text: &str) -> Option<Value> {
        if let FieldType::Object(_) = descriptor.field_type {
            return None;
        }
        match parse_value(descriptor.field_type, text) {
            Some(value) => Some(value),
            None => {
                debug!(field = descriptor.name, value = text, "Unparsable filter value");
                match self.config.parse_failure {
                    ParseFailurePolicy::DefaultValue => Some(default_value(descriptor.field_type)),
                    ParseFailurePolicy::NoMatch => None,
                }
            }
        }
    }
}

/// Compile with the default configuration
pub fn compile_filter<T: Entity>(model: &FilterModel) -> QueryResult<Predicate<T>> {
    FilterCompiler::default().compile(model)
}

fn resolve_operator(operator: &str) -> QueryResult<FilterOperator> {
    FilterOperator::resolve(operator).ok_or_else(|| QueryError::unknown_operator(operator))
}

fn resolve_operators(items: &[FilterItem]) -> QueryResult<Vec<FilterOperator>> {
    items.iter().map(|i| resolve_operator(&i.operator)).collect()
}

fn resolve_field<T: Entity>(name: &str) -> Option<ResolvedField> {
    if !is_valid_field_name(name) {
        return None;
    }
    T::schema().resolve_path(name)
}

/// Culture-invariant parse of `text` as a value of `field_type`
pub fn parse_value(field_type: FieldType, text: &str) -> Option<Value> {
    let text = text.trim();
    match field_type {
        FieldType::String => Some(Value::String(text.to_string())),
        FieldType::Integer => text.parse::<i64>().ok().map(Value::Integer),
        FieldType::Float => text
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(Value::Float),
        FieldType::Boolean => match text.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(Value::Bool(true)),
            "false" | "0" | "no" => Some(Value::Bool(false)),
            _ => None,
        },
        FieldType::DateTime => parse_datetime(text).map(Value::DateTime),
        FieldType::Date => NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .ok()
            .map(Value::Date),
        FieldType::Uuid => Uuid::parse_str(text).ok().map(Value::Uuid),
        FieldType::Enum(variants) => variants
            .iter()
            .find(|v| v.eq_ignore_ascii_case(text))
            .map(|v| Value::String(v.to_string())),
        FieldType::Object(_) => None,
    }
}

fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// The value substituted for unparsable text under the lenient policy
pub fn default_value(field_type: FieldType) -> Value {
    match field_type {
        FieldType::String => Value::String(String::new()),
        FieldType::Integer => Value::Integer(0),
        FieldType::Float => Value::Float(0.0),
        FieldType::Boolean => Value::Bool(false),
        FieldType::DateTime => Value::DateTime(DateTime::<Utc>::UNIX_EPOCH),
        FieldType::Date => Value::Date(DateTime::<Utc>::UNIX_EPOCH.date_naive()),
        FieldType::Uuid => Value::Uuid(Uuid::nil()),
        FieldType::Enum(variants) => variants
            .first()
            .map_or(Value::Null, |v| Value::String(v.to_string())),
        FieldType::Object(_) => Value::Null,
    }
}
