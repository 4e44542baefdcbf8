//! Predicates
//!
//! A predicate is a serializable boolean expression tree over entity fields.
//! [`Predicate<T>`] ties an [`Expr`] to the entity type it was compiled for.
//! Constructors fold constants so that an empty filter really is the identity
//! predicate and a single non-matching branch collapses an AND.

use std::fmt;
use std::marker::PhantomData;

use qspec_core::{Entity, EntitySchema, Value};
use serde::{Deserialize, Serialize};

/// Ordered comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
        }
    }
}

/// Case-insensitive text matching operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TextOp {
    Contains,
    StartsWith,
    EndsWith,
}

impl TextOp {
    fn keyword(&self) -> &'static str {
        match self {
            TextOp::Contains => "contains",
            TextOp::StartsWith => "starts with",
            TextOp::EndsWith => "ends with",
        }
    }
}

/// Untyped predicate expression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Expr {
    Const {
        value: bool,
    },
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    Text {
        field: String,
        op: TextOp,
        value: String,
    },
    Null {
        field: String,
        negated: bool,
    },
    Empty {
        field: String,
        negated: bool,
    },
    In {
        field: String,
        values: Vec<Value>,
        negated: bool,
    },
    And {
        operands: Vec<Expr>,
    },
    Or {
        operands: Vec<Expr>,
    },
    Not {
        operand: Box<Expr>,
    },
}

impl Expr {
    pub const TRUE: Expr = Expr::Const { value: true };
    pub const FALSE: Expr = Expr::Const { value: false };

    pub fn constant(value: bool) -> Self {
        Expr::Const { value }
    }

    pub fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Expr::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn text(field: impl Into<String>, op: TextOp, value: impl Into<String>) -> Self {
        Expr::Text {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn null(field: impl Into<String>, negated: bool) -> Self {
        Expr::Null {
            field: field.into(),
            negated,
        }
    }

    pub fn empty(field: impl Into<String>, negated: bool) -> Self {
        Expr::Empty {
            field: field.into(),
            negated,
        }
    }

    /// Membership test; an empty list makes `in` false and `not in` true
    pub fn one_of(field: impl Into<String>, values: Vec<Value>, negated: bool) -> Self {
        if values.is_empty() {
            return Expr::constant(negated);
        }
        Expr::In {
            field: field.into(),
            values,
            negated,
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Expr::Const { value: true })
    }

    pub fn is_false(&self) -> bool {
        matches!(self, Expr::Const { value: false })
    }

    /// AND-combine, folding constants and flattening nested ANDs
    pub fn and(self, other: Expr) -> Expr {
        Expr::all([self, other])
    }

    /// OR-combine, folding constants and flattening nested ORs
    pub fn or(self, other: Expr) -> Expr {
        Expr::any([self, other])
    }

    pub fn negate(self) -> Expr {
        match self {
            Expr::Const { value } => Expr::constant(!value),
            Expr::Not { operand } => *operand,
            other => Expr::Not {
                operand: Box::new(other),
            },
        }
    }

    /// AND of every expression; the empty conjunction is `true`
    pub fn all<I: IntoIterator<Item = Expr>>(exprs: I) -> Expr {
        let mut operands = Vec::new();
        for expr in exprs {
            match expr {
                Expr::Const { value: true } => {}
                Expr::Const { value: false } => return Expr::FALSE,
                Expr::And { operands: inner } => operands.extend(inner),
                other => operands.push(other),
            }
        }
        match operands.len() {
            0 => Expr::TRUE,
            1 => operands.remove(0),
            _ => Expr::And { operands },
        }
    }

    /// OR of every expression; the empty disjunction is `false`
    pub fn any<I: IntoIterator<Item = Expr>>(exprs: I) -> Expr {
        let mut operands = Vec::new();
        for expr in exprs {
            match expr {
                Expr::Const { value: false } => {}
                Expr::Const { value: true } => return Expr::TRUE,
                Expr::Or { operands: inner } => operands.extend(inner),
                other => operands.push(other),
            }
        }
        match operands.len() {
            0 => Expr::FALSE,
            1 => operands.remove(0),
            _ => Expr::Or { operands },
        }
    }

    /// Evaluate against a field accessor taking canonical paths
    pub fn evaluate<F>(&self, get: &F) -> bool
    where
        F: Fn(&str) -> Value + ?Sized,
    {
        match self {
            Expr::Const { value } => *value,
            Expr::Compare { field, op, value } => {
                let actual = get(field);
                match op {
                    CompareOp::Eq => actual.loosely_equals(value),
                    CompareOp::Ne => !actual.loosely_equals(value),
                    CompareOp::Gt => actual.compare(value).is_some_and(|o| o.is_gt()),
                    CompareOp::Ge => actual.compare(value).is_some_and(|o| o.is_ge()),
                    CompareOp::Lt => actual.compare(value).is_some_and(|o| o.is_lt()),
                    CompareOp::Le => actual.compare(value).is_some_and(|o| o.is_le()),
                }
            }
            Expr::Text { field, op, value } => match get(field) {
                Value::String(actual) => {
                    let actual = actual.to_lowercase();
                    let needle = value.to_lowercase();
                    match op {
                        TextOp::Contains => actual.contains(&needle),
                        TextOp::StartsWith => actual.starts_with(&needle),
                        TextOp::EndsWith => actual.ends_with(&needle),
                    }
                }
                _ => false,
            },
            Expr::Null { field, negated } => get(field).is_null() != *negated,
            Expr::Empty { field, negated } => {
                let empty = match get(field) {
                    Value::Null => true,
                    Value::String(s) => s.is_empty(),
                    _ => false,
                };
                empty != *negated
            }
            Expr::In {
                field,
                values,
                negated,
            } => {
                let actual = get(field);
                values.iter().any(|v| actual.loosely_equals(v)) != *negated
            }
            Expr::And { operands } => operands.iter().all(|e| e.evaluate(get)),
            Expr::Or { operands } => operands.iter().any(|e| e.evaluate(get)),
            Expr::Not { operand } => !operand.evaluate(get),
        }
    }

    /// Every field path referenced by the expression
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Const { .. } => {}
            Expr::Compare { field, .. }
            | Expr::Text { field, .. }
            | Expr::Null { field, .. }
            | Expr::Empty { field, .. }
            | Expr::In { field, .. } => out.push(field),
            Expr::And { operands } | Expr::Or { operands } => {
                operands.iter().for_each(|e| e.collect_fields(out))
            }
            Expr::Not { operand } => operand.collect_fields(out),
        }
    }

    /// Rewrite every field to its declared casing.
    ///
    /// Returns the unresolvable field names when any field is unknown.
    pub fn canonicalize(self, schema: &'static EntitySchema) -> Result<Expr, Vec<String>> {
        let mut unknown = Vec::new();
        let expr = self.canonicalize_inner(schema, &mut unknown);
        if unknown.is_empty() {
            Ok(expr)
        } else {
            Err(unknown)
        }
    }

    fn canonicalize_inner(self, schema: &'static EntitySchema, unknown: &mut Vec<String>) -> Expr {
        let fix = |field: String, unknown: &mut Vec<String>| match schema.resolve_path(&field) {
            Some(resolved) => resolved.path,
            None => {
                unknown.push(field.clone());
                field
            }
        };
        match self {
            Expr::Const { value } => Expr::Const { value },
            Expr::Compare { field, op, value } => Expr::Compare {
                field: fix(field, unknown),
                op,
                value,
            },
            Expr::Text { field, op, value } => Expr::Text {
                field: fix(field, unknown),
                op,
                value,
            },
            Expr::Null { field, negated } => Expr::Null {
                field: fix(field, unknown),
                negated,
            },
            Expr::Empty { field, negated } => Expr::Empty {
                field: fix(field, unknown),
                negated,
            },
            Expr::In {
                field,
                values,
                negated,
            } => Expr::In {
                field: fix(field, unknown),
                values,
                negated,
            },
            Expr::And { operands } => Expr::And {
                operands: operands
                    .into_iter()
                    .map(|e| e.canonicalize_inner(schema, unknown))
                    .collect(),
            },
            Expr::Or { operands } => Expr::Or {
                operands: operands
                    .into_iter()
                    .map(|e| e.canonicalize_inner(schema, unknown))
                    .collect(),
            },
            Expr::Not { operand } => Expr::Not {
                operand: Box::new(operand.canonicalize_inner(schema, unknown)),
            },
        }
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>, parent_is_and: bool) -> fmt::Result {
        let needs_parens = match self {
            Expr::And { .. } => !parent_is_and,
            Expr::Or { .. } => parent_is_and,
            _ => false,
        };
        if needs_parens {
            write!(f, "({})", self)
        } else {
            write!(f, "{}", self)
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const { value } => write!(f, "{}", value),
            Expr::Compare { field, op, value } => write!(f, "{} {} {}", field, op.symbol(), value),
            Expr::Text { field, op, value } => write!(f, "{} {} \"{}\"", field, op.keyword(), value),
            Expr::Null { field, negated } => {
                write!(f, "{} IS {}NULL", field, if *negated { "NOT " } else { "" })
            }
            Expr::Empty { field, negated } => {
                write!(f, "{} IS {}EMPTY", field, if *negated { "NOT " } else { "" })
            }
            Expr::In {
                field,
                values,
                negated,
            } => {
                let list = values
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{} {}IN ({})", field, if *negated { "NOT " } else { "" }, list)
            }
            Expr::And { operands } | Expr::Or { operands } => {
                let is_and = matches!(self, Expr::And { .. });
                for (i, operand) in operands.iter().enumerate() {
                    if i > 0 {
                        f.write_str(if is_and { " AND " } else { " OR " })?;
                    }
                    operand.fmt_operand(f, is_and)?;
                }
                Ok(())
            }
            Expr::Not { operand } => write!(f, "NOT ({})", operand),
        }
    }
}

/// A predicate over entities of type `T`
#[derive(Serialize, Deserialize)]
#[serde(transparent, bound = "")]
pub struct Predicate<T> {
    expr: Expr,
    #[serde(skip)]
    _entity: PhantomData<fn(&T) -> bool>,
}

impl<T> Predicate<T> {
    pub fn from_expr(expr: Expr) -> Self {
        Self {
            expr,
            _entity: PhantomData,
        }
    }

    /// The identity predicate: matches everything
    pub fn always() -> Self {
        Self::from_expr(Expr::TRUE)
    }

    /// Matches nothing
    pub fn never() -> Self {
        Self::from_expr(Expr::FALSE)
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn into_expr(self) -> Expr {
        self.expr
    }

    pub fn is_identity(&self) -> bool {
        self.expr.is_true()
    }

    pub fn is_never(&self) -> bool {
        self.expr.is_false()
    }

    /// Conjunction with another predicate over the same entity.
    ///
    /// For composition with other specifications use
    /// [`PredicateSpecExt`](crate::composition::PredicateSpecExt).
    pub fn and_also(self, other: Predicate<T>) -> Self {
        Self::from_expr(self.expr.and(other.expr))
    }

    pub fn or_also(self, other: Predicate<T>) -> Self {
        Self::from_expr(self.expr.or(other.expr))
    }

    pub fn negate(self) -> Self {
        Self::from_expr(self.expr.negate())
    }
}

impl<T: Entity> Predicate<T> {
    pub fn evaluate(&self, entity: &T) -> bool {
        self.expr.evaluate(&|path: &str| entity.value(path))
    }
}

impl<T> Clone for Predicate<T> {
    fn clone(&self) -> Self {
        Self::from_expr(self.expr.clone())
    }
}

impl<T> PartialEq for Predicate<T> {
    fn eq(&self, other: &Self) -> bool {
        self.expr == other.expr
    }
}

impl<T> fmt::Debug for Predicate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Predicate").field(&self.expr).finish()
    }
}

impl<T> fmt::Display for Predicate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.expr.fmt(f)
    }
}

impl<T> Default for Predicate<T> {
    fn default() -> Self {
        Self::always()
    }
}

impl<T> From<Expr> for Predicate<T> {
    fn from(expr: Expr) -> Self {
        Self::from_expr(expr)
    }
}

/// A typed reference to an entity field, for building predicates in code
pub struct FieldRef<T> {
    path: String,
    _entity: PhantomData<fn(&T)>,
}

/// Reference a field of `T`; known fields are stored with their declared casing
pub fn field<T: Entity>(name: &str) -> FieldRef<T> {
    let path = T::schema()
        .resolve_path(name)
        .map(|r| r.path)
        .unwrap_or_else(|| name.to_string());
    FieldRef {
        path,
        _entity: PhantomData,
    }
}

impl<T> FieldRef<T> {
    pub fn path(&self) -> &str {
        &self.path
    }

    fn compare(&self, op: CompareOp, value: impl Into<Value>) -> Predicate<T> {
        Predicate::from_expr(Expr::compare(self.path.clone(), op, value))
    }

    pub fn eq(&self, value: impl Into<Value>) -> Predicate<T> {
        self.compare(CompareOp::Eq, value)
    }

    pub fn ne(&self, value: impl Into<Value>) -> Predicate<T> {
        self.compare(CompareOp::Ne, value)
    }

    pub fn gt(&self, value: impl Into<Value>) -> Predicate<T> {
        self.compare(CompareOp::Gt, value)
    }

    pub fn ge(&self, value: impl Into<Value>) -> Predicate<T> {
        self.compare(CompareOp::Ge, value)
    }

    pub fn lt(&self, value: impl Into<Value>) -> Predicate<T> {
        self.compare(CompareOp::Lt, value)
    }

    pub fn le(&self, value: impl Into<Value>) -> Predicate<T> {
        self.compare(CompareOp::Le, value)
    }

    pub fn contains(&self, value: impl Into<String>) -> Predicate<T> {
        Predicate::from_expr(Expr::text(self.path.clone(), TextOp::Contains, value))
    }

    pub fn starts_with(&self, value: impl Into<String>) -> Predicate<T> {
        Predicate::from_expr(Expr::text(self.path.clone(), TextOp::StartsWith, value))
    }

    pub fn ends_with(&self, value: impl Into<String>) -> Predicate<T> {
        Predicate::from_expr(Expr::text(self.path.clone(), TextOp::EndsWith, value))
    }

    pub fn is_null(&self) -> Predicate<T> {
        Predicate::from_expr(Expr::null(self.path.clone(), false))
    }

    pub fn is_not_null(&self) -> Predicate<T> {
        Predicate::from_expr(Expr::null(self.path.clone(), true))
    }

    pub fn one_of<V: Into<Value>>(&self, values: impl IntoIterator<Item = V>) -> Predicate<T> {
        let values = values.into_iter().map(Into::into).collect();
        Predicate::from_expr(Expr::one_of(self.path.clone(), values, false))
    }
}
