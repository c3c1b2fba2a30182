//! Rect queries with a single field-equality filter.
//!
//! # Responsibility
//! - Parse `this.<field> == <operand>` filters.
//! - Bind implicit (`:name`), declared (`name`) and literal operands.
//!
//! # Invariants
//! - Literal and `String` operands are compared as already-encoded values.
//! - Declared parameter types must match the bound value type.

use crate::model::point::{ConvertiblePoint, Point};
use crate::model::rect::{RectField, RectVariant};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

static FILTER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^\s*this\.([A-Za-z_]\w*)\s*==\s*(?::([A-Za-z_]\w*)|"([^"]*)"|'([^']*)'|([A-Za-z_]\w*))\s*$"#,
    )
    .expect("valid filter regex")
});
static DECLARATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z_]\w*)\s+([A-Za-z_]\w*)\s*$").expect("valid declaration regex")
});

pub type QueryResult<T> = Result<T, QueryError>;

/// Query construction and binding errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    InvalidFilter(String),
    UnknownField(String),
    InvalidDeclaration(String),
    UnsupportedParameterType(String),
    UnknownParameter(String),
    ParameterCount {
        expected: usize,
        actual: usize,
    },
    ParameterType {
        parameter: String,
        expected: &'static str,
        actual: &'static str,
    },
}

impl Display for QueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidFilter(filter) => write!(f, "unsupported query filter `{filter}`"),
            Self::UnknownField(field) => write!(f, "unknown rect field `{field}` in filter"),
            Self::InvalidDeclaration(value) => {
                write!(f, "invalid parameter declaration `{value}`")
            }
            Self::UnsupportedParameterType(value) => {
                write!(f, "unsupported parameter type `{value}`")
            }
            Self::UnknownParameter(name) => {
                write!(f, "filter references undeclared parameter `{name}`")
            }
            Self::ParameterCount { expected, actual } => write!(
                f,
                "query expects {expected} parameter value(s), got {actual}"
            ),
            Self::ParameterType {
                parameter,
                expected,
                actual,
            } => write!(
                f,
                "parameter `{parameter}` expects {expected}, got {actual}"
            ),
        }
    }
}

impl Error for QueryError {}

/// Value bound to a query parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    /// Plain point, converted by the field-level converter.
    Point(Point),
    /// Type-level convertible point, converted by its own converter.
    ConvertiblePoint(ConvertiblePoint),
    /// Pre-encoded `x:y` string compared without conversion.
    Text(String),
}

impl QueryValue {
    /// Type name as written in parameter declarations.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Point(_) => "Point",
            Self::ConvertiblePoint(_) => "ConvertiblePoint",
            Self::Text(_) => "String",
        }
    }
}

/// Point parameter type the mapping of `variant` accepts.
pub fn point_parameter_type(variant: RectVariant) -> &'static str {
    match variant {
        RectVariant::FieldConverted => "Point",
        RectVariant::TypeConverted => "ConvertiblePoint",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ParameterDeclaration {
    type_name: &'static str,
    name: String,
}

/// Right-hand side of a resolved filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Operand {
    Literal(String),
    Value { parameter: String, value: QueryValue },
}

/// Filter with its operand bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResolvedFilter {
    pub field: RectField,
    pub operand: Operand,
}

/// Equality query over one rect variant.
#[derive(Debug, Clone)]
pub struct RectQuery {
    variant: RectVariant,
    filter: String,
    declarations: Vec<ParameterDeclaration>,
    values: Vec<QueryValue>,
}

impl RectQuery {
    pub fn new(variant: RectVariant, filter: impl Into<String>) -> Self {
        Self {
            variant,
            filter: filter.into(),
            declarations: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Declares explicit parameters, e.g. `"String str"`.
    ///
    /// Multiple declarations are separated by commas.
    pub fn declare_parameters(mut self, declarations: &str) -> QueryResult<Self> {
        for declaration in declarations.split(',') {
            let captures = DECLARATION_RE
                .captures(declaration)
                .ok_or_else(|| QueryError::InvalidDeclaration(declaration.trim().to_string()))?;
            let type_name = parse_type_name(&captures[1])?;
            self.declarations.push(ParameterDeclaration {
                type_name,
                name: captures[2].to_string(),
            });
        }
        Ok(self)
    }

    /// Binds parameter values positionally.
    pub fn with_parameters(mut self, values: Vec<QueryValue>) -> Self {
        self.values = values;
        self
    }

    /// Appends the value for the next positional parameter.
    pub fn set_parameter(&mut self, value: QueryValue) {
        self.values.push(value);
    }

    pub fn variant(&self) -> RectVariant {
        self.variant
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub(crate) fn resolve(&self) -> QueryResult<ResolvedFilter> {
        let captures = FILTER_RE
            .captures(&self.filter)
            .ok_or_else(|| QueryError::InvalidFilter(self.filter.clone()))?;
        let field = RectField::parse_filter_name(&captures[1])
            .ok_or_else(|| QueryError::UnknownField(captures[1].to_string()))?;

        let operand = if let Some(name) = captures.get(2) {
            self.expect_parameter_count(1)?;
            Operand::Value {
                parameter: name.as_str().to_string(),
                value: self.values[0].clone(),
            }
        } else if let Some(literal) = captures.get(3).or_else(|| captures.get(4)) {
            self.expect_parameter_count(0)?;
            Operand::Literal(literal.as_str().to_string())
        } else {
            let name = &captures[5];
            self.bind_declared(name)?
        };

        Ok(ResolvedFilter { field, operand })
    }

    fn bind_declared(&self, name: &str) -> QueryResult<Operand> {
        let index = self
            .declarations
            .iter()
            .position(|declaration| declaration.name == name)
            .ok_or_else(|| QueryError::UnknownParameter(name.to_string()))?;
        self.expect_parameter_count(self.declarations.len())?;

        let value = self.values[index].clone();
        let expected = self.declarations[index].type_name;
        if value.type_name() != expected {
            return Err(QueryError::ParameterType {
                parameter: name.to_string(),
                expected,
                actual: value.type_name(),
            });
        }
        Ok(Operand::Value {
            parameter: name.to_string(),
            value,
        })
    }

    fn expect_parameter_count(&self, expected: usize) -> QueryResult<()> {
        if self.values.len() != expected {
            return Err(QueryError::ParameterCount {
                expected,
                actual: self.values.len(),
            });
        }
        Ok(())
    }
}

fn parse_type_name(value: &str) -> QueryResult<&'static str> {
    match value {
        "String" => Ok("String"),
        "Point" => Ok("Point"),
        "ConvertiblePoint" => Ok("ConvertiblePoint"),
        other => Err(QueryError::UnsupportedParameterType(other.to_string())),
    }
}
