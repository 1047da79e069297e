//! Field references and the small expression tree scans carry around.
//!
//! Evaluation lives elsewhere. The dataset layer only needs to know which
//! fields an expression touches.

use arrow::datatypes::{DataType, Field, FieldRef as ArrowFieldRef, Schema};
use igloo_common::{Error, Result};
use std::fmt;

/// Indices leading from a schema's top level to a (possibly nested) field.
pub type FieldPath = Vec<usize>;

/// A reference to a field by name, optionally descending into nested types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    names: Vec<String>,
}

impl FieldRef {
    /// A reference to a single field named `name`. Dots are part of the name.
    pub fn name(name: impl Into<String>) -> Self {
        Self { names: vec![name.into()] }
    }

    /// Parses a dotted path such as `"point.x"`.
    pub fn parse(path: &str) -> Result<Self> {
        let names: Vec<String> = path.split('.').map(str::to_string).collect();
        if names.iter().any(String::is_empty) {
            return Err(Error::InvalidArgument(format!("invalid field path '{path}'")));
        }
        Ok(Self { names })
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { names: names.into_iter().map(Into::into).collect() }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Every path in `schema` this reference resolves to.
    pub fn find_all(&self, schema: &Schema) -> Vec<FieldPath> {
        let mut matches = Vec::new();
        let top: Vec<&ArrowFieldRef> = schema.fields().iter().collect();
        collect_matches(&top, &self.names, &mut Vec::new(), &mut matches);
        matches
    }

    /// The single path this reference resolves to, if any.
    ///
    /// More than one match is an [`Error::AmbiguousProjection`].
    pub fn find_one_or_none(&self, schema: &Schema) -> Result<Option<FieldPath>> {
        let mut matches = self.find_all(schema);
        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            n => Err(Error::AmbiguousProjection { path: self.to_string(), matches: n }),
        }
    }
}

fn collect_matches(
    fields: &[&ArrowFieldRef],
    names: &[String],
    prefix: &mut FieldPath,
    out: &mut Vec<FieldPath>,
) {
    let Some((head, rest)) = names.split_first() else {
        return;
    };
    for (index, field) in fields.iter().enumerate() {
        if field.name() != head {
            continue;
        }
        prefix.push(index);
        if rest.is_empty() {
            out.push(prefix.clone());
        } else {
            let children = child_fields(field);
            collect_matches(&children, rest, prefix, out);
        }
        prefix.pop();
    }
}

fn child_fields(field: &Field) -> Vec<&ArrowFieldRef> {
    match field.data_type() {
        DataType::Struct(fields) => fields.iter().collect(),
        DataType::List(child)
        | DataType::LargeList(child)
        | DataType::FixedSizeList(child, _)
        | DataType::Map(child, _) => vec![child],
        _ => Vec::new(),
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.names.join("."))
    }
}

impl From<&str> for FieldRef {
    fn from(name: &str) -> Self {
        FieldRef::name(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Null,
    Boolean(bool),
    Int64(i64),
    Float64(f64),
    Utf8(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(ScalarValue),
    Field(FieldRef),
    Call { name: String, args: Vec<Expression> },
}

impl Expression {
    pub fn literal(value: ScalarValue) -> Self {
        Expression::Literal(value)
    }

    pub fn field(field: impl Into<FieldRef>) -> Self {
        Expression::Field(field.into())
    }

    pub fn call(name: impl Into<String>, args: Vec<Expression>) -> Self {
        Expression::Call { name: name.into(), args }
    }

    /// Whether any column is referenced anywhere in the tree.
    pub fn has_field_refs(&self) -> bool {
        match self {
            Expression::Literal(_) => false,
            Expression::Field(_) => true,
            Expression::Call { args, .. } => args.iter().any(Expression::has_field_refs),
        }
    }

    /// Field references in depth-first order, duplicates included.
    pub fn field_refs(&self) -> Vec<&FieldRef> {
        let mut refs = Vec::new();
        self.collect_field_refs(&mut refs);
        refs
    }

    fn collect_field_refs<'a>(&'a self, out: &mut Vec<&'a FieldRef>) {
        match self {
            Expression::Literal(_) => {}
            Expression::Field(field) => out.push(field),
            Expression::Call { args, .. } => {
                for arg in args {
                    arg.collect_field_refs(out);
                }
            }
        }
    }
}

impl Default for Expression {
    /// The always-true filter.
    fn default() -> Self {
        Expression::Literal(ScalarValue::Boolean(true))
    }
}
