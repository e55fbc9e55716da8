//! # Field validation
//!
//! Request bodies declare their rules with `validator` derives. The extractors
//! here run those rules before a handler sees the value and flatten every
//! failure into a [`FieldViolation`] with a dotted path and a readable message.
//! Partial-update bodies use `Option` fields, so only supplied fields are checked.

use std::borrow::Cow;

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::request::Parts,
    Json,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

use crate::error::{AppError, FieldViolation};

/// An enum-valued field that keeps unrecognised input around so validation can
/// report it against the field instead of failing deserialization outright.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Choice<E> {
    Known(E),
    Unknown(Value),
}

impl<E> Choice<E> {
    pub fn known(self) -> Option<E> {
        match self {
            Choice::Known(e) => Some(e),
            Choice::Unknown(_) => None,
        }
    }
}

impl<E> From<E> for Choice<E> {
    fn from(value: E) -> Self {
        Choice::Known(value)
    }
}

pub trait Enumerated {
    fn unknown_value(&self) -> Option<&Value>;
}

impl<E> Enumerated for Choice<E> {
    fn unknown_value(&self) -> Option<&Value> {
        match self {
            Choice::Known(_) => None,
            Choice::Unknown(v) => Some(v),
        }
    }
}

impl<T: Enumerated> Enumerated for &T {
    fn unknown_value(&self) -> Option<&Value> {
        (**self).unknown_value()
    }
}

impl<T: Enumerated> Enumerated for Option<T> {
    fn unknown_value(&self) -> Option<&Value> {
        self.as_ref().and_then(Enumerated::unknown_value)
    }
}

/// `custom` rule for [`Choice`] fields.
pub fn known_variant<T: Enumerated>(value: &T) -> Result<(), ValidationError> {
    match value.unknown_value() {
        None => Ok(()),
        Some(raw) => {
            let mut err = ValidationError::new("enum");
            err.add_param(Cow::from("value"), raw);
            Err(err)
        }
    }
}

/// Resolve a required enum field after validation has accepted the body.
pub fn required_choice<E>(value: Option<Choice<E>>, field: &str) -> Result<E, AppError> {
    value
        .and_then(Choice::known)
        .ok_or_else(|| AppError::validation(field, format!("Path `{field}` is required.")))
}

fn render_param(err: &ValidationError, name: &str) -> String {
    match err.params.get(name) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn param_f64(err: &ValidationError, name: &str) -> Option<f64> {
    err.params.get(name).and_then(Value::as_f64)
}

/// Message for a rule that declared none of its own.
fn default_message(path: &str, err: &ValidationError) -> String {
    match err.code.as_ref() {
        "required" => format!("Path `{path}` is required."),
        "enum" => format!(
            "`{}` is not a valid enum value for path `{path}`.",
            render_param(err, "value")
        ),
        "range" => match (param_f64(err, "value"), param_f64(err, "min"), param_f64(err, "max")) {
            (Some(value), Some(min), _) if value < min => format!(
                "Path `{path}` ({}) is less than minimum allowed value ({}).",
                render_param(err, "value"),
                render_param(err, "min")
            ),
            (Some(_), _, Some(_)) => format!(
                "Path `{path}` ({}) is more than maximum allowed value ({}).",
                render_param(err, "value"),
                render_param(err, "max")
            ),
            _ => format!("Path `{path}` is out of range."),
        },
        "length" => {
            if err.params.contains_key("max") {
                format!(
                    "Path `{path}` is longer than the maximum allowed length ({}).",
                    render_param(err, "max")
                )
            } else {
                format!(
                    "Path `{path}` is shorter than the minimum allowed length ({}).",
                    render_param(err, "min")
                )
            }
        }
        "email" => format!("Path `{path}` is not a valid email address."),
        _ => format!("Path `{path}` is invalid."),
    }
}

/// Fields whose Rust name differs from the serde name beyond casing.
const WIRE_NAMES: &[(&str, &str)] = &[("kind", "type")];

/// `custom` rule for text fields that must not be empty.
pub fn non_empty<T: AsRef<str>>(value: &T) -> Result<(), ValidationError> {
    if value.as_ref().is_empty() {
        let mut err = ValidationError::new("required");
        err.add_param(Cow::from("min"), &1);
        return Err(err);
    }
    Ok(())
}

/// The name a client uses for a Rust field.
fn wire_name(field: &str) -> String {
    WIRE_NAMES
        .iter()
        .find(|(rust, _)| *rust == field)
        .map(|(_, wire)| (*wire).to_string())
        .unwrap_or_else(|| camel_case(field))
}

/// Rust field names are snake_case; clients speak camelCase.
fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = !out.is_empty();
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn collect(prefix: &str, errors: &ValidationErrors, out: &mut Vec<FieldViolation>) {
    for (field, kind) in errors.errors() {
        let field = wire_name(&field.to_string());
        let path = if prefix.is_empty() {
            field
        } else {
            format!("{prefix}.{field}")
        };
        match kind {
            ValidationErrorsKind::Field(list) => {
                for err in list {
                    let message = err
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| default_message(&path, err));
                    out.push(FieldViolation::new(path.clone(), message));
                }
            }
            ValidationErrorsKind::Struct(inner) => collect(&path, inner, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    collect(&format!("{path}.{index}"), inner, out);
                }
            }
        }
    }
}

/// Flatten nested `validator` output, ordered by field path.
pub fn violations(errors: &ValidationErrors) -> Vec<FieldViolation> {
    let mut out = Vec::new();
    collect("", errors, &mut out);
    out.sort_by(|a, b| a.field.cmp(&b.field));
    out
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        AppError::Validation(violations(&errors))
    }
}

/// JSON body that has passed its declared field rules.
#[derive(Debug)]
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::validation("body", rejection.body_text()))?;
        value.validate()?;
        Ok(Self(value))
    }
}

/// Query string parameters; malformed values are validation failures.
#[derive(Debug)]
pub struct QueryParams<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| AppError::validation("query", rejection.body_text()))?;
        Ok(Self(value))
    }
}
