//! Coercion and validation of internal flag values.
//!
//! Runs in two phases. Coercion turns every raw string into the primitive type
//! its schema declares, collecting every failure into one
//! [`ConfigError::CastErrors`]. Document validation then checks the coerced
//! mapping against the schema and reports the first violation as
//! [`ConfigError::SchemaValidation`], located by a
//! `$.flag_internal_values.{scope}.{flag}` path.

use crate::boolean::parse_bool;
use crate::error::ConfigError;
use crate::schema::{Property, Schema, SchemaRegistry};
use crate::types::{FlagType, FlagValue, InternalValues, RawValues, Scope};

pub struct ValidationStage<'a> {
    registry: &'a SchemaRegistry,
}

impl<'a> ValidationStage<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Coerce `raw` to typed values and validate them for `scope`.
    ///
    /// The global scope uses the global schema; a verb uses its schema merged
    /// over the global one.
    pub fn coerce_and_validate(
        &self,
        scope: &Scope,
        raw: RawValues,
    ) -> Result<InternalValues, ConfigError> {
        let schema = match scope {
            Scope::Global => self.registry.read_schema(scope, false)?,
            Scope::Verb(_) => self.registry.read_schema(scope, true)?,
        };
        let values = coerce(&schema, scope, raw)?;
        validate_document(&schema, scope, &values)?;
        Ok(values)
    }
}

/// Convert each raw value to its declared type.
pub fn coerce(schema: &Schema, scope: &Scope, raw: RawValues) -> Result<InternalValues, ConfigError> {
    let mut values = InternalValues::new();
    let mut errors = Vec::new();

    for (flag, value) in raw {
        match coerce_value(&flag, &value, schema.flag_type(&flag)) {
            Ok(coerced) => {
                values.insert(flag, coerced);
            }
            Err(e) => errors.push(e),
        }
    }

    if errors.is_empty() {
        Ok(values)
    } else {
        Err(ConfigError::CastErrors {
            scope: scope.clone(),
            errors,
        })
    }
}

fn coerce_value(flag: &str, value: &str, kind: Option<FlagType>) -> Result<FlagValue, ConfigError> {
    let cast_error = |expected: FlagType, reason: String| ConfigError::Cast {
        flag: flag.to_string(),
        value: value.to_string(),
        expected,
        reason,
    };

    match kind {
        Some(FlagType::Boolean) => parse_bool(Some(value), false)
            .map(FlagValue::Boolean)
            .map_err(|e| cast_error(FlagType::Boolean, e.to_string())),
        Some(FlagType::Integer) => value
            .trim()
            .parse::<i64>()
            .map(FlagValue::Integer)
            .map_err(|e| cast_error(FlagType::Integer, e.to_string())),
        Some(FlagType::Number) => match value.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(FlagValue::Number(n)),
            Ok(_) => Err(cast_error(FlagType::Number, "not a finite number".into())),
            Err(e) => Err(cast_error(FlagType::Number, e.to_string())),
        },
        Some(FlagType::String) | None => Ok(FlagValue::String(value.to_string())),
    }
}

/// Check coerced values against `schema`; the first violation wins.
pub fn validate_document(
    schema: &Schema,
    scope: &Scope,
    values: &InternalValues,
) -> Result<(), ConfigError> {
    let violation = |flag: &str, reason: String| ConfigError::SchemaValidation {
        path: format!("$.flag_internal_values.{scope}.{flag}"),
        reason,
    };

    if let Some(missing) = schema.required.iter().find(|flag| !values.contains_key(*flag)) {
        return Err(violation(missing, "required flag is missing".into()));
    }

    for (flag, value) in values {
        let Some(property) = schema.property(flag) else {
            if !schema.additional_properties {
                return Err(violation(flag, "flag is not declared by the schema".into()));
            }
            continue;
        };
        check_property(property, value).map_err(|reason| violation(flag, reason))?;
    }
    Ok(())
}

fn check_property(property: &Property, value: &FlagValue) -> Result<(), String> {
    if let Some(kind) = property.kind
        && !conforms(kind, value)
    {
        return Err(format!("expected {kind}, found {}", value.type_name()));
    }

    if let Some(allowed) = &property.allowed
        && !allowed.contains(&value.to_json())
    {
        let choices: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
        return Err(format!("{} is not one of [{}]", value.to_json(), choices.join(", ")));
    }

    if let Some(n) = value.as_number() {
        if let Some(min) = property.minimum
            && n < min
        {
            return Err(format!("{n} is less than the minimum of {min}"));
        }
        if let Some(max) = property.maximum
            && n > max
        {
            return Err(format!("{n} is greater than the maximum of {max}"));
        }
    }
    Ok(())
}

fn conforms(kind: FlagType, value: &FlagValue) -> bool {
    matches!(
        (kind, value),
        (FlagType::Boolean, FlagValue::Boolean(_))
            | (FlagType::Integer, FlagValue::Integer(_))
            | (FlagType::Number, FlagValue::Number(_) | FlagValue::Integer(_))
            | (FlagType::String, FlagValue::String(_))
    )
}
