//! Data model shared by the registry, providers, resolver and validation stage.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Set of verb identifiers, ordered for deterministic output.
pub type VerbSet = BTreeSet<String>;
/// Flag name (snake_case) to enabled.
pub type Allowlist = BTreeMap<String, bool>;
/// Flag name (snake_case) to its unparsed value.
pub type RawValues = BTreeMap<String, String>;
/// Flag name (snake_case) to its coerced value.
pub type InternalValues = BTreeMap<String, FlagValue>;
/// Environment variable name to value, forwarded to the dbt process.
pub type EnvVars = BTreeMap<String, String>;
/// Free-form template variables, keys in snake_case.
pub type Variables = BTreeMap<String, String>;

/// Either the shared (global) context or a single verb.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(into = "String")]
pub enum Scope {
    Global,
    Verb(String),
}

impl Scope {
    pub fn verb(name: impl Into<String>) -> Self {
        Scope::Verb(name.into())
    }

    /// The verb name, or `None` for the global scope.
    pub fn as_verb(&self) -> Option<&str> {
        match self {
            Scope::Global => None,
            Scope::Verb(v) => Some(v),
        }
    }

    /// Human-readable label used in error messages: `global dbt` or `dbt run`.
    pub fn describe(&self) -> String {
        match self {
            Scope::Global => "global dbt".to_string(),
            Scope::Verb(v) => format!("dbt {v}"),
        }
    }

    /// Global scope followed by one scope per verb.
    pub fn all<'a>(verbs: impl IntoIterator<Item = &'a String>) -> Vec<Scope> {
        std::iter::once(Scope::Global)
            .chain(verbs.into_iter().map(|v| Scope::Verb(v.clone())))
            .collect()
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => write!(f, "global"),
            Scope::Verb(v) => write!(f, "{v}"),
        }
    }
}

impl From<Scope> for String {
    fn from(scope: Scope) -> Self {
        scope.to_string()
    }
}

/// A value stored once for the global scope and once per verb.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Scoped<T> {
    pub global: T,
    pub verbs: BTreeMap<String, T>,
}

impl<T> Scoped<T> {
    pub fn get(&self, scope: &Scope) -> Option<&T> {
        match scope {
            Scope::Global => Some(&self.global),
            Scope::Verb(v) => self.verbs.get(v),
        }
    }

    pub fn get_mut(&mut self, scope: &Scope) -> Option<&mut T> {
        match scope {
            Scope::Global => Some(&mut self.global),
            Scope::Verb(v) => self.verbs.get_mut(v),
        }
    }

    /// Entry for a verb; `None` when the verb was never resolved.
    pub fn for_verb(&self, verb: &str) -> Option<&T> {
        self.verbs.get(verb)
    }

    /// `(scope, value)` pairs, global first.
    pub fn iter(&self) -> impl Iterator<Item = (Scope, &T)> {
        std::iter::once((Scope::Global, &self.global)).chain(
            self.verbs
                .iter()
                .map(|(verb, value)| (Scope::Verb(verb.clone()), value)),
        )
    }

    pub fn map<U>(self, mut f: impl FnMut(&Scope, T) -> U) -> Scoped<U> {
        let global = f(&Scope::Global, self.global);
        let verbs = self
            .verbs
            .into_iter()
            .map(|(verb, value)| {
                let scope = Scope::Verb(verb.clone());
                (verb, f(&scope, value))
            })
            .collect();
        Scoped { global, verbs }
    }
}

/// Primitive type a schema declares for a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagType {
    Boolean,
    Integer,
    Number,
    String,
}

impl fmt::Display for FlagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlagType::Boolean => "boolean",
            FlagType::Integer => "integer",
            FlagType::Number => "number",
            FlagType::String => "string",
        };
        write!(f, "{name}")
    }
}

/// An internal flag value after coercion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FlagValue {
    Boolean(bool),
    Integer(i64),
    Number(f64),
    String(String),
}

impl FlagValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FlagValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FlagValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FlagValue::Number(n) => Some(*n),
            FlagValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FlagValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// The JSON type name this value conforms to.
    pub fn type_name(&self) -> &'static str {
        match self {
            FlagValue::Boolean(_) => "boolean",
            FlagValue::Integer(_) => "integer",
            FlagValue::Number(_) => "number",
            FlagValue::String(_) => "string",
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FlagValue::Boolean(b) => serde_json::Value::Bool(*b),
            FlagValue::Integer(i) => serde_json::Value::from(*i),
            FlagValue::Number(n) => serde_json::Value::from(*n),
            FlagValue::String(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagValue::Boolean(b) => write!(f, "{b}"),
            FlagValue::Integer(i) => write!(f, "{i}"),
            FlagValue::Number(n) => write!(f, "{n}"),
            FlagValue::String(s) => write!(f, "{s}"),
        }
    }
}
