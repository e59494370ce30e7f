//! Resolve the configuration used to invoke dbt from layered sources, scoped
//! globally and per verb.
//!
//! ```ignore
//! let config = DbtConfig::builder().load()?;
//! let threads = config.flag_internal_values().for_verb("run").and_then(|v| v.get("threads"));
//! ```
//!
//! That call reads the compiled-in defaults, the INI file named by
//! `DBT_CONFIG_FILE` and the `DBT_*` environment, checks every flag against
//! the schema of its scope, coerces internal values to their declared types
//! and hands back an immutable [`Configuration`].
//!
//! # Scopes
//!
//! Every per-flag attribute is stored once for the **global** scope and once
//! per **verb** (`run`, `seed`, `test`, ...). A verb exists only if both
//! the schemas and the default allowlists define it; see
//! [`SchemaRegistry::available_verbs`]. The bundled definitions are compiled
//! into the crate.
//!
//! Global entries flow into a verb when that verb is in the attribute's
//! *global-apply* set. Verb entries always win over global ones on the same
//! key. By default every verb receives every global setting.
//!
//! # Layer precedence
//!
//! ```text
//! Compiled defaults     defaults/flag_allowlists, all verbs allowed
//!        ↑ overridden by
//! Configuration file    DBT_CONFIG_FILE, [dbt] and [dbt.{verb}.*] sections
//!        ↑ overridden by
//! Environment vars      DBT_*, DBT_{VERB}_*
//!        ↑ overridden by
//! Custom providers      .provider()
//! ```
//!
//! Map-valued attributes (allowlists, internal values, env variables,
//! variables) merge key by key, so each layer is sparse. Verb sets and the
//! projects root are replaced wholesale by the last layer that sets them. A
//! layer that does not configure an attribute never erases what a lower
//! layer set.
//!
//! # Attributes
//!
//! | Attribute | Scoped | Validated |
//! |---|---|---|
//! | allowed verbs | no | against available verbs |
//! | flag allowlist | yes | flag names against the schema |
//! | internal flag values | yes | names, then coerced and schema-checked |
//! | env variables | yes | names (file only) |
//! | variables | yes | no |
//! | projects root | no | must be an existing directory |
//!
//! # Sources
//!
//! Each source implements [`ConfigProvider`]. Resolution only depends on that
//! trait, so tests and embedders can add their own through
//! [`DbtConfigBuilder::provider`] or [`ConfigResolver::new`].
//!
//! # Process-wide state
//!
//! [`ConfigContext`] resolves lazily on first use and shares the result. It is
//! an ordinary value: construct it at startup, pass it where needed, and call
//! [`reset`](ConfigContext::reset) or [`rebuild`](ConfigContext::rebuild) to
//! resolve again.
//!
//! # Error handling
//!
//! All fallible operations return [`ConfigError`]. Aggregate variants keep
//! every individual failure (see [`ConfigError::sub_errors`]) so a user can
//! fix all offending settings in one pass.

pub mod boolean;
pub mod case;
pub mod error;
pub mod merge;
pub mod provider;
pub mod schema;
pub mod types;

mod builder;
mod defaults;
mod env;
mod file;
mod ops;
mod resolve;
mod validate;

#[cfg(test)]
mod fixtures;

pub use boolean::parse_bool;
pub use builder::{ConfigContext, DbtConfig, DbtConfigBuilder};
pub use defaults::DefaultsProvider;
pub use env::{EnvironmentProvider, scope_prefix};
pub use error::ConfigError;
pub use file::{CONFIG_FILE_VAR, FileProvider};
pub use ops::{ConfigListing, REDACTED, get_value, list_entries};
pub use provider::{ConfigProvider, default_providers};
pub use resolve::{ConfigResolver, Configuration};
pub use schema::{Property, Schema, SchemaRegistry};
pub use types::{
    Allowlist, EnvVars, FlagType, FlagValue, InternalValues, RawValues, Scope, Scoped, Variables,
    VerbSet,
};
pub use validate::ValidationStage;
