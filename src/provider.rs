//! The query contract every configuration source implements.
//!
//! A provider answers each question with `Ok(None)` when its source does not
//! configure that point, letting the resolver fall through to the providers
//! before it. Errors abort resolution.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::defaults::DefaultsProvider;
use crate::env::EnvironmentProvider;
use crate::error::ConfigError;
use crate::file::FileProvider;
use crate::schema::{SchemaRegistry, is_verb_token};
use crate::types::{Allowlist, EnvVars, RawValues, Scope, Variables, VerbSet};

pub const ENV_SECRET_PREFIX: &str = "DBT_ENV_SECRET_";
pub const ENV_CUSTOM_PREFIX: &str = "DBT_ENV_CUSTOM_ENV_";
pub const ENV_BASE_PREFIX: &str = "DBT_ENV_";

/// One configuration source.
pub trait ConfigProvider: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    /// `Some` only for the compiled-in defaults provider.
    fn as_defaults(&self) -> Option<&DefaultsProvider> {
        None
    }

    /// Verbs execution is restricted to. `*` expands to `available_verbs`.
    fn get_allowed_verbs(&self, available_verbs: &VerbSet) -> Result<Option<VerbSet>, ConfigError>;

    /// Flag allowlist for `scope`; keys validated against the schema.
    fn get_flag_allowlist(&self, scope: &Scope) -> Result<Option<Allowlist>, ConfigError>;

    /// Verbs whose allowlist receives the global allowlist.
    fn get_flag_allowlist_apply_global(
        &self,
        available_verbs: &VerbSet,
    ) -> Result<Option<VerbSet>, ConfigError>;

    /// Environment variables forwarded to dbt for `scope`.
    fn get_env_variables(&self, scope: &Scope) -> Result<Option<EnvVars>, ConfigError>;

    fn get_env_variables_apply_global(
        &self,
        available_verbs: &VerbSet,
    ) -> Result<Option<VerbSet>, ConfigError>;

    /// Unparsed flag values for `scope`; keys validated against the schema.
    fn get_flag_internal_values(&self, scope: &Scope) -> Result<Option<RawValues>, ConfigError>;

    fn get_flag_internal_values_apply_global(
        &self,
        available_verbs: &VerbSet,
    ) -> Result<Option<VerbSet>, ConfigError>;

    /// Existing directory holding dbt projects.
    fn get_projects_root_dir(&self) -> Result<Option<PathBuf>, ConfigError>;

    /// Free-form variables for `scope`, keys in snake_case. Not schema-checked.
    fn get_variables(&self, scope: &Scope) -> Result<Option<Variables>, ConfigError>;

    fn get_variables_apply_global(
        &self,
        available_verbs: &VerbSet,
    ) -> Result<Option<VerbSet>, ConfigError>;
}

/// Defaults, then the file named by `DBT_CONFIG_FILE`, then the environment.
pub fn default_providers(
    registry: &SchemaRegistry,
) -> Result<Vec<Arc<dyn ConfigProvider>>, ConfigError> {
    let env = EnvironmentProvider::from_process_env(registry.clone());
    let file = FileProvider::from_vars(registry.clone(), env.vars())?;
    Ok(vec![
        Arc::new(DefaultsProvider::new(registry.clone())),
        Arc::new(file),
        Arc::new(env),
    ])
}

/// Parse a comma-separated verb list such as `run,test` or `*`.
///
/// Tokens are trimmed; a trailing comma is tolerated. Unknown verbs are
/// reported together, sorted.
pub fn parse_verb_list(
    value: &str,
    location: &str,
    available_verbs: &VerbSet,
) -> Result<VerbSet, ConfigError> {
    let format_error = || ConfigError::Format {
        location: location.to_string(),
        message: "Should be in the form 'verb(,verb)+'".to_string(),
    };

    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(VerbSet::new());
    }

    let body = trimmed.strip_suffix(',').unwrap_or(trimmed);
    let mut verbs = VerbSet::new();
    let mut wildcard = false;
    for token in body.split(',').map(str::trim) {
        match token {
            "*" => wildcard = true,
            t if is_verb_token(t) => {
                verbs.insert(t.to_string());
            }
            _ => return Err(format_error()),
        }
    }

    let unsupported: Vec<String> = verbs.difference(available_verbs).cloned().collect();
    if !unsupported.is_empty() {
        return Err(ConfigError::UnsupportedVerbs {
            location: location.to_string(),
            verbs: unsupported,
        });
    }

    if wildcard {
        verbs.extend(available_verbs.iter().cloned());
    }
    Ok(verbs)
}

/// Require `path` to exist and be a directory.
pub fn validate_projects_root(path: &Path, location: &str) -> Result<PathBuf, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            what: "Projects root directory".into(),
            path: path.to_path_buf(),
            origin: format!(" (configured through {location})"),
        });
    }
    if !path.is_dir() {
        return Err(ConfigError::NotADirectory {
            location: location.to_string(),
            path: path.to_path_buf(),
        });
    }
    Ok(path.to_path_buf())
}

/// Map a forwarded variable to the name dbt should see.
///
/// With `rename`, base-kind `DBT_ENV_{X}` becomes `DBT_{X}`; secret
/// (`DBT_ENV_SECRET_`) and custom (`DBT_ENV_CUSTOM_ENV_`) names are kept.
pub fn forwarded_env_name(name: &str, rename: bool) -> String {
    let is_special = name.starts_with(ENV_SECRET_PREFIX) || name.starts_with(ENV_CUSTOM_PREFIX);
    match name.strip_prefix(ENV_BASE_PREFIX) {
        Some(rest) if rename && !is_special && !rest.is_empty() => format!("DBT_{rest}"),
        _ => name.to_string(),
    }
}
