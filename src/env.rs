//! Configuration read from `DBT_*` environment variables.
//!
//! Scoped variables share one layout, where `PREFIX` is `DBT` for the global
//! scope and `DBT_{VERB}` for a verb (upper-cased, `-` becomes `_`):
//!
//! | Variable | Meaning |
//! |---|---|
//! | `PREFIX_ENABLE_FLAGS` | comma-separated kebab-case flags to allow |
//! | `PREFIX_DISABLE_FLAGS` | flags to disallow; wins over enable |
//! | `PREFIX_FLAG_{NAME}` | internal value for flag `NAME` |
//! | `PREFIX_ENV_{NAME}` | forwarded to dbt as `DBT_ENV_{NAME}` |
//! | `PREFIX_VAR_{NAME}` | free variable `name` |
//!
//! Unscoped: `DBT_ALLOWED_VERBS`, `DBT_PROJECTS_ROOT`, `DBT_RENAME_ENV` and the
//! four `DBT_APPLY_GLOBAL_*` verb lists.
//!
//! The provider works on a snapshot taken at construction, so tests can pass
//! synthetic data instead of `std::env::vars()`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::boolean::{parse_bool, valid_values};
use crate::case::snake_case;
use crate::error::ConfigError;
use crate::provider::{
    ConfigProvider, ENV_BASE_PREFIX, forwarded_env_name, parse_verb_list, validate_projects_root,
};
use crate::schema::SchemaRegistry;
use crate::types::{Allowlist, EnvVars, RawValues, Scope, Variables, VerbSet};

pub const ALLOWED_VERBS_VAR: &str = "DBT_ALLOWED_VERBS";
pub const PROJECTS_ROOT_VAR: &str = "DBT_PROJECTS_ROOT";
pub const RENAME_ENV_VAR: &str = "DBT_RENAME_ENV";
pub const APPLY_GLOBAL_ALLOWLIST_VAR: &str = "DBT_APPLY_GLOBAL_ALLOWLIST";
pub const APPLY_GLOBAL_ENV_VARS_VAR: &str = "DBT_APPLY_GLOBAL_ENV_VARS";
pub const APPLY_GLOBAL_INTERNAL_FLAG_VALUES_VAR: &str = "DBT_APPLY_GLOBAL_INTERNAL_FLAG_VALUES";
pub const APPLY_GLOBAL_VARS_VAR: &str = "DBT_APPLY_GLOBAL_VARS";

static FLAG_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9-]*$").expect("flag token pattern is valid"));

/// The process environment, skipping entries that are not valid UTF-8.
pub fn process_vars() -> impl Iterator<Item = (String, String)> {
    std::env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
}

/// `DBT` or `DBT_{VERB}`.
pub fn scope_prefix(scope: &Scope) -> String {
    match scope {
        Scope::Global => "DBT".to_string(),
        Scope::Verb(verb) => format!("DBT_{}", verb.to_uppercase().replace('-', "_")),
    }
}

#[derive(Debug, Clone)]
pub struct EnvironmentProvider {
    registry: SchemaRegistry,
    vars: BTreeMap<String, String>,
}

impl EnvironmentProvider {
    pub fn from_process_env(registry: SchemaRegistry) -> Self {
        Self::from_vars(registry, process_vars())
    }

    pub fn from_vars(
        registry: SchemaRegistry,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        let vars: BTreeMap<String, String> = vars
            .into_iter()
            .filter(|(key, _)| key.starts_with("DBT_"))
            .collect();
        tracing::trace!(count = vars.len(), "captured DBT_* environment");
        Self { registry, vars }
    }

    /// The captured `DBT_*` variables.
    pub fn vars(&self) -> impl Iterator<Item = (String, String)> + '_ {
        self.vars.iter().map(|(k, v)| (k.clone(), v.clone()))
    }

    /// Value of `key`, treating blank as unset.
    fn var_or_none(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// `(suffix, value)` for every variable starting with `prefix`.
    fn with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.vars
            .range(prefix.to_string()..)
            .map_while(move |(key, value)| Some((key.strip_prefix(prefix)?, value.as_str())))
            .filter(|(suffix, _)| !suffix.is_empty())
    }

    fn verbs_var(&self, name: &str, available_verbs: &VerbSet) -> Result<Option<VerbSet>, ConfigError> {
        let Some(value) = self.vars.get(name) else {
            return Ok(None);
        };
        parse_verb_list(value, &format!("ENV {name}"), available_verbs).map(Some)
    }

    fn rename_env(&self) -> Result<bool, ConfigError> {
        parse_bool(self.var_or_none(RENAME_ENV_VAR), false).map_err(|e| ConfigError::Format {
            location: format!("ENV {RENAME_ENV_VAR}"),
            message: format!(
                "Value {:?} could not be coerced to a boolean value. Valid values: {}",
                e.0,
                valid_values().join(", ")
            ),
        })
    }

    /// Parse one `*_ENABLE_FLAGS` / `*_DISABLE_FLAGS` variable.
    fn flag_list(&self, scope: &Scope, name: &str) -> Result<Vec<String>, ConfigError> {
        let Some(value) = self.var_or_none(name) else {
            return Ok(Vec::new());
        };
        let body = value.strip_suffix(',').unwrap_or(value);
        let flags: Vec<&str> = body.split(',').map(str::trim).collect();
        if !flags.iter().all(|flag| FLAG_TOKEN.is_match(flag)) {
            return Err(ConfigError::Format {
                location: format!("ENV {name}"),
                message: "Invalid value; should be a comma-separated list of flags in kebab case"
                    .into(),
            });
        }

        self.registry.validate_flag_availability(
            scope,
            flags.iter().copied(),
            &format!("ENV {name}: Unrecognized flags"),
            |_| format!("ENV {name}"),
        )?;
        Ok(flags.into_iter().map(snake_case).collect())
    }
}

impl ConfigProvider for EnvironmentProvider {
    fn name(&self) -> &str {
        "environment"
    }

    fn get_allowed_verbs(&self, available_verbs: &VerbSet) -> Result<Option<VerbSet>, ConfigError> {
        let Some(value) = self.var_or_none(ALLOWED_VERBS_VAR) else {
            return Ok(None);
        };
        parse_verb_list(value, &format!("ENV {ALLOWED_VERBS_VAR}"), available_verbs).map(Some)
    }

    fn get_flag_allowlist(&self, scope: &Scope) -> Result<Option<Allowlist>, ConfigError> {
        let prefix = scope_prefix(scope);
        let enabled = self.flag_list(scope, &format!("{prefix}_ENABLE_FLAGS"))?;
        let disabled = self.flag_list(scope, &format!("{prefix}_DISABLE_FLAGS"))?;

        let mut allowlist = Allowlist::new();
        allowlist.extend(enabled.into_iter().map(|flag| (flag, true)));
        allowlist.extend(disabled.into_iter().map(|flag| (flag, false)));
        if allowlist.is_empty() {
            return Ok(None);
        }
        tracing::debug!(%scope, flags = allowlist.len(), "read flag allowlist from environment");
        Ok(Some(allowlist))
    }

    fn get_flag_allowlist_apply_global(
        &self,
        available_verbs: &VerbSet,
    ) -> Result<Option<VerbSet>, ConfigError> {
        self.verbs_var(APPLY_GLOBAL_ALLOWLIST_VAR, available_verbs)
    }

    fn get_env_variables(&self, scope: &Scope) -> Result<Option<EnvVars>, ConfigError> {
        let prefix = format!("{}_ENV_", scope_prefix(scope));
        let forwarded: Vec<(&str, &str)> = self.with_prefix(&prefix).collect();
        if forwarded.is_empty() {
            return Ok(None);
        }

        let rename = self.rename_env()?;
        let env_vars: EnvVars = forwarded
            .into_iter()
            .map(|(suffix, value)| {
                let name = format!("{ENV_BASE_PREFIX}{suffix}");
                (forwarded_env_name(&name, rename), value.to_string())
            })
            .collect();
        tracing::debug!(%scope, variables = env_vars.len(), rename, "read env variables from environment");
        Ok(Some(env_vars))
    }

    fn get_env_variables_apply_global(
        &self,
        available_verbs: &VerbSet,
    ) -> Result<Option<VerbSet>, ConfigError> {
        self.verbs_var(APPLY_GLOBAL_ENV_VARS_VAR, available_verbs)
    }

    fn get_flag_internal_values(&self, scope: &Scope) -> Result<Option<RawValues>, ConfigError> {
        let prefix = format!("{}_FLAG_", scope_prefix(scope));
        let raw: Vec<(&str, &str)> = self.with_prefix(&prefix).collect();
        if raw.is_empty() {
            return Ok(None);
        }

        self.registry.validate_flag_availability(
            scope,
            raw.iter().map(|(flag, _)| *flag),
            &format!("ENV {prefix}*: Unrecognized flags"),
            |flag| format!("ENV {prefix}{flag}"),
        )?;
        let values: RawValues = raw
            .into_iter()
            .map(|(flag, value)| (snake_case(flag), value.to_string()))
            .collect();
        tracing::debug!(%scope, flags = values.len(), "read internal flag values from environment");
        Ok(Some(values))
    }

    fn get_flag_internal_values_apply_global(
        &self,
        available_verbs: &VerbSet,
    ) -> Result<Option<VerbSet>, ConfigError> {
        self.verbs_var(APPLY_GLOBAL_INTERNAL_FLAG_VALUES_VAR, available_verbs)
    }

    fn get_projects_root_dir(&self) -> Result<Option<PathBuf>, ConfigError> {
        let Some(value) = self.var_or_none(PROJECTS_ROOT_VAR) else {
            return Ok(None);
        };
        validate_projects_root(Path::new(value), &format!("ENV {PROJECTS_ROOT_VAR}")).map(Some)
    }

    fn get_variables(&self, scope: &Scope) -> Result<Option<Variables>, ConfigError> {
        let prefix = format!("{}_VAR_", scope_prefix(scope));
        let variables: Variables = self
            .with_prefix(&prefix)
            .map(|(name, value)| (snake_case(name), value.to_string()))
            .collect();
        Ok((!variables.is_empty()).then_some(variables))
    }

    fn get_variables_apply_global(
        &self,
        available_verbs: &VerbSet,
    ) -> Result<Option<VerbSet>, ConfigError> {
        self.verbs_var(APPLY_GLOBAL_VARS_VAR, available_verbs)
    }
}
