//! Inspection of a resolved configuration: flattened listing and key lookup.
//!
//! Keys are dotted paths such as `allowed_verbs`,
//! `flag_internal_values.run.threads` or `env_variables.global.DBT_TARGET`.
//! Values of `DBT_ENV_SECRET_*` variables are never shown.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::ConfigError;
use crate::provider::ENV_SECRET_PREFIX;
use crate::resolve::Configuration;
use crate::types::Scoped;

pub const REDACTED: &str = "<redacted>";

/// All resolved entries, in a stable order.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigListing {
    pub entries: Vec<(String, String)>,
}

impl fmt::Display for ConfigListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{key} = {value}")?;
        }
        Ok(())
    }
}

/// Flatten `config` into dotted key-value pairs.
pub fn list_entries(config: &Configuration) -> ConfigListing {
    let mut entries = vec![
        (
            "allowed_verbs".to_string(),
            config
                .allowed_verbs()
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(","),
        ),
        (
            "projects_root_dir".to_string(),
            config.projects_root_dir().display().to_string(),
        ),
    ];
    push_scoped(&mut entries, "flag_allowlists", config.flag_allowlists(), |_, v| {
        v.to_string()
    });
    push_scoped(
        &mut entries,
        "flag_internal_values",
        config.flag_internal_values(),
        |_, v| v.to_string(),
    );
    push_scoped(&mut entries, "env_variables", config.env_variables(), |name, v| {
        if name.starts_with(ENV_SECRET_PREFIX) {
            REDACTED.to_string()
        } else {
            v.clone()
        }
    });
    push_scoped(&mut entries, "variables", config.variables(), |_, v| v.clone());
    ConfigListing { entries }
}

/// Look up one dotted key.
pub fn get_value(config: &Configuration, key: &str) -> Result<String, ConfigError> {
    list_entries(config)
        .entries
        .into_iter()
        .find(|(k, _)| k == key)
        .map(|(_, value)| value)
        .ok_or_else(|| ConfigError::KeyNotFound(key.into()))
}

fn push_scoped<V>(
    entries: &mut Vec<(String, String)>,
    attribute: &str,
    scoped: &Scoped<BTreeMap<String, V>>,
    render: impl Fn(&str, &V) -> String,
) {
    for (scope, map) in scoped.iter() {
        for (name, value) in map {
            entries.push((format!("{attribute}.{scope}.{name}"), render(name, value)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::DbtConfig;
    use tempfile::TempDir;

    fn config(dir: &TempDir, extra: &[(&str, &str)]) -> Configuration {
        let mut vars = vec![(
            "DBT_PROJECTS_ROOT".to_string(),
            dir.path().display().to_string(),
        )];
        vars.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        DbtConfig::builder().env_vars(vars).no_file().load().unwrap()
    }

    #[test]
    fn listing_starts_with_scalars() {
        let dir = TempDir::new().unwrap();
        let listing = list_entries(&config(&dir, &[("DBT_ALLOWED_VERBS", "test,run")]));
        assert_eq!(listing.entries[0], ("allowed_verbs".into(), "run,test".into()));
        assert_eq!(listing.entries[1].0, "projects_root_dir");
    }

    #[test]
    fn listing_includes_scoped_entries() {
        let dir = TempDir::new().unwrap();
        let listing = list_entries(&config(&dir, &[("DBT_RUN_FLAG_THREADS", "4")]));
        assert!(
            listing
                .entries
                .contains(&("flag_internal_values.run.threads".into(), "4".into()))
        );
        assert!(
            listing
                .entries
                .contains(&("flag_allowlists.global.fail_fast".into(), "true".into()))
        );
    }

    #[test]
    fn secrets_are_redacted() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir, &[("DBT_ENV_SECRET_TOKEN", "hunter2"), ("DBT_ENV_TARGET", "prod")]);
        assert_eq!(
            get_value(&cfg, "env_variables.global.DBT_ENV_SECRET_TOKEN").unwrap(),
            REDACTED
        );
        assert_eq!(get_value(&cfg, "env_variables.global.DBT_ENV_TARGET").unwrap(), "prod");
        assert!(!list_entries(&cfg).to_string().contains("hunter2"));
    }

    #[test]
    fn unknown_key() {
        let dir = TempDir::new().unwrap();
        let err = get_value(&config(&dir, &[]), "variables.global.nope").unwrap_err();
        assert!(matches!(err, ConfigError::KeyNotFound(_)));
    }

    #[test]
    fn display_is_one_line_per_entry() {
        let listing = ConfigListing {
            entries: vec![("a".into(), "1".into()), ("b".into(), "2".into())],
        };
        assert_eq!(listing.to_string(), "a = 1\nb = 2");
    }
}
