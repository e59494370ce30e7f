//! The INI configuration file named by `DBT_CONFIG_FILE`.
//!
//! # Layout
//!
//! ```ini
//! [dbt]
//! allowed_verbs = run,test
//! projects_root_dir = /srv/dbt
//! rename_env = yes
//! apply_global_allowlist = *
//!
//! [dbt.flags.allowlist]
//! fail-fast = on
//!
//! [dbt.run.flags.values]
//! threads = 4
//!
//! [dbt.run.env_vars]
//! DBT_ENV_TARGET = prod
//!
//! [dbt.vars]
//! schema_prefix = analytics
//! ```
//!
//! Scoped sections are `dbt.{kind}` for the global scope and
//! `dbt.{verb}.{kind}` for a verb; a section naming an unavailable verb is an
//! error. The file must have the `.ini` extension. It is read and parsed
//! once, when the provider is built; every query is answered from that
//! snapshot.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use ini::{Ini, ParseOption};
use regex::Regex;

use crate::boolean::{parse_bool, valid_values};
use crate::case::snake_case;
use crate::error::ConfigError;
use crate::provider::{ConfigProvider, forwarded_env_name, parse_verb_list, validate_projects_root};
use crate::schema::SchemaRegistry;
use crate::types::{Allowlist, EnvVars, RawValues, Scope, Variables, VerbSet};

/// Environment variable naming the configuration file.
pub const CONFIG_FILE_VAR: &str = "DBT_CONFIG_FILE";

/// Section holding the scalar options.
pub const ROOT_SECTION: &str = "dbt";

pub const FILE_EXTENSION: &str = "ini";

/// Section kinds that exist once globally and once per verb.
const SCOPED_KINDS: [&str; 4] = ["flags.allowlist", "flags.values", "env_vars", "vars"];

static ENV_VAR_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^DBT_([A-Z0-9]+_+)+[A-Z0-9]+$").expect("env var name pattern is valid")
});

type Section = BTreeMap<String, String>;

/// Provider backed by an INI file.
///
/// A provider built without a file (variable unset or blank, or an empty
/// file) answers `None` to every query.
#[derive(Debug, Clone)]
pub struct FileProvider {
    registry: SchemaRegistry,
    path: Option<PathBuf>,
    sections: BTreeMap<String, Section>,
}

impl FileProvider {
    /// A provider with no file behind it.
    pub fn empty(registry: SchemaRegistry) -> Self {
        Self {
            registry,
            path: None,
            sections: BTreeMap::new(),
        }
    }

    /// Locate the file through `DBT_CONFIG_FILE` in the process environment.
    pub fn from_process_env(registry: SchemaRegistry) -> Result<Self, ConfigError> {
        Self::from_vars(registry, crate::env::process_vars())
    }

    /// Locate the file through `DBT_CONFIG_FILE` in `vars`.
    pub fn from_vars(
        registry: SchemaRegistry,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self, ConfigError> {
        let configured = vars
            .into_iter()
            .find(|(key, _)| key == CONFIG_FILE_VAR)
            .map(|(_, value)| value.trim().to_string())
            .filter(|value| !value.is_empty());

        match configured {
            Some(path) => Self::from_path(registry, path),
            None => {
                tracing::debug!("{CONFIG_FILE_VAR} not set, no configuration file loaded");
                Ok(Self::empty(registry))
            }
        }
    }

    /// Read and parse the file at `path`.
    pub fn from_path(registry: SchemaRegistry, path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let origin = format!(" (configured through environment variable \"{CONFIG_FILE_VAR}\")");
        if path.is_dir() {
            return Err(ConfigError::IsADirectory { path, origin });
        }
        if !path.exists() {
            return Err(ConfigError::NotFound {
                what: "Configuration file".into(),
                path,
                origin,
            });
        }
        if path.extension().is_none_or(|ext| ext != FILE_EXTENSION) {
            return Err(ConfigError::Format {
                location: format!("ENV {CONFIG_FILE_VAR}"),
                message: format!("{} should be a .{FILE_EXTENSION} file", path.display()),
            });
        }
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound {
                    what: "Configuration file".into(),
                    path,
                    origin,
                });
            }
            Err(e) => return Err(ConfigError::Io { path, source: e }),
        };
        tracing::trace!(path = %path.display(), bytes = content.len(), "read configuration file");
        Self::parse(registry, path, &content)
    }

    /// Parse `content` as if it had been read from `path`.
    pub fn parse(
        registry: SchemaRegistry,
        path: impl Into<PathBuf>,
        content: &str,
    ) -> Result<Self, ConfigError> {
        let path = path.into();
        let options = ParseOption {
            enabled_quote: false,
            enabled_escape: false,
            ..ParseOption::default()
        };
        let ini = Ini::load_from_str_opt(content, options).map_err(|e| ConfigError::FileParse {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        let mut sections: BTreeMap<String, Section> = BTreeMap::new();
        for (name, properties) in ini.iter() {
            let Some(name) = name else {
                if !properties.is_empty() {
                    return Err(ConfigError::FileParse {
                        path,
                        reason: "File is malformed; options found before the first section header"
                            .into(),
                    });
                }
                continue;
            };
            // repeated sections merge, later options winning
            let section = sections.entry(name.trim().to_string()).or_default();
            for (key, value) in properties.iter() {
                section.insert(key.trim().to_lowercase(), value.trim().to_string());
            }
        }
        sections.retain(|_, options| !options.is_empty());

        tracing::debug!(
            path = %path.display(),
            sections = sections.len(),
            "loaded configuration file"
        );
        let provider = Self {
            registry,
            path: Some(path),
            sections,
        };
        provider.check_section_verbs()?;
        Ok(provider)
    }

    /// Reject `[dbt.{verb}.*]` sections naming a verb that is not available.
    fn check_section_verbs(&self) -> Result<(), ConfigError> {
        let named: BTreeSet<&str> = self.sections.keys().filter_map(|name| section_verb(name)).collect();
        if named.is_empty() {
            return Ok(());
        }
        let available = self.registry.available_verbs()?;
        let unsupported: Vec<String> = named
            .into_iter()
            .filter(|verb| !available.contains(*verb))
            .map(String::from)
            .collect();
        if unsupported.is_empty() {
            return Ok(());
        }
        Err(ConfigError::UnsupportedVerbs {
            location: format!("Scoped sections{}", self.footer()),
            verbs: unsupported,
        })
    }

    /// The file backing this provider, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn section(&self, name: &str) -> Option<&Section> {
        self.sections.get(name)
    }

    fn option(&self, section: &str, option: &str) -> Option<&str> {
        self.section(section)?.get(option).map(String::as_str)
    }

    fn footer(&self) -> String {
        match &self.path {
            Some(path) => format!(
                " [file: {}, configured through environment variable \"{CONFIG_FILE_VAR}\"]",
                path.display()
            ),
            None => String::new(),
        }
    }

    fn option_location(&self, section: &str, option: &str) -> String {
        format!("Option `[{section}].{option}`{}", self.footer())
    }

    fn section_location(&self, section: &str) -> String {
        format!("Section `[{section}]`{}", self.footer())
    }

    fn verbs_option(
        &self,
        option: &str,
        available_verbs: &VerbSet,
    ) -> Result<Option<VerbSet>, ConfigError> {
        let Some(value) = self.option(ROOT_SECTION, option) else {
            return Ok(None);
        };
        let location = self.option_location(ROOT_SECTION, option);
        parse_verb_list(value, &location, available_verbs).map(Some)
    }

    fn rename_env(&self) -> Result<bool, ConfigError> {
        let value = self.option(ROOT_SECTION, "rename_env");
        parse_bool(value, false).map_err(|e| ConfigError::Format {
            location: self.option_location(ROOT_SECTION, "rename_env"),
            message: format!(
                "Value {:?} could not be coerced to a boolean value. Valid values: {}",
                e.0,
                valid_values().join(", ")
            ),
        })
    }
}

/// The verb of a `dbt.{verb}.{kind}` section; `None` for global and other sections.
fn section_verb(name: &str) -> Option<&str> {
    let rest = name.strip_prefix(ROOT_SECTION)?.strip_prefix('.')?;
    SCOPED_KINDS
        .iter()
        .find_map(|kind| rest.strip_suffix(kind)?.strip_suffix('.'))
}

/// `dbt.{kind}` or `dbt.{verb}.{kind}`.
fn scoped_section(scope: &Scope, kind: &str) -> String {
    match scope {
        Scope::Global => format!("{ROOT_SECTION}.{kind}"),
        Scope::Verb(verb) => format!("{ROOT_SECTION}.{verb}.{kind}"),
    }
}

impl ConfigProvider for FileProvider {
    fn name(&self) -> &str {
        "file"
    }

    fn get_allowed_verbs(&self, available_verbs: &VerbSet) -> Result<Option<VerbSet>, ConfigError> {
        if self
            .option(ROOT_SECTION, "allowed_verbs")
            .is_none_or(|v| v.trim().is_empty())
        {
            return Ok(None);
        }
        self.verbs_option("allowed_verbs", available_verbs)
    }

    fn get_flag_allowlist(&self, scope: &Scope) -> Result<Option<Allowlist>, ConfigError> {
        let name = scoped_section(scope, "flags.allowlist");
        let Some(section) = self.section(&name) else {
            return Ok(None);
        };

        let mut allowlist = Allowlist::new();
        for (flag, value) in section {
            let enabled = parse_bool(Some(value), false).map_err(|e| ConfigError::Format {
                location: self.option_location(&name, flag),
                message: format!(
                    "Value {:?} could not be coerced to a boolean value. Valid values: {}",
                    e.0,
                    valid_values().join(", ")
                ),
            })?;
            allowlist.insert(snake_case(flag), enabled);
        }

        self.registry.validate_flag_availability(
            scope,
            section.keys().map(String::as_str),
            &format!("{}: Unrecognized flags", self.section_location(&name)),
            |flag| format!("Option `[{name}].{flag}`"),
        )?;
        tracing::debug!(section = %name, flags = allowlist.len(), "read flag allowlist");
        Ok(Some(allowlist))
    }

    fn get_flag_allowlist_apply_global(
        &self,
        available_verbs: &VerbSet,
    ) -> Result<Option<VerbSet>, ConfigError> {
        self.verbs_option("apply_global_allowlist", available_verbs)
    }

    fn get_env_variables(&self, scope: &Scope) -> Result<Option<EnvVars>, ConfigError> {
        let name = scoped_section(scope, "env_vars");
        let Some(section) = self.section(&name) else {
            return Ok(None);
        };
        let rename = self.rename_env()?;

        let mut env_vars = EnvVars::new();
        let mut invalid = Vec::new();
        for (key, value) in section {
            let key = key.to_uppercase();
            if !ENV_VAR_NAME.is_match(&key) {
                invalid.push(key);
                continue;
            }
            env_vars.insert(forwarded_env_name(&key, rename), value.clone());
        }
        if !invalid.is_empty() {
            return Err(ConfigError::InvalidEnvVarNames {
                location: self.section_location(&name),
                names: invalid,
            });
        }
        tracing::debug!(section = %name, variables = env_vars.len(), rename, "read env variables");
        Ok(Some(env_vars))
    }

    fn get_env_variables_apply_global(
        &self,
        available_verbs: &VerbSet,
    ) -> Result<Option<VerbSet>, ConfigError> {
        self.verbs_option("apply_global_env_vars", available_verbs)
    }

    fn get_flag_internal_values(&self, scope: &Scope) -> Result<Option<RawValues>, ConfigError> {
        let name = scoped_section(scope, "flags.values");
        let Some(section) = self.section(&name) else {
            return Ok(None);
        };

        self.registry.validate_flag_availability(
            scope,
            section.keys().map(String::as_str),
            &format!("{}: Unrecognized flags", self.section_location(&name)),
            |flag| format!("Option `[{name}].{flag}`"),
        )?;
        let values: RawValues = section
            .iter()
            .map(|(flag, value)| (snake_case(flag), value.clone()))
            .collect();
        tracing::debug!(section = %name, flags = values.len(), "read internal flag values");
        Ok(Some(values))
    }

    fn get_flag_internal_values_apply_global(
        &self,
        available_verbs: &VerbSet,
    ) -> Result<Option<VerbSet>, ConfigError> {
        self.verbs_option("apply_global_internal_flag_values", available_verbs)
    }

    fn get_projects_root_dir(&self) -> Result<Option<PathBuf>, ConfigError> {
        let Some(value) = self
            .option(ROOT_SECTION, "projects_root_dir")
            .filter(|v| !v.trim().is_empty())
        else {
            return Ok(None);
        };
        let location = self.option_location(ROOT_SECTION, "projects_root_dir");
        validate_projects_root(Path::new(value.trim()), &location).map(Some)
    }

    fn get_variables(&self, scope: &Scope) -> Result<Option<Variables>, ConfigError> {
        let name = scoped_section(scope, "vars");
        Ok(self.section(&name).map(|section| {
            section
                .iter()
                .map(|(key, value)| (snake_case(key), value.clone()))
                .collect()
        }))
    }

    fn get_variables_apply_global(
        &self,
        available_verbs: &VerbSet,
    ) -> Result<Option<VerbSet>, ConfigError> {
        self.verbs_option("apply_global_vars", available_verbs)
    }
}
