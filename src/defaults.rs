use std::path::PathBuf;

use crate::error::ConfigError;
use crate::provider::ConfigProvider;
use crate::schema::{DOCUMENT_SUFFIX, GLOBAL_DOCUMENT, SchemaRegistry, VERB_DOCUMENT_PREFIX};
use crate::types::{Allowlist, EnvVars, RawValues, Scope, Variables, VerbSet};

/// The compiled-in base layer.
///
/// Allows every available verb, applies every global setting to every verb,
/// and supplies the default allowlists shipped with the schema registry.
#[derive(Debug, Clone, Default)]
pub struct DefaultsProvider {
    registry: SchemaRegistry,
}

impl DefaultsProvider {
    pub fn new(registry: SchemaRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Verbs with both a schema and a default allowlist.
    pub fn available_verbs(&self) -> Result<VerbSet, ConfigError> {
        self.registry.available_verbs()
    }
}

impl ConfigProvider for DefaultsProvider {
    fn name(&self) -> &str {
        "defaults"
    }

    fn as_defaults(&self) -> Option<&DefaultsProvider> {
        Some(self)
    }

    fn get_allowed_verbs(&self, _available_verbs: &VerbSet) -> Result<Option<VerbSet>, ConfigError> {
        Ok(Some(self.available_verbs()?))
    }

    fn get_flag_allowlist(&self, scope: &Scope) -> Result<Option<Allowlist>, ConfigError> {
        let allowlist = self.registry.read_default_allowlist(scope)?;
        let document = match scope {
            Scope::Global => GLOBAL_DOCUMENT.to_string(),
            Scope::Verb(verb) => format!("{VERB_DOCUMENT_PREFIX}{verb}{DOCUMENT_SUFFIX}"),
        };
        self.registry.validate_flag_availability(
            scope,
            allowlist.keys().map(String::as_str),
            &format!("Default allowlist `{document}`: Unrecognized flags"),
            |flag| format!("Default allowlist `{document}`, key `{flag}`"),
        )?;
        Ok(Some(allowlist))
    }

    fn get_flag_allowlist_apply_global(
        &self,
        available_verbs: &VerbSet,
    ) -> Result<Option<VerbSet>, ConfigError> {
        Ok(Some(available_verbs.clone()))
    }

    fn get_env_variables(&self, _scope: &Scope) -> Result<Option<EnvVars>, ConfigError> {
        Ok(None)
    }

    fn get_env_variables_apply_global(
        &self,
        available_verbs: &VerbSet,
    ) -> Result<Option<VerbSet>, ConfigError> {
        Ok(Some(available_verbs.clone()))
    }

    fn get_flag_internal_values(&self, _scope: &Scope) -> Result<Option<RawValues>, ConfigError> {
        Ok(None)
    }

    fn get_flag_internal_values_apply_global(
        &self,
        available_verbs: &VerbSet,
    ) -> Result<Option<VerbSet>, ConfigError> {
        Ok(Some(available_verbs.clone()))
    }

    fn get_projects_root_dir(&self) -> Result<Option<PathBuf>, ConfigError> {
        Ok(None)
    }

    fn get_variables(&self, _scope: &Scope) -> Result<Option<Variables>, ConfigError> {
        Ok(None)
    }

    fn get_variables_apply_global(
        &self,
        available_verbs: &VerbSet,
    ) -> Result<Option<VerbSet>, ConfigError> {
        Ok(Some(available_verbs.clone()))
    }
}
