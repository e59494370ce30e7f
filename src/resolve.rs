//! Core resolution pipeline: query every provider and assemble a [`Configuration`].
//!
//! Providers are queried lowest priority first. Steps:
//!
//! 1. Put a [`DefaultsProvider`] at the front of the list (prepend or move)
//! 2. Take the available verbs from the defaults provider
//! 3. Resolve each attribute: scalars and verb sets keep the last `Some`,
//!    maps are merged key by key (later providers win), once for the global
//!    scope and once per available verb
//! 4. Merge global entries into every verb of each attribute's global-apply
//!    set, verb entries winning
//! 5. Coerce and validate internal flag values per scope
//! 6. Require a projects root directory
//! 7. Freeze the result
//!
//! Any provider error aborts the whole resolution.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::defaults::DefaultsProvider;
use crate::error::ConfigError;
use crate::merge::{apply_global, last_some, merge_layers};
use crate::provider::{ConfigProvider, default_providers};
use crate::schema::SchemaRegistry;
use crate::types::{Allowlist, EnvVars, InternalValues, Scope, Scoped, Variables, VerbSet};
use crate::validate::ValidationStage;

/// The resolved, validated configuration. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Configuration {
    allowed_verbs: VerbSet,
    flag_allowlists: Scoped<Allowlist>,
    env_variables: Scoped<EnvVars>,
    flag_internal_values: Scoped<InternalValues>,
    variables: Scoped<Variables>,
    projects_root_dir: PathBuf,
}

impl Configuration {
    pub fn allowed_verbs(&self) -> &VerbSet {
        &self.allowed_verbs
    }

    pub fn is_verb_allowed(&self, verb: &str) -> bool {
        self.allowed_verbs.contains(verb)
    }

    pub fn flag_allowlists(&self) -> &Scoped<Allowlist> {
        &self.flag_allowlists
    }

    /// Whether `flag` may be passed through for `scope`. Absent means no.
    pub fn is_flag_allowed(&self, scope: &Scope, flag: &str) -> bool {
        self.flag_allowlists
            .get(scope)
            .and_then(|allowlist| allowlist.get(flag))
            .copied()
            .unwrap_or(false)
    }

    pub fn env_variables(&self) -> &Scoped<EnvVars> {
        &self.env_variables
    }

    pub fn flag_internal_values(&self) -> &Scoped<InternalValues> {
        &self.flag_internal_values
    }

    pub fn variables(&self) -> &Scoped<Variables> {
        &self.variables
    }

    pub fn projects_root_dir(&self) -> &Path {
        &self.projects_root_dir
    }
}

/// Merges an ordered list of providers into a [`Configuration`].
pub struct ConfigResolver {
    registry: SchemaRegistry,
    providers: Vec<Arc<dyn ConfigProvider>>,
}

impl ConfigResolver {
    /// Build a resolver over `providers`, lowest priority first.
    ///
    /// The defaults provider always ends up first: one is prepended when the
    /// list has none, and an existing one is moved to the front.
    pub fn new(registry: SchemaRegistry, mut providers: Vec<Arc<dyn ConfigProvider>>) -> Self {
        match providers.iter().position(|p| p.as_defaults().is_some()) {
            Some(0) => {}
            Some(index) => {
                let defaults = providers.remove(index);
                providers.insert(0, defaults);
            }
            None => providers.insert(0, Arc::new(DefaultsProvider::new(registry.clone()))),
        }
        Self {
            registry,
            providers,
        }
    }

    /// Defaults, the `DBT_CONFIG_FILE` file and the process environment.
    pub fn from_process_env(registry: SchemaRegistry) -> Result<Self, ConfigError> {
        let providers = default_providers(&registry)?;
        Ok(Self::new(registry, providers))
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Providers in priority order, defaults first.
    pub fn providers(&self) -> &[Arc<dyn ConfigProvider>] {
        &self.providers
    }

    /// Resolve all attributes and validate the result.
    pub fn create_instance(&self) -> Result<Configuration, ConfigError> {
        let available_verbs = match self.providers.first().and_then(|p| p.as_defaults()) {
            Some(defaults) => defaults.available_verbs()?,
            None => self.registry.available_verbs()?,
        };
        let scopes = Scope::all(&available_verbs);
        tracing::debug!(verbs = ?available_verbs, providers = self.providers.len(), "resolving dbt configuration");

        let allowed_verbs = self
            .last_set("allowed_verbs", |p| p.get_allowed_verbs(&available_verbs))?
            .unwrap_or_default();

        let flag_allowlists = self.scoped("flag_allowlists", &scopes, |p, s| p.get_flag_allowlist(s))?;
        let allowlist_apply = self.apply_set("flag_allowlists", |p| {
            p.get_flag_allowlist_apply_global(&available_verbs)
        })?;

        let env_variables = self.scoped("env_variables", &scopes, |p, s| p.get_env_variables(s))?;
        let env_apply = self.apply_set("env_variables", |p| {
            p.get_env_variables_apply_global(&available_verbs)
        })?;

        let raw_values =
            self.scoped("flag_internal_values", &scopes, |p, s| p.get_flag_internal_values(s))?;
        let values_apply = self.apply_set("flag_internal_values", |p| {
            p.get_flag_internal_values_apply_global(&available_verbs)
        })?;

        let projects_root_dir = self.last_set("projects_root_dir", |p| p.get_projects_root_dir())?;

        let variables = self.scoped("variables", &scopes, |p, s| p.get_variables(s))?;
        let variables_apply = self.apply_set("variables", |p| {
            p.get_variables_apply_global(&available_verbs)
        })?;

        let flag_allowlists = apply_global_scope(flag_allowlists, &allowlist_apply);
        let env_variables = apply_global_scope(env_variables, &env_apply);
        let raw_values = apply_global_scope(raw_values, &values_apply);
        let variables = apply_global_scope(variables, &variables_apply);

        let stage = ValidationStage::new(&self.registry);
        let mut flag_internal_values = Scoped::<InternalValues>::default();
        for (scope, raw) in raw_values.iter() {
            let values = stage.coerce_and_validate(&scope, raw.clone())?;
            match scope {
                Scope::Global => flag_internal_values.global = values,
                Scope::Verb(verb) => {
                    flag_internal_values.verbs.insert(verb, values);
                }
            }
        }

        let projects_root_dir = projects_root_dir.ok_or_else(|| ConfigError::MissingRequired {
            key: "projects_root_dir".into(),
            hint: "set DBT_PROJECTS_ROOT or the `[dbt].projects_root_dir` file option".into(),
        })?;

        tracing::info!(
            allowed_verbs = ?allowed_verbs,
            projects_root_dir = %projects_root_dir.display(),
            "dbt configuration resolved"
        );
        Ok(Configuration {
            allowed_verbs,
            flag_allowlists,
            env_variables,
            flag_internal_values,
            variables,
            projects_root_dir,
        })
    }

    /// Last `Some` answer across providers.
    fn last_set<T: std::fmt::Debug>(
        &self,
        attribute: &str,
        query: impl Fn(&dyn ConfigProvider) -> Result<Option<T>, ConfigError>,
    ) -> Result<Option<T>, ConfigError> {
        let mut answers = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            let answer = query(provider.as_ref())?;
            if let Some(value) = &answer {
                tracing::debug!(provider = provider.name(), attribute, ?value, "provider sets attribute");
            }
            answers.push(answer);
        }
        Ok(last_some(answers))
    }

    fn apply_set(
        &self,
        attribute: &str,
        query: impl Fn(&dyn ConfigProvider) -> Result<Option<VerbSet>, ConfigError>,
    ) -> Result<VerbSet, ConfigError> {
        let attribute = format!("{attribute}.apply_global");
        Ok(self.last_set(&attribute, query)?.unwrap_or_default())
    }

    /// Key-by-key merge across providers for one scope.
    fn merged<V>(
        &self,
        attribute: &str,
        scope: &Scope,
        query: &impl Fn(&dyn ConfigProvider, &Scope) -> Result<Option<BTreeMap<String, V>>, ConfigError>,
    ) -> Result<BTreeMap<String, V>, ConfigError> {
        let mut layers = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            let layer = query(provider.as_ref(), scope)?;
            if let Some(entries) = &layer {
                tracing::debug!(
                    provider = provider.name(),
                    attribute,
                    %scope,
                    entries = entries.len(),
                    "provider contributes entries"
                );
            }
            layers.push(layer);
        }
        Ok(merge_layers(layers))
    }

    fn scoped<V>(
        &self,
        attribute: &str,
        scopes: &[Scope],
        query: impl Fn(&dyn ConfigProvider, &Scope) -> Result<Option<BTreeMap<String, V>>, ConfigError>,
    ) -> Result<Scoped<BTreeMap<String, V>>, ConfigError> {
        let mut scoped = Scoped {
            global: BTreeMap::new(),
            verbs: BTreeMap::new(),
        };
        for scope in scopes {
            let entries = self.merged(attribute, scope, &query)?;
            match scope {
                Scope::Global => scoped.global = entries,
                Scope::Verb(verb) => {
                    scoped.verbs.insert(verb.clone(), entries);
                }
            }
        }
        Ok(scoped)
    }
}

/// Merge global entries under each verb in `verbs`; verb entries win.
fn apply_global_scope<V: Clone>(
    mut scoped: Scoped<BTreeMap<String, V>>,
    verbs: &VerbSet,
) -> Scoped<BTreeMap<String, V>> {
    for (verb, entries) in scoped.verbs.iter_mut() {
        if verbs.contains(verb) {
            *entries = apply_global(&scoped.global, std::mem::take(entries));
        }
    }
    scoped
}
