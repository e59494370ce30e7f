use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use crate::defaults::DefaultsProvider;
use crate::env::{EnvironmentProvider, process_vars};
use crate::error::ConfigError;
use crate::file::FileProvider;
use crate::provider::ConfigProvider;
use crate::resolve::{ConfigResolver, Configuration};
use crate::schema::SchemaRegistry;

/// Entry point for resolving dbt configuration.
pub struct DbtConfig;

impl DbtConfig {
    pub fn builder() -> DbtConfigBuilder {
        DbtConfigBuilder::new()
    }
}

/// Chooses the sources a resolution reads.
///
/// By default: the bundled schema registry, the file named by
/// `DBT_CONFIG_FILE`, and the process environment, in that priority order.
/// Providers added with [`provider()`](Self::provider) rank above all of them.
pub struct DbtConfigBuilder {
    registry: Option<SchemaRegistry>,
    env_vars: Option<Vec<(String, String)>>,
    config_file: Option<PathBuf>,
    file_enabled: bool,
    env_enabled: bool,
    providers: Vec<Arc<dyn ConfigProvider>>,
}

impl DbtConfigBuilder {
    fn new() -> Self {
        Self {
            registry: None,
            env_vars: None,
            config_file: None,
            file_enabled: true,
            env_enabled: true,
            providers: Vec::new(),
        }
    }

    /// Use schemas and default allowlists from `registry` instead of the bundled ones.
    pub fn registry(mut self, registry: SchemaRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Read these variables instead of the process environment.
    ///
    /// They also decide which file `DBT_CONFIG_FILE` points to.
    pub fn env_vars<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.env_vars = Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        self
    }

    /// Read this file instead of the one named by `DBT_CONFIG_FILE`.
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Skip the configuration file.
    pub fn no_file(mut self) -> Self {
        self.file_enabled = false;
        self
    }

    /// Skip environment variables (`DBT_CONFIG_FILE` is still honoured).
    pub fn no_env(mut self) -> Self {
        self.env_enabled = false;
        self
    }

    /// Append a provider with higher priority than every built-in source.
    pub fn provider(mut self, provider: impl ConfigProvider + 'static) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    /// Build the providers and return the resolver without running it.
    pub fn resolver(self) -> Result<ConfigResolver, ConfigError> {
        let registry = self.registry.unwrap_or_default();
        let vars = match self.env_vars {
            Some(vars) => vars,
            None => process_vars().collect(),
        };

        let mut providers: Vec<Arc<dyn ConfigProvider>> =
            vec![Arc::new(DefaultsProvider::new(registry.clone()))];
        if self.file_enabled {
            let file = match self.config_file {
                Some(path) => FileProvider::from_path(registry.clone(), path)?,
                None => FileProvider::from_vars(registry.clone(), vars.iter().cloned())?,
            };
            providers.push(Arc::new(file));
        }
        if self.env_enabled {
            providers.push(Arc::new(EnvironmentProvider::from_vars(registry.clone(), vars)));
        }
        providers.extend(self.providers);

        Ok(ConfigResolver::new(registry, providers))
    }

    /// Resolve the configuration.
    pub fn load(self) -> Result<Configuration, ConfigError> {
        self.resolver()?.create_instance()
    }
}

type ResolverFactory = dyn Fn() -> Result<ConfigResolver, ConfigError> + Send + Sync;

/// Holds the resolved configuration for the rest of the process.
///
/// Created once at startup and passed to whoever needs the configuration.
/// The first [`get()`](Self::get) resolves and caches; later calls share the
/// cached value. A failed resolution caches nothing.
pub struct ConfigContext {
    factory: Box<ResolverFactory>,
    cached: Mutex<Option<Arc<Configuration>>>,
}

impl ConfigContext {
    /// `factory` builds a fresh resolver for every resolution.
    pub fn new(
        factory: impl Fn() -> Result<ConfigResolver, ConfigError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            factory: Box::new(factory),
            cached: Mutex::new(None),
        }
    }

    /// Bundled registry, `DBT_CONFIG_FILE` and the process environment.
    pub fn from_process_env() -> Self {
        Self::new(|| DbtConfig::builder().resolver())
    }

    /// The cached configuration, resolving it on first use.
    pub fn get(&self) -> Result<Arc<Configuration>, ConfigError> {
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(config) = cached.as_ref() {
            return Ok(Arc::clone(config));
        }
        let config = Arc::new((self.factory)()?.create_instance()?);
        *cached = Some(Arc::clone(&config));
        Ok(config)
    }

    /// Drop the cached configuration; the next `get()` resolves again.
    pub fn reset(&self) {
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        if cached.take().is_some() {
            tracing::debug!("dbt configuration cache cleared");
        }
    }

    /// Resolve again unconditionally and replace the cache.
    pub fn rebuild(&self) -> Result<Arc<Configuration>, ConfigError> {
        self.reset();
        self.get()
    }

    pub fn is_initialized(&self) -> bool {
        self.cached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
