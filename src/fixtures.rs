#[cfg(test)]
pub mod test {
    use std::collections::BTreeMap;
    use std::path::{Path, PathBuf};

    use tempfile::TempDir;

    use crate::error::ConfigError;
    use crate::provider::ConfigProvider;
    use crate::schema::SchemaRegistry;
    use crate::types::{Allowlist, EnvVars, RawValues, Scope, Variables, VerbSet};

    /// Verbs shipped under `defaults/`.
    pub fn bundled_verbs() -> VerbSet {
        verbs(&["run", "seed", "snapshot", "test"])
    }

    pub fn verbs(names: &[&str]) -> VerbSet {
        names.iter().map(|v| v.to_string()).collect()
    }

    pub fn map<V: Clone>(pairs: &[(&str, V)]) -> BTreeMap<String, V> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    pub fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    // -- Throwaway schema and allowlist directories ------------------------------

    pub struct SchemaDirs {
        root: TempDir,
    }

    impl SchemaDirs {
        pub fn new() -> Self {
            let root = TempDir::new().unwrap();
            std::fs::create_dir(root.path().join("jsonschema")).unwrap();
            std::fs::create_dir(root.path().join("flag_allowlists")).unwrap();
            Self { root }
        }

        pub fn registry(&self) -> SchemaRegistry {
            SchemaRegistry::new(self.schema_dir(), self.allowlist_dir())
        }

        pub fn schema_dir(&self) -> PathBuf {
            self.root.path().join("jsonschema")
        }

        pub fn allowlist_dir(&self) -> PathBuf {
            self.root.path().join("flag_allowlists")
        }

        /// Write `global.yml` declaring `properties` (a YAML mapping body).
        pub fn global_schema(&self, properties: &str) {
            let body = format!(
                "$id: global.yml\ntype: object\nproperties:\n{}",
                indent(properties, 2)
            );
            write(&self.schema_dir().join("global.yml"), &body);
        }

        /// Write `dbt-{verb}.yml` composing with `global.yml` through `allOf`.
        pub fn schema(&self, verb: &str, properties: &str) {
            let body = format!(
                "$id: dbt-{verb}.yml\nallOf:\n  - $ref: global.yml\n  - type: object\n    properties:\n{}",
                indent(properties, 6)
            );
            write(&self.schema_dir().join(format!("dbt-{verb}.yml")), &body);
        }

        pub fn global_allowlist(&self, content: &str) {
            write(&self.allowlist_dir().join("global.yml"), content);
        }

        pub fn allowlist(&self, verb: &str, content: &str) {
            write(&self.allowlist_dir().join(format!("dbt-{verb}.yml")), content);
        }
    }

    fn write(path: &Path, content: &str) {
        std::fs::write(path, content).unwrap();
    }

    fn indent(body: &str, width: usize) -> String {
        if body.trim().is_empty() {
            return format!("{}{{}}\n", " ".repeat(width));
        }
        body.lines()
            .map(|line| format!("{}{line}\n", " ".repeat(width)))
            .collect()
    }

    // -- In-memory provider ------------------------------------------------------

    /// A provider answering from plain fields. Unset fields answer `None`.
    #[derive(Debug, Clone, Default)]
    pub struct StaticProvider {
        pub name: String,
        pub allowed_verbs: Option<VerbSet>,
        pub allowlists: BTreeMap<Scope, Allowlist>,
        pub allowlist_apply_global: Option<VerbSet>,
        pub env_vars: BTreeMap<Scope, EnvVars>,
        pub env_vars_apply_global: Option<VerbSet>,
        pub internal_values: BTreeMap<Scope, RawValues>,
        pub internal_values_apply_global: Option<VerbSet>,
        pub projects_root_dir: Option<PathBuf>,
        pub variables: BTreeMap<Scope, Variables>,
        pub variables_apply_global: Option<VerbSet>,
    }

    impl StaticProvider {
        pub fn named(name: &str) -> Self {
            Self {
                name: name.to_string(),
                ..Self::default()
            }
        }

        pub fn with_root(mut self, root: &Path) -> Self {
            self.projects_root_dir = Some(root.to_path_buf());
            self
        }

        pub fn with_allowlist(mut self, scope: Scope, entries: &[(&str, bool)]) -> Self {
            self.allowlists.insert(scope, map(entries));
            self
        }

        pub fn with_values(mut self, scope: Scope, entries: &[(&str, &str)]) -> Self {
            let values = entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            self.internal_values.insert(scope, values);
            self
        }

        pub fn with_env(mut self, scope: Scope, entries: &[(&str, &str)]) -> Self {
            let env = entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            self.env_vars.insert(scope, env);
            self
        }

        pub fn with_vars(mut self, scope: Scope, entries: &[(&str, &str)]) -> Self {
            let variables = entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            self.variables.insert(scope, variables);
            self
        }
    }

    impl ConfigProvider for StaticProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn get_allowed_verbs(&self, _: &VerbSet) -> Result<Option<VerbSet>, ConfigError> {
            Ok(self.allowed_verbs.clone())
        }

        fn get_flag_allowlist(&self, scope: &Scope) -> Result<Option<Allowlist>, ConfigError> {
            Ok(self.allowlists.get(scope).cloned())
        }

        fn get_flag_allowlist_apply_global(&self, _: &VerbSet) -> Result<Option<VerbSet>, ConfigError> {
            Ok(self.allowlist_apply_global.clone())
        }

        fn get_env_variables(&self, scope: &Scope) -> Result<Option<EnvVars>, ConfigError> {
            Ok(self.env_vars.get(scope).cloned())
        }

        fn get_env_variables_apply_global(&self, _: &VerbSet) -> Result<Option<VerbSet>, ConfigError> {
            Ok(self.env_vars_apply_global.clone())
        }

        fn get_flag_internal_values(&self, scope: &Scope) -> Result<Option<RawValues>, ConfigError> {
            Ok(self.internal_values.get(scope).cloned())
        }

        fn get_flag_internal_values_apply_global(
            &self,
            _: &VerbSet,
        ) -> Result<Option<VerbSet>, ConfigError> {
            Ok(self.internal_values_apply_global.clone())
        }

        fn get_projects_root_dir(&self) -> Result<Option<PathBuf>, ConfigError> {
            Ok(self.projects_root_dir.clone())
        }

        fn get_variables(&self, scope: &Scope) -> Result<Option<Variables>, ConfigError> {
            Ok(self.variables.get(scope).cloned())
        }

        fn get_variables_apply_global(&self, _: &VerbSet) -> Result<Option<VerbSet>, ConfigError> {
            Ok(self.variables_apply_global.clone())
        }
    }

    #[test]
    fn schema_dirs_round_trip_through_registry() {
        let dirs = SchemaDirs::new();
        dirs.global_schema("debug: {type: boolean}\n");
        dirs.schema("run", "threads: {type: integer}\n");
        dirs.allowlist("run", "threads: true\n");

        let registry = dirs.registry();
        assert_eq!(registry.available_verbs().unwrap(), verbs(&["run"]));
        let schema = registry.read_schema(&Scope::verb("run"), true).unwrap();
        assert!(schema.properties.contains_key("debug"));
        assert!(schema.properties.contains_key("threads"));
    }
}
