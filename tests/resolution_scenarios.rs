//! End-to-end resolution through the public API.
//!
//! Environment input is injected through `DbtConfig::builder().env_vars(..)`
//! except in the tests marked `#[serial]`, which touch the real process
//! environment through `temp_env`.

use std::path::Path;

use serial_test::serial;
use tempfile::TempDir;

use dbt_config::{
    ConfigContext, ConfigError, ConfigProvider, DbtConfig, EnvironmentProvider, FlagValue, Scope,
    SchemaRegistry, VerbSet,
};

fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn with_root(root: &Path, pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    let mut all = vars(pairs);
    all.push(("DBT_PROJECTS_ROOT".into(), root.display().to_string()));
    all
}

fn write_config(dir: &TempDir, content: &str) -> String {
    let path = dir.path().join("dbt.ini");
    std::fs::write(&path, content).unwrap();
    path.display().to_string()
}

/// Registry whose global schema declares `foo_bar`, `flag1` and `flag2`.
fn custom_registry(dir: &TempDir) -> SchemaRegistry {
    let schemas = dir.path().join("jsonschema");
    let allowlists = dir.path().join("flag_allowlists");
    std::fs::create_dir_all(&schemas).unwrap();
    std::fs::create_dir_all(&allowlists).unwrap();
    std::fs::write(
        schemas.join("global.yml"),
        "properties:\n  foo_bar: {type: boolean}\n  flag1: {type: boolean}\n  flag2: {type: string}\n",
    )
    .unwrap();
    std::fs::write(
        schemas.join("dbt-run.yml"),
        "allOf:\n  - $ref: global.yml\n  - properties:\n      threads: {type: integer}\n",
    )
    .unwrap();
    std::fs::write(allowlists.join("global.yml"), "foo_bar: false\n").unwrap();
    std::fs::write(allowlists.join("dbt-run.yml"), "threads: true\n").unwrap();
    SchemaRegistry::new(schemas, allowlists)
}

fn bundled_verbs() -> VerbSet {
    ["run", "seed", "snapshot", "test"]
        .into_iter()
        .map(String::from)
        .collect()
}

#[test]
fn kebab_flag_round_trips_to_snake_case() {
    let dir = TempDir::new().unwrap();
    let provider = EnvironmentProvider::from_vars(
        custom_registry(&dir),
        vars(&[("DBT_ENABLE_FLAGS", "foo-bar")]),
    );
    let allowlist = provider.get_flag_allowlist(&Scope::Global).unwrap().unwrap();
    assert_eq!(allowlist.len(), 1);
    assert_eq!(allowlist.get("foo_bar"), Some(&true));
}

#[test]
fn enable_flags_lists_every_flag() {
    let dir = TempDir::new().unwrap();
    let provider = EnvironmentProvider::from_vars(
        custom_registry(&dir),
        vars(&[("DBT_ENABLE_FLAGS", "flag1,flag2")]),
    );
    let allowlist = provider.get_flag_allowlist(&Scope::Global).unwrap().unwrap();
    assert_eq!(allowlist.get("flag1"), Some(&true));
    assert_eq!(allowlist.get("flag2"), Some(&true));
    assert_eq!(allowlist.len(), 2);
}

#[test]
fn custom_registry_drives_available_verbs() {
    let dir = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    let config = DbtConfig::builder()
        .registry(custom_registry(&dir))
        .env_vars(with_root(root.path(), &[]))
        .load()
        .unwrap();
    assert_eq!(config.allowed_verbs().len(), 1);
    assert!(config.is_flag_allowed(&Scope::verb("run"), "threads"));
    assert!(!config.is_flag_allowed(&Scope::verb("run"), "foo_bar"));
}

#[test]
fn integer_internal_value_is_typed() {
    let root = TempDir::new().unwrap();
    let config = DbtConfig::builder()
        .env_vars(with_root(root.path(), &[("DBT_RUN_FLAG_THREADS", "4")]))
        .no_file()
        .load()
        .unwrap();
    let run = config.flag_internal_values().for_verb("run").unwrap();
    assert_eq!(run.get("threads"), Some(&FlagValue::Integer(4)));
    assert_ne!(run.get("threads"), Some(&FlagValue::String("4".into())));
}

#[test]
fn missing_projects_root_is_not_found() {
    let err = DbtConfig::builder()
        .env_vars(vars(&[("DBT_PROJECTS_ROOT", "/nonexistent/dbt/projects")]))
        .no_file()
        .load()
        .unwrap_err();
    assert!(matches!(err, ConfigError::NotFound { .. }), "{err}");
}

#[test]
fn wildcard_allows_every_available_verb() {
    let root = TempDir::new().unwrap();
    let config = DbtConfig::builder()
        .env_vars(with_root(root.path(), &[("DBT_ALLOWED_VERBS", "*")]))
        .no_file()
        .load()
        .unwrap();
    assert_eq!(config.allowed_verbs(), &SchemaRegistry::bundled().available_verbs().unwrap());
    assert_eq!(config.allowed_verbs(), &bundled_verbs());
}

#[test]
fn environment_beats_file_beats_defaults() {
    let dir = TempDir::new().unwrap();
    let file = write_config(
        &dir,
        &format!(
            "[dbt]\nprojects_root_dir = {}\n[dbt.run.flags.allowlist]\nthreads = yes\nstate = yes\n",
            dir.path().display()
        ),
    );

    // defaults only: threads disallowed
    let config = DbtConfig::builder()
        .env_vars(with_root(dir.path(), &[]))
        .load()
        .unwrap();
    assert!(!config.is_flag_allowed(&Scope::verb("run"), "threads"));

    // file enables it
    let config = DbtConfig::builder()
        .env_vars(vars(&[("DBT_CONFIG_FILE", &file)]))
        .load()
        .unwrap();
    assert!(config.is_flag_allowed(&Scope::verb("run"), "threads"));

    // environment disables it again; the file's other key survives
    let config = DbtConfig::builder()
        .env_vars(vars(&[
            ("DBT_CONFIG_FILE", &file),
            ("DBT_RUN_DISABLE_FLAGS", "threads"),
        ]))
        .load()
        .unwrap();
    assert!(!config.is_flag_allowed(&Scope::verb("run"), "threads"));
    assert!(config.is_flag_allowed(&Scope::verb("run"), "state"));
}

#[test]
fn global_apply_scope_limits_merge() {
    let dir = TempDir::new().unwrap();
    let file = write_config(&dir, "[dbt.flags.allowlist]\nprinter-width = on\n");
    let config = DbtConfig::builder()
        .env_vars(with_root(
            dir.path(),
            &[
                ("DBT_CONFIG_FILE", &file),
                ("DBT_APPLY_GLOBAL_ALLOWLIST", "run"),
                ("DBT_VAR_REGION", "eu"),
                ("DBT_VAR_SCHEMA", "analytics"),
                ("DBT_RUN_VAR_REGION", "us"),
            ],
        ))
        .load()
        .unwrap();

    let allowlists = config.flag_allowlists();
    assert_eq!(allowlists.for_verb("run").unwrap().get("printer_width"), Some(&true));
    assert_eq!(allowlists.for_verb("seed").unwrap().get("printer_width"), None);

    let run_vars = config.variables().for_verb("run").unwrap();
    assert_eq!(run_vars["region"], "us");
    assert_eq!(run_vars["schema"], "analytics");
}

#[test]
fn environment_overrides_file_on_digit_bearing_key() {
    let dir = TempDir::new().unwrap();
    let file = write_config(&dir, "[dbt.vars]\ns3bucket = from-file\nregion = eu\n");
    let config = DbtConfig::builder()
        .env_vars(with_root(
            dir.path(),
            &[("DBT_CONFIG_FILE", &file), ("DBT_VAR_S3BUCKET", "from-env")],
        ))
        .load()
        .unwrap();

    let global = &config.variables().global;
    assert_eq!(global.get("s3bucket").map(String::as_str), Some("from-env"));
    assert_eq!(global.get("region").map(String::as_str), Some("eu"));
    assert_eq!(global.len(), 2, "{global:?}");
}

#[test]
fn two_unrecognized_flags_two_sub_errors() {
    let root = TempDir::new().unwrap();
    let err = DbtConfig::builder()
        .env_vars(with_root(
            root.path(),
            &[("DBT_RUN_ENABLE_FLAGS", "threads,bogus-one,bogus-two")],
        ))
        .no_file()
        .load()
        .unwrap_err();

    let subs = err.sub_errors();
    assert_eq!(subs.len(), 2, "{err}");
    assert!(subs[0].to_string().contains("--bogus-one"));
    assert!(subs[1].to_string().contains("--bogus-two"));
}

#[test]
fn resolution_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let file = write_config(&dir, "[dbt.seed.flags.values]\nfull-refresh = yes\n");
    let env = with_root(
        dir.path(),
        &[
            ("DBT_CONFIG_FILE", &file),
            ("DBT_RUN_FLAG_THREADS", "8"),
            ("DBT_ENV_TARGET", "prod"),
        ],
    );

    let first = DbtConfig::builder().env_vars(env.clone()).load().unwrap();
    let second = DbtConfig::builder().env_vars(env).load().unwrap();
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
#[serial]
fn context_reads_process_environment() {
    let root = TempDir::new().unwrap();
    let root_str = root.path().display().to_string();
    temp_env::with_vars(
        [
            ("DBT_PROJECTS_ROOT", Some(root_str.as_str())),
            ("DBT_ALLOWED_VERBS", Some("seed")),
            ("DBT_CONFIG_FILE", None),
        ],
        || {
            let context = ConfigContext::from_process_env();
            let config = context.get().unwrap();
            assert_eq!(config.allowed_verbs().len(), 1);
            assert!(config.is_verb_allowed("seed"));
        },
    );
}

#[test]
#[serial]
fn context_rebuild_sees_new_environment() {
    let root = TempDir::new().unwrap();
    let root_str = root.path().display().to_string();
    temp_env::with_vars(
        [
            ("DBT_PROJECTS_ROOT", Some(root_str.as_str())),
            ("DBT_CONFIG_FILE", None),
            ("DBT_ALLOWED_VERBS", Some("run")),
        ],
        || {
            let context = ConfigContext::from_process_env();
            assert!(context.get().unwrap().is_verb_allowed("run"));

            temp_env::with_var("DBT_ALLOWED_VERBS", Some("test"), || {
                // cached until rebuilt
                assert!(context.get().unwrap().is_verb_allowed("run"));
                let rebuilt = context.rebuild().unwrap();
                assert!(rebuilt.is_verb_allowed("test"));
                assert!(!rebuilt.is_verb_allowed("run"));
            });
        },
    );
}
