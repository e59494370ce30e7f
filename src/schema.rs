//! Declarative flag schemas and default allowlists, one document per scope.
//!
//! Definitions come in two document sets, compiled into the crate from
//! `defaults/` or read from a pair of directories:
//!
//! - the **schema directory**: `global.yml` plus one `dbt-{verb}.yml` per verb.
//!   A verb document composes with the global one through `allOf`, where one
//!   member is a `$ref` to the global document and another declares the
//!   verb-specific `properties`.
//! - the **allowlist directory**: the same file layout, each document a flat
//!   `flag: bool` map.
//!
//! A verb is available only when both sets carry a document for it.
//! The `$ref` member is not resolved as JSON Schema; global and verb
//! properties are merged structurally, verb entries winning on collision.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::case::{kebab_case, snake_case};
use crate::error::ConfigError;
use crate::merge::merge_last_wins;
use crate::types::{Allowlist, FlagType, Scope, VerbSet};

pub const GLOBAL_DOCUMENT: &str = "global.yml";
pub const VERB_DOCUMENT_PREFIX: &str = "dbt-";
pub const DOCUMENT_SUFFIX: &str = ".yml";

static VERB_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z-]*$").expect("verb token pattern is valid"));

/// Whether `token` is a well-formed verb identifier.
pub fn is_verb_token(token: &str) -> bool {
    VERB_TOKEN.is_match(token)
}

/// One flag declaration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Property {
    /// Declared primitive type; `None` means untyped.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FlagType>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The flag schema of one scope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schema {
    pub id: Option<String>,
    pub properties: BTreeMap<String, Property>,
    pub required: Vec<String>,
    pub additional_properties: bool,
}

impl Schema {
    pub fn property(&self, flag: &str) -> Option<&Property> {
        self.properties.get(flag)
    }

    pub fn flag_type(&self, flag: &str) -> Option<FlagType> {
        self.property(flag).and_then(|p| p.kind)
    }

    pub fn flags(&self) -> BTreeSet<String> {
        self.properties.keys().cloned().collect()
    }

    /// Overlay `verb` on `self` (global). Verb properties win on collision.
    fn merged_with(&self, verb: Schema) -> Schema {
        let mut required = self.required.clone();
        for flag in verb.required {
            if !required.contains(&flag) {
                required.push(flag);
            }
        }
        Schema {
            id: verb.id,
            properties: merge_last_wins(self.properties.clone(), verb.properties),
            required,
            additional_properties: self.additional_properties && verb.additional_properties,
        }
    }
}

fn default_true() -> bool {
    true
}

/// On-disk shape of a schema document.
#[derive(Debug, Deserialize)]
struct SchemaDocument {
    #[serde(rename = "$id", default)]
    id: Option<String>,
    #[serde(rename = "$ref", default)]
    reference: Option<String>,
    #[serde(default)]
    properties: BTreeMap<String, Property>,
    #[serde(default)]
    required: Vec<String>,
    #[serde(rename = "additionalProperties", default = "default_true")]
    additional_properties: bool,
    #[serde(rename = "allOf", default)]
    all_of: Vec<SchemaDocument>,
}

impl SchemaDocument {
    /// Own properties merged with those of the non-`$ref` members of `allOf`.
    fn into_schema(self) -> Schema {
        let mut schema = Schema {
            id: self.id,
            properties: self.properties,
            required: self.required,
            additional_properties: self.additional_properties,
        };
        for member in self.all_of.into_iter().filter(|m| m.reference.is_none()) {
            schema.properties = merge_last_wins(schema.properties, member.properties);
            schema.required.extend(member.required);
            schema.additional_properties &= member.additional_properties;
        }
        schema
    }
}

/// `(file name, content)` of every document compiled into the crate.
const BUNDLED_SCHEMAS: &[(&str, &str)] = &[
    ("global.yml", include_str!("../defaults/jsonschema/global.yml")),
    ("dbt-run.yml", include_str!("../defaults/jsonschema/dbt-run.yml")),
    ("dbt-seed.yml", include_str!("../defaults/jsonschema/dbt-seed.yml")),
    ("dbt-snapshot.yml", include_str!("../defaults/jsonschema/dbt-snapshot.yml")),
    ("dbt-test.yml", include_str!("../defaults/jsonschema/dbt-test.yml")),
];

const BUNDLED_ALLOWLISTS: &[(&str, &str)] = &[
    ("global.yml", include_str!("../defaults/flag_allowlists/global.yml")),
    ("dbt-run.yml", include_str!("../defaults/flag_allowlists/dbt-run.yml")),
    ("dbt-seed.yml", include_str!("../defaults/flag_allowlists/dbt-seed.yml")),
    ("dbt-snapshot.yml", include_str!("../defaults/flag_allowlists/dbt-snapshot.yml")),
    ("dbt-test.yml", include_str!("../defaults/flag_allowlists/dbt-test.yml")),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentKind {
    Schema,
    Allowlist,
}

impl DocumentKind {
    fn what(self) -> &'static str {
        match self {
            DocumentKind::Schema => "Schema",
            DocumentKind::Allowlist => "Default allowlist",
        }
    }

    fn bundled(self) -> &'static [(&'static str, &'static str)] {
        match self {
            DocumentKind::Schema => BUNDLED_SCHEMAS,
            DocumentKind::Allowlist => BUNDLED_ALLOWLISTS,
        }
    }

    /// Directory name under `defaults/`, used to label bundled documents.
    fn bundled_dir(self) -> &'static str {
        match self {
            DocumentKind::Schema => "defaults/jsonschema",
            DocumentKind::Allowlist => "defaults/flag_allowlists",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Source {
    Bundled,
    Directories {
        schema_dir: PathBuf,
        allowlist_dir: PathBuf,
    },
}

/// Loads schemas and default allowlists, either from the copies compiled into
/// the crate or from a pair of directories.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaRegistry {
    source: Source,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::bundled()
    }
}

impl SchemaRegistry {
    /// Read documents from `schema_dir` and `allowlist_dir` on every query.
    pub fn new(schema_dir: impl Into<PathBuf>, allowlist_dir: impl Into<PathBuf>) -> Self {
        Self {
            source: Source::Directories {
                schema_dir: schema_dir.into(),
                allowlist_dir: allowlist_dir.into(),
            },
        }
    }

    /// The definitions shipped with this crate, served from memory.
    pub fn bundled() -> Self {
        Self {
            source: Source::Bundled,
        }
    }

    /// `None` for the bundled registry.
    pub fn schema_dir(&self) -> Option<&Path> {
        self.dir(DocumentKind::Schema)
    }

    /// `None` for the bundled registry.
    pub fn allowlist_dir(&self) -> Option<&Path> {
        self.dir(DocumentKind::Allowlist)
    }

    fn dir(&self, kind: DocumentKind) -> Option<&Path> {
        match (&self.source, kind) {
            (Source::Bundled, _) => None,
            (Source::Directories { schema_dir, .. }, DocumentKind::Schema) => Some(schema_dir.as_path()),
            (Source::Directories { allowlist_dir, .. }, DocumentKind::Allowlist) => {
                Some(allowlist_dir.as_path())
            }
        }
    }

    /// Verbs with both a schema and a default allowlist document.
    ///
    /// For a directory-backed registry this lists the directories on every call.
    pub fn available_verbs(&self) -> Result<VerbSet, ConfigError> {
        let schema_verbs = self.verbs_in(DocumentKind::Schema)?;
        let allowlist_verbs = self.verbs_in(DocumentKind::Allowlist)?;
        Ok(schema_verbs.intersection(&allowlist_verbs).cloned().collect())
    }

    /// Load the schema for `scope`.
    ///
    /// For a verb, `merge_global` overlays the verb's own properties on the
    /// global ones; without it only the verb-specific section is returned.
    pub fn read_schema(&self, scope: &Scope, merge_global: bool) -> Result<Schema, ConfigError> {
        let global = || self.read_schema_document(&Scope::Global);

        match scope {
            Scope::Global => global(),
            Scope::Verb(_) => {
                let verb = self.read_schema_document(scope)?;
                if merge_global {
                    Ok(global()?.merged_with(verb))
                } else {
                    Ok(verb)
                }
            }
        }
    }

    /// Flag names declared by `scope`'s own schema.
    pub fn get_available_flags(&self, scope: &Scope) -> Result<BTreeSet<String>, ConfigError> {
        Ok(self.read_schema(scope, false)?.flags())
    }

    /// Check every candidate flag (snake-cased) against `scope`'s schema.
    ///
    /// Each unrecognized flag becomes one [`ConfigError::UnrecognizedFlag`],
    /// located by `flag_location(original_key)`; all of them are returned
    /// together as [`ConfigError::UnrecognizedFlags`] with `message`.
    pub fn validate_flag_availability<'a>(
        &self,
        scope: &Scope,
        flags: impl IntoIterator<Item = &'a str>,
        message: &str,
        flag_location: impl Fn(&str) -> String,
    ) -> Result<(), ConfigError> {
        let available = self.get_available_flags(scope)?;

        // keyed by snake_case name: sorted, one entry per flag
        let unrecognized: BTreeMap<String, &str> = flags
            .into_iter()
            .map(|flag| (snake_case(flag), flag))
            .filter(|(name, _)| !available.contains(name))
            .collect();
        if unrecognized.is_empty() {
            return Ok(());
        }

        let errors = unrecognized
            .into_iter()
            .map(|(name, original)| ConfigError::UnrecognizedFlag {
                location: flag_location(original),
                cli_form: kebab_case(&name),
                flag: name,
                scope: scope.clone(),
            })
            .collect();

        Err(ConfigError::UnrecognizedFlags {
            message: message.to_string(),
            errors,
        })
    }

    /// The default allowlist for `scope`, keys snake-cased.
    pub fn read_default_allowlist(&self, scope: &Scope) -> Result<Allowlist, ConfigError> {
        let (path, content) = self.load(DocumentKind::Allowlist, scope)?;
        if content.trim().is_empty() {
            return Ok(Allowlist::new());
        }
        let document: BTreeMap<String, bool> = parse_yaml(&path, &content)?;
        Ok(document
            .into_iter()
            .map(|(flag, enabled)| (snake_case(&flag), enabled))
            .collect())
    }

    fn read_schema_document(&self, scope: &Scope) -> Result<Schema, ConfigError> {
        let (path, content) = self.load(DocumentKind::Schema, scope)?;
        Ok(parse_yaml::<SchemaDocument>(&path, &content)?.into_schema())
    }

    /// The document of `kind` for `scope`, with the path used in errors.
    fn load(&self, kind: DocumentKind, scope: &Scope) -> Result<(PathBuf, String), ConfigError> {
        let label_dir = match self.dir(kind) {
            Some(dir) => dir.to_path_buf(),
            None => PathBuf::from(kind.bundled_dir()),
        };
        let name = match scope {
            Scope::Global => GLOBAL_DOCUMENT.to_string(),
            Scope::Verb(verb) if is_verb_token(verb) => {
                format!("{VERB_DOCUMENT_PREFIX}{verb}{DOCUMENT_SUFFIX}")
            }
            Scope::Verb(verb) => {
                return Err(ConfigError::NotFound {
                    what: format!("{} for verb {verb:?}", kind.what()),
                    path: label_dir,
                    origin: String::new(),
                });
            }
        };
        let path = label_dir.join(&name);

        let content = match &self.source {
            Source::Bundled => kind
                .bundled()
                .iter()
                .find(|(file, _)| *file == name)
                .map(|(_, content)| content.to_string())
                .ok_or_else(|| ConfigError::NotFound {
                    what: kind.what().to_string(),
                    path: path.clone(),
                    origin: " (not bundled)".into(),
                })?,
            Source::Directories { .. } => read_document(&path, kind.what())?,
        };
        Ok((path, content))
    }

    fn verbs_in(&self, kind: DocumentKind) -> Result<VerbSet, ConfigError> {
        let names: Vec<String> = match self.dir(kind) {
            None => kind.bundled().iter().map(|(name, _)| name.to_string()).collect(),
            Some(dir) => list_dir(dir)?,
        };
        Ok(names
            .iter()
            .filter_map(|name| {
                name.strip_prefix(VERB_DOCUMENT_PREFIX)?
                    .strip_suffix(DOCUMENT_SUFFIX)
            })
            .filter(|verb| is_verb_token(verb))
            .map(String::from)
            .collect())
    }
}

fn read_document(path: &Path, what: &str) -> Result<String, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            tracing::trace!(path = %path.display(), "loaded {}", what.to_lowercase());
            Ok(content)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ConfigError::NotFound {
            what: what.to_string(),
            path: path.to_path_buf(),
            origin: String::new(),
        }),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

fn parse_yaml<T: DeserializeOwned>(path: &Path, content: &str) -> Result<T, ConfigError> {
    serde_yaml::from_str(content).map_err(|e| ConfigError::SchemaParse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// File names in `dir`; non-UTF-8 names are skipped.
fn list_dir(dir: &Path) -> Result<Vec<String>, ConfigError> {
    let entries = std::fs::read_dir(dir).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ConfigError::NotFound {
            what: "Configuration directory".into(),
            path: dir.to_path_buf(),
            origin: String::new(),
        },
        _ => ConfigError::Io {
            path: dir.to_path_buf(),
            source: e,
        },
    })?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        if let Ok(name) = entry.file_name().into_string() {
            names.push(name);
        }
    }
    Ok(names)
}
