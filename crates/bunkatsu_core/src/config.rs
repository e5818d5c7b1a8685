//! Bundler configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use bunkatsu_graph::{EntryDecl, Origin};
use jsonc_parser::ParseOptions;
use jsonschema::Validator;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::BundleError;

/// Configuration file names, in lookup order.
pub const CONFIG_FILES: &[&str] = &[".bunkatsu.jsonc", ".bunkatsu.json"];

// Embed the schema
const SCHEMA_JSON: &str = include_str!("../../../schemas/v1/config.json");
static CONFIG_SCHEMA: OnceLock<Validator> = OnceLock::new();

/// Configuration for a build and for the runtime cache it ships with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Editor schema hint; ignored.
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Named entries in declaration order.
    #[serde(default)]
    pub entries: Entries,

    /// Module resolution options.
    #[serde(default)]
    pub resolve: ResolveConfig,

    /// Output locations and file name templates.
    #[serde(default)]
    pub output: OutputConfig,

    /// Cache groups in declaration order.
    #[serde(default)]
    pub cache_groups: Vec<CacheGroupConfig>,

    /// Name of the isolated runtime chunk, `None` to inline nothing.
    #[serde(default = "default_runtime_chunk")]
    pub runtime_chunk: Option<String>,

    /// Asset size budgets.
    #[serde(default)]
    pub performance: PerformanceConfig,

    /// Runtime cache routes in match order.
    #[serde(default)]
    pub runtime_caching: Vec<RouteConfig>,

    /// Precache list options.
    #[serde(default)]
    pub precache: PrecacheConfig,

    /// Whether to enable the incremental build cache.
    #[serde(default = "default_cache")]
    pub cache: bool,

    /// Cache directory.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,

    /// Directory containing the configuration file.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

fn default_runtime_chunk() -> Option<String> {
    Some("runtime".to_string())
}

fn default_cache() -> bool {
    true
}

fn default_cache_dir() -> String {
    ".bunkatsu-cache".to_string()
}

/// Entry declarations, written as an ordered object of
/// `name -> specifier | [specifier, ...]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entries(pub Vec<EntryDecl>);

impl Entries {
    pub fn as_slice(&self) -> &[EntryDecl] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Appends an entry.
    pub fn push(&mut self, decl: EntryDecl) {
        self.0.push(decl);
    }
}

impl Serialize for Entries {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for decl in &self.0 {
            match decl.specifiers.as_slice() {
                [single] => map.serialize_entry(&decl.name, single)?,
                many => map.serialize_entry(&decl.name, many)?,
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Entries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Specifiers {
            One(String),
            Many(Vec<String>),
        }

        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = Entries;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("an object mapping entry names to a module or module list")
            }

            fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
            where
                M: MapAccess<'de>,
            {
                let mut entries = Vec::new();
                while let Some((name, specifiers)) = map.next_entry::<String, Specifiers>()? {
                    let specifiers = match specifiers {
                        Specifiers::One(s) => vec![s],
                        Specifiers::Many(list) => list,
                    };
                    if specifiers.is_empty() {
                        return Err(de::Error::custom(format!(
                            "entry '{name}' declares no modules"
                        )));
                    }
                    entries.push(EntryDecl { name, specifiers });
                }
                Ok(Entries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

/// Module resolution options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolveConfig {
    /// Extensions tried, in order, for extensionless specifiers.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Specifier prefix to root-relative directory. Longest prefix wins.
    #[serde(default)]
    pub alias: BTreeMap<String, String>,

    /// Replacement for specifiers that cannot be resolved as written.
    #[serde(default)]
    pub fallback: BTreeMap<String, Fallback>,

    /// Directory holding third-party packages.
    #[serde(default = "default_modules_dir")]
    pub modules_dir: String,
}

fn default_extensions() -> Vec<String> {
    [".tsx", ".ts", ".jsx", ".js", ".json"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_modules_dir() -> String {
    "node_modules".to_string()
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            alias: BTreeMap::new(),
            fallback: BTreeMap::new(),
            modules_dir: default_modules_dir(),
        }
    }
}

/// A fallback target: another specifier, or `false` to drop the import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Fallback {
    Redirect(String),
    Disabled(bool),
}

/// Output locations and file name templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output directory, relative to the project root.
    #[serde(default = "default_output_dir")]
    pub dir: String,

    /// Template for entry and runtime chunks.
    #[serde(default = "default_filename")]
    pub filename: String,

    /// Template for cache-group chunks.
    #[serde(default = "default_chunk_filename")]
    pub chunk_filename: String,
}

fn default_output_dir() -> String {
    "dist".to_string()
}

fn default_filename() -> String {
    "[name].[contenthash:8].js".to_string()
}

fn default_chunk_filename() -> String {
    "[name].[contenthash:8].chunk.js".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            filename: default_filename(),
            chunk_filename: default_chunk_filename(),
        }
    }
}

/// How a cache group participates in selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    /// Chosen by priority among matching groups.
    #[default]
    Explicit,
    /// Only chosen when no explicit group is eligible.
    Common,
}

/// A cache group rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheGroupConfig {
    /// Group name, also the name of its chunk.
    pub name: String,

    /// Regular expression over the module id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<String>,

    /// Restricts the group to one origin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,

    /// Higher wins.
    #[serde(default)]
    pub priority: i32,

    /// Minimum number of entries a module must be reachable from.
    #[serde(default = "default_min_chunks")]
    pub min_chunks: usize,

    /// Maximum chunk size in bytes before the group is split.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<u64>,

    #[serde(default)]
    pub kind: GroupKind,
}

fn default_min_chunks() -> usize {
    1
}

impl CacheGroupConfig {
    /// Creates an explicit group with priority 0 and no constraints.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            test: None,
            origin: None,
            priority: 0,
            min_chunks: default_min_chunks(),
            max_size: None,
            kind: GroupKind::Explicit,
        }
    }

    pub fn test(mut self, pattern: impl Into<String>) -> Self {
        self.test = Some(pattern.into());
        self
    }

    pub fn origin(mut self, origin: Origin) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn min_chunks(mut self, min_chunks: usize) -> Self {
        self.min_chunks = min_chunks;
        self
    }

    pub fn max_size(mut self, max_size: u64) -> Self {
        self.max_size = Some(max_size);
        self
    }

    pub fn common(mut self) -> Self {
        self.kind = GroupKind::Common;
        self
    }
}

/// What to do when an asset exceeds its budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hints {
    #[default]
    Warning,
    Error,
    Off,
}

/// Asset size budgets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Largest acceptable single chunk, in bytes.
    #[serde(default = "default_max_asset_size")]
    pub max_asset_size: u64,

    /// Largest acceptable sum of the chunks an entrypoint loads, in bytes.
    #[serde(default = "default_max_asset_size")]
    pub max_entrypoint_size: u64,

    #[serde(default)]
    pub hints: Hints,
}

fn default_max_asset_size() -> u64 {
    512_000
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            max_asset_size: default_max_asset_size(),
            max_entrypoint_size: default_max_asset_size(),
            hints: Hints::Warning,
        }
    }
}

/// Runtime caching strategy for a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    #[serde(alias = "CacheFirst")]
    CacheFirst,
    #[serde(alias = "NetworkFirst")]
    NetworkFirst,
    #[serde(alias = "StaleWhileRevalidate")]
    StaleWhileRevalidate,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::CacheFirst => "cache-first",
            Strategy::NetworkFirst => "network-first",
            Strategy::StaleWhileRevalidate => "stale-while-revalidate",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A runtime cache route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Regular expression over the full request URL.
    pub url_pattern: String,

    pub handler: Strategy,

    /// Name of the route's store. Defaults to `runtime-<index>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_name: Option<String>,

    pub max_entries: usize,

    pub max_age_seconds: u64,

    /// Network timeout; on expiry network-first falls back to the cache.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_timeout_seconds: Option<f64>,
}

impl RouteConfig {
    pub fn new(
        url_pattern: impl Into<String>,
        handler: Strategy,
        max_entries: usize,
        max_age_seconds: u64,
    ) -> Self {
        Self {
            url_pattern: url_pattern.into(),
            handler,
            cache_name: None,
            max_entries,
            max_age_seconds,
            network_timeout_seconds: None,
        }
    }

    pub fn cache_name(mut self, name: impl Into<String>) -> Self {
        self.cache_name = Some(name.into());
        self
    }

    pub fn network_timeout(mut self, seconds: f64) -> Self {
        self.network_timeout_seconds = Some(seconds);
        self
    }
}

/// Precache list options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecacheConfig {
    /// URL prefix prepended to each output path.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Larger assets are left to runtime caching.
    #[serde(default = "default_maximum_file_size")]
    pub maximum_file_size_to_cache_in_bytes: u64,

    /// Output path globs to precache; empty means all.
    #[serde(default)]
    pub include: Vec<String>,

    /// Output path globs never precached.
    #[serde(default)]
    pub exclude: Vec<String>,
}

fn default_base_url() -> String {
    "/".to_string()
}

fn default_maximum_file_size() -> u64 {
    5 * 1024 * 1024
}

impl Default for PrecacheConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            maximum_file_size_to_cache_in_bytes: default_maximum_file_size(),
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }
}

impl Config {
    /// Creates an empty configuration with default options.
    pub fn new() -> Self {
        Self {
            schema: None,
            entries: Entries::default(),
            resolve: ResolveConfig::default(),
            output: OutputConfig::default(),
            cache_groups: Vec::new(),
            runtime_chunk: default_runtime_chunk(),
            performance: PerformanceConfig::default(),
            runtime_caching: Vec::new(),
            precache: PrecacheConfig::default(),
            cache: true,
            cache_dir: default_cache_dir(),
            base_dir: None,
        }
    }

    /// The configuration written by `bunkatsu init`: a browser game client
    /// with an application entry, a vendor entry, framework and engine
    /// cache groups, and API/image runtime caching.
    pub fn default_config() -> Self {
        let mut config = Self::new();

        config
            .entries
            .push(EntryDecl::new("main", ["src/index.tsx"]));
        config.entries.push(EntryDecl::new(
            "vendor",
            ["react", "react-dom", "react-router-dom", "axios", "lodash"],
        ));

        config.resolve.alias = [
            ("@", "src"),
            ("@components", "src/components"),
            ("@pages", "src/pages"),
            ("@utils", "src/utils"),
            ("@hooks", "src/hooks"),
            ("@store", "src/store"),
            ("@assets", "src/assets"),
            ("@config", "src/config"),
            ("@services", "src/services"),
            ("@game", "src/game"),
            ("@ecs", "src/ecs"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        config.resolve.fallback = [
            ("crypto", Fallback::Redirect("crypto-browserify".to_string())),
            ("stream", Fallback::Redirect("stream-browserify".to_string())),
            ("path", Fallback::Redirect("path-browserify".to_string())),
            ("os", Fallback::Redirect("os-browserify/browser".to_string())),
            ("zlib", Fallback::Redirect("browserify-zlib".to_string())),
            ("http", Fallback::Redirect("stream-http".to_string())),
            ("https", Fallback::Redirect("https-browserify".to_string())),
            ("fs", Fallback::Disabled(false)),
            ("net", Fallback::Disabled(false)),
            ("tls", Fallback::Disabled(false)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        config.cache_groups = vec![
            CacheGroupConfig::new("vendors")
                .origin(Origin::External)
                .priority(10),
            CacheGroupConfig::new("react")
                .test("(^|/)node_modules/(react|react-dom)/")
                .priority(20),
            CacheGroupConfig::new("game")
                .test("(^|/)src/game/")
                .priority(15),
            CacheGroupConfig::new("common")
                .priority(5)
                .min_chunks(2)
                .common(),
        ];

        config.runtime_caching = vec![
            RouteConfig::new(r"^https://api\.", Strategy::NetworkFirst, 50, 5 * 60)
                .cache_name("api-cache"),
            RouteConfig::new(
                r"\.(?:png|jpg|jpeg|svg|gif|webp)$",
                Strategy::CacheFirst,
                100,
                30 * 24 * 60 * 60,
            )
            .cache_name("images-cache"),
        ];

        config
    }

    /// Finds a configuration file in `dir`.
    pub fn discover(dir: impl AsRef<Path>) -> Option<PathBuf> {
        CONFIG_FILES
            .iter()
            .map(|name| dir.as_ref().join(name))
            .find(|path| path.is_file())
    }

    /// Loads configuration from a file.
    ///
    /// Supports `.bunkatsu.jsonc`, `.bunkatsu.json`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, BundleError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| BundleError::config(format!("Failed to read config: {}", e)))?;

        let mut config = Self::from_json(&content)?;

        config.base_dir = match path.parent() {
            Some(parent) if parent.as_os_str().is_empty() => Some(PathBuf::from(".")),
            parent => parent.map(Path::to_path_buf),
        };

        Ok(config)
    }

    /// Parses configuration from JSON (comments allowed) with schema validation.
    pub fn from_json(json: &str) -> Result<Self, BundleError> {
        let value = jsonc_parser::parse_to_serde_value(json, &ParseOptions::default())
            .map_err(|e| BundleError::config(format!("Invalid JSON: {}", e)))?
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));

        let schema = CONFIG_SCHEMA.get_or_init(|| {
            let schema_json: serde_json::Value =
                serde_json::from_str(SCHEMA_JSON).expect("Invalid embedded config schema");
            Validator::new(&schema_json).expect("Invalid config schema compilation")
        });

        if let Err(e) = schema.validate(&value) {
            let error_msg = format!("{} at {}", e, e.instance_path());
            return Err(BundleError::config(format!(
                "Config validation failed: {}",
                error_msg
            )));
        }

        serde_json::from_value(value)
            .map_err(|e| BundleError::config(format!("Invalid config: {}", e)))
    }

    /// Resolves a path from the configuration against its directory.
    pub fn resolve_path(&self, path: impl AsRef<Path>) -> PathBuf {
        match &self.base_dir {
            Some(base) => base.join(path),
            None => path.as_ref().to_path_buf(),
        }
    }

    /// Computes a hash of the configuration for cache invalidation.
    pub fn hash(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
