//! Filesystem module resolution.

use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use bunkatsu_cache::{BuildCache, CacheError, ModuleCacheEntry};
use bunkatsu_graph::{ModuleId, ModuleSource, Origin, ResolveError, Resolved, Resolver};
use parking_lot::Mutex;
use regex::Regex;
use tracing::{debug, trace};

use crate::config::{Fallback, ResolveConfig};

/// Extensions whose sources are scanned for imports.
const SCRIPT_EXTENSIONS: &[&str] = &["js", "jsx", "ts", "tsx", "mjs", "cjs"];

static IMPORT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"\b(?:import|export)\s[^'";]*?\bfrom\s*['"]([^'"\n]+)['"]"#,
        r#"|\bimport\s*['"]([^'"\n]+)['"]"#,
        r#"|\bimport\s*\(\s*['"]([^'"\n]+)['"]\s*\)"#,
        r#"|\brequire\s*\(\s*['"]([^'"\n]+)['"]\s*\)"#,
    ))
    .expect("Invalid import pattern")
});

/// Returns the import specifiers of a script, deduplicated in first-occurrence order.
pub fn scan_imports(source: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    IMPORT_PATTERN
        .captures_iter(source)
        .filter_map(|caps| {
            caps.iter()
                .skip(1)
                .flatten()
                .next()
                .map(|m| m.as_str().to_string())
        })
        .filter(|specifier| seen.insert(specifier.clone()))
        .collect()
}

/// Resolves specifiers against a project directory.
///
/// Scanned import lists are cached per module path, keyed by content hash
/// and configuration hash.
pub struct FsResolver {
    root: PathBuf,
    options: ResolveConfig,
    cache: Mutex<BuildCache>,
    config_hash: String,
}

impl FsResolver {
    /// Creates a resolver with the build cache disabled.
    pub fn new(root: impl Into<PathBuf>, options: ResolveConfig) -> Self {
        let root = root.into();
        let root = normalize(&std::path::absolute(&root).unwrap_or(root));
        let mut cache = BuildCache::default();
        cache.disable();
        Self {
            root,
            options,
            cache: Mutex::new(cache),
            config_hash: String::new(),
        }
    }

    /// Attaches a build cache keyed by `config_hash`.
    pub fn with_cache(mut self, cache: BuildCache, config_hash: impl Into<String>) -> Self {
        self.cache = Mutex::new(cache);
        self.config_hash = config_hash.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Drops cache entries for modules not in `live` and saves the cache.
    pub fn save_cache<'a>(
        &self,
        live: impl IntoIterator<Item = &'a ModuleId>,
    ) -> Result<(), CacheError> {
        let live: HashSet<String> = live.into_iter().map(|id| id.to_string()).collect();
        let mut cache = self.cache.lock();
        let removed = cache.retain_keys(&live);
        if removed > 0 {
            debug!("Pruned {} stale cache entries", removed);
        }
        cache.save()
    }

    fn resolve_path(&self, from: Option<&ModuleId>, specifier: &str) -> Option<PathBuf> {
        if let Some(target) = self.alias_target(specifier) {
            return self.resolve_file(&self.root.join(target));
        }

        if is_relative(specifier) {
            let base = match from {
                Some(id) => self
                    .root
                    .join(id.as_str())
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| self.root.clone()),
                None => self.root.clone(),
            };
            return self.resolve_file(&base.join(specifier));
        }

        if let Some(rooted) = specifier.strip_prefix('/') {
            return self.resolve_file(&self.root.join(rooted));
        }

        // Entry roots may name a project file directly.
        if from.is_none()
            && let Some(path) = self.resolve_file(&self.root.join(specifier))
        {
            return Some(path);
        }

        self.resolve_package(specifier)
    }

    fn alias_target(&self, specifier: &str) -> Option<String> {
        self.options
            .alias
            .iter()
            .filter(|(prefix, _)| {
                specifier == prefix.as_str()
                    || specifier
                        .strip_prefix(prefix.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            })
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(prefix, dir)| format!("{}{}", dir, &specifier[prefix.len()..]))
    }

    fn resolve_package(&self, specifier: &str) -> Option<PathBuf> {
        let (package, subpath) = split_package(specifier);
        let package_dir = self.root.join(&self.options.modules_dir).join(package);
        if !package_dir.is_dir() {
            return None;
        }

        if let Some(subpath) = subpath {
            return self.resolve_file(&package_dir.join(subpath));
        }

        if let Some(main) = read_package_main(&package_dir)
            && let Some(path) = self.resolve_file(&package_dir.join(main))
        {
            return Some(path);
        }
        self.resolve_index(&package_dir)
    }

    /// Tries the exact file, then each extension, then `index` in the directory.
    fn resolve_file(&self, path: &Path) -> Option<PathBuf> {
        let path = normalize(path);
        if !path.starts_with(&self.root) {
            return None;
        }
        if path.is_file() {
            return Some(path);
        }
        for ext in &self.options.extensions {
            let mut candidate = path.clone().into_os_string();
            candidate.push(ext);
            let candidate = PathBuf::from(candidate);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        if path.is_dir() {
            return self.resolve_index(&path);
        }
        None
    }

    fn resolve_index(&self, dir: &Path) -> Option<PathBuf> {
        self.options
            .extensions
            .iter()
            .map(|ext| dir.join(format!("index{ext}")))
            .find(|candidate| candidate.is_file())
    }

    fn module_id(&self, path: &Path) -> Option<ModuleId> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(ModuleId::new(parts.join("/")))
    }

    fn origin_of(&self, id: &ModuleId) -> Origin {
        if id
            .as_str()
            .split('/')
            .any(|component| component == self.options.modules_dir)
        {
            Origin::External
        } else {
            Origin::Application
        }
    }

    fn imports_of(&self, id: &ModuleId, bytes: &[u8]) -> Vec<String> {
        let is_script = Path::new(id.as_str())
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| SCRIPT_EXTENSIONS.contains(&ext));
        if !is_script {
            return Vec::new();
        }

        let content_hash = BuildCache::hash_content(bytes);
        let mut cache = self.cache.lock();
        if let Some(imports) = cache.lookup(id.as_str(), &content_hash, &self.config_hash) {
            trace!("Cache hit for {}", id);
            return imports.to_vec();
        }

        // Invalid UTF-8 only affects scanning, never the module bytes.
        let imports = scan_imports(&String::from_utf8_lossy(bytes));
        cache.set(
            id.as_str(),
            ModuleCacheEntry::new(content_hash, self.config_hash.clone(), imports.clone()),
        );
        imports
    }
}

impl Resolver for FsResolver {
    fn resolve(&self, from: Option<&ModuleId>, specifier: &str) -> Result<Resolved, ResolveError> {
        let mut specifier = specifier;
        let mut redirected = false;

        loop {
            if let Some(path) = self.resolve_path(from, specifier) {
                let id = self
                    .module_id(&path)
                    .ok_or_else(|| ResolveError::NotFound(specifier.to_string()))?;
                debug!("Resolved '{}' to {}", specifier, id);
                return Ok(Resolved::Module(id));
            }

            match self.options.fallback.get(specifier) {
                Some(Fallback::Disabled(_)) => {
                    debug!("Ignoring '{}' (fallback disabled)", specifier);
                    return Ok(Resolved::Ignored);
                }
                Some(Fallback::Redirect(target)) if !redirected => {
                    debug!("Falling back from '{}' to '{}'", specifier, target);
                    specifier = target;
                    redirected = true;
                }
                _ => return Err(ResolveError::NotFound(specifier.to_string())),
            }
        }
    }

    fn load(&self, id: &ModuleId) -> Result<ModuleSource, ResolveError> {
        let path = self.root.join(id.as_str());
        let bytes = fs::read(&path).map_err(|e| ResolveError::Unreadable {
            id: id.clone(),
            reason: e.to_string(),
        })?;
        let size = bytes.len() as u64;
        let imports = self.imports_of(id, &bytes);

        Ok(ModuleSource::new(self.origin_of(id), bytes, imports).with_size(size))
    }
}

fn is_relative(specifier: &str) -> bool {
    specifier == "." || specifier == ".." || specifier.starts_with("./") || specifier.starts_with("../")
}

/// Splits `@scope/name/sub` or `name/sub` into the package and its subpath.
fn split_package(specifier: &str) -> (&str, Option<&str>) {
    let split_at = if specifier.starts_with('@') {
        specifier
            .match_indices('/')
            .nth(1)
            .map(|(i, _)| i)
    } else {
        specifier.find('/')
    };
    match split_at {
        Some(i) => (&specifier[..i], Some(&specifier[i + 1..])),
        None => (specifier, None),
    }
}

fn read_package_main(package_dir: &Path) -> Option<String> {
    let content = fs::read_to_string(package_dir.join("package.json")).ok()?;
    let value: serde_json::Value = serde_json::from_str(&content).ok()?;
    value
        .get("main")
        .and_then(|main| main.as_str())
        .map(String::from)
}

/// Lexically removes `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
