use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

use super::TemplateError;

/// Which version of a template to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemplateVersion {
    /// Numerically greatest version present
    #[default]
    Latest,
    Exact(u32),
}

impl fmt::Display for TemplateVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateVersion::Latest => write!(f, "latest"),
            TemplateVersion::Exact(v) => write!(f, "v{}", v),
        }
    }
}

impl FromStr for TemplateVersion {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("latest") {
            return Ok(TemplateVersion::Latest);
        }
        trimmed
            .trim_start_matches(['v', 'V'])
            .parse::<u32>()
            .map(TemplateVersion::Exact)
            .map_err(|_| TemplateError::InvalidVersion(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateEntry {
    pub category: String,
    pub name: String,
    pub version: u32,
    pub content: String,
}

/// Versioned prompt templates loaded once from `<base>/<category>/<name>_v<N>.<ext>`.
/// Immutable after construction.
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    base_dir: PathBuf,
    // category -> name -> version -> content
    templates: BTreeMap<String, BTreeMap<String, BTreeMap<u32, String>>>,
}

impl TemplateRegistry {
    /// Scan one level of category subdirectories under `base_dir`.
    pub fn load<P: AsRef<Path>>(base_dir: P) -> Result<Self, TemplateError> {
        let base_dir = base_dir.as_ref();
        if !base_dir.is_dir() {
            return Err(TemplateError::MissingBaseDir(base_dir.to_path_buf()));
        }

        let versioned = Regex::new(r"^(?P<name>.+)_v(?P<version>\d+)\.[^.]+$")?;
        let mut templates: BTreeMap<String, BTreeMap<String, BTreeMap<u32, String>>> =
            BTreeMap::new();

        for category_dir in sorted_entries(base_dir)? {
            if !category_dir.is_dir() {
                continue;
            }
            let Some(category) = file_name(&category_dir) else {
                continue;
            };
            let names = templates.entry(category.clone()).or_default();

            for file in sorted_entries(&category_dir)? {
                if !file.is_file() {
                    continue;
                }
                let Some(filename) = file_name(&file) else {
                    continue;
                };
                if filename.starts_with('.') {
                    continue;
                }

                let (name, version) = match versioned.captures(&filename) {
                    Some(caps) => match caps["version"].parse::<u32>() {
                        Ok(v) => (caps["name"].to_string(), v),
                        Err(_) => {
                            warn!("Skipping template with out-of-range version: {}", filename);
                            continue;
                        }
                    },
                    None => (unversioned_name(&file, &filename), 1),
                };

                let content = fs::read_to_string(&file).map_err(|source| TemplateError::Io {
                    path: file.clone(),
                    source,
                })?;

                let versions = names.entry(name.clone()).or_default();
                if versions.contains_key(&version) {
                    warn!(
                        "Duplicate template {}/{} v{} ({}), keeping the first one",
                        category, name, version, filename
                    );
                    continue;
                }
                debug!("Registered template {}/{} v{}", category, name, version);
                versions.insert(version, content);
            }
        }

        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            templates,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolve a template body. `Latest` picks the numerically greatest version.
    pub fn get(
        &self,
        category: &str,
        name: &str,
        version: TemplateVersion,
    ) -> Result<&str, TemplateError> {
        let not_found = || TemplateError::NotFound {
            category: category.to_string(),
            name: name.to_string(),
            version,
        };

        let versions = self
            .templates
            .get(category)
            .and_then(|names| names.get(name))
            .ok_or_else(not_found)?;

        let content = match version {
            TemplateVersion::Latest => versions.values().next_back(),
            TemplateVersion::Exact(v) => versions.get(&v),
        };

        content.map(String::as_str).ok_or_else(not_found)
    }

    /// All registered templates, or those of one category, ordered by
    /// category, name, then version.
    pub fn list(&self, category: Option<&str>) -> Vec<TemplateEntry> {
        self.templates
            .iter()
            .filter(|(cat, _)| category.is_none_or(|c| c == cat.as_str()))
            .flat_map(|(cat, names)| {
                names.iter().flat_map(move |(name, versions)| {
                    versions.iter().map(move |(version, content)| TemplateEntry {
                        category: cat.clone(),
                        name: name.clone(),
                        version: *version,
                        content: content.clone(),
                    })
                })
            })
            .collect()
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, TemplateError> {
    let read = fs::read_dir(dir).map_err(|source| TemplateError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut paths = Vec::new();
    for entry in read {
        let entry = entry.map_err(|source| TemplateError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
}

fn unversioned_name(path: &Path, filename: &str) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| filename.to_string())
}
