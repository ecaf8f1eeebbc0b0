//! # Manifest Files
//!
//! Every repository in the tree carries a JSON manifest at its root:
//!
//! ```json
//! {
//!   "name": "app",
//!   "version": "1.2.0",
//!   "dependencies": { "lib": "git+https://host/org/lib.git#master" },
//!   "devDependencies": {},
//!   "resolutions": { "lib": "git+https://host/org/lib.git#1.3.0" },
//!   "lfs": false,
//!   "tag": { "commit": "3f2a...", "target": "master" }
//! }
//! ```
//!
//! The typed [`Manifest`] record is validated on parse; absent optional maps
//! default to empty. The original JSON document is kept alongside so that a
//! rewrite (version bump, dependency retargeting, tag stamp) preserves every
//! key the tool does not know about, in its original order.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::reference::RepoRef;

/// Name to reference map, kept in declaration order.
///
/// Equality ignores order: two maps are equal when they hold the same
/// `(name, reference)` pairs.
#[derive(Debug, Clone, Default, Eq)]
pub struct DependencyMap {
    entries: Vec<(String, String)>,
}

impl DependencyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the reference for `name` (exact name match).
    pub fn insert(&mut self, name: impl Into<String>, reference: impl Into<String>) {
        let name = name.into();
        let reference = reference.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = reference,
            None => self.entries.push((name, reference)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, r)| r.as_str())
    }

    /// Case-insensitive lookup.
    pub fn get_ignore_case(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, r)| r.as_str())
    }

    pub fn contains_ignore_case(&self, name: &str) -> bool {
        self.get_ignore_case(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, r)| (n.as_str(), r.as_str()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether both maps declare the same names, ignoring case and order.
    pub fn same_names(&self, other: &DependencyMap) -> bool {
        let mut ours: Vec<String> = self.names().map(str::to_lowercase).collect();
        let mut theirs: Vec<String> = other.names().map(str::to_lowercase).collect();
        ours.sort();
        ours.dedup();
        theirs.sort();
        theirs.dedup();
        ours == theirs
    }

    fn sorted(&self) -> Vec<&(String, String)> {
        let mut entries: Vec<_> = self.entries.iter().collect();
        entries.sort();
        entries
    }
}

impl PartialEq for DependencyMap {
    fn eq(&self, other: &Self) -> bool {
        self.sorted() == other.sorted()
    }
}

impl<N: Into<String>, R: Into<String>> FromIterator<(N, R)> for DependencyMap {
    fn from_iter<I: IntoIterator<Item = (N, R)>>(iter: I) -> Self {
        let mut map = DependencyMap::new();
        for (name, reference) in iter {
            map.insert(name, reference);
        }
        map
    }
}

impl Serialize for DependencyMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, reference) in &self.entries {
            map.serialize_entry(name, reference)?;
        }
        map.end()
    }
}

struct DependencyMapVisitor;

impl<'de> Visitor<'de> for DependencyMapVisitor {
    type Value = DependencyMap;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of dependency names to reference strings")
    }

    fn visit_map<A: MapAccess<'de>>(
        self,
        mut access: A,
    ) -> std::result::Result<DependencyMap, A::Error> {
        let mut map = DependencyMap::new();
        while let Some((name, reference)) = access.next_entry::<String, String>()? {
            map.insert(name, reference);
        }
        Ok(map)
    }
}

impl<'de> Deserialize<'de> for DependencyMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(DependencyMapVisitor)
    }
}

/// Provenance written into a manifest by a release: the commit the release
/// branch was cut from and the target that commit was checked out as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagStamp {
    pub commit: String,
    pub target: String,
}

#[derive(Deserialize)]
struct ManifestFields {
    name: Option<String>,
    version: Option<String>,
    #[serde(default)]
    dependencies: DependencyMap,
    #[serde(default, rename = "devDependencies")]
    dev_dependencies: DependencyMap,
    #[serde(default)]
    resolutions: DependencyMap,
    #[serde(default)]
    lfs: bool,
    #[serde(default, rename = "tag")]
    tag_stamp: Option<TagStamp>,
}

/// A parsed, validated manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub name: Option<String>,
    pub version: Option<String>,
    pub dependencies: DependencyMap,
    pub dev_dependencies: DependencyMap,
    pub resolutions: DependencyMap,
    pub lfs: bool,
    pub tag_stamp: Option<TagStamp>,
    raw: Value,
}

impl Manifest {
    /// Parse manifest text. `origin` names the file (or `tag:file`) in errors.
    pub fn parse(content: &str, origin: &str) -> Result<Self> {
        let parse_error = |message: String| Error::ManifestParse {
            path: origin.to_string(),
            message,
        };

        let raw: Value = serde_json::from_str(content).map_err(|e| parse_error(e.to_string()))?;
        if !raw.is_object() {
            return Err(parse_error("manifest must be a JSON object".to_string()));
        }
        let fields: ManifestFields =
            serde_json::from_value(raw.clone()).map_err(|e| parse_error(e.to_string()))?;

        Ok(Self {
            name: fields.name,
            version: fields.version,
            dependencies: fields.dependencies,
            dev_dependencies: fields.dev_dependencies,
            resolutions: fields.resolutions,
            lfs: fields.lfs,
            tag_stamp: fields.tag_stamp,
            raw,
        })
    }

    /// Read a manifest from disk; `Ok(None)` when the file does not exist.
    pub fn read(path: &Path) -> Result<Option<Self>> {
        match fs::read_to_string(path) {
            Ok(content) => Self::parse(&content, &path.display().to_string()).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    /// Pretty-printed JSON with a trailing newline.
    pub fn to_json_string(&self) -> Result<String> {
        let mut text = serde_json::to_string_pretty(&self.raw)?;
        text.push('\n');
        Ok(text)
    }

    /// The repository references this manifest declares.
    ///
    /// Values that are not repository references are skipped. With
    /// `include_dev`, dev dependencies are added for names not already
    /// declared as regular dependencies.
    pub fn repository_dependencies(&self, include_dev: bool) -> DependencyMap {
        let mut deps: DependencyMap = self
            .dependencies
            .iter()
            .filter(|(_, reference)| RepoRef::is_repository_reference(reference))
            .collect();
        if include_dev {
            for (name, reference) in self.dev_dependencies.iter() {
                if RepoRef::is_repository_reference(reference) && !deps.contains_ignore_case(name) {
                    deps.insert(name, reference);
                }
            }
        }
        deps
    }

    pub fn set_version(&mut self, version: &str) {
        self.version = Some(version.to_string());
        self.set_raw("version", Value::String(version.to_string()));
    }

    /// Point every declaration of `name` (regular or dev) at `reference`.
    ///
    /// Returns whether any declaration was changed.
    pub fn set_dependency_reference(&mut self, name: &str, reference: &str) -> bool {
        let mut changed = false;
        for (section, map) in [
            ("dependencies", &mut self.dependencies),
            ("devDependencies", &mut self.dev_dependencies),
        ] {
            let declared: Vec<String> = map
                .names()
                .filter(|n| n.eq_ignore_ascii_case(name))
                .map(str::to_string)
                .collect();
            for declared_name in declared {
                map.insert(declared_name.clone(), reference);
                if let Some(section) = self.raw.get_mut(section).and_then(Value::as_object_mut) {
                    section.insert(declared_name, Value::String(reference.to_string()));
                }
                changed = true;
            }
        }
        changed
    }

    pub fn set_tag_stamp(&mut self, stamp: TagStamp) -> Result<()> {
        self.set_raw("tag", serde_json::to_value(&stamp)?);
        self.tag_stamp = Some(stamp);
        Ok(())
    }

    fn set_raw(&mut self, key: &str, value: Value) {
        if let Some(object) = self.raw.as_object_mut() {
            object.insert(key.to_string(), value);
        }
    }
}

/// Rewrite the top-level `version` of any JSON descriptor file, keeping all
/// other keys and their order.
pub fn set_version_in_file(path: &Path, version: &str) -> Result<()> {
    let content = fs::read_to_string(path)?;
    let mut value: Value = serde_json::from_str(&content).map_err(|e| Error::ManifestParse {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    match value.as_object_mut() {
        Some(object) => {
            object.insert("version".to_string(), Value::String(version.to_string()));
        }
        None => {
            return Err(Error::ManifestParse {
                path: path.display().to_string(),
                message: "descriptor must be a JSON object".to_string(),
            })
        }
    }
    let mut text = serde_json::to_string_pretty(&value)?;
    text.push('\n');
    fs::write(path, text)?;
    Ok(())
}
