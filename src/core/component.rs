//! Type-safe classification of local metadata files into remote components.
//!
//! This module replaces raw path juggling with [`ComponentIdentity`] and a single
//! canonical [`CacheKey`]. Every public cache operation runs its input path through
//! [`canonical_key`] exactly once, so a source file and its `-meta.xml` sidecar (or
//! every file of an LWC/Aura bundle) always land on the same cache entry.
//!
//! # Public API
//! - [`ComponentKind`]: Remote component type with its query/retrieve vocabulary
//! - [`ComponentIdentity`]: `(kind, name)` pair identifying a remote component
//! - [`ComponentRef`]: Identity plus the local paths that represent it
//! - [`classify`]: Pure path classification
//! - [`canonical_key`]: Cache key for any path, classifiable or not

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

pub const META_SUFFIX: &str = "-meta.xml";

/// Remote metadata component types tracked by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ComponentKind {
    ApexClass,
    ApexTrigger,
    LwcBundle,
    AuraBundle,
    VfPage,
    VfComponent,
    Flow,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 7] = [
        ComponentKind::ApexClass,
        ComponentKind::ApexTrigger,
        ComponentKind::LwcBundle,
        ComponentKind::AuraBundle,
        ComponentKind::VfPage,
        ComponentKind::VfComponent,
        ComponentKind::Flow,
    ];

    /// sObject queried for last-modified information
    pub fn query_object(&self) -> &'static str {
        match self {
            ComponentKind::ApexClass => "ApexClass",
            ComponentKind::ApexTrigger => "ApexTrigger",
            ComponentKind::LwcBundle => "LightningComponentBundle",
            ComponentKind::AuraBundle => "AuraDefinitionBundle",
            ComponentKind::VfPage => "ApexPage",
            ComponentKind::VfComponent => "ApexComponent",
            ComponentKind::Flow => "FlowDefinition",
        }
    }

    /// Field holding the API name on [`Self::query_object`]
    pub fn name_field(&self) -> &'static str {
        match self {
            ComponentKind::LwcBundle | ComponentKind::AuraBundle | ComponentKind::Flow => {
                "DeveloperName"
            }
            _ => "Name",
        }
    }

    /// Bundles and flow definitions only exist on the tooling API
    pub fn uses_tooling_api(&self) -> bool {
        matches!(
            self,
            ComponentKind::LwcBundle | ComponentKind::AuraBundle | ComponentKind::Flow
        )
    }

    /// Metadata API type name used by `project retrieve start`
    pub fn metadata_type(&self) -> &'static str {
        match self {
            ComponentKind::Flow => "Flow",
            other => other.query_object(),
        }
    }

    /// Only Apex carries code coverage
    pub fn has_coverage(&self) -> bool {
        matches!(self, ComponentKind::ApexClass | ComponentKind::ApexTrigger)
    }

    pub fn is_bundle(&self) -> bool {
        matches!(self, ComponentKind::LwcBundle | ComponentKind::AuraBundle)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ComponentKind::ApexClass => "Apex class",
            ComponentKind::ApexTrigger => "Apex trigger",
            ComponentKind::LwcBundle => "LWC bundle",
            ComponentKind::AuraBundle => "Aura bundle",
            ComponentKind::VfPage => "Visualforce page",
            ComponentKind::VfComponent => "Visualforce component",
            ComponentKind::Flow => "Flow",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.metadata_type())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentIdentity {
    pub kind: ComponentKind,
    pub name: String,
}

impl ComponentIdentity {
    pub fn new(kind: ComponentKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    /// Case-insensitive lookup key; org API names ignore case
    pub fn match_key(&self) -> (ComponentKind, String) {
        (self.kind, self.name.to_lowercase())
    }
}

impl fmt::Display for ComponentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.metadata_type(), self.name)
    }
}

/// Canonical cache key: a normalized, sidecar-collapsed path string
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_path_buf(&self) -> PathBuf {
        PathBuf::from(&self.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A classified local file: the component it belongs to and the paths that share it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentRef {
    pub identity: ComponentIdentity,
    pub key: CacheKey,
    /// Source file for single-file kinds, bundle directory for bundles
    pub primary_path: PathBuf,
    pub sidecar_path: Option<PathBuf>,
}

/// Lexically normalize a path: drop `.`, fold `..`, use `/` separators.
pub fn normalize_path(path: &Path) -> PathBuf {
    let unified = path.to_string_lossy().replace('\\', "/");
    let mut out = PathBuf::new();
    for component in Path::new(&unified).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn strip_meta_suffix(file_name: &str) -> Option<&str> {
    file_name.strip_suffix(META_SUFFIX)
}

fn single_file_kind(extension: &str) -> Option<ComponentKind> {
    match extension {
        "cls" => Some(ComponentKind::ApexClass),
        "trigger" => Some(ComponentKind::ApexTrigger),
        "page" => Some(ComponentKind::VfPage),
        "component" => Some(ComponentKind::VfComponent),
        _ => None,
    }
}

fn path_to_key(path: &Path) -> CacheKey {
    CacheKey(path.to_string_lossy().into_owned())
}

/// Classify a local path into the remote component it represents.
///
/// Returns `None` for anything that is not tracked metadata.
pub fn classify(path: &Path) -> Option<ComponentRef> {
    let normalized = normalize_path(path);
    let file_name = normalized.file_name()?.to_str()?.to_string();
    if file_name.starts_with('.') {
        return None;
    }

    if let Some(bundle) = classify_bundle(&normalized) {
        return Some(bundle);
    }

    if let Some(name) = file_name.strip_suffix(".flow-meta.xml") {
        if name.is_empty() {
            return None;
        }
        return Some(ComponentRef {
            identity: ComponentIdentity::new(ComponentKind::Flow, name),
            key: path_to_key(&normalized),
            primary_path: normalized,
            sidecar_path: None,
        });
    }

    let source_name = strip_meta_suffix(&file_name).unwrap_or(&file_name);
    let (stem, extension) = source_name.rsplit_once('.')?;
    let kind = single_file_kind(extension)?;
    if stem.is_empty() {
        return None;
    }

    let primary_path = normalized.with_file_name(source_name);
    let sidecar_path = normalized.with_file_name(format!("{source_name}{META_SUFFIX}"));
    Some(ComponentRef {
        identity: ComponentIdentity::new(kind, stem),
        key: path_to_key(&primary_path),
        primary_path,
        sidecar_path: Some(sidecar_path),
    })
}

fn classify_bundle(normalized: &Path) -> Option<ComponentRef> {
    let parts: Vec<&str> = normalized
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect();

    // Innermost `lwc`/`aura` directory wins: `force-app/main/default/lwc/foo/foo.js`
    let (idx, kind) = parts.iter().enumerate().rev().find_map(|(i, part)| match *part {
        "lwc" => Some((i, ComponentKind::LwcBundle)),
        "aura" => Some((i, ComponentKind::AuraBundle)),
        _ => None,
    })?;

    // Need at least `<lwc>/<bundle>/<file>` below the marker.
    if parts.len() < idx + 3 {
        return None;
    }
    let bundle = parts[idx + 1];
    if bundle.starts_with('.') || parts[idx + 2..].iter().any(|p| *p == "__tests__") {
        return None;
    }

    let prefix_len = normalized.components().count() - (parts.len() - idx - 2);
    let bundle_dir: PathBuf = normalized.components().take(prefix_len).collect();
    Some(ComponentRef {
        identity: ComponentIdentity::new(kind, bundle),
        key: path_to_key(&bundle_dir),
        primary_path: bundle_dir,
        sidecar_path: None,
    })
}

/// The single cache key for any path.
///
/// Classifiable paths collapse to their component key; anything else is
/// normalized and sidecar-stripped so the same raw variants still agree.
pub fn canonical_key(path: &Path) -> CacheKey {
    if let Some(component) = classify(path) {
        return component.key;
    }
    let normalized = normalize_path(path);
    let text = normalized.to_string_lossy();
    match text.strip_suffix(META_SUFFIX) {
        Some(stripped) => CacheKey(stripped.to_string()),
        None => CacheKey(text.into_owned()),
    }
}

/// Paths to notify when a component's decoration changes
pub fn decoration_paths(component: &ComponentRef) -> Vec<PathBuf> {
    let mut paths = vec![component.primary_path.clone()];
    if let Some(sidecar) = &component.sidecar_path {
        paths.push(sidecar.clone());
    }
    paths
}
