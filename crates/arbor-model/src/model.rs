//! Core data structures for the project model

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ids::{LibraryId, ModuleId, SdkId};

// ── Scopes and root types ───────────────────────────────

/// Classpath visibility of a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DependencyScope {
    #[default]
    Compile,
    Runtime,
    Provided,
    Test,
}

impl DependencyScope {
    pub fn is_for_production_compile(self) -> bool {
        matches!(self, DependencyScope::Compile | DependencyScope::Provided)
    }

    pub fn is_for_production_runtime(self) -> bool {
        matches!(self, DependencyScope::Compile | DependencyScope::Runtime)
    }

    pub fn is_for_test_compile(self) -> bool {
        !matches!(self, DependencyScope::Runtime)
    }

    pub fn is_for_test_runtime(self) -> bool {
        true
    }
}

impl fmt::Display for DependencyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DependencyScope::Compile => "COMPILE",
            DependencyScope::Runtime => "RUNTIME",
            DependencyScope::Provided => "PROVIDED",
            DependencyScope::Test => "TEST",
        };
        f.write_str(s)
    }
}

/// Kind of root a library or SDK contributes. Open set; the constants cover
/// the kinds the model itself knows about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderRootType(Cow<'static, str>);

impl OrderRootType {
    pub const CLASSES: OrderRootType = OrderRootType(Cow::Borrowed("CLASSES"));
    pub const SOURCES: OrderRootType = OrderRootType(Cow::Borrowed("SOURCES"));
    pub const DOCUMENTATION: OrderRootType = OrderRootType(Cow::Borrowed("DOCUMENTATION"));

    pub fn custom(name: impl Into<String>) -> Self {
        OrderRootType(Cow::Owned(name.into()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

/// Tag of a source folder inside a content root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceRootType {
    Source,
    TestSource,
    Resource,
    TestResource,
}

impl SourceRootType {
    pub fn is_for_tests(self) -> bool {
        matches!(self, SourceRootType::TestSource | SourceRootType::TestResource)
    }
}

// ── Library tables ──────────────────────────────────────

/// Level of a shared library table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LibraryTableId {
    Application,
    Project,
    Custom(String),
}

impl fmt::Display for LibraryTableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LibraryTableId::Application => f.write_str("application"),
            LibraryTableId::Project => f.write_str("project"),
            LibraryTableId::Custom(level) => f.write_str(level),
        }
    }
}

/// Who owns a library: a shared table, or exactly one module's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LibraryOwner {
    Table(LibraryTableId),
    Module(ModuleId),
}

// ── Order entries ───────────────────────────────────────

/// What an order entry points at. Module and table-library targets are stored
/// by name and resolved lazily against whatever state is being read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderEntryKind {
    ModuleSource,
    Module {
        name: String,
        #[serde(default)]
        production_on_test: bool,
    },
    Library {
        table: LibraryTableId,
        name: String,
    },
    ModuleLibrary {
        library: LibraryId,
    },
    Sdk {
        name: String,
    },
    InheritedSdk,
}

/// One edge in a module's dependency list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderEntry {
    pub kind: OrderEntryKind,
    #[serde(default)]
    pub scope: DependencyScope,
    #[serde(default)]
    pub exported: bool,
}

impl OrderEntry {
    pub fn module_source() -> Self {
        OrderEntry {
            kind: OrderEntryKind::ModuleSource,
            scope: DependencyScope::Compile,
            exported: false,
        }
    }

    pub fn module(name: impl Into<String>, scope: DependencyScope, exported: bool) -> Self {
        OrderEntry {
            kind: OrderEntryKind::Module {
                name: name.into(),
                production_on_test: false,
            },
            scope,
            exported,
        }
    }

    pub fn library(table: LibraryTableId, name: impl Into<String>, scope: DependencyScope, exported: bool) -> Self {
        OrderEntry {
            kind: OrderEntryKind::Library {
                table,
                name: name.into(),
            },
            scope,
            exported,
        }
    }

    pub fn module_library(library: LibraryId) -> Self {
        OrderEntry {
            kind: OrderEntryKind::ModuleLibrary { library },
            scope: DependencyScope::Compile,
            exported: false,
        }
    }

    pub fn sdk(name: impl Into<String>) -> Self {
        OrderEntry {
            kind: OrderEntryKind::Sdk { name: name.into() },
            scope: DependencyScope::Compile,
            exported: false,
        }
    }

    pub fn inherited_sdk() -> Self {
        OrderEntry {
            kind: OrderEntryKind::InheritedSdk,
            scope: DependencyScope::Compile,
            exported: false,
        }
    }

    pub fn is_module_source(&self) -> bool {
        matches!(self.kind, OrderEntryKind::ModuleSource)
    }

    pub fn is_sdk(&self) -> bool {
        matches!(self.kind, OrderEntryKind::Sdk { .. } | OrderEntryKind::InheritedSdk)
    }

    /// Entries that carry meaningful scope/exported metadata.
    pub fn is_exportable(&self) -> bool {
        matches!(
            self.kind,
            OrderEntryKind::Module { .. } | OrderEntryKind::Library { .. } | OrderEntryKind::ModuleLibrary { .. }
        )
    }

    /// Display name of the target, as stored.
    pub fn presentable_name(&self) -> Cow<'_, str> {
        match &self.kind {
            OrderEntryKind::ModuleSource => Cow::Borrowed("<module source>"),
            OrderEntryKind::Module { name, .. } => Cow::Borrowed(name),
            OrderEntryKind::Library { name, .. } => Cow::Borrowed(name),
            OrderEntryKind::ModuleLibrary { library } => Cow::Owned(format!("<module library #{}>", library.0)),
            OrderEntryKind::Sdk { name } => Cow::Borrowed(name),
            OrderEntryKind::InheritedSdk => Cow::Borrowed("<project sdk>"),
        }
    }

    pub fn matches(&self, target: &OrderEntryTarget) -> bool {
        match (&self.kind, target) {
            (OrderEntryKind::ModuleSource, OrderEntryTarget::ModuleSource) => true,
            (OrderEntryKind::Module { name, .. }, OrderEntryTarget::Module(wanted)) => name == wanted,
            (
                OrderEntryKind::Library { table, name },
                OrderEntryTarget::Library {
                    table: wanted_table,
                    name: wanted,
                },
            ) => table == wanted_table && name == wanted,
            (OrderEntryKind::ModuleLibrary { library }, OrderEntryTarget::ModuleLibrary(wanted)) => library == wanted,
            (OrderEntryKind::Sdk { name }, OrderEntryTarget::Sdk(wanted)) => name == wanted,
            (OrderEntryKind::InheritedSdk, OrderEntryTarget::InheritedSdk) => true,
            _ => false,
        }
    }
}

/// Lookup key for `find_order_entry`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OrderEntryTarget {
    ModuleSource,
    Module(String),
    Library { table: LibraryTableId, name: String },
    ModuleLibrary(LibraryId),
    Sdk(String),
    InheritedSdk,
}

/// Target accepted by `add_order_entry`. SDK entries go through `set_sdk`
/// and module-level libraries through the module library table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DependencyTarget {
    Module { name: String, production_on_test: bool },
    Library { table: LibraryTableId, name: String },
}

impl DependencyTarget {
    pub fn module(name: impl Into<String>) -> Self {
        DependencyTarget::Module {
            name: name.into(),
            production_on_test: false,
        }
    }

    pub fn library(table: LibraryTableId, name: impl Into<String>) -> Self {
        DependencyTarget::Library {
            table,
            name: name.into(),
        }
    }
}

/// SDK setting of a root model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SdkRef {
    /// Use the project SDK.
    Inherited,
    /// Explicit SDK by name; may not resolve.
    Named(String),
}

impl SdkRef {
    pub(crate) fn into_entry(self) -> OrderEntry {
        match self {
            SdkRef::Inherited => OrderEntry::inherited_sdk(),
            SdkRef::Named(name) => OrderEntry::sdk(name),
        }
    }
}

// ── Root model ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFolder {
    pub url: String,
    pub root_type: SourceRootType,
    /// Opaque per-root-type properties (package prefix, generated flag, ...).
    #[serde(default)]
    pub properties: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRoot {
    pub url: String,
    #[serde(default)]
    pub source_folders: Vec<SourceFolder>,
    #[serde(default)]
    pub excluded_urls: Vec<String>,
}

impl ContentRoot {
    pub fn new(url: impl Into<String>) -> Self {
        ContentRoot {
            url: url.into(),
            source_folders: Vec::new(),
            excluded_urls: Vec::new(),
        }
    }
}

/// Per-module configuration. Lists are shared between generations and copied
/// on first write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootModel {
    pub order_entries: Arc<Vec<OrderEntry>>,
    pub content_roots: Arc<Vec<ContentRoot>>,
    pub output_url: Option<String>,
    pub test_output_url: Option<String>,
}

impl RootModel {
    pub fn new() -> Self {
        RootModel {
            order_entries: Arc::new(vec![OrderEntry::module_source()]),
            content_roots: Arc::new(Vec::new()),
            output_url: None,
            test_output_url: None,
        }
    }

    /// Current SDK setting, read from the first SDK entry.
    pub fn sdk(&self) -> Option<SdkRef> {
        self.order_entries.iter().find_map(|entry| match &entry.kind {
            OrderEntryKind::Sdk { name } => Some(SdkRef::Named(name.clone())),
            OrderEntryKind::InheritedSdk => Some(SdkRef::Inherited),
            _ => None,
        })
    }

    /// Source folder URLs across all content roots.
    pub fn source_folder_urls(&self, include_tests: bool) -> Vec<&str> {
        self.content_roots
            .iter()
            .flat_map(|root| root.source_folders.iter())
            .filter(|folder| include_tests || !folder.root_type.is_for_tests())
            .map(|folder| folder.url.as_str())
            .collect()
    }

    /// Whether order entries differ from `other`, ignoring content roots.
    pub(crate) fn dependencies_differ(&self, other: &RootModel) -> bool {
        !Arc::ptr_eq(&self.order_entries, &other.order_entries) && self.order_entries != other.order_entries
    }

    pub(crate) fn content_differs(&self, other: &RootModel) -> bool {
        (!Arc::ptr_eq(&self.content_roots, &other.content_roots) && self.content_roots != other.content_roots)
            || self.output_url != other.output_url
            || self.test_output_url != other.test_output_url
    }
}

impl Default for RootModel {
    fn default() -> Self {
        Self::new()
    }
}

// ── Entities ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleData {
    pub id: ModuleId,
    pub name: String,
    pub root_model: RootModel,
}

impl ModuleData {
    pub fn new(id: ModuleId, name: impl Into<String>) -> Self {
        ModuleData {
            id,
            name: name.into(),
            root_model: RootModel::new(),
        }
    }

    pub fn order_entries(&self) -> &[OrderEntry] {
        &self.root_model.order_entries
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryData {
    pub id: LibraryId,
    /// Module-level libraries may be anonymous.
    pub name: Option<String>,
    pub owner: LibraryOwner,
    pub kind: Option<String>,
    pub roots: BTreeMap<OrderRootType, Vec<String>>,
}

impl LibraryData {
    pub fn new(id: LibraryId, name: Option<String>, owner: LibraryOwner) -> Self {
        LibraryData {
            id,
            name,
            owner,
            kind: None,
            roots: BTreeMap::new(),
        }
    }

    pub fn urls(&self, root_type: &OrderRootType) -> &[String] {
        self.roots.get(root_type).map_or(&[][..], |urls| urls.as_slice())
    }

    pub fn is_module_level(&self) -> bool {
        matches!(self.owner, LibraryOwner::Module(_))
    }

    pub fn table(&self) -> Option<&LibraryTableId> {
        match &self.owner {
            LibraryOwner::Table(table) => Some(table),
            LibraryOwner::Module(_) => None,
        }
    }

    pub fn has_roots(&self) -> bool {
        self.roots.values().any(|urls| !urls.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SdkData {
    pub id: SdkId,
    pub name: String,
    pub sdk_type: String,
    pub home_path: Option<String>,
    pub version: Option<String>,
    pub roots: BTreeMap<OrderRootType, Vec<String>>,
}

impl SdkData {
    pub fn new(id: SdkId, name: impl Into<String>, sdk_type: impl Into<String>) -> Self {
        SdkData {
            id,
            name: name.into(),
            sdk_type: sdk_type.into(),
            home_path: None,
            version: None,
            roots: BTreeMap::new(),
        }
    }

    pub fn urls(&self, root_type: &OrderRootType) -> &[String] {
        self.roots.get(root_type).map_or(&[][..], |urls| urls.as_slice())
    }
}
