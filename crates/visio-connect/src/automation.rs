//! The seam between this crate and the Visio object model.
//!
//! Everything the resolver and watcher need from the running application goes
//! through [`Automation`]. Objects are opaque handles owned by the other side
//! (the COM bridge in production); nothing here caches application state beyond
//! a single call.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;
use crate::path::NormalizedPath;

macro_rules! handle_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl $name {
            /// The raw handle value understood by the automation backend.
            pub fn raw(self) -> u64 {
                self.0
            }
        }
    };
}

handle_type!(
    /// `Visio.Application`
    ApplicationHandle
);
handle_type!(
    /// `Visio.Document`
    DocumentHandle
);
handle_type!(
    /// `Visio.Page`
    PageHandle
);
handle_type!(
    /// `Visio.Window`
    WindowHandle
);
handle_type!(
    /// `Visio.Shape`
    ShapeHandle
);

/// One running-object-table entry: its display name and a token to bind it with.
///
/// Tokens are only valid until the next call to [`Automation::running_objects`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningObject {
    pub display_name: String,
    pub token: u64,
}

/// An open document as reported by the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentInfo {
    pub handle: DocumentHandle,
    /// `Document.Name`
    pub name: String,
    /// `Document.FullName`
    pub full_name: String,
    /// `Document.Path`, or `None` if the drawing was never saved.
    pub path: Option<String>,
}

/// Identity of a document across enumerations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocumentKey {
    Saved(NormalizedPath),
    Unsaved(String),
}

impl DocumentInfo {
    pub fn is_saved(&self) -> bool {
        self.path.is_some()
    }

    pub fn key(&self) -> DocumentKey {
        if self.is_saved() {
            DocumentKey::Saved(NormalizedPath::new(&self.full_name))
        } else {
            DocumentKey::Unsaved(self.name.clone())
        }
    }

    /// Normalized full path, for saved documents only.
    pub fn normalized_path(&self) -> Option<NormalizedPath> {
        self.is_saved()
            .then(|| NormalizedPath::new(&self.full_name))
    }
}

/// A member of a window's selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeRef {
    pub handle: ShapeHandle,
    /// `Shape.ID`, unique within its page.
    pub id: i32,
}

/// Named integer constants from the Visio type library (`visSectionUser`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Constants(BTreeMap<String, i64>);

impl Constants {
    pub fn new(values: BTreeMap<String, i64>) -> Self {
        Constants(values)
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.0.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl FromIterator<(String, i64)> for Constants {
    fn from_iter<I: IntoIterator<Item = (String, i64)>>(iter: I) -> Self {
        Constants(iter.into_iter().collect())
    }
}

/// Late-bound access to a running Visio.
///
/// Implementations must tolerate the application changing underneath them
/// (documents closed, selection changed by the user) between any two calls.
pub trait Automation: Send + Sync {
    /// Raw running-object-table entries, unfiltered, in table order.
    fn running_objects(&self) -> Result<Vec<RunningObject>>;

    /// Bind a running-object entry to a document.
    fn bind(&self, entry: &RunningObject) -> Result<DocumentInfo>;

    /// `Documents.Open(path)`.
    fn open_document(&self, path: &str) -> Result<DocumentInfo>;

    /// `Documents.Add(template)`; `None` creates a blank drawing.
    fn add_document(&self, template: Option<&str>) -> Result<DocumentInfo>;

    /// `Document.Application`.
    fn application_of(&self, document: DocumentHandle) -> Result<ApplicationHandle>;

    /// First page of the document, in document order.
    fn first_page(&self, document: DocumentHandle) -> Result<PageHandle>;

    /// `Application.ActiveWindow`.
    fn active_window(&self, application: ApplicationHandle) -> Result<WindowHandle>;

    /// Shapes in `Window.Selection`, in selection order.
    fn selection(&self, window: WindowHandle) -> Result<Vec<ShapeRef>>;

    /// `Shape.CellExists(cell, False)`.
    fn cell_exists(&self, shape: ShapeHandle, cell: &str) -> Result<bool>;

    /// `Shape.Cells(cell).FormulaU = formula`.
    fn set_formula_u(&self, shape: ShapeHandle, cell: &str, formula: &str) -> Result<()>;

    /// The type-library constants table.
    fn constants(&self) -> Result<Constants>;

    /// Type-library GUIDs identifying the installed application.
    fn class_identifiers(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    /// Let go of handles the caller no longer needs.
    fn release(&self, _handles: &[u64]) -> Result<()> {
        Ok(())
    }

    /// Translate a local path into the form the application sees.
    fn host_path(&self, path: &Path) -> String {
        absolute(path).display().to_string()
    }
}

pub(crate) fn absolute(path: &Path) -> std::path::PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    }
}
