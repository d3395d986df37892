//! Interactive choices for [`Selector::Interactive`](crate::resolver::Selector).
//!
//! The resolver never talks to a UI toolkit directly; hosts implement
//! [`Prompt`] with whatever dialogs they have.

use std::path::{Path, PathBuf};

use crate::automation::DocumentInfo;
use crate::path::ends_with_ignore_case;

/// What the user picked from the start-up menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    /// An already open document, by its position in the list shown.
    Loaded(usize),
    /// Browse for a drawing on disk.
    BrowseFile,
    /// A new blank drawing.
    NewBlank,
    /// A new drawing based on a template picked on disk.
    NewFromTemplate,
}

/// File filter for [`Prompt::pick_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Drawing,
    Template,
}

impl FileKind {
    pub fn description(self) -> &'static str {
        match self {
            FileKind::Drawing => "Visio files",
            FileKind::Template => "Visio template files",
        }
    }

    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            FileKind::Drawing => &[".vsdx", ".vsdm", ".vsd"],
            FileKind::Template => &[".vstx", ".vstm", ".vst"],
        }
    }

    pub fn accepts(self, path: &Path) -> bool {
        let name = path.to_string_lossy();
        self.extensions()
            .iter()
            .any(|ext| ends_with_ignore_case(&name, ext))
    }
}

/// Dialog surface used by the interactive resolve flow.
///
/// Returning `None` from any question cancels the flow without an error.
pub trait Prompt {
    /// Offer the open documents plus browse/new options.
    fn choose(&mut self, documents: &[DocumentInfo]) -> Option<Choice>;

    /// Ask for a single file of the given kind.
    fn pick_file(&mut self, kind: FileKind) -> Option<PathBuf>;

    /// Show a warning; interactive failures are reported here instead of raised.
    fn warn(&mut self, message: &str);
}

/// A prompt for unattended use: every question is cancelled.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unattended;

impl Prompt for Unattended {
    fn choose(&mut self, _documents: &[DocumentInfo]) -> Option<Choice> {
        None
    }

    fn pick_file(&mut self, _kind: FileKind) -> Option<PathBuf> {
        None
    }

    fn warn(&mut self, message: &str) {
        tracing::warn!("{message}");
    }
}
