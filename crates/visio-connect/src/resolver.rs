//! Finding the document a caller means.
//!
//! A [`Selector`] names a document by position in the running-object
//! enumeration, by file, as a new drawing, or interactively. Enumeration is
//! repeated on every call: the table's order is whatever the system yields and
//! other processes may open or close documents at any time, so an index is only
//! meaningful against the enumeration it came from.

use std::path::{Path, PathBuf};

use crate::automation::{
    ApplicationHandle, Automation, DocumentInfo, PageHandle, RunningObject, WindowHandle,
};
use crate::config::ResolverConfig;
use crate::error::{Error, Result};
use crate::path::{ends_with_ignore_case, NormalizedPath};
use crate::prompt::{Choice, FileKind, Prompt};

/// Which document to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Zero-based position in the current enumeration of open documents.
    Index(usize),
    /// An open document with this path, or the file opened fresh.
    File(PathBuf),
    /// A new drawing, optionally based on a template.
    New { template: Option<PathBuf> },
    /// Ask the user.
    Interactive,
}

/// A running-object entry that looked like a Visio document but did not bind.
///
/// Unsaved drawings commonly end up here; this is expected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub display_name: String,
    pub reason: String,
}

/// Result of one pass over the running object table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enumeration {
    pub documents: Vec<DocumentInfo>,
    pub skipped: Vec<SkippedEntry>,
}

/// How a file selector was matched against open documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Full normalized path matched.
    Exact,
    /// Only the file name matched; the directories differ.
    FileName,
}

/// Handles derived from a resolved document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDocument {
    pub application: ApplicationHandle,
    pub document: DocumentInfo,
    /// First page in document order.
    pub page: PageHandle,
    /// The application's active window at resolve time.
    pub window: WindowHandle,
}

impl ResolvedDocument {
    /// Every bridge handle held by this bundle.
    pub fn handles(&self) -> [u64; 4] {
        [
            self.application.raw(),
            self.document.handle.raw(),
            self.page.raw(),
            self.window.raw(),
        ]
    }
}

/// Does this display name belong to a Visio document?
pub fn is_visio_entry(display_name: &str, class_ids: &[String], extensions: &[String]) -> bool {
    class_ids
        .iter()
        .any(|id| !id.is_empty() && display_name.contains(id.as_str()))
        || extensions
            .iter()
            .any(|ext| ends_with_ignore_case(display_name, ext))
}

/// Pick the open document for `wanted`: exact path first, then by file name.
///
/// The file-name fallback can attach to an unrelated document that merely
/// shares a name with the requested one in another directory.
pub fn match_open_document<'d>(
    documents: &'d [DocumentInfo],
    wanted: &NormalizedPath,
) -> Option<(&'d DocumentInfo, MatchKind)> {
    position_of_open(documents, wanted).map(|(i, kind)| (&documents[i], kind))
}

fn position_of_open(
    documents: &[DocumentInfo],
    wanted: &NormalizedPath,
) -> Option<(usize, MatchKind)> {
    let saved = || {
        documents
            .iter()
            .enumerate()
            .filter_map(|(i, d)| d.normalized_path().map(|p| (i, p)))
    };

    if let Some((i, _)) = saved().find(|(_, p)| p == wanted) {
        return Some((i, MatchKind::Exact));
    }
    saved()
        .find(|(_, p)| p.file_name() == wanted.file_name())
        .map(|(i, _)| (i, MatchKind::FileName))
}

pub struct Resolver<'a> {
    automation: &'a dyn Automation,
    config: &'a ResolverConfig,
}

impl<'a> Resolver<'a> {
    pub fn new(automation: &'a dyn Automation, config: &'a ResolverConfig) -> Self {
        Self { automation, config }
    }

    /// Configured class identifiers plus whatever the application reports.
    pub fn class_identifiers(&self) -> Vec<String> {
        let mut ids = self.config.class_ids.clone();
        match self.automation.class_identifiers() {
            Ok(found) => {
                for id in found {
                    if !ids.iter().any(|known| known.eq_ignore_ascii_case(&id)) {
                        ids.push(id);
                    }
                }
            }
            Err(e) => tracing::debug!("Could not query class identifiers: {e}"),
        }
        ids
    }

    /// Enumerate the Visio documents currently registered as running.
    ///
    /// Every returned document holds a fresh bridge handle; hand the ones you
    /// do not keep to [`release_documents`](Self::release_documents).
    pub fn loaded_documents(&self) -> Result<Enumeration> {
        let class_ids = self.class_identifiers();
        let entries = self.automation.running_objects()?;

        let mut enumeration = Enumeration::default();
        for entry in entries
            .iter()
            .filter(|e| is_visio_entry(&e.display_name, &class_ids, &self.config.extensions))
        {
            match self.bind(entry) {
                Ok(doc) => enumeration.documents.push(doc),
                Err(skip) => enumeration.skipped.push(skip),
            }
        }

        tracing::debug!(
            "Enumerated {} document(s), skipped {}",
            enumeration.documents.len(),
            enumeration.skipped.len()
        );
        Ok(enumeration)
    }

    fn bind(&self, entry: &RunningObject) -> std::result::Result<DocumentInfo, SkippedEntry> {
        self.automation.bind(entry).map_err(|e| {
            tracing::warn!("Error processing moniker '{}': {e}", entry.display_name);
            SkippedEntry {
                display_name: entry.display_name.clone(),
                reason: e.to_string(),
            }
        })
    }

    /// Drop the bridge's references to documents nobody kept.
    pub fn release_documents(&self, documents: &[DocumentInfo]) {
        let handles: Vec<u64> = documents.iter().map(|d| d.handle.raw()).collect();
        self.release(&handles);
    }

    fn release(&self, handles: &[u64]) {
        if handles.is_empty() {
            return;
        }
        if let Err(e) = self.automation.release(handles) {
            tracing::debug!("Releasing {} handle(s) failed: {e}", handles.len());
        }
    }

    /// Keep the `index`-th document and release the others.
    fn keep(&self, mut documents: Vec<DocumentInfo>, index: usize) -> DocumentInfo {
        let kept = documents.swap_remove(index);
        self.release_documents(&documents);
        kept
    }

    /// The `index`-th document of a fresh enumeration.
    pub fn document_at(&self, index: usize) -> Result<DocumentInfo> {
        let documents = self.loaded_documents()?.documents;
        let count = documents.len();
        if index < count {
            Ok(self.keep(documents, index))
        } else {
            self.release_documents(&documents);
            Err(Error::InvalidIndex { index, count })
        }
    }

    /// Return the open document for `path`, opening the file if none matches.
    pub fn get_or_open(&self, path: &Path) -> Result<DocumentInfo> {
        let host_path = self.automation.host_path(path);
        let wanted = NormalizedPath::new(&host_path);

        let open = self.loaded_documents()?.documents;
        if let Some(index) = self.pick_open(&open, &wanted) {
            return Ok(self.keep(open, index));
        }
        self.release_documents(&open);

        if !path.is_file() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }

        tracing::info!("Opening {host_path}");
        match self.automation.open_document(&host_path) {
            Ok(doc) => Ok(doc),
            Err(open_err) => {
                tracing::warn!("Documents.Open rejected '{host_path}': {open_err}");
                let open = self.loaded_documents()?.documents;
                match position_of_open(&open, &wanted) {
                    Some((index, _)) => {
                        let doc = self.keep(open, index);
                        tracing::warn!(
                            "Using already open '{}' in place of '{host_path}'",
                            doc.full_name
                        );
                        Ok(doc)
                    }
                    None => {
                        self.release_documents(&open);
                        Err(Error::OpenFailure {
                            path: host_path,
                            reason: open_err.to_string(),
                        })
                    }
                }
            }
        }
    }

    fn pick_open(&self, open: &[DocumentInfo], wanted: &NormalizedPath) -> Option<usize> {
        let (index, kind) = position_of_open(open, wanted)?;
        if kind == MatchKind::FileName {
            tracing::warn!(
                "No open document at '{wanted}'; attaching to '{}' which only shares its file name",
                open[index].full_name
            );
        }
        Some(index)
    }

    /// Create a new drawing, optionally from a template.
    ///
    /// Templates that exist locally are passed as host paths; anything else is
    /// passed through so Visio can resolve it against its template folders.
    pub fn create(&self, template: Option<&Path>) -> Result<DocumentInfo> {
        let template = template.map(|t| {
            if t.exists() {
                self.automation.host_path(t)
            } else {
                t.display().to_string()
            }
        });
        tracing::info!(
            "Creating new document{}",
            template
                .as_deref()
                .map(|t| format!(" from template {t}"))
                .unwrap_or_default()
        );
        self.automation.add_document(template.as_deref())
    }

    /// Resolve a selector to a document. `Ok(None)` means the user cancelled.
    pub fn document(
        &self,
        selector: &Selector,
        prompt: &mut dyn Prompt,
    ) -> Result<Option<DocumentInfo>> {
        match selector {
            Selector::Index(index) => self.document_at(*index).map(Some),
            Selector::File(path) => self.get_or_open(path).map(Some),
            Selector::New { template } => self.create(template.as_deref()).map(Some),
            Selector::Interactive => Ok(self.interactive(prompt)),
        }
    }

    /// Resolve a selector and derive the application, page and window handles.
    pub fn resolve(
        &self,
        selector: &Selector,
        prompt: &mut dyn Prompt,
    ) -> Result<Option<ResolvedDocument>> {
        let Some(document) = self.document(selector, prompt)? else {
            return Ok(None);
        };
        match self.context(document) {
            Ok(resolved) => Ok(Some(resolved)),
            Err(e) if *selector == Selector::Interactive => {
                prompt.warn(&e.to_string());
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Application, first page and active window for a document.
    ///
    /// On failure the document and whatever was derived so far are released.
    pub fn context(&self, document: DocumentInfo) -> Result<ResolvedDocument> {
        let mut acquired = vec![document.handle.raw()];
        match self.derive(&document, &mut acquired) {
            Ok((application, page, window)) => Ok(ResolvedDocument {
                application,
                document,
                page,
                window,
            }),
            Err(e) => {
                self.release(&acquired);
                Err(e)
            }
        }
    }

    fn derive(
        &self,
        document: &DocumentInfo,
        acquired: &mut Vec<u64>,
    ) -> Result<(ApplicationHandle, PageHandle, WindowHandle)> {
        let application = self.automation.application_of(document.handle)?;
        acquired.push(application.raw());
        let page = self.automation.first_page(document.handle)?;
        acquired.push(page.raw());
        let window = self.automation.active_window(application)?;
        Ok((application, page, window))
    }

    fn interactive(&self, prompt: &mut dyn Prompt) -> Option<DocumentInfo> {
        let documents = match self.loaded_documents() {
            Ok(enumeration) => enumeration.documents,
            Err(e) => {
                prompt.warn(&format!("Could not list open documents: {e}"));
                Vec::new()
            }
        };

        let choice = prompt.choose(&documents);
        if let Some(Choice::Loaded(index)) = choice {
            if index < documents.len() {
                return Some(self.keep(documents, index));
            }
        }
        let count = documents.len();
        self.release_documents(&documents);

        let outcome = match choice? {
            Choice::Loaded(index) => Err(Error::InvalidIndex { index, count }),
            Choice::BrowseFile => {
                let path = prompt.pick_file(FileKind::Drawing)?;
                self.get_or_open(&path)
            }
            Choice::NewBlank => self.create(None),
            Choice::NewFromTemplate => {
                let template = prompt.pick_file(FileKind::Template)?;
                self.create(Some(&template))
            }
        };

        match outcome {
            Ok(doc) => Some(doc),
            Err(e) => {
                prompt.warn(&e.to_string());
                None
            }
        }
    }
}
