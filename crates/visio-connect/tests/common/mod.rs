//! A scripted in-memory stand-in for Visio, recording every call it receives.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use visio_connect::{
    ApplicationHandle, Automation, Choice, Constants, DocumentHandle, DocumentInfo, Error,
    FileKind, PageHandle, Prompt, Result, RunningObject, ShapeHandle, ShapeRef, WindowHandle,
};

pub const APP: ApplicationHandle = ApplicationHandle(1);
pub const WINDOW: WindowHandle = WindowHandle(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Bind(String),
    Open(String),
    Add(Option<String>),
    Write {
        shape: i32,
        cell: String,
        formula: String,
    },
    Release(Vec<u64>),
    Constants,
}

struct RotEntry {
    display_name: String,
    /// What binding yields, apart from the handle, which is minted per bind.
    document: Option<DocumentInfo>,
}

struct FakeShape {
    id: i32,
    /// Formula per existing `prop.<field>` row.
    rows: BTreeMap<String, String>,
    reject_writes: bool,
}

#[derive(Default)]
struct State {
    rot: Vec<RotEntry>,
    shapes: BTreeMap<u64, FakeShape>,
    selection: Vec<u64>,
    calls: Vec<Call>,
    next_handle: u64,
    /// Document handles handed out and not yet released.
    live: BTreeSet<u64>,
    open_error: Option<String>,
    register_on_failed_open: bool,
    selection_error: bool,
    selection_delay: Option<Duration>,
    untitled: u32,
}

#[derive(Default)]
pub struct FakeVisio {
    state: Mutex<State>,
}

fn file_name(full_name: &str) -> String {
    full_name
        .rsplit(|c: char| c == '\\' || c == '/')
        .next()
        .unwrap_or(full_name)
        .to_string()
}

impl State {
    fn mint(&mut self) -> u64 {
        self.next_handle += 1;
        100 + self.next_handle
    }

    /// Hand out a new reference to `document`, as the bridge does per call.
    fn hand_out(&mut self, document: &DocumentInfo) -> DocumentInfo {
        let handle = self.mint();
        self.live.insert(handle);
        DocumentInfo {
            handle: DocumentHandle(handle),
            ..document.clone()
        }
    }

    fn saved_document(&mut self, full_name: &str) -> DocumentInfo {
        let name = file_name(full_name);
        let dir = full_name[..full_name.len() - name.len()].to_string();
        DocumentInfo {
            handle: DocumentHandle(self.mint()),
            name,
            full_name: full_name.to_string(),
            path: Some(dir),
        }
    }
}

impl FakeVisio {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// A saved drawing registered in the running object table under its path.
    pub fn with_saved(&self, full_name: &str) -> DocumentInfo {
        let mut state = self.state();
        let doc = state.saved_document(full_name);
        state.rot.push(RotEntry {
            display_name: full_name.to_string(),
            document: Some(doc.clone()),
        });
        doc
    }

    /// A Visio-looking entry that refuses to bind.
    pub fn with_unbindable(&self, display_name: &str) {
        self.state().rot.push(RotEntry {
            display_name: display_name.to_string(),
            document: None,
        });
    }

    /// An entry from some other application; binding it would succeed.
    pub fn with_foreign(&self, display_name: &str) {
        let mut state = self.state();
        let doc = state.saved_document(display_name);
        state.rot.push(RotEntry {
            display_name: display_name.to_string(),
            document: Some(doc),
        });
    }

    pub fn fail_opens(&self, message: &str, register_anyway: bool) {
        let mut state = self.state();
        state.open_error = Some(message.to_string());
        state.register_on_failed_open = register_anyway;
    }

    pub fn fail_selection_reads(&self, fail: bool) {
        self.state().selection_error = fail;
    }

    /// Make every selection read block the calling thread, like a busy Visio.
    pub fn slow_selection_reads(&self, delay: Duration) {
        self.state().selection_delay = Some(delay);
    }

    /// A shape on the page; `rows` are the `prop.*` rows it has.
    pub fn add_shape(&self, id: i32, rows: &[&str]) -> u64 {
        let mut state = self.state();
        let handle = state.mint();
        state.shapes.insert(
            handle,
            FakeShape {
                id,
                rows: rows
                    .iter()
                    .map(|r| (format!("prop.{r}"), String::new()))
                    .collect(),
                reject_writes: false,
            },
        );
        handle
    }

    pub fn reject_writes(&self, id: i32) {
        let mut state = self.state();
        for shape in state.shapes.values_mut().filter(|s| s.id == id) {
            shape.reject_writes = true;
        }
    }

    /// Replace the selection with the shapes with these IDs, in this order.
    pub fn select(&self, ids: &[i32]) {
        let mut state = self.state();
        let handles: Vec<u64> = ids
            .iter()
            .map(|id| {
                state
                    .shapes
                    .iter()
                    .find(|(_, s)| s.id == *id)
                    .map(|(h, _)| *h)
                    .unwrap_or_else(|| panic!("no shape with id {id}"))
            })
            .collect();
        state.selection = handles;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn writes(&self) -> Vec<(i32, String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Write {
                    shape,
                    cell,
                    formula,
                } => Some((shape, cell, formula)),
                _ => None,
            })
            .collect()
    }

    pub fn opens_and_adds(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Open(_) | Call::Add(_)))
            .collect()
    }

    pub fn document_count(&self) -> usize {
        self.state().rot.iter().filter(|e| e.document.is_some()).count()
    }

    /// Document handles that were handed out and never released.
    pub fn live_documents(&self) -> Vec<DocumentHandle> {
        self.state().live.iter().copied().map(DocumentHandle).collect()
    }

    pub fn released(&self) -> Vec<u64> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Release(handles) => Some(handles),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }
}

impl Automation for FakeVisio {
    fn running_objects(&self) -> Result<Vec<RunningObject>> {
        Ok(self
            .state()
            .rot
            .iter()
            .enumerate()
            .map(|(i, e)| RunningObject {
                display_name: e.display_name.clone(),
                token: i as u64,
            })
            .collect())
    }

    fn bind(&self, entry: &RunningObject) -> Result<DocumentInfo> {
        let mut state = self.state();
        state.calls.push(Call::Bind(entry.display_name.clone()));
        let document = state
            .rot
            .get(entry.token as usize)
            .and_then(|e| e.document.clone())
            .ok_or_else(|| Error::automation("Operation unavailable"))?;
        Ok(state.hand_out(&document))
    }

    fn open_document(&self, path: &str) -> Result<DocumentInfo> {
        let mut state = self.state();
        state.calls.push(Call::Open(path.to_string()));
        let doc = state.saved_document(path);
        if let Some(message) = state.open_error.clone() {
            if state.register_on_failed_open {
                state.rot.push(RotEntry {
                    display_name: path.to_string(),
                    document: Some(doc),
                });
            }
            return Err(Error::automation(message));
        }
        state.rot.push(RotEntry {
            display_name: path.to_string(),
            document: Some(doc.clone()),
        });
        Ok(state.hand_out(&doc))
    }

    fn add_document(&self, template: Option<&str>) -> Result<DocumentInfo> {
        let mut state = self.state();
        state.calls.push(Call::Add(template.map(str::to_string)));
        state.untitled += 1;
        let name = format!("Drawing{}", state.untitled);
        let doc = DocumentInfo {
            handle: DocumentHandle(0),
            full_name: name.clone(),
            name,
            path: None,
        };
        Ok(state.hand_out(&doc))
    }

    fn application_of(&self, _document: DocumentHandle) -> Result<ApplicationHandle> {
        Ok(APP)
    }

    fn first_page(&self, document: DocumentHandle) -> Result<PageHandle> {
        Ok(PageHandle(document.raw() * 10))
    }

    fn active_window(&self, _application: ApplicationHandle) -> Result<WindowHandle> {
        Ok(WINDOW)
    }

    fn selection(&self, _window: WindowHandle) -> Result<Vec<ShapeRef>> {
        let delay = self.state().selection_delay;
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        let state = self.state();
        if state.selection_error {
            return Err(Error::automation("selection unavailable"));
        }
        Ok(state
            .selection
            .iter()
            .map(|h| ShapeRef {
                handle: ShapeHandle(*h),
                id: state.shapes[h].id,
            })
            .collect())
    }

    fn cell_exists(&self, shape: ShapeHandle, cell: &str) -> Result<bool> {
        Ok(self
            .state()
            .shapes
            .get(&shape.raw())
            .map_or(false, |s| s.rows.contains_key(cell)))
    }

    fn set_formula_u(&self, shape: ShapeHandle, cell: &str, formula: &str) -> Result<()> {
        let mut state = self.state();
        let row = cell.trim_end_matches(".Value").to_string();
        let fake = state
            .shapes
            .get_mut(&shape.raw())
            .ok_or_else(|| Error::automation("no such shape"))?;
        if fake.reject_writes {
            return Err(Error::automation("#NAME?"));
        }
        fake.rows.insert(row, formula.to_string());
        let id = fake.id;
        state.calls.push(Call::Write {
            shape: id,
            cell: cell.to_string(),
            formula: formula.to_string(),
        });
        Ok(())
    }

    fn constants(&self) -> Result<Constants> {
        self.state().calls.push(Call::Constants);
        Ok([
            ("visSectionUser".to_string(), 242),
            ("visSectionProp".to_string(), 243),
        ]
        .into_iter()
        .collect())
    }

    fn release(&self, handles: &[u64]) -> Result<()> {
        let mut state = self.state();
        for handle in handles {
            state.live.remove(handle);
        }
        state.calls.push(Call::Release(handles.to_vec()));
        Ok(())
    }

    fn host_path(&self, path: &Path) -> String {
        path.display().to_string()
    }
}

/// Answers the interactive flow from a script and records what it was shown.
#[derive(Default)]
pub struct ScriptedPrompt {
    pub choice: Option<Choice>,
    pub file: Option<PathBuf>,
    pub offered: Vec<String>,
    pub asked_for: Vec<FileKind>,
    pub warnings: Vec<String>,
}

impl ScriptedPrompt {
    pub fn choosing(choice: Choice) -> Self {
        Self {
            choice: Some(choice),
            ..Self::default()
        }
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }
}

impl Prompt for ScriptedPrompt {
    fn choose(&mut self, documents: &[DocumentInfo]) -> Option<Choice> {
        self.offered = documents.iter().map(|d| d.full_name.clone()).collect();
        self.choice
    }

    fn pick_file(&mut self, kind: FileKind) -> Option<PathBuf> {
        self.asked_for.push(kind);
        self.file.clone()
    }

    fn warn(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }
}
