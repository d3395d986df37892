//! Shared protocol types for communication between the `visio-connect` client
//! and the Windows COM bridge process (run natively or under WINE).
//!
//! The protocol is JSON-over-stdio: one JSON object per line in each direction.
//! Every COM object the bridge hands out is referred to by an opaque `u64`
//! handle that stays valid until it is released or the bridge shuts down.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A command sent from the client to the bridge process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Monotonically increasing request ID for correlating responses.
    pub id: u64,
    /// The command to execute.
    #[serde(flatten)]
    pub command: Command,
}

/// Commands the client can send to the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "params")]
pub enum Command {
    /// Initialize COM (STA). Does not start Visio.
    Init,

    /// Report the type-library GUID(s) of the installed Visio, in `{...}` form.
    ClassIdentifiers,

    /// Snapshot the running object table. Returns display names paired with
    /// tokens that stay valid until the next `EnumerateRunning`.
    EnumerateRunning,

    /// Bind a running-object entry from the last enumeration to a document.
    BindRunning { token: u64 },

    /// `Documents.Open(path)` on the running (or newly started) Visio.
    OpenDocument { path: String },

    /// `Documents.Add(template)`; an empty template creates a blank drawing.
    AddDocument { template: String },

    /// `Document.Application`.
    DocumentApplication { document: u64 },

    /// First element of `Document.Pages`.
    FirstPage { document: u64 },

    /// `Application.ActiveWindow`.
    ActiveWindow { application: u64 },

    /// Items of `Window.Selection`, in selection order.
    ReadSelection { window: u64 },

    /// `Shape.CellExists(cell, False)`.
    CellExists { shape: u64, cell: String },

    /// `Shape.Cells(cell).FormulaU = formula`.
    SetFormulaU {
        shape: u64,
        cell: String,
        formula: String,
    },

    /// Enumeration constants from the Visio type library.
    Constants,

    /// Drop the bridge's references to these handles.
    Release { handles: Vec<u64> },

    /// Release every handle and uninitialize COM. Visio itself keeps running.
    Shutdown,
}

/// One entry of the running object table, as seen by the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningEntry {
    pub token: u64,
    pub display_name: String,
}

/// A document the bridge holds a handle to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub handle: u64,
    /// `Document.Name`, e.g. `Drawing1` or `plan.vsdx`.
    pub name: String,
    /// `Document.FullName`; equals `name` for a drawing that was never saved.
    pub full_name: String,
    /// `Document.Path`; empty for a drawing that was never saved.
    #[serde(default)]
    pub path: String,
}

/// A shape in a selection: its bridge handle and its Visio `ID`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeRecord {
    pub handle: u64,
    pub id: i32,
}

/// A response sent from the bridge back to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// The request ID this response corresponds to.
    pub id: u64,
    /// The result of the command.
    #[serde(flatten)]
    pub result: ResponseResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum ResponseResult {
    #[serde(rename = "ok")]
    Ok {
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<ResponseData>,
    },
    #[serde(rename = "error")]
    Error { message: String },
}

/// Data returned in successful responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseData {
    /// Running object table snapshot.
    Running { entries: Vec<RunningEntry> },
    /// A bound, opened or created document.
    Document { document: DocumentRecord },
    /// Handle to an application, page or window.
    Object { handle: u64 },
    /// Current selection of a window.
    Selection { shapes: Vec<ShapeRecord> },
    /// Result of a `CellExists` check.
    Exists { exists: bool },
    /// Type-library constants by name.
    Constants { constants: BTreeMap<String, i64> },
    /// Type-library GUIDs.
    ClassIds { class_ids: Vec<String> },
}

impl ResponseResult {
    pub fn ok(data: ResponseData) -> Self {
        ResponseResult::Ok { data: Some(data) }
    }

    pub fn empty() -> Self {
        ResponseResult::Ok { data: None }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ResponseResult::Error {
            message: message.into(),
        }
    }
}
