//! Subprocess management and JSON IPC for the Visio COM bridge process.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use visio_com_protocol::{
    Command as BridgeCommand, DocumentRecord, Request, Response, ResponseData, ResponseResult,
};

use crate::automation::{
    absolute, ApplicationHandle, Automation, Constants, DocumentHandle, DocumentInfo, PageHandle,
    RunningObject, ShapeHandle, ShapeRef, WindowHandle,
};
use crate::config::BridgeConfig;
use crate::error::{Error, Result};

/// Errors from the Visio COM bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Failed to spawn bridge process: {0}")]
    SpawnFailed(#[from] std::io::Error),

    #[error("Bridge process not running")]
    NotRunning,

    #[error("Failed to send command to bridge: {0}")]
    SendFailed(String),

    #[error("Failed to read response from bridge: {0}")]
    ReadFailed(String),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Bridge returned error: {0}")]
    Remote(String),

    #[error("Unexpected response data for {0}")]
    UnexpectedResponse(&'static str),

    #[error("Launcher '{0}' not found. Install WINE and ensure it is in PATH.")]
    LauncherNotFound(String),

    #[error("Bridge executable not found at: {0}")]
    BridgeExeNotFound(String),
}

/// Both ends of the bridge's pipes. Locked together so a request and its
/// response line are never interleaved with another caller's.
struct Pipes {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// Handle to a running `visio-com-bridge.exe`.
///
/// Requests are strictly sequential: one line out, one line back.
pub struct ComBridge {
    child: Mutex<Child>,
    pipes: Mutex<Pipes>,
    next_id: AtomicU64,
    /// Paths must be translated to `Z:\...` when the bridge runs under WINE.
    wine_paths: bool,
}

impl ComBridge {
    /// Start the bridge process and initialize COM inside it.
    pub fn start(config: &BridgeConfig) -> std::result::Result<Self, BridgeError> {
        let exe_path = config.bridge_exe.clone().unwrap_or_else(find_bridge_exe);

        if !exe_path.exists() {
            return Err(BridgeError::BridgeExeNotFound(
                exe_path.display().to_string(),
            ));
        }

        let mut cmd = match &config.launcher {
            Some(launcher) => {
                let mut cmd = std::process::Command::new(launcher);
                cmd.arg(&exe_path);
                cmd
            }
            None => std::process::Command::new(&exe_path),
        };

        if let Some(prefix) = &config.wine_prefix {
            cmd.env("WINEPREFIX", prefix);
        }

        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::inherit()); // Bridge diagnostics go to our stderr

        tracing::info!("Starting Visio COM bridge: {:?}", cmd);
        let mut child = cmd.spawn().map_err(|e| match (&config.launcher, e.kind()) {
            (Some(launcher), std::io::ErrorKind::NotFound) => {
                BridgeError::LauncherNotFound(launcher.display().to_string())
            }
            _ => BridgeError::SpawnFailed(e),
        })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            return Err(BridgeError::NotRunning);
        };

        let bridge = Self {
            child: Mutex::new(child),
            pipes: Mutex::new(Pipes {
                stdin,
                stdout: BufReader::new(stdout),
            }),
            next_id: AtomicU64::new(1),
            wine_paths: config.launcher.is_some(),
        };

        bridge.send_command(BridgeCommand::Init)?;

        Ok(bridge)
    }

    /// Send a command to the bridge and wait for the response.
    fn send_command(
        &self,
        command: BridgeCommand,
    ) -> std::result::Result<Option<ResponseData>, BridgeError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let request = Request { id, command };
        let json = serde_json::to_string(&request)?;
        tracing::debug!("-> {json}");

        let response: Response = {
            let mut pipes = lock(&self.pipes);
            writeln!(pipes.stdin, "{json}").map_err(|e| BridgeError::SendFailed(e.to_string()))?;
            pipes
                .stdin
                .flush()
                .map_err(|e| BridgeError::SendFailed(e.to_string()))?;

            let mut line = String::new();
            pipes
                .stdout
                .read_line(&mut line)
                .map_err(|e| BridgeError::ReadFailed(e.to_string()))?;

            if line.is_empty() {
                return Err(BridgeError::NotRunning);
            }
            tracing::debug!("<- {}", line.trim_end());

            serde_json::from_str(&line)?
        };

        if response.id != id && response.id != 0 {
            return Err(BridgeError::ReadFailed(format!(
                "response id {} does not match request id {id}",
                response.id
            )));
        }

        match response.result {
            ResponseResult::Ok { data } => Ok(data),
            ResponseResult::Error { message } => Err(BridgeError::Remote(message)),
        }
    }

    fn document(&self, command: BridgeCommand, what: &'static str) -> Result<DocumentInfo> {
        match self.send_command(command)? {
            Some(ResponseData::Document { document }) => Ok(document_info(document)),
            _ => Err(BridgeError::UnexpectedResponse(what).into()),
        }
    }

    fn object(&self, command: BridgeCommand, what: &'static str) -> Result<u64> {
        match self.send_command(command)? {
            Some(ResponseData::Object { handle }) => Ok(handle),
            _ => Err(BridgeError::UnexpectedResponse(what).into()),
        }
    }

    /// Release all handles and stop the bridge. Visio keeps running.
    pub fn shutdown(self) -> std::result::Result<(), BridgeError> {
        let _ = self.send_command(BridgeCommand::Shutdown);

        // Closing stdin ends the bridge's read loop even if it missed Shutdown.
        let ComBridge { child, pipes, .. } = self;
        drop(pipes);
        let mut child = child.into_inner().unwrap_or_else(|p| p.into_inner());
        let _ = child.wait();

        Ok(())
    }
}

impl Automation for ComBridge {
    fn running_objects(&self) -> Result<Vec<RunningObject>> {
        match self.send_command(BridgeCommand::EnumerateRunning)? {
            Some(ResponseData::Running { entries }) => Ok(entries
                .into_iter()
                .map(|e| RunningObject {
                    display_name: e.display_name,
                    token: e.token,
                })
                .collect()),
            _ => Err(BridgeError::UnexpectedResponse("EnumerateRunning").into()),
        }
    }

    fn bind(&self, entry: &RunningObject) -> Result<DocumentInfo> {
        self.document(
            BridgeCommand::BindRunning { token: entry.token },
            "BindRunning",
        )
    }

    fn open_document(&self, path: &str) -> Result<DocumentInfo> {
        self.document(
            BridgeCommand::OpenDocument {
                path: path.to_string(),
            },
            "OpenDocument",
        )
    }

    fn add_document(&self, template: Option<&str>) -> Result<DocumentInfo> {
        self.document(
            BridgeCommand::AddDocument {
                template: template.unwrap_or_default().to_string(),
            },
            "AddDocument",
        )
    }

    fn application_of(&self, document: DocumentHandle) -> Result<ApplicationHandle> {
        self.object(
            BridgeCommand::DocumentApplication {
                document: document.raw(),
            },
            "DocumentApplication",
        )
        .map(ApplicationHandle)
    }

    fn first_page(&self, document: DocumentHandle) -> Result<PageHandle> {
        self.object(
            BridgeCommand::FirstPage {
                document: document.raw(),
            },
            "FirstPage",
        )
        .map(PageHandle)
    }

    fn active_window(&self, application: ApplicationHandle) -> Result<WindowHandle> {
        self.object(
            BridgeCommand::ActiveWindow {
                application: application.raw(),
            },
            "ActiveWindow",
        )
        .map(WindowHandle)
    }

    fn selection(&self, window: WindowHandle) -> Result<Vec<ShapeRef>> {
        match self.send_command(BridgeCommand::ReadSelection {
            window: window.raw(),
        })? {
            Some(ResponseData::Selection { shapes }) => Ok(shapes
                .into_iter()
                .map(|s| ShapeRef {
                    handle: ShapeHandle(s.handle),
                    id: s.id,
                })
                .collect()),
            _ => Err(BridgeError::UnexpectedResponse("ReadSelection").into()),
        }
    }

    fn cell_exists(&self, shape: ShapeHandle, cell: &str) -> Result<bool> {
        match self.send_command(BridgeCommand::CellExists {
            shape: shape.raw(),
            cell: cell.to_string(),
        })? {
            Some(ResponseData::Exists { exists }) => Ok(exists),
            _ => Err(BridgeError::UnexpectedResponse("CellExists").into()),
        }
    }

    fn set_formula_u(&self, shape: ShapeHandle, cell: &str, formula: &str) -> Result<()> {
        self.send_command(BridgeCommand::SetFormulaU {
            shape: shape.raw(),
            cell: cell.to_string(),
            formula: formula.to_string(),
        })?;
        Ok(())
    }

    fn constants(&self) -> Result<Constants> {
        match self.send_command(BridgeCommand::Constants)? {
            Some(ResponseData::Constants { constants }) => Ok(Constants::new(constants)),
            _ => Err(BridgeError::UnexpectedResponse("Constants").into()),
        }
    }

    fn class_identifiers(&self) -> Result<Vec<String>> {
        match self.send_command(BridgeCommand::ClassIdentifiers)? {
            Some(ResponseData::ClassIds { class_ids }) => Ok(class_ids),
            _ => Err(BridgeError::UnexpectedResponse("ClassIdentifiers").into()),
        }
    }

    fn release(&self, handles: &[u64]) -> Result<()> {
        if handles.is_empty() {
            return Ok(());
        }
        self.send_command(BridgeCommand::Release {
            handles: handles.to_vec(),
        })?;
        Ok(())
    }

    fn host_path(&self, path: &Path) -> String {
        if self.wine_paths {
            linux_to_wine_path(path)
        } else {
            absolute(path).display().to_string()
        }
    }
}

fn document_info(record: DocumentRecord) -> DocumentInfo {
    DocumentInfo {
        handle: DocumentHandle(record.handle),
        name: record.name,
        full_name: record.full_name,
        path: (!record.path.is_empty()).then_some(record.path),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic while holding the pipe leaves it usable; the protocol is line-based.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Convert a local filesystem path to a WINE (Windows) path.
///
/// WINE maps `/` to `Z:\`, so `/home/user/plan.vsdx` becomes `Z:\home\user\plan.vsdx`.
/// Paths already written with a drive letter or as UNC are only given
/// backslashes.
pub fn linux_to_wine_path(linux_path: &Path) -> String {
    let raw = linux_path.to_string_lossy();
    if has_windows_root(&raw) {
        return raw.replace('/', "\\");
    }
    format!("Z:{}", absolute(linux_path).display()).replace('/', "\\")
}

fn has_windows_root(path: &str) -> bool {
    let bytes = path.as_bytes();
    let drive = bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':';
    drive || path.starts_with("\\\\") || path.starts_with("//")
}

/// Attempt to locate the bridge exe relative to the current executable or in common paths.
fn find_bridge_exe() -> PathBuf {
    if let Ok(mut exe) = std::env::current_exe() {
        exe.pop();
        let candidate = exe.join("visio-com-bridge.exe");
        if candidate.exists() {
            return candidate;
        }
    }

    for profile in ["release", "debug"] {
        let target_path = PathBuf::from(format!(
            "target/x86_64-pc-windows-gnu/{profile}/visio-com-bridge.exe"
        ));
        if target_path.exists() {
            return target_path;
        }
    }

    PathBuf::from("visio-com-bridge.exe")
}
