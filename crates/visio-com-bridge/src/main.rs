//! Visio COM Bridge: a Windows process that reaches running Visio instances
//! via COM, controlled by JSON commands over stdin/stdout.
//!
//! Runs natively on Windows, or cross-compiled from Linux and run under WINE.
//!
//! Protocol: one JSON object per line (newline-delimited JSON).
//! - Reads `Request` objects from stdin
//! - Writes `Response` objects to stdout
//! - Diagnostic/log messages go to stderr (never stdout)

#[cfg(windows)]
mod dispatch;
#[cfg(windows)]
mod rot;
#[cfg(windows)]
mod visio;

#[cfg(not(windows))]
fn main() {
    eprintln!("visio-com-bridge must be compiled for Windows (--target x86_64-pc-windows-gnu)");
    eprintln!("and run natively or under WINE.");
    std::process::exit(1);
}

#[cfg(windows)]
fn main() {
    use std::io::{self, BufRead, Write};

    use visio_com_protocol::*;

    // stdout carries the protocol
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!("Starting up");

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let mut host: Option<visio::VisioHost> = None;

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                tracing::error!("stdin read error: {e}");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (response, shutdown) = match serde_json::from_str::<Request>(line) {
            Ok(request) => (
                handle_command(&mut host, &request),
                matches!(request.command, Command::Shutdown),
            ),
            Err(e) => {
                tracing::error!("JSON parse error: {e}; line was: {line}");
                // id 0: the request could not be read far enough to correlate
                let response = Response {
                    id: 0,
                    result: ResponseResult::error(format!("JSON parse error: {e}")),
                };
                (response, false)
            }
        };

        if !write_response(&mut out, &response) {
            tracing::error!("stdout closed");
            break;
        }
        if shutdown {
            tracing::info!("Shutdown complete, exiting");
            break;
        }
    }

    if let Some(mut host) = host.take() {
        host.shutdown();
        uninit_com();
    }

    tracing::info!("Process exiting");

    fn write_response(out: &mut impl Write, response: &Response) -> bool {
        let json = match serde_json::to_string(response) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Failed to encode response {}: {e}", response.id);
                return true;
            }
        };
        writeln!(out, "{json}").and_then(|_| out.flush()).is_ok()
    }
}

#[cfg(windows)]
fn handle_command(
    host: &mut Option<visio::VisioHost>,
    request: &visio_com_protocol::Request,
) -> visio_com_protocol::Response {
    use visio_com_protocol::*;

    let id = request.id;
    tracing::debug!(id, command = ?request.command, "Handling request");

    let result = match &request.command {
        Command::Init => init_com(host),
        Command::ClassIdentifiers => with_host(host, |h| {
            Ok(ResponseResult::ok(ResponseData::ClassIds {
                class_ids: h.class_identifiers()?,
            }))
        }),
        Command::EnumerateRunning => with_host(host, |h| {
            Ok(ResponseResult::ok(ResponseData::Running {
                entries: h.enumerate_running()?,
            }))
        }),
        Command::BindRunning { token } => with_host(host, |h| {
            Ok(ResponseResult::ok(ResponseData::Document {
                document: h.bind_running(*token)?,
            }))
        }),
        Command::OpenDocument { path } => with_host(host, |h| {
            Ok(ResponseResult::ok(ResponseData::Document {
                document: h.open_document(path)?,
            }))
        }),
        Command::AddDocument { template } => with_host(host, |h| {
            Ok(ResponseResult::ok(ResponseData::Document {
                document: h.add_document(template)?,
            }))
        }),
        Command::DocumentApplication { document } => with_host(host, |h| {
            Ok(ResponseResult::ok(ResponseData::Object {
                handle: h.document_application(*document)?,
            }))
        }),
        Command::FirstPage { document } => with_host(host, |h| {
            Ok(ResponseResult::ok(ResponseData::Object {
                handle: h.first_page(*document)?,
            }))
        }),
        Command::ActiveWindow { application } => with_host(host, |h| {
            Ok(ResponseResult::ok(ResponseData::Object {
                handle: h.active_window(*application)?,
            }))
        }),
        Command::ReadSelection { window } => with_host(host, |h| {
            Ok(ResponseResult::ok(ResponseData::Selection {
                shapes: h.read_selection(*window)?,
            }))
        }),
        Command::CellExists { shape, cell } => with_host(host, |h| {
            Ok(ResponseResult::ok(ResponseData::Exists {
                exists: h.cell_exists(*shape, cell)?,
            }))
        }),
        Command::SetFormulaU {
            shape,
            cell,
            formula,
        } => with_host(host, |h| {
            h.set_formula_u(*shape, cell, formula)?;
            Ok(ResponseResult::empty())
        }),
        Command::Constants => with_host(host, |h| {
            Ok(ResponseResult::ok(ResponseData::Constants {
                constants: h.constants()?,
            }))
        }),
        Command::Release { handles } => with_host(host, |h| {
            h.release(handles);
            Ok(ResponseResult::empty())
        }),
        Command::Shutdown => {
            if let Some(mut h) = host.take() {
                h.shutdown();
                uninit_com();
            }
            ResponseResult::empty()
        }
    };

    if let ResponseResult::Error { message } = &result {
        tracing::warn!(id, "Request failed: {message}");
    }

    Response { id, result }
}

#[cfg(windows)]
fn init_com(host: &mut Option<visio::VisioHost>) -> visio_com_protocol::ResponseResult {
    use visio_com_protocol::ResponseResult;
    use windows::Win32::System::Com::{CoInitializeEx, COINIT_APARTMENTTHREADED};

    if host.is_some() {
        return ResponseResult::empty(); // Already initialized
    }

    // Visio's object model lives in a single-threaded apartment
    unsafe {
        if let Err(e) = CoInitializeEx(None, COINIT_APARTMENTTHREADED).ok() {
            return ResponseResult::error(format!("CoInitializeEx failed: {e}"));
        }
    }

    tracing::info!("COM initialized (STA)");
    *host = Some(visio::VisioHost::new());
    ResponseResult::empty()
}

#[cfg(windows)]
fn uninit_com() {
    unsafe {
        windows::Win32::System::Com::CoUninitialize();
    }
    tracing::info!("COM uninitialized");
}

#[cfg(windows)]
fn with_host(
    host: &mut Option<visio::VisioHost>,
    f: impl FnOnce(&mut visio::VisioHost) -> Result<visio_com_protocol::ResponseResult, String>,
) -> visio_com_protocol::ResponseResult {
    match host.as_mut() {
        Some(h) => f(h).unwrap_or_else(visio_com_protocol::ResponseResult::error),
        None => visio_com_protocol::ResponseResult::error(
            "COM not initialized. Send 'Init' command first.",
        ),
    }
}
