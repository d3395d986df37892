//! Applying a custom-property value to whatever the user selects.
//!
//! The watcher polls a window's selection on a fixed interval. When the set of
//! selected shape IDs differs from the previous poll and the watcher is active,
//! the current [`PropertyEditRequest`] is written to every selected shape.
//!
//! Polling runs as a Tokio task so a host's input handling stays responsive;
//! hosts with their own timer can drive [`SelectionWatcher::poll_once`] instead.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::automation::{Automation, ShapeHandle, ShapeRef, WindowHandle};
use crate::config::WatcherConfig;
use crate::error::{Error, Result};

/// Which custom property to write, and what to write into it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyEditRequest {
    /// Row name in the Shape Data section, without the `prop.` prefix.
    pub field: String,
    pub value: String,
}

impl PropertyEditRequest {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// `prop.<field>`, the name checked with `CellExists`.
    pub fn row_name(&self) -> String {
        format!("prop.{}", self.field)
    }

    /// `prop.<field>.Value`, the cell written to.
    pub fn value_cell(&self) -> String {
        format!("prop.{}.Value", self.field)
    }

    /// The value as a ShapeSheet string literal.
    pub fn formula(&self) -> String {
        quote_formula(&self.value)
    }
}

/// Quote text as a ShapeSheet string literal (`"` doubled inside).
pub fn quote_formula(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Shape IDs of a selection, in selection order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSnapshot(Vec<i32>);

impl SelectionSnapshot {
    pub fn from_shapes(shapes: &[ShapeRef]) -> Self {
        SelectionSnapshot(shapes.iter().map(|s| s.id).collect())
    }

    pub fn ids(&self) -> &[i32] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<i32>> for SelectionSnapshot {
    fn from(ids: Vec<i32>) -> Self {
        SelectionSnapshot(ids)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeOutcome {
    Written,
    /// The shape lacks the property or the write was rejected.
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeResult {
    pub id: i32,
    pub outcome: ShapeOutcome,
}

/// What one poll did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// The selection differed from the previous snapshot.
    pub changed: bool,
    /// One entry per selected shape when a batch was applied.
    pub applied: Vec<ShapeResult>,
}

impl TickReport {
    pub fn written(&self) -> usize {
        self.applied
            .iter()
            .filter(|r| r.outcome == ShapeOutcome::Written)
            .count()
    }
}

/// Write `request` into one shape's custom property, if it has one.
pub fn apply_to_shape(
    automation: &dyn Automation,
    shape: ShapeHandle,
    request: &PropertyEditRequest,
) -> ShapeOutcome {
    let row = request.row_name();
    match automation.cell_exists(shape, &row) {
        Ok(true) => {}
        Ok(false) => {
            tracing::debug!("Shape has no {row}; skipped");
            return ShapeOutcome::Skipped(format!("no cell {row}"));
        }
        Err(e) => {
            tracing::warn!("Error checking {row}: {e}");
            return ShapeOutcome::Skipped(e.to_string());
        }
    }

    match automation.set_formula_u(shape, &request.value_cell(), &request.formula()) {
        Ok(()) => ShapeOutcome::Written,
        Err(e) => {
            tracing::warn!("Error setting value: {e}");
            ShapeOutcome::Skipped(e.to_string())
        }
    }
}

struct WatchState {
    active: bool,
    request: PropertyEditRequest,
    previous: SelectionSnapshot,
}

struct Shared {
    automation: Arc<dyn Automation>,
    window: WindowHandle,
    // Held for the whole tick, so `stop` waits for an in-flight tick.
    state: Mutex<WatchState>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, WatchState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_selection(&self) -> Result<Vec<ShapeRef>> {
        self.automation.selection(self.window)
    }

    fn release(&self, shapes: &[ShapeRef]) {
        let handles: Vec<u64> = shapes.iter().map(|s| s.handle.raw()).collect();
        if let Err(e) = self.automation.release(&handles) {
            tracing::debug!("Releasing selection handles failed: {e}");
        }
    }

    fn poll(&self) -> Option<TickReport> {
        let mut state = self.state();
        if !state.active {
            return None;
        }

        let shapes = match self.read_selection() {
            Ok(shapes) => shapes,
            Err(e) => {
                tracing::warn!("Error reading selection: {e}");
                return Some(TickReport::default());
            }
        };

        let current = SelectionSnapshot::from_shapes(&shapes);
        let mut report = TickReport::default();
        if current != state.previous {
            report.changed = true;
            if !state.request.field.is_empty() {
                for shape in &shapes {
                    let outcome =
                        apply_to_shape(self.automation.as_ref(), shape.handle, &state.request);
                    report.applied.push(ShapeResult {
                        id: shape.id,
                        outcome,
                    });
                }
                tracing::info!(
                    "Selection changed: wrote {} to {} of {} shape(s)",
                    state.request.value_cell(),
                    report.written(),
                    shapes.len()
                );
            }
            state.previous = current;
        }

        self.release(&shapes);
        Some(report)
    }
}

/// Polls a window's selection and writes a property into new selections.
///
/// `Idle` until [`start`](Self::start) (or [`set_active`](Self::set_active)),
/// back to `Idle` on [`stop`](Self::stop), [`close`](Self::close) or drop.
pub struct SelectionWatcher {
    shared: Arc<Shared>,
    interval: Duration,
    task: Option<JoinHandle<()>>,
}

impl SelectionWatcher {
    /// Create an idle watcher. The current selection becomes the baseline, so
    /// the first active poll only writes if the user selects something else.
    pub fn new(
        automation: Arc<dyn Automation>,
        window: WindowHandle,
        config: &WatcherConfig,
    ) -> Self {
        let shared = Shared {
            automation,
            window,
            state: Mutex::new(WatchState {
                active: false,
                request: PropertyEditRequest::default(),
                previous: SelectionSnapshot::default(),
            }),
        };

        match shared.read_selection() {
            Ok(shapes) => {
                shared.state().previous = SelectionSnapshot::from_shapes(&shapes);
                shared.release(&shapes);
            }
            Err(e) => tracing::warn!("Could not read initial selection: {e}"),
        }

        Self {
            shared: Arc::new(shared),
            interval: config.poll_interval(),
            task: None,
        }
    }

    pub fn window(&self) -> WindowHandle {
        self.shared.window
    }

    pub fn is_active(&self) -> bool {
        self.shared.state().active
    }

    /// The checkbox: toggles whether polls write. A started watcher keeps
    /// polling while inactive, so switching back on resumes writing.
    pub fn set_active(&self, active: bool) {
        self.shared.state().active = active;
        tracing::info!("Active state toggled: {active}");
    }

    pub fn set_field(&self, field: impl Into<String>) {
        let field = field.into();
        tracing::debug!("Field changed: {field}");
        self.shared.state().request.field = field;
    }

    pub fn set_value(&self, value: impl Into<String>) {
        let value = value.into();
        tracing::debug!("Value changed: {value}");
        self.shared.state().request.value = value;
    }

    pub fn request(&self) -> PropertyEditRequest {
        self.shared.state().request.clone()
    }

    pub fn snapshot(&self) -> SelectionSnapshot {
        self.shared.state().previous.clone()
    }

    /// Run one poll now. Returns an empty report when idle.
    pub fn poll_once(&self) -> TickReport {
        self.shared.poll().unwrap_or_default()
    }

    /// Activate and schedule polling on the current Tokio runtime.
    /// The first poll runs immediately.
    pub fn start(&mut self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Watcher(format!("no Tokio runtime: {e}")))?;

        self.set_active(true);
        if self.task.as_ref().map_or(false, |t| !t.is_finished()) {
            return Ok(());
        }

        let shared = Arc::clone(&self.shared);
        let period = self.interval;
        self.task = Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                // Bridge calls block on pipe I/O; keep them off the async workers.
                let tick = Arc::clone(&shared);
                if let Err(e) = tokio::task::spawn_blocking(move || tick.poll()).await {
                    tracing::error!("Selection poll panicked: {e}");
                    break;
                }
            }
        }));
        Ok(())
    }

    /// Deactivate and cancel scheduled polls. Waits for a poll that is already
    /// running; no write happens after this returns.
    pub fn stop(&mut self) {
        self.set_active(false);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Stop and drop the watcher, e.g. when the owning UI closes.
    pub fn close(mut self) {
        self.stop();
    }
}

impl Drop for SelectionWatcher {
    fn drop(&mut self) {
        self.shared.state().active = false;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
