//! Visio-specific automation layer built on top of the generic IDispatch wrapper.

#![cfg(windows)]

use std::collections::{BTreeMap, HashMap};

use visio_com_protocol::{DocumentRecord, RunningEntry, ShapeRecord};

use crate::dispatch::{variant_bool, variant_get_i64, variant_i32, variant_str, DispatchObject};
use crate::rot::RunningTable;

const PROG_ID: &str = "Visio.Application";

/// Holds every COM object handed out to the client, keyed by handle.
pub struct VisioHost {
    running: RunningTable,
    objects: HashMap<u64, DispatchObject>,
    next_handle: u64,
    /// Application used for `Documents.Open` / `Documents.Add`.
    application: Option<DispatchObject>,
    constants: Option<BTreeMap<String, i64>>,
}

impl VisioHost {
    pub fn new() -> Self {
        Self {
            running: RunningTable::default(),
            objects: HashMap::new(),
            next_handle: 1,
            application: None,
            constants: None,
        }
    }

    fn insert(&mut self, object: DispatchObject) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.objects.insert(handle, object);
        handle
    }

    fn object(&self, handle: u64) -> Result<&DispatchObject, String> {
        self.objects
            .get(&handle)
            .ok_or_else(|| format!("Unknown handle: {handle}"))
    }

    fn application(&mut self) -> Result<DispatchObject, String> {
        if let Some(app) = &self.application {
            return Ok(app.clone());
        }
        let app = DispatchObject::active_or_create(PROG_ID)?;
        self.application = Some(app.clone());
        Ok(app)
    }

    /// Any object from the Visio type library, without starting Visio.
    fn library_object(&self) -> Result<Option<DispatchObject>, String> {
        if let Some(app) = &self.application {
            return Ok(Some(app.clone()));
        }
        if let Some(object) = self.objects.values().next() {
            return Ok(Some(object.clone()));
        }
        DispatchObject::active(PROG_ID)
    }

    fn document_record(&mut self, document: DispatchObject) -> Result<DocumentRecord, String> {
        // Anything without Pages (the application itself, stencil windows)
        // is not a drawing.
        document.get_child("Pages")?;
        let name = document.get_string("Name")?;
        let full_name = document.get_string("FullName")?;
        let path = document.get_string("Path").unwrap_or_default();
        let handle = self.insert(document);
        Ok(DocumentRecord {
            handle,
            name,
            full_name,
            path,
        })
    }

    pub fn class_identifiers(&self) -> Result<Vec<String>, String> {
        match self.library_object()? {
            Some(object) => Ok(vec![object.type_library_guid()?]),
            None => Ok(Vec::new()),
        }
    }

    pub fn enumerate_running(&mut self) -> Result<Vec<RunningEntry>, String> {
        Ok(self
            .running
            .refresh()?
            .into_iter()
            .map(|(token, display_name)| RunningEntry {
                token,
                display_name,
            })
            .collect())
    }

    pub fn bind_running(&mut self, token: u64) -> Result<DocumentRecord, String> {
        let object = self.running.bind(token)?;
        self.document_record(object)
    }

    pub fn open_document(&mut self, path: &str) -> Result<DocumentRecord, String> {
        let documents = self.application()?.get_child("Documents")?;
        let document = documents.invoke_child("Open", &[variant_str(path)])?;
        tracing::info!("Opened {path}");
        self.document_record(document)
    }

    pub fn add_document(&mut self, template: &str) -> Result<DocumentRecord, String> {
        let documents = self.application()?.get_child("Documents")?;
        let document = documents.invoke_child("Add", &[variant_str(template)])?;
        self.document_record(document)
    }

    pub fn document_application(&mut self, document: u64) -> Result<u64, String> {
        let app = self.object(document)?.get_child("Application")?;
        if self.application.is_none() {
            self.application = Some(app.clone());
        }
        Ok(self.insert(app))
    }

    pub fn first_page(&mut self, document: u64) -> Result<u64, String> {
        let page = self
            .object(document)?
            .get_child("Pages")?
            .get_indexed("Item", &variant_i32(1))?;
        Ok(self.insert(page))
    }

    pub fn active_window(&mut self, application: u64) -> Result<u64, String> {
        let window = self.object(application)?.get_child("ActiveWindow")?;
        Ok(self.insert(window))
    }

    pub fn read_selection(&mut self, window: u64) -> Result<Vec<ShapeRecord>, String> {
        let selection = self.object(window)?.get_child("Selection")?;
        let count = selection.get_i64("Count")?;
        let mut shapes = Vec::with_capacity(count.max(0) as usize);
        for i in 1..=count {
            let shape = selection.get_indexed("Item", &variant_i32(i as i32))?;
            let id = shape.get_i64("ID")? as i32;
            let handle = self.insert(shape);
            shapes.push(ShapeRecord { handle, id });
        }
        Ok(shapes)
    }

    pub fn cell_exists(&self, shape: u64, cell: &str) -> Result<bool, String> {
        let value = self
            .object(shape)?
            .get_property_with("CellExists", &[variant_str(cell), variant_bool(false)])?;
        variant_get_i64(&value)
            .map(|n| n != 0)
            .ok_or_else(|| format!("CellExists('{cell}') did not return an integer"))
    }

    pub fn set_formula_u(&self, shape: u64, cell: &str, formula: &str) -> Result<(), String> {
        self.object(shape)?
            .get_indexed("Cells", &variant_str(cell))?
            .set_property("FormulaU", variant_str(formula))
    }

    pub fn constants(&mut self) -> Result<BTreeMap<String, i64>, String> {
        if let Some(constants) = &self.constants {
            return Ok(constants.clone());
        }
        let app = self.application()?;
        let constants = app.enum_constants()?;
        tracing::debug!("Loaded {} type-library constants", constants.len());
        self.constants = Some(constants.clone());
        Ok(constants)
    }

    pub fn release(&mut self, handles: &[u64]) {
        for handle in handles {
            self.objects.remove(handle);
        }
    }

    /// Drop every reference. Visio itself is left running.
    pub fn shutdown(&mut self) {
        self.objects.clear();
        self.running.clear();
        self.application = None;
        self.constants = None;
    }
}
