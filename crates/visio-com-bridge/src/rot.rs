//! Running object table access.
//!
//! A snapshot pairs every registered moniker with its display name. Monikers
//! stay in the snapshot so a later `BindRunning` can bind exactly the entry
//! the client picked, without re-enumerating.

#![cfg(windows)]

use windows::Win32::System::Com::{
    CoTaskMemFree, CreateBindCtx, GetRunningObjectTable, IBindCtx, IDispatch, IMoniker,
};

use crate::dispatch::DispatchObject;

/// Monikers from the most recent enumeration, indexed by token.
#[derive(Default)]
pub struct RunningTable {
    monikers: Vec<IMoniker>,
}

impl RunningTable {
    /// Enumerate the running object table, replacing any previous snapshot.
    ///
    /// Returns `(token, display_name)` pairs. Entries whose display name
    /// cannot be read are left out.
    pub fn refresh(&mut self) -> Result<Vec<(u64, String)>, String> {
        self.monikers.clear();
        let mut entries = Vec::new();
        unsafe {
            let table =
                GetRunningObjectTable(0).map_err(|e| format!("GetRunningObjectTable failed: {e}"))?;
            let monikers = table
                .EnumRunning()
                .map_err(|e| format!("EnumRunning failed: {e}"))?;
            let ctx = bind_context()?;

            loop {
                let mut batch: [Option<IMoniker>; 1] = [None];
                let mut fetched = 0u32;
                let hr = monikers.Next(&mut batch, Some(&mut fetched as *mut u32));
                if hr.is_err() || fetched == 0 {
                    break;
                }
                let Some(moniker) = batch[0].take() else {
                    break;
                };
                match display_name(&ctx, &moniker) {
                    Ok(name) => {
                        let token = self.monikers.len() as u64;
                        self.monikers.push(moniker);
                        entries.push((token, name));
                    }
                    Err(e) => tracing::debug!("Skipping running object: {e}"),
                }
            }
        }
        tracing::debug!("Running object table has {} entries", entries.len());
        Ok(entries)
    }

    /// Bind the entry with this token to its IDispatch.
    pub fn bind(&self, token: u64) -> Result<DispatchObject, String> {
        let moniker = self
            .monikers
            .get(token as usize)
            .ok_or_else(|| format!("Unknown running-object token: {token}"))?;
        unsafe {
            let ctx = bind_context()?;
            let disp: IDispatch = moniker
                .BindToObject(&ctx, None::<&IMoniker>)
                .map_err(|e| format!("BindToObject failed: {e}"))?;
            Ok(DispatchObject::from_idispatch(disp))
        }
    }

    pub fn clear(&mut self) {
        self.monikers.clear();
    }
}

fn bind_context() -> Result<IBindCtx, String> {
    unsafe { CreateBindCtx(0).map_err(|e| format!("CreateBindCtx failed: {e}")) }
}

unsafe fn display_name(ctx: &IBindCtx, moniker: &IMoniker) -> Result<String, String> {
    let raw = moniker
        .GetDisplayName(ctx, None::<&IMoniker>)
        .map_err(|e| format!("GetDisplayName failed: {e}"))?;
    let name = raw.to_string();
    CoTaskMemFree(Some(raw.0 as *const std::ffi::c_void));
    name.map_err(|e| format!("display name is not UTF-16: {e}"))
}
