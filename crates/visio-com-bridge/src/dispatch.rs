//! Safe wrapper around IDispatch for late-bound COM automation.
//!
//! Visio's object model is reached through IDispatch, the same way VBA or a
//! scripting host would. This module provides property get/set, method
//! invocation and type-library access on top of it.

#![cfg(windows)]

use std::collections::BTreeMap;
use std::mem::ManuallyDrop;
use std::ptr;

use windows::{
    core::{Interface, BSTR, GUID, HSTRING, PCWSTR},
    Win32::{
        Foundation::{DISP_E_EXCEPTION, VARIANT_BOOL},
        Globalization::GetSystemDefaultLCID,
        System::{
            Com::{
                CLSIDFromProgID, CoCreateInstance, IDispatch, ITypeLib, CLSCTX_LOCAL_SERVER,
                DISPATCH_METHOD, DISPATCH_PROPERTYGET, DISPATCH_PROPERTYPUT, DISPPARAMS,
                EXCEPINFO, TKIND_ENUM,
            },
            Ole::{GetActiveObject, DISPID_PROPERTYPUT},
            Variant::{
                VARIANT, VT_BOOL, VT_BSTR, VT_DISPATCH, VT_EMPTY, VT_I1, VT_I2, VT_I4, VT_I8,
                VT_INT, VT_NULL, VT_UI1, VT_UI2, VT_UI4,
            },
        },
    },
};

// -- VARIANT construction helpers --
// The VARIANT struct wraps inner unions in ManuallyDrop, so we use ptr::write
// to set fields without triggering the DerefMut lint.

/// Create a VARIANT containing a bool.
pub fn variant_bool(val: bool) -> VARIANT {
    unsafe {
        let mut v = VARIANT::default();
        let inner = &mut *v.Anonymous.Anonymous;
        ptr::write(&mut inner.vt, VT_BOOL);
        ptr::write(
            &mut inner.Anonymous.boolVal,
            VARIANT_BOOL(if val { -1 } else { 0 }),
        );
        v
    }
}

/// Create a VARIANT containing an i32.
pub fn variant_i32(val: i32) -> VARIANT {
    unsafe {
        let mut v = VARIANT::default();
        let inner = &mut *v.Anonymous.Anonymous;
        ptr::write(&mut inner.vt, VT_I4);
        ptr::write(&mut inner.Anonymous.lVal, val);
        v
    }
}

/// Create a VARIANT containing a BSTR string.
pub fn variant_str(val: &str) -> VARIANT {
    unsafe {
        let bstr = BSTR::from(val);
        let mut v = VARIANT::default();
        let inner = &mut *v.Anonymous.Anonymous;
        ptr::write(&mut inner.vt, VT_BSTR);
        ptr::write(&mut inner.Anonymous.bstrVal, ManuallyDrop::new(bstr));
        v
    }
}

/// Get the VT type of a VARIANT.
pub fn variant_vt(v: &VARIANT) -> u16 {
    unsafe { v.Anonymous.Anonymous.vt.0 }
}

/// Extract any integer (or bool) from a VARIANT, widened to i64.
///
/// Visio returns counts and IDs as VT_I4 and `CellExists` as VT_I2; enum
/// constants in the type library may use any integer width.
pub fn variant_get_i64(v: &VARIANT) -> Option<i64> {
    unsafe {
        let vt = v.Anonymous.Anonymous.vt;
        let anon = &v.Anonymous.Anonymous.Anonymous;
        if vt == VT_I4 || vt == VT_INT {
            Some(anon.lVal as i64)
        } else if vt == VT_I2 {
            Some(anon.iVal as i64)
        } else if vt == VT_I1 {
            Some(anon.cVal as i64)
        } else if vt == VT_UI1 {
            Some(anon.bVal as i64)
        } else if vt == VT_UI2 {
            Some(anon.uiVal as i64)
        } else if vt == VT_UI4 {
            Some(anon.ulVal as i64)
        } else if vt == VT_I8 {
            Some(anon.llVal)
        } else if vt == VT_BOOL {
            Some(if anon.boolVal.0 != 0 { 1 } else { 0 })
        } else {
            None
        }
    }
}

/// Extract a string from a VARIANT.
pub fn variant_get_string(v: &VARIANT) -> Option<String> {
    unsafe {
        if v.Anonymous.Anonymous.vt == VT_BSTR {
            let bstr = &v.Anonymous.Anonymous.Anonymous.bstrVal;
            Some(bstr.to_string())
        } else {
            None
        }
    }
}

/// Extract an IDispatch from a VARIANT.
pub fn variant_get_dispatch(v: &VARIANT) -> Option<IDispatch> {
    unsafe {
        if v.Anonymous.Anonymous.vt == VT_DISPATCH {
            // pdispVal is ManuallyDrop<Option<IDispatch>>
            let opt_disp: &Option<IDispatch> = &v.Anonymous.Anonymous.Anonymous.pdispVal;
            opt_disp.clone()
        } else {
            None
        }
    }
}

/// Check if a VARIANT is empty or null.
pub fn variant_is_empty(v: &VARIANT) -> bool {
    unsafe {
        let vt = v.Anonymous.Anonymous.vt;
        vt == VT_EMPTY || vt == VT_NULL
    }
}

/// Format a GUID the way running-object display names spell it: `{XXXXXXXX-...}`.
pub fn guid_string(g: &GUID) -> String {
    format!(
        "{{{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}}}",
        g.data1,
        g.data2,
        g.data3,
        g.data4[0],
        g.data4[1],
        g.data4[2],
        g.data4[3],
        g.data4[4],
        g.data4[5],
        g.data4[6],
        g.data4[7]
    )
}

// -- DispatchObject --

/// A wrapper around an IDispatch COM object providing ergonomic access.
#[derive(Clone)]
pub struct DispatchObject {
    inner: IDispatch,
}

impl DispatchObject {
    /// Attach to the running instance of a ProgID, if there is one.
    pub fn active(progid: &str) -> Result<Option<Self>, String> {
        unsafe {
            let clsid = clsid_from_progid(progid)?;
            let mut running = None;
            if GetActiveObject(&clsid, None, &mut running).is_err() {
                return Ok(None);
            }
            Ok(running
                .and_then(|unk| unk.cast::<IDispatch>().ok())
                .map(|inner| Self { inner }))
        }
    }

    /// Attach to the running instance of a ProgID, or start one.
    pub fn active_or_create(progid: &str) -> Result<Self, String> {
        if let Some(app) = Self::active(progid)? {
            tracing::debug!("Attached to running {progid}");
            return Ok(app);
        }
        unsafe {
            let clsid = clsid_from_progid(progid)?;
            let disp: IDispatch = CoCreateInstance(&clsid, None, CLSCTX_LOCAL_SERVER)
                .map_err(|e| format!("CoCreateInstance failed for '{progid}': {e}"))?;
            tracing::info!("Started {progid}");
            Ok(Self { inner: disp })
        }
    }

    /// Wrap an existing IDispatch pointer.
    pub fn from_idispatch(disp: IDispatch) -> Self {
        Self { inner: disp }
    }

    /// Look up the DISPID for a member name.
    fn get_dispid(&self, name: &str) -> Result<i32, String> {
        unsafe {
            let wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
            let pcwstr = PCWSTR(wide.as_ptr());
            let names = [pcwstr];
            let mut dispid = 0i32;
            self.inner
                .GetIDsOfNames(
                    &GUID::zeroed(),
                    names.as_ptr(),
                    1,
                    GetSystemDefaultLCID(),
                    &mut dispid,
                )
                .map_err(|e| format!("GetIDsOfNames('{name}') failed: {e}"))?;
            Ok(dispid)
        }
    }

    fn invoke(
        &self,
        name: &str,
        flags: windows::Win32::System::Com::DISPATCH_FLAGS,
        args: &[VARIANT],
    ) -> Result<VARIANT, String> {
        let dispid = self.get_dispid(name)?;
        unsafe {
            // DISPPARAMS requires arguments in reverse order
            let mut reversed: Vec<VARIANT> = args.iter().rev().cloned().collect();
            let params = DISPPARAMS {
                rgvarg: if reversed.is_empty() {
                    std::ptr::null_mut()
                } else {
                    reversed.as_mut_ptr()
                },
                rgdispidNamedArgs: std::ptr::null_mut(),
                cArgs: reversed.len() as u32,
                cNamedArgs: 0,
            };
            let mut result = VARIANT::default();
            let mut except = EXCEPINFO::default();
            self.inner
                .Invoke(
                    dispid,
                    &GUID::zeroed(),
                    GetSystemDefaultLCID(),
                    flags,
                    &params,
                    Some(&mut result),
                    Some(&mut except),
                    None,
                )
                .map_err(|e| format_invoke_error(e, &except, name))?;
            Ok(result)
        }
    }

    /// Get a property value. Equivalent to VB's `obj.PropertyName`.
    pub fn get_property(&self, name: &str) -> Result<VARIANT, String> {
        self.invoke(name, DISPATCH_PROPERTYGET, &[])
    }

    /// Get a string property, e.g. `Document.FullName`.
    pub fn get_string(&self, name: &str) -> Result<String, String> {
        let variant = self.get_property(name)?;
        variant_get_string(&variant)
            .ok_or_else(|| format!("'{name}' is not a string (VT={})", variant_vt(&variant)))
    }

    /// Get an integer property, e.g. `Shape.ID` or `Selection.Count`.
    pub fn get_i64(&self, name: &str) -> Result<i64, String> {
        let variant = self.get_property(name)?;
        variant_get_i64(&variant)
            .ok_or_else(|| format!("'{name}' is not an integer (VT={})", variant_vt(&variant)))
    }

    /// Set a property value. Equivalent to VB's `obj.PropertyName = value`.
    pub fn set_property(&self, name: &str, value: VARIANT) -> Result<(), String> {
        let dispid = self.get_dispid(name)?;
        unsafe {
            let mut args = [value];
            let mut named_args = [DISPID_PROPERTYPUT];
            let params = DISPPARAMS {
                rgvarg: args.as_mut_ptr(),
                rgdispidNamedArgs: named_args.as_mut_ptr(),
                cArgs: 1,
                cNamedArgs: 1,
            };
            let mut except = EXCEPINFO::default();
            self.inner
                .Invoke(
                    dispid,
                    &GUID::zeroed(),
                    GetSystemDefaultLCID(),
                    DISPATCH_PROPERTYPUT,
                    &params,
                    None,
                    Some(&mut except),
                    None,
                )
                .map_err(|e| format_invoke_error(e, &except, name))?;
            Ok(())
        }
    }

    /// Invoke a method with arguments in natural order.
    pub fn invoke_method(&self, name: &str, args: &[VARIANT]) -> Result<VARIANT, String> {
        self.invoke(name, DISPATCH_METHOD, args)
    }

    /// Get a child object (property that returns an IDispatch).
    pub fn get_child(&self, name: &str) -> Result<DispatchObject, String> {
        let variant = self.get_property(name)?;
        extract_dispatch(&variant, name)
    }

    /// Invoke a method and extract the returned IDispatch object.
    pub fn invoke_child(&self, name: &str, args: &[VARIANT]) -> Result<DispatchObject, String> {
        let variant = self.invoke_method(name, args)?;
        extract_dispatch(&variant, name)
    }

    /// Get a parameterized property value, e.g. `Shape.CellExists(name, 0)`.
    pub fn get_property_with(&self, name: &str, args: &[VARIANT]) -> Result<VARIANT, String> {
        self.invoke(name, DISPATCH_PROPERTYGET, args)
    }

    /// Get an indexed property (e.g., `Pages.Item(1)` or `Cells("prop.Owner")`).
    pub fn get_indexed(&self, name: &str, index: &VARIANT) -> Result<DispatchObject, String> {
        let variant = self.get_property_with(name, std::slice::from_ref(index))?;
        extract_dispatch(&variant, name)
    }

    /// The type library this object's class is described in.
    fn type_library(&self) -> Result<ITypeLib, String> {
        unsafe {
            let info = self
                .inner
                .GetTypeInfo(0, GetSystemDefaultLCID())
                .map_err(|e| format!("GetTypeInfo failed: {e}"))?;
            let mut lib: Option<ITypeLib> = None;
            let mut index = 0u32;
            info.GetContainingTypeLib(&mut lib, &mut index)
                .map_err(|e| format!("GetContainingTypeLib failed: {e}"))?;
            lib.ok_or_else(|| "object has no containing type library".to_string())
        }
    }

    /// GUID of the containing type library, in `{...}` form.
    pub fn type_library_guid(&self) -> Result<String, String> {
        let lib = self.type_library()?;
        unsafe {
            let attr = lib
                .GetLibAttr()
                .map_err(|e| format!("GetLibAttr failed: {e}"))?;
            let guid = guid_string(&(*attr).guid);
            lib.ReleaseTLibAttr(attr);
            Ok(guid)
        }
    }

    /// All enumeration constants of the containing type library.
    pub fn enum_constants(&self) -> Result<BTreeMap<String, i64>, String> {
        let lib = self.type_library()?;
        let mut constants = BTreeMap::new();
        unsafe {
            for i in 0..lib.GetTypeInfoCount() {
                if lib.GetTypeInfoType(i).map_or(true, |kind| kind != TKIND_ENUM) {
                    continue;
                }
                let Ok(info) = lib.GetTypeInfo(i) else {
                    continue;
                };
                let Ok(attr) = info.GetTypeAttr() else {
                    continue;
                };
                for v in 0..(*attr).cVars as u32 {
                    let Ok(desc) = info.GetVarDesc(v) else {
                        continue;
                    };
                    let mut name = BSTR::default();
                    let named = info
                        .GetDocumentation(
                            (*desc).memid,
                            Some(&mut name as *mut BSTR),
                            None,
                            &mut 0u32,
                            None,
                        )
                        .is_ok();
                    let value = (*desc).Anonymous.lpvarValue;
                    if named && !value.is_null() {
                        if let Some(n) = variant_get_i64(&*value) {
                            constants.insert(name.to_string(), n);
                        }
                    }
                    info.ReleaseVarDesc(desc);
                }
                info.ReleaseTypeAttr(attr);
            }
        }
        Ok(constants)
    }
}

fn clsid_from_progid(progid: &str) -> Result<GUID, String> {
    unsafe {
        CLSIDFromProgID(&HSTRING::from(progid))
            .map_err(|e| format!("CLSIDFromProgID('{progid}') failed: {e}"))
    }
}

/// Extract an IDispatch from a VARIANT, with a descriptive error.
fn extract_dispatch(variant: &VARIANT, context: &str) -> Result<DispatchObject, String> {
    if let Some(disp) = variant_get_dispatch(variant) {
        Ok(DispatchObject::from_idispatch(disp))
    } else if variant_is_empty(variant) {
        Err(format!("'{context}' returned empty/null"))
    } else {
        let vt = variant_vt(variant);
        Err(format!(
            "'{context}' returned non-object VARIANT (VT={vt}), expected VT_DISPATCH"
        ))
    }
}

/// Format an Invoke error, including EXCEPINFO details if available.
fn format_invoke_error(err: windows::core::Error, except: &EXCEPINFO, member_name: &str) -> String {
    let code = err.code().0 as u32;
    if code == DISP_E_EXCEPTION.0 as u32 {
        let desc = if !except.bstrDescription.is_empty() {
            except.bstrDescription.to_string()
        } else {
            String::from("(no description)")
        };
        let source = if !except.bstrSource.is_empty() {
            except.bstrSource.to_string()
        } else {
            String::from("(no source)")
        };
        format!("COM exception in '{member_name}': {desc} (source: {source})")
    } else {
        format!("Invoke('{member_name}') failed: {err}")
    }
}
