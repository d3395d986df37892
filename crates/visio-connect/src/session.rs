//! Named slots of resolved documents, owned by the caller.
//!
//! A session replaces injecting `vApp`/`vDoc`/... into a scripting namespace:
//! each slot is keyed by a suffix (`""` for the default, `"1"` for a second
//! document, ...) and holds the handles resolved for that document.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::automation::{Automation, Constants};
use crate::config::ResolverConfig;
use crate::error::Result;
use crate::prompt::Prompt;
use crate::resolver::{ResolvedDocument, Resolver, Selector};

/// Conventional variable names for a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundNames {
    pub app: String,
    pub doc: String,
    pub page: String,
    pub window: String,
    pub constants: &'static str,
}

impl BoundNames {
    pub fn for_suffix(suffix: &str) -> Self {
        Self {
            app: format!("app{suffix}"),
            doc: format!("doc{suffix}"),
            page: format!("page{suffix}"),
            window: format!("window{suffix}"),
            constants: "constants",
        }
    }
}

pub struct Session {
    automation: Arc<dyn Automation>,
    config: ResolverConfig,
    slots: BTreeMap<String, ResolvedDocument>,
    constants: Option<Constants>,
}

impl Session {
    pub fn new(automation: Arc<dyn Automation>, config: ResolverConfig) -> Self {
        Self {
            automation,
            config,
            slots: BTreeMap::new(),
            constants: None,
        }
    }

    pub fn automation(&self) -> &Arc<dyn Automation> {
        &self.automation
    }

    pub fn resolver(&self) -> Resolver<'_> {
        Resolver::new(self.automation.as_ref(), &self.config)
    }

    /// Resolve `selector` and store the result under `suffix`, replacing (and
    /// releasing) any previous slot. Returns `None` (and leaves the slot alone)
    /// on cancel.
    pub fn attach(
        &mut self,
        suffix: &str,
        selector: &Selector,
        prompt: &mut dyn Prompt,
    ) -> Result<Option<&ResolvedDocument>> {
        let Some(resolved) = self.resolver().resolve(selector, prompt)? else {
            return Ok(None);
        };

        let names = BoundNames::for_suffix(suffix);
        tracing::info!(
            "Bound {}, {}, {} and {} to '{}'",
            names.app,
            names.doc,
            names.page,
            names.window,
            resolved.document.name
        );

        if let Some(previous) = self.slots.insert(suffix.to_string(), resolved) {
            self.release(&previous);
        }
        Ok(self.slots.get(suffix))
    }

    fn release(&self, resolved: &ResolvedDocument) {
        if let Err(e) = self.automation.release(&resolved.handles()) {
            tracing::debug!("Releasing handles of '{}' failed: {e}", resolved.document.name);
        }
    }

    pub fn get(&self, suffix: &str) -> Option<&ResolvedDocument> {
        self.slots.get(suffix)
    }

    /// Empty a slot and release its handles. Returns whether it was occupied.
    pub fn remove(&mut self, suffix: &str) -> bool {
        match self.slots.remove(suffix) {
            Some(resolved) => {
                self.release(&resolved);
                true
            }
            None => false,
        }
    }

    /// Occupied slots in suffix order.
    pub fn slots(&self) -> impl Iterator<Item = (&str, &ResolvedDocument)> {
        self.slots.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The constants table, fetched on first use.
    pub fn constants(&mut self) -> Result<&Constants> {
        if self.constants.is_none() {
            let loaded = self.automation.constants()?;
            tracing::debug!("Loaded {} Visio constants", loaded.len());
            self.constants = Some(loaded);
        }
        Ok(self.constants.get_or_insert_with(Constants::default))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for resolved in self.slots.values() {
            self.release(resolved);
        }
    }
}
