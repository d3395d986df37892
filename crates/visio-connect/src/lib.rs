//! Attach to running Visio instances over COM.
//!
//! This crate finds documents that are already open in Visio (through the
//! system running object table), opens or creates documents when asked, and
//! hands back the application, document, first page and active window handles
//! together with the type-library constants. It also provides a selection
//! watcher that writes a Shape Data value into every shape the user selects.
//!
//! # Architecture
//!
//! ```text
//! Your Rust code
//!     └── Session / Resolver / SelectionWatcher (this crate)
//!           └── Automation trait
//!                 └── ComBridge: spawns visio-com-bridge.exe (natively or under wine)
//!                       └── COM: running object table, Visio.Application
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use visio_connect::{ComBridge, Config, Selector, Session, Unattended};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default().with_env_overrides();
//!     let bridge = Arc::new(ComBridge::start(&config.bridge)?);
//!     let mut session = Session::new(bridge, config.resolver);
//!
//!     for (i, doc) in session.resolver().loaded_documents()?.documents.iter().enumerate() {
//!         println!("{i}: {}", doc.full_name);
//!     }
//!
//!     session.attach("", &Selector::Index(0), &mut Unattended)?;
//!     session.attach("1", &Selector::New { template: None }, &mut Unattended)?;
//!     let user = session.constants()?.get("visSectionUser");
//!     println!("visSectionUser = {user:?}");
//!     Ok(())
//! }
//! ```

pub mod automation;
pub mod bridge;
pub mod config;
pub mod error;
pub mod path;
pub mod prompt;
pub mod resolver;
pub mod session;
pub mod watcher;

pub use automation::{
    ApplicationHandle, Automation, Constants, DocumentHandle, DocumentInfo, DocumentKey,
    PageHandle, RunningObject, ShapeHandle, ShapeRef, WindowHandle,
};
pub use bridge::{BridgeError, ComBridge};
pub use config::{BridgeConfig, Config, ResolverConfig, WatcherConfig};
pub use error::{Error, Result};
pub use path::NormalizedPath;
pub use prompt::{Choice, FileKind, Prompt, Unattended};
pub use resolver::{Enumeration, MatchKind, ResolvedDocument, Resolver, Selector, SkippedEntry};
pub use session::{BoundNames, Session};
pub use watcher::{
    PropertyEditRequest, SelectionSnapshot, SelectionWatcher, ShapeOutcome, ShapeResult,
    TickReport,
};
