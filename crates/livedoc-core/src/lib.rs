//! LiveDoc Core Library
//!
//! Object model, freehand tool state machine, undo history, image paste
//! ingestion and the autosave/poll synchronization engine for LiveDoc
//! pages, translations and canvases.

pub mod backend;
pub mod canvas;
pub mod config;
pub mod document;
pub mod editor;
pub mod error;
pub mod history;
pub mod ingest;
pub mod input;
pub mod shapes;
pub mod sync;
pub mod tools;
pub mod viewport;

pub use backend::{AssetStore, DocumentBackend, HttpBackend, MemoryBackend};
pub use canvas::{CanvasDocument, CanvasSurface};
pub use config::{EngineConfig, Preferences, Theme};
pub use document::{DocumentKind, DocumentRef, PageDocument, Timestamp, TranslationDocument};
pub use editor::{CanvasEditor, EditorBackend, PasteReport, TextEditor};
pub use error::{SyncError, SyncResult};
pub use history::History;
pub use ingest::PasteItem;
pub use input::{InputModality, InputState, PointerButton, PointerEvent};
pub use sync::{SaveStatus, SyncDocument, SyncEvent, SyncSession};
pub use tools::{ToolKind, ToolManager};
pub use viewport::{Viewport, ZoomLimits};
