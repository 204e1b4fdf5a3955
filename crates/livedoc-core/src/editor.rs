//! Editing surfaces: a sync session plus the asset store pastes go to.

use crate::backend::{AssetStore, DocumentBackend};
use crate::canvas::CanvasSurface;
use crate::config::EngineConfig;
use crate::document::{DocumentRef, TextDocument, markdown_image};
use crate::error::{SyncError, SyncResult};
use crate::ingest::{self, IngestedImage, PasteItem};
use crate::input::PointerEvent;
use crate::shapes::{AssetId, CssColor};
use crate::sync::{Clock, SaveStatus, SyncEvent, SyncSession, SystemClock};
use crate::tools::ToolKind;
use kurbo::Point;
use std::sync::Arc;

/// A backend that stores both documents and their assets.
pub trait EditorBackend: DocumentBackend + AssetStore {}

impl<T: DocumentBackend + AssetStore> EditorBackend for T {}

/// What happened to each item of a paste.
#[derive(Debug, Default)]
pub struct PasteReport {
    pub inserted: Vec<IngestedImage>,
    pub failures: Vec<SyncError>,
    /// Items that were not images.
    pub ignored: usize,
}

impl PasteReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Upload every image in `items`, handing each success to `insert`.
async fn ingest_all<S, F>(store: &S, items: Vec<PasteItem>, mut insert: F) -> PasteReport
where
    S: AssetStore + ?Sized,
    F: FnMut(&IngestedImage),
{
    let mut report = PasteReport::default();
    for item in items {
        match ingest::ingest_item(store, item).await {
            None => report.ignored += 1,
            Some(Ok(image)) => {
                insert(&image);
                report.inserted.push(image);
            }
            Some(Err(err)) => report.failures.push(err),
        }
    }
    report
}

/// A live canvas.
pub struct CanvasEditor<B: EditorBackend> {
    session: SyncSession<CanvasSurface, B>,
}

impl<B: EditorBackend> CanvasEditor<B> {
    pub async fn open(backend: Arc<B>, id: u64, config: &EngineConfig) -> SyncResult<Self> {
        Self::open_with_clock(backend, id, config, Arc::new(SystemClock)).await
    }

    pub async fn open_with_clock(
        backend: Arc<B>,
        id: u64,
        config: &EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> SyncResult<Self> {
        let surface = CanvasSurface::new(&config.canvas, config.preferences.clone());
        let session = SyncSession::open_with_clock(
            backend,
            DocumentRef::canvas(id),
            surface,
            config.sync.clone(),
            clock,
        )
        .await?;
        let editor = Self { session };
        editor.measure_images().await;
        Ok(editor)
    }

    pub fn session(&self) -> &SyncSession<CanvasSurface, B> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SyncSession<CanvasSurface, B> {
        &mut self.session
    }

    pub fn with_surface<R>(&self, f: impl FnOnce(&CanvasSurface) -> R) -> R {
        self.session.with_document(f)
    }

    /// Fetch any asset whose pixel size is unknown and record it.
    ///
    /// Placements of unmeasured assets cannot be selected.
    pub async fn measure_images(&self) {
        let missing: Vec<AssetId> = self.with_surface(|surface| {
            let mut ids = Vec::new();
            for image in &surface.document().images {
                if surface.image_size(&image.asset_id).is_none() && !ids.contains(&image.asset_id) {
                    ids.push(image.asset_id.clone());
                }
            }
            ids
        });

        for id in missing {
            match self.session.backend().fetch_asset(&id).await {
                Ok(bytes) => {
                    if let Some(size) = ingest::natural_size(&bytes) {
                        self.session
                            .update(|surface| surface.register_image_size(id, size));
                    }
                }
                Err(err) => log::warn!("Could not measure asset {id}: {err}"),
            }
        }
    }

    pub fn handle_pointer_event(&self, event: PointerEvent) {
        self.session
            .update(|surface| surface.handle_pointer_event(event));
    }

    pub fn set_tool(&self, tool: ToolKind) {
        self.session.update(|surface| surface.set_tool(tool));
    }

    pub fn set_stroke_color(&self, color: CssColor) {
        self.session.update(|surface| surface.set_stroke_color(color));
    }

    pub fn set_stroke_width(&self, width: f64) {
        self.session.update(|surface| surface.set_stroke_width(width));
    }

    pub fn set_background(&self, color: CssColor) {
        self.session.update(|surface| surface.set_background(color));
    }

    pub fn undo(&self) -> bool {
        self.session.update(CanvasSurface::undo)
    }

    pub fn redo(&self) -> bool {
        self.session.update(CanvasSurface::redo)
    }

    /// Empty the canvas and save right away.
    pub fn clear(&self) {
        self.session.update(CanvasSurface::clear);
        self.session.request_save();
    }

    pub fn select_at(&self, screen: Point) -> Option<usize> {
        self.session.update(|surface| surface.select_at(screen))
    }

    pub fn scale_selected_image(&self, scale_x: f64, scale_y: f64) -> bool {
        self.session
            .update(|surface| surface.scale_selected_image(scale_x, scale_y))
    }

    /// Remove the selected image, save, and release its asset in the background.
    ///
    /// Asset deletion is best effort: a failure is logged and the canvas stays as it is.
    pub fn delete_selected_image(&self) -> Option<AssetId> {
        let removed = self.session.update(CanvasSurface::delete_selected_image)?;
        self.session.request_save();

        let still_used = self.with_surface(|surface| {
            surface
                .document()
                .images
                .iter()
                .any(|image| image.asset_id == removed.asset_id)
        });
        if !still_used {
            let backend = Arc::clone(self.session.backend());
            let id = removed.asset_id.clone();
            tokio::spawn(async move {
                match backend.delete_asset(&id).await {
                    Ok(()) => log::info!("Deleted asset {id}"),
                    Err(err) => log::warn!("Failed to delete asset {id}: {err}"),
                }
            });
        }
        Some(removed.asset_id)
    }

    /// Upload pasted images and place each one at the pointer.
    pub async fn paste(&self, items: Vec<PasteItem>) -> PasteReport {
        let store = Arc::clone(self.session.backend());
        ingest_all(store.as_ref(), items, |image| {
            let index = self.session.update(|surface| {
                surface.place_image(image.asset_id.clone(), image.natural_size)
            });
            log::debug!("Placed asset {} as image {index}", image.asset_id);
        })
        .await
    }

    pub fn status(&self) -> SaveStatus {
        self.session.status()
    }

    pub fn poll_events(&mut self) -> Vec<SyncEvent> {
        self.session.poll_events()
    }

    pub async fn flush(&self) -> SyncResult<()> {
        self.session.flush().await
    }

    pub async fn reload(&self) -> SyncResult<()> {
        self.session.reload().await?;
        self.measure_images().await;
        Ok(())
    }

    pub fn dispose(&mut self) {
        self.session.dispose();
    }
}

/// A live page or translation.
pub struct TextEditor<D: TextDocument, B: EditorBackend> {
    session: SyncSession<D, B>,
}

impl<D: TextDocument, B: EditorBackend> TextEditor<D, B> {
    pub async fn open(
        backend: Arc<B>,
        document: DocumentRef,
        model: D,
        config: &EngineConfig,
    ) -> SyncResult<Self> {
        Self::open_with_clock(backend, document, model, config, Arc::new(SystemClock)).await
    }

    pub async fn open_with_clock(
        backend: Arc<B>,
        document: DocumentRef,
        model: D,
        config: &EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> SyncResult<Self> {
        let session =
            SyncSession::open_with_clock(backend, document, model, config.sync.clone(), clock)
                .await?;
        Ok(Self { session })
    }

    pub fn session(&self) -> &SyncSession<D, B> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SyncSession<D, B> {
        &mut self.session
    }

    pub fn content(&self) -> String {
        self.session.with_document(|doc| doc.text().content().to_owned())
    }

    pub fn caret(&self) -> usize {
        self.session.with_document(|doc| doc.text().caret())
    }

    /// Replace the text as typed; autosaves after the debounce.
    pub fn set_content(&self, content: impl Into<String>) {
        let content = content.into();
        self.session.update(|doc| doc.text_mut().set_content(content));
    }

    pub fn set_caret(&self, offset: usize) {
        self.session.update(|doc| doc.text_mut().set_caret(offset));
    }

    /// Upload pasted images and insert a markdown reference for each at the caret.
    ///
    /// Saves right away once anything was inserted.
    pub async fn paste(&self, items: Vec<PasteItem>) -> PasteReport {
        let store = Arc::clone(self.session.backend());
        let report = ingest_all(store.as_ref(), items, |image| {
            let snippet = markdown_image(&store.asset_url(&image.asset_id));
            self.session
                .update(|doc| doc.text_mut().insert_at_caret(&snippet));
        })
        .await;
        if !report.inserted.is_empty() {
            self.session.request_save();
        }
        report
    }

    pub fn status(&self) -> SaveStatus {
        self.session.status()
    }

    pub fn poll_events(&mut self) -> Vec<SyncEvent> {
        self.session.poll_events()
    }

    pub async fn flush(&self) -> SyncResult<()> {
        self.session.flush().await
    }

    pub async fn reload(&self) -> SyncResult<()> {
        self.session.reload().await
    }

    pub fn dispose(&mut self) {
        self.session.dispose();
    }
}
