//! Sync session: one driver task per open document.

use super::{Clock, SaveStatus, SyncDocument, SyncEvent, SystemClock};
use crate::backend::{BoxFuture, DocumentBackend};
use crate::config::SyncConfig;
use crate::document::{DocumentRef, RemoteDocument, Timestamp};
use crate::error::{SyncError, SyncResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

type Waiter = oneshot::Sender<SyncResult<()>>;

enum Command {
    /// The model changed; restart the debounce.
    Edited,
    /// Save now instead of waiting for the debounce.
    SaveNow { done: Option<Waiter> },
    /// Check for a remote update now.
    Poll,
    /// Replace the model with the remote copy, even over an in-flight save.
    Reload { done: Waiter },
}

#[derive(Debug, Default)]
struct SyncState {
    edited_at: Option<Timestamp>,
    saved_at: Option<Timestamp>,
    /// Server timestamp of the content currently loaded.
    loaded_remote_at: Option<Timestamp>,
    dirty: bool,
    /// Bumped on every local edit so a save can tell whether it covered the latest one.
    edit_seq: u64,
    saving: bool,
    status: SaveStatus,
    last_error: Option<SyncError>,
    /// Newer remote version seen while a refetch was not allowed.
    pending_remote: Option<Timestamp>,
    /// Bumped by reloads; saves started under an older epoch are stale.
    epoch: u64,
}

impl SyncState {
    fn baseline(&self) -> Option<Timestamp> {
        [self.edited_at, self.saved_at, self.loaded_remote_at]
            .into_iter()
            .flatten()
            .reduce(Timestamp::max)
    }

    /// Strictly newer than anything this session wrote, edited or loaded.
    fn is_newer(&self, remote: Timestamp) -> bool {
        self.baseline().is_none_or(|baseline| remote > baseline)
    }
}

/// State shared between the session handle and its driver task.
///
/// Lock order is `document` then `state`. Neither is held across an await.
struct Shared<D> {
    document: Mutex<D>,
    state: Mutex<SyncState>,
    disposed: AtomicBool,
    clock: Arc<dyn Clock>,
    events: mpsc::UnboundedSender<SyncEvent>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<D> Shared<D> {
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn emit(&self, event: SyncEvent) {
        let _ = self.events.send(event);
    }

    fn set_status(&self, state: &mut SyncState, status: SaveStatus) {
        if state.status != status {
            state.status = status;
            self.emit(SyncEvent::Status(status));
        }
    }
}

/// Keeps one document model in sync with its remote copy.
///
/// Local edits made through [`SyncSession::update`] are persisted once they
/// have been quiet for the debounce period. The remote `last_update` is polled
/// on a fixed interval; a strictly newer remote version replaces the model,
/// unless local edits are unsaved, a save is in flight, or the model reports an
/// active interaction, in which case the refetch is deferred.
///
/// The timers stop when the session is disposed or dropped. Must be opened
/// inside a tokio runtime.
pub struct SyncSession<D: SyncDocument, B: DocumentBackend> {
    shared: Arc<Shared<D>>,
    backend: Arc<B>,
    document: DocumentRef,
    commands: mpsc::UnboundedSender<Command>,
    events: mpsc::UnboundedReceiver<SyncEvent>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl<D: SyncDocument, B: DocumentBackend> SyncSession<D, B> {
    /// Fetch `document`, load it into `model` and start syncing.
    ///
    /// A payload the model cannot parse is fatal and returned as
    /// [`SyncError::SerializationFailure`].
    pub async fn open(
        backend: Arc<B>,
        document: DocumentRef,
        model: D,
        config: SyncConfig,
    ) -> SyncResult<Self> {
        Self::open_with_clock(backend, document, model, config, Arc::new(SystemClock)).await
    }

    pub async fn open_with_clock(
        backend: Arc<B>,
        document: DocumentRef,
        mut model: D,
        config: SyncConfig,
        clock: Arc<dyn Clock>,
    ) -> SyncResult<Self> {
        let remote = backend.fetch(document).await?;
        if let Err(err) = model.replace_content(&remote.content) {
            log::error!("Cannot open {document}: {err}");
            return Err(err);
        }
        model.take_changed();
        log::info!(
            "Opened {document} ({} bytes, last edit {:?})",
            remote.content.len(),
            remote.last_edit_time.map(|t| t.as_secs())
        );

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            document: Mutex::new(model),
            state: Mutex::new(SyncState {
                loaded_remote_at: remote.last_edit_time,
                ..SyncState::default()
            }),
            disposed: AtomicBool::new(false),
            clock,
            events: event_tx,
        });
        let cancel = CancellationToken::new();

        let driver = Driver {
            shared: Arc::clone(&shared),
            backend: Arc::clone(&backend),
            document,
            config,
            commands: command_rx,
            cancel: cancel.clone(),
            deadline: None,
            save: None,
            save_waiters: Vec::new(),
            queued_waiters: Vec::new(),
            save_requested: false,
            remote: None,
            reload_waiters: Vec::new(),
            reload_pending: false,
        };
        let task = tokio::spawn(driver.run());

        Ok(Self {
            shared,
            backend,
            document,
            commands: command_tx,
            events: event_rx,
            cancel,
            task: Some(task),
        })
    }

    pub fn document_ref(&self) -> DocumentRef {
        self.document
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Read the model.
    pub fn with_document<R>(&self, f: impl FnOnce(&D) -> R) -> R {
        f(&lock(&self.shared.document))
    }

    /// Mutate the model. If the model reports a change, an autosave is scheduled.
    pub fn update<R>(&self, f: impl FnOnce(&mut D) -> R) -> R {
        let mut document = lock(&self.shared.document);
        let result = f(&mut document);
        if document.take_changed() {
            // Still holding the document lock, so no replace can slip in between.
            self.note_edit();
        }
        result
    }

    /// Record a local edit and restart the debounce timer.
    pub fn schedule_autosave(&self) {
        let _document = lock(&self.shared.document);
        self.note_edit();
    }

    fn note_edit(&self) {
        let mut state = lock(&self.shared.state);
        if self.shared.is_disposed() {
            return;
        }
        state.edited_at = Some(self.shared.clock.now());
        state.dirty = true;
        state.edit_seq += 1;
        let status = if state.saving {
            SaveStatus::Saving
        } else {
            SaveStatus::Pending
        };
        self.shared.set_status(&mut state, status);
        drop(state);
        let _ = self.commands.send(Command::Edited);
    }

    /// Start a save right away without waiting for it.
    pub fn request_save(&self) {
        if !self.shared.is_disposed() {
            let _ = self.commands.send(Command::SaveNow { done: None });
        }
    }

    /// Save right away and wait for the outcome.
    pub async fn flush(&self) -> SyncResult<()> {
        if self.shared.is_disposed() {
            return Err(SyncError::Disposed);
        }
        let (done, outcome) = oneshot::channel();
        self.commands
            .send(Command::SaveNow { done: Some(done) })
            .map_err(|_| SyncError::Disposed)?;
        outcome.await.map_err(|_| SyncError::Disposed)?
    }

    /// Check for a remote update without waiting for the next poll tick.
    pub fn poll_for_external_updates(&self) {
        if !self.shared.is_disposed() {
            let _ = self.commands.send(Command::Poll);
        }
    }

    /// Replace the model with the remote copy, discarding unsaved local edits.
    ///
    /// A save still in flight when the replace lands is reported as a stale write.
    /// The replace waits for any stroke or drag in progress to end.
    pub async fn reload(&self) -> SyncResult<()> {
        if self.shared.is_disposed() {
            return Err(SyncError::Disposed);
        }
        let (done, outcome) = oneshot::channel();
        self.commands
            .send(Command::Reload { done })
            .map_err(|_| SyncError::Disposed)?;
        outcome.await.map_err(|_| SyncError::Disposed)?
    }

    pub fn status(&self) -> SaveStatus {
        lock(&self.shared.state).status
    }

    /// Whether local edits have not been persisted yet.
    pub fn is_dirty(&self) -> bool {
        lock(&self.shared.state).dirty
    }

    pub fn edited_at(&self) -> Option<Timestamp> {
        lock(&self.shared.state).edited_at
    }

    pub fn saved_at(&self) -> Option<Timestamp> {
        lock(&self.shared.state).saved_at
    }

    pub fn last_error(&self) -> Option<SyncError> {
        lock(&self.shared.state).last_error.clone()
    }

    /// Drain events since the last call.
    pub fn poll_events(&mut self) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.is_disposed()
    }

    /// Stop both timers. Nothing in flight may touch the session afterwards.
    pub fn dispose(&mut self) {
        {
            let _state = lock(&self.shared.state);
            if self.shared.disposed.swap(true, Ordering::SeqCst) {
                return;
            }
        }
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
        log::debug!("Disposed sync session for {}", self.document);
    }
}

impl<D: SyncDocument, B: DocumentBackend> Drop for SyncSession<D, B> {
    fn drop(&mut self) {
        self.dispose();
    }
}

struct SaveOutcome {
    epoch: u64,
    seq: u64,
    result: SyncResult<()>,
}

enum RemoteOutcome {
    Checked(SyncResult<Option<Timestamp>>),
    Fetched {
        observed: Option<Timestamp>,
        forced: bool,
        epoch: u64,
        result: SyncResult<RemoteDocument>,
    },
}

/// Await the future in `slot`, or never resolve when the slot is empty.
async fn in_flight<T>(slot: &mut Option<BoxFuture<'static, T>>) -> T {
    match slot.as_mut() {
        Some(future) => future.await,
        None => std::future::pending().await,
    }
}

struct Driver<D, B> {
    shared: Arc<Shared<D>>,
    backend: Arc<B>,
    document: DocumentRef,
    config: SyncConfig,
    commands: mpsc::UnboundedReceiver<Command>,
    cancel: CancellationToken,
    /// Debounce expiry.
    deadline: Option<Instant>,
    save: Option<BoxFuture<'static, SaveOutcome>>,
    save_waiters: Vec<Waiter>,
    /// Flush requests that arrived while a save was in flight.
    queued_waiters: Vec<Waiter>,
    save_requested: bool,
    remote: Option<BoxFuture<'static, RemoteOutcome>>,
    reload_waiters: Vec<Waiter>,
    reload_pending: bool,
}

impl<D: SyncDocument, B: DocumentBackend> Driver<D, B> {
    async fn run(mut self) {
        let period = self.config.poll_interval();
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let deadline = self.deadline.unwrap_or_else(Instant::now);
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                outcome = in_flight(&mut self.save) => {
                    self.save = None;
                    self.finish_save(outcome);
                }
                _ = time::sleep_until(deadline), if self.deadline.is_some() && self.save.is_none() => {
                    self.deadline = None;
                    self.start_save();
                }
                _ = ticker.tick() => self.on_tick(),
                outcome = in_flight(&mut self.remote) => {
                    self.remote = None;
                    self.finish_remote(outcome);
                }
            }
        }

        log::debug!("Sync driver for {} stopped", self.document);
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Edited => {
                self.deadline = Some(Instant::now() + self.config.debounce());
            }
            Command::SaveNow { done } => {
                self.queued_waiters.extend(done);
                self.deadline = None;
                if self.save.is_none() {
                    self.start_save();
                } else {
                    self.save_requested = true;
                }
            }
            Command::Poll => self.start_poll(),
            Command::Reload { done } => {
                self.reload_waiters.push(done);
                lock(&self.shared.state).epoch += 1;
                self.reload_pending = true;
                // Whatever remote check was running is superseded.
                self.remote = None;
                self.start_fetch(None, true);
            }
        }
    }

    fn on_tick(&mut self) {
        if self.reload_pending {
            if self.remote.is_none() {
                self.start_fetch(None, true);
            }
        } else {
            self.start_poll();
        }
    }

    fn start_save(&mut self) {
        let waiters = std::mem::take(&mut self.queued_waiters);
        self.save_requested = false;

        let prepared = {
            let document = lock(&self.shared.document);
            let mut state = lock(&self.shared.state);
            if self.shared.is_disposed() {
                return;
            }
            if !state.dirty {
                None
            } else {
                let serialized = document.serialize_content();
                match &serialized {
                    Ok(_) => {
                        state.saving = true;
                        self.shared.set_status(&mut state, SaveStatus::Saving);
                    }
                    Err(error) => {
                        state.last_error = Some(error.clone());
                        self.shared.set_status(&mut state, SaveStatus::Unsaved);
                    }
                }
                Some(serialized.map(|content| (content, state.epoch, state.edit_seq)))
            }
        };

        match prepared {
            None => {
                for waiter in waiters {
                    let _ = waiter.send(Ok(()));
                }
            }
            Some(Err(error)) => {
                log::error!("Cannot serialize {}: {error}", self.document);
                self.shared.emit(SyncEvent::SaveFailed {
                    error: error.clone(),
                });
                for waiter in waiters {
                    let _ = waiter.send(Err(error.clone()));
                }
            }
            Some(Ok((content, epoch, seq))) => {
                log::debug!("Saving {} ({} bytes)", self.document, content.len());
                self.save_waiters = waiters;
                let backend = Arc::clone(&self.backend);
                let document = self.document;
                self.save = Some(Box::pin(async move {
                    let result = backend.persist(document, content).await;
                    SaveOutcome { epoch, seq, result }
                }));
            }
        }
    }

    fn finish_save(&mut self, outcome: SaveOutcome) {
        let waiters = std::mem::take(&mut self.save_waiters);

        let (reply, deferred) = {
            let mut state = lock(&self.shared.state);
            if self.shared.is_disposed() {
                return;
            }
            state.saving = false;

            let reply = if outcome.epoch != state.epoch {
                let error = SyncError::StaleWriteRace(format!(
                    "save of {} finished after a reload replaced it",
                    self.document
                ));
                log::warn!("{error}");
                let status = if state.dirty {
                    SaveStatus::Pending
                } else {
                    SaveStatus::Saved
                };
                self.shared.set_status(&mut state, status);
                self.shared.emit(SyncEvent::StaleWriteDropped {
                    error: error.clone(),
                });
                Err(error)
            } else {
                match outcome.result {
                    Ok(()) => {
                        let now = self.shared.clock.now();
                        state.saved_at = Some(now);
                        state.last_error = None;
                        if state.edit_seq == outcome.seq {
                            state.dirty = false;
                            self.shared.set_status(&mut state, SaveStatus::Saved);
                        } else {
                            self.shared.set_status(&mut state, SaveStatus::Pending);
                        }
                        log::info!("Saved {}", self.document);
                        self.shared.emit(SyncEvent::Saved { at: now });
                        Ok(())
                    }
                    Err(error) => {
                        if error.is_transient() {
                            log::warn!("Saving {} failed: {error}", self.document);
                        } else {
                            log::error!("Saving {} failed: {error}", self.document);
                        }
                        // Still dirty: the next edit schedules another attempt.
                        state.last_error = Some(error.clone());
                        self.shared.set_status(&mut state, SaveStatus::Unsaved);
                        self.shared.emit(SyncEvent::SaveFailed {
                            error: error.clone(),
                        });
                        Err(error)
                    }
                }
            };
            (reply, state.pending_remote.is_some())
        };

        for waiter in waiters {
            let _ = waiter.send(reply.clone());
        }

        if self.save_requested || !self.queued_waiters.is_empty() {
            self.start_save();
        }
        if deferred {
            self.start_poll();
        }
    }

    fn start_poll(&mut self) {
        if self.remote.is_some() || self.shared.is_disposed() {
            return;
        }
        let backend = Arc::clone(&self.backend);
        let document = self.document;
        self.remote = Some(Box::pin(async move {
            RemoteOutcome::Checked(backend.last_update(document).await)
        }));
    }

    fn start_fetch(&mut self, observed: Option<Timestamp>, forced: bool) {
        let epoch = lock(&self.shared.state).epoch;
        let backend = Arc::clone(&self.backend);
        let document = self.document;
        self.remote = Some(Box::pin(async move {
            let result = backend.fetch(document).await;
            RemoteOutcome::Fetched {
                observed,
                forced,
                epoch,
                result,
            }
        }));
    }

    fn finish_remote(&mut self, outcome: RemoteOutcome) {
        match outcome {
            RemoteOutcome::Checked(Ok(Some(remote))) => self.consider_remote(remote),
            RemoteOutcome::Checked(Ok(None)) => {}
            RemoteOutcome::Checked(Err(error)) => {
                if self.shared.is_disposed() {
                    return;
                }
                log::warn!("Polling {} failed: {error}", self.document);
                self.shared.emit(SyncEvent::PollFailed { error });
            }
            RemoteOutcome::Fetched {
                observed,
                forced,
                epoch,
                result,
            } => self.apply_fetched(observed, forced, epoch, result),
        }
    }

    fn consider_remote(&mut self, remote: Timestamp) {
        let blocked = {
            let document = lock(&self.shared.document);
            let mut state = lock(&self.shared.state);
            if self.shared.is_disposed() {
                return;
            }
            if !state.is_newer(remote) {
                state.pending_remote = None;
                return;
            }

            let blocked = state.dirty
                || state.saving
                || self.deadline.is_some()
                || document.is_interaction_active();
            if blocked {
                if state.pending_remote != Some(remote) {
                    log::debug!("{} changed remotely at {remote}; refetch deferred", self.document);
                    self.shared.emit(SyncEvent::RefetchDeferred { remote });
                }
                state.pending_remote = Some(remote);
            }
            blocked
        };

        if !blocked {
            log::info!("{} changed remotely at {remote}; refetching", self.document);
            self.start_fetch(Some(remote), false);
        }
    }

    fn apply_fetched(
        &mut self,
        observed: Option<Timestamp>,
        forced: bool,
        epoch: u64,
        result: SyncResult<RemoteDocument>,
    ) {
        let remote = match result {
            Ok(remote) => remote,
            Err(error) => {
                if self.shared.is_disposed() {
                    return;
                }
                log::warn!("Fetching {} failed: {error}", self.document);
                self.shared.emit(SyncEvent::ReplaceFailed {
                    error: error.clone(),
                });
                if forced {
                    self.finish_reload(Err(error));
                }
                return;
            }
        };

        let applied = {
            let mut document = lock(&self.shared.document);
            let mut state = lock(&self.shared.state);
            if self.shared.is_disposed() {
                return;
            }

            if document.is_interaction_active() {
                // Retried after the interaction ends: on the next tick for a reload,
                // on the next poll otherwise.
                if !forced {
                    state.pending_remote = observed.or(remote.last_edit_time);
                }
                return;
            }
            if !forced && (epoch != state.epoch || state.dirty || state.saving) {
                // A local edit slipped in while fetching; re-evaluated after it is saved.
                state.pending_remote = observed.or(remote.last_edit_time);
                return;
            }

            match document.replace_content(&remote.content) {
                Ok(()) => {
                    document.take_changed();
                    let loaded = [state.loaded_remote_at, observed, remote.last_edit_time]
                        .into_iter()
                        .flatten()
                        .reduce(Timestamp::max);
                    state.loaded_remote_at = loaded;
                    state.dirty = false;
                    state.pending_remote = None;
                    state.last_error = None;
                    self.shared.set_status(&mut state, SaveStatus::Saved);
                    self.shared.emit(SyncEvent::RemoteReplaced {
                        remote: remote.last_edit_time.or(observed),
                    });
                    log::info!("Replaced {} with the remote version", self.document);
                    Ok(())
                }
                Err(error) => {
                    log::error!(
                        "Remote content of {} is unreadable, keeping local state: {error}",
                        self.document
                    );
                    // Do not refetch the same broken version on every poll.
                    state.loaded_remote_at = [state.loaded_remote_at, observed]
                        .into_iter()
                        .flatten()
                        .reduce(Timestamp::max);
                    state.pending_remote = None;
                    self.shared.emit(SyncEvent::ReplaceFailed {
                        error: error.clone(),
                    });
                    Err(error)
                }
            }
        };

        if forced {
            if applied.is_ok() {
                self.deadline = None;
            }
            self.finish_reload(applied);
        }
    }

    fn finish_reload(&mut self, result: SyncResult<()>) {
        self.reload_pending = false;
        for waiter in self.reload_waiters.drain(..) {
            let _ = waiter.send(result.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::sync::ManualClock;
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct Note {
        text: String,
        changed: bool,
        busy: bool,
    }

    impl Note {
        fn set(&mut self, text: &str) {
            self.text = text.to_string();
            self.changed = true;
        }
    }

    impl SyncDocument for Note {
        fn serialize_content(&self) -> SyncResult<String> {
            Ok(self.text.clone())
        }

        fn replace_content(&mut self, content: &str) -> SyncResult<()> {
            if content.starts_with('!') {
                return Err(SyncError::SerializationFailure("unreadable note".into()));
            }
            self.text = content.to_string();
            Ok(())
        }

        fn take_changed(&mut self) -> bool {
            std::mem::take(&mut self.changed)
        }

        fn is_interaction_active(&self) -> bool {
            self.busy
        }
    }

    struct Fixture {
        clock: Arc<ManualClock>,
        backend: Arc<MemoryBackend>,
        doc: DocumentRef,
    }

    impl Fixture {
        fn new() -> Self {
            let clock = Arc::new(ManualClock::new(Timestamp::from_secs(1000.0)));
            let backend = Arc::new(MemoryBackend::with_clock(clock.clone()));
            let doc = DocumentRef::page(1);
            backend.insert(doc, "hello", Timestamp::from_secs(900.0));
            Self {
                clock,
                backend,
                doc,
            }
        }

        async fn open(&self) -> SyncSession<Note, MemoryBackend> {
            SyncSession::open_with_clock(
                self.backend.clone(),
                self.doc,
                Note::default(),
                SyncConfig::default(),
                self.clock.clone(),
            )
            .await
            .unwrap()
        }

        fn remote_edit(&self, text: &str) {
            self.clock.advance(Duration::from_secs(1));
            self.backend.simulate_remote_edit(self.doc, text);
        }
    }

    async fn sleep_ms(ms: u64) {
        time::sleep(Duration::from_millis(ms)).await;
    }

    fn text(session: &SyncSession<Note, MemoryBackend>) -> String {
        session.with_document(|note| note.text.clone())
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_loads_remote_content() {
        let fx = Fixture::new();
        let session = fx.open().await;
        assert_eq!(text(&session), "hello");
        assert_eq!(session.status(), SaveStatus::Saved);
        assert!(!session.is_dirty());
        assert_eq!(fx.backend.fetch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_rejects_unreadable_content() {
        let fx = Fixture::new();
        fx.backend.insert(fx.doc, "!garbage", Timestamp::EPOCH);
        let result = SyncSession::open(
            fx.backend.clone(),
            fx.doc,
            Note::default(),
            SyncConfig::default(),
        )
        .await;
        assert!(matches!(result, Err(SyncError::SerializationFailure(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_missing_document() {
        let fx = Fixture::new();
        let result = SyncSession::open(
            fx.backend.clone(),
            DocumentRef::page(404),
            Note::default(),
            SyncConfig::default(),
        )
        .await;
        assert!(matches!(result, Err(SyncError::NotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_coalesces_rapid_edits() {
        let fx = Fixture::new();
        let session = fx.open().await;

        session.update(|n| n.set("a"));
        assert_eq!(session.status(), SaveStatus::Pending);
        sleep_ms(200).await;
        session.update(|n| n.set("ab"));
        sleep_ms(200).await;
        session.update(|n| n.set("abc"));
        sleep_ms(200).await;
        assert_eq!(fx.backend.persist_count(), 0);

        sleep_ms(400).await;
        assert_eq!(fx.backend.persist_count(), 1);
        assert_eq!(fx.backend.content(fx.doc).as_deref(), Some("abc"));
        assert_eq!(session.status(), SaveStatus::Saved);
        assert_eq!(session.saved_at(), Some(Timestamp::from_secs(1000.0)));
        assert!(!session.is_dirty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_model_does_not_save() {
        let fx = Fixture::new();
        let session = fx.open().await;
        session.update(|n| n.busy = false);
        sleep_ms(2000).await;
        assert_eq!(fx.backend.persist_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_equal_timestamp_does_not_refetch() {
        let fx = Fixture::new();
        let mut session = fx.open().await;

        session.update(|n| n.set("mine"));
        sleep_ms(600).await;
        assert_eq!(fx.backend.updated_at(fx.doc), session.saved_at());

        // Poll reports exactly our own save time.
        sleep_ms(1000).await;
        assert!(fx.backend.poll_count() >= 1);
        assert_eq!(fx.backend.fetch_count(), 1);

        fx.remote_edit("theirs");
        sleep_ms(1000).await;
        assert_eq!(fx.backend.fetch_count(), 2);
        assert_eq!(text(&session), "theirs");
        assert!(
            session
                .poll_events()
                .iter()
                .any(|e| matches!(e, SyncEvent::RemoteReplaced { .. }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_autosave_defers_refetch() {
        let fx = Fixture::new();
        let mut session = fx.open().await;

        sleep_ms(900).await;
        session.update(|n| n.set("mine"));
        fx.remote_edit("theirs");

        // Poll at 1000ms sees the newer remote while the debounce is pending.
        sleep_ms(200).await;
        assert_eq!(fx.backend.fetch_count(), 1);
        assert_eq!(text(&session), "mine");
        assert!(
            session
                .poll_events()
                .iter()
                .any(|e| matches!(e, SyncEvent::RefetchDeferred { .. }))
        );

        // The save lands, then the deferred check runs against the new baseline.
        sleep_ms(500).await;
        assert_eq!(fx.backend.persist_count(), 1);
        assert_eq!(fx.backend.fetch_count(), 1);
        assert_eq!(fx.backend.content(fx.doc).as_deref(), Some("mine"));
        assert_eq!(text(&session), "mine");
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_save_suppresses_replace() {
        let fx = Fixture::new();
        let session = fx.open().await;
        fx.backend.hold_saves();

        session.update(|n| n.set("mine"));
        sleep_ms(600).await;
        assert_eq!(fx.backend.persist_count(), 1);
        assert_eq!(session.status(), SaveStatus::Saving);

        fx.remote_edit("theirs");
        sleep_ms(2000).await;
        assert_eq!(fx.backend.fetch_count(), 1);
        assert_eq!(text(&session), "mine");

        fx.backend.release_saves();
        sleep_ms(50).await;
        assert_eq!(session.status(), SaveStatus::Saved);
        assert_eq!(fx.backend.content(fx.doc).as_deref(), Some("mine"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_interaction_defers_refetch() {
        let fx = Fixture::new();
        let session = fx.open().await;

        session.update(|n| n.busy = true);
        fx.remote_edit("theirs");
        sleep_ms(1100).await;
        assert_eq!(text(&session), "hello");
        assert_eq!(fx.backend.fetch_count(), 1);

        session.update(|n| n.busy = false);
        sleep_ms(1000).await;
        assert_eq!(text(&session), "theirs");
        assert_eq!(fx.backend.persist_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_save_waits_for_next_edit() {
        let fx = Fixture::new();
        let mut session = fx.open().await;
        fx.backend
            .fail_next_persist(SyncError::NetworkFailure("offline".into()));

        session.update(|n| n.set("a"));
        sleep_ms(600).await;
        assert_eq!(session.status(), SaveStatus::Unsaved);
        assert!(session.is_dirty());
        assert!(matches!(
            session.last_error(),
            Some(SyncError::NetworkFailure(_))
        ));
        assert!(
            session
                .poll_events()
                .iter()
                .any(|e| matches!(e, SyncEvent::SaveFailed { .. }))
        );

        sleep_ms(3000).await;
        assert_eq!(fx.backend.persist_count(), 1);

        session.update(|n| n.set("ab"));
        sleep_ms(600).await;
        assert_eq!(fx.backend.persist_count(), 2);
        assert_eq!(session.status(), SaveStatus::Saved);
        assert_eq!(fx.backend.content(fx.doc).as_deref(), Some("ab"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsaved_edit_is_not_replaced_by_newer_remote() {
        let fx = Fixture::new();
        let mut session = fx.open().await;
        fx.backend
            .fail_next_persist(SyncError::NetworkFailure("offline".into()));

        session.update(|n| n.set("mine"));
        sleep_ms(600).await;
        assert_eq!(session.status(), SaveStatus::Unsaved);

        fx.remote_edit("theirs");
        sleep_ms(3000).await;
        assert!(fx.backend.poll_count() >= 2);
        assert_eq!(fx.backend.fetch_count(), 1);
        assert_eq!(text(&session), "mine");
        assert!(session.is_dirty());
        let events = session.poll_events();
        assert!(
            events
                .iter()
                .any(|e| matches!(e, SyncEvent::RefetchDeferred { .. }))
        );
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, SyncEvent::RemoteReplaced { .. }))
        );

        // The retried save carries the local text over the remote one.
        session.update(|n| n.set("mine!"));
        sleep_ms(600).await;
        assert_eq!(session.status(), SaveStatus::Saved);
        assert_eq!(fx.backend.content(fx.doc).as_deref(), Some("mine!"));
        assert_eq!(text(&session), "mine!");
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_saves_immediately() {
        let fx = Fixture::new();
        let session = fx.open().await;

        session.update(|n| n.set("now"));
        session.flush().await.unwrap();
        assert_eq!(fx.backend.persist_count(), 1);
        assert_eq!(fx.backend.content(fx.doc).as_deref(), Some("now"));

        sleep_ms(600).await;
        assert_eq!(fx.backend.persist_count(), 1);

        // Nothing dirty: flush resolves without a request.
        session.flush().await.unwrap();
        assert_eq!(fx.backend.persist_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_wins_over_in_flight_save() {
        let fx = Fixture::new();
        let mut session = fx.open().await;
        fx.backend.hold_saves();

        session.update(|n| n.set("mine"));
        sleep_ms(600).await;
        assert_eq!(session.status(), SaveStatus::Saving);

        fx.remote_edit("theirs");
        session.reload().await.unwrap();
        assert_eq!(text(&session), "theirs");

        // The held save completes late and is dropped locally.
        fx.clock.advance(Duration::from_secs(1));
        fx.backend.release_saves();
        sleep_ms(50).await;
        let events = session.poll_events();
        assert!(events.iter().any(|e| matches!(
            e,
            SyncEvent::StaleWriteDropped {
                error: SyncError::StaleWriteRace(_)
            }
        )));
        assert_eq!(session.saved_at(), None);

        // The server kept the late write, and the next poll converges on it.
        sleep_ms(1000).await;
        assert_eq!(text(&session), "mine");
        assert_eq!(fx.backend.content(fx.doc).as_deref(), Some("mine"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_remote_keeps_local_state() {
        let fx = Fixture::new();
        let mut session = fx.open().await;

        fx.remote_edit("!broken");
        sleep_ms(1100).await;
        assert_eq!(text(&session), "hello");
        assert!(
            session
                .poll_events()
                .iter()
                .any(|e| matches!(e, SyncEvent::ReplaceFailed { .. }))
        );

        sleep_ms(2000).await;
        assert_eq!(fx.backend.fetch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_stops_timers() {
        let fx = Fixture::new();
        let mut session = fx.open().await;

        session.update(|n| n.set("unsaved"));
        session.dispose();
        assert!(session.is_disposed());

        sleep_ms(3000).await;
        assert_eq!(fx.backend.persist_count(), 0);
        assert_eq!(fx.backend.poll_count(), 0);
        assert_eq!(session.flush().await, Err(SyncError::Disposed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_timers() {
        let fx = Fixture::new();
        {
            let session = fx.open().await;
            session.update(|n| n.set("unsaved"));
        }
        sleep_ms(3000).await;
        assert_eq!(fx.backend.persist_count(), 0);
        assert_eq!(fx.backend.poll_count(), 0);
    }
}
