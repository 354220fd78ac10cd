//! Directory watcher over the working-copy root.
//!
//! Raw notify events are normalized into [`WatchEvent`]s and handed to a
//! [`WatchListener`] strictly in arrival order, one at a time, on a dedicated
//! thread. Listener failures and panics are logged and never stop the loop.

use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use notify::event::{ModifyKind, RenameMode};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};

use crate::error::{io_err, RuntimeError};

/// Receives lifecycle events for files below the watched root.
pub trait WatchListener: Send + Sync + 'static {
    fn file_added(&self, path: &Path) -> Result<(), RuntimeError>;

    /// A changed file is handled exactly like a new one unless overridden.
    fn file_changed(&self, path: &Path) -> Result<(), RuntimeError> {
        self.file_added(path)
    }

    fn file_removed(&self, path: &Path) -> Result<(), RuntimeError>;
}

/// Normalized lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Deleted(PathBuf),
}

impl WatchEvent {
    pub fn path(&self) -> &Path {
        match self {
            WatchEvent::Created(path) | WatchEvent::Modified(path) | WatchEvent::Deleted(path) => {
                path
            }
        }
    }
}

/// Map one raw notify event to lifecycle events below `root`.
///
/// Metadata-only and access events, modifications of directories, anything
/// outside `root` and anything inside `.git` are dropped. A created
/// directory is kept so its contents can be loaded. Renames become a delete
/// of the old path followed by a create of the new one.
pub fn normalize(event: &Event, root: &Path) -> Vec<WatchEvent> {
    let mut out = Vec::new();
    match &event.kind {
        EventKind::Create(_) => {
            out.extend(event.paths.iter().cloned().map(WatchEvent::Created));
        }
        EventKind::Remove(_) => {
            out.extend(event.paths.iter().cloned().map(WatchEvent::Deleted));
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => {}
        EventKind::Modify(ModifyKind::Name(mode)) => match (mode, event.paths.as_slice()) {
            (RenameMode::From, paths) => {
                out.extend(paths.iter().cloned().map(WatchEvent::Deleted));
            }
            (RenameMode::To, paths) => {
                out.extend(paths.iter().cloned().map(WatchEvent::Created));
            }
            (RenameMode::Both, [from, to]) => {
                out.push(WatchEvent::Deleted(from.clone()));
                out.push(WatchEvent::Created(to.clone()));
            }
            (_, paths) => {
                for path in paths {
                    if path.exists() {
                        out.push(WatchEvent::Created(path.clone()));
                    } else {
                        out.push(WatchEvent::Deleted(path.clone()));
                    }
                }
            }
        },
        EventKind::Modify(_) => {
            out.extend(event.paths.iter().cloned().map(WatchEvent::Modified));
        }
        EventKind::Access(_) | EventKind::Any | EventKind::Other => {}
    }

    out.retain(|ev| {
        let path = ev.path();
        let Ok(relative) = path.strip_prefix(root) else {
            return false;
        };
        if relative.as_os_str().is_empty() || is_git_internal(relative) {
            return false;
        }
        !(matches!(ev, WatchEvent::Modified(_)) && path.is_dir())
    });
    out
}

fn is_git_internal(relative: &Path) -> bool {
    relative
        .components()
        .any(|c| matches!(c, Component::Normal(name) if name == ".git"))
}

// ---------------------------------------------------------------------------
// Watcher
// ---------------------------------------------------------------------------

/// Not yet started watcher over `root`.
pub struct DirectoryWatcher<L> {
    root: PathBuf,
    listener: Arc<L>,
}

impl<L: WatchListener> DirectoryWatcher<L> {
    pub fn new(root: impl Into<PathBuf>, listener: Arc<L>) -> Self {
        Self {
            root: root.into(),
            listener,
        }
    }

    /// Register the watch and spawn the event thread.
    pub fn start(self) -> Result<WatcherHandle, RuntimeError> {
        // `normalize` prefix-checks against real paths (/private/var/... on macOS).
        let root = fs::canonicalize(&self.root).map_err(|e| io_err(&self.root, e))?;

        let (event_tx, event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
            let _ = event_tx.send(event);
        })?;
        watcher.watch(&root, RecursiveMode::Recursive)?;

        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
        let running = Arc::new(AtomicBool::new(true));
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| io_err("tokio-runtime", e))?;

        let thread = {
            let running = Arc::clone(&running);
            let listener = self.listener;
            let root = root.clone();
            thread::Builder::new()
                .name("algorepo-watcher".to_string())
                .spawn(move || {
                    // The notify handle lives as long as the loop.
                    let _watcher = watcher;
                    runtime.block_on(run_event_loop(&root, &*listener, event_rx, shutdown_rx));
                    running.store(false, Ordering::SeqCst);
                    tracing::info!(root = %root.display(), "directory watcher stopped");
                })
                .map_err(|e| io_err("algorepo-watcher thread", e))?
        };

        tracing::info!(root = %root.display(), "directory watcher started");
        Ok(WatcherHandle {
            root,
            shutdown: shutdown_tx,
            running,
            thread: Some(thread),
        })
    }
}

/// Handle to a running watcher. Dropping it stops the watcher.
#[derive(Debug)]
pub struct WatcherHandle {
    root: PathBuf,
    shutdown: broadcast::Sender<()>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl WatcherHandle {
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `false` once the loop has exited, whether stopped or invalidated.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Signal the loop and wait for the thread. Idempotent.
    pub fn stop(&mut self) {
        let _ = self.shutdown.send(());
        let Some(thread) = self.thread.take() else {
            return;
        };
        if thread.thread().id() == thread::current().id() {
            return;
        }
        if thread.join().is_err() {
            tracing::error!(root = %self.root.display(), "directory watcher thread panicked");
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

/// Deliver events until shutdown, channel close, or the root disappears.
pub(crate) async fn run_event_loop<L: WatchListener + ?Sized>(
    root: &Path,
    listener: &L,
    mut events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    Ok(event) if event.need_rescan() => {
                        tracing::debug!("watch queue overflowed; ignoring");
                    }
                    Ok(event) => {
                        for watch_event in normalize(&event, root) {
                            dispatch(listener, &watch_event);
                        }
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                    }
                }
                if !root.is_dir() {
                    tracing::warn!(
                        root = %root.display(),
                        "watched directory is gone; stopping watcher",
                    );
                    break;
                }
            }
        }
    }
}

fn dispatch<L: WatchListener + ?Sized>(listener: &L, event: &WatchEvent) {
    tracing::debug!(event = ?event, "watch event");
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| match event {
        WatchEvent::Created(path) => listener.file_added(path),
        WatchEvent::Modified(path) => listener.file_changed(path),
        WatchEvent::Deleted(path) => listener.file_removed(path),
    }));
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            tracing::error!(file = %event.path().display(), error = %err, "watch listener failed");
        }
        Err(_) => {
            tracing::error!(file = %event.path().display(), "watch listener panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind};
    use tempfile::TempDir;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<WatchEvent>>,
        fail_on: Option<PathBuf>,
    }

    impl Recorder {
        fn seen(&self) -> Vec<WatchEvent> {
            self.seen.lock().expect("seen").clone()
        }

        fn record(&self, event: WatchEvent) -> Result<(), RuntimeError> {
            let failing = self.fail_on.as_deref() == Some(event.path());
            self.seen.lock().expect("seen").push(event);
            if failing {
                return Err(RuntimeError::Closed);
            }
            Ok(())
        }
    }

    impl WatchListener for Recorder {
        fn file_added(&self, path: &Path) -> Result<(), RuntimeError> {
            self.record(WatchEvent::Created(path.to_path_buf()))
        }

        fn file_changed(&self, path: &Path) -> Result<(), RuntimeError> {
            if path.ends_with("panic.src") {
                panic!("listener bug");
            }
            self.record(WatchEvent::Modified(path.to_path_buf()))
        }

        fn file_removed(&self, path: &Path) -> Result<(), RuntimeError> {
            self.record(WatchEvent::Deleted(path.to_path_buf()))
        }
    }

    fn event(kind: EventKind, paths: &[&Path]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |ev, path| ev.add_path(path.to_path_buf()))
    }

    // -----------------------------------------------------------------------
    // normalize
    // -----------------------------------------------------------------------

    #[test]
    fn normalize_maps_kinds() {
        let root = Path::new("/wc");
        let file = root.join("a.src");

        assert_eq!(
            normalize(&event(EventKind::Create(CreateKind::File), &[&file]), root),
            vec![WatchEvent::Created(file.clone())]
        );
        assert_eq!(
            normalize(
                &event(EventKind::Modify(ModifyKind::Data(DataChange::Content)), &[&file]),
                root
            ),
            vec![WatchEvent::Modified(file.clone())]
        );
        assert_eq!(
            normalize(&event(EventKind::Remove(RemoveKind::File), &[&file]), root),
            vec![WatchEvent::Deleted(file.clone())]
        );
        assert!(normalize(
            &event(EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any)), &[&file]),
            root
        )
        .is_empty());
    }

    #[test]
    fn normalize_splits_renames() {
        let root = Path::new("/wc");
        let from = root.join("old.src");
        let to = root.join("new.src");
        let ev = event(EventKind::Modify(ModifyKind::Name(RenameMode::Both)), &[&from, &to]);
        assert_eq!(
            normalize(&ev, root),
            vec![WatchEvent::Deleted(from), WatchEvent::Created(to)]
        );
    }

    #[test]
    fn normalize_keeps_created_directories_only() {
        let dir = TempDir::new().expect("tempdir");
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).expect("mkdir");

        assert_eq!(
            normalize(&event(EventKind::Create(CreateKind::Folder), &[&sub]), dir.path()),
            vec![WatchEvent::Created(sub.clone())]
        );
        assert!(normalize(
            &event(EventKind::Modify(ModifyKind::Data(DataChange::Any)), &[&sub]),
            dir.path()
        )
        .is_empty());
        assert_eq!(
            normalize(&event(EventKind::Remove(RemoveKind::Folder), &[&sub]), dir.path()),
            vec![WatchEvent::Deleted(sub)]
        );
    }

    #[test]
    fn normalize_skips_git_and_foreign_paths() {
        let root = Path::new("/wc");
        let git = root.join(".git").join("index");
        let foreign = Path::new("/elsewhere/a.src");
        let ev = event(EventKind::Create(CreateKind::File), &[&git, foreign, root]);
        assert!(normalize(&ev, root).is_empty());
    }

    // -----------------------------------------------------------------------
    // Event loop
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn create_then_delete_is_delivered_in_order() {
        let dir = TempDir::new().expect("tempdir");
        let file = dir.path().join("a.src");
        let (tx, rx) = mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        tx.send(Ok(event(EventKind::Create(CreateKind::File), &[&file])))
            .expect("send");
        tx.send(Ok(event(EventKind::Remove(RemoveKind::File), &[&file])))
            .expect("send");
        drop(tx);

        let recorder = Recorder::default();
        run_event_loop(dir.path(), &recorder, rx, shutdown_rx).await;

        assert_eq!(
            recorder.seen(),
            vec![WatchEvent::Created(file.clone()), WatchEvent::Deleted(file)]
        );
    }

    #[tokio::test]
    async fn listener_errors_and_panics_do_not_stop_the_loop() {
        let dir = TempDir::new().expect("tempdir");
        let bad = dir.path().join("bad.src");
        let boom = dir.path().join("panic.src");
        let good = dir.path().join("good.src");
        let (tx, rx) = mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        tx.send(Ok(event(EventKind::Create(CreateKind::File), &[&bad])))
            .expect("send");
        tx.send(Ok(event(
            EventKind::Modify(ModifyKind::Data(DataChange::Any)),
            &[&boom],
        )))
        .expect("send");
        tx.send(Err(notify::Error::generic("transient"))).expect("send");
        tx.send(Ok(event(EventKind::Create(CreateKind::File), &[&good])))
            .expect("send");
        drop(tx);

        let recorder = Recorder {
            fail_on: Some(bad.clone()),
            ..Recorder::default()
        };
        run_event_loop(dir.path(), &recorder, rx, shutdown_rx).await;

        assert_eq!(
            recorder.seen(),
            vec![WatchEvent::Created(bad), WatchEvent::Created(good)]
        );
    }

    #[tokio::test]
    async fn overflow_is_ignored() {
        let dir = TempDir::new().expect("tempdir");
        let (tx, rx) = mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        tx.send(Ok(Event::new(EventKind::Other).set_flag(notify::event::Flag::Rescan)))
            .expect("send");
        drop(tx);

        let recorder = Recorder::default();
        run_event_loop(dir.path(), &recorder, rx, shutdown_rx).await;
        assert!(recorder.seen().is_empty());
    }

    #[tokio::test]
    async fn removed_root_stops_the_loop() {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path().join("wc");
        fs::create_dir(&root).expect("mkdir");
        let (tx, rx) = mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        fs::remove_dir(&root).expect("rmdir");
        tx.send(Ok(event(EventKind::Remove(RemoveKind::Folder), &[&root])))
            .expect("send");
        // Still open: only the invalidation check can end the loop.
        let _keep = tx.clone();

        let recorder = Recorder::default();
        tokio::time::timeout(
            Duration::from_secs(5),
            run_event_loop(&root, &recorder, rx, shutdown_rx),
        )
        .await
        .expect("loop exits once the root is gone");
    }

    #[tokio::test]
    async fn shutdown_wins_over_pending_events() {
        let dir = TempDir::new().expect("tempdir");
        let file = dir.path().join("a.src");
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        tx.send(Ok(event(EventKind::Create(CreateKind::File), &[&file])))
            .expect("send");
        shutdown_tx.send(()).expect("shutdown");

        let recorder = Recorder::default();
        run_event_loop(dir.path(), &recorder, rx, shutdown_rx).await;
        assert!(recorder.seen().is_empty());
        drop(tx);
    }

    // -----------------------------------------------------------------------
    // Real filesystem
    // -----------------------------------------------------------------------

    fn wait_for(recorder: &Recorder, predicate: impl Fn(&[WatchEvent]) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if predicate(&recorder.seen()) {
                return true;
            }
            thread::sleep(Duration::from_millis(50));
        }
        false
    }

    #[test]
    fn watcher_reports_real_file_lifecycle() {
        let dir = TempDir::new().expect("tempdir");
        let recorder = Arc::new(Recorder::default());
        let mut handle = DirectoryWatcher::new(dir.path(), Arc::clone(&recorder))
            .start()
            .expect("start");
        assert!(handle.is_running());

        let file = handle.root().join("a.src");
        fs::write(&file, "v1").expect("write");
        assert!(wait_for(&recorder, |seen| seen
            .iter()
            .any(|e| matches!(e, WatchEvent::Created(p) if p == &file))));

        fs::remove_file(&file).expect("remove");
        assert!(wait_for(&recorder, |seen| seen
            .iter()
            .any(|e| matches!(e, WatchEvent::Deleted(p) if p == &file))));

        let seen = recorder.seen();
        let created = seen
            .iter()
            .position(|e| matches!(e, WatchEvent::Created(p) if p == &file));
        let deleted = seen
            .iter()
            .position(|e| matches!(e, WatchEvent::Deleted(p) if p == &file));
        assert!(created < deleted, "seen: {seen:?}");

        handle.stop();
        handle.stop();
        assert!(!handle.is_running());
    }
}
