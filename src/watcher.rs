//! Directory watcher: polls the input directory and hands new files to a handler.
//!
//! Detection is polling based (`notify::PollWatcher`), which also works on
//! network mounts. The handler runs synchronously on the polling thread, so
//! one file is processed at a time and no scan happens while a file is being
//! processed. Files arriving meanwhile stay on disk until the next scan; there
//! is no in-memory event queue to grow.
//!
//! There is no de-duplication here: every creation event reaches the handler.
//! Removals of matching files are passed on too, so a handler can forget
//! state it keeps per file.

use anyhow::{Context, Result};
use notify::event::{CreateKind, EventKind, RemoveKind};
use notify::{Config, Event, EventHandler, PollWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Receives newly created input files
pub trait FileArrivalHandler: Send + Sync + 'static {
    fn on_file_created(&self, path: &Path);

    /// A previously present file left the directory
    fn on_file_removed(&self, _path: &Path) {}
}

impl<T: FileArrivalHandler + ?Sized> FileArrivalHandler for Arc<T> {
    fn on_file_created(&self, path: &Path) {
        (**self).on_file_created(path)
    }

    fn on_file_removed(&self, path: &Path) {
        (**self).on_file_removed(path)
    }
}

/// Filters raw watcher events down to created files with the wanted extension
pub struct CreationFilter<H> {
    handler: H,
    extension: String,
}

impl<H: FileArrivalHandler> CreationFilter<H> {
    pub fn new(handler: H, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        Self {
            handler,
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    /// Paths of an event that should be processed
    pub fn matching_paths<'a>(&self, event: &'a Event) -> Vec<&'a Path> {
        match event.kind {
            EventKind::Create(CreateKind::Folder) => Vec::new(),
            EventKind::Create(_) => event
                .paths
                .iter()
                .map(PathBuf::as_path)
                .filter(|path| self.is_candidate(path))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Paths of an event that report a matching file as gone
    pub fn removed_paths<'a>(&self, event: &'a Event) -> Vec<&'a Path> {
        match event.kind {
            EventKind::Remove(RemoveKind::Folder) => Vec::new(),
            EventKind::Remove(_) => event
                .paths
                .iter()
                .map(PathBuf::as_path)
                .filter(|path| self.has_extension(path))
                .collect(),
            _ => Vec::new(),
        }
    }

    fn is_candidate(&self, path: &Path) -> bool {
        !path.is_dir() && self.has_extension(path)
    }

    fn has_extension(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy() == self.extension)
            .unwrap_or(false)
    }

    /// Dispatch one raw event
    pub fn dispatch(&self, event: notify::Result<Event>) {
        match event {
            Ok(event) => {
                for path in self.matching_paths(&event) {
                    debug!(path = %path.display(), "New file detected");
                    self.handler.on_file_created(path);
                }
                for path in self.removed_paths(&event) {
                    debug!(path = %path.display(), "File removed");
                    self.handler.on_file_removed(path);
                }
            }
            Err(e) => warn!(error = %e, "Directory watch error"),
        }
    }
}

impl<H: FileArrivalHandler> EventHandler for CreationFilter<H> {
    fn handle_event(&mut self, event: notify::Result<Event>) {
        self.dispatch(event);
    }
}

/// Running poll watcher over one directory (non-recursive)
pub struct DirectoryWatcher {
    watcher: PollWatcher,
    dir: PathBuf,
}

impl DirectoryWatcher {
    /// Start polling `dir` every `poll_interval`.
    ///
    /// Files already present are not reported; only files created after the
    /// initial scan are.
    pub fn start<H: FileArrivalHandler>(
        dir: &Path,
        extension: &str,
        poll_interval: Duration,
        handler: H,
    ) -> Result<Self> {
        let filter = CreationFilter::new(handler, extension);
        let config = Config::default().with_poll_interval(poll_interval);

        let mut watcher =
            PollWatcher::new(filter, config).context("Failed to create directory watcher")?;
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch directory {}", dir.display()))?;

        info!(
            dir = %dir.display(),
            extension = %extension,
            poll_interval_ms = poll_interval.as_millis() as u64,
            "File observer started"
        );

        Ok(Self {
            watcher,
            dir: dir.to_path_buf(),
        })
    }

    /// Stop polling; dropping the watcher ends its thread
    pub fn stop(mut self) {
        if let Err(e) = self.watcher.unwatch(&self.dir) {
            warn!(dir = %self.dir.display(), error = %e, "Failed to unwatch directory");
        }
        info!(dir = %self.dir.display(), "File observer stopped");
    }
}
