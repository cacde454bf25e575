// Shader hot-reload: watch the shader directory for recompiled SPIR-V

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::mpsc::{channel, Receiver, TryRecvError};

pub struct ShaderWatcher {
    // Kept alive for as long as events should be delivered
    _watcher: RecommendedWatcher,
    events: Receiver<notify::Result<Event>>,
}

impl ShaderWatcher {
    pub fn new(dir: &Path) -> Result<Self> {
        let (tx, events) = channel();

        let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| {
            // Receiver gone means the app is shutting down
            let _ = tx.send(event);
        })
        .context("Failed to create shader watcher")?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch shader directory {:?}", dir))?;

        log::info!("Watching {:?} for shader changes", dir);

        Ok(Self {
            _watcher: watcher,
            events,
        })
    }

    /// Drain pending events; true if any compiled shader changed
    pub fn poll(&self) -> bool {
        let mut changed = false;
        loop {
            match self.events.try_recv() {
                Ok(Ok(event)) => changed |= is_shader_change(&event),
                Ok(Err(e)) => log::warn!("Shader watcher error: {}", e),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        changed
    }
}

/// Created or modified `.spv` files count as a change
pub fn is_shader_change(event: &Event) -> bool {
    let relevant_kind = matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_));
    relevant_kind
        && event
            .paths
            .iter()
            .any(|p| p.extension().is_some_and(|ext| ext == "spv"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind};
    use std::path::PathBuf;

    #[test]
    fn modified_spirv_is_a_change() {
        let event = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("shaders/simple_shader.vert.spv"));
        assert!(is_shader_change(&event));
    }

    #[test]
    fn created_spirv_is_a_change() {
        let event = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("shaders/simple_shader.frag.spv"));
        assert!(is_shader_change(&event));
    }

    #[test]
    fn glsl_sources_are_ignored() {
        let event = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("shaders/simple_shader.vert"));
        assert!(!is_shader_change(&event));
    }

    #[test]
    fn removals_are_ignored() {
        let event = Event::new(EventKind::Remove(RemoveKind::File))
            .add_path(PathBuf::from("shaders/simple_shader.vert.spv"));
        assert!(!is_shader_change(&event));
    }

    #[test]
    fn watching_a_missing_directory_fails() {
        let dir = tempfile::tempdir().expect("temp dir");
        assert!(ShaderWatcher::new(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn fresh_watcher_reports_nothing() {
        let dir = tempfile::tempdir().expect("temp dir");
        let watcher = ShaderWatcher::new(dir.path()).unwrap();
        assert!(!watcher.poll());
    }
}
