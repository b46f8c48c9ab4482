//! Wave-scoped arena for transient native-like objects.
//!
//! Chemistry engines allocate objects whose lifetime must not exceed the
//! unit of work that created them. The arena groups such objects into
//! *waves*: a task opens a wave, registers every transient object it
//! creates, and the whole wave is released together when the task finishes,
//! on every exit path. A long-running task may open a sub-wave for an inner
//! loop (one per secondary-stream pass in matrix mode) and close it early,
//! bounding peak memory to one pass's worth of allocations.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Identifier of one arena wave.
pub type WaveId = u64;

/// Tracks transient objects per wave and releases each wave atomically.
pub struct ObjectArena {
    waves: Mutex<HashMap<WaveId, Vec<Box<dyn Any + Send>>>>,
    next_wave: AtomicU64,
}

impl ObjectArena {
    pub fn new() -> Self {
        ObjectArena { waves: Mutex::new(HashMap::new()), next_wave: AtomicU64::new(0) }
    }

    /// Opens a new wave and returns its id.
    pub fn open_wave(&self) -> WaveId {
        let wave = self.next_wave.fetch_add(1, Ordering::Relaxed) + 1;
        self.waves.lock().unwrap().insert(wave, Vec::new());
        log::debug!("opened wave {}", wave);
        wave
    }

    /// Registers an object under a wave. Registering against a wave that
    /// was already closed drops the object immediately instead of
    /// resurrecting the wave.
    pub fn track(&self, wave: WaveId, obj: Box<dyn Any + Send>) {
        let mut waves = self.waves.lock().unwrap();
        match waves.get_mut(&wave) {
            Some(objects) => objects.push(obj),
            None => log::debug!("dropping object registered against closed wave {}", wave),
        }
    }

    /// Releases every object registered under the wave. Idempotent: closing
    /// an unknown or already-closed wave is a no-op.
    pub fn close_wave(&self, wave: WaveId) {
        let objects = self.waves.lock().unwrap().remove(&wave);
        if let Some(objects) = objects {
            log::debug!("closing wave {} ({} object(s))", wave, objects.len());
            drop(objects);
        }
    }

    /// Number of waves currently open.
    pub fn open_wave_count(&self) -> usize {
        self.waves.lock().unwrap().len()
    }

    /// Force-closes every open wave, returning how many were still open.
    /// Used at run teardown so aborted tasks cannot leak objects.
    pub fn close_all(&self) -> usize {
        let mut waves = self.waves.lock().unwrap();
        let open = waves.len();
        waves.clear();
        open
    }
}

impl Default for ObjectArena {
    fn default() -> Self {
        ObjectArena::new()
    }
}

/// RAII handle that closes its wave on drop, so cleanup runs on every exit
/// path including panics.
pub struct WaveGuard<'a> {
    arena: &'a ObjectArena,
    wave: WaveId,
}

impl<'a> WaveGuard<'a> {
    /// Opens a new wave on the arena.
    pub fn open(arena: &'a ObjectArena) -> Self {
        let wave = arena.open_wave();
        WaveGuard { arena, wave }
    }

    pub fn id(&self) -> WaveId {
        self.wave
    }

    /// Registers an object under this guard's wave.
    pub fn track(&self, obj: Box<dyn Any + Send>) {
        self.arena.track(self.wave, obj);
    }
}

impl Drop for WaveGuard<'_> {
    fn drop(&mut self) {
        self.arena.close_wave(self.wave);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_close_wave_releases_objects() {
        let arena = ObjectArena::new();
        let sentinel = Arc::new(());

        let wave = arena.open_wave();
        arena.track(wave, Box::new(Arc::clone(&sentinel)));
        assert_eq!(Arc::strong_count(&sentinel), 2);

        arena.close_wave(wave);
        assert_eq!(Arc::strong_count(&sentinel), 1);
        assert_eq!(arena.open_wave_count(), 0);
    }

    #[test]
    fn test_close_wave_is_idempotent() {
        let arena = ObjectArena::new();
        let wave = arena.open_wave();
        arena.close_wave(wave);
        arena.close_wave(wave);
        assert_eq!(arena.open_wave_count(), 0);
    }

    #[test]
    fn test_track_after_close_drops_immediately() {
        let arena = ObjectArena::new();
        let sentinel = Arc::new(());

        let wave = arena.open_wave();
        arena.close_wave(wave);
        arena.track(wave, Box::new(Arc::clone(&sentinel)));
        assert_eq!(Arc::strong_count(&sentinel), 1);
    }

    #[test]
    fn test_guard_closes_on_drop() {
        let arena = ObjectArena::new();
        {
            let guard = WaveGuard::open(&arena);
            guard.track(Box::new(42u32));
            assert_eq!(arena.open_wave_count(), 1);
        }
        assert_eq!(arena.open_wave_count(), 0);
    }

    #[test]
    fn test_guard_closes_during_panic_unwind() {
        let arena = ObjectArena::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = WaveGuard::open(&arena);
            panic!("task failed");
        }));
        assert!(result.is_err());
        assert_eq!(arena.open_wave_count(), 0);
    }

    #[test]
    fn test_nested_waves_close_independently() {
        let arena = ObjectArena::new();
        let outer = WaveGuard::open(&arena);
        {
            let inner = WaveGuard::open(&arena);
            inner.track(Box::new("pass"));
            assert_eq!(arena.open_wave_count(), 2);
        }
        assert_eq!(arena.open_wave_count(), 1);
        outer.track(Box::new("task"));
        drop(outer);
        assert_eq!(arena.open_wave_count(), 0);
    }

    #[test]
    fn test_close_all_reports_open_waves() {
        let arena = ObjectArena::new();
        arena.open_wave();
        arena.open_wave();
        assert_eq!(arena.close_all(), 2);
        assert_eq!(arena.open_wave_count(), 0);
    }
}
