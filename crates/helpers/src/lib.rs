//! Small utilities shared by every crate in the workspace: hashers, a fluent
//! `config` builder, and hex/timing helpers ported from jogasaki's
//! `utils/hex.h` and `utils/watch.h`.

use std::hash::BuildHasherDefault;
use std::time::{Duration, Instant};

/// Hash map keyed with `ahash`, matching the hasher every variable table and
/// step-state table in this workspace uses for predictable, fast lookups.
pub type IndexMap<K, V> = indexmap::IndexMap<K, V, BuildHasherDefault<ahash::AHasher>>;
pub type IndexSet<V> = indexmap::IndexSet<V, BuildHasherDefault<ahash::AHasher>>;

/// Abort the process with a logged message. Reserved for the fatal class of
/// §7 (arena exhaustion, unknown wire tags, invariant violations) — never
/// use this for a recoverable SQL- or CC-level error, those travel through
/// `ErrorInfo` instead.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {{
        log::error!("fatal: {}", format!($($arg)*));
        std::process::abort();
    }};
}

/// Fluent builder helper: `Thing::default().config(|t| t.field = x)`.
pub trait Config: Sized {
    fn config(mut self, f: impl FnOnce(&mut Self)) -> Self {
        f(&mut self);
        self
    }
}

impl<T> Config for T {}

/// Render bytes as lowercase hex, ported from `jogasaki::utils::hex`.
pub fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// Stopwatch used by diagnostics call sites (job timing, durability waits),
/// ported from `jogasaki::utils::watch`.
#[derive(Debug, Clone, Copy)]
pub struct Watch {
    start: Instant,
}

impl Default for Watch {
    fn default() -> Self {
        Self::new()
    }
}

impl Watch {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn reset(&mut self) {
        self.start = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_formats_lowercase() {
        assert_eq!(hex(&[0x0a, 0xff, 0x01]), "0aff01");
    }

    #[test]
    fn config_applies_closure() {
        #[derive(Default)]
        struct Foo {
            x: i32,
        }
        let foo = Foo::default().config(|f| f.x = 42);
        assert_eq!(foo.x, 42);
    }

    #[test]
    fn watch_measures_nonzero_after_reset() {
        let mut w = Watch::new();
        std::thread::sleep(Duration::from_millis(1));
        let first = w.elapsed();
        w.reset();
        assert!(first >= Duration::from_millis(1));
        assert!(w.elapsed() < first);
    }
}
