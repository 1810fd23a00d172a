// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

// crates/st-scatter/src/backend/kernel_cache.rs

//! Compile-once cache for parameterized device kernels.
//!
//! Kernel source is produced by substituting concrete values (extents,
//! downsampling factor, scalar type name) into a `${name}` template. The
//! cache guarantees that a given (kernel name, device ordinal, substituted
//! source) triple is compiled at most once per cache instance; later requests
//! are lookups. The cache is an owned object rather than process-global state
//! so tests can instantiate independent caches with a counting mock compiler,
//! and it is generic over the compiled handle type for the same reason.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;

use crate::error::{compile, other, Result};

/// Identity of one fully substituted kernel.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KernelKey {
    /// Entry-point name of the kernel.
    pub name: &'static str,
    /// Device ordinal the kernel is compiled for.
    pub device: usize,
    /// Final source text after placeholder substitution.
    pub source: String,
}

impl KernelKey {
    pub fn new(name: &'static str, device: usize, source: String) -> Self {
        Self { name, device, source }
    }
}

/// Substitute every `${name}` placeholder in `template`. A placeholder left
/// unresolved after substitution is a compile error; nothing is cached.
pub fn render_source(template: &str, params: &[(&str, String)]) -> Result<String> {
    let mut source = template.to_string();
    for (name, value) in params {
        source = source.replace(&format!("${{{name}}}"), value);
    }
    if let Some(pos) = source.find("${") {
        let tail: String = source[pos..].chars().take(24).collect();
        return Err(compile(&format!(
            "unresolved kernel template placeholder near `{tail}`"
        )));
    }
    Ok(source)
}

struct Entry<H> {
    cell: OnceCell<Arc<H>>,
}

impl<H> Default for Entry<H> {
    fn default() -> Self {
        Self { cell: OnceCell::new() }
    }
}

/// Map from [`KernelKey`] to a compiled handle with at-most-once compilation
/// per key. Readers of existing entries proceed concurrently; first-time
/// compilation of one key is serialized through the per-entry cell while
/// distinct keys compile in parallel.
pub struct KernelCache<H> {
    entries: Mutex<HashMap<KernelKey, Arc<Entry<H>>>>,
}

impl<H> KernelCache<H> {
    pub fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }

    /// Number of distinct kernels currently cached (compiled or compiling).
    pub fn len(&self) -> usize {
        self.entries.lock().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached handle. Clearing an already-empty cache is a no-op;
    /// a compilation racing with `clear` completes against its own entry and
    /// simply is not retained.
    pub fn clear(&self) {
        if let Ok(mut map) = self.entries.lock() {
            map.clear();
        }
    }

    /// Return the handle for `key`, invoking `compile_fn` on the substituted
    /// source only if this cache has never compiled that exact key before.
    /// Compilation failures propagate to the caller and are not cached, so an
    /// explicit retry is possible; they are never retried silently.
    pub fn get_or_compile<F>(&self, key: KernelKey, compile_fn: F) -> Result<Arc<H>>
    where
        F: FnOnce(&KernelKey) -> Result<H>,
    {
        let entry = {
            let mut map = self
                .entries
                .lock()
                .map_err(|_| other("kernel cache lock poisoned"))?;
            Arc::clone(map.entry(key.clone()).or_default())
        };
        let handle = entry.cell.get_or_try_init(|| {
            tracing::debug!(kernel = key.name, device = key.device, "compiling device kernel");
            compile_fn(&key).map(Arc::new)
        })?;
        Ok(Arc::clone(handle))
    }
}

impl<H> Default for KernelCache<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TEMPLATE: &str = "__global__ void fold(const ${Dtype}2* in) { /* ${B} x ${H} */ }";

    fn params(b: usize) -> Vec<(&'static str, String)> {
        vec![
            ("Dtype", "float".to_string()),
            ("B", b.to_string()),
            ("H", "8".to_string()),
        ]
    }

    #[test]
    fn substitutes_every_placeholder() {
        let source = render_source(TEMPLATE, &params(4)).unwrap();
        assert!(source.contains("float2"));
        assert!(source.contains("4 x 8"));
        assert!(!source.contains("${"));
    }

    #[test]
    fn unresolved_placeholder_is_a_compile_error() {
        let err = render_source(TEMPLATE, &[("Dtype", "float".to_string())]).unwrap_err();
        assert!(matches!(err, crate::error::Error::Compile(_)));
    }

    #[test]
    fn compiles_each_key_once() {
        let cache: KernelCache<String> = KernelCache::new();
        let compiles = AtomicUsize::new(0);

        for _ in 0..3 {
            let source = render_source(TEMPLATE, &params(4)).unwrap();
            let handle = cache
                .get_or_compile(KernelKey::new("fold", 0, source), |key| {
                    compiles.fetch_add(1, Ordering::SeqCst);
                    Ok(key.source.clone())
                })
                .unwrap();
            assert!(handle.contains("4 x 8"));
        }
        assert_eq!(compiles.load(Ordering::SeqCst), 1);

        // A different parameter set is a different key.
        let source = render_source(TEMPLATE, &params(16)).unwrap();
        cache
            .get_or_compile(KernelKey::new("fold", 0, source), |key| {
                compiles.fetch_add(1, Ordering::SeqCst);
                Ok(key.source.clone())
            })
            .unwrap();
        assert_eq!(compiles.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn concurrent_requests_share_one_compilation() {
        let cache: KernelCache<usize> = KernelCache::new();
        let compiles = AtomicUsize::new(0);
        let source = render_source(TEMPLATE, &params(4)).unwrap();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let cache = &cache;
                let compiles = &compiles;
                let source = source.clone();
                scope.spawn(move || {
                    let handle = cache
                        .get_or_compile(KernelKey::new("fold", 0, source), |_| {
                            Ok(compiles.fetch_add(1, Ordering::SeqCst))
                        })
                        .unwrap();
                    assert_eq!(*handle, 0);
                });
            }
        });
        assert_eq!(compiles.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_compilation_is_not_cached() {
        let cache: KernelCache<String> = KernelCache::new();
        let err = cache
            .get_or_compile(KernelKey::new("fold", 0, "src".to_string()), |_| {
                Err(compile("ptx rejected"))
            })
            .unwrap_err();
        assert!(matches!(err, crate::error::Error::Compile(_)));

        // An explicit retry may still succeed.
        let handle = cache
            .get_or_compile(KernelKey::new("fold", 0, "src".to_string()), |key| {
                Ok(key.source.clone())
            })
            .unwrap();
        assert_eq!(*handle, "src");
    }

    #[test]
    fn clear_releases_entries() {
        let cache: KernelCache<String> = KernelCache::new();
        cache
            .get_or_compile(KernelKey::new("fold", 0, "a".to_string()), |_| {
                Ok("h".to_string())
            })
            .unwrap();
        assert_eq!(cache.len(), 1);
        cache.clear();
        cache.clear();
        assert!(cache.is_empty());
    }
}
