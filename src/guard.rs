use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Per-project "generation in progress" signal.
///
/// The flag is raised the instant a build is requested, before any network
/// round-trip, and released only when the decode loop terminates. Hydration
/// consults it synchronously and skips entirely while it is set, so a stale
/// load can never race a fresh start.
#[derive(Debug, Clone, Default)]
pub struct GenerationGuard {
    generating: Arc<AtomicBool>,
}

impl GenerationGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_generating(&self) -> bool {
        self.generating.load(Ordering::Acquire)
    }

    /// Raises the flag, returning a token that releases it on drop. Fails
    /// when a generation already holds the token.
    pub fn try_acquire(&self) -> Option<GenerationToken> {
        let acquired = self
            .generating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        acquired.then(|| GenerationToken {
            generating: Arc::clone(&self.generating),
        })
    }
}

/// Scope guard for one generation. Dropping it releases the flag on every
/// exit path, including panics unwinding through the decode loop.
#[derive(Debug)]
pub struct GenerationToken {
    generating: Arc<AtomicBool>,
}

impl Drop for GenerationToken {
    fn drop(&mut self) {
        self.generating.store(false, Ordering::Release);
    }
}
