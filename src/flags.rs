use std::sync::atomic::{AtomicBool, Ordering};

/// Switches admins can flip at runtime without a restart.
#[derive(Debug, Default)]
pub struct RuntimeFlags {
    /// Enforce per-user remaining counts at admission.
    limiter: AtomicBool,
    /// Answer with the cheaper downgrade model.
    downgrade: AtomicBool,
}

impl RuntimeFlags {
    pub fn new(limiter: bool) -> Self {
        Self {
            limiter: AtomicBool::new(limiter),
            downgrade: AtomicBool::new(false),
        }
    }

    pub fn limiter_enabled(&self) -> bool {
        self.limiter.load(Ordering::SeqCst)
    }

    pub fn set_limiter(&self, enabled: bool) {
        self.limiter.store(enabled, Ordering::SeqCst);
    }

    pub fn downgraded(&self) -> bool {
        self.downgrade.load(Ordering::SeqCst)
    }

    /// Flip downgrade mode and return the new value.
    pub fn toggle_downgrade(&self) -> bool {
        !self.downgrade.fetch_xor(true, Ordering::SeqCst)
    }
}
