//! Explicit run context passed to each component: the target surface, the
//! engine configuration, and the cooperative cancellation flag.

use crate::config::EngineConfig;
use crate::surface::TargetSurface;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// Cooperative cancellation flag, checked between records.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// The shared flag, for registering with signal handlers.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }
}

/// One engine run over one singly-owned target surface.
pub struct Session<'a, S: TargetSurface + ?Sized> {
    surface: &'a mut S,
    config: EngineConfig,
    cancel: CancelToken,
}

impl<'a, S: TargetSurface + ?Sized> Session<'a, S> {
    pub fn new(surface: &'a mut S, config: EngineConfig) -> Self {
        Self {
            surface,
            config,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn surface(&mut self) -> &mut S {
        &mut *self.surface
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn settle_after_write(&self) {
        settle(self.config.settle.after_write());
    }

    pub fn settle_after_dropdown(&self) {
        settle(self.config.settle.after_dropdown());
    }

    pub fn settle_between_records(&self) {
        settle(self.config.settle.between_records());
    }
}

fn settle(delay: Duration) {
    if !delay.is_zero() {
        thread::sleep(delay);
    }
}
