//! Cooperative interrupt flag shared between a signal handler and runs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable flag raised by an external interrupt
///
/// Runs poll it between episodes; nothing is preempted.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
}

impl Interrupt {
    /// Create a lowered flag
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether the flag has been raised
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Fail with [`crate::RLError::Interrupted`] once the flag is raised
    pub fn check(&self) -> crate::Result<()> {
        if self.is_triggered() {
            Err(crate::RLError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Raise the flag when the process receives Ctrl-C
    ///
    /// Must be called from within a tokio runtime.
    pub fn install_ctrl_c(&self) {
        let interrupt = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, finishing at the next episode boundary");
                interrupt.trigger();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let interrupt = Interrupt::new();
        let observer = interrupt.clone();
        assert!(observer.check().is_ok());
        interrupt.trigger();
        assert!(observer.is_triggered());
        assert!(matches!(observer.check(), Err(crate::RLError::Interrupted)));
    }
}
