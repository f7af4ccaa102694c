//! Read-only preference capability injected into a session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub trait Preferences: Send + Sync {
    fn auto_save_enabled(&self) -> bool;
}

impl Preferences for core_config::Config {
    fn auto_save_enabled(&self) -> bool {
        self.auto_save()
    }
}

impl<P: Preferences + ?Sized> Preferences for Arc<P> {
    fn auto_save_enabled(&self) -> bool {
        (**self).auto_save_enabled()
    }
}

/// Fixed preferences that can be flipped at runtime (tests, CLI flags).
#[derive(Debug, Default)]
pub struct StaticPreferences {
    auto_save: AtomicBool,
}

impl StaticPreferences {
    pub fn new(auto_save: bool) -> Self {
        Self {
            auto_save: AtomicBool::new(auto_save),
        }
    }

    pub fn set_auto_save(&self, enabled: bool) {
        self.auto_save.store(enabled, Ordering::Relaxed);
    }
}

impl Preferences for StaticPreferences {
    fn auto_save_enabled(&self) -> bool {
        self.auto_save.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_preference_reads_session_table() {
        let mut cfg = core_config::Config::default();
        assert!(!cfg.auto_save_enabled());
        cfg.file.session.auto_save = true;
        assert!(cfg.auto_save_enabled());
    }

    #[test]
    fn static_preference_can_flip() {
        let prefs = Arc::new(StaticPreferences::new(false));
        let shared: Arc<dyn Preferences> = prefs.clone();
        assert!(!shared.auto_save_enabled());
        prefs.set_auto_save(true);
        assert!(shared.auto_save_enabled());
    }
}
