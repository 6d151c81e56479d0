use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::config::AppConfig;
use crate::services::notify::Notifier;
use crate::services::transcribe::Transcriber;

/// Idle per-user locks are evicted once the map reaches this size.
const MAX_SESSION_LOCKS: usize = 1024;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub notifier: Arc<dyn Notifier>,
    pub transcriber: Box<dyn Transcriber>,
    /// Per-user locks so events for one user are processed in order.
    session_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl AppState {
    pub fn new(
        db: Connection,
        config: AppConfig,
        notifier: Arc<dyn Notifier>,
        transcriber: Box<dyn Transcriber>,
    ) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            config,
            notifier,
            transcriber,
            session_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn session_lock(&self, external_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.session_locks.lock().unwrap_or_else(|e| e.into_inner());
        // In-flight requests hold a clone of their entry, so retaining on
        // the strong count only drops locks nobody is waiting on.
        if locks.len() >= MAX_SESSION_LOCKS {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        locks
            .entry(external_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::config::{AppConfig, ContactCard, PriceList};

    struct NullNotifier;

    #[async_trait]
    impl Notifier for NullNotifier {
        async fn notify(&self, _message: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct NullTranscriber;

    #[async_trait]
    impl Transcriber for NullTranscriber {
        async fn transcribe(&self, _audio_url: &str) -> anyhow::Result<String> {
            Ok(String::new())
        }
    }

    fn test_state() -> AppState {
        let config = AppConfig {
            port: 0,
            database_url: ":memory:".to_string(),
            business_start_hour: 8,
            business_end_hour: 17,
            utc_offset_minutes: 0,
            timezone: "America/Caracas".to_string(),
            prices: PriceList {
                persona_natural: "25 USD".to_string(),
                persona_juridica: "35 USD".to_string(),
                renovacion: "20 USD".to_string(),
                token: "45 USD".to_string(),
                empresarial: "consultar".to_string(),
            },
            contact: ContactCard {
                phone: String::new(),
                email: String::new(),
                address: String::new(),
                website: String::new(),
            },
            notify_url: String::new(),
            transcriber_url: String::new(),
        };
        AppState::new(
            Connection::open_in_memory().unwrap(),
            config,
            Arc::new(NullNotifier),
            Box::new(NullTranscriber),
        )
    }

    #[test]
    fn test_session_lock_is_stable_per_user() {
        let state = test_state();
        let a = state.session_lock("tg:1");
        let b = state.session_lock("tg:1");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_session_lock_map_evicts_idle_entries() {
        let state = test_state();
        let held = state.session_lock("tg:keep");
        let _guard = held.try_lock().unwrap();

        for i in 0..MAX_SESSION_LOCKS * 2 {
            state.session_lock(&format!("tg:{i}"));
        }

        let locks = state.session_locks.lock().unwrap();
        assert!(locks.len() <= MAX_SESSION_LOCKS + 1);
        // A lock someone still holds survives eviction
        assert!(locks.contains_key("tg:keep"));
    }
}
