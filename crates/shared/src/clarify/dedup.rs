use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sha2::{Digest, Sha256};

use crate::models::DialogueKind;

/// A repeat of the same fingerprint inside this window is rejected without
/// reaching the engine.
const DUPLICATE_WINDOW: Duration = Duration::from_millis(2000);
/// Entries older than this are dropped whenever the map is touched.
const EVICT_AFTER: Duration = Duration::from_millis(5000);

/// In-process, time-windowed fingerprint cache suppressing duplicate dispatch
/// of identical concurrent requests. Suppression only holds within a single
/// running instance; scaled-out deployments need a shared cache to keep the
/// same guarantee.
#[derive(Clone, Default)]
pub struct DedupGuard {
    entries: Arc<Mutex<HashMap<String, Instant>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupDecision {
    Fresh,
    Duplicate { retry_after_ms: u64 },
}

impl DedupGuard {
    pub fn check(&self, fingerprint: &str) -> DedupDecision {
        self.check_at(fingerprint, Instant::now())
    }

    pub fn check_at(&self, fingerprint: &str, now: Instant) -> DedupDecision {
        let mut entries = self
            .entries
            .lock()
            .expect("dedup guard mutex should not be poisoned");

        entries.retain(|_, seen_at| now.saturating_duration_since(*seen_at) < EVICT_AFTER);

        if let Some(seen_at) = entries.get(fingerprint) {
            let age = now.saturating_duration_since(*seen_at);
            if age < DUPLICATE_WINDOW {
                let retry_after_ms = DUPLICATE_WINDOW
                    .saturating_sub(age)
                    .as_millis()
                    .min(u64::MAX as u128) as u64;
                return DedupDecision::Duplicate { retry_after_ms };
            }
        }

        entries.insert(fingerprint.to_string(), now);
        DedupDecision::Fresh
    }
}

/// Deterministic hash of the fields that make two dispatch requests "the same
/// question": task text, persona set (order-insensitive), dialogue kind.
pub fn request_fingerprint(task: &str, personas: &[String], dialogue_kind: DialogueKind) -> String {
    let mut sorted_personas: Vec<&str> = personas.iter().map(String::as_str).collect();
    sorted_personas.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(task.as_bytes());
    hasher.update([0x1f]);
    for persona in sorted_personas {
        hasher.update(persona.as_bytes());
        hasher.update([0x1f]);
    }
    hasher.update(dialogue_kind.as_str().as_bytes());

    URL_SAFE_NO_PAD.encode(hasher.finalize())
}
