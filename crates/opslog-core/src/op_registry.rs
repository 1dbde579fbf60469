//! Bidirectional alias ↔ canonical mapping for operation identifiers.
//!
//! The alias table is data — a static list of `(alias, canonical)` pairs —
//! kept separate from the lookup logic so it can be regenerated by
//! whatever tooling owns the canonical operation list.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Canonical operation identifiers this core knows about. Each canonical
/// op is paired with its R2 policy (glossary) so adding an operation
/// forces a policy decision.
const CANONICAL_OPS: &[(&str, crate::types::R2Policy)] = &[
    ("trustCheckIn", crate::types::R2Policy::Optional),
    ("somaticSession", crate::types::R2Policy::Required),
    ("mediaWisdom", crate::types::R2Policy::Optional),
    ("patternRecognition", crate::types::R2Policy::Optional),
    ("valuesClarification", crate::types::R2Policy::None),
    ("ritualMoment", crate::types::R2Policy::None),
    ("userMessage", crate::types::R2Policy::None),
    ("systemEvent", crate::types::R2Policy::None),
];

/// Alias table: legacy/alternate spellings → canonical form.
const ALIAS_TABLE: &[(&str, &str)] = &[
    ("trust_check_in", "trustCheckIn"),
    ("trust-checkin", "trustCheckIn"),
    ("somatic_session", "somaticSession"),
    ("somatic-session", "somaticSession"),
    ("media_wisdom", "mediaWisdom"),
    ("pattern_recognition", "patternRecognition"),
    ("values_clarification", "valuesClarification"),
    ("ritual_moment", "ritualMoment"),
    ("user_message", "userMessage"),
    ("system_event", "systemEvent"),
];

/// Pure, in-memory, initialized once from the static tables above.
pub struct OpRegistry {
    canonical: HashMap<&'static str, crate::types::R2Policy>,
    aliases: HashMap<&'static str, &'static str>,
    unknown_ops_seen: AtomicU64,
}

impl Default for OpRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl OpRegistry {
    pub fn new() -> Self {
        Self {
            canonical: CANONICAL_OPS.iter().copied().collect(),
            aliases: ALIAS_TABLE.iter().copied().collect(),
            unknown_ops_seen: AtomicU64::new(0),
        }
    }

    /// Total over the union of both namespaces. Never throws; unknown
    /// inputs are returned unchanged and counted.
    pub fn to_canonical(&self, s: &str) -> String {
        if self.canonical.contains_key(s) {
            return s.to_string();
        }
        if let Some(canon) = self.aliases.get(s) {
            return (*canon).to_string();
        }
        self.unknown_ops_seen.fetch_add(1, Ordering::Relaxed);
        s.to_string()
    }

    pub fn all_canonical(&self) -> Vec<&'static str> {
        self.canonical.keys().copied().collect()
    }

    pub fn all_aliases(&self) -> Vec<&'static str> {
        self.aliases.keys().copied().collect()
    }

    pub fn is_known(&self, s: &str) -> bool {
        self.canonical.contains_key(s) || self.aliases.contains_key(s)
    }

    /// The R2 policy for a canonical operation id. Unknown canonical
    /// operations (i.e. `to_canonical` left the input unchanged because
    /// it matched neither table) default to `None` — no object-store
    /// copy is attempted for an operation this registry has never heard of.
    pub fn r2_policy(&self, canonical_op: &str) -> crate::types::R2Policy {
        self.canonical
            .get(canonical_op)
            .copied()
            .unwrap_or(crate::types::R2Policy::None)
    }

    pub fn unknown_ops_seen(&self) -> u64 {
        self.unknown_ops_seen.load(Ordering::Relaxed)
    }
}
