//! Tunables of the reconciler, read from `OPERAND_*` environment variables.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Settings {
    pub update_poll: Duration,
    pub update_timeout: Duration,
    pub delete_poll: Duration,
    pub delete_timeout: Duration,
    /// Kind of the aggregate driving reconciliation; deleting one never waits.
    pub owner_kind: String,
    /// Kinds that are deleted and recreated instead of updated in place.
    pub immutable_kinds: Vec<String>,
    /// Install namespace of operators using the `cluster` install mode.
    pub cluster_operator_namespace: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            update_poll: Duration::from_millis(2000),
            update_timeout: Duration::from_secs(30),
            delete_poll: Duration::from_millis(2000),
            delete_timeout: Duration::from_secs(60),
            owner_kind: "OperandRequest".to_string(),
            immutable_kinds: vec!["Job".to_string()],
            cluster_operator_namespace: "openshift-operators".to_string(),
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl Settings {
    /// Defaults overridden by whatever `OPERAND_*` variables are set and parse.
    pub fn from_env() -> Self {
        let mut s = Self::default();
        if let Some(ms) = env_u64("OPERAND_UPDATE_POLL_MS") {
            s.update_poll = Duration::from_millis(ms);
        }
        if let Some(secs) = env_u64("OPERAND_UPDATE_TIMEOUT_SECS") {
            s.update_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = env_u64("OPERAND_DELETE_POLL_MS") {
            s.delete_poll = Duration::from_millis(ms);
        }
        if let Some(secs) = env_u64("OPERAND_DELETE_TIMEOUT_SECS") {
            s.delete_timeout = Duration::from_secs(secs);
        }
        if let Some(kind) = env_string("OPERAND_OWNER_KIND") {
            s.owner_kind = kind;
        }
        if let Some(kinds) = env_string("OPERAND_IMMUTABLE_KINDS") {
            s.immutable_kinds = parse_kinds(&kinds);
        }
        if let Some(ns) = env_string("OPERAND_CLUSTER_OPERATOR_NS") {
            s.cluster_operator_namespace = ns;
        }
        s
    }

    pub fn is_immutable(&self, kind: &str) -> bool {
        self.immutable_kinds.iter().any(|k| k.eq_ignore_ascii_case(kind))
    }

    pub fn is_owner_kind(&self, kind: &str) -> bool {
        self.owner_kind.eq_ignore_ascii_case(kind)
    }
}

/// Comma-separated kind list; blanks dropped.
pub fn parse_kinds(raw: &str) -> Vec<String> {
    raw.split(',').map(str::trim).filter(|k| !k.is_empty()).map(String::from).collect()
}
