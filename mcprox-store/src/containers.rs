//! Fixed container ("bucket"/"tree") names (spec §6 persistent storage layout).

pub const UPSTREAMS: &str = "upstreams";
pub const TOOLSTATS: &str = "toolstats";
pub const TOOLHASH: &str = "toolhash";
pub const OAUTH_TOKENS: &str = "oauth_tokens";
pub const OAUTH_COMPLETION: &str = "oauth_completion";
pub const META: &str = "meta";
pub const CACHE: &str = "cache";
pub const CACHE_STATS: &str = "cache_stats";
pub const ACTIVITY_RECORDS: &str = "activity_records";
pub const SESSIONS: &str = "sessions";
pub const SERVER_IDENTITIES: &str = "server_identities";
pub const SERVER_STATISTICS: &str = "server_statistics";

/// `meta` container key holding the little-endian 8-byte schema version.
pub const META_SCHEMA_KEY: &str = "schema";
/// `meta` container key holding the Docker-recovery marker.
pub const META_DOCKER_RECOVERY_KEY: &str = "docker_recovery_state";

/// Current schema version (spec §6: "current value 2").
pub const CURRENT_SCHEMA_VERSION: u64 = 2;

pub fn server_tool_calls(server_id: &str) -> String {
    format!("server_{server_id}_tool_calls")
}

pub fn server_diagnostics(server_id: &str) -> String {
    format!("server_{server_id}_diagnostics")
}
