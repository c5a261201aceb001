//! `IdentityEngine` (spec §4.3): computes a stable fingerprint from server
//! configuration, and tracks first-seen/last-seen/config provenance.

use std::collections::BTreeMap;

use chrono::{Duration as ChronoDuration, Utc};
use mcprox_core::model::{OAuthBundle, ServerIdentity, TransportKind, UpstreamRecord};
use mcprox_core::{Error, Result};
use mcprox_store::{containers, Store};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

/// The subset of `UpstreamRecord` that is semantically significant to
/// identity, normalized for hashing (spec §4.3 step 2):
/// - argument vector preserves order (order is semantically significant)
/// - env/headers are maps, serialized key-sorted via `BTreeMap`
/// - OAuth scopes are sorted lexicographically (order irrelevant)
#[derive(Serialize)]
struct CanonicalAttributes<'a> {
    name: &'a str,
    transport: TransportKind,
    url: Option<&'a str>,
    command: Option<&'a str>,
    args: &'a [String],
    working_dir: Option<&'a str>,
    env: &'a BTreeMap<String, String>,
    headers: &'a BTreeMap<String, String>,
    oauth: Option<NormalizedOAuth>,
}

#[derive(Serialize)]
struct NormalizedOAuth {
    client_id: String,
    client_secret: Option<String>,
    redirect_uri: String,
    pkce_enabled: bool,
    scopes: Vec<String>,
}

impl From<&OAuthBundle> for NormalizedOAuth {
    fn from(bundle: &OAuthBundle) -> Self {
        let mut scopes = bundle.scopes.clone();
        scopes.sort();
        Self {
            client_id: bundle.client_id.clone(),
            client_secret: bundle.client_secret.clone(),
            redirect_uri: bundle.redirect_uri.clone(),
            pkce_enabled: bundle.pkce_enabled,
            scopes,
        }
    }
}

#[derive(Clone)]
pub struct IdentityEngine {
    store: Store,
}

impl IdentityEngine {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Computes `hex(SHA-256(canonical_encoding(attributes)))`. Falls back
    /// to `hex(SHA-256(name ∥ transport ∥ url ∥ command))` if serialization
    /// fails (spec §4.3 step 4) — practically unreachable for this record
    /// shape, but kept because the spec calls it out as a defined fallback.
    pub fn generate_server_id(config: &UpstreamRecord) -> String {
        let attrs = CanonicalAttributes {
            name: &config.name,
            transport: config.transport,
            url: config.url.as_deref(),
            command: config.command.as_deref(),
            args: &config.args,
            working_dir: config.working_dir.as_deref(),
            env: &config.env,
            headers: &config.headers,
            oauth: config.oauth.as_ref().map(NormalizedOAuth::from),
        };

        match serde_json::to_vec(&attrs) {
            Ok(bytes) => hex::encode(Sha256::digest(&bytes)),
            Err(e) => {
                tracing::warn!(error = %e, "canonical serialization failed, using fallback identity hash");
                let transport_tag = transport_tag(config.transport);
                let fallback = format!(
                    "{}{}{}{}",
                    config.name,
                    transport_tag,
                    config.url.as_deref().unwrap_or(""),
                    config.command.as_deref().unwrap_or("")
                );
                hex::encode(Sha256::digest(fallback.as_bytes()))
            }
        }
    }

    /// Creates or refreshes the `ServerIdentity` for `config`, sighted via
    /// `config_path` (spec §4.3 `RegisterServerIdentity`).
    pub fn register_server_identity(
        &self,
        config: &UpstreamRecord,
        config_path: &str,
    ) -> Result<ServerIdentity> {
        let id = Self::generate_server_id(config);
        let now = Utc::now();

        let mut identity = match self.store.get::<ServerIdentity>(containers::SERVER_IDENTITIES, &id)? {
            Some(mut existing) => {
                existing.last_seen = now;
                existing.record_config_path(config_path);
                debug!(server = %config.name, id = %id, "refreshed existing server identity");
                existing
            }
            None => {
                info!(server = %config.name, id = %id, "registering new server identity");
                ServerIdentity {
                    fingerprint: ServerIdentity::fingerprint_of(&id),
                    id: id.clone(),
                    server_name: config.name.clone(),
                    attributes: serde_json::to_value(attributes_snapshot(config))
                        .map_err(|e| Error::internal(format!("snapshot serialize failed: {e}")))?,
                    first_seen: now,
                    last_seen: now,
                    config_paths: vec![config_path.to_string()],
                    metadata: BTreeMap::new(),
                }
            }
        };

        self.store
            .put(containers::SERVER_IDENTITIES, &identity.id, &identity)?;
        identity.id = id;
        Ok(identity)
    }

    pub fn get(&self, id: &str) -> Result<Option<ServerIdentity>> {
        self.store.get(containers::SERVER_IDENTITIES, id)
    }

    pub fn list(&self) -> Result<Vec<ServerIdentity>> {
        let rows: Vec<(String, ServerIdentity)> =
            self.store.range_scan(containers::SERVER_IDENTITIES)?;
        Ok(rows.into_iter().map(|(_, v)| v).collect())
    }

    /// Deletes identity, per-server tool-call/diagnostics containers, and
    /// the statistics entry for every identity whose `lastSeen` is older
    /// than `threshold` (spec §4.3 `CleanupStale`).
    pub fn cleanup_stale(&self, threshold: ChronoDuration) -> Result<usize> {
        let now = Utc::now();
        let identities = self.list()?;
        let mut removed = 0usize;
        for identity in identities {
            if identity.is_stale(now, threshold) {
                self.store
                    .delete(containers::SERVER_IDENTITIES, &identity.id)?;
                self.store.drop_server_containers(&identity.id)?;
                removed += 1;
                info!(id = %identity.id, server = %identity.server_name, "removed stale server identity");
            }
        }
        Ok(removed)
    }
}

fn attributes_snapshot(config: &UpstreamRecord) -> serde_json::Value {
    serde_json::json!({
        "name": config.name,
        "transport": config.transport,
        "url": config.url,
        "command": config.command,
        "args": config.args,
        "workingDir": config.working_dir,
        "env": config.env,
        "headers": config.headers,
    })
}

fn transport_tag(t: TransportKind) -> &'static str {
    match t {
        TransportKind::Subprocess => "subprocess",
        TransportKind::Http => "http",
        TransportKind::Sse => "sse",
        TransportKind::StreamableHttp => "streamable-http",
        TransportKind::Auto => "auto",
    }
}
