//! OAuth collaborator interface (spec §6): "`GetOrCreateTokenStore`,
//! `HasTokenStore`, `SetCompletionCallback`, `NotifyCompletion`,
//! `GetToken`/`SaveToken`/`ClearToken`." Defined here as a trait; a concrete
//! token-store implementation is out of this crate's scope.

use async_trait::async_trait;
use mcprox_core::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

#[async_trait]
pub trait OAuthCollaborator: Send + Sync {
    async fn has_token_store(&self, server_name: &str) -> bool;
    async fn get_or_create_token_store(&self, server_name: &str) -> Result<()>;
    async fn get_token(&self, server_name: &str) -> Result<Option<OAuthToken>>;
    async fn save_token(&self, server_name: &str, token: OAuthToken) -> Result<()>;
    async fn clear_token(&self, server_name: &str) -> Result<()>;

    /// Deletes every token store whose server name is not in `valid_names`
    /// (spec §8 scenario 5), returning the count removed. Run after a
    /// config reload drops servers that still hold a provisioned token.
    async fn cleanup_orphaned_tokens(&self, valid_names: &[String]) -> Result<usize>;
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_double {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Default)]
    pub struct InMemoryOAuth {
        tokens: Mutex<HashMap<String, OAuthToken>>,
        known_servers: Mutex<std::collections::HashSet<String>>,
    }

    #[async_trait]
    impl OAuthCollaborator for InMemoryOAuth {
        async fn has_token_store(&self, server_name: &str) -> bool {
            self.known_servers.lock().await.contains(server_name)
        }

        async fn get_or_create_token_store(&self, server_name: &str) -> Result<()> {
            self.known_servers
                .lock()
                .await
                .insert(server_name.to_string());
            Ok(())
        }

        async fn get_token(&self, server_name: &str) -> Result<Option<OAuthToken>> {
            Ok(self.tokens.lock().await.get(server_name).cloned())
        }

        async fn save_token(&self, server_name: &str, token: OAuthToken) -> Result<()> {
            self.tokens
                .lock()
                .await
                .insert(server_name.to_string(), token);
            Ok(())
        }

        async fn clear_token(&self, server_name: &str) -> Result<()> {
            self.tokens.lock().await.remove(server_name);
            Ok(())
        }

        async fn cleanup_orphaned_tokens(&self, valid_names: &[String]) -> Result<usize> {
            let mut known = self.known_servers.lock().await;
            let mut tokens = self.tokens.lock().await;
            let orphans: Vec<String> = known
                .iter()
                .filter(|name| !valid_names.contains(name))
                .cloned()
                .collect();
            for name in &orphans {
                known.remove(name);
                tokens.remove(name);
            }
            Ok(orphans.len())
        }
    }
}
