//! Default `OAuthCollaborator` (spec §6): persists tokens into the
//! already-named `oauth_tokens` container rather than leaving the seam
//! entirely to an embedder. A presence-only sentinel distinguishes "token
//! store provisioned, no token saved yet" from "never provisioned".

use mcprox_core::Result;
use mcprox_store::{containers, Store};
use mcprox_upstream::oauth::{OAuthCollaborator, OAuthToken};

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct TokenSlot {
    provisioned: bool,
    token: Option<OAuthToken>,
}

pub struct StoreBackedOAuth {
    store: Store,
}

impl StoreBackedOAuth {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    fn load(&self, server_name: &str) -> Result<TokenSlot> {
        Ok(self
            .store
            .get(containers::OAUTH_TOKENS, server_name)?
            .unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl OAuthCollaborator for StoreBackedOAuth {
    async fn has_token_store(&self, server_name: &str) -> bool {
        self.load(server_name).map(|s| s.provisioned).unwrap_or(false)
    }

    async fn get_or_create_token_store(&self, server_name: &str) -> Result<()> {
        let mut slot = self.load(server_name)?;
        if !slot.provisioned {
            slot.provisioned = true;
            self.store.put(containers::OAUTH_TOKENS, server_name, &slot)?;
        }
        Ok(())
    }

    async fn get_token(&self, server_name: &str) -> Result<Option<OAuthToken>> {
        Ok(self.load(server_name)?.token)
    }

    async fn save_token(&self, server_name: &str, token: OAuthToken) -> Result<()> {
        let slot = TokenSlot {
            provisioned: true,
            token: Some(token),
        };
        self.store.put(containers::OAUTH_TOKENS, server_name, &slot)
    }

    async fn clear_token(&self, server_name: &str) -> Result<()> {
        let mut slot = self.load(server_name)?;
        slot.token = None;
        self.store.put(containers::OAUTH_TOKENS, server_name, &slot)
    }

    async fn cleanup_orphaned_tokens(&self, valid_names: &[String]) -> Result<usize> {
        let slots: Vec<(String, TokenSlot)> = self.store.range_scan(containers::OAUTH_TOKENS)?;
        let mut removed = 0;
        for (server_name, _) in slots {
            if !valid_names.contains(&server_name) {
                self.store.delete(containers::OAUTH_TOKENS, &server_name)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
