use reqwest::StatusCode;

use super::client::{AccountClient, AccountError};
use super::token::{BearerToken, CapabilityToken, TokenError};
use crate::crypto::WriteKey;
use crate::linked_data::Cid;
use crate::store::{cat_link, BlockStore, StoreError};

/// Name of the delegation link under a root proof.
pub const PROOF_LINK: &str = "bearer.jwt";

/// Failure to authorize the account before publishing. Nothing is sent.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("couldn't fetch delegation proof at {0}/bearer.jwt: {1}")]
    Fetch(Cid, StoreError),
    #[error("couldn't parse delegation proof at {0}/bearer.jwt: {1}")]
    Proof(Cid, String),
    #[error("couldn't sign capability token: {0}")]
    Token(#[from] TokenError),
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to update data root. HTTP code {0}. Message: {1}")]
    Rejected(StatusCode, String),
    #[error("failed to update data root: {0}")]
    Request(AccountError),
}

impl From<AccountError> for PublishError {
    fn from(e: AccountError) -> Self {
        match e {
            AccountError::HttpStatus(status, body) => PublishError::Rejected(status, body),
            other => PublishError::Request(other),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// A root the operator agreed to publish.
///
/// The only way to obtain one is [`ConfirmedRoot::confirmed`], which callers
///  invoke after the operator answered yes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmedRoot(Cid);

impl ConfirmedRoot {
    pub fn confirmed(root: Cid) -> Self {
        Self(root)
    }

    pub fn cid(&self) -> &Cid {
        &self.0
    }
}

/// Authorizes and publishes a new data root for the account.
pub struct RootCommitter<S> {
    store: S,
    client: AccountClient,
    write_key: WriteKey,
    server_did: String,
    root_proof: Option<Cid>,
}

impl<S: BlockStore> RootCommitter<S> {
    pub fn new(store: S, client: AccountClient, write_key: WriteKey, server_did: impl Into<String>) -> Self {
        Self {
            store,
            client,
            write_key,
            server_did: server_did.into(),
            root_proof: None,
        }
    }

    /// Derive the capability from the delegation stored under `proof`.
    pub fn with_root_proof(mut self, proof: Option<Cid>) -> Self {
        self.root_proof = proof;
        self
    }

    /// Fetch the delegation, if one is configured, as an encoded token.
    pub async fn fetch_proof(&self) -> Result<Option<String>, AuthError> {
        let Some(proof) = self.root_proof else {
            return Ok(None);
        };
        let bytes = cat_link(&self.store, &proof, PROOF_LINK)
            .await
            .map_err(|e| AuthError::Fetch(proof, e))?;

        let value: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| AuthError::Proof(proof, e.to_string()))?;
        let bearer = match value {
            serde_json::Value::String(bearer) => bearer,
            other => return Err(AuthError::Proof(proof, other.to_string())),
        };
        let bearer =
            BearerToken::parse(&bearer).map_err(|_| AuthError::Proof(proof, bearer.clone()))?;
        Ok(Some(bearer.into_token()))
    }

    /// Build and sign an append capability for the account service.
    pub async fn build_token(&self) -> Result<BearerToken, AuthError> {
        let proof = self.fetch_proof().await?;
        let token = CapabilityToken::append(self.write_key.did(), self.server_did.clone(), proof)
            .sign(&self.write_key)?;
        Ok(BearerToken::from_token(token)?)
    }

    /// Point the account's data root at `root`.
    ///
    /// Any failure leaves the published root untouched; the new tree stays in
    ///  the store, so publishing can simply be retried.
    pub async fn publish(&self, root: ConfirmedRoot) -> Result<(), CommitError> {
        let bearer = self.build_token().await?;
        tracing::info!("created authorization token, updating data root to {}", root.cid());
        self.client
            .set_data_root(root.cid(), &bearer)
            .await
            .map_err(PublishError::from)?;
        tracing::info!("data root updated to {}", root.cid());
        Ok(())
    }
}
