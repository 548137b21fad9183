//! Publishing a new data root.
//!
//! The account service only moves an account's data root when presented a
//! capability signed by the account's write key. [`RootCommitter`] derives that
//! capability (optionally from a stored delegation), signs it, and sends the
//! update. It only accepts a [`ConfirmedRoot`], so nothing is published without
//! the operator's go-ahead.

mod client;
mod committer;
mod token;

pub use client::{AccountClient, AccountError, DEFAULT_API_VERSION};
pub use committer::{
    AuthError, CommitError, ConfirmedRoot, PublishError, RootCommitter, PROOF_LINK,
};
pub use token::{
    Algorithm, BearerToken, CapabilityToken, Header, Payload, Potency, TokenError, BEARER_PREFIX,
    TOKEN_VERSION,
};
