//! id_token claim decoding
//!
//! The token endpoint has already validated the id_token it hands back over
//! TLS, so only the payload segment is decoded here to learn who signed in.

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::Deserialize;

use super::Account;

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: Option<String>,
    oid: Option<String>,
    tid: Option<String>,
    name: Option<String>,
    preferred_username: Option<String>,
    upn: Option<String>,
    email: Option<String>,
}

/// Build an [`Account`] from the claims of an id_token.
pub fn account_from_id_token(id_token: &str) -> Result<Account> {
    let mut parts = id_token.split('.');
    let payload = match (parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(payload), Some(_)) => payload,
        _ => bail!("id_token is not a JWT"),
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .context("id_token payload is not base64url")?;
    let claims: IdTokenClaims =
        serde_json::from_slice(&bytes).context("id_token payload is not JSON")?;

    let home_account_id = match (&claims.oid, &claims.tid) {
        (Some(oid), Some(tid)) => format!("{}.{}", oid, tid),
        _ => claims
            .sub
            .clone()
            .context("id_token carries neither oid/tid nor sub")?,
    };

    let username = claims
        .preferred_username
        .or(claims.upn)
        .or(claims.email)
        .unwrap_or_default();

    Ok(Account {
        home_account_id,
        username,
        name: claims.name,
        tenant_id: claims.tid,
    })
}
