//! Parsing of the token bundle returned by the [`TokenProvider`](crate::delegates::TokenProvider).
//!
//! The bundle is JSON of the shape
//! `{"code": 200, "data": {"appPackage": ..., "miChid": ..., "miUserId": ...,
//! "miUserSecurityKey": ..., "token": ...}}`; anything else fails the login.

use anyhow::{anyhow, bail, Context};
use serde::Deserialize;

/// The session identity extracted from a valid token bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub uuid: i64,
    pub chid: f64,
    pub app_package: String,
    pub security_key: String,
    pub token: String,
}

#[derive(Deserialize)]
struct TokenBundle {
    code: i64,
    data: Option<TokenData>,
}

#[derive(Deserialize)]
struct TokenData {
    #[serde(rename = "appPackage")]
    app_package: String,
    #[serde(rename = "miChid")]
    chid: f64,
    #[serde(rename = "miUserId")]
    user_id: String,
    #[serde(rename = "miUserSecurityKey")]
    security_key: String,
    token: Option<String>,
}

pub fn parse_token_bundle(json: &str) -> anyhow::Result<Credentials> {
    let bundle: TokenBundle = serde_json::from_str(json).context("token bundle is not valid JSON")?;
    if bundle.code != 200 {
        bail!("token service returned code {}", bundle.code);
    }
    let data = bundle.data.ok_or_else(|| anyhow!("token bundle has no data"))?;
    let uuid: i64 = data.user_id.parse().context("miUserId is not an int64")?;
    let token = data.token.ok_or_else(|| anyhow!("token bundle has no token"))?;

    Ok(Credentials {
        uuid,
        chid: data.chid,
        app_package: data.app_package,
        security_key: data.security_key,
        token,
    })
}
