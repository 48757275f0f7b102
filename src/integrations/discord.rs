use anyhow::Context;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::settings::Settings;

const API_BASE: &str = "https://discord.com/api/v10";
const AUTHORIZE_URL: &str = "https://discord.com/oauth2/authorize";
const CDN_BASE: &str = "https://cdn.discordapp.com";

/// Scopes needed to read the identity and its guild list.
const SCOPES: &str = "identify guilds";

/// Identity fields returned by /users/@me.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DiscordUser {
    pub id: String,
    pub username: String,
    pub avatar: Option<String>,
}

impl DiscordUser {
    pub fn avatar_url(&self) -> String {
        match &self.avatar {
            Some(hash) => format!("{}/avatars/{}/{}.png", CDN_BASE, self.id, hash),
            None => format!("{}/embed/avatars/0.png", CDN_BASE),
        }
    }
}

/// Subset of the guild objects returned by /users/@me/guilds.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PartialGuild {
    pub id: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Minimal Discord OAuth2 client: builds the authorize redirect, exchanges
/// the callback code, and reads the identity endpoints on behalf of a
/// session.
pub struct DiscordOAuth {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl DiscordOAuth {
    pub fn new(settings: &Settings) -> Self {
        DiscordOAuth {
            http: reqwest::Client::new(),
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            redirect_uri: settings.redirect_uri.clone(),
        }
    }

    /// Where an unauthenticated browser is sent to log in.
    pub fn authorize_url(&self) -> anyhow::Result<String> {
        let mut url = Url::parse(AUTHORIZE_URL).context("invalid authorize endpoint")?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", SCOPES);
        Ok(url.into())
    }

    /// Exchanges an authorization code for a bearer token.
    pub async fn exchange_code(&self, code: &str) -> anyhow::Result<String> {
        let response = self
            .http
            .post(format!("{}/oauth2/token", API_BASE))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .send()
            .await
            .context("token exchange request failed")?
            .error_for_status()
            .context("token exchange was rejected")?
            .json::<TokenResponse>()
            .await
            .context("failed to parse token response")?;

        Ok(response.access_token)
    }

    pub async fn fetch_user(&self, access_token: &str) -> anyhow::Result<DiscordUser> {
        let user = self
            .http
            .get(format!("{}/users/@me", API_BASE))
            .bearer_auth(access_token)
            .send()
            .await
            .context("identity request failed")?
            .error_for_status()
            .context("identity request was rejected")?
            .json::<DiscordUser>()
            .await
            .context("failed to parse identity response")?;

        Ok(user)
    }

    pub async fn fetch_guilds(&self, access_token: &str) -> anyhow::Result<Vec<PartialGuild>> {
        let guilds = self
            .http
            .get(format!("{}/users/@me/guilds", API_BASE))
            .bearer_auth(access_token)
            .send()
            .await
            .context("guild list request failed")?
            .error_for_status()
            .context("guild list request was rejected")?
            .json::<Vec<PartialGuild>>()
            .await
            .context("failed to parse guild list")?;

        Ok(guilds)
    }

    /// Whether the session's identity is a member of the given guild.
    pub async fn in_guild(&self, access_token: &str, guild_id: &str) -> anyhow::Result<bool> {
        let guilds = self.fetch_guilds(access_token).await?;
        Ok(guilds.iter().any(|guild| guild.id == guild_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oauth() -> DiscordOAuth {
        let mut settings = Settings::template();
        settings.client_id = "12345".to_owned();
        settings.redirect_uri = "http://localhost:8080/callback".to_owned();
        DiscordOAuth::new(&settings)
    }

    #[test]
    fn test_authorize_url_carries_oauth_params() {
        let url = oauth().authorize_url().unwrap();
        assert!(url.starts_with("https://discord.com/oauth2/authorize?"));
        assert!(url.contains("client_id=12345"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("scope=identify+guilds"));
    }

    #[test]
    fn test_avatar_url_falls_back_to_default() {
        let with_avatar = DiscordUser {
            id: "1".to_owned(),
            username: "u".to_owned(),
            avatar: Some("abc".to_owned()),
        };
        assert_eq!(
            with_avatar.avatar_url(),
            "https://cdn.discordapp.com/avatars/1/abc.png"
        );

        let without_avatar = DiscordUser {
            id: "1".to_owned(),
            username: "u".to_owned(),
            avatar: None,
        };
        assert_eq!(
            without_avatar.avatar_url(),
            "https://cdn.discordapp.com/embed/avatars/0.png"
        );
    }
}
