use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

use crate::core::answers::Answers;

/// A signed-up event participant. A participant exists exactly when a row
/// with their snowflake exists.
#[derive(PartialEq, Eq, Debug, FromRow, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// Stable Discord ID
    pub snowflake: String,

    pub username: String,

    pub avatar_url: String,

    /// Snowflake of the participant this one creates for; set only by the
    /// pairing run. The relation is directed and not necessarily symmetric.
    pub partner: Option<String>,

    /// Membership of the configured guild, re-derived on every profile fetch
    pub in_server: bool,

    /// Presence in the admin allow-list, re-derived on every profile fetch
    pub is_admin: bool,

    /// Mirror of the ban list entry for this participant
    pub is_banned: bool,
}

/// Presentation subset of a partner's profile.
#[derive(PartialEq, Eq, Debug, Clone, Serialize, Deserialize)]
pub struct PartnerDetails {
    pub snowflake: String,
    pub username: String,
    pub avatar_url: String,
}

/// Partner lookup response: who the partner is plus their questionnaire.
#[derive(PartialEq, Eq, Debug, Clone, Serialize, Deserialize)]
pub struct PartnerView {
    pub details: PartnerDetails,
    pub answers: Answers,
}

impl From<&Participant> for PartnerDetails {
    fn from(participant: &Participant) -> Self {
        PartnerDetails {
            snowflake: participant.snowflake.clone(),
            username: participant.username.clone(),
            avatar_url: participant.avatar_url.clone(),
        }
    }
}
