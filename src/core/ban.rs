use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

/// Recorded when no reason is given with a ban.
pub const DEFAULT_BAN_REASON: &str = "No Reason";

/// A ban list entry. The presence of a row is what makes a participant
/// banned; the participant's `is_banned` flag is a mirror maintained by the
/// same operation.
#[derive(PartialEq, Eq, Debug, FromRow, Clone, Serialize, Deserialize)]
pub struct BanEntry {
    pub user_snowflake: String,
    pub reason: String,
}
