use crate::core::db::EventDb;
use crate::core::settings::ConfigStore;
use crate::error::AppError;
use crate::logsink::LogSink;
use crate::web::session::{RequestIdentity, SessionUser};

/// A single authorization predicate. Predicates are pure reads; none of
/// them mutates anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    Authenticated,
    NotBanned,
    Admin,
    PartnerAssigned,
    AnswersSubmitted,
}

/// Joining requires the questionnaire to already be in.
pub const JOIN: &[Predicate] = &[
    Predicate::Authenticated,
    Predicate::NotBanned,
    Predicate::AnswersSubmitted,
];

/// Questionnaire reads/writes, profile reads, and the countdown.
pub const MEMBER: &[Predicate] = &[Predicate::Authenticated, Predicate::NotBanned];

/// Partner lookup and the artwork exchange, usable only once paired.
pub const EXCHANGE: &[Predicate] = &[
    Predicate::Authenticated,
    Predicate::NotBanned,
    Predicate::PartnerAssigned,
];

pub const ADMIN: &[Predicate] = &[Predicate::Authenticated, Predicate::Admin];

/// Everything a predicate may read when deciding whether an operation can
/// proceed.
pub struct GateRequest<'a> {
    pub operation: &'static str,
    pub identity: &'a RequestIdentity,
    pub db: &'a EventDb,
    pub config: &'a ConfigStore,
    pub sink: &'a LogSink,
}

impl GateRequest<'_> {
    fn deny(&self, who: &str, reason: &str) {
        self.sink.warn(format!(
            "Denied {} for {}: {}",
            self.operation, who, reason
        ));
    }
}

/// Evaluates a predicate chain left to right. The first failing predicate
/// short-circuits: its failure is logged and returned, and nothing after it
/// runs. On success the resolved session user is handed back to the
/// operation.
pub async fn check(chain: &[Predicate], req: &GateRequest<'_>) -> Result<SessionUser, AppError> {
    let user = match &req.identity.user {
        Some(user) => user,
        None => {
            let remote = req
                .identity
                .remote
                .map(|addr| addr.to_string())
                .unwrap_or_else(|| "unknown address".to_owned());
            req.sink.warn(format!(
                "Unauthenticated request to {} from {}",
                req.operation, remote
            ));
            return Err(AppError::Unauthorized("Log in to use this".to_owned()));
        }
    };

    let who = format!("{} ({})", user.username, user.snowflake);

    for predicate in chain {
        match predicate {
            Predicate::Authenticated => {
                // Resolved above; nothing further to check.
            }
            Predicate::NotBanned => {
                if req.db.get_ban(&user.snowflake).await?.is_some() {
                    req.deny(&who, "banned");
                    return Err(AppError::Forbidden(
                        "You are banned and cannot take part in the event".to_owned(),
                    ));
                }
            }
            Predicate::Admin => {
                if !req.config.is_admin(&user.snowflake).await {
                    req.deny(&who, "not an admin");
                    return Err(AppError::Forbidden(
                        "Only admins can use this operation".to_owned(),
                    ));
                }
            }
            Predicate::PartnerAssigned => {
                let partner = req
                    .db
                    .find_participant(&user.snowflake)
                    .await?
                    .and_then(|participant| participant.partner);
                if partner.is_none() {
                    req.deny(&who, "no partner assigned");
                    return Err(AppError::Forbidden(
                        "You have not been assigned a partner yet".to_owned(),
                    ));
                }
            }
            Predicate::AnswersSubmitted => {
                if req.db.get_answers(&user.snowflake).await?.is_none() {
                    req.deny(&who, "no answers submitted");
                    return Err(AppError::Forbidden(
                        "Submit your questionnaire answers first".to_owned(),
                    ));
                }
            }
        }
    }

    Ok(user.clone())
}
