use std::collections::HashMap;
use std::convert::Infallible;

use futures::TryStreamExt;
use serde::Serialize;
use serde_json::json;
use warp::http::{header, StatusCode};
use warp::multipart::{FormData, Part};
use warp::{Buf, Reply};

use crate::core::answers::Answers;
use crate::core::artwork::{Artwork, ArtworkStore};
use crate::core::ban::DEFAULT_BAN_REASON;
use crate::core::countdown::{unix_now, Countdown};
use crate::core::pairing::pair_participants;
use crate::core::user::{Participant, PartnerView};
use crate::error::AppError;
use crate::web::gate::{self, GateRequest};
use crate::web::session::{RequestIdentity, SessionUser, SESSION_COOKIE};
use crate::Services;

fn gate_request<'a>(
    operation: &'static str,
    identity: &'a RequestIdentity,
    services: &'a Services,
) -> GateRequest<'a> {
    GateRequest {
        operation,
        identity,
        db: &services.db,
        config: &services.config,
        sink: &services.sink,
    }
}

fn error_reply(error: &AppError) -> warp::reply::WithStatus<warp::reply::Json> {
    log::warn!("{}", error);
    warp::reply::with_status(
        warp::reply::json(&json!({ "kind": error.kind(), "message": error.to_string() })),
        error.status(),
    )
}

pub fn to_http_json<T: Serialize>(result: Result<T, AppError>) -> Result<impl Reply, Infallible> {
    match result {
        Ok(data) => Ok(warp::reply::with_status(
            warp::reply::json(&data),
            StatusCode::OK,
        )),
        Err(e) => Ok(error_reply(&e)),
    }
}

fn message(text: impl Into<String>) -> serde_json::Value {
    json!({ "message": text.into() })
}

fn redirect_to(location: &str, cookie: Option<String>) -> Result<warp::reply::Response, AppError> {
    let mut builder = warp::http::Response::builder()
        .status(StatusCode::FOUND)
        .header(header::LOCATION, location);
    if let Some(cookie) = cookie {
        builder = builder.header(header::SET_COOKIE, cookie);
    }
    builder
        .body(Vec::new())
        .map(|response| response.into_response())
        .map_err(|e| AppError::Internal(anyhow::Error::new(e)))
}

pub async fn login(services: Services) -> Result<warp::reply::Response, Infallible> {
    let result = services
        .oauth
        .authorize_url()
        .map_err(AppError::from)
        .and_then(|url| redirect_to(&url, None));

    match result {
        Ok(response) => Ok(response),
        Err(e) => Ok(error_reply(&e).into_response()),
    }
}

pub async fn callback(
    query: HashMap<String, String>,
    services: Services,
) -> Result<warp::reply::Response, Infallible> {
    match callback_inner(query, &services).await {
        Ok(response) => Ok(response),
        Err(e) => Ok(error_reply(&e).into_response()),
    }
}

async fn callback_inner(
    query: HashMap<String, String>,
    services: &Services,
) -> Result<warp::reply::Response, AppError> {
    let code = query
        .get("code")
        .ok_or_else(|| AppError::Validation("Missing 'code' query parameter".to_owned()))?;

    let access_token = services.oauth.exchange_code(code).await?;
    let discord_user = services.oauth.fetch_user(&access_token).await?;

    let token = services.sessions.create(SessionUser {
        snowflake: discord_user.id.clone(),
        username: discord_user.username.clone(),
        avatar_url: discord_user.avatar_url(),
        access_token,
    });

    services.sink.info(format!(
        "User {} ({}) logged in",
        discord_user.username, discord_user.id
    ));

    let settings = services.config.snapshot().await;
    redirect_to(
        &settings.frontend_url,
        Some(format!("{}={}; HttpOnly; Path=/", SESSION_COOKIE, token)),
    )
}

pub async fn me(identity: RequestIdentity, services: Services) -> Result<impl Reply, Infallible> {
    to_http_json(me_inner(&identity, &services).await)
}

async fn me_inner(
    identity: &RequestIdentity,
    services: &Services,
) -> Result<Participant, AppError> {
    let user = gate::check(gate::MEMBER, &gate_request("profile", identity, services)).await?;

    // Membership and admin status are never trusted from storage; both are
    // re-derived on every fetch.
    let settings = services.config.snapshot().await;
    let in_server = services
        .oauth
        .in_guild(&user.access_token, &settings.server)
        .await?;
    let is_admin = services.config.is_admin(&user.snowflake).await;

    Ok(match services.db.find_participant(&user.snowflake).await? {
        Some(mut participant) => {
            participant.username = user.username.clone();
            participant.avatar_url = user.avatar_url.clone();
            participant.in_server = in_server;
            participant.is_admin = is_admin;
            participant
        }
        None => Participant {
            snowflake: user.snowflake.clone(),
            username: user.username.clone(),
            avatar_url: user.avatar_url.clone(),
            partner: None,
            in_server,
            is_admin,
            is_banned: false,
        },
    })
}

pub async fn join(identity: RequestIdentity, services: Services) -> Result<impl Reply, Infallible> {
    to_http_json(join_inner(&identity, &services).await)
}

async fn join_inner(
    identity: &RequestIdentity,
    services: &Services,
) -> Result<serde_json::Value, AppError> {
    let user = gate::check(gate::JOIN, &gate_request("join", identity, services)).await?;

    if services.db.find_participant(&user.snowflake).await?.is_some() {
        return Err(AppError::Conflict(
            "You have already joined the event".to_owned(),
        ));
    }

    let settings = services.config.snapshot().await;
    let in_server = services
        .oauth
        .in_guild(&user.access_token, &settings.server)
        .await?;
    let is_admin = services.config.is_admin(&user.snowflake).await;

    services
        .db
        .add_participant(&Participant {
            snowflake: user.snowflake.clone(),
            username: user.username.clone(),
            avatar_url: user.avatar_url.clone(),
            partner: None,
            in_server,
            is_admin,
            is_banned: false,
        })
        .await?;

    services.sink.info(format!(
        "User {} ({}) has joined the event",
        user.username, user.snowflake
    ));

    Ok(message("Joined the event"))
}

pub async fn submit_answers(
    identity: RequestIdentity,
    answers: Answers,
    services: Services,
) -> Result<impl Reply, Infallible> {
    to_http_json(submit_answers_inner(&identity, answers, &services).await)
}

async fn submit_answers_inner(
    identity: &RequestIdentity,
    answers: Answers,
    services: &Services,
) -> Result<serde_json::Value, AppError> {
    let user = gate::check(
        gate::MEMBER,
        &gate_request("submit answers", identity, services),
    )
    .await?;

    answers.validate()?;
    services.db.upsert_answers(&user.snowflake, &answers).await?;

    services.sink.info(format!(
        "User {} ({}) submitted questionnaire answers",
        user.username, user.snowflake
    ));

    Ok(message("Answers saved"))
}

pub async fn get_answers(
    identity: RequestIdentity,
    services: Services,
) -> Result<impl Reply, Infallible> {
    to_http_json(get_answers_inner(&identity, &services).await)
}

async fn get_answers_inner(
    identity: &RequestIdentity,
    services: &Services,
) -> Result<Answers, AppError> {
    let user = gate::check(
        gate::MEMBER,
        &gate_request("read answers", identity, services),
    )
    .await?;

    services
        .db
        .get_answers(&user.snowflake)
        .await?
        .ok_or_else(|| AppError::NotFound("You have not submitted answers yet".to_owned()))
}

pub async fn partner(
    identity: RequestIdentity,
    services: Services,
) -> Result<impl Reply, Infallible> {
    to_http_json(partner_inner(&identity, &services).await)
}

async fn partner_snowflake_of(user: &SessionUser, services: &Services) -> Result<String, AppError> {
    services
        .db
        .find_participant(&user.snowflake)
        .await?
        .and_then(|participant| participant.partner)
        .ok_or_else(|| {
            AppError::Forbidden("You have not been assigned a partner yet".to_owned())
        })
}

async fn partner_inner(
    identity: &RequestIdentity,
    services: &Services,
) -> Result<PartnerView, AppError> {
    let user = gate::check(
        gate::EXCHANGE,
        &gate_request("partner lookup", identity, services),
    )
    .await?;

    let partner_snowflake = partner_snowflake_of(&user, services).await?;
    let partner = services
        .db
        .find_participant(&partner_snowflake)
        .await?
        .ok_or_else(|| AppError::NotFound("Your partner no longer exists".to_owned()))?;
    let answers = services
        .db
        .get_answers(&partner_snowflake)
        .await?
        .ok_or_else(|| {
            AppError::NotFound("Your partner has not submitted answers".to_owned())
        })?;

    Ok(PartnerView {
        details: (&partner).into(),
        answers,
    })
}

pub async fn upload_artwork(
    identity: RequestIdentity,
    form: FormData,
    services: Services,
) -> Result<impl Reply, Infallible> {
    to_http_json(upload_artwork_inner(&identity, form, &services).await)
}

async fn upload_artwork_inner(
    identity: &RequestIdentity,
    form: FormData,
    services: &Services,
) -> Result<serde_json::Value, AppError> {
    let user = gate::check(
        gate::EXCHANGE,
        &gate_request("artwork upload", identity, services),
    )
    .await?;

    let (filename, bytes) = read_upload(form).await?;
    store_upload(services, &user, &filename, &bytes).await
}

async fn read_upload(form: FormData) -> Result<(String, Vec<u8>), AppError> {
    let parts: Vec<Part> = form
        .try_collect()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed upload: {}", e)))?;

    let part = parts
        .into_iter()
        .find(|part| part.name() == "file")
        .ok_or_else(|| AppError::Validation("Upload must contain a 'file' part".to_owned()))?;

    let filename = part
        .filename()
        .map(|name| name.to_owned())
        .ok_or_else(|| AppError::Validation("Upload has no file name".to_owned()))?;

    let bytes = part
        .stream()
        .try_fold(Vec::new(), |mut acc, mut buf| async move {
            acc.extend_from_slice(&buf.copy_to_bytes(buf.remaining()));
            Ok(acc)
        })
        .await
        .map_err(|e| AppError::Validation(format!("Failed to read upload: {}", e)))?;

    Ok((filename, bytes))
}

/// Stores a validated upload: the previous file (if any) is removed first,
/// then the single artwork record is written in place.
async fn store_upload(
    services: &Services,
    user: &SessionUser,
    filename: &str,
    bytes: &[u8],
) -> Result<serde_json::Value, AppError> {
    let extension = ArtworkStore::validate_upload(filename, bytes.len())?;

    if let Some(existing) = services.db.get_artwork(&user.snowflake).await? {
        services.artworks.delete(&existing.image_path).await?;
    }

    let path = services.artworks.path_for(&user.snowflake, &extension);
    services.artworks.write(&path, bytes).await?;

    let record = Artwork {
        created_by: user.snowflake.clone(),
        image_path: path.display().to_string(),
        created_at: unix_now(),
    };
    services.db.upsert_artwork(&record).await?;

    services.sink.info(format!(
        "User {} ({}) uploaded artwork to {}",
        user.username, user.snowflake, record.image_path
    ));

    Ok(message("Artwork uploaded"))
}

pub async fn my_artwork(
    identity: RequestIdentity,
    services: Services,
) -> Result<warp::reply::Response, Infallible> {
    match my_artwork_inner(&identity, &services).await {
        Ok(response) => Ok(response),
        Err(e) => Ok(error_reply(&e).into_response()),
    }
}

async fn my_artwork_inner(
    identity: &RequestIdentity,
    services: &Services,
) -> Result<warp::reply::Response, AppError> {
    let user = gate::check(
        gate::EXCHANGE,
        &gate_request("artwork self-view", identity, services),
    )
    .await?;

    serve_artwork(services, &user.snowflake, "You have not uploaded artwork yet").await
}

pub async fn partner_artwork(
    identity: RequestIdentity,
    services: Services,
) -> Result<warp::reply::Response, Infallible> {
    match partner_artwork_inner(&identity, &services).await {
        Ok(response) => Ok(response),
        Err(e) => Ok(error_reply(&e).into_response()),
    }
}

async fn partner_artwork_inner(
    identity: &RequestIdentity,
    services: &Services,
) -> Result<warp::reply::Response, AppError> {
    let user = gate::check(
        gate::EXCHANGE,
        &gate_request("partner artwork view", identity, services),
    )
    .await?;

    let partner_snowflake = partner_snowflake_of(&user, services).await?;
    serve_artwork(
        services,
        &partner_snowflake,
        "Your partner has not uploaded artwork yet",
    )
    .await
}

async fn serve_artwork(
    services: &Services,
    snowflake: &str,
    missing: &str,
) -> Result<warp::reply::Response, AppError> {
    let record = services
        .db
        .get_artwork(snowflake)
        .await?
        .ok_or_else(|| AppError::NotFound(missing.to_owned()))?;

    let bytes = services.artworks.read(&record.image_path).await?;

    warp::http::Response::builder()
        .header(
            header::CONTENT_TYPE,
            ArtworkStore::content_type(&record.image_path),
        )
        .body(bytes)
        .map(|response| response.into_response())
        .map_err(|e| AppError::Internal(anyhow::Error::new(e)))
}

pub async fn countdown(
    identity: RequestIdentity,
    services: Services,
) -> Result<impl Reply, Infallible> {
    to_http_json(countdown_inner(&identity, &services).await)
}

async fn countdown_inner(
    identity: &RequestIdentity,
    services: &Services,
) -> Result<serde_json::Value, AppError> {
    gate::check(gate::MEMBER, &gate_request("countdown", identity, services)).await?;

    let settings = services.config.snapshot().await;
    Ok(json!({
        "countdown": Countdown::until(settings.start_time).to_string(),
        "started": settings.is_started,
    }))
}

pub async fn all_users(
    identity: RequestIdentity,
    services: Services,
) -> Result<impl Reply, Infallible> {
    to_http_json(all_users_inner(&identity, &services).await)
}

async fn all_users_inner(
    identity: &RequestIdentity,
    services: &Services,
) -> Result<Vec<Participant>, AppError> {
    gate::check(
        gate::ADMIN,
        &gate_request("list participants", identity, services),
    )
    .await?;
    Ok(services.db.get_all_participants().await?)
}

pub async fn start_event(
    identity: RequestIdentity,
    services: Services,
) -> Result<impl Reply, Infallible> {
    to_http_json(start_event_inner(&identity, &services).await)
}

async fn start_event_inner(
    identity: &RequestIdentity,
    services: &Services,
) -> Result<serde_json::Value, AppError> {
    let user = gate::check(gate::ADMIN, &gate_request("start", identity, services)).await?;

    let settings = services.config.snapshot().await;
    if settings.is_started {
        let by = settings
            .started_by
            .unwrap_or_else(|| "an unknown admin".to_owned());
        return Ok(message(format!("The event was already started by {}", by)));
    }

    let paired = pair_participants(&services.db, &services.sink).await?;

    // Marked only after the whole run has committed.
    services.config.mark_started(&user.username).await?;

    services.sink.info(format!(
        "Event started by {} ({}), {} participants paired",
        user.username, user.snowflake, paired
    ));

    Ok(message(format!(
        "Event started, {} participants paired",
        paired
    )))
}

pub async fn ban(
    snowflake: String,
    query: HashMap<String, String>,
    identity: RequestIdentity,
    services: Services,
) -> Result<impl Reply, Infallible> {
    to_http_json(ban_inner(&snowflake, query.get("reason").cloned(), &identity, &services).await)
}

async fn ban_inner(
    snowflake: &str,
    reason: Option<String>,
    identity: &RequestIdentity,
    services: &Services,
) -> Result<serde_json::Value, AppError> {
    let admin = gate::check(gate::ADMIN, &gate_request("ban", identity, services)).await?;

    if services.db.find_participant(snowflake).await?.is_none() {
        return Err(AppError::NotFound(format!("User ({}) not found", snowflake)));
    }

    if services.db.get_ban(snowflake).await?.is_some() {
        return Ok(message(format!("User ({}) is already banned", snowflake)));
    }

    let reason = reason.unwrap_or_else(|| DEFAULT_BAN_REASON.to_owned());
    services.db.ban_participant(snowflake, &reason).await?;

    services.sink.info(format!(
        "User ({}) banned by {} ({}): {}",
        snowflake, admin.username, admin.snowflake, reason
    ));

    Ok(message(format!("User ({}) has been banned", snowflake)))
}

pub async fn unban(
    snowflake: String,
    identity: RequestIdentity,
    services: Services,
) -> Result<impl Reply, Infallible> {
    to_http_json(unban_inner(&snowflake, &identity, &services).await)
}

async fn unban_inner(
    snowflake: &str,
    identity: &RequestIdentity,
    services: &Services,
) -> Result<serde_json::Value, AppError> {
    let admin = gate::check(gate::ADMIN, &gate_request("unban", identity, services)).await?;

    if services.db.find_participant(snowflake).await?.is_none() {
        return Err(AppError::NotFound(format!("User ({}) not found", snowflake)));
    }

    if services.db.get_ban(snowflake).await?.is_none() {
        return Ok(message(format!("User ({}) is not banned", snowflake)));
    }

    services.db.unban_participant(snowflake).await?;

    services.sink.info(format!(
        "User ({}) unbanned by {} ({})",
        snowflake, admin.username, admin.snowflake
    ));

    Ok(message(format!("User ({}) has been unbanned", snowflake)))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::Rng;

    use super::*;
    use crate::core::db::tests::{answers, participant};
    use crate::core::db::EventDb;
    use crate::core::settings::{ConfigStore, Settings};
    use crate::integrations::discord::DiscordOAuth;
    use crate::logsink::LogSink;
    use crate::web::session::SessionStore;

    async fn services() -> Services {
        let mut settings = Settings::template();
        settings.admins = vec!["999".to_owned()];
        settings.artwork_dir = std::env::temp_dir().join(format!(
            "artswap_test_{}",
            rand::thread_rng().gen::<u64>()
        ));

        let artworks = Arc::new(crate::core::artwork::ArtworkStore::new(
            settings.artwork_dir.clone(),
        ));
        artworks.ensure_root().await.unwrap();

        let (sink, _task) = LogSink::start(64);
        Services {
            db: Arc::new(EventDb::open_in_memory().await.unwrap()),
            oauth: Arc::new(DiscordOAuth::new(&settings)),
            config: Arc::new(ConfigStore::ephemeral(settings)),
            sessions: Arc::new(SessionStore::new()),
            artworks,
            sink,
        }
    }

    fn identity(snowflake: &str) -> RequestIdentity {
        RequestIdentity {
            user: Some(SessionUser {
                snowflake: snowflake.to_owned(),
                username: format!("user_{}", snowflake),
                avatar_url: "https://cdn.example/a.png".to_owned(),
                access_token: "tok".to_owned(),
            }),
            remote: None,
        }
    }

    #[tokio::test]
    async fn test_join_twice_conflicts() {
        let services = services().await;
        services.db.upsert_answers("1", &answers("a")).await.unwrap();
        services.db.add_participant(&participant("1")).await.unwrap();

        let err = join_inner(&identity("1"), &services).await.unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }

    #[tokio::test]
    async fn test_answers_validation_blocks_write() {
        let services = services().await;
        let mut bad = answers("a");
        bad.food = String::new();

        let err = submit_answers_inner(&identity("1"), bad, &services)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(services.db.get_answers("1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_answers_resubmission_overwrites() {
        let services = services().await;
        submit_answers_inner(&identity("1"), answers("first"), &services)
            .await
            .unwrap();
        submit_answers_inner(&identity("1"), answers("second"), &services)
            .await
            .unwrap();

        assert_eq!(services.db.count_answers().await.unwrap(), 1);
        let stored = get_answers_inner(&identity("1"), &services).await.unwrap();
        assert_eq!(stored.colour, "colour second");
    }

    #[tokio::test]
    async fn test_partner_view() {
        let services = services().await;
        services.db.add_participant(&participant("1")).await.unwrap();
        services.db.add_participant(&participant("2")).await.unwrap();
        services.db.upsert_answers("2", &answers("theirs")).await.unwrap();
        services.db.set_partner("1", "2").await.unwrap();

        let view = partner_inner(&identity("1"), &services).await.unwrap();
        assert_eq!(view.details.snowflake, "2");
        assert_eq!(view.answers.game, "game theirs");
    }

    #[tokio::test]
    async fn test_ban_rules() {
        let services = services().await;
        let admin = identity("999");

        // Unknown participants cannot be banned.
        let err = ban_inner("42", None, &admin, &services).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");

        services.db.add_participant(&participant("42")).await.unwrap();

        ban_inner("42", None, &admin, &services).await.unwrap();
        let entry = services.db.get_ban("42").await.unwrap().unwrap();
        assert_eq!(entry.reason, DEFAULT_BAN_REASON);

        // Second ban is a no-op success, not a duplicate.
        let reply = ban_inner("42", Some("spam".to_owned()), &admin, &services)
            .await
            .unwrap();
        assert!(reply["message"].as_str().unwrap().contains("already banned"));
        assert_eq!(
            services.db.get_ban("42").await.unwrap().unwrap().reason,
            DEFAULT_BAN_REASON
        );

        unban_inner("42", &admin, &services).await.unwrap();
        // Unbanning again is also a no-op success.
        let reply = unban_inner("42", &admin, &services).await.unwrap();
        assert!(reply["message"].as_str().unwrap().contains("not banned"));
    }

    #[tokio::test]
    async fn test_ban_requires_admin() {
        let services = services().await;
        services.db.add_participant(&participant("42")).await.unwrap();

        let err = ban_inner("42", None, &identity("1"), &services)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "forbidden");
    }

    #[tokio::test]
    async fn test_start_pairs_once() {
        let services = services().await;
        for i in 1..=4 {
            services
                .db
                .add_participant(&participant(&i.to_string()))
                .await
                .unwrap();
        }

        let reply = start_event_inner(&identity("999"), &services).await.unwrap();
        assert!(reply["message"].as_str().unwrap().contains("4"));

        let paired: Vec<_> = services.db.get_all_participants().await.unwrap();
        assert!(paired.iter().all(|p| p.partner.is_some()));

        // A second trigger reports the original starter and changes nothing.
        let before: Vec<_> = paired.iter().map(|p| p.partner.clone()).collect();
        let reply = start_event_inner(&identity("999"), &services).await.unwrap();
        assert!(reply["message"]
            .as_str()
            .unwrap()
            .contains("already started by user_999"));

        let after: Vec<_> = services
            .db
            .get_all_participants()
            .await
            .unwrap()
            .iter()
            .map(|p| p.partner.clone())
            .collect();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_upload_replaces_previous_file() {
        let services = services().await;
        services.db.add_participant(&participant("1")).await.unwrap();
        let user = identity("1").user.unwrap();

        store_upload(&services, &user, "first.png", b"png bytes")
            .await
            .unwrap();
        let first = services.db.get_artwork("1").await.unwrap().unwrap();
        assert!(tokio::fs::metadata(&first.image_path).await.is_ok());

        store_upload(&services, &user, "second.gif", b"gif bytes")
            .await
            .unwrap();
        let second = services.db.get_artwork("1").await.unwrap().unwrap();

        assert_eq!(services.db.count_artwork().await.unwrap(), 1);
        assert!(second.image_path.ends_with("1.gif"));
        // The old file is gone, the new one is readable.
        assert!(tokio::fs::metadata(&first.image_path).await.is_err());
        assert_eq!(
            services.artworks.read(&second.image_path).await.unwrap(),
            b"gif bytes"
        );
    }

    #[tokio::test]
    async fn test_upload_rejects_bad_extension() {
        let services = services().await;
        let user = identity("1").user.unwrap();

        let err = store_upload(&services, &user, "malware.exe", b"boom")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(services.db.get_artwork("1").await.unwrap().is_none());
    }
}
