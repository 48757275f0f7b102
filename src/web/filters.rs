use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;

use warp::{reject::Rejection, Filter};

use crate::core::artwork::MAX_UPLOAD_BYTES;
use crate::web::handlers;
use crate::web::session::{RequestIdentity, SESSION_COOKIE};
use crate::Services;

/// Slack on top of the payload ceiling for multipart framing; the real
/// limit is enforced on the decoded bytes.
const UPLOAD_FORM_LIMIT: u64 = (MAX_UPLOAD_BYTES + 1024 * 1024) as u64;

const ANSWERS_BODY_LIMIT: u64 = 16 * 1024;

pub fn with_services(
    services: Services,
) -> impl Filter<Extract = (Services,), Error = Infallible> + Clone {
    warp::any().map(move || services.clone())
}

/// Resolves the session cookie to a user (when present) and captures the
/// peer address for the gate's audit logging.
pub fn request_identity(
    services: &Services,
) -> impl Filter<Extract = (RequestIdentity,), Error = Infallible> + Clone {
    let sessions = services.sessions.clone();
    warp::cookie::optional::<String>(SESSION_COOKIE)
        .and(warp::addr::remote())
        .map(
            move |token: Option<String>, remote: Option<SocketAddr>| RequestIdentity {
                user: token.and_then(|token| sessions.get(&token)),
                remote,
            },
        )
}

fn auth_filters(
    services: Services,
) -> impl Filter<Extract = (impl warp::Reply,), Error = Rejection> + Clone {
    let login = warp::path::end()
        .and(warp::get())
        .and(with_services(services.clone()))
        .and_then(handlers::login);

    let callback = warp::path!("callback")
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .and(with_services(services))
        .and_then(handlers::callback);

    login.or(callback)
}

fn user_filters(
    services: Services,
) -> impl Filter<Extract = (impl warp::Reply,), Error = Rejection> + Clone {
    let me = warp::path!("users" / "me")
        .and(warp::get())
        .and(request_identity(&services))
        .and(with_services(services.clone()))
        .and_then(handlers::me);

    let join = warp::path!("users" / "join")
        .and(warp::get())
        .and(request_identity(&services))
        .and(with_services(services.clone()))
        .and_then(handlers::join);

    let partner = warp::path!("users" / "partner")
        .and(warp::get())
        .and(request_identity(&services))
        .and(with_services(services.clone()))
        .and_then(handlers::partner);

    let all_users = warp::path!("users" / "all")
        .and(warp::get())
        .and(request_identity(&services))
        .and(with_services(services))
        .and_then(handlers::all_users);

    me.or(join).or(partner).or(all_users)
}

fn answer_filters(
    services: Services,
) -> impl Filter<Extract = (impl warp::Reply,), Error = Rejection> + Clone {
    let submit = warp::path!("answers")
        .and(warp::post())
        .and(request_identity(&services))
        .and(warp::body::content_length_limit(ANSWERS_BODY_LIMIT))
        .and(warp::body::json())
        .and(with_services(services.clone()))
        .and_then(handlers::submit_answers);

    let read = warp::path!("answers")
        .and(warp::get())
        .and(request_identity(&services))
        .and(with_services(services))
        .and_then(handlers::get_answers);

    submit.or(read)
}

fn artwork_filters(
    services: Services,
) -> impl Filter<Extract = (impl warp::Reply,), Error = Rejection> + Clone {
    let upload = warp::path!("artwork")
        .and(warp::post())
        .and(request_identity(&services))
        .and(warp::multipart::form().max_length(UPLOAD_FORM_LIMIT))
        .and(with_services(services.clone()))
        .and_then(handlers::upload_artwork);

    let mine = warp::path!("artwork" / "me")
        .and(warp::get())
        .and(request_identity(&services))
        .and(with_services(services.clone()))
        .and_then(handlers::my_artwork);

    let partners = warp::path!("artwork" / "partner")
        .and(warp::get())
        .and(request_identity(&services))
        .and(with_services(services))
        .and_then(handlers::partner_artwork);

    upload.or(mine).or(partners)
}

fn event_filters(
    services: Services,
) -> impl Filter<Extract = (impl warp::Reply,), Error = Rejection> + Clone {
    let countdown = warp::path!("event" / "countdown")
        .and(warp::get())
        .and(request_identity(&services))
        .and(with_services(services.clone()))
        .and_then(handlers::countdown);

    let start = warp::path!("event" / "start")
        .and(warp::get())
        .and(request_identity(&services))
        .and(with_services(services))
        .and_then(handlers::start_event);

    countdown.or(start)
}

fn admin_filters(
    services: Services,
) -> impl Filter<Extract = (impl warp::Reply,), Error = Rejection> + Clone {
    let ban = warp::path!("ban" / String)
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .and(request_identity(&services))
        .and(with_services(services.clone()))
        .and_then(handlers::ban);

    let unban = warp::path!("unban" / String)
        .and(warp::get())
        .and(request_identity(&services))
        .and(with_services(services))
        .and_then(handlers::unban);

    ban.or(unban)
}

pub fn api_filters(
    services: Services,
) -> impl Filter<Extract = (impl warp::Reply,), Error = Rejection> + Clone {
    auth_filters(services.clone())
        .or(user_filters(services.clone()))
        .or(answer_filters(services.clone()))
        .or(artwork_filters(services.clone()))
        .or(event_filters(services.clone()))
        .or(admin_filters(services))
}
