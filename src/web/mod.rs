use std::convert::Infallible;

use filters::api_filters;
use warp::{http::Method, reject::Rejection, Filter};

use crate::Services;

pub mod filters;
pub mod gate;
pub mod handlers;
pub mod session;

async fn handle_rejection(err: Rejection) -> Result<impl warp::Reply, Infallible> {
    let (code, kind, msg) = if err.is_not_found() {
        (
            warp::http::StatusCode::NOT_FOUND,
            "not_found",
            "Not Found".to_string(),
        )
    } else if let Some(err) = err.find::<warp::filters::body::BodyDeserializeError>() {
        log::error!("{}", err);
        (
            warp::http::StatusCode::BAD_REQUEST,
            "validation",
            err.to_string(),
        )
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (
            warp::http::StatusCode::PAYLOAD_TOO_LARGE,
            "validation",
            "Payload too large".to_string(),
        )
    } else if let Some(err) = err.find::<warp::reject::MethodNotAllowed>() {
        log::error!("Method Not Allowed: {}", err);
        (
            warp::http::StatusCode::METHOD_NOT_ALLOWED,
            "method_not_allowed",
            err.to_string(),
        )
    } else if let Some(err) = err.find::<warp::reject::InvalidQuery>() {
        log::error!("Invalid Query: {}", err);
        (
            warp::http::StatusCode::BAD_REQUEST,
            "validation",
            err.to_string(),
        )
    } else {
        log::error!("Unhandled Rejection: {:?}", err);
        (
            warp::http::StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            "Internal Server Error".to_string(),
        )
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&serde_json::json!({ "kind": kind, "message": msg })),
        code,
    ))
}

pub async fn run_http_server(services: Services) -> anyhow::Result<()> {
    let cors = warp::cors()
        .allow_any_origin()
        .allow_headers(vec![
            "User-Agent",
            "Sec-Fetch-Mode",
            "Referer",
            "Origin",
            "Content-Type",
            "Access-Control-Allow-Origin",
            "Access-Control-Request-Method",
            "Access-Control-Request-Headers",
            "Access-Control-Allow-Headers",
        ])
        .allow_methods(&[Method::GET, Method::POST, Method::OPTIONS]);

    let port = services.config.snapshot().await.web_port.unwrap_or(8080);
    let routes = api_filters(services).recover(handle_rejection);

    warp::serve(routes.with(cors)).run(([0, 0, 0, 0], port)).await;

    Ok(())
}
