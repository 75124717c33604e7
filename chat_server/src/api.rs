use actix_web::error::ErrorInternalServerError;
use actix_web::web::{self, Json};
use actix_web::{route, HttpResponse, Result};
use chatterbox_chat::models::{ApiMessagesResponse, ChatPayload};
use log::info;
use rand::Rng as _;
use serde_json::{json, Value};

use crate::ws::server::ChatServerHandle;

/// Usernames assigned to messages submitted through the HTTP API.
const USERNAMES: [&str; 9] = [
    "Unyil", "Cuplis", "Pak Ogah", "Cloud", "Tifa", "Aerith", "Kiriyama", "Hinata", "Akari",
];

fn random_username() -> &'static str {
    USERNAMES[rand::rng().random_range(0..USERNAMES.len())]
}

#[route("/health", method = "GET")]
pub async fn health_endpoint() -> Result<Json<Value>> {
    info!("Healthy");
    Ok(Json(json!({"healthy": true})))
}

#[route("/api/messages", method = "GET")]
pub async fn get_messages_endpoint(
    chat_server: web::Data<ChatServerHandle>,
) -> Result<Json<ApiMessagesResponse>> {
    let messages = chat_server
        .history()
        .await
        .map_err(ErrorInternalServerError)?;

    Ok(Json(ApiMessagesResponse::success(messages)))
}

#[route("/api/messages", method = "POST")]
pub async fn send_message_endpoint(
    body: web::Bytes,
    chat_server: web::Data<ChatServerHandle>,
) -> Result<HttpResponse> {
    let payload = match serde_json::from_slice::<ChatPayload>(&body) {
        Ok(payload) => payload,
        Err(err) => {
            return Ok(
                HttpResponse::BadRequest().json(ApiMessagesResponse::bad_request(err.to_string()))
            );
        }
    };

    let accepted = chat_server
        .send_chat(random_username(), payload.message)
        .await
        .map_err(ErrorInternalServerError)?;

    Ok(HttpResponse::Ok().json(ApiMessagesResponse::success(vec![accepted])))
}
