use actix_web::{get, web, HttpRequest, HttpResponse, Result};
use tokio::task::spawn_local;

use crate::ws::{handler, server::ChatServerHandle};

#[get("/ws")]
pub async fn websocket(
    req: HttpRequest,
    stream: web::Payload,
    chat_server: web::Data<ChatServerHandle>,
) -> Result<HttpResponse> {
    let (res, session, msg_stream) = actix_ws::handle(&req, stream)?;

    // spawn websocket handler (and don't await it) so that the response is returned immediately
    spawn_local(handler::chat_ws(
        (**chat_server).clone(),
        session,
        msg_stream,
    ));

    Ok(res)
}
