#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

mod api;
mod spa;
mod ws;

use std::env;

use actix_cors::Cors;
use actix_web::{http, middleware, web, App, HttpServer};
use log::info;
use tokio::{task::spawn, try_join};

use crate::ws::server::ChatServer;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();

    let service_port = {
        let args: Vec<String> = env::args().collect();

        if args.len() > 1 {
            args[1].parse::<u16>().unwrap()
        } else {
            8000
        }
    };

    let static_dir = env::var("STATIC_DIR").unwrap_or_else(|_| String::from("public"));

    let (chat_server, server_tx) = ChatServer::new();
    let chat_server = spawn(chat_server.run());

    let app = move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET", "POST"])
            .allowed_headers(vec![http::header::AUTHORIZATION, http::header::ACCEPT])
            .allowed_header(http::header::CONTENT_TYPE)
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(middleware::Compress::default())
            .app_data(web::Data::new(server_tx.clone()))
            .service(api::health_endpoint)
            .service(api::get_messages_endpoint)
            .service(api::send_message_endpoint)
            .service(ws::api::websocket)
            // the SPA fallback matches everything, so it goes last
            .service(spa::spa(&static_dir))
    };

    let http_server = HttpServer::new(app).bind(("0.0.0.0", service_port))?.run();

    info!("http server started on port {service_port}");

    try_join!(http_server, async move { chat_server.await.unwrap() })?;

    Ok(())
}
