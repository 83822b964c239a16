//! Inbound HTTP API.
//!
//! `GET /v1/stats/{date}` serves the daily stats JSON, `/health` answers a
//! liveness probe, and the configured public directory is served at the root
//! for the bundled frontend.

use crate::config::Config;
use crate::stats::Aggregator;
use actix_files::Files;
use actix_web::{App, HttpResponse, HttpServer, web};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "station_tracker",
    }))
}

async fn get_stats(aggregator: web::Data<Aggregator>, path: web::Path<String>) -> HttpResponse {
    let date_key = path.into_inner();
    if date_key.len() != 8 || !date_key.bytes().all(|b| b.is_ascii_digit()) {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "date must be an 8-digit YYYYMMDD key",
        }));
    }

    match aggregator.stats_for_date(&date_key).await {
        Ok(body) => HttpResponse::Ok()
            .content_type("application/json")
            .body(body),
        Err(error) => {
            error!(date = %date_key, error = %error, "Stats request failed");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": error.to_string(),
            }))
        }
    }
}

pub async fn run(config: Config, aggregator: Arc<Aggregator>) -> std::io::Result<()> {
    let state = web::Data::from(aggregator);
    let public_dir = config.public_dir.clone();

    info!(port = config.port, "Starting HTTP server");
    HttpServer::new(move || {
        let mut app = App::new()
            .app_data(state.clone())
            .route("/health", web::get().to(health))
            .route("/v1/stats/{date}", web::get().to(get_stats));
        if Path::new(&public_dir).is_dir() {
            app = app.service(Files::new("/", &public_dir).index_file("index.html"));
        }
        app
    })
    .bind(("0.0.0.0", config.port))?
    .run()
    .await
}
