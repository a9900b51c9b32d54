use std::sync::Arc;
use std::time::Duration;

use actix_web::web::{self, PayloadConfig};
use actix_web::{App, HttpRequest, HttpResponse, HttpServer};
use anyhow::{Context, Result};
use log::{info, warn};
use openssl::ssl::SslAcceptorBuilder;
use sd_notify::NotifyState;

use super::endpoints::{self, EndpointContext, Pipeline};
use super::response::{EndpointError, Response};

pub struct RestfulServer {
    ssl: Option<SslAcceptorBuilder>,
    ctx: Arc<EndpointContext>,
    pipeline: Arc<Pipeline>,

    keep_alive_secs: Option<u64>,
    workers: Option<u64>,

    bind: String,

    payload_limit_mib: usize,
}

impl RestfulServer {
    pub fn new(
        bind: String,
        ssl: Option<SslAcceptorBuilder>,
        ctx: Arc<EndpointContext>,
        pipeline: Arc<Pipeline>,
        payload_limit_mib: usize,
    ) -> Self {
        Self {
            ssl,
            ctx,
            pipeline,
            keep_alive_secs: None,
            workers: None,
            bind,
            payload_limit_mib,
        }
    }

    pub fn set_keep_alive_secs(&mut self, keep_alive_secs: u64) {
        self.keep_alive_secs = Some(keep_alive_secs);
    }

    pub fn set_workers(&mut self, workers: u64) {
        self.workers = Some(workers);
    }

    pub async fn run(mut self) -> Result<()> {
        let ctx = self.ctx.clone();
        let pipeline = self.pipeline.clone();
        let payload_limit = self.payload_limit_mib * 1024 * 1024;
        let mut srv = HttpServer::new(move || {
            App::new()
                .app_data(PayloadConfig::new(payload_limit))
                .configure(|cfg| endpoints::configure(cfg, &ctx, &pipeline))
                .default_service(web::route().to(Self::default_handler))
        });

        if let Some(ssl) = self.ssl.take() {
            info!("Binding to https://{}", self.bind);
            srv = srv.bind_openssl(&self.bind, ssl).context("bind with ssl")?
        } else {
            warn!("Using HTTP (without SSL). THIS IS DANGEROUS, DO NOT USE IN PRODUCTION");
            info!("Binding to http://{}", self.bind);
            srv = srv.bind(&self.bind).context("bind without ssl")?
        };

        if let Some(keep_alive) = self.keep_alive_secs {
            srv = srv.keep_alive(Duration::from_secs(keep_alive));
        }
        if let Some(workers) = self.workers {
            srv = srv.workers(workers as usize);
        }

        sd_notify::notify(true, &[NotifyState::Ready]).context("notify systemd")?;
        info!("Starting restful server");
        srv.run().await.context("run server")?;

        info!("Server stopped by user");
        Ok(())
    }

    async fn default_handler(req: HttpRequest) -> HttpResponse {
        let message = format!("No route to {} {}", req.method(), req.path());
        Response::from(EndpointError::not_found(message)).into()
    }
}

#[cfg(test)]
mod tests {
    use actix_web::http::StatusCode;
    use actix_web::test;
    use serde_json::json;

    use crate::server::endpoints::tests::{pipeline, read_json, setup};

    use super::*;

    #[actix_web::test]
    async fn test_routes() {
        let ctx = setup().await;
        let pipeline = pipeline(&ctx);
        let app = test::init_service(
            App::new()
                .configure(|cfg| endpoints::configure(cfg, &ctx, &pipeline))
                .default_service(web::route().to(RestfulServer::default_handler)),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/v1/health").to_request();
        let (status, body) = read_json(test::call_service(&app, req).await).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"ok": true}));

        let req = test::TestRequest::get().uri("/api/v1/nothing").to_request();
        let (status, body) = read_json(test::call_service(&app, req).await).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "No route to GET /api/v1/nothing"}));

        // GET and POST share the path but stay separate endpoints.
        let req = test::TestRequest::get().uri("/api/v1/deal").to_request();
        let (status, _) = read_json(test::call_service(&app, req).await).await;
        assert_eq!(status, StatusCode::OK);

        let req = test::TestRequest::delete().uri("/api/v1/deal").to_request();
        let (status, _) = read_json(test::call_service(&app, req).await).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
