use std::collections::HashMap;

use actix_multipart::Multipart;
use actix_web::{web, Error, HttpResponse, Result};
use futures_util::StreamExt;
use tracing::Instrument;
use uuid::Uuid;

use crate::entrypoint::LazyHandler;
use crate::models::{HandlerContext, PayloadItem, PredictionResponse};

pub struct AppState {
    pub handler: &'static LazyHandler,
    pub context: HandlerContext,
}

pub async fn ping(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "Healthy",
        "initialized": state.handler.is_initialized(),
    }))
}

/// Multipart upload: every form field becomes a payload entry.
pub async fn predict(state: web::Data<AppState>, mut payload: Multipart) -> Result<HttpResponse, Error> {
    let mut item = PayloadItem::new();

    while let Some(field) = payload.next().await {
        let mut field = field?;
        let name = field
            .content_disposition()
            .get_name()
            .unwrap_or("data")
            .to_string();

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            bytes.extend_from_slice(&chunk?);
        }
        item.insert(name, bytes);
    }

    run(state, item).await
}

/// Raw request body, exposed to the service under the `body` key.
pub async fn predict_raw(state: web::Data<AppState>, body: web::Bytes) -> Result<HttpResponse, Error> {
    let item: PayloadItem = HashMap::from([("body".to_string(), body.to_vec())]);
    run(state, item).await
}

async fn run(state: web::Data<AppState>, item: PayloadItem) -> Result<HttpResponse, Error> {
    let request_id = Uuid::new_v4();
    let model_name = state.context.model_name().to_string();
    let span = tracing::info_span!("predict", %request_id, model = %model_name);

    async move {
        let keys: Vec<&String> = item.keys().collect();
        tracing::debug!(?keys, "received payload");

        let handler = state.handler;
        let result = web::block(move || handler.handle(Some(std::slice::from_ref(&item)), &state.context)).await?;

        let predictions = match result {
            Ok(Some(predictions)) => predictions,
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "prediction failed");
                return Err(e.into());
            }
        };

        if let Some(top) = predictions.first().and_then(|row| row.first()) {
            tracing::info!(class = %top.class, probability = top.probability, "predicted");
        }

        Ok(HttpResponse::Ok().json(PredictionResponse {
            request_id: request_id.to_string(),
            model_name,
            predictions,
        }))
    }
    .instrument(span)
    .await
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/ping").route(web::get().to(ping)))
        .service(web::resource("/predict").route(web::post().to(predict)))
        .service(web::resource("/predict/raw").route(web::post().to(predict_raw)));
}
