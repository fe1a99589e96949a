use actix_web::{web, HttpResponse};
use serde::Deserialize;

use super::super::config::DEFAULT_BLOCKS_LIMIT;
use super::super::database::CursorStore;
use super::super::error::ScanError;
use super::super::AppState;

#[derive(Debug, Deserialize)]
pub struct SyncParams {
    pub force: Option<bool>,
    pub limit: Option<u64>,
}

#[actix_web::get("/chains/{key}")]
pub async fn get_chain(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    let key = path.into_inner();
    let cursor = state
        .store
        .get_cursor(&key)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    match cursor {
        Some(cursor) => Ok(HttpResponse::Ok().json(cursor)),
        None => Ok(HttpResponse::NotFound().body("Blockchain not found")),
    }
}

#[actix_web::get("/deposits/{txid}")]
pub async fn get_deposits(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    let txid = path.into_inner().to_lowercase();
    let deposits = state
        .store
        .deposits_by_txid(&txid)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    if deposits.is_empty() {
        return Ok(HttpResponse::NotFound().body("Deposit not found"));
    }
    Ok(HttpResponse::Ok().json(deposits))
}

// Runs one scan of a chain on demand; `force=true` bypasses the no-new-blocks guard
#[actix_web::post("/chains/{key}/sync")]
pub async fn sync_chain(
    path: web::Path<String>,
    query: web::Query<SyncParams>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    let key = path.into_inner();
    let syncer = match state.syncers.get(&key) {
        Some(syncer) => syncer.clone(),
        None => return Ok(HttpResponse::NotFound().body("Blockchain not found")),
    };

    let limit = query.limit.unwrap_or(DEFAULT_BLOCKS_LIMIT).max(1);
    match syncer.process_chain(limit, query.force.unwrap_or(false)).await {
        Ok(report) => Ok(HttpResponse::Ok().json(report)),
        Err(ScanError::ScanInProgress(_)) => Ok(HttpResponse::Conflict().body("Synchronization already running")),
        Err(e) => Err(actix_web::error::ErrorBadGateway(e)),
    }
}
