//! Database-backed file storage for barber photos and other small assets.
//! Uploads land in the `stored_files` table; downloads stream straight back
//! out with the original content type.

use actix_multipart::Multipart;
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use futures_util::TryStreamExt;
use sqlx::SqlitePool;

use crate::auth::{identify, new_id};
use crate::error::{ApiError, ApiResult};
use crate::models::StoredFileRow;
use crate::policy::{self, Action, Resource};
use crate::state::AppState;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/uploads").route(web::post().to(upload)))
        .service(web::resource("/api/files/{id}").route(web::get().to(download)));
}

async fn upload(
    req: HttpRequest,
    state: web::Data<AppState>,
    mut payload: Multipart,
) -> ApiResult<HttpResponse> {
    let auth = identify(&req, &state.db).await?;
    policy::authorize(Some(&auth), Resource::Uploads, Action::Create)?;

    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|_| ApiError::Validation("Invalid multipart payload".into()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .unwrap_or("upload")
            .to_string();
        let content_type = field
            .content_type()
            .map(|mime| mime.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let mut data = Vec::new();
        while let Some(chunk) = field
            .try_next()
            .await
            .map_err(|_| ApiError::Validation("Invalid multipart payload".into()))?
        {
            data.extend_from_slice(&chunk);
        }
        if data.is_empty() {
            return Err(ApiError::Validation("Uploaded file is empty".into()));
        }

        let stored = save_file(&state.db, &file_name, &content_type, data).await?;
        return Ok(HttpResponse::Ok().json(serde_json::json!({
            "url": format!("/api/files/{}", stored.id),
        })));
    }

    Err(ApiError::Validation(
        "Multipart request has no \"file\" part".into(),
    ))
}

async fn download(state: web::Data<AppState>, path: web::Path<String>) -> ApiResult<HttpResponse> {
    let file = load_file(&state.db, &path.into_inner())
        .await?
        .ok_or(ApiError::NotFound("File"))?;

    Ok(HttpResponse::Ok()
        .content_type(file.content_type)
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("inline; filename=\"{}\"", file.file_name),
        ))
        .body(file.data))
}

pub async fn save_file(
    pool: &SqlitePool,
    file_name: &str,
    content_type: &str,
    data: Vec<u8>,
) -> Result<StoredFileRow, sqlx::Error> {
    let id = new_id();
    sqlx::query(
        "INSERT INTO stored_files (id, file_name, content_type, data, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(file_name)
    .bind(content_type)
    .bind(&data)
    .bind(Utc::now().naive_utc())
    .execute(pool)
    .await?;

    Ok(StoredFileRow {
        id,
        file_name: file_name.to_string(),
        content_type: content_type.to_string(),
        data,
    })
}

pub async fn load_file(pool: &SqlitePool, id: &str) -> Result<Option<StoredFileRow>, sqlx::Error> {
    sqlx::query_as::<_, StoredFileRow>(
        "SELECT id, file_name, content_type, data FROM stored_files WHERE id = ? LIMIT 1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[actix_web::test]
    async fn stored_file_round_trips_content_type_and_bytes() {
        let pool = test_pool().await;
        let stored = save_file(&pool, "luis.png", "image/png", vec![0x89, 0x50, 0x4e, 0x47])
            .await
            .unwrap();

        let loaded = load_file(&pool, &stored.id).await.unwrap().unwrap();
        assert_eq!(loaded.file_name, "luis.png");
        assert_eq!(loaded.content_type, "image/png");
        assert_eq!(loaded.data, vec![0x89, 0x50, 0x4e, 0x47]);
    }

    #[actix_web::test]
    async fn unknown_file_is_none() {
        let pool = test_pool().await;
        assert!(load_file(&pool, "ghost").await.unwrap().is_none());
    }
}
