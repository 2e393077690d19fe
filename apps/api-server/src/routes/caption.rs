use super::types::CaptionItem;
use crate::{error::ApiError, AppState};
use ai::{CaptionGenerationError, CaptionResult};
use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    http::StatusCode,
    Json,
};
use bytes::Bytes;
use caption_library::NewCaption;
use std::{path::Path, sync::Arc};

const ALLOWED_EXTENSIONS: [&str; 3] = [".jpg", ".jpeg", ".png"];

struct Upload {
    filename: String,
    data: Bytes,
}

/// Stores the upload, captions it, and records the result. The stored blob
/// is removed again if captioning fails.
pub async fn caption_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<CaptionItem>, ApiError> {
    let multipart = multipart
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {}", e.body_text())))?;
    let upload = read_image_field(multipart).await?;
    let ext = allowed_extension(&upload.filename)
        .ok_or_else(|| ApiError::BadRequest("Unsupported file type".to_string()))?;

    let stored_name = state.storage.write_unique(&ext, upload.data.clone()).await?;
    tracing::info!(
        original = %upload.filename,
        stored = %stored_name,
        size = upload.data.len(),
        "upload stored"
    );

    let captions = match generate(&state, upload.data).await {
        Ok(captions) => captions,
        Err(e) => {
            if let Err(remove_err) = state.storage.remove_file(&stored_name).await {
                tracing::warn!("failed to remove {}: {}", stored_name, remove_err);
            }
            return Err(e);
        }
    };

    let new_caption = NewCaption {
        image_filename: stored_name,
        short_caption: captions.short_text,
        long_caption: captions.long_text,
        confidence: Some(captions.confidence),
    };
    let library = Arc::clone(&state.library);
    let record = tokio::task::spawn_blocking(move || library.insert(new_caption))
        .await
        .map_err(|e| ApiError::Internal(format!("insert task failed: {e}")))??;

    Ok(Json(CaptionItem::from(record)))
}

async fn read_image_field(mut multipart: Multipart) -> Result<Upload, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some("image") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        if filename.is_empty() {
            return Err(ApiError::BadRequest("Empty filename".to_string()));
        }
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {e}")))?;
        return Ok(Upload { filename, data });
    }
    Err(ApiError::BadRequest("No image file provided".to_string()))
}

/// Lowercased extension with its dot, if it is one we accept.
fn allowed_extension(filename: &str) -> Option<String> {
    let ext = Path::new(filename).extension()?.to_str()?;
    let ext = format!(".{}", ext.to_lowercase());
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

async fn generate(state: &AppState, data: Bytes) -> Result<CaptionResult, ApiError> {
    let pending = state.ai.image_caption.process_single(data);
    match tokio::time::timeout(state.caption_timeout, pending).await {
        Ok(Ok(captions)) => Ok(captions),
        Ok(Err(e)) => {
            let status = match e.downcast_ref::<CaptionGenerationError>() {
                Some(err) if err.is_decode_error() => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            Err(ApiError::CaptionFailed {
                status,
                details: format!("{e:#}"),
            })
        }
        Err(_) => Err(ApiError::CaptionFailed {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            details: format!(
                "caption generation timed out after {}s",
                state.caption_timeout.as_secs_f32()
            ),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::allowed_extension;

    #[test]
    fn accepts_image_extensions_case_insensitively() {
        assert_eq!(allowed_extension("cat.JPG").as_deref(), Some(".jpg"));
        assert_eq!(allowed_extension("cat.jpeg").as_deref(), Some(".jpeg"));
        assert_eq!(allowed_extension("a.b.png").as_deref(), Some(".png"));
    }

    #[test]
    fn rejects_everything_else() {
        assert_eq!(allowed_extension("notes.txt"), None);
        assert_eq!(allowed_extension("png"), None);
        assert_eq!(allowed_extension(".png"), None);
        assert_eq!(allowed_extension("cat.gif"), None);
    }
}
