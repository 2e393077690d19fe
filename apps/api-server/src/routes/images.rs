use crate::{error::ApiError, AppState};
use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use storage::Storage;

pub async fn serve_image(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    if Storage::validate_file_name(&filename).is_err() {
        return Err(ApiError::BadRequest("Invalid filename".to_string()));
    }
    if !state.storage.is_exist(&filename).await? {
        return Err(ApiError::NotFound("Image not found".to_string()));
    }

    let data = state.storage.read(&filename).await?;
    let mime = mime_guess::from_path(&filename).first_or_octet_stream();

    Ok(([(header::CONTENT_TYPE, mime.to_string())], data.to_vec()).into_response())
}
