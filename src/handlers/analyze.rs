use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::Response;
use tracing::{error, info, warn};

use crate::formatter::split_into_cards;
use crate::handlers::page::{render_page, ImageView, PageTemplate};
use crate::llm::media::{decode_upload, UploadError};
use crate::state::AppState;
use crate::utils::timing::{complete_upload_timer, start_upload_timer};

const IMAGE_FIELD: &str = "image";

struct RawUpload {
    file_name: Option<String>,
    bytes: Vec<u8>,
}

async fn read_image_field(mut multipart: Multipart) -> Result<Option<RawUpload>, UploadError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| UploadError::Multipart(err.body_text()))?
    {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let file_name = field
            .file_name()
            .map(|name| name.to_string())
            .filter(|name| !name.trim().is_empty());
        let bytes = field
            .bytes()
            .await
            .map_err(|err| UploadError::Multipart(err.body_text()))?;
        // Browsers submit an empty part when no file was chosen.
        if bytes.is_empty() {
            return Ok(None);
        }
        return Ok(Some(RawUpload {
            file_name,
            bytes: bytes.to_vec(),
        }));
    }
    Ok(None)
}

fn upload_error_status(err: &UploadError) -> StatusCode {
    match err {
        UploadError::Unsupported(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        UploadError::Decode(_) | UploadError::Multipart(_) => StatusCode::BAD_REQUEST,
    }
}

fn upload_error_message(err: &UploadError) -> String {
    match err {
        UploadError::Unsupported(_) => "Please upload a JPEG or PNG image.".to_string(),
        UploadError::Decode(_) => "The uploaded file could not be read as an image.".to_string(),
        UploadError::Multipart(_) => "The upload could not be read. Please try again.".to_string(),
    }
}

/// GET / - Empty upload page.
pub async fn index() -> Response {
    render_page(StatusCode::OK, PageTemplate::default())
}

/// POST /analyze - Analyze one uploaded photograph and render the result cards.
pub async fn analyze(State(state): State<AppState>, multipart: Multipart) -> Response {
    let upload = match read_image_field(multipart).await {
        Ok(upload) => upload,
        Err(err) => {
            warn!("Failed to read upload: {err}");
            return render_page(
                upload_error_status(&err),
                PageTemplate::with_error(upload_error_message(&err)),
            );
        }
    };

    let Some(RawUpload { file_name, bytes }) = upload else {
        info!("Analyze requested without an image; nothing to do");
        return render_page(StatusCode::OK, PageTemplate::default());
    };

    let mut timer = start_upload_timer("/analyze", file_name.as_deref(), bytes.len());

    let image = match decode_upload(bytes, file_name) {
        Ok(image) => image,
        Err(err) => {
            warn!("Rejected upload: {err}");
            complete_upload_timer(&mut timer, "rejected", Some(err.to_string()));
            return render_page(
                upload_error_status(&err),
                PageTemplate::with_error(upload_error_message(&err)),
            );
        }
    };

    let text = match state.analyzer.analyze(&image).await {
        Ok(text) => text,
        Err(err) => {
            error!("Attribute analysis failed for {}: {err:#}", image.display_name());
            complete_upload_timer(&mut timer, "error", Some(err.to_string()));
            let page = PageTemplate {
                image: Some(ImageView::from_upload(&image)),
                error: Some("The analysis service failed. Please try again later.".to_string()),
                ..PageTemplate::default()
            };
            return render_page(StatusCode::BAD_GATEWAY, page);
        }
    };

    let cards = split_into_cards(&text);
    if cards.is_empty() {
        warn!(
            "Analysis of {} produced no cards ({} chars of text)",
            image.display_name(),
            text.len()
        );
    }
    complete_upload_timer(&mut timer, "success", Some(format!("cards={}", cards.len())));
    render_page(StatusCode::OK, PageTemplate::with_results(&image, cards))
}
