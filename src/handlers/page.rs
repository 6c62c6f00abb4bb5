use askama::Template;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use tracing::error;

use crate::formatter::ResultCard;
use crate::llm::media::UploadedImage;

pub struct ImageView {
    pub name: String,
    pub data_uri: String,
    pub width: u32,
    pub height: u32,
}

impl ImageView {
    pub fn from_upload(image: &UploadedImage) -> Self {
        Self {
            name: image.display_name().to_string(),
            data_uri: image.data_uri(),
            width: image.width,
            height: image.height,
        }
    }
}

#[derive(Template, Default)]
#[template(path = "index.html")]
pub struct PageTemplate {
    pub image: Option<ImageView>,
    pub cards: Vec<ResultCard>,
    pub analyzed: bool,
    pub error: Option<String>,
}

impl PageTemplate {
    pub fn with_error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_results(image: &UploadedImage, cards: Vec<ResultCard>) -> Self {
        Self {
            image: Some(ImageView::from_upload(image)),
            cards,
            analyzed: true,
            error: None,
        }
    }
}

pub fn render_page(status: StatusCode, page: PageTemplate) -> Response {
    match page.render() {
        Ok(html) => (status, Html(html)).into_response(),
        Err(err) => {
            error!("Failed to render page: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(format!("Template error: {}", err)),
            )
                .into_response()
        }
    }
}
