use axum::{body::Bytes, extract::Multipart};
use uuid::Uuid;

use crate::error::AppError;

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug)]
pub struct ImageUpload {
    pub bytes: Bytes,
    pub content_type: String,
}

impl ImageUpload {
    /// Fresh object key under `prefix`, e.g. `posts/<uuid>.jpg`.
    pub fn object_key(&self, prefix: &str) -> String {
        let ext = image_extension(&self.content_type).unwrap_or("bin");
        format!("{}/{}.{}", prefix, Uuid::new_v4(), ext)
    }
}

/// Fields of the `POST /posts` multipart form.
#[derive(Debug, Default)]
pub struct PostForm {
    pub description: Option<String>,
    pub image: Option<ImageUpload>,
}

pub fn image_extension(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

pub async fn read_post_form(mut multipart: Multipart) -> Result<PostForm, AppError> {
    let mut form = PostForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        match field.name() {
            Some("description") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.body_text()))?;
                let text = text.trim();
                if !text.is_empty() {
                    form.description = Some(text.to_string());
                }
            }
            Some("image") => {
                let content_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.body_text()))?;
                form.image = Some(check_image(content_type, bytes)?);
            }
            _ => {}
        }
    }

    Ok(form)
}

pub async fn read_image(mut multipart: Multipart) -> Result<ImageUpload, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        if field.name() == Some("image") {
            let content_type = field.content_type().unwrap_or_default().to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            return check_image(content_type, bytes);
        }
    }

    Err(AppError::BadRequest("Please upload an image".to_string()))
}

fn check_image(content_type: String, bytes: Bytes) -> Result<ImageUpload, AppError> {
    if image_extension(&content_type).is_none() {
        return Err(AppError::BadRequest(
            "Only jpeg, png, gif and webp images are accepted".to_string(),
        ));
    }
    if bytes.is_empty() {
        return Err(AppError::BadRequest("Image is empty".to_string()));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(AppError::BadRequest("Image must be at most 5 MiB".to_string()));
    }
    Ok(ImageUpload {
        bytes,
        content_type,
    })
}
