//! Buffered multipart form reader

use axum::{
    async_trait,
    extract::{FromRequest, Multipart, Request},
};
use std::collections::HashMap;
use std::str::FromStr;

use crate::error::{ApiError, ApiResult};
use crate::storage::{UploadedFile, MAX_FILE_SIZE};

/// A multipart body read fully into text fields and files
#[derive(Debug, Default)]
pub struct MultipartForm {
    fields: HashMap<String, String>,
    files: HashMap<String, UploadedFile>,
}

impl MultipartForm {
    pub async fn read(mut multipart: Multipart) -> ApiResult<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let content_type = field.content_type().map(str::to_string);
                    let bytes = field.bytes().await?;
                    if bytes.len() > MAX_FILE_SIZE {
                        return Err(ApiError::Validation(format!(
                            "File too large. Maximum size is {}MB",
                            MAX_FILE_SIZE / 1024 / 1024
                        )));
                    }
                    form.files.insert(
                        name,
                        UploadedFile {
                            file_name,
                            content_type,
                            bytes: bytes.to_vec(),
                        },
                    );
                }
                None => {
                    form.fields.insert(name, field.text().await?);
                }
            }
        }

        Ok(form)
    }

    /// Non-blank text field
    pub fn text(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    pub fn require<T>(&self, name: &str) -> ApiResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.parse(name)?
            .ok_or_else(|| ApiError::MissingField(format!("{} is required", name)))
    }

    pub fn parse<T>(&self, name: &str) -> ApiResult<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.text(name)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|e| ApiError::Validation(format!("Invalid {}: {}", name, e)))
            })
            .transpose()
    }

    pub fn take_file(&mut self, name: &str) -> ApiResult<UploadedFile> {
        self.files
            .remove(name)
            .ok_or_else(|| ApiError::MissingField(format!("{} file is required", name)))
    }
}

#[async_trait]
impl<S> FromRequest<S> for MultipartForm
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let multipart = Multipart::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::Validation(rejection.body_text()))?;
        Self::read(multipart).await
    }
}
