//! Multipart image upload
//!
//! Images bypass the socket: they are POSTed to the instance's pictrs
//! endpoint over plain HTTP(S) with the auth token as a `jwt` cookie.

use linkwire_core::{codec, Error, ErrorEnvelope, Result};
use reqwest::header::COOKIE;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;

/// Multipart field name the pictrs endpoint expects
pub const IMAGE_FIELD: &str = "images[]";

#[derive(Clone, Default)]
pub(crate) struct Uploader {
    http: reqwest::Client,
}

impl Uploader {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// POST `bytes` as a single multipart file to `url`
    pub(crate) async fn upload<R: DeserializeOwned>(
        &self,
        url: &str,
        auth: Option<&str>,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<R> {
        let size = bytes.len();
        let part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(mime_for(filename))
            .map_err(|e| Error::Internal(format!("failed to build multipart: {}", e)))?;
        let form = Form::new().part(IMAGE_FIELD, part);

        let mut request = self.http.post(url).multipart(form);
        if let Some(token) = auth {
            request = request.header(COOKIE, format!("jwt={}", token));
        }

        tracing::debug!(url, filename, size, "Uploading file");
        let response = request
            .send()
            .await
            .map_err(|e| Error::Transport(format!("upload failed: {}", e)))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Transport(format!("upload body unreadable: {}", e)))?;

        if status.is_success() {
            return codec::decode_body(&body);
        }

        tracing::warn!(url, status = status.as_u16(), "Upload rejected");
        match serde_json::from_slice::<ErrorEnvelope>(&body) {
            Ok(failure) => Err(Error::server(failure.error)),
            Err(_) => Err(Error::Http {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            }),
        }
    }
}

/// Content type from the file extension
fn mime_for(filename: &str) -> &'static str {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_from_extension() {
        assert_eq!(mime_for("photo.JPG"), "image/jpeg");
        assert_eq!(mime_for("a.b.png"), "image/png");
        assert_eq!(mime_for("anim.gif"), "image/gif");
        assert_eq!(mime_for("noext"), "application/octet-stream");
    }
}
