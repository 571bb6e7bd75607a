//! 图片列表、上传、重命名与删除处理器。

use axum::body::Bytes;
use axum::extract::Extension;
use axum::extract::rejection::BytesRejection;
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::Json as JsonResponse;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::error::ApiError;
use crate::multipart::first_file_part;
use crate::path_safety::decode_relative_path;
use crate::repository::{ImageRecord, ImageRepository, RepositoryError};

pub const IMAGES_PATH_PREFIX: &str = "/api/images/";

#[derive(Serialize)]
pub(crate) struct ImageList {
    images: Vec<ImageRecord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RenameRequest {
    new_name: Option<String>,
}

#[derive(Serialize)]
pub(crate) struct DeleteResponse {
    ok: bool,
}

/// 列出全部图片。
pub async fn list_images(
    Extension(repository): Extension<Arc<ImageRepository>>,
) -> Result<JsonResponse<ImageList>, ApiError> {
    let images = repository.list().await?;
    info!(count = images.len(), "list images");
    Ok(JsonResponse(ImageList { images }))
}

/// 解析 multipart 请求体并保存第一个图片文件。
pub async fn upload_image(
    headers: HeaderMap,
    Extension(repository): Extension<Arc<ImageRepository>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<(StatusCode, JsonResponse<ImageRecord>), ApiError> {
    let body = body?;
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let file = first_file_part(&body, content_type)?;
    let record = repository.store(&file.filename, file.data).await?;
    info!(
        path = record.path,
        field = file.field_name,
        size = file.data.len(),
        "upload image"
    );
    Ok((StatusCode::CREATED, JsonResponse(record)))
}

/// 在原目录内重命名图片。
pub async fn rename_image(
    uri: Uri,
    Extension(repository): Extension<Arc<ImageRepository>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<JsonResponse<ImageRecord>, ApiError> {
    let path = path_param(&uri)?;
    let body = body?;
    let new_name = serde_json::from_slice::<RenameRequest>(&body)
        .ok()
        .and_then(|request| request.new_name)
        .filter(|name| !name.is_empty())
        .ok_or(RepositoryError::InvalidName)?;
    let record = repository.rename(&path, &new_name).await?;
    info!(from = path, to = record.path, "rename image");
    Ok(JsonResponse(record))
}

/// 删除单个图片文件。
pub async fn delete_image(
    uri: Uri,
    Extension(repository): Extension<Arc<ImageRepository>>,
) -> Result<JsonResponse<DeleteResponse>, ApiError> {
    let path = path_param(&uri)?;
    repository.delete(&path).await?;
    info!(path, "delete image");
    Ok(JsonResponse(DeleteResponse { ok: true }))
}

/// 取 `/api/images/` 之后仍为编码形式的路径，保证 `%2F` 只解码一次。
fn path_param(uri: &Uri) -> Result<String, ApiError> {
    let raw = uri
        .path()
        .strip_prefix(IMAGES_PATH_PREFIX)
        .unwrap_or_default();
    let path = decode_relative_path(raw);
    if path.is_empty() {
        return Err(RepositoryError::MissingPath.into());
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MonthFolder;
    use axum::http::HeaderValue;
    use tempfile::tempdir;

    fn make_repository() -> (tempfile::TempDir, Arc<ImageRepository>) {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("upload");
        std::fs::create_dir_all(&root).expect("create upload root");
        let month = MonthFolder::new(7).expect("july");
        (temp, Arc::new(ImageRepository::new(root).with_month(month)))
    }

    fn multipart_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("multipart/form-data; boundary=b0und"),
        );
        headers
    }

    fn multipart_body(filename: &str, data: &[u8]) -> Bytes {
        let mut body = Vec::new();
        body.extend_from_slice(b"--b0und\r\n");
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n--b0und--\r\n");
        Bytes::from(body)
    }

    #[tokio::test]
    async fn upload_stores_into_month_bucket() {
        let (_temp, repository) = make_repository();
        let (status, JsonResponse(record)) = upload_image(
            multipart_headers(),
            Extension(repository.clone()),
            Ok(multipart_body("cat.jpg", b"meow")),
        )
        .await
        .unwrap_or_else(|_| panic!("upload failed"));

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(record.path, "07/cat.jpg");
        let stored = std::fs::read(repository.root_path().join("07/cat.jpg")).expect("read");
        assert_eq!(stored, b"meow");
    }

    #[tokio::test]
    async fn upload_without_boundary_is_bad_request() {
        let (_temp, repository) = make_repository();
        let result = upload_image(
            HeaderMap::new(),
            Extension(repository),
            Ok(multipart_body("cat.jpg", b"meow")),
        )
        .await;
        assert!(matches!(result, Err(ApiError::BadRequest(msg)) if msg == "No boundary"));
    }

    #[tokio::test]
    async fn upload_with_disallowed_extension_is_bad_request() {
        let (_temp, repository) = make_repository();
        let result = upload_image(
            multipart_headers(),
            Extension(repository.clone()),
            Ok(multipart_body("script.js", b"alert(1)")),
        )
        .await;
        assert!(matches!(result, Err(ApiError::BadRequest(msg)) if msg == "No file part"));
        assert!(!repository.root_path().join("07").exists());
    }

    #[tokio::test]
    async fn rename_rejects_invalid_body() {
        let (_temp, repository) = make_repository();
        let uri: Uri = "/api/images/07%2Fcat.jpg".parse().expect("uri");
        let result = rename_image(
            uri,
            Extension(repository),
            Ok(Bytes::from_static(b"not json")),
        )
        .await;
        assert!(matches!(result, Err(ApiError::BadRequest(msg)) if msg == "Invalid newName"));
    }

    #[tokio::test]
    async fn delete_with_only_traversal_is_missing_path() {
        let (_temp, repository) = make_repository();
        let uri: Uri = "/api/images/..%2F..".parse().expect("uri");
        let result = delete_image(uri, Extension(repository)).await;
        assert!(matches!(result, Err(ApiError::BadRequest(msg)) if msg == "Missing path"));
    }

    #[test]
    fn path_param_decodes_once() {
        let uri: Uri = "/api/images/03%2Flogo%2520x.PNG".parse().expect("uri");
        assert_eq!(path_param(&uri).ok().as_deref(), Some("03/logo%20x.PNG"));
    }
}
