use axum::{
    Extension, Json,
    body::{Body, to_bytes},
    extract::{FromRequest, Multipart, Query},
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response as HttpResponse},
};
use bytes::Bytes;
use serde_json::Value;
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::resource::tree::ResourceTree;
use crate::resource::types::{QueryParams, Request, ResourcePath, Response, UploadedFile, Verb};
use crate::storage::types::FILES_CLASS;

/// Largest request body read into memory.
pub const MAX_BODY_BYTES: usize = 32 << 20;

/// Catch-all handler: every path is a resource path, so the whole tree sits behind one route.
pub async fn handle_request(
    Extension(tree): Extension<Arc<ResourceTree>>,
    request: axum::extract::Request,
) -> HttpResponse {
    // Pre-flights are answered by the CORS layer; any other OPTIONS stops here.
    if request.method() == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else if request.uri().path().ends_with(".ico") {
        tracing::debug!("Ignoring browser file request {}", request.uri().path());
        StatusCode::NO_CONTENT.into_response()
    } else {
        match parse_request(request).await {
            Ok(parsed) => {
                let verb = parsed.verb;
                let target = parsed.target.clone();
                let reply = tree.submit(parsed).await.unwrap_or_else(|e| {
                    tracing::error!("{} {} was not answered: {}", verb, target, e);
                    Response::from(e)
                });
                into_http(reply)
            }
            Err(e) => into_http(Response::from(e)),
        }
    }
}

/// Turns the HTTP request into a tree request. The target path is normalized, so trailing
/// slashes are dropped here.
pub async fn parse_request(request: axum::extract::Request) -> ApiResult<Request> {
    let verb = Verb::try_from(request.method())?;
    let target = ResourcePath::parse(request.uri().path());
    let params: QueryParams = Query::<QueryParams>::try_from_uri(request.uri())
        .map(|Query(params)| params)
        .map_err(|_| ApiError::bad_request("Query parameters are not valid."))?;
    let headers = request.headers().clone();

    let mut parsed = Request::new(verb, target.as_str());
    parsed.headers = headers.clone();
    parsed.params = params;

    let is_files = target.first_segment() == Some(FILES_CLASS);
    let is_multipart = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("multipart/form-data"));

    if is_files && is_multipart {
        parsed.files = read_multipart(request).await?;
        return Ok(parsed);
    }

    let bytes = read_body(request.into_body()).await?;
    if is_files {
        if !bytes.is_empty() {
            parsed.raw_body = Some(bytes);
        }
    } else if !bytes.trim_ascii().is_empty() {
        parsed.body = Some(parse_json_body(&bytes)?);
    }
    Ok(parsed)
}

async fn read_body(body: Body) -> ApiResult<Bytes> {
    to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| ApiError::bad_request("Request body could not be read."))
}

/// Bodies must be JSON objects.
pub fn parse_json_body(bytes: &[u8]) -> ApiResult<serde_json::Map<String, Value>> {
    let invalid = || ApiError::bad_request("Request body is not a valid json.");
    match serde_json::from_slice::<Value>(bytes).map_err(|_| invalid())? {
        Value::Object(body) => Ok(body),
        _ => Err(invalid()),
    }
}

async fn read_multipart(request: axum::extract::Request) -> ApiResult<Vec<UploadedFile>> {
    let form_error = || ApiError::bad_request("Form data is not valid. Parsing multipart form failed.");
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|_| form_error())?;

    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(|_| form_error())? {
        // Plain form fields carry no file name and are not uploads.
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(|_| form_error())?;
        files.push(UploadedFile {
            file_name: Some(file_name),
            content_type,
            bytes,
        });
    }
    Ok(files)
}

/// Writes a tree response: raw bytes with their content type, a JSON body, or nothing.
pub fn into_http(response: Response) -> HttpResponse {
    let status = response.status;
    if let Some(raw) = response.raw {
        let content_type = HeaderValue::from_str(&raw.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
        return (status, [(header::CONTENT_TYPE, content_type)], raw.bytes).into_response();
    }
    match response.body {
        Some(body) => (status, Json(Value::Object(body))).into_response(),
        None => status.into_response(),
    }
}
