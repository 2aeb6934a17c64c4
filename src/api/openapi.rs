//! OpenAPI documentation and schema generation
//!
//! Defines the OpenAPI specification for the media-relay REST API using
//! utoipa for compile-time spec generation. Served at `/openapi.json`.

use utoipa::OpenApi;

/// OpenAPI documentation for the media-relay REST API
#[derive(OpenApi)]
#[openapi(
    info(
        title = "media-relay REST API",
        version = "0.1.0",
        description = "Streams media downloads as Server-Sent Events and answers metadata lookups",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:5002", description = "Local development server")
    ),
    paths(
        crate::api::routes::start_download,
        crate::api::routes::get_metadata,
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
    ),
    components(
        schemas(
            crate::api::routes::VideoRequest,
            crate::api::routes::MetadataResponse,
            crate::api::routes::DownloadUpdate,
            crate::api::routes::HealthResponse,
            crate::error::ApiError,
        )
    ),
    tags(
        (name = "downloads", description = "Streamed downloads over Server-Sent Events"),
        (name = "metadata", description = "Metadata lookups"),
        (name = "system", description = "Health check and API documentation")
    )
)]
pub struct ApiDoc;
