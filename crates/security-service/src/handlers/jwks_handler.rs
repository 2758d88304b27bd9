use crate::observability::metrics::record_key_set_request;
use crate::routes::AppState;
use axum::{
    extract::State,
    http::header::{HeaderMap, HeaderValue, CACHE_CONTROL},
    Json,
};
use common::key_set::KeySet;
use std::sync::Arc;
use tracing::instrument;

/// Handle key-set request
///
/// GET /.well-known/jwks.json
///
/// Returns every published public key: the active key of each token class
/// plus rotated keys still inside their grace window. Verifiers refresh on
/// their own schedule, so the document is cacheable for five minutes.
#[instrument(name = "security.jwks.get", skip_all, fields(key_count))]
pub async fn handle_get_jwks(State(state): State<Arc<AppState>>) -> (HeaderMap, Json<KeySet>) {
    let key_set = state.issuer.key_set();
    tracing::Span::current().record("key_count", key_set.keys.len());
    record_key_set_request();

    let mut headers = HeaderMap::new();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=300"));

    (headers, Json(key_set))
}
