//! Identity echo for authenticated callers.

use axum::{Extension, Json};
use common::types::AuthenticatedSubject;

/// Handler for GET /api/v1/whoami
///
/// Returns the identity the authentication middleware established.
pub async fn whoami(
    Extension(subject): Extension<AuthenticatedSubject>,
) -> Json<AuthenticatedSubject> {
    Json(subject)
}
