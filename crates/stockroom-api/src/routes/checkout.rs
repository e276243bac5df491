//! Checkout route.
//!
//! The authenticating gateway in front of this service forwards the caller's
//! identity in `x-user-id` and `x-user-email`.

use axum::extract::{FromRequestParts, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing::post};
use tracing::{info, instrument};

use stockroom_core::model::{CheckoutRequest, Customer, Transaction};

use crate::error::{ApiError, ErrorBody};
use crate::state::AppState;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header carrying the authenticated user's email address.
pub const USER_EMAIL_HEADER: &str = "x-user-email";

/// The caller identity forwarded by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub Customer);

/// Rejection for requests without a usable identity.
#[derive(Debug)]
pub struct Unauthenticated(&'static str);

impl IntoResponse for Unauthenticated {
    fn into_response(self) -> Response {
        ErrorBody {
            error: "unauthorized",
            message: self.0.to_string(),
        }
        .into_response_with(StatusCode::UNAUTHORIZED)
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = Unauthenticated;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let user_id = header(USER_ID_HEADER)
            .ok_or(Unauthenticated("missing x-user-id header"))?
            .parse::<i64>()
            .map_err(|_| Unauthenticated("x-user-id must be an integer"))?;
        let email = header(USER_EMAIL_HEADER)
            .ok_or(Unauthenticated("missing x-user-email header"))?
            .to_owned();

        Ok(Self(Customer { user_id, email }))
    }
}

/// POST /checkout
#[instrument(
    skip(state, user, request),
    fields(user_id = user.0.user_id, product_id = request.product_id)
)]
async fn checkout(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<Transaction>), ApiError> {
    info!(quantity = request.quantity, "handling checkout");
    let transaction = state.checkout.checkout(&user.0, request).await?;
    Ok((StatusCode::CREATED, Json(transaction)))
}

/// Returns the checkout router.
pub fn router() -> Router<AppState> {
    Router::new().route("/checkout", post(checkout))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;

    use super::*;

    async fn extract(request: Request<Body>) -> Result<AuthenticatedUser, Unauthenticated> {
        let (mut parts, _body) = request.into_parts();
        AuthenticatedUser::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_identity_headers_become_customer() {
        let request = Request::builder()
            .header(USER_ID_HEADER, "7")
            .header(USER_EMAIL_HEADER, "buyer@example.com")
            .body(Body::empty())
            .unwrap();

        let user = extract(request).await.unwrap();

        assert_eq!(
            user.0,
            Customer {
                user_id: 7,
                email: "buyer@example.com".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_missing_or_malformed_identity_is_rejected() {
        let no_email = Request::builder()
            .header(USER_ID_HEADER, "7")
            .body(Body::empty())
            .unwrap();
        let bad_id = Request::builder()
            .header(USER_ID_HEADER, "seven")
            .header(USER_EMAIL_HEADER, "buyer@example.com")
            .body(Body::empty())
            .unwrap();

        assert!(extract(no_email).await.is_err());
        let rejection = extract(bad_id).await.unwrap_err();
        assert_eq!(rejection.into_response().status(), StatusCode::UNAUTHORIZED);
    }
}
