use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};

use tribute_types::api::Claims;

pub fn jwt_secret() -> String {
    std::env::var("TRIBUTE_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into())
}

/// Extract and validate JWT from Authorization header.
pub async fn require_auth(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    let claims =
        claims_from_headers(req.headers(), &jwt_secret()).ok_or(StatusCode::UNAUTHORIZED)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Bearer-token parse for routes that are public but render differently for
/// an authenticated caller (e.g. an owner viewing their pending memorial).
pub fn claims_from_headers(headers: &HeaderMap, secret: &str) -> Option<Claims> {
    let auth_header = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = auth_header.strip_prefix("Bearer ")?;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}
