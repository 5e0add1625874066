/// Authentication Routes
///
/// Thin HTTP adapter over `SessionService`: login, token refresh and the
/// current principal. Cookie handling and other transport policy belong to
/// the fronting application.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::SessionService;
use crate::error::{ErrorContext, ErrorHandler};
use crate::logger::request_id;
use crate::middleware::AuthenticatedPrincipal;
use crate::principal::Role;

/// Login request
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Token refresh request, accepted as a JSON body or as query parameters
#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

/// Current principal response
#[derive(Serialize)]
pub struct PrincipalResponse {
    pub principal_id: i64,
    pub role: Role,
}

/// POST /auth/login
///
/// # Errors
/// - 400: malformed email
/// - 401: unknown email or wrong password (indistinguishable)
/// - 500/503: internal or store failure
pub async fn login(
    req: HttpRequest,
    form: web::Json<LoginRequest>,
    sessions: web::Data<SessionService>,
) -> HttpResponse {
    let context = ErrorContext::new("login").with_request_id(request_id(req.headers()));

    match sessions.login(&form.email, &form.password, &context).await {
        Ok(tokens) => HttpResponse::Ok().json(tokens),
        Err(e) => {
            context.log_error(&e);
            e.to_http_response(&context.request_id)
        }
    }
}

/// POST /auth/refresh
///
/// Redeems a refresh credential for a new access token and a rotated refresh
/// credential. The presented credential is dead afterwards.
///
/// # Errors
/// - 401: any problem with the presented credential
/// - 500: internal failure
pub async fn refresh(
    req: HttpRequest,
    body: Option<web::Json<RefreshRequest>>,
    query: Option<web::Query<RefreshRequest>>,
    sessions: web::Data<SessionService>,
) -> HttpResponse {
    let context = ErrorContext::new("token_refresh").with_request_id(request_id(req.headers()));

    let presented = body
        .and_then(|body| body.into_inner().refresh_token)
        .or_else(|| query.and_then(|query| query.into_inner().refresh_token));

    match sessions.refresh(presented.as_deref(), &context).await {
        Ok(tokens) => HttpResponse::Ok().json(tokens),
        Err(rejection) => rejection.to_http_response(&context.request_id),
    }
}

/// GET /api/me
///
/// Requires `Authorization: Bearer <access_token>`; the principal is injected
/// by `JwtMiddleware`.
pub async fn current_principal(principal: web::ReqData<AuthenticatedPrincipal>) -> HttpResponse {
    HttpResponse::Ok().json(PrincipalResponse {
        principal_id: principal.principal_id.as_i64(),
        role: principal.role,
    })
}
