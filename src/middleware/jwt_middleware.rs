/// JWT Authentication Middleware
///
/// Validates access tokens from the Authorization header and injects the
/// authenticated principal into request extensions for route handlers.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;

use crate::auth::validate_access_token;
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError, ErrorHandler};
use crate::logger::request_id;
use crate::principal::{PrincipalId, Role};

/// Principal and role carried by a verified access token
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedPrincipal {
    pub principal_id: PrincipalId,
    pub role: Role,
}

/// JWT middleware for protecting routes
///
/// Must be applied to routes that require authentication.
/// Extracts and validates JWT from Authorization header.
pub struct JwtMiddleware {
    jwt_config: JwtSettings,
}

impl JwtMiddleware {
    /// Create new JWT middleware instance
    pub fn new(jwt_config: JwtSettings) -> Self {
        Self { jwt_config }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(JwtMiddlewareService {
            service: Rc::new(service),
            jwt_config: self.jwt_config.clone(),
        }))
    }
}

pub struct JwtMiddlewareService<S> {
    service: Rc<S>,
    jwt_config: JwtSettings,
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // Extract Authorization header
        let auth_header = req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(|token| token.trim().to_string());

        let jwt_config = self.jwt_config.clone();

        match auth_header {
            None => {
                let response = AppError::Auth(AuthError::MissingToken)
                    .to_http_response(&request_id(req.headers()));
                Box::pin(async move {
                    Err(actix_web::error::InternalError::from_response(
                        "Unauthorized",
                        response,
                    )
                    .into())
                })
            }
            Some(token) => {
                match validate_access_token(&token, &jwt_config) {
                    Ok((principal_id, role)) => {
                        req.extensions_mut()
                            .insert(AuthenticatedPrincipal { principal_id, role });

                        tracing::debug!(
                            principal_id = %principal_id,
                            role = %role,
                            "JWT validated successfully"
                        );

                        let service = self.service.clone();
                        Box::pin(async move { service.call(req).await })
                    }
                    Err(e) => {
                        let response = AppError::Auth(e).to_http_response(&request_id(req.headers()));
                        Box::pin(async move {
                            Err(actix_web::error::InternalError::from_response(
                                "Invalid token",
                                response,
                            )
                            .into())
                        })
                    }
                }
            }
        }
    }
}
