use std::rc::Rc;

use actix_service::{forward_ready, Service};
use actix_web::dev::{ServiceRequest, ServiceResponse, Transform};
use actix_web::{Error, HttpMessage};
use futures::future::{ok, LocalBoxFuture, Ready};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const ADMIN_ROLE: &str = "admin";

/// Claims carried by staff tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffClaims {
    pub sub: String,
    #[serde(default)]
    pub role: String,
    pub exp: usize,
}

/// Lets a request through only with a valid HS256 bearer token whose role is
/// `admin`. The decoded claims are stored in the request extensions.
pub struct AdminAuth {
    secret: Rc<String>,
}

impl AdminAuth {
    pub fn new(secret: impl Into<String>) -> Self {
        AdminAuth {
            secret: Rc::new(secret.into()),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AdminAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AdminAuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AdminAuthMiddleware {
            service: Rc::new(service),
            secret: Rc::clone(&self.secret),
        })
    }
}

pub struct AdminAuthMiddleware<S> {
    service: Rc<S>,
    secret: Rc<String>,
}

fn authorize(req: &ServiceRequest, secret: &str) -> Result<StaffClaims, AppError> {
    let header = req
        .headers()
        .get("Authorization")
        .ok_or_else(|| AppError::Unauthorized("Authorization header missing".to_string()))?;
    let value = header
        .to_str()
        .map_err(|_| AppError::Unauthorized("Invalid authorization header".to_string()))?;
    let token = value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization scheme".to_string()))?;

    let claims = decode::<StaffClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| {
        warn!("Rejected staff token: {}", e);
        AppError::Unauthorized("Invalid token".to_string())
    })?
    .claims;

    if claims.role != ADMIN_ROLE {
        return Err(AppError::Forbidden("Admin role required".to_string()));
    }
    Ok(claims)
}

impl<S, B> Service<ServiceRequest> for AdminAuthMiddleware<S>
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
        let secret = Rc::clone(&self.secret);
        let service = Rc::clone(&self.service);

        Box::pin(async move {
            let claims = authorize(&req, &secret)?;
            req.extensions_mut().insert(claims);
            service.call(req).await
        })
    }
}
