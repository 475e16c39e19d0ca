use std::rc::Rc;

use actix_service::{forward_ready, Service};
use actix_web::dev::{Payload, ServiceRequest, ServiceResponse, Transform};
use actix_web::{web, Error, FromRequest, HttpMessage, HttpRequest};
use futures::future::{ok, LocalBoxFuture, Ready};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use mongodb::bson::doc;
use mongodb::Collection;
use serde::{Deserialize, Serialize};

use crate::error::ShopError;
use crate::models::User;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String, // Subject (user ID)
    exp: usize,  // Expiration time as UTC timestamp
}

// Authenticated user id, attached to the request by RequireAuth.
#[derive(Debug, Clone)]
pub struct AuthUserId(pub String);

// Middleware factory
pub struct RequireAuth {
    secret: String,
}

impl RequireAuth {
    pub fn new(secret: String) -> Self {
        RequireAuth { secret }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequireAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = RequireAuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(RequireAuthMiddleware {
            service: Rc::new(service),
            secret: self.secret.clone(),
        })
    }
}

pub struct RequireAuthMiddleware<S> {
    service: Rc<S>,
    secret: String,
}

fn bearer_token(req: &ServiceRequest) -> Option<String> {
    let header = req.headers().get("Authorization")?.to_str().ok()?;
    header.strip_prefix("Bearer ").map(|token| token.to_string())
}

impl<S, B> Service<ServiceRequest> for RequireAuthMiddleware<S>
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
        let secret = self.secret.clone();
        let service = self.service.clone();

        Box::pin(async move {
            let token = bearer_token(&req).ok_or(ShopError::Unauthorized)?;

            let token_data = decode::<Claims>(
                &token,
                &DecodingKey::from_secret(secret.as_ref()),
                &Validation::new(Algorithm::HS256),
            )
            .map_err(|_| ShopError::Unauthorized)?;

            // Token is valid; hand the user id to the handlers downstream.
            req.extensions_mut().insert(AuthUserId(token_data.claims.sub));
            service.call(req).await
        })
    }
}

// Full user document for the authenticated request, resolved from the
// store so handlers receive a plain data record.
pub struct CurrentUser(pub User);

impl FromRequest for CurrentUser {
    type Error = ShopError;
    type Future = LocalBoxFuture<'static, Result<CurrentUser, ShopError>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let user_id = req.extensions().get::<AuthUserId>().map(|id| id.0.clone());
        let users = req.app_data::<web::Data<Collection<User>>>().cloned();

        Box::pin(async move {
            let user_id = user_id.ok_or(ShopError::Unauthorized)?;
            let users = users.ok_or(ShopError::Config("user collection not registered"))?;

            users
                .find_one(doc! {"id": &user_id}, None)
                .await?
                .map(CurrentUser)
                .ok_or(ShopError::Unauthorized)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::{test, App, HttpResponse};
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token_for(secret: &str, sub: &str) -> String {
        let exp = chrono::Utc::now()
            .checked_add_signed(chrono::Duration::hours(1))
            .expect("valid timestamp")
            .timestamp() as usize;
        let claims = Claims {
            sub: sub.to_string(),
            exp,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_ref()),
        )
        .expect("token encodes")
    }

    async fn echo_user_id(req: HttpRequest) -> HttpResponse {
        match req.extensions().get::<AuthUserId>() {
            Some(id) => HttpResponse::Ok().json(&id.0),
            None => HttpResponse::InternalServerError().finish(),
        }
    }

    #[actix_web::test]
    async fn attaches_the_authenticated_user_id() {
        let app = test::init_service(
            App::new()
                .wrap(RequireAuth::new("sekrit".to_string()))
                .route("/whoami", web::get().to(echo_user_id)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/whoami")
            .insert_header((
                "Authorization",
                format!("Bearer {}", token_for("sekrit", "user-1")),
            ))
            .to_request();
        let body: String = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, "user-1");
    }

    #[actix_web::test]
    async fn rejects_requests_without_a_token() {
        let app = test::init_service(
            App::new()
                .wrap(RequireAuth::new("sekrit".to_string()))
                .route("/whoami", web::get().to(echo_user_id)),
        )
        .await;

        let req = test::TestRequest::get().uri("/whoami").to_request();
        match test::try_call_service(&app, req).await {
            Ok(_) => panic!("request without a token should be rejected"),
            Err(err) => assert_eq!(
                err.as_response_error().status_code(),
                StatusCode::UNAUTHORIZED
            ),
        }
    }

    #[actix_web::test]
    async fn rejects_a_token_signed_with_another_secret() {
        let app = test::init_service(
            App::new()
                .wrap(RequireAuth::new("sekrit".to_string()))
                .route("/whoami", web::get().to(echo_user_id)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/whoami")
            .insert_header((
                "Authorization",
                format!("Bearer {}", token_for("not-the-secret", "user-1")),
            ))
            .to_request();
        match test::try_call_service(&app, req).await {
            Ok(_) => panic!("a foreign token should be rejected"),
            Err(err) => assert_eq!(
                err.as_response_error().status_code(),
                StatusCode::UNAUTHORIZED
            ),
        }
    }
}
