use std::sync::Arc;

use axum::{middleware, routing::get, Extension, Json, Router};
use serde_json::json;
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::{
    handler::{
        auth::auth_handler, bookings::bookings_handler, chat::chat_handler, maps::maps_handler,
        realtime::realtime_handler, sos::sos_handler, store::store_handler, users::users_handler,
    },
    middleware::auth,
    AppState,
};

async fn health_check(Extension(app_state): Extension<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "message": "Server is running",
        "store": app_state.db_client.backend_name(),
    }))
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .nest("/users", users_handler())
        .nest("/bookings", bookings_handler())
        .nest("/sos", sos_handler())
        .nest("/chat", chat_handler())
        .nest("/store", store_handler())
        .nest("/maps", maps_handler())
        .nest("/realtime", realtime_handler())
        .layer(middleware::from_fn(auth));

    let api_route = Router::new()
        .nest("/auth", auth_handler())
        .merge(protected)
        .layer(TraceLayer::new_for_http());

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_route)
        .nest_service("/uploads", ServeDir::new(&app_state.env.storage_dir))
        .layer(Extension(app_state))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::{config::test_config, db::MemoryStore};

    fn app() -> Router {
        let state = AppState::new(Arc::new(MemoryStore::new()), test_config()).unwrap();
        create_router(Arc::new(state))
    }

    async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn sign_up(app: &Router, email: &str, role: &str) -> String {
        let (status, _) = send(
            app,
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({
                "full_name": "Test Person",
                "email": email,
                "password": "password123",
                "passwordConfirm": "password123",
                "role": role,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(
            app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": email, "password": "password123" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health_check() {
        let (status, body) = send(&app(), Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["store"], "memory");
    }

    #[tokio::test]
    async fn test_protected_routes_require_token() {
        let (status, body) = send(&app(), Method::GET, "/api/bookings", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["status"], "fail");
    }

    #[tokio::test]
    async fn test_register_login_and_me() {
        let app = app();
        let token = sign_up(&app, "asha@example.com", "mechanic").await;

        let (status, body) = send(&app, Method::GET, "/api/users/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["user"]["role"], "mechanic");

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({
                "full_name": "Again",
                "email": "asha@example.com",
                "password": "password123",
                "passwordConfirm": "password123",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_booking_accept_race_over_http() {
        let app = app();
        let customer = sign_up(&app, "customer@example.com", "user").await;
        let first = sign_up(&app, "first@example.com", "mechanic").await;
        let second = sign_up(&app, "second@example.com", "mechanic").await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/bookings",
            Some(&customer),
            Some(json!({
                "service_type": "Puncture",
                "vehicle_type": "bike",
                "location": "MG Road",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["status"], "pending");
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let uri = format!("/api/bookings/{}/accept", id);
        let (status, body) = send(&app, Method::PUT, &uri, Some(&first), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "confirmed");

        let (status, _) = send(&app, Method::PUT, &uri, Some(&second), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(&app, Method::PUT, &uri, Some(&customer), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(&app, Method::GET, &format!("/api/bookings/{}/route", id), Some(&customer), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["map_state"]["state"], "awaiting_location");
    }

    #[tokio::test]
    async fn test_malformed_accept_body_is_rejected() {
        let app = app();
        let customer = sign_up(&app, "owner@example.com", "user").await;
        let mechanic = sign_up(&app, "fixer@example.com", "mechanic").await;

        let (_, body) = send(
            &app,
            Method::POST,
            "/api/bookings",
            Some(&customer),
            Some(json!({ "service_type": "Battery", "vehicle_type": "car", "location": "HSR Layout" })),
        )
        .await;
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let request = Request::builder()
            .method(Method::PUT)
            .uri(format!("/api/bookings/{}/accept", id))
            .header(header::AUTHORIZATION, format!("Bearer {}", mechanic))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"latitude\": 12.9,"))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let (_, body) = send(&app, Method::GET, &format!("/api/bookings/{}", id), Some(&customer), None).await;
        assert_eq!(body["data"]["booking"]["status"], "pending");

        let (status, body) = send(
            &app,
            Method::PUT,
            &format!("/api/bookings/{}/accept", id),
            Some(&mechanic),
            Some(json!({ "latitude": 12.9, "longitude": 77.6 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["mechanic_latitude"], 12.9);
    }

    #[tokio::test]
    async fn test_customers_cannot_list_products_for_sale() {
        let app = app();
        let customer = sign_up(&app, "buyer@example.com", "user").await;

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/store/products",
            Some(&customer),
            Some(json!({ "title": "Wiper", "price": 500, "stock": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_checkout_over_http() {
        let app = app();
        let mechanic = sign_up(&app, "seller@example.com", "mechanic").await;
        let buyer = sign_up(&app, "buyer@example.com", "user").await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/store/products",
            Some(&mechanic),
            Some(json!({ "title": "Brake pads", "price": 100000, "stock": 4 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let product_id = body["data"]["id"].as_str().unwrap().to_string();

        let cart = json!({ "items": [{ "product_id": product_id, "quantity": 2 }] });
        let (status, body) = send(&app, Method::POST, "/api/store/checkout", Some(&buyer), Some(cart)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["total_amount"], 211_000);

        let (status, body) = send(&app, Method::GET, "/api/store/orders", Some(&buyer), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results"], 1);
    }
}
