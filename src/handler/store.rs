use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request},
    http::StatusCode,
    middleware::{self, Next},
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{
        storedtos::{CheckoutDto, CreateProductDto, ProductQueryDto, UpdateProductDto},
        userdtos::ImageUploadDto,
        ApiResponse, ListResponse, RequestQueryDto,
    },
    error::HttpError,
    middleware::{role_check, AuthSession},
    models::{
        storemodels::{OrderItem, Product, ProductUpdate},
        usermodel::UserRole,
    },
    service::{
        cart::CartTotals,
        realtime::{ChangeEvent, ChangeKind, ChangeTable},
    },
    utils::image_utils,
    AppState,
};

pub fn store_handler() -> Router {
    let mechanic_only = || {
        middleware::from_fn(|req: Request, next: Next| role_check(req, next, vec![UserRole::Mechanic]))
    };

    Router::new()
        .route(
            "/products",
            get(list_products).merge(post(create_product).layer(mechanic_only())),
        )
        .route("/products/mine", get(list_my_products).layer(mechanic_only()))
        .route(
            "/products/:id",
            get(get_product).merge(put(update_product).layer(mechanic_only())),
        )
        .route("/products/:id/image", post(upload_product_image).layer(mechanic_only()))
        .route("/checkout/quote", post(quote))
        .route("/checkout", post(checkout))
        .route("/orders", get(list_orders))
        .route("/orders/:id", get(get_order))
}

pub async fn list_products(
    Query(query_params): Query<ProductQueryDto>,
    Extension(app_state): Extension<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    query_params.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let (limit, offset) = RequestQueryDto {
        page: query_params.page,
        limit: query_params.limit,
    }
    .limit_offset();

    let products = app_state.db_client
        .get_active_products(query_params.mechanic_id, limit, offset)
        .await?;

    Ok(Json(ListResponse::success(products)))
}

pub async fn get_product(
    Path(product_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
) -> Result<impl IntoResponse, HttpError> {
    let product = app_state.db_client
        .get_product(product_id)
        .await?
        .filter(|p| p.active || p.mechanic_id == session.user_id)
        .ok_or_else(|| HttpError::not_found(format!("Product {} not found", product_id)))?;

    Ok(Json(ApiResponse::success(product)))
}

/// Includes inactive listings.
pub async fn list_my_products(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
) -> Result<impl IntoResponse, HttpError> {
    let products = app_state.db_client.get_mechanic_products(session.user_id).await?;
    Ok(Json(ListResponse::success(products)))
}

pub async fn create_product(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
    Json(body): Json<CreateProductDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let product = app_state.db_client.create_product(session.user_id, body.into()).await?;

    tracing::info!("Product {} listed by {}", product.id, session.user_id);
    publish(&app_state, ChangeKind::Insert, &product);

    Ok((StatusCode::CREATED, Json(ApiResponse::success(product))))
}

pub async fn update_product(
    Path(product_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
    Json(body): Json<UpdateProductDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let product = save_owned(&app_state, &session, product_id, body.into()).await?;
    Ok(Json(ApiResponse::success(product)))
}

pub async fn upload_product_image(
    Path(product_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
    Json(body): Json<ImageUploadDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    ensure_owner(&app_state, &session, product_id).await?;

    let image = image_utils::decode_image(&body.image_base64, app_state.env.max_upload_bytes)
        .map_err(HttpError::bad_request)?;
    let url = app_state.storage
        .put_image(session.user_id, "products", &image)
        .await
        .map_err(|e| {
            tracing::error!("Product image upload failed for {}: {}", product_id, e);
            HttpError::server_error(e)
        })?;

    let update = ProductUpdate {
        image_url: Some(url),
        ..Default::default()
    };
    let product = save_owned(&app_state, &session, product_id, update).await?;

    Ok(Json(ApiResponse::success(product)))
}

#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    pub items: Vec<OrderItem>,
    pub totals: CartTotals,
}

/// Server-side pricing of a cart without charging it.
pub async fn quote(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<CheckoutDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let (items, totals) = app_state.checkout_service.quote(&body).await?;

    Ok(Json(ApiResponse::success(QuoteResponse { items, totals })))
}

pub async fn checkout(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
    Json(body): Json<CheckoutDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let order = app_state.checkout_service.checkout(&session, &body).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(order))))
}

pub async fn list_orders(
    Query(query_params): Query<RequestQueryDto>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
) -> Result<impl IntoResponse, HttpError> {
    query_params.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let (limit, offset) = query_params.limit_offset();
    let orders = app_state.checkout_service.list_orders(&session, limit, offset).await?;

    Ok(Json(ListResponse::success(orders)))
}

pub async fn get_order(
    Path(order_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
) -> Result<impl IntoResponse, HttpError> {
    let order = app_state.checkout_service.get_order(&session, order_id).await?;
    Ok(Json(ApiResponse::success(order)))
}

async fn ensure_owner(app_state: &AppState, session: &AuthSession, product_id: Uuid) -> Result<Product, HttpError> {
    let product = app_state.db_client
        .get_product(product_id)
        .await?
        .ok_or_else(|| HttpError::not_found(format!("Product {} not found", product_id)))?;

    if product.mechanic_id != session.user_id {
        return Err(HttpError::forbidden("You can only edit your own products"));
    }
    Ok(product)
}

async fn save_owned(
    app_state: &AppState,
    session: &AuthSession,
    product_id: Uuid,
    update: ProductUpdate,
) -> Result<Product, HttpError> {
    ensure_owner(app_state, session, product_id).await?;

    let product = app_state.db_client
        .update_product(product_id, session.user_id, update)
        .await?
        .ok_or_else(|| HttpError::not_found(format!("Product {} not found", product_id)))?;

    publish(app_state, ChangeKind::Update, &product);
    Ok(product)
}

fn publish(app_state: &AppState, kind: ChangeKind, product: &Product) {
    app_state.realtime.publish(
        ChangeEvent::new(ChangeTable::Products, kind, product.id, product)
            .for_users(vec![product.mechanic_id]),
    );
}
