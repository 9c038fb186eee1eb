use std::sync::Arc;

use axum::{
    extract::{Query, Request},
    middleware::{self, Next},
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use validator::Validate;

use crate::{
    dtos::{
        userdtos::{
            FilterUserDto, ImageUploadDto, MechanicQueryDto, ProfileUpdateDto, UserData, UserResponseDto,
            VerifyMechanicDto,
        },
        ApiResponse, ListResponse, RequestQueryDto,
    },
    error::{ErrorMessage, HttpError},
    middleware::{role_check, AuthSession},
    models::usermodel::{MechanicFilter, Profile, ProfileUpdate, UserRole},
    service::realtime::{ChangeEvent, ChangeKind, ChangeTable},
    utils::image_utils,
    AppState,
};

pub fn users_handler() -> Router {
    Router::new()
        .route("/me", get(get_me))
        .route("/profile", put(update_profile))
        .route("/verification-photo", post(upload_verification_photo))
        .route("/mechanics", get(find_mechanics))
        .route(
            "/mechanics/verify",
            put(verify_mechanic)
                .layer(middleware::from_fn(|req: Request, next: Next| {
                    role_check(req, next, vec![UserRole::Admin])
                })),
        )
}

pub async fn get_me(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
) -> Result<impl IntoResponse, HttpError> {
    let user = app_state.db_client
        .get_user(Some(session.user_id), None)
        .await?
        .ok_or_else(|| HttpError::unauthorized(ErrorMessage::UserNoLongerExist.to_string()))?;
    let profile = load_profile(&app_state, &session).await?;

    Ok(Json(UserResponseDto {
        status: "success".to_string(),
        data: UserData {
            user: FilterUserDto::filter_user(&user, &profile),
            profile,
        },
    }))
}

pub async fn update_profile(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
    Json(body): Json<ProfileUpdateDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let update = body.into_update().map_err(HttpError::bad_request)?;
    let profile = save_profile(&app_state, &session, update).await?;

    Ok(Json(ApiResponse::success(profile)))
}

/// Mechanics upload a photo for manual verification by an admin.
pub async fn upload_verification_photo(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
    Json(body): Json<ImageUploadDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let image = image_utils::decode_image(&body.image_base64, app_state.env.max_upload_bytes)
        .map_err(HttpError::bad_request)?;

    let url = app_state.storage
        .put_image(session.user_id, "verification", &image)
        .await
        .map_err(|e| {
            tracing::error!("Verification photo upload failed for {}: {}", session.user_id, e);
            HttpError::server_error(e)
        })?;

    let update = ProfileUpdate {
        verification_photo_url: Some(url),
        ..Default::default()
    };
    let profile = save_profile(&app_state, &session, update).await?;

    Ok(Json(ApiResponse::success(profile)))
}

pub async fn find_mechanics(
    Query(query_params): Query<MechanicQueryDto>,
    Extension(app_state): Extension<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    query_params.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let (limit, offset) = RequestQueryDto {
        page: query_params.page,
        limit: query_params.limit,
    }
    .limit_offset();

    let filter = MechanicFilter {
        service: query_params.service,
        verified_only: query_params.verified_only.unwrap_or(false),
        limit,
        offset,
    };

    let mechanics = app_state.db_client.find_mechanics(&filter).await?;

    Ok(Json(ListResponse::success(mechanics)))
}

pub async fn verify_mechanic(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
    Json(body): Json<VerifyMechanicDto>,
) -> Result<impl IntoResponse, HttpError> {
    let target = app_state.db_client
        .get_profile(body.target_user_id)
        .await?
        .ok_or_else(|| HttpError::not_found(format!("Profile {} not found", body.target_user_id)))?;

    if !target.is_mechanic() {
        return Err(HttpError::bad_request("Only mechanics can be verified"));
    }

    let profile = app_state.db_client
        .set_profile_verified(target.user_id, body.verified)
        .await?
        .ok_or_else(|| HttpError::not_found(format!("Profile {} not found", body.target_user_id)))?;

    tracing::info!(
        "Admin {} set verified={} on mechanic {}",
        session.user_id,
        body.verified,
        profile.user_id
    );

    Ok(Json(ApiResponse::success(profile)))
}

async fn load_profile(app_state: &AppState, session: &AuthSession) -> Result<Profile, HttpError> {
    app_state.db_client
        .get_profile(session.user_id)
        .await?
        .ok_or_else(|| HttpError::unauthorized(ErrorMessage::UserNoLongerExist.to_string()))
}

async fn save_profile(
    app_state: &AppState,
    session: &AuthSession,
    update: ProfileUpdate,
) -> Result<Profile, HttpError> {
    let profile = app_state.db_client
        .update_profile(session.user_id, update)
        .await?
        .ok_or_else(|| HttpError::unauthorized(ErrorMessage::UserNoLongerExist.to_string()))?;

    app_state.realtime.publish(
        ChangeEvent::new(ChangeTable::Profiles, ChangeKind::Update, profile.user_id, &profile)
            .for_users(vec![profile.user_id]),
    );

    Ok(profile)
}
