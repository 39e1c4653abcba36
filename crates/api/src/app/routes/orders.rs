use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use stockroom_core::OrderId;
use stockroom_purchasing::{NewOrder, OrderStatus};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::UserContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_orders).post(create_order))
        .route("/:id", get(get_order))
        .route("/:id/status", post(update_status))
        .route("/:id/tracking", post(update_tracking))
        .route("/:id/complete", post(complete_order))
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    Query(query): Query<dto::OrderListQuery>,
) -> Response {
    let status = match query.status.as_deref().map(str::parse::<OrderStatus>).transpose() {
        Ok(v) => v,
        Err(e) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_status", e.to_string());
        }
    };

    let orders = match services.orders.list(&user, status).await {
        Ok(v) => v,
        Err(e) => return errors::service_error_to_response(e),
    };
    let catalogue = match services.products.list(&user).await {
        Ok(v) => v,
        Err(e) => return errors::service_error_to_response(e),
    };

    Json(dto::order_views(orders, &catalogue)).into_response()
}

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    Json(body): Json<NewOrder>,
) -> Response {
    match services.orders.create(&user, body).await {
        Ok(order) => (StatusCode::CREATED, Json(order)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
) -> Response {
    let id: OrderId = match errors::parse_id(&id, "order") {
        Ok(v) => v,
        Err(res) => return res,
    };

    match services.orders.get(&user, id).await {
        Ok(order) => Json(order).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn update_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateStatusRequest>,
) -> Response {
    let id: OrderId = match errors::parse_id(&id, "order") {
        Ok(v) => v,
        Err(res) => return res,
    };

    match services.orders.update_status(&user, id, body.status).await {
        Ok(order) => Json(order).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn update_tracking(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateTrackingRequest>,
) -> Response {
    let id: OrderId = match errors::parse_id(&id, "order") {
        Ok(v) => v,
        Err(res) => return res,
    };

    match services
        .orders
        .update_tracking_number(&user, id, body.tracking_number)
        .await
    {
        Ok(order) => Json(order).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn complete_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
) -> Response {
    let id: OrderId = match errors::parse_id(&id, "order") {
        Ok(v) => v,
        Err(res) => return res,
    };

    match services.orders.complete(&user, id).await {
        Ok(receipt) => Json(receipt).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
