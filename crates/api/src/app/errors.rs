use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use stockroom_infra::{FulfillmentError, ServiceError, StockError, StoreError};

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn service_error_to_response(err: ServiceError) -> Response {
    match err {
        ServiceError::NotAuthenticated => {
            json_error(StatusCode::UNAUTHORIZED, "not_authenticated", "not authenticated")
        }
        ServiceError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        ServiceError::Validation(msg) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        ServiceError::InvalidStateTransition(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invalid_state_transition", msg)
        }
        ServiceError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        ServiceError::Fulfillment(e) => fulfillment_error_to_response(e),
        ServiceError::Store(e) => store_error_to_response(e),
    }
}

pub fn stock_error_to_response(err: StockError) -> Response {
    match err {
        StockError::NotAuthenticated => {
            json_error(StatusCode::UNAUTHORIZED, "not_authenticated", "not authenticated")
        }
        StockError::NotFound => {
            json_error(StatusCode::NOT_FOUND, "not_found", "product not found")
        }
        StockError::Validation(msg) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        StockError::InsufficientStock {
            available,
            requested,
        } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            axum::Json(json!({
                "error": "insufficient_stock",
                "message": format!("insufficient stock: available {available}, requested {requested}"),
                "available": available,
                "requested": requested,
            })),
        )
            .into_response(),
        e @ StockError::ConflictRetryExhausted { .. } => {
            json_error(StatusCode::CONFLICT, "conflict", e.to_string())
        }
        StockError::Store(e) => store_error_to_response(e),
    }
}

pub fn fulfillment_error_to_response(err: FulfillmentError) -> Response {
    match err {
        FulfillmentError::NotAuthenticated => {
            json_error(StatusCode::UNAUTHORIZED, "not_authenticated", "not authenticated")
        }
        FulfillmentError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        FulfillmentError::InvalidStateTransition(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invalid_state_transition", msg)
        }
        FulfillmentError::PartialFulfillment {
            order_id,
            credited,
            uncredited,
            reason,
        } => (
            StatusCode::CONFLICT,
            axum::Json(json!({
                "error": "partial_fulfillment",
                "message": format!("order {order_id} partially fulfilled: {reason}"),
                "order_id": order_id,
                "credited": credited,
                "uncredited": uncredited,
                "reason": reason,
            })),
        )
            .into_response(),
        e @ FulfillmentError::ConflictRetryExhausted { .. } => {
            json_error(StatusCode::CONFLICT, "conflict", e.to_string())
        }
        FulfillmentError::Domain(e) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "domain_error", e.to_string())
        }
        FulfillmentError::Store(e) => store_error_to_response(e),
    }
}

fn store_error_to_response(err: StoreError) -> Response {
    match err {
        StoreError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        StoreError::Conflict(msg) | StoreError::Duplicate(msg) | StoreError::InUse(msg) => {
            json_error(StatusCode::CONFLICT, "conflict", msg)
        }
        other => {
            tracing::error!(error = %other, "store failure");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "store_error",
                other.to_string(),
            )
        }
    }
}

/// Parse a path id, answering 400 on malformed input.
pub fn parse_id<T: core::str::FromStr>(raw: &str, what: &'static str) -> Result<T, Response> {
    raw.parse()
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockroom_core::{OrderId, ProductId};

    #[test]
    fn service_errors_map_to_statuses() {
        assert_eq!(
            service_error_to_response(ServiceError::NotFound).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            service_error_to_response(ServiceError::Conflict("in use".into())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            service_error_to_response(ServiceError::InvalidStateTransition("done".into())).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn partial_fulfillment_is_a_conflict() {
        let err = FulfillmentError::PartialFulfillment {
            order_id: OrderId::new(),
            credited: vec![ProductId::new()],
            uncredited: vec![ProductId::new()],
            reason: "backend unavailable".into(),
        };
        assert_eq!(fulfillment_error_to_response(err).status(), StatusCode::CONFLICT);
    }

    #[test]
    fn backend_failures_are_server_errors() {
        let res = stock_error_to_response(StockError::Store(StoreError::Backend("down".into())));
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn malformed_ids_are_bad_requests() {
        let res = parse_id::<ProductId>("not-a-uuid", "product").unwrap_err();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
