use axum::{Router, routing::get};

pub mod orders;
pub mod products;
pub mod system;

/// Router for all authenticated (user-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/products", products::router())
        .nest("/orders", orders::router())
}
