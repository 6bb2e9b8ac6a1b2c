use axum::Router;

pub mod children;
pub mod deed_types;
pub mod ledger;
pub mod parents;
pub mod system;

/// Router for every resource endpoint (everything except `/health`).
pub fn router() -> Router {
    Router::new()
        .merge(parents::router())
        .merge(children::router())
        .merge(deed_types::router())
        .merge(ledger::router())
}
