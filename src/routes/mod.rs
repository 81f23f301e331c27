// Route exports
pub mod error;
pub mod places;

pub use error::ApiError;
pub use places::AppState;

use actix_web::web;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .configure(places::configure),
    );
}
