//! HTTP handlers and route configuration.

mod health;
mod posts;
mod users;

#[cfg(test)]
mod tests;

use actix_web::{error, web};

use crate::middleware::error::AppError;

/// Configure all application routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .app_data(path_config())
        .route("/", web::get().to(health::health_check))
        // Session
        .route("/register", web::post().to(users::register))
        .route("/login", web::post().to(users::login))
        .route("/logout", web::post().to(users::logout))
        .route("/profile", web::get().to(users::profile))
        // Users
        .service(
            web::resource("/users")
                .route(web::get().to(users::list_users))
                .route(web::patch().to(users::update_user))
                .route(web::delete().to(users::delete_user)),
        )
        .route("/users/{id}", web::get().to(users::get_user))
        // Posts
        .service(
            web::resource("/post")
                .route(web::get().to(posts::list_posts))
                .route(web::post().to(posts::create_post))
                .route(web::put().to(posts::update_post)),
        )
        .route("/post/{id}", web::get().to(posts::get_post));
}

/// Malformed JSON bodies answer 400 with a problem document.
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let detail = match &err {
            error::JsonPayloadError::ContentType => "Expected a JSON body".to_string(),
            other => other.to_string(),
        };
        AppError::BadRequest(detail).into()
    })
}

/// Unparseable ids answer 404, the same as ids that do not exist.
fn path_config() -> web::PathConfig {
    web::PathConfig::default()
        .error_handler(|_err, _req| AppError::NotFound("Resource not found".to_string()).into())
}
