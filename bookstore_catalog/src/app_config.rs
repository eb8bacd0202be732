use paperclip::actix::web;

use crate::error::{json_error_handler, query_error_handler};
use crate::handlers;

pub fn config_app(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .app_data(web::QueryConfig::default().error_handler(query_error_handler))
        .service(web::resource("/health").route(web::get().to(handlers::health)))
        .service(
            web::resource("/books/")
                .route(web::get().to(handlers::list_books))
                .route(web::head().to(handlers::list_books))
                .route(web::options().to(handlers::book_list_options))
                .route(web::post().to(handlers::create_book)),
        )
        .service(
            web::resource("/books/{book_id}/")
                .route(web::get().to(handlers::get_book))
                .route(web::head().to(handlers::get_book))
                .route(web::options().to(handlers::book_detail_options))
                .route(web::put().to(handlers::update_book))
                .route(web::delete().to(handlers::delete_book)),
        )
        .service(
            web::resource("/user-book-relation/{book_id}/")
                .route(web::options().to(handlers::relation_options))
                .route(web::patch().to(handlers::update_relation)),
        )
        .service(
            web::resource("/users/{user_id}/")
                .route(web::get().to(handlers::get_user))
                .route(web::delete().to(handlers::delete_user)),
        );
}

/// Self registration of users, only mounted when enabled in settings
pub fn config_user_registration(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/users/").route(web::post().to(handlers::add_user)));
}
