use actix_web::http::header::{ALLOW, LOCATION};
use actix_web::web::Data;
use actix_web::Error;
use actix_web::HttpResponse;
use paperclip::actix::{
    api_v2_operation,
    web::{self},
};

use crate::api::{
    BookDetails, BookId, ListBooksQuery, ResourceOptions, UserBookRelationPatch, UserDetails,
    UserId,
};
use crate::catalog_repository::SharedCatalogRepository;
use crate::error::ApiError;
use crate::identity::Identity;
use crate::permissions::{check_book_permission, check_permission, Action};
use crate::query::BookFilter;
use crate::serialization::{
    serialize_book, serialize_relation, serialize_user, validate_book_details,
    validate_relation_patch, validate_user_details,
};

#[api_v2_operation]
pub async fn health() -> Result<HttpResponse, Error> {
    Ok(HttpResponse::Ok().finish())
}

fn resource_options(name: &str, allow: &'static str) -> HttpResponse {
    HttpResponse::Ok()
        .append_header((ALLOW, allow))
        .json(ResourceOptions {
            name: name.to_string(),
            renders: vec!["application/json".to_string()],
            parses: vec!["application/json".to_string()],
        })
}

#[api_v2_operation]
pub async fn book_list_options() -> Result<HttpResponse, Error> {
    Ok(resource_options("Book List", "GET, POST, HEAD, OPTIONS"))
}

#[api_v2_operation]
pub async fn book_detail_options() -> Result<HttpResponse, Error> {
    Ok(resource_options("Book Instance", "GET, PUT, DELETE, HEAD, OPTIONS"))
}

#[api_v2_operation]
pub async fn relation_options() -> Result<HttpResponse, Error> {
    Ok(resource_options("User Book Relation", "PATCH, OPTIONS"))
}

#[api_v2_operation]
pub async fn list_books(
    catalog: Data<SharedCatalogRepository>,
    query: web::Query<ListBooksQuery>,
) -> Result<HttpResponse, Error> {
    let filter = BookFilter::try_from(&query.into_inner()).map_err(ApiError::from)?;
    let books = catalog.list_books(&filter).await.map_err(ApiError::from)?;
    Ok(HttpResponse::Ok().json(books.into_iter().map(serialize_book).collect::<Vec<_>>()))
}

#[api_v2_operation]
pub async fn create_book(
    catalog: Data<SharedCatalogRepository>,
    identity: Identity,
    details: web::Json<BookDetails>,
) -> Result<HttpResponse, Error> {
    check_permission(Action::Create, identity.user())?;
    let details = details.into_inner();
    validate_book_details(&details).map_err(ApiError::from)?;

    // owner is never taken from the request body
    let owner = identity.user().map(|user| user.id);
    let book_id = catalog
        .add_book(details, owner)
        .await
        .map_err(ApiError::from)?;
    tracing::info!(book_id, ?owner, "Book created");

    let book = catalog
        .get_annotated_book(book_id)
        .await
        .map_err(ApiError::from)?;
    Ok(HttpResponse::Created()
        .append_header((LOCATION, format!("/books/{}/", book_id)))
        .json(serialize_book(book)))
}

#[api_v2_operation]
pub async fn get_book(
    catalog: Data<SharedCatalogRepository>,
    book_id: web::Path<BookId>,
) -> Result<HttpResponse, Error> {
    let book = catalog
        .get_annotated_book(book_id.into_inner())
        .await
        .map_err(ApiError::from)?;
    Ok(HttpResponse::Ok().json(serialize_book(book)))
}

/// Loads the book and checks that the caller may change it
async fn authorize_write(
    catalog: &SharedCatalogRepository,
    identity: &Identity,
    book_id: BookId,
) -> Result<(), ApiError> {
    check_permission(Action::Write, identity.user())?;
    let book = catalog.get_book(book_id).await?;
    check_book_permission(Action::Write, identity.user(), &book).inspect_err(|_| {
        tracing::warn!(
            book_id,
            user_id = identity.user().map(|user| user.id),
            "Write to a book denied"
        )
    })
}

#[api_v2_operation]
pub async fn update_book(
    catalog: Data<SharedCatalogRepository>,
    identity: Identity,
    book_id: web::Path<BookId>,
    details: web::Json<BookDetails>,
) -> Result<HttpResponse, Error> {
    let book_id = book_id.into_inner();
    authorize_write(&catalog, &identity, book_id).await?;
    let details = details.into_inner();
    validate_book_details(&details).map_err(ApiError::from)?;

    catalog
        .update_book(book_id, details)
        .await
        .map_err(ApiError::from)?;
    tracing::info!(book_id, "Book updated");

    let book = catalog
        .get_annotated_book(book_id)
        .await
        .map_err(ApiError::from)?;
    Ok(HttpResponse::Ok().json(serialize_book(book)))
}

#[api_v2_operation]
pub async fn delete_book(
    catalog: Data<SharedCatalogRepository>,
    identity: Identity,
    book_id: web::Path<BookId>,
) -> Result<HttpResponse, Error> {
    let book_id = book_id.into_inner();
    authorize_write(&catalog, &identity, book_id).await?;
    catalog
        .delete_book(book_id)
        .await
        .map_err(ApiError::from)?;
    tracing::info!(book_id, "Book deleted");
    Ok(HttpResponse::NoContent().finish())
}

#[api_v2_operation]
pub async fn update_relation(
    catalog: Data<SharedCatalogRepository>,
    identity: Identity,
    book_id: web::Path<BookId>,
    patch: web::Json<UserBookRelationPatch>,
) -> Result<HttpResponse, Error> {
    let user = identity.require()?;
    let book_id = book_id.into_inner();
    let changes = validate_relation_patch(patch.into_inner()).map_err(ApiError::from)?;

    let relation = catalog
        .update_relation(user.id, book_id, changes)
        .await
        .map_err(ApiError::from)?;
    tracing::info!(
        book_id,
        user_id = user.id,
        like = relation.like,
        in_bookmarks = relation.in_bookmarks,
        rate = relation.rate.map(|rate| rate.label()),
        "Relation updated"
    );
    Ok(HttpResponse::Ok().json(serialize_relation(relation)))
}

#[api_v2_operation]
pub async fn add_user(
    catalog: Data<SharedCatalogRepository>,
    details: web::Json<UserDetails>,
) -> Result<HttpResponse, Error> {
    let details = details.into_inner();
    validate_user_details(&details.username).map_err(ApiError::from)?;
    let user_id = catalog.add_user(details).await.map_err(ApiError::from)?;
    tracing::info!(user_id, "User registered");

    let user = catalog.get_user(user_id).await.map_err(ApiError::from)?;
    Ok(HttpResponse::Created()
        .append_header((LOCATION, format!("/users/{}/", user_id)))
        .json(serialize_user(user)))
}

#[api_v2_operation]
pub async fn get_user(
    catalog: Data<SharedCatalogRepository>,
    user_id: web::Path<UserId>,
) -> Result<HttpResponse, Error> {
    let user = catalog
        .get_user(user_id.into_inner())
        .await
        .map_err(ApiError::from)?;
    Ok(HttpResponse::Ok().json(serialize_user(user)))
}

#[api_v2_operation]
pub async fn delete_user(
    catalog: Data<SharedCatalogRepository>,
    identity: Identity,
    user_id: web::Path<UserId>,
) -> Result<HttpResponse, Error> {
    if !identity.require()?.is_staff {
        return Err(ApiError::PermissionDenied.into());
    }
    let user_id = user_id.into_inner();
    catalog
        .delete_user(user_id)
        .await
        .map_err(ApiError::from)?;
    tracing::info!(user_id, "User deleted");
    Ok(HttpResponse::NoContent().finish())
}
