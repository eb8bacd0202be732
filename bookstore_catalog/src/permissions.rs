use crate::catalog_repository::{Book, User};
use crate::error::ApiError;

/// What a request does to a book
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// GET, HEAD and OPTIONS
    Read,
    /// POST to the collection
    Create,
    /// PUT, PATCH and DELETE
    Write,
}

/// Request level check: reads are open to anyone, everything else needs an identity
pub fn check_permission(action: Action, identity: Option<&User>) -> Result<(), ApiError> {
    match (action, identity) {
        (Action::Read, _) => Ok(()),
        (_, None) => Err(ApiError::NotAuthenticated),
        (_, Some(_)) => Ok(()),
    }
}

/// Object level check: only the owner of the book or staff may change it
pub fn check_book_permission(
    action: Action,
    identity: Option<&User>,
    book: &Book,
) -> Result<(), ApiError> {
    check_permission(action, identity)?;
    match (action, identity) {
        (Action::Read, _) => Ok(()),
        (_, Some(user)) if user.is_staff || book.owner == Some(user.id) => Ok(()),
        _ => Err(ApiError::PermissionDenied),
    }
}
