pub use in_memory_catalog_repository::InMemoryCatalogRepository;
pub use postgres_catalog_repository::{PostgresCatalogRepository, PostgresCatalogRepositoryConfig};

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::api::{BookDetails, BookId, Reader, RelationId, UserDetails, UserId};
use crate::query::BookFilter;

mod in_memory_catalog_repository;
mod postgres_catalog_repository;

#[derive(thiserror::Error, Debug)]
pub enum CatalogRepositoryError {
    #[error("Book {0} not found")]
    BookNotFound(BookId),

    #[error("User {0} not found")]
    UserNotFound(UserId),

    #[error("Username {0} is already taken")]
    DuplicateUsername(String),

    #[error("Failed to deserialize record: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("DatabaseFailure failure {0}")]
    DatabaseFailure(#[from] tokio_postgres::Error),

    #[error("Other error {0}")]
    Other(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("\"{0}\" is not a valid choice.")]
pub struct InvalidRate(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Rate {
    Ok = 1,
    Fine = 2,
    Good = 3,
    Amazing = 4,
    Incredible = 5,
}

impl Rate {
    pub fn value(self) -> i32 {
        self as i32
    }

    pub fn label(self) -> &'static str {
        match self {
            Rate::Ok => "Ok",
            Rate::Fine => "Fine",
            Rate::Good => "Good",
            Rate::Amazing => "Amazing",
            Rate::Incredible => "Incredible",
        }
    }
}

impl TryFrom<i64> for Rate {
    type Error = InvalidRate;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Rate::Ok),
            2 => Ok(Rate::Fine),
            3 => Ok(Rate::Good),
            4 => Ok(Rate::Amazing),
            5 => Ok(Rate::Incredible),
            other => Err(InvalidRate(other.to_string())),
        }
    }
}

/// Rate sent by an API caller, an integer or the same integer written as a string
impl TryFrom<&serde_json::Value> for Rate {
    type Error = InvalidRate;

    fn try_from(value: &serde_json::Value) -> Result<Self, Self::Error> {
        let (choice, text) = match value {
            serde_json::Value::Number(number) => (number.as_i64(), number.to_string()),
            serde_json::Value::String(text) => (
                text.parse::<i64>()
                    .ok()
                    .filter(|choice| choice.to_string() == *text),
                text.clone(),
            ),
            other => (None, other.to_string()),
        };
        choice
            .ok_or_else(|| InvalidRate(text.clone()))
            .and_then(Rate::try_from)
            .map_err(|_| InvalidRate(text))
    }
}

impl From<Rate> for i64 {
    fn from(rate: Rate) -> Self {
        rate.value() as i64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_staff: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Book {
    pub id: BookId,
    pub name: String,
    pub price: i32,
    pub author_name: String,
    pub owner: Option<UserId>,
}

/// Sum and count of the non-null rates given to a book
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatingAggregate {
    pub sum: i64,
    pub count: i64,
}

/// Book with the aggregates computed by the query layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedBook {
    pub book: Book,
    pub owner_name: Option<String>,
    pub annotated_likes: i64,
    /// None when no relation carries a rate
    pub rating: Option<RatingAggregate>,
    pub readers: Vec<Reader>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBookRelation {
    pub id: RelationId,
    pub user: UserId,
    pub book: BookId,
    pub like: bool,
    pub in_bookmarks: bool,
    pub rate: Option<Rate>,
}

/// Validated partial update of a relation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelationChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub like: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_bookmarks: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<Rate>,
}

pub type SharedCatalogRepository = Arc<dyn CatalogRepository>;

#[async_trait::async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Registers a user, returns the id assigned to it
    async fn add_user(&self, details: UserDetails) -> Result<UserId, CatalogRepositoryError>;
    async fn get_user(&self, user_id: UserId) -> Result<User, CatalogRepositoryError>;
    /// Removes a user together with its relations, books it owned become unowned
    async fn delete_user(&self, user_id: UserId) -> Result<(), CatalogRepositoryError>;

    /// Adds book to repository, returns an id assigned to the book
    async fn add_book(
        &self,
        details: BookDetails,
        owner: Option<UserId>,
    ) -> Result<BookId, CatalogRepositoryError>;
    /// Retrieves the stored fields of the book, without aggregates
    async fn get_book(&self, book_id: BookId) -> Result<Book, CatalogRepositoryError>;
    async fn get_annotated_book(
        &self,
        book_id: BookId,
    ) -> Result<AnnotatedBook, CatalogRepositoryError>;
    /// Lists books matching the filter, in the order it requests
    async fn list_books(
        &self,
        filter: &BookFilter,
    ) -> Result<Vec<AnnotatedBook>, CatalogRepositoryError>;
    /// Replaces writable fields of the book, the owner is kept
    async fn update_book(
        &self,
        book_id: BookId,
        details: BookDetails,
    ) -> Result<(), CatalogRepositoryError>;
    async fn delete_book(&self, book_id: BookId) -> Result<(), CatalogRepositoryError>;

    /// Applies changes to the relation of the user to the book, creating it on first use
    async fn update_relation(
        &self,
        user_id: UserId,
        book_id: BookId,
        changes: RelationChanges,
    ) -> Result<UserBookRelation, CatalogRepositoryError>;
    async fn get_relation(
        &self,
        user_id: UserId,
        book_id: BookId,
    ) -> Result<Option<UserBookRelation>, CatalogRepositoryError>;
}
