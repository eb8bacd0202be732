use paperclip::actix::Apiv2Schema;
use serde::{Deserialize, Serialize};

pub type BookId = i32;
pub type UserId = i32;
pub type RelationId = i32;

/// Header carrying the id of the user authenticated by the fronting auth layer
pub const USER_ID_HEADER: &str = "X-User-Id";

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
/// Writable fields of a book, used by create and full update
pub struct BookDetails {
    pub name: String,
    pub price: i32,
    pub author_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct Reader {
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
/// Book as returned by the API, together with its aggregates
pub struct BookData {
    pub id: BookId,
    pub name: String,
    pub price: i32,
    pub author_name: String,
    pub owner: Option<UserId>,
    pub annotated_likes: i64,
    /// Average rate with two fraction digits, null if nobody rated the book
    pub rating: Option<String>,
    pub owner_name: String,
    pub readers: Vec<Reader>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
/// Partial update of the caller's relation to a book. Missing fields keep their values
pub struct UserBookRelationPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub like: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_bookmarks: Option<bool>,
    /// One of the rate choices, as a number or its string form
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct UserBookRelationData {
    pub id: RelationId,
    pub user: UserId,
    pub book: BookId,
    pub like: bool,
    pub in_bookmarks: bool,
    pub rate: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct UserDetails {
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub is_staff: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct UserData {
    pub id: UserId,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_staff: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
/// Query parameters accepted by the book listing
pub struct ListBooksQuery {
    /// Exact price, an empty value does not filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    /// Comma separated `price` / `author_name`, `-` prefix for descending order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordering: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct ErrorDetail {
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
/// Answer to OPTIONS on a resource
pub struct ResourceOptions {
    pub name: String,
    pub renders: Vec<String>,
    pub parses: Vec<String>,
}
