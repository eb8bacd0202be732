use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI32, Ordering};

use serde_json::json;

use crate::api::{BookDetails, BookId, Reader, UserDetails, UserId};
use crate::catalog_repository::{
    AnnotatedBook, Book, CatalogRepository, CatalogRepositoryError, RatingAggregate,
    RelationChanges, User, UserBookRelation,
};
use crate::query::BookFilter;

#[derive(Default)]
struct CatalogTables {
    users: BTreeMap<UserId, User>,
    books: BTreeMap<BookId, Book>,
    // kept in creation order
    relations: Vec<UserBookRelation>,
}

impl CatalogTables {
    fn annotate(&self, book: &Book) -> AnnotatedBook {
        let mut annotated_likes = 0;
        let mut rating = RatingAggregate { sum: 0, count: 0 };
        let mut readers = vec![];

        for relation in self.relations.iter().filter(|r| r.book == book.id) {
            if relation.like {
                annotated_likes += 1;
            }
            if let Some(rate) = relation.rate {
                rating.sum += i64::from(rate);
                rating.count += 1;
            }
            if let Some(reader) = self.users.get(&relation.user) {
                readers.push(Reader {
                    first_name: reader.first_name.clone(),
                    last_name: reader.last_name.clone(),
                });
            }
        }

        AnnotatedBook {
            book: book.clone(),
            owner_name: book
                .owner
                .and_then(|owner| self.users.get(&owner))
                .map(|owner| owner.username.clone()),
            annotated_likes,
            rating: (rating.count > 0).then_some(rating),
            readers,
        }
    }
}

/// Catalog kept in process memory, all tables behind a single lock
#[derive(Default)]
pub struct InMemoryCatalogRepository {
    user_sequence_generator: AtomicI32,
    book_sequence_generator: AtomicI32,
    relation_sequence_generator: AtomicI32,
    tables: parking_lot::RwLock<CatalogTables>,
}

// ids start at 1 like a SERIAL column
fn next_id(sequence_generator: &AtomicI32) -> i32 {
    sequence_generator.fetch_add(1, Ordering::Relaxed) + 1
}

#[async_trait::async_trait]
impl CatalogRepository for InMemoryCatalogRepository {
    async fn add_user(&self, details: UserDetails) -> Result<UserId, CatalogRepositoryError> {
        let mut tables = self.tables.write();
        if tables
            .users
            .values()
            .any(|user| user.username == details.username)
        {
            return Err(CatalogRepositoryError::DuplicateUsername(details.username));
        }
        let id = next_id(&self.user_sequence_generator);
        tables.users.insert(
            id,
            User {
                id,
                username: details.username,
                first_name: details.first_name,
                last_name: details.last_name,
                is_staff: details.is_staff,
            },
        );
        Ok(id)
    }

    async fn get_user(&self, user_id: UserId) -> Result<User, CatalogRepositoryError> {
        self.tables
            .read()
            .users
            .get(&user_id)
            .cloned()
            .ok_or(CatalogRepositoryError::UserNotFound(user_id))
    }

    async fn delete_user(&self, user_id: UserId) -> Result<(), CatalogRepositoryError> {
        let mut tables = self.tables.write();
        tables
            .users
            .remove(&user_id)
            .ok_or(CatalogRepositoryError::UserNotFound(user_id))?;
        tables.relations.retain(|relation| relation.user != user_id);
        for book in tables.books.values_mut() {
            if book.owner == Some(user_id) {
                book.owner = None;
            }
        }
        Ok(())
    }

    async fn add_book(
        &self,
        details: BookDetails,
        owner: Option<UserId>,
    ) -> Result<BookId, CatalogRepositoryError> {
        let mut tables = self.tables.write();
        if let Some(owner) = owner {
            if !tables.users.contains_key(&owner) {
                return Err(CatalogRepositoryError::UserNotFound(owner));
            }
        }
        let id = next_id(&self.book_sequence_generator);
        tables.books.insert(
            id,
            Book {
                id,
                name: details.name,
                price: details.price,
                author_name: details.author_name,
                owner,
            },
        );
        Ok(id)
    }

    async fn get_book(&self, book_id: BookId) -> Result<Book, CatalogRepositoryError> {
        self.tables
            .read()
            .books
            .get(&book_id)
            .cloned()
            .ok_or(CatalogRepositoryError::BookNotFound(book_id))
    }

    async fn get_annotated_book(
        &self,
        book_id: BookId,
    ) -> Result<AnnotatedBook, CatalogRepositoryError> {
        let tables = self.tables.read();
        tables
            .books
            .get(&book_id)
            .map(|book| tables.annotate(book))
            .ok_or(CatalogRepositoryError::BookNotFound(book_id))
    }

    async fn list_books(
        &self,
        filter: &BookFilter,
    ) -> Result<Vec<AnnotatedBook>, CatalogRepositoryError> {
        let tables = self.tables.read();
        let mut books: Vec<&Book> = tables
            .books
            .values()
            .filter(|book| filter.matches(book))
            .collect();
        books.sort_by(|a, b| filter.compare(a, b));
        Ok(books.into_iter().map(|book| tables.annotate(book)).collect())
    }

    async fn update_book(
        &self,
        book_id: BookId,
        details: BookDetails,
    ) -> Result<(), CatalogRepositoryError> {
        let mut tables = self.tables.write();
        let book = tables
            .books
            .get_mut(&book_id)
            .ok_or(CatalogRepositoryError::BookNotFound(book_id))?;
        book.name = details.name;
        book.price = details.price;
        book.author_name = details.author_name;
        Ok(())
    }

    async fn delete_book(&self, book_id: BookId) -> Result<(), CatalogRepositoryError> {
        let mut tables = self.tables.write();
        tables
            .books
            .remove(&book_id)
            .ok_or(CatalogRepositoryError::BookNotFound(book_id))?;
        tables.relations.retain(|relation| relation.book != book_id);
        Ok(())
    }

    async fn update_relation(
        &self,
        user_id: UserId,
        book_id: BookId,
        changes: RelationChanges,
    ) -> Result<UserBookRelation, CatalogRepositoryError> {
        let mut tables = self.tables.write();
        if !tables.users.contains_key(&user_id) {
            return Err(CatalogRepositoryError::UserNotFound(user_id));
        }
        if !tables.books.contains_key(&book_id) {
            return Err(CatalogRepositoryError::BookNotFound(book_id));
        }

        let position = tables
            .relations
            .iter()
            .position(|relation| relation.user == user_id && relation.book == book_id);
        let current = match position {
            Some(index) => tables.relations[index].clone(),
            None => UserBookRelation {
                id: next_id(&self.relation_sequence_generator),
                user: user_id,
                book: book_id,
                like: false,
                in_bookmarks: false,
                rate: None,
            },
        };

        let mut merged = json!(current);
        json_patch::merge(&mut merged, &json!(changes));
        let updated: UserBookRelation = serde_json::from_value(merged)?;

        match position {
            Some(index) => tables.relations[index] = updated.clone(),
            None => tables.relations.push(updated.clone()),
        }
        Ok(updated)
    }

    async fn get_relation(
        &self,
        user_id: UserId,
        book_id: BookId,
    ) -> Result<Option<UserBookRelation>, CatalogRepositoryError> {
        Ok(self
            .tables
            .read()
            .relations
            .iter()
            .find(|relation| relation.user == user_id && relation.book == book_id)
            .cloned())
    }
}
