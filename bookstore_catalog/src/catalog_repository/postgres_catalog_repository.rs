use std::collections::HashMap;

use anyhow::Context;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls, Row, Statement};

use crate::api::{BookDetails, BookId, Reader, UserDetails, UserId};
use crate::catalog_repository::{
    AnnotatedBook, Book, CatalogRepository, CatalogRepositoryError, RatingAggregate, Rate,
    RelationChanges, User, UserBookRelation,
};
use crate::query::BookFilter;

const ANNOTATED_BOOKS_SELECT: &str = r#"
    SELECT b.id, b.name, b.price, b.author_name, b.owner_id, u.username,
           COUNT(r.id) FILTER (WHERE r."like") AS annotated_likes,
           SUM(r.rate)::BIGINT AS rate_sum,
           COUNT(r.rate) AS rate_count
    FROM books b
    LEFT JOIN users u ON u.id = b.owner_id
    LEFT JOIN user_book_relations r ON r.book_id = b.id
"#;

const RELATION_COLUMNS: &str = r#"id, user_id, book_id, "like", in_bookmarks, rate"#;

pub struct PostgresCatalogRepository {
    client: Client,
}

pub struct PostgresCatalogRepositoryConfig {
    pub hostname: String,
    pub username: String,
    pub password: String,
}

impl PostgresCatalogRepository {
    pub async fn init(config: PostgresCatalogRepositoryConfig) -> anyhow::Result<Self> {
        let connection_str = format!(
            "postgresql://{}:{}@{}",
            config.username, config.password, config.hostname
        );
        tracing::info!("Connecting to postgres at {}", config.hostname);
        let (client, connection) = tokio_postgres::connect(&connection_str, NoTls)
            .await
            .context("Failed to start postgres")?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("Postgres connection error: {}", e);
            }
        });

        client
            .batch_execute(
                "
        CREATE TABLE IF NOT EXISTS users (
            id              SERIAL PRIMARY KEY,
            username        VARCHAR(255) NOT NULL UNIQUE,
            first_name      VARCHAR(255) NOT NULL DEFAULT '',
            last_name       VARCHAR(255) NOT NULL DEFAULT '',
            is_staff        BOOLEAN NOT NULL DEFAULT FALSE
            )
        ",
            )
            .await
            .context("Failed to setup users table")?;

        client
            .batch_execute(
                "
        CREATE TABLE IF NOT EXISTS books (
            id              SERIAL PRIMARY KEY,
            name            VARCHAR(255) NOT NULL,
            price           INTEGER NOT NULL,
            author_name     VARCHAR(255) NOT NULL,
            owner_id        INTEGER REFERENCES users (id) ON DELETE SET NULL
            )
        ",
            )
            .await
            .context("Failed to setup books table")?;

        client
            .batch_execute(
                r#"
        CREATE TABLE IF NOT EXISTS user_book_relations (
            id              SERIAL PRIMARY KEY,
            user_id         INTEGER NOT NULL REFERENCES users (id) ON DELETE CASCADE,
            book_id         INTEGER NOT NULL REFERENCES books (id) ON DELETE CASCADE,
            "like"          BOOLEAN NOT NULL DEFAULT FALSE,
            in_bookmarks    BOOLEAN NOT NULL DEFAULT FALSE,
            rate            SMALLINT CHECK (rate BETWEEN 1 AND 5),
            UNIQUE (user_id, book_id)
            )
        "#,
            )
            .await
            .context("Failed to setup user_book_relations table")?;

        Ok(Self { client })
    }

    /// Two round trips whatever the number of books: the aggregate query, then the
    /// readers of all returned books in a single `ANY($1)` query
    async fn query_annotated_books(
        &self,
        condition: &str,
        params: &[&(dyn ToSql + Sync)],
        order_by: &str,
    ) -> Result<Vec<AnnotatedBook>, CatalogRepositoryError> {
        let query = format!(
            "{ANNOTATED_BOOKS_SELECT} WHERE {condition} GROUP BY b.id, u.username ORDER BY {order_by}"
        );
        let rows = self.client.query(&query, params).await?;

        let mut books = rows
            .iter()
            .map(|row| {
                let rate_sum: Option<i64> = row.try_get("rate_sum")?;
                let rate_count: i64 = row.try_get("rate_count")?;
                Ok(AnnotatedBook {
                    book: book_from_row(row)?,
                    owner_name: row.try_get("username")?,
                    annotated_likes: row.try_get("annotated_likes")?,
                    rating: (rate_count > 0).then(|| RatingAggregate {
                        sum: rate_sum.unwrap_or_default(),
                        count: rate_count,
                    }),
                    readers: vec![],
                })
            })
            .collect::<Result<Vec<_>, CatalogRepositoryError>>()?;

        if books.is_empty() {
            return Ok(books);
        }

        let book_ids: Vec<BookId> = books.iter().map(|annotated| annotated.book.id).collect();
        let reader_rows = self
            .client
            .query(
                "SELECT r.book_id, u.first_name, u.last_name
                 FROM user_book_relations r
                 JOIN users u ON u.id = r.user_id
                 WHERE r.book_id = ANY($1)
                 ORDER BY r.id",
                &[&book_ids],
            )
            .await?;

        let mut readers: HashMap<BookId, Vec<Reader>> = HashMap::new();
        for row in reader_rows {
            readers
                .entry(row.try_get(0)?)
                .or_default()
                .push(Reader {
                    first_name: row.try_get(1)?,
                    last_name: row.try_get(2)?,
                });
        }
        for annotated in &mut books {
            annotated.readers = readers.remove(&annotated.book.id).unwrap_or_default();
        }
        Ok(books)
    }
}

fn book_from_row(row: &Row) -> Result<Book, tokio_postgres::Error> {
    Ok(Book {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        price: row.try_get("price")?,
        author_name: row.try_get("author_name")?,
        owner: row.try_get("owner_id")?,
    })
}

fn relation_from_row(row: &Row) -> Result<UserBookRelation, CatalogRepositoryError> {
    let rate: Option<i16> = row.try_get("rate")?;
    Ok(UserBookRelation {
        id: row.try_get("id")?,
        user: row.try_get("user_id")?,
        book: row.try_get("book_id")?,
        like: row.try_get("like")?,
        in_bookmarks: row.try_get("in_bookmarks")?,
        rate: rate
            .map(|rate| Rate::try_from(i64::from(rate)))
            .transpose()
            .map_err(|err| CatalogRepositoryError::Other(err.to_string()))?,
    })
}

fn is_violation(err: &tokio_postgres::Error, state: &SqlState) -> bool {
    err.as_db_error()
        .map(|db_err| db_err.code() == state)
        .unwrap_or_default()
}

#[async_trait::async_trait]
impl CatalogRepository for PostgresCatalogRepository {
    async fn add_user(&self, details: UserDetails) -> Result<UserId, CatalogRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare(
                "INSERT INTO users (username, first_name, last_name, is_staff)
                 VALUES ($1, $2, $3, $4) RETURNING id",
            )
            .await?;

        let rows = self
            .client
            .query(
                &stmt,
                &[
                    &details.username,
                    &details.first_name,
                    &details.last_name,
                    &details.is_staff,
                ],
            )
            .await;

        match rows {
            Ok(rows) => Ok(rows
                .first()
                .ok_or_else(|| CatalogRepositoryError::Other("Id not returned".to_string()))?
                .try_get(0)?),
            Err(err) if is_violation(&err, &SqlState::UNIQUE_VIOLATION) => {
                Err(CatalogRepositoryError::DuplicateUsername(details.username))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn get_user(&self, user_id: UserId) -> Result<User, CatalogRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare(
                "SELECT id, username, first_name, last_name, is_staff FROM users WHERE id = ($1)",
            )
            .await?;

        let rows = self.client.query(&stmt, &[&user_id]).await?;
        let row = rows
            .first()
            .ok_or(CatalogRepositoryError::UserNotFound(user_id))?;

        Ok(User {
            id: row.try_get(0)?,
            username: row.try_get(1)?,
            first_name: row.try_get(2)?,
            last_name: row.try_get(3)?,
            is_staff: row.try_get(4)?,
        })
    }

    async fn delete_user(&self, user_id: UserId) -> Result<(), CatalogRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("DELETE FROM users WHERE id = ($1) RETURNING id")
            .await?;

        let rows = self.client.query(&stmt, &[&user_id]).await?;
        if rows.is_empty() {
            Err(CatalogRepositoryError::UserNotFound(user_id))
        } else {
            Ok(())
        }
    }

    async fn add_book(
        &self,
        details: BookDetails,
        owner: Option<UserId>,
    ) -> Result<BookId, CatalogRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare(
                "INSERT INTO books (name, price, author_name, owner_id)
                 VALUES ($1, $2, $3, $4) RETURNING id",
            )
            .await?;

        let rows = self
            .client
            .query(
                &stmt,
                &[&details.name, &details.price, &details.author_name, &owner],
            )
            .await;

        match rows {
            Ok(rows) => Ok(rows
                .first()
                .ok_or_else(|| CatalogRepositoryError::Other("Id not returned".to_string()))?
                .try_get(0)?),
            Err(err) if is_violation(&err, &SqlState::FOREIGN_KEY_VIOLATION) => Err(
                CatalogRepositoryError::UserNotFound(owner.unwrap_or_default()),
            ),
            Err(err) => Err(err.into()),
        }
    }

    async fn get_book(&self, book_id: BookId) -> Result<Book, CatalogRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("SELECT id, name, price, author_name, owner_id FROM books WHERE id = ($1)")
            .await?;

        let rows = self.client.query(&stmt, &[&book_id]).await?;
        let row = rows
            .first()
            .ok_or(CatalogRepositoryError::BookNotFound(book_id))?;
        Ok(book_from_row(row)?)
    }

    async fn get_annotated_book(
        &self,
        book_id: BookId,
    ) -> Result<AnnotatedBook, CatalogRepositoryError> {
        self.query_annotated_books("b.id = $1", &[&book_id], "b.id")
            .await?
            .pop()
            .ok_or(CatalogRepositoryError::BookNotFound(book_id))
    }

    async fn list_books(
        &self,
        filter: &BookFilter,
    ) -> Result<Vec<AnnotatedBook>, CatalogRepositoryError> {
        let conditions = filter.sql_conditions();
        self.query_annotated_books(
            &conditions.clause,
            &conditions.params(),
            &filter.sql_order_by(),
        )
        .await
    }

    async fn update_book(
        &self,
        book_id: BookId,
        details: BookDetails,
    ) -> Result<(), CatalogRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare(
                "UPDATE books SET name = $1, price = $2, author_name = $3
                 WHERE id = ($4) RETURNING id",
            )
            .await?;

        let rows = self
            .client
            .query(
                &stmt,
                &[&details.name, &details.price, &details.author_name, &book_id],
            )
            .await?;
        if rows.is_empty() {
            Err(CatalogRepositoryError::BookNotFound(book_id))
        } else {
            Ok(())
        }
    }

    async fn delete_book(&self, book_id: BookId) -> Result<(), CatalogRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("DELETE FROM books WHERE id = ($1) RETURNING id")
            .await?;

        let rows = self.client.query(&stmt, &[&book_id]).await?;
        if rows.is_empty() {
            Err(CatalogRepositoryError::BookNotFound(book_id))
        } else {
            Ok(())
        }
    }

    async fn update_relation(
        &self,
        user_id: UserId,
        book_id: BookId,
        changes: RelationChanges,
    ) -> Result<UserBookRelation, CatalogRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare(&format!(
                r#"INSERT INTO user_book_relations (user_id, book_id, "like", in_bookmarks, rate)
                 VALUES ($1, $2, COALESCE($3::BOOLEAN, FALSE), COALESCE($4::BOOLEAN, FALSE), $5::SMALLINT)
                 ON CONFLICT (user_id, book_id) DO UPDATE SET
                     "like" = COALESCE($3::BOOLEAN, user_book_relations."like"),
                     in_bookmarks = COALESCE($4::BOOLEAN, user_book_relations.in_bookmarks),
                     rate = COALESCE($5::SMALLINT, user_book_relations.rate)
                 RETURNING {RELATION_COLUMNS}"#
            ))
            .await?;

        let rate: Option<i16> = changes.rate.map(|rate| rate.value() as i16);
        let rows = self
            .client
            .query(
                &stmt,
                &[
                    &user_id,
                    &book_id,
                    &changes.like,
                    &changes.in_bookmarks,
                    &rate,
                ],
            )
            .await;

        match rows {
            Ok(rows) => relation_from_row(rows.first().ok_or_else(|| {
                CatalogRepositoryError::Other("Relation not returned".to_string())
            })?),
            Err(err) if is_violation(&err, &SqlState::FOREIGN_KEY_VIOLATION) => {
                let user_missing = err
                    .as_db_error()
                    .and_then(|db_err| db_err.constraint())
                    .is_some_and(|constraint| constraint.contains("user_id"));
                if user_missing {
                    Err(CatalogRepositoryError::UserNotFound(user_id))
                } else {
                    Err(CatalogRepositoryError::BookNotFound(book_id))
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn get_relation(
        &self,
        user_id: UserId,
        book_id: BookId,
    ) -> Result<Option<UserBookRelation>, CatalogRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare(&format!(
                "SELECT {RELATION_COLUMNS} FROM user_book_relations
                 WHERE user_id = ($1) AND book_id = ($2)"
            ))
            .await?;

        let rows = self.client.query(&stmt, &[&user_id, &book_id]).await?;
        rows.first().map(relation_from_row).transpose()
    }
}

#[cfg(all(test, feature = "postgres_tests"))]
mod postgres_catalog_repository_tests {
    use serial_test::file_serial;
    use testcontainers::core::IntoContainerPort;
    use testcontainers::runners::AsyncRunner;
    use testcontainers::{ContainerAsync, GenericImage, ImageExt};

    use crate::api::{BookDetails, ListBooksQuery, UserDetails};
    use crate::catalog_repository::{
        CatalogRepository, CatalogRepositoryError, PostgresCatalogRepository,
        PostgresCatalogRepositoryConfig, RatingAggregate, Rate, RelationChanges,
    };
    use crate::query::BookFilter;

    async fn start_postgres_container_and_init_repo(
    ) -> (ContainerAsync<GenericImage>, PostgresCatalogRepository) {
        let pg_container = GenericImage::new("postgres", "latest")
            .with_mapped_port(5432, 5432.tcp())
            .with_env_var("POSTGRES_USER", "postgres")
            .with_env_var("POSTGRES_PASSWORD", "postgres")
            .start()
            .await
            .expect("Failed to start postgres");

        for _ in 0..10 {
            if let Ok(repo) = PostgresCatalogRepository::init(PostgresCatalogRepositoryConfig {
                hostname: "127.0.0.1".to_string(),
                username: "postgres".to_string(),
                password: "postgres".to_string(),
            })
            .await
            {
                return (pg_container, repo);
            }
            tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        }
        panic!("Failed to setup postgres container")
    }

    fn user_details(username: &str, is_staff: bool) -> UserDetails {
        UserDetails {
            username: username.to_string(),
            first_name: format!("{username} first"),
            last_name: format!("{username} last"),
            is_staff,
        }
    }

    fn book_details(name: &str, price: i32, author_name: &str) -> BookDetails {
        BookDetails {
            name: name.to_string(),
            price,
            author_name: author_name.to_string(),
        }
    }

    #[tokio::test]
    #[file_serial(key, path => "../.pgtestslock")]
    /// Tests users, books and their cascades
    /// for the sake of not starting container multiple times it tests everything in one testcase
    async fn test_users_books_and_cascades() {
        let (_container, repo) = start_postgres_container_and_init_repo().await;

        assert!(matches!(
            repo.get_book(20000).await,
            Err(CatalogRepositoryError::BookNotFound(20000))
        ));
        assert!(matches!(
            repo.get_user(20000).await,
            Err(CatalogRepositoryError::UserNotFound(20000))
        ));

        let owner = repo.add_user(user_details("owner", false)).await.unwrap();
        assert!(matches!(
            repo.add_user(user_details("owner", true)).await,
            Err(CatalogRepositoryError::DuplicateUsername(..))
        ));
        let staff = repo.add_user(user_details("staff", true)).await.unwrap();
        assert!(repo.get_user(staff).await.unwrap().is_staff);

        let book = repo
            .add_book(book_details("Book1", 11, "author1"), Some(owner))
            .await
            .unwrap();
        repo.update_book(book, book_details("Book1", 123, "author1"))
            .await
            .unwrap();
        let stored = repo.get_book(book).await.unwrap();
        assert_eq!(stored.price, 123);
        assert_eq!(stored.owner, Some(owner));

        repo.update_relation(
            owner,
            book,
            RelationChanges {
                like: Some(true),
                ..RelationChanges::default()
            },
        )
        .await
        .unwrap();

        repo.delete_user(owner).await.unwrap();
        let annotated = repo.get_annotated_book(book).await.unwrap();
        assert_eq!(annotated.book.owner, None);
        assert_eq!(annotated.owner_name, None);
        assert_eq!(annotated.annotated_likes, 0);

        repo.delete_book(book).await.unwrap();
        assert!(matches!(
            repo.get_annotated_book(book).await,
            Err(CatalogRepositoryError::BookNotFound(..))
        ));
    }

    #[tokio::test]
    #[file_serial(key, path => "../.pgtestslock")]
    /// Tests listing with filters and annotations
    /// for the sake of not starting container multiple times it tests everything in one testcase
    async fn test_list_annotated_books() {
        let (_container, repo) = start_postgres_container_and_init_repo().await;

        let user1 = repo.add_user(user_details("user1", false)).await.unwrap();
        let user2 = repo.add_user(user_details("user2", false)).await.unwrap();

        let id_1 = repo
            .add_book(book_details("Book1", 11, "author1"), Some(user1))
            .await
            .unwrap();
        let id_2 = repo
            .add_book(book_details("Book2", 22, "author1"), None)
            .await
            .unwrap();
        let id_3 = repo
            .add_book(book_details("Book3", 33, "Book1 author2"), None)
            .await
            .unwrap();

        for (user, rate) in [(user1, Rate::Incredible), (user2, Rate::Amazing)] {
            repo.update_relation(
                user,
                id_1,
                RelationChanges {
                    like: Some(true),
                    rate: Some(rate),
                    ..RelationChanges::default()
                },
            )
            .await
            .unwrap();
        }

        let all = repo.list_books(&BookFilter::default()).await.unwrap();
        assert_eq!(
            all.iter().map(|b| b.book.id).collect::<Vec<_>>(),
            vec![id_1, id_2, id_3]
        );
        assert_eq!(all[0].annotated_likes, 2);
        assert_eq!(all[0].rating, Some(RatingAggregate { sum: 9, count: 2 }));
        assert_eq!(all[0].owner_name.as_deref(), Some("user1"));
        assert_eq!(all[0].readers.len(), 2);
        assert_eq!(all[1].annotated_likes, 0);
        assert_eq!(all[1].rating, None);

        let search = BookFilter::try_from(&ListBooksQuery {
            search: Some("book1".to_string()),
            ..ListBooksQuery::default()
        })
        .unwrap();
        assert_eq!(
            repo.list_books(&search)
                .await
                .unwrap()
                .iter()
                .map(|b| b.book.id)
                .collect::<Vec<_>>(),
            vec![id_1, id_3]
        );

        let by_price = BookFilter::try_from(&ListBooksQuery {
            price: Some("33".to_string()),
            ordering: Some("-price".to_string()),
            ..ListBooksQuery::default()
        })
        .unwrap();
        let books = repo.list_books(&by_price).await.unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].book.id, id_3);

        let patched = repo
            .update_relation(
                user1,
                id_1,
                RelationChanges {
                    in_bookmarks: Some(true),
                    ..RelationChanges::default()
                },
            )
            .await
            .unwrap();
        assert!(patched.like);
        assert!(patched.in_bookmarks);
        assert_eq!(patched.rate, Some(Rate::Incredible));
        assert_eq!(
            repo.get_relation(user1, id_1).await.unwrap(),
            Some(patched)
        );

        assert!(matches!(
            repo.update_relation(user1, 2000, RelationChanges::default())
                .await,
            Err(CatalogRepositoryError::BookNotFound(2000))
        ));
    }

    #[tokio::test]
    #[file_serial(key, path => "../.pgtestslock")]
    /// Readers fetched in one batch for the whole listing end up on their own books
    async fn test_readers_of_listed_books() {
        let (_container, repo) = start_postgres_container_and_init_repo().await;

        let user1 = repo.add_user(user_details("reader1", false)).await.unwrap();
        let user2 = repo.add_user(user_details("reader2", false)).await.unwrap();
        let id_1 = repo
            .add_book(book_details("Book1", 11, "author1"), None)
            .await
            .unwrap();
        let id_2 = repo
            .add_book(book_details("Book2", 22, "author1"), None)
            .await
            .unwrap();
        let id_3 = repo
            .add_book(book_details("Book3", 33, "author2"), None)
            .await
            .unwrap();

        for (user, book) in [(user2, id_1), (user1, id_1), (user1, id_3)] {
            repo.update_relation(
                user,
                book,
                RelationChanges {
                    in_bookmarks: Some(true),
                    ..RelationChanges::default()
                },
            )
            .await
            .unwrap();
        }

        let books = repo.list_books(&BookFilter::default()).await.unwrap();
        let readers: Vec<Vec<String>> = books
            .iter()
            .map(|annotated| {
                annotated
                    .readers
                    .iter()
                    .map(|reader| reader.first_name.clone())
                    .collect()
            })
            .collect();
        assert_eq!(
            books.iter().map(|b| b.book.id).collect::<Vec<_>>(),
            vec![id_1, id_2, id_3]
        );
        assert_eq!(
            readers,
            vec![
                vec!["reader2 first".to_string(), "reader1 first".to_string()],
                vec![],
                vec!["reader1 first".to_string()],
            ]
        );
    }
}
