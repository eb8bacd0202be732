use anyhow::{bail, Context};
use reqwest::header::LOCATION;
use reqwest::{Method, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::RetryTransientMiddleware;
use reqwest_tracing::TracingMiddleware;

use crate::api::{
    BookData, BookDetails, BookId, ListBooksQuery, UserBookRelationData, UserBookRelationPatch,
    UserData, UserDetails, UserId, USER_ID_HEADER,
};

pub struct BookstoreCatalogClient {
    url: String,
    client: ClientWithMiddleware,
    user_id: Option<UserId>,
}

impl BookstoreCatalogClient {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        let reqwest_client = reqwest::Client::builder()
            .build()
            .context("Failed to build reqwest client")?;
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let client = ClientBuilder::new(reqwest_client)
            // Insert the tracing middleware
            .with(TracingMiddleware::default())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            url: url.to_string(),
            client,
            user_id: None,
        })
    }

    /// Sends every following request on behalf of given user
    pub fn as_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self.client.request(method, format!("{}{}", self.url, path));
        match self.user_id {
            Some(user_id) => request.header(USER_ID_HEADER, user_id.to_string()),
            None => request,
        }
    }

    /// Calls GET /books/ endpoint with optional filter, search and ordering
    pub async fn list_books(&self, query: &ListBooksQuery) -> anyhow::Result<Vec<BookData>> {
        let response = self.request(Method::GET, "/books/").query(query).send().await?;
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            let error = response.text().await.unwrap_or_default();
            bail!("Failed to list books {}", error)
        }
    }

    /// Calls POST /books/ endpoint
    /// The created book is owned by the user of this client
    pub async fn create_book(&self, book_details: &BookDetails) -> anyhow::Result<BookData> {
        let response = self
            .request(Method::POST, "/books/")
            .json(book_details)
            .send()
            .await?;
        if response.status() != StatusCode::CREATED {
            let error = response.text().await.unwrap_or_default();
            bail!("Failed to create book {}", error)
        }
        Ok(response.json().await?)
    }

    /// Calls GET /books/{book_id}/ endpoint
    /// Returns None if the book is not in the catalog
    pub async fn get_book(&self, book_id: BookId) -> anyhow::Result<Option<BookData>> {
        let response = self
            .request(Method::GET, &format!("/books/{}/", book_id))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            Ok(None)
        } else if response.status().is_success() {
            Ok(Some(response.json().await?))
        } else {
            let error = response.text().await.unwrap_or_default();
            bail!("Failed to get book {}", error)
        }
    }

    /// Calls PUT /books/{book_id}/ endpoint
    pub async fn update_book(
        &self,
        book_id: BookId,
        book_details: &BookDetails,
    ) -> anyhow::Result<BookData> {
        let response = self
            .request(Method::PUT, &format!("/books/{}/", book_id))
            .json(book_details)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            let status = response.status();
            let error = response.text().await.unwrap_or_default();
            bail!("Failed to update book ({}) {}", status, error)
        }
    }

    /// Calls DELETE /books/{book_id}/ endpoint
    pub async fn delete_book(&self, book_id: BookId) -> anyhow::Result<()> {
        let response = self
            .request(Method::DELETE, &format!("/books/{}/", book_id))
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let error = response.text().await.unwrap_or_default();
            bail!("Failed to delete book ({}) {}", status, error)
        }
    }

    /// Calls PATCH /user-book-relation/{book_id}/ endpoint
    /// Changes the relation between the user of this client and the book
    pub async fn patch_relation(
        &self,
        book_id: BookId,
        patch: &UserBookRelationPatch,
    ) -> anyhow::Result<UserBookRelationData> {
        let response = self
            .request(Method::PATCH, &format!("/user-book-relation/{}/", book_id))
            .json(patch)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            let status = response.status();
            let error = response.text().await.unwrap_or_default();
            bail!("Failed to update relation ({}) {}", status, error)
        }
    }

    /// Calls POST /users/ endpoint
    /// Returns user_id of added user taken from the location header
    pub async fn add_user(&self, user_details: &UserDetails) -> anyhow::Result<UserId> {
        let response = self
            .request(Method::POST, "/users/")
            .json(user_details)
            .send()
            .await?;

        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            bail!("Failed to add user {}", error)
        }

        let location_header = response
            .headers()
            .get(LOCATION)
            .context("No location header")?;

        location_header
            .to_str()
            .context("Failed to convert header to str")?
            .strip_prefix("/users/")
            .and_then(|id| id.strip_suffix('/'))
            .context("Invalid location header")?
            .parse()
            .context("Failed to parse user id")
    }

    /// Calls GET /users/{user_id}/ endpoint
    pub async fn get_user(&self, user_id: UserId) -> anyhow::Result<Option<UserData>> {
        let response = self
            .request(Method::GET, &format!("/users/{}/", user_id))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            Ok(None)
        } else if response.status().is_success() {
            Ok(Some(response.json().await?))
        } else {
            let error = response.text().await.unwrap_or_default();
            bail!("Failed to get user {}", error)
        }
    }
}
