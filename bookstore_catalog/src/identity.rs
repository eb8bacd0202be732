use actix_web::dev::Payload;
use actix_web::web::Data;
use actix_web::{FromRequest, HttpRequest};
use futures_util::future::LocalBoxFuture;
use paperclip::actix::OperationModifier;
use paperclip::v2::schema::Apiv2Schema;

use crate::api::{UserId, USER_ID_HEADER};
use crate::catalog_repository::{CatalogRepositoryError, SharedCatalogRepository, User};
use crate::error::ApiError;

/// Caller of the request as established by the fronting auth layer.
///
/// The layer puts the authenticated user id into the `X-User-Id` header. Requests without
/// it are anonymous, an id that is malformed or unknown to the catalog is rejected.
#[derive(Debug, Clone, Default)]
pub struct Identity(Option<User>);

impl Identity {
    pub fn anonymous() -> Self {
        Self(None)
    }

    pub fn user(&self) -> Option<&User> {
        self.0.as_ref()
    }

    pub fn require(&self) -> Result<&User, ApiError> {
        self.user().ok_or(ApiError::NotAuthenticated)
    }
}

impl From<User> for Identity {
    fn from(user: User) -> Self {
        Self(Some(user))
    }
}

fn parse_user_id(req: &HttpRequest) -> Option<Result<UserId, ApiError>> {
    req.headers().get(USER_ID_HEADER).map(|value| {
        value
            .to_str()
            .ok()
            .and_then(|value| value.trim().parse().ok())
            .ok_or(ApiError::InvalidIdentity)
    })
}

impl FromRequest for Identity {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let user_id = parse_user_id(req);
        let catalog = req.app_data::<Data<SharedCatalogRepository>>().cloned();

        Box::pin(async move {
            let user_id = match user_id {
                None => return Ok(Identity::anonymous()),
                Some(user_id) => user_id?,
            };
            let catalog = catalog.ok_or_else(|| {
                ApiError::Internal(CatalogRepositoryError::Other(
                    "Catalog repository is not configured".to_string(),
                ))
            })?;
            match catalog.get_user(user_id).await {
                Ok(user) => Ok(Identity::from(user)),
                Err(CatalogRepositoryError::UserNotFound(_)) => {
                    tracing::warn!("Request with unknown user id {}", user_id);
                    Err(ApiError::InvalidIdentity)
                }
                Err(err) => Err(ApiError::Internal(err)),
            }
        })
    }
}

impl Apiv2Schema for Identity {}
impl OperationModifier for Identity {}
