use std::collections::BTreeMap;

use serde::Serialize;

use crate::api::{BookData, BookDetails, UserBookRelationData, UserBookRelationPatch, UserData};
use crate::catalog_repository::{
    AnnotatedBook, RatingAggregate, Rate, RelationChanges, User, UserBookRelation,
};

const MAX_NAME_LENGTH: usize = 255;

/// Field level validation messages, serialized as `{"field": ["message", ...]}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    /// Errors out of a body or query that could not be deserialized.
    ///
    /// Only missing and duplicated fields are named by the deserializer, anything else is
    /// reported under `non_field_errors`.
    pub fn from_deserialize_message(message: &str) -> Self {
        let mut errors = ValidationErrors::default();
        let named = |prefix: &str| {
            message
                .strip_prefix(prefix)
                .and_then(|rest| rest.split('`').next())
                .filter(|field| !field.is_empty())
        };
        if let Some(field) = named("missing field `") {
            errors.add(field, "This field is required.");
        } else if let Some(field) = named("duplicate field `") {
            errors.add(field, "This field may only be given once.");
        } else {
            errors.add("non_field_errors", message);
        }
        errors
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn field(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fields: Vec<_> = self.0.keys().map(String::as_str).collect();
        write!(f, "invalid fields: {}", fields.join(", "))
    }
}

/// Average rate rounded half up to two fraction digits
pub fn format_rating(rating: RatingAggregate) -> Option<String> {
    if rating.count <= 0 {
        return None;
    }
    let hundredths = (rating.sum * 200 + rating.count) / (rating.count * 2);
    Some(format!("{}.{:02}", hundredths / 100, hundredths % 100))
}

pub fn serialize_book(annotated: AnnotatedBook) -> BookData {
    let AnnotatedBook {
        book,
        owner_name,
        annotated_likes,
        rating,
        readers,
    } = annotated;
    BookData {
        id: book.id,
        name: book.name,
        price: book.price,
        author_name: book.author_name,
        owner: book.owner,
        annotated_likes,
        rating: rating.and_then(format_rating),
        owner_name: owner_name.unwrap_or_default(),
        readers,
    }
}

pub fn serialize_relation(relation: UserBookRelation) -> UserBookRelationData {
    UserBookRelationData {
        id: relation.id,
        user: relation.user,
        book: relation.book,
        like: relation.like,
        in_bookmarks: relation.in_bookmarks,
        rate: relation.rate.map(Rate::value),
    }
}

pub fn serialize_user(user: User) -> UserData {
    UserData {
        id: user.id,
        username: user.username,
        first_name: user.first_name,
        last_name: user.last_name,
        is_staff: user.is_staff,
    }
}

fn validate_name(errors: &mut ValidationErrors, field: &'static str, value: &str) {
    if value.trim().is_empty() {
        errors.add(field, "This field may not be blank.");
    } else if value.chars().count() > MAX_NAME_LENGTH {
        errors.add(
            field,
            format!("Ensure this field has no more than {MAX_NAME_LENGTH} characters."),
        );
    }
}

pub fn validate_book_details(details: &BookDetails) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();
    validate_name(&mut errors, "name", &details.name);
    validate_name(&mut errors, "author_name", &details.author_name);
    errors.into_result()
}

pub fn validate_relation_patch(
    patch: UserBookRelationPatch,
) -> Result<RelationChanges, ValidationErrors> {
    let mut errors = ValidationErrors::default();
    let rate = match patch.rate.as_ref().map(Rate::try_from).transpose() {
        Ok(rate) => rate,
        Err(invalid) => {
            errors.add("rate", invalid.to_string());
            None
        }
    };
    errors.into_result()?;
    Ok(RelationChanges {
        like: patch.like,
        in_bookmarks: patch.in_bookmarks,
        rate,
    })
}

pub fn validate_user_details(username: &str) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();
    validate_name(&mut errors, "username", username);
    errors.into_result()
}
