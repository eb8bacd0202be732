use std::cmp::Ordering;

use tokio_postgres::types::ToSql;

use crate::api::ListBooksQuery;
use crate::catalog_repository::Book;
use crate::serialization::ValidationErrors;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Price,
    AuthorName,
}

impl SortField {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "price" => Some(SortField::Price),
            "author_name" => Some(SortField::AuthorName),
            _ => None,
        }
    }

    fn column(self) -> &'static str {
        match self {
            SortField::Price => "b.price",
            SortField::AuthorName => "b.author_name",
        }
    }

    fn compare(self, a: &Book, b: &Book) -> Ordering {
        match self {
            SortField::Price => a.price.cmp(&b.price),
            SortField::AuthorName => a.author_name.cmp(&b.author_name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderingTerm {
    pub field: SortField,
    pub descending: bool,
}

/// Narrowing and ordering of the book listing.
///
/// Search terms are matched case-insensitively as substrings; every term must be
/// found in the name or in the author name. Books are always ordered by id last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookFilter {
    pub price: Option<i32>,
    pub search_terms: Vec<String>,
    pub ordering: Vec<OrderingTerm>,
}

/// WHERE clause with its positional parameters, ready for tokio-postgres
pub struct SqlConditions {
    pub clause: String,
    pub params: Vec<Box<dyn ToSql + Sync + Send>>,
}

impl SqlConditions {
    pub fn params(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params
            .iter()
            .map(|param| param.as_ref() as &(dyn ToSql + Sync))
            .collect()
    }
}

impl TryFrom<&ListBooksQuery> for BookFilter {
    type Error = ValidationErrors;

    fn try_from(query: &ListBooksQuery) -> Result<Self, Self::Error> {
        let price = match query.price.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(price) => match price.parse() {
                Ok(price) => Some(price),
                Err(_) => {
                    let mut errors = ValidationErrors::default();
                    errors.add("price", "Enter a number.");
                    return Err(errors);
                }
            },
        };

        let search_terms = query
            .search
            .as_deref()
            .unwrap_or_default()
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|term| !term.is_empty())
            .map(str::to_string)
            .collect();

        let ordering = query
            .ordering
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter_map(|term| {
                let (descending, name) = match term.strip_prefix('-') {
                    Some(name) => (true, name),
                    None => (false, term),
                };
                SortField::from_name(name).map(|field| OrderingTerm { field, descending })
            })
            .collect();

        Ok(Self {
            price,
            search_terms,
            ordering,
        })
    }
}

impl BookFilter {
    pub fn matches(&self, book: &Book) -> bool {
        if self.price.is_some_and(|price| price != book.price) {
            return false;
        }
        let name = book.name.to_lowercase();
        let author_name = book.author_name.to_lowercase();
        self.search_terms.iter().all(|term| {
            let term = term.to_lowercase();
            name.contains(&term) || author_name.contains(&term)
        })
    }

    pub fn compare(&self, a: &Book, b: &Book) -> Ordering {
        self.ordering
            .iter()
            .map(|term| {
                let ordering = term.field.compare(a, b);
                if term.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| a.id.cmp(&b.id))
    }

    /// Conditions over the `books` table aliased as `b`, parameters numbered from 1
    pub fn sql_conditions(&self) -> SqlConditions {
        let mut conditions = vec![];
        let mut params: Vec<Box<dyn ToSql + Sync + Send>> = vec![];

        if let Some(price) = self.price {
            params.push(Box::new(price));
            conditions.push(format!("b.price = ${}", params.len()));
        }
        for term in &self.search_terms {
            params.push(Box::new(like_pattern(term)));
            let n = params.len();
            conditions.push(format!(
                "(b.name ILIKE ${n} ESCAPE '\\' OR b.author_name ILIKE ${n} ESCAPE '\\')"
            ));
        }

        let clause = if conditions.is_empty() {
            "TRUE".to_string()
        } else {
            conditions.join(" AND ")
        };
        SqlConditions { clause, params }
    }

    pub fn sql_order_by(&self) -> String {
        self.ordering
            .iter()
            .map(|term| {
                if term.descending {
                    format!("{} DESC", term.field.column())
                } else {
                    term.field.column().to_string()
                }
            })
            .chain(std::iter::once("b.id".to_string()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod query_tests {
    use crate::api::ListBooksQuery;
    use crate::catalog_repository::Book;
    use crate::query::{like_pattern, BookFilter, OrderingTerm, SortField};

    fn book(id: i32, name: &str, price: i32, author_name: &str) -> Book {
        Book {
            id,
            name: name.to_string(),
            price,
            author_name: author_name.to_string(),
            owner: None,
        }
    }

    #[test]
    fn parses_ordering_and_ignores_unknown_fields() {
        let filter = BookFilter::try_from(&ListBooksQuery {
            ordering: Some("-price, name,author_name".to_string()),
            ..ListBooksQuery::default()
        })
        .unwrap();
        assert_eq!(
            filter.ordering,
            vec![
                OrderingTerm {
                    field: SortField::Price,
                    descending: true
                },
                OrderingTerm {
                    field: SortField::AuthorName,
                    descending: false
                }
            ]
        );
        assert_eq!(filter.sql_order_by(), "b.price DESC, b.author_name, b.id");
    }

    #[test]
    fn search_is_case_insensitive_over_name_or_author() {
        let filter = BookFilter::try_from(&ListBooksQuery {
            search: Some("book1".to_string()),
            ..ListBooksQuery::default()
        })
        .unwrap();
        assert!(filter.matches(&book(1, "Book1", 11, "author1")));
        assert!(!filter.matches(&book(2, "Book2", 22, "author1")));
        assert!(filter.matches(&book(3, "Book3", 33, "Book1 author2")));
    }

    #[test]
    fn every_search_term_has_to_match() {
        let filter = BookFilter::try_from(&ListBooksQuery {
            search: Some("Book3  author2".to_string()),
            ..ListBooksQuery::default()
        })
        .unwrap();
        assert_eq!(filter.search_terms, vec!["Book3", "author2"]);
        assert!(filter.matches(&book(3, "Book3", 33, "Book1 author2")));
        assert!(!filter.matches(&book(1, "Book1", 11, "author2")));
    }

    #[test]
    fn price_filter_composes_with_search() {
        let filter = BookFilter::try_from(&ListBooksQuery {
            price: Some("33".to_string()),
            search: Some("Book".to_string()),
            ordering: None,
        })
        .unwrap();
        assert!(filter.matches(&book(3, "Book3", 33, "a")));
        assert!(!filter.matches(&book(1, "Book1", 11, "a")));

        let conditions = filter.sql_conditions();
        assert_eq!(
            conditions.clause,
            "b.price = $1 AND (b.name ILIKE $2 ESCAPE '\\' OR b.author_name ILIKE $2 ESCAPE '\\')"
        );
        assert_eq!(conditions.params().len(), 2);
    }

    #[test]
    fn empty_filter_keeps_primary_key_order() {
        let filter = BookFilter::default();
        let mut books = vec![book(3, "c", 1, "a"), book(1, "a", 3, "c"), book(2, "b", 2, "b")];
        books.sort_by(|a, b| filter.compare(a, b));
        assert_eq!(books.iter().map(|b| b.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(filter.sql_conditions().clause, "TRUE");
    }

    #[test]
    fn descending_price_order_breaks_ties_by_id() {
        let filter = BookFilter::try_from(&ListBooksQuery {
            ordering: Some("-price".to_string()),
            ..ListBooksQuery::default()
        })
        .unwrap();
        let mut books = vec![book(1, "a", 10, "x"), book(2, "b", 20, "x"), book(3, "c", 10, "x")];
        books.sort_by(|a, b| filter.compare(a, b));
        assert_eq!(books.iter().map(|b| b.id).collect::<Vec<_>>(), vec![2, 1, 3]);
    }

    #[test]
    fn price_has_to_be_a_number() {
        let errors = BookFilter::try_from(&ListBooksQuery {
            price: Some("abc".to_string()),
            ..ListBooksQuery::default()
        })
        .unwrap_err();
        assert_eq!(errors.field("price"), Some(&["Enter a number.".to_string()][..]));

        let filter = BookFilter::try_from(&ListBooksQuery {
            price: Some(String::new()),
            ..ListBooksQuery::default()
        })
        .unwrap();
        assert_eq!(filter.price, None);
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(like_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
    }
}
