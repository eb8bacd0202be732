use std::collections::HashMap;

use rand::prelude::SliceRandom;
use rand::{thread_rng, Rng};

use bookstore_catalog::api::{BookDetails, BookId, UserBookRelationPatch, UserDetails};
use bookstore_catalog::client::BookstoreCatalogClient;

use crate::catalog_url;

#[derive(Default)]
struct ExpectedAggregates {
    likes: i64,
    rates: Vec<i64>,
}

#[tokio::test]
async fn generate_lots_of_books_and_user_relations() {
    const NO_OF_BOOKS_TO_GENERATE: usize = 10;
    const NO_OF_AUTHORS_TO_GENERATE: usize = 100;
    const NO_OF_USERS_TO_GENERATE: usize = 10;
    const NO_OF_RELATION_UPDATES: usize = 100;

    let mut rng = thread_rng();
    let anonymous_client =
        BookstoreCatalogClient::new(&catalog_url()).expect("Failed to create client");

    let authors = generate_authors(&mut rng, NO_OF_AUTHORS_TO_GENERATE);
    let books = generate_books(&mut rng, NO_OF_BOOKS_TO_GENERATE, &authors);
    let users = generate_users(&mut rng, NO_OF_USERS_TO_GENERATE);

    let mut user_clients = vec![];
    for user in users {
        let user_id = anonymous_client
            .add_user(&user)
            .await
            .expect("Failed to add user");
        user_clients.push(
            BookstoreCatalogClient::new(&catalog_url())
                .expect("Failed to create client")
                .as_user(user_id),
        );
        println!("Added user {}", user_id);
    }

    let mut book_ids = vec![];
    for book in books {
        let owner = user_clients.choose(&mut rng).unwrap();
        let book = owner.create_book(&book).await.expect("Failed to add book");
        book_ids.push(book.id);
        println!("Added book {}", book.id);
    }

    // last state of every (user, book) pair
    let mut relations: HashMap<(usize, BookId), (bool, Option<i64>)> = HashMap::default();

    for _ in 0..NO_OF_RELATION_UPDATES {
        let book_id = *book_ids.choose(&mut rng).unwrap();
        let user_index = rng.gen_range(0..user_clients.len());
        let rate: Option<i64> = rng.gen_bool(0.5).then(|| rng.gen_range(1..=5));
        let patch = UserBookRelationPatch {
            like: rng.gen_bool(0.5).then(|| rng.gen_bool(0.7)),
            in_bookmarks: rng.gen_bool(0.3).then_some(true),
            rate: rate.map(Into::into),
        };
        let relation = user_clients[user_index]
            .patch_relation(book_id, &patch)
            .await
            .expect("Failed to update relation");

        let state = relations.entry((user_index, book_id)).or_default();
        if let Some(like) = patch.like {
            state.0 = like;
        }
        if rate.is_some() {
            state.1 = rate;
        }
        assert_eq!(relation.like, state.0);
        assert_eq!(relation.rate.map(i64::from), state.1);
        println!("Updated relation of user {} to book {}", relation.user, book_id);
    }

    let mut expected: HashMap<BookId, ExpectedAggregates> = HashMap::default();
    for ((_, book_id), (like, rate)) in relations {
        let aggregates = expected.entry(book_id).or_default();
        if like {
            aggregates.likes += 1;
        }
        aggregates.rates.extend(rate);
    }

    for book_id in book_ids {
        let book = anonymous_client
            .get_book(book_id)
            .await
            .expect("Failed to get book")
            .expect("Book not found");
        let aggregates = expected.remove(&book_id).unwrap_or_default();
        assert_eq!(book.annotated_likes, aggregates.likes);
        assert_eq!(book.rating.is_some(), !aggregates.rates.is_empty());
        if let Some(rating) = book.rating {
            let average = aggregates.rates.iter().sum::<i64>() as f64 / aggregates.rates.len() as f64;
            let rating: f64 = rating.parse().expect("Rating is not a number");
            assert!((rating - average).abs() <= 0.005 + f64::EPSILON);
        }
    }
}

fn generate_authors(rng: &mut impl Rng, no_of_authors: usize) -> Vec<String> {
    (0..no_of_authors)
        .map(|_| {
            format!(
                "{} {}",
                FIRST_NAMES.choose(rng).unwrap(),
                LAST_NAMES.choose(rng).unwrap()
            )
        })
        .collect()
}

fn generate_books(
    rng: &mut impl Rng,
    no_of_books_to_generate: usize,
    authors: &[String],
) -> Vec<BookDetails> {
    (0..no_of_books_to_generate)
        .map(|no| BookDetails {
            name: format!("A tale of number {} and {}", no, rng.gen_range(0..1000)),
            price: rng.gen_range(5..200),
            author_name: authors.choose(rng).unwrap().clone(),
        })
        .collect()
}

fn generate_users(rng: &mut impl Rng, no_of_users_to_generate: usize) -> Vec<UserDetails> {
    let run = rng.gen_range(0..1_000_000);
    (0..no_of_users_to_generate)
        .map(|no| {
            let first_name = FIRST_NAMES.choose(rng).unwrap().to_string();
            let last_name = LAST_NAMES.choose(rng).unwrap().to_string();
            UserDetails {
                username: format!("{}_{}_{}_{}", first_name, last_name, run, no),
                first_name,
                last_name,
                is_staff: false,
            }
        })
        .collect()
}

/// List of first names, based on most popular names list
const FIRST_NAMES: [&str; 40] = [
    "Ryan",
    "Dorothy",
    "Jacob",
    "Amy",
    "Nicholas",
    "Kathleen",
    "Gary",
    "Angela",
    "Eric",
    "Shirley",
    "Jonathan",
    "Emma",
    "Stephen",
    "Brenda",
    "Larry",
    "Pamela",
    "Justin",
    "Nicole",
    "Scott",
    "Anna",
    "Brandon",
    "Samantha",
    "Benjamin",
    "Katherine",
    "Samuel",
    "Christine",
    "Gregory",
    "Debra",
    "Alexander",
    "Rachel",
    "Patrick",
    "Carolyn",
    "Frank",
    "Janet",
    "Raymond",
    "Maria",
    "Jack",
    "Olivia",
    "Dennis",
    "Heather",
];

/// List of last names based on most popular last names
const LAST_NAMES: [&str; 40] = [
    "Wilson",
    "Moore",
    "Taylor",
    "Anderson",
    "Thomas",
    "Jackson",
    "White",
    "Harris",
    "Martin",
    "Thompson",
    "Garcia",
    "Martinez",
    "Robinson",
    "Clark",
    "Rodriguez",
    "Lewis",
    "Lee",
    "Walker",
    "Hall",
    "Allen",
    "Young",
    "Hernandez",
    "King",
    "Wright",
    "Lopez",
    "Hill",
    "Scott",
    "Green",
    "Adams",
    "Baker",
    "Gonzalez",
    "Nelson",
    "Carter",
    "Mitchell",
    "Perez",
    "Roberts",
    "Turner",
    "Phillips",
    "Campbell",
    "Parker",
];
