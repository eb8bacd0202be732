#[cfg(feature = "load_tests")]
mod load_test;

/// Address of the service under test, the server needs `ALLOW_USER_REGISTRATION=true`
#[cfg(any(feature = "system_tests", feature = "load_tests"))]
fn catalog_url() -> String {
    std::env::var("BOOKSTORE_CATALOG_URL").unwrap_or("http://127.0.0.1:8080".to_string())
}
