pub mod api;

#[cfg(any(feature = "client", test))]
pub mod client;

#[cfg(any(feature = "server", test))]
pub mod app_config;
#[cfg(any(feature = "server", test))]
pub mod catalog_repository;
#[cfg(any(feature = "server", test))]
pub mod error;
#[cfg(any(feature = "server", test))]
mod handlers;
#[cfg(any(feature = "server", test))]
pub mod identity;
#[cfg(any(feature = "server", test))]
pub mod permissions;
#[cfg(any(feature = "server", test))]
pub mod query;
#[cfg(any(feature = "server", test))]
pub mod serialization;
#[cfg(any(feature = "server", test))]
pub mod settings;
#[cfg(any(feature = "server", test))]
pub mod telemetry;
