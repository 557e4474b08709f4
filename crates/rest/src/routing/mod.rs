//! Route configuration for the code list API.

pub mod codelist_routes;

pub use codelist_routes::create_routes;
