//! Supplier storefront access: fetching, parsing, and data models.

pub mod client;
pub mod models;
pub mod parser;
pub mod selectors;

pub use client::{PageFetcher, SupplierClient};
pub use models::{CategoryLink, ProductDetails, ProductTile};
pub use parser::SupplierParser;
