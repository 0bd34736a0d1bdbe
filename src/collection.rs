//! Natural-order document storage for one collection.
mod core;
mod index_admin;
mod ops;

pub use self::core::Collection;
