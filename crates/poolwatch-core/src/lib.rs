//! # Poolwatch Core
//!
//! Runtime-free logic shared by the Poolwatch ingestion engine: canonical
//! data models, the resumable cursor contract, free-text normalizers,
//! content hashing, slug generation, and the [`store::Store`] abstraction.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem dependencies.
//! Everything here is either a pure function or a trait the host crate
//! implements.

pub mod cursor;
pub mod hash;
pub mod models;
pub mod normalizers;
pub mod parse;
pub mod slug;
pub mod store;
