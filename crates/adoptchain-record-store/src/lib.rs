//! PostgreSQL record store for pet records.

pub mod pg_pet_repository;
pub mod schema;
