//! `PostgreSQL` implementation of the `PetRepository` trait.

use std::str::FromStr;

use adoptchain_core::error::{DomainError, PersistenceError};
use adoptchain_core::pet::{Pet, PetId, PetStatus, PetType};
use adoptchain_core::repository::{PetMutation, PetRepository};
use alloy_primitives::Address;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;

use crate::schema::CREATE_PETS_TABLE;

const SELECT_ALL: &str = r"
SELECT id, name, pet_type, breed, birth_date, image, description, status, owner,
       applicants, application_start_time, token_uri, has_nft, created_at
FROM pets
ORDER BY created_at ASC, id ASC
";

const SELECT_BY_ID: &str = r"
SELECT id, name, pet_type, breed, birth_date, image, description, status, owner,
       applicants, application_start_time, token_uri, has_nft, created_at
FROM pets
WHERE id = $1
";

const SELECT_BY_ID_FOR_UPDATE: &str = r"
SELECT id, name, pet_type, breed, birth_date, image, description, status, owner,
       applicants, application_start_time, token_uri, has_nft, created_at
FROM pets
WHERE id = $1
FOR UPDATE
";

const SELECT_BY_STATUS: &str = r"
SELECT id, name, pet_type, breed, birth_date, image, description, status, owner,
       applicants, application_start_time, token_uri, has_nft, created_at
FROM pets
WHERE status = $1
ORDER BY created_at ASC, id ASC
";

const INSERT: &str = r"
INSERT INTO pets (id, name, pet_type, breed, birth_date, image, description, status, owner,
                  applicants, application_start_time, token_uri, has_nft, created_at)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
RETURNING id, name, pet_type, breed, birth_date, image, description, status, owner,
          applicants, application_start_time, token_uri, has_nft, created_at
";

// Only the columns the settlement workflow is allowed to change.
const UPDATE_MUTABLE: &str = r"
UPDATE pets
SET status = $2, owner = $3, applicants = $4, application_start_time = $5, has_nft = $6
WHERE id = $1
";

/// Postgres error codes that mean a concurrent writer won.
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

#[derive(Debug, sqlx::FromRow)]
struct PetRow {
    id: i64,
    name: String,
    pet_type: String,
    breed: String,
    birth_date: String,
    image: String,
    description: String,
    status: String,
    owner: Option<String>,
    applicants: Vec<String>,
    application_start_time: i64,
    token_uri: String,
    has_nft: bool,
    created_at: DateTime<Utc>,
}

fn malformed(id: PetId, what: &str, err: impl std::fmt::Display) -> DomainError {
    PersistenceError::Backend(format!("pet {id} has malformed {what}: {err}")).into()
}

fn parse_pet_type(id: PetId, raw: &str) -> Result<PetType, DomainError> {
    match raw {
        "cat" => Ok(PetType::Cat),
        "dog" => Ok(PetType::Dog),
        "other" => Ok(PetType::Other),
        other => Err(malformed(id, "type", other)),
    }
}

fn pet_type_name(pet_type: PetType) -> &'static str {
    match pet_type {
        PetType::Cat => "cat",
        PetType::Dog => "dog",
        PetType::Other => "other",
    }
}

impl TryFrom<PetRow> for Pet {
    type Error = DomainError;

    fn try_from(row: PetRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let status = PetStatus::from_str(&row.status).map_err(|e| malformed(id, "status", e))?;
        // Legacy rows store an empty string for "no owner".
        let owner = match row.owner.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(Address::from_str(raw).map_err(|e| malformed(id, "owner", e))?),
        };
        let applicants = row
            .applicants
            .iter()
            .map(|raw| Address::from_str(raw).map_err(|e| malformed(id, "applicant", e)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Pet {
            id,
            name: row.name,
            pet_type: parse_pet_type(id, &row.pet_type)?,
            breed: row.breed,
            birth_date: row.birth_date,
            image: row.image,
            description: row.description,
            status,
            owner,
            applicants,
            application_start_time: row.application_start_time,
            token_uri: row.token_uri,
            has_nft: row.has_nft,
            created_at: row.created_at,
        })
    }
}

fn applicant_strings(pet: &Pet) -> Vec<String> {
    pet.applicants.iter().map(ToString::to_string).collect()
}

fn map_sqlx_error(id: Option<PetId>, err: &sqlx::Error) -> DomainError {
    if let (Some(id), sqlx::Error::Database(db_err)) = (id, err) {
        if matches!(
            db_err.code().as_deref(),
            Some(SERIALIZATION_FAILURE | DEADLOCK_DETECTED)
        ) {
            return PersistenceError::WriteConflict(id).into();
        }
    }
    PersistenceError::Backend(err.to_string()).into()
}

/// PostgreSQL-backed pet repository.
#[derive(Debug, Clone)]
pub struct PgPetRepository {
    pool: PgPool,
}

impl PgPetRepository {
    /// Creates a new `PgPetRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the `pets` table and its indexes if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::Backend` if the DDL fails.
    pub async fn ensure_schema(&self) -> Result<(), DomainError> {
        sqlx::raw_sql(CREATE_PETS_TABLE)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(None, &e))?;
        Ok(())
    }
}

#[async_trait]
impl PetRepository for PgPetRepository {
    async fn get(&self, id: PetId) -> Result<Pet, DomainError> {
        let row: Option<PetRow> = sqlx::query_as(SELECT_BY_ID)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(Some(id), &e))?;
        row.ok_or(PersistenceError::NotFound(id))?.try_into()
    }

    async fn list(&self) -> Result<Vec<Pet>, DomainError> {
        let rows: Vec<PetRow> = sqlx::query_as(SELECT_ALL)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(None, &e))?;
        rows.into_iter().map(Pet::try_from).collect()
    }

    async fn list_by_status(&self, status: PetStatus) -> Result<Vec<Pet>, DomainError> {
        let rows: Vec<PetRow> = sqlx::query_as(SELECT_BY_STATUS)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(None, &e))?;
        rows.into_iter().map(Pet::try_from).collect()
    }

    async fn insert(&self, pet: Pet) -> Result<Pet, DomainError> {
        let row: PetRow = sqlx::query_as(INSERT)
            .bind(pet.id)
            .bind(&pet.name)
            .bind(pet_type_name(pet.pet_type))
            .bind(&pet.breed)
            .bind(&pet.birth_date)
            .bind(&pet.image)
            .bind(&pet.description)
            .bind(pet.status.as_str())
            .bind(pet.owner.map(|owner| owner.to_string()))
            .bind(applicant_strings(&pet))
            .bind(pet.application_start_time)
            .bind(&pet.token_uri)
            .bind(pet.has_nft)
            .bind(pet.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(Some(pet.id), &e))?;
        row.try_into()
    }

    async fn modify(&self, id: PetId, mutation: PetMutation) -> Result<Pet, DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error(Some(id), &e))?;

        let row: Option<PetRow> = sqlx::query_as(SELECT_BY_ID_FOR_UPDATE)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(Some(id), &e))?;
        let mut pet: Pet = row.ok_or(PersistenceError::NotFound(id))?.try_into()?;

        // Dropping `tx` on error rolls the transaction back.
        mutation(&mut pet)?;

        let result = sqlx::query(UPDATE_MUTABLE)
            .bind(id)
            .bind(pet.status.as_str())
            .bind(pet.owner.map(|owner| owner.to_string()))
            .bind(applicant_strings(&pet))
            .bind(pet.application_start_time)
            .bind(pet.has_nft)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(Some(id), &e))?;
        if result.rows_affected() == 0 {
            return Err(PersistenceError::WriteConflict(id).into());
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error(Some(id), &e))?;
        debug!(pet_id = id, status = %pet.status, "pet record updated");
        Ok(pet)
    }
}
