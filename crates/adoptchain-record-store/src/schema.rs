//! Record store database schema.

/// SQL to create the pets table.
pub const CREATE_PETS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS pets (
    id                     BIGINT PRIMARY KEY,
    name                   TEXT NOT NULL,
    pet_type               VARCHAR(16) NOT NULL,
    breed                  TEXT NOT NULL DEFAULT 'Unknown',
    birth_date             VARCHAR(10) NOT NULL,
    image                  TEXT NOT NULL DEFAULT '',
    description            TEXT NOT NULL DEFAULT '',
    status                 VARCHAR(16) NOT NULL DEFAULT 'adoptable',
    owner                  VARCHAR(42),
    applicants             TEXT[] NOT NULL DEFAULT '{}',
    application_start_time BIGINT NOT NULL DEFAULT 0,
    token_uri              TEXT NOT NULL DEFAULT '',
    has_nft                BOOLEAN NOT NULL DEFAULT FALSE,
    created_at             TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CHECK (cardinality(applicants) <= 3),
    CHECK (status IN ('adoptable', 'pending', 'adopted'))
);

CREATE INDEX IF NOT EXISTS idx_pets_status
    ON pets (status, created_at);
";
