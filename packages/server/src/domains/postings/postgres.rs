use anyhow::{Context, Result};
use async_trait::async_trait;
use pgvector::Vector;
use sqlx::PgPool;

use super::models::{EmbeddedPosting, NewPosting, Posting, UserProfile};
use super::store::JobStore;
use crate::common::PostingId;

const POSTING_COLUMNS: &str = "p.id, p.title, p.company, p.location, p.description, p.tags, \
     p.salary, p.source_url, p.source_site, p.scraped_at, p.created_at, p.updated_at";

#[derive(sqlx::FromRow)]
struct EmbeddedPostingRow {
    #[sqlx(flatten)]
    posting: Posting,
    vector: Vector,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    name: Option<String>,
    skills: Vec<String>,
    resume_text: Option<String>,
    vector: Option<Vector>,
}

impl From<UserRow> for UserProfile {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            skills: row.skills,
            resume_text: row.resume_text,
            vector: row.vector.map(|v| v.to_vec()),
        }
    }
}

/// Job Store on Postgres with pgvector columns.
#[derive(Clone)]
pub struct PostgresJobStore {
    pool: PgPool,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn upsert_posting(&self, posting: &NewPosting) -> Result<PostingId> {
        let id: PostingId = sqlx::query_scalar(
            r#"
            INSERT INTO postings (
                id, title, company, location, description, tags, salary,
                source_url, source_site, scraped_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW(), NOW(), NOW())
            ON CONFLICT (source_url) DO UPDATE
            SET title = EXCLUDED.title,
                company = EXCLUDED.company,
                location = EXCLUDED.location,
                description = EXCLUDED.description,
                tags = EXCLUDED.tags,
                salary = EXCLUDED.salary,
                source_site = EXCLUDED.source_site,
                scraped_at = NOW(),
                updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(PostingId::new())
        .bind(&posting.title)
        .bind(&posting.company)
        .bind(&posting.location)
        .bind(&posting.description)
        .bind(&posting.tags)
        .bind(&posting.salary)
        .bind(&posting.source_url)
        .bind(&posting.source_site)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("Failed to upsert posting {}", posting.source_url))?;

        Ok(id)
    }

    async fn find_postings_by_ids(&self, ids: &[PostingId]) -> Result<Vec<Posting>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let postings = sqlx::query_as::<_, Posting>(&format!(
            "SELECT {POSTING_COLUMNS} FROM postings p WHERE p.id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(postings)
    }

    async fn find_postings_missing_embedding(&self, limit: usize) -> Result<Vec<PostingId>> {
        let ids = sqlx::query_scalar::<_, PostingId>(
            r#"
            SELECT p.id
            FROM postings p
            LEFT JOIN posting_embeddings e ON e.posting_id = p.id
            WHERE e.posting_id IS NULL
            ORDER BY p.created_at ASC, p.id ASC
            LIMIT $1
            "#,
        )
        .bind(limit_param(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn filter_missing_embedding(&self, ids: &[PostingId]) -> Result<Vec<PostingId>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let missing = sqlx::query_scalar::<_, PostingId>(
            r#"
            SELECT input.id
            FROM UNNEST($1::uuid[]) WITH ORDINALITY AS input(id, ord)
            JOIN postings p ON p.id = input.id
            LEFT JOIN posting_embeddings e ON e.posting_id = input.id
            WHERE e.posting_id IS NULL
            ORDER BY input.ord
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(missing)
    }

    async fn upsert_embedding(&self, posting_id: PostingId, vector: &[f32]) -> Result<()> {
        if vector.is_empty() {
            anyhow::bail!("refusing to store empty embedding for posting {}", posting_id);
        }

        sqlx::query(
            r#"
            INSERT INTO posting_embeddings (posting_id, vector, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (posting_id) DO UPDATE
            SET vector = EXCLUDED.vector,
                updated_at = NOW()
            "#,
        )
        .bind(posting_id)
        .bind(Vector::from(vector.to_vec()))
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to upsert embedding for posting {}", posting_id))?;

        Ok(())
    }

    async fn find_embedded_postings(&self, cap: usize) -> Result<Vec<EmbeddedPosting>> {
        let rows = sqlx::query_as::<_, EmbeddedPostingRow>(&format!(
            r#"
            SELECT {POSTING_COLUMNS}, e.vector
            FROM postings p
            JOIN posting_embeddings e ON e.posting_id = p.id
            ORDER BY p.scraped_at DESC, p.id DESC
            LIMIT $1
            "#
        ))
        .bind(limit_param(cap))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| EmbeddedPosting {
                posting: row.posting,
                vector: row.vector.to_vec(),
            })
            .collect())
    }

    async fn find_user(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, skills, resume_text, vector FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UserProfile::from))
    }

    async fn find_user_vector(&self, user_id: &str) -> Result<Option<Vec<f32>>> {
        let vector: Option<Option<Vector>> =
            sqlx::query_scalar("SELECT vector FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(vector.flatten().map(|v| v.to_vec()))
    }

    async fn update_user_vector(&self, user_id: &str, vector: &[f32]) -> Result<()> {
        let result = sqlx::query("UPDATE users SET vector = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(Vector::from(vector.to_vec()))
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            anyhow::bail!("user {} not found", user_id);
        }
        Ok(())
    }

    async fn list_recent_postings(&self, limit: usize) -> Result<Vec<Posting>> {
        let postings = sqlx::query_as::<_, Posting>(&format!(
            r#"
            SELECT {POSTING_COLUMNS}
            FROM postings p
            ORDER BY p.scraped_at DESC, p.id DESC
            LIMIT $1
            "#
        ))
        .bind(limit_param(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(postings)
    }
}
