use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::job::{JobStatus, NewJob, SubjectRef, TryOnJob};

const JOB_COLUMNS: &str = "id, owner_id, product_id, variant_id, shop, input_image_ref, \
                           result_image_ref, status, error, created_at, updated_at";

fn job_from_row(row: &PgRow) -> Result<TryOnJob, sqlx::Error> {
    let status_str: String = row.try_get("status")?;
    let status = status_str
        .parse::<JobStatus>()
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    Ok(TryOnJob {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        subject: SubjectRef {
            product_id: row.try_get("product_id")?,
            variant_id: row.try_get("variant_id")?,
            shop: row.try_get("shop")?,
        },
        input_image_ref: row.try_get("input_image_ref")?,
        result_image_ref: row.try_get("result_image_ref")?,
        status,
        error: row.try_get("error")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Insert a new try-on job in the given initial status
pub async fn create_job(
    pool: &PgPool,
    job: &NewJob,
    status: JobStatus,
) -> Result<TryOnJob, sqlx::Error> {
    let sql = format!(
        r#"
        INSERT INTO tryon_jobs (id, owner_id, product_id, variant_id, shop, input_image_ref, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {JOB_COLUMNS}
        "#
    );

    let row = sqlx::query(&sql)
        .bind(Uuid::new_v4())
        .bind(&job.owner_id)
        .bind(&job.subject.product_id)
        .bind(&job.subject.variant_id)
        .bind(&job.subject.shop)
        .bind(&job.input_image_ref)
        .bind(status.to_string())
        .fetch_one(pool)
        .await?;

    job_from_row(&row)
}

/// Get a job by ID
pub async fn get_job(pool: &PgPool, job_id: Uuid) -> Result<Option<TryOnJob>, sqlx::Error> {
    let sql = format!("SELECT {JOB_COLUMNS} FROM tryon_jobs WHERE id = $1");

    let row = sqlx::query(&sql).bind(job_id).fetch_optional(pool).await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Move a non-terminal job to `done` with its result.
/// Returns false when the job was already terminal (or does not exist).
pub async fn complete_job(
    pool: &PgPool,
    job_id: Uuid,
    result_image_ref: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE tryon_jobs
        SET status = 'done',
            result_image_ref = $2,
            error = NULL,
            updated_at = NOW()
        WHERE id = $1
          AND status IN ('pending', 'processing')
        "#,
    )
    .bind(job_id)
    .bind(result_image_ref)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Move a non-terminal job to `failed`. The result reference stays NULL.
pub async fn fail_job(pool: &PgPool, job_id: Uuid, error: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE tryon_jobs
        SET status = 'failed',
            result_image_ref = NULL,
            error = $2,
            updated_at = NOW()
        WHERE id = $1
          AND status IN ('pending', 'processing')
        "#,
    )
    .bind(job_id)
    .bind(error)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Jobs belonging to an owner, newest first
pub async fn list_jobs_for_owner(
    pool: &PgPool,
    owner_id: &str,
    limit: i64,
) -> Result<Vec<TryOnJob>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {JOB_COLUMNS}
        FROM tryon_jobs
        WHERE owner_id = $1
        ORDER BY created_at DESC
        LIMIT $2
        "#
    );

    let rows = sqlx::query(&sql)
        .bind(owner_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    rows.iter().map(job_from_row).collect()
}
