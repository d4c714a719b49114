use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::owner::Owner;

fn owner_from_row(row: &PgRow) -> Result<Owner, sqlx::Error> {
    Ok(Owner {
        principal_id: row.try_get("principal_id")?,
        person_images: row.try_get("person_images")?,
        job_ids: row.try_get("job_ids")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Create the owner on first sight and remember the person image if it is new.
///
/// Single statement, so two requests racing for the same principal both land.
pub async fn record_person_image(
    pool: &PgPool,
    principal_id: &str,
    image_ref: &str,
) -> Result<Owner, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO owners (principal_id, person_images)
        VALUES ($1, ARRAY[$2]::TEXT[])
        ON CONFLICT (principal_id) DO UPDATE
        SET person_images = CASE
                WHEN $2 = ANY(owners.person_images) THEN owners.person_images
                ELSE array_append(owners.person_images, $2)
            END,
            updated_at = NOW()
        RETURNING principal_id, person_images, job_ids, created_at, updated_at
        "#,
    )
    .bind(principal_id)
    .bind(image_ref)
    .fetch_one(pool)
    .await?;

    owner_from_row(&row)
}

/// Append a job id to the owner's history, creating the owner if needed
pub async fn append_job(pool: &PgPool, principal_id: &str, job_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO owners (principal_id, job_ids)
        VALUES ($1, ARRAY[$2]::UUID[])
        ON CONFLICT (principal_id) DO UPDATE
        SET job_ids = array_append(owners.job_ids, $2),
            updated_at = NOW()
        "#,
    )
    .bind(principal_id)
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_owner(pool: &PgPool, principal_id: &str) -> Result<Option<Owner>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT principal_id, person_images, job_ids, created_at, updated_at
        FROM owners
        WHERE principal_id = $1
        "#,
    )
    .bind(principal_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(owner_from_row).transpose()
}
