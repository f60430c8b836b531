use sqlx::SqliteConnection;

use super::schema::Database;
use super::types::{DatabaseError, Site, SiteInfo};

impl Database {
    // ========================================================================
    // Site Operations
    // ========================================================================

    /// Look up a site by its canonical URL.
    pub async fn find_site_by_url(&self, url: &str) -> Result<Option<Site>, DatabaseError> {
        let site = sqlx::query_as::<_, Site>(
            "SELECT id, name, url, created_at, updated_at FROM sites WHERE url = ?",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(site)
    }

    /// Return the id of the site with `site.url`, creating the row if absent.
    ///
    /// An existing row is left untouched: a feed whose title changed keeps
    /// the name it was first recorded with.
    pub async fn ensure_site(&self, site: &SiteInfo) -> Result<i64, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        let (id, created) = ensure_site_in(&mut *conn, site).await?;
        if created {
            tracing::info!(site = %site.url, name = %site.name, "Created site");
        }
        Ok(id)
    }

    pub async fn count_sites(&self) -> Result<i64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sites")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

/// Insert-if-absent on `conn`, returning the site id and whether this call
/// created the row. Runs inside the caller's transaction when given one.
pub(super) async fn ensure_site_in(
    conn: &mut SqliteConnection,
    site: &SiteInfo,
) -> Result<(i64, bool), sqlx::Error> {
    let now = chrono::Utc::now().timestamp();

    let inserted = sqlx::query(
        "INSERT INTO sites (name, url, created_at, updated_at) VALUES (?, ?, ?, ?) \
         ON CONFLICT(url) DO NOTHING",
    )
    .bind(&site.name)
    .bind(&site.url)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    let (id,): (i64,) = sqlx::query_as("SELECT id FROM sites WHERE url = ?")
        .bind(&site.url)
        .fetch_one(&mut *conn)
        .await?;
    Ok((id, inserted.rows_affected() > 0))
}
