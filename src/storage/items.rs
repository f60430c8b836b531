use sqlx::QueryBuilder;
use std::collections::HashSet;

use super::schema::Database;
use super::sites::ensure_site_in;
use super::types::{DatabaseError, Item, NewItem, SaveReport, SiteInfo};

impl Database {
    // ========================================================================
    // Item Operations
    // ========================================================================

    /// Check whether an item with this link has already been recorded.
    pub async fn link_exists(&self, link: &str) -> Result<bool, DatabaseError> {
        let (found,): (i64,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM items WHERE link = ?)")
            .bind(link)
            .fetch_one(&self.pool)
            .await?;
        Ok(found != 0)
    }

    /// Record a feed's new items under its site.
    ///
    /// Items are deduplicated by link (first occurrence wins), then written in
    /// batches of at most `batch_size` rows. Each batch is its own transaction
    /// and uses `ON CONFLICT(link) DO NOTHING`, so links already in the store
    /// are skipped atomically with the insert.
    ///
    /// The site row is looked up or created inside each batch transaction.
    /// A batch that inserts no rows (every link already stored, for instance
    /// by a concurrent run) is rolled back, so a site is only created together
    /// with its first item. `SaveReport::site_id` is `None` when nothing was
    /// inserted.
    ///
    /// # Errors
    ///
    /// A failing batch aborts the call with `DatabaseError::Batch`. Batches
    /// written before it remain committed.
    pub async fn save_site_and_items(
        &self,
        site: &SiteInfo,
        items: &[NewItem],
    ) -> Result<SaveReport, DatabaseError> {
        let candidates = dedupe_by_link(items);
        if candidates.is_empty() {
            tracing::debug!(site = %site.url, "No items to save");
            return Ok(SaveReport::default());
        }

        let now = chrono::Utc::now();
        let now_ts = now.timestamp();

        let total = candidates.len().div_ceil(self.batch_size);
        tracing::debug!(
            site = %site.url,
            items = candidates.len(),
            batches = total,
            "Saving items"
        );

        let mut inserted = 0usize;
        let mut site_id = None;
        for (index, chunk) in candidates.chunks(self.batch_size).enumerate() {
            let batch_err = |source| DatabaseError::Batch {
                batch: index + 1,
                total,
                source,
            };

            let mut tx = self.pool.begin().await.map_err(batch_err)?;
            let (id, created) = ensure_site_in(&mut *tx, site).await.map_err(batch_err)?;

            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT INTO items (title, link, published_at, site_id, description, image_url, tags, created_at, updated_at) ",
            );
            builder.push_values(chunk, |mut b, item| {
                b.push_bind(&item.title)
                    .push_bind(&item.link)
                    .push_bind(item.published.unwrap_or(now).timestamp())
                    .push_bind(id)
                    .push_bind(&item.description)
                    .push_bind(&item.image_url)
                    .push_bind(&item.tags)
                    .push_bind(now_ts)
                    .push_bind(now_ts);
            });
            builder.push(" ON CONFLICT(link) DO NOTHING");

            let result = builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(batch_err)?;
            let rows = result.rows_affected() as usize;
            if rows == 0 {
                tx.rollback().await.map_err(batch_err)?;
                continue;
            }
            tx.commit().await.map_err(batch_err)?;

            if created {
                tracing::info!(site = %site.url, name = %site.name, "Created site");
            }
            site_id = Some(id);
            inserted += rows;
        }

        tracing::info!(
            site = %site.url,
            inserted = inserted,
            batches = total,
            "Saved items"
        );

        Ok(SaveReport {
            site_id,
            batches: total,
            inserted,
        })
    }

    /// All items of a site, newest first.
    pub async fn get_items_for_site(&self, site_id: i64) -> Result<Vec<Item>, DatabaseError> {
        let rows = sqlx::query_as::<_, Item>(
            r#"
            SELECT id, title, link, published_at, site_id, description, image_url, tags,
                   created_at, updated_at
            FROM items
            WHERE site_id = ?
            ORDER BY published_at DESC, id ASC
        "#,
        )
        .bind(site_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn count_items(&self) -> Result<i64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM items")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

/// Keep the first item for every distinct, non-empty link.
fn dedupe_by_link(items: &[NewItem]) -> Vec<&NewItem> {
    let mut seen = HashSet::with_capacity(items.len());
    items
        .iter()
        .filter(|item| !item.link.is_empty() && seen.insert(item.link.as_str()))
        .collect()
}
