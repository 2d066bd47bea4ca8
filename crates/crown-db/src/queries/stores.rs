use crate::Database;
use crate::models::{PromotionRow, ReviewRow, StoreRow};
use crate::queries::unique_slug;
use anyhow::Result;
use rusqlite::types::ToSql;
use rusqlite::{OptionalExtension, Row, params};

const STORE_COLS: &str = "id, owner_id, name, slug, description, logo_url, website, phone, \
                          email, address, city, country, latitude, longitude, opening_hours, \
                          is_featured, is_verified, created_at, updated_at";

fn store_from_row(row: &Row) -> rusqlite::Result<StoreRow> {
    Ok(StoreRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        slug: row.get(3)?,
        description: row.get(4)?,
        logo_url: row.get(5)?,
        website: row.get(6)?,
        phone: row.get(7)?,
        email: row.get(8)?,
        address: row.get(9)?,
        city: row.get(10)?,
        country: row.get(11)?,
        latitude: row.get(12)?,
        longitude: row.get(13)?,
        opening_hours: row.get(14)?,
        is_featured: row.get(15)?,
        is_verified: row.get(16)?,
        created_at: row.get(17)?,
        updated_at: row.get(18)?,
    })
}

fn review_from_row(row: &Row) -> rusqlite::Result<ReviewRow> {
    Ok(ReviewRow {
        id: row.get(0)?,
        author_id: row.get(1)?,
        rating: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn promotion_from_row(row: &Row) -> rusqlite::Result<PromotionRow> {
    Ok(PromotionRow {
        id: row.get(0)?,
        store_id: row.get(1)?,
        plan: row.get(2)?,
        started_at: row.get(3)?,
        expires_at: row.get(4)?,
        is_active: row.get(5)?,
        is_expired: row.get(6)?,
    })
}

/// Shared search shape for store and repair-shop directories.
#[derive(Debug, Default, Clone)]
pub struct ProfileFilter {
    pub search: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub featured_only: bool,
}

pub(crate) fn profile_filter_sql(filter: &ProfileFilter) -> (String, Vec<Box<dyn ToSql>>) {
    let mut clauses = vec!["1 = 1".to_string()];
    let mut binds: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(search) = &filter.search {
        clauses.push(
            "(name LIKE '%' || ? || '%' OR city LIKE '%' || ? || '%' \
             OR country LIKE '%' || ? || '%')"
                .into(),
        );
        for _ in 0..3 {
            binds.push(Box::new(search.clone()));
        }
    }
    if let Some(city) = &filter.city {
        clauses.push("city LIKE '%' || ? || '%'".into());
        binds.push(Box::new(city.clone()));
    }
    if let Some(country) = &filter.country {
        clauses.push("country LIKE '%' || ? || '%'".into());
        binds.push(Box::new(country.clone()));
    }
    if filter.featured_only {
        clauses.push("is_featured = 1".into());
    }

    (clauses.join(" AND "), binds)
}

impl Database {
    /// Create a store, generating a unique slug from the name.
    pub fn insert_store(&self, s: &StoreRow) -> Result<StoreRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let slug = unique_slug(&tx, "stores", &s.name)?;
            tx.execute(
                "INSERT INTO stores (id, owner_id, name, slug, description, website, phone,
                    email, address, city, country, latitude, longitude, opening_hours)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    s.id,
                    s.owner_id,
                    s.name,
                    slug,
                    s.description,
                    s.website,
                    s.phone,
                    s.email,
                    s.address,
                    s.city,
                    s.country,
                    s.latitude,
                    s.longitude,
                    s.opening_hours,
                ],
            )?;
            let sql = format!("SELECT {STORE_COLS} FROM stores WHERE id = ?1");
            let row = tx.query_row(&sql, [&s.id], store_from_row)?;
            tx.commit()?;
            Ok(row)
        })
    }

    pub fn get_store_by_slug(&self, slug: &str) -> Result<Option<StoreRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {STORE_COLS} FROM stores WHERE slug = ?1");
            Ok(conn.query_row(&sql, [slug], store_from_row).optional()?)
        })
    }

    pub fn get_store_by_owner(&self, owner_id: &str) -> Result<Option<StoreRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {STORE_COLS} FROM stores WHERE owner_id = ?1");
            Ok(conn.query_row(&sql, [owner_id], store_from_row).optional()?)
        })
    }

    /// Full-row update; the slug stays fixed once assigned.
    pub fn update_store(&self, s: &StoreRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE stores
                 SET name = ?2, description = ?3, website = ?4, phone = ?5, email = ?6,
                     address = ?7, city = ?8, country = ?9, latitude = ?10, longitude = ?11,
                     opening_hours = ?12, updated_at = datetime('now')
                 WHERE id = ?1",
                params![
                    s.id,
                    s.name,
                    s.description,
                    s.website,
                    s.phone,
                    s.email,
                    s.address,
                    s.city,
                    s.country,
                    s.latitude,
                    s.longitude,
                    s.opening_hours,
                ],
            )?;
            Ok(())
        })
    }

    pub fn set_store_logo(&self, id: &str, logo_url: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE stores SET logo_url = ?2, updated_at = datetime('now') WHERE id = ?1",
                params![id, logo_url],
            )?;
            Ok(())
        })
    }

    pub fn delete_store(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM stores WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    /// Featured stores first, then newest.
    pub fn search_stores(
        &self,
        filter: &ProfileFilter,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<StoreRow>, u64)> {
        let (where_sql, binds) = profile_filter_sql(filter);
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {STORE_COLS} FROM stores WHERE {where_sql}
                 ORDER BY is_featured DESC, created_at DESC LIMIT {limit} OFFSET {offset}"
            );
            let mut stmt = conn.prepare(&sql)?;
            let bind_refs: Vec<&dyn ToSql> = binds.iter().map(|b| b.as_ref()).collect();
            let rows = stmt
                .query_map(bind_refs.as_slice(), store_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let count_sql = format!("SELECT COUNT(*) FROM stores WHERE {where_sql}");
            let count: i64 =
                conn.query_row(&count_sql, bind_refs.as_slice(), |row| row.get(0))?;
            Ok((rows, count as u64))
        })
    }

    // -- Reviews --

    pub fn has_reviewed_store(&self, author_id: &str, store_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM store_reviews WHERE author_id = ?1 AND store_id = ?2",
                params![author_id, store_id],
                |row| row.get(0),
            )?;
            Ok(n > 0)
        })
    }

    pub fn insert_store_review(
        &self,
        id: &str,
        author_id: &str,
        store_id: &str,
        rating: i64,
        content: &str,
    ) -> Result<ReviewRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO store_reviews (id, author_id, store_id, rating, content)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, author_id, store_id, rating, content],
            )?;
            let row = conn.query_row(
                "SELECT id, author_id, rating, content, created_at
                 FROM store_reviews WHERE id = ?1",
                [id],
                review_from_row,
            )?;
            Ok(row)
        })
    }

    pub fn store_reviews(
        &self,
        store_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<ReviewRow>, u64)> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT id, author_id, rating, content, created_at
                 FROM store_reviews WHERE store_id = ?1
                 ORDER BY created_at DESC, rowid DESC LIMIT {limit} OFFSET {offset}"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([store_id], review_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM store_reviews WHERE store_id = ?1",
                [store_id],
                |row| row.get(0),
            )?;
            Ok((rows, count as u64))
        })
    }

    /// (average rating, review count); average is 0.0 with no reviews.
    pub fn store_rating(&self, store_id: &str) -> Result<(f64, u64)> {
        self.with_conn(|conn| {
            let (avg, count): (f64, i64) = conn.query_row(
                "SELECT COALESCE(AVG(rating), 0), COUNT(*)
                 FROM store_reviews WHERE store_id = ?1",
                [store_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            Ok((avg, count as u64))
        })
    }

    // -- Promotions --

    /// Purchase or renew a promotion plan: upserts the promotion row and
    /// flags the store featured, atomically.
    pub fn activate_promotion(
        &self,
        id: &str,
        store_id: &str,
        plan: &str,
        duration_days: i64,
    ) -> Result<PromotionRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO store_promotions (id, store_id, plan, expires_at)
                 VALUES (?1, ?2, ?3, datetime('now', '+' || ?4 || ' days'))
                 ON CONFLICT(store_id) DO UPDATE SET
                     plan = excluded.plan,
                     started_at = datetime('now'),
                     expires_at = excluded.expires_at,
                     is_active = 1",
                params![id, store_id, plan, duration_days],
            )?;
            tx.execute(
                "UPDATE stores SET is_featured = 1, updated_at = datetime('now') WHERE id = ?1",
                [store_id],
            )?;
            let row = tx.query_row(
                "SELECT id, store_id, plan, started_at, expires_at, is_active,
                        expires_at < datetime('now')
                 FROM store_promotions WHERE store_id = ?1",
                [store_id],
                promotion_from_row,
            )?;
            tx.commit()?;
            Ok(row)
        })
    }

    pub fn get_promotion(&self, store_id: &str) -> Result<Option<PromotionRow>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, store_id, plan, started_at, expires_at, is_active,
                            expires_at < datetime('now')
                     FROM store_promotions WHERE store_id = ?1",
                    [store_id],
                    promotion_from_row,
                )
                .optional()?)
        })
    }

    /// Lazily retire a promotion whose window has lapsed; an expired
    /// promotion stops counting as featured. Returns true when this call
    /// performed the retirement.
    pub fn expire_promotion_if_lapsed(&self, store_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE store_promotions SET is_active = 0
                 WHERE store_id = ?1 AND is_active = 1 AND expires_at < datetime('now')",
                [store_id],
            )?;
            if changed > 0 {
                tx.execute(
                    "UPDATE stores SET is_featured = 0, updated_at = datetime('now')
                     WHERE id = ?1",
                    [store_id],
                )?;
            }
            tx.commit()?;
            Ok(changed > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    fn store_row(id: &str, owner: &str, name: &str) -> StoreRow {
        StoreRow {
            id: id.into(),
            owner_id: owner.into(),
            name: name.into(),
            slug: String::new(),
            description: String::new(),
            logo_url: None,
            website: String::new(),
            phone: String::new(),
            email: String::new(),
            address: String::new(),
            city: "Zurich".into(),
            country: "Switzerland".into(),
            latitude: None,
            longitude: None,
            opening_hours: "{}".into(),
            is_featured: false,
            is_verified: false,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn seed_owner(db: &Database, id: &str) {
        db.create_user(id, &format!("{id}@example.com"), id, "h", "", "", "store")
            .unwrap();
    }

    #[test]
    fn slugs_stay_unique() {
        let db = Database::open_in_memory().unwrap();
        seed_owner(&db, "o1");
        seed_owner(&db, "o2");

        let s1 = db.insert_store(&store_row("st1", "o1", "Watch World")).unwrap();
        let s2 = db.insert_store(&store_row("st2", "o2", "Watch World")).unwrap();
        assert_eq!(s1.slug, "watch-world");
        assert_eq!(s2.slug, "watch-world-1");
    }

    #[test]
    fn one_store_per_owner() {
        let db = Database::open_in_memory().unwrap();
        seed_owner(&db, "o1");
        db.insert_store(&store_row("st1", "o1", "First")).unwrap();
        assert!(db.insert_store(&store_row("st2", "o1", "Second")).is_err());
    }

    #[test]
    fn duplicate_review_rejected_by_constraint() {
        let db = Database::open_in_memory().unwrap();
        seed_owner(&db, "o1");
        db.create_user("rev", "r@example.com", "rita", "h", "", "", "buyer")
            .unwrap();
        db.insert_store(&store_row("st1", "o1", "Watch World")).unwrap();

        db.insert_store_review("rv1", "rev", "st1", 5, "great").unwrap();
        assert!(db.has_reviewed_store("rev", "st1").unwrap());
        assert!(db.insert_store_review("rv2", "rev", "st1", 1, "changed my mind").is_err());

        let (avg, count) = db.store_rating("st1").unwrap();
        assert_eq!(count, 1);
        assert!((avg - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn promotion_marks_store_featured() {
        let db = Database::open_in_memory().unwrap();
        seed_owner(&db, "o1");
        db.insert_store(&store_row("st1", "o1", "Watch World")).unwrap();

        let promo = db.activate_promotion("p1", "st1", "spotlight", 30).unwrap();
        assert!(promo.is_active);
        assert!(!promo.is_expired);
        assert!(db.get_store_by_slug("watch-world").unwrap().unwrap().is_featured);

        // renewal upserts in place
        let renewed = db.activate_promotion("p2", "st1", "featured", 90).unwrap();
        assert_eq!(renewed.id, "p1");
        assert_eq!(renewed.plan, "featured");

        // window still open, nothing to retire
        assert!(!db.expire_promotion_if_lapsed("st1").unwrap());
    }

    #[test]
    fn lapsed_promotion_is_retired() {
        let db = Database::open_in_memory().unwrap();
        seed_owner(&db, "o1");
        db.insert_store(&store_row("st1", "o1", "Watch World")).unwrap();
        db.activate_promotion("p1", "st1", "spotlight", 30).unwrap();

        // force the window into the past
        db.with_conn(|conn| {
            conn.execute(
                "UPDATE store_promotions SET expires_at = datetime('now', '-1 day')",
                [],
            )?;
            Ok(())
        })
        .unwrap();

        assert!(db.expire_promotion_if_lapsed("st1").unwrap());
        assert!(!db.get_store_by_slug("watch-world").unwrap().unwrap().is_featured);
        let promo = db.get_promotion("st1").unwrap().unwrap();
        assert!(!promo.is_active);
        assert!(promo.is_expired);
        // second sweep is a no-op
        assert!(!db.expire_promotion_if_lapsed("st1").unwrap());
    }

    #[test]
    fn directory_search_and_featured_filter() {
        let db = Database::open_in_memory().unwrap();
        seed_owner(&db, "o1");
        seed_owner(&db, "o2");
        db.insert_store(&store_row("st1", "o1", "Geneva Time")).unwrap();
        db.insert_store(&store_row("st2", "o2", "Tokyo Watch")).unwrap();
        db.activate_promotion("p1", "st2", "spotlight", 30).unwrap();

        let (all, count) = db.search_stores(&ProfileFilter::default(), 20, 0).unwrap();
        assert_eq!(count, 2);
        // featured first
        assert_eq!(all[0].id, "st2");

        let (hits, _) = db
            .search_stores(
                &ProfileFilter {
                    search: Some("geneva".into()),
                    ..Default::default()
                },
                20,
                0,
            )
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "st1");

        let (featured, n) = db
            .search_stores(
                &ProfileFilter {
                    featured_only: true,
                    ..Default::default()
                },
                20,
                0,
            )
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(featured[0].id, "st2");
    }
}
