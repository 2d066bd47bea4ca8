use crate::Database;
use crate::models::{ListingImageRow, ListingRow};
use anyhow::Result;
use rusqlite::types::ToSql;
use rusqlite::{OptionalExtension, Row, params};

const LISTING_COLS: &str = "id, seller_id, title, brand, model, reference_number, year, \
                            condition, movement_type, case_material, case_diameter_mm, price, \
                            currency, description, status, views_count, location_city, \
                            location_country, created_at, updated_at";

fn listing_from_row(row: &Row) -> rusqlite::Result<ListingRow> {
    Ok(ListingRow {
        id: row.get(0)?,
        seller_id: row.get(1)?,
        title: row.get(2)?,
        brand: row.get(3)?,
        model: row.get(4)?,
        reference_number: row.get(5)?,
        year: row.get(6)?,
        condition: row.get(7)?,
        movement_type: row.get(8)?,
        case_material: row.get(9)?,
        case_diameter_mm: row.get(10)?,
        price: row.get(11)?,
        currency: row.get(12)?,
        description: row.get(13)?,
        status: row.get(14)?,
        views_count: row.get(15)?,
        location_city: row.get(16)?,
        location_country: row.get(17)?,
        created_at: row.get(18)?,
        updated_at: row.get(19)?,
    })
}

fn image_from_row(row: &Row) -> rusqlite::Result<ListingImageRow> {
    Ok(ListingImageRow {
        id: row.get(0)?,
        listing_id: row.get(1)?,
        url: row.get(2)?,
        is_primary: row.get(3)?,
        position: row.get(4)?,
    })
}

/// Independent search predicates, intersected. Every field is optional.
#[derive(Debug, Default, Clone)]
pub struct ListingFilter {
    pub brand: Option<String>,
    pub model: Option<String>,
    pub conditions: Vec<String>,
    pub movement_types: Vec<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub year_min: Option<i64>,
    pub year_max: Option<i64>,
    pub search: Option<String>,
}

/// Map a requested sort key onto the allow-list. Unknown keys silently fall
/// back to newest-first.
pub fn sort_clause(sort: &str) -> &'static str {
    match sort {
        "price" => "price ASC",
        "-price" => "price DESC",
        "created_at" => "created_at ASC",
        "-created_at" => "created_at DESC",
        "views_count" => "views_count ASC",
        "-views_count" => "views_count DESC",
        _ => "created_at DESC",
    }
}

/// Build the WHERE clause for a public search: only active listings, every
/// supplied predicate ANDed in. Returns the SQL fragment plus bind values.
fn filter_sql(filter: &ListingFilter) -> (String, Vec<Box<dyn ToSql>>) {
    let mut clauses = vec!["status = 'active'".to_string()];
    let mut binds: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(brand) = &filter.brand {
        clauses.push("brand LIKE '%' || ? || '%'".into());
        binds.push(Box::new(brand.clone()));
    }
    if let Some(model) = &filter.model {
        clauses.push("model LIKE '%' || ? || '%'".into());
        binds.push(Box::new(model.clone()));
    }
    if !filter.conditions.is_empty() {
        let marks = vec!["?"; filter.conditions.len()].join(", ");
        clauses.push(format!("condition IN ({marks})"));
        for c in &filter.conditions {
            binds.push(Box::new(c.clone()));
        }
    }
    if !filter.movement_types.is_empty() {
        let marks = vec!["?"; filter.movement_types.len()].join(", ");
        clauses.push(format!("movement_type IN ({marks})"));
        for m in &filter.movement_types {
            binds.push(Box::new(m.clone()));
        }
    }
    if let Some(min) = filter.min_price {
        clauses.push("price >= ?".into());
        binds.push(Box::new(min));
    }
    if let Some(max) = filter.max_price {
        clauses.push("price <= ?".into());
        binds.push(Box::new(max));
    }
    if let Some(city) = &filter.city {
        clauses.push("location_city LIKE '%' || ? || '%'".into());
        binds.push(Box::new(city.clone()));
    }
    if let Some(country) = &filter.country {
        clauses.push("location_country LIKE '%' || ? || '%'".into());
        binds.push(Box::new(country.clone()));
    }
    if let Some(year_min) = filter.year_min {
        clauses.push("year >= ?".into());
        binds.push(Box::new(year_min));
    }
    if let Some(year_max) = filter.year_max {
        clauses.push("year <= ?".into());
        binds.push(Box::new(year_max));
    }
    if let Some(search) = &filter.search {
        clauses.push(
            "(title LIKE '%' || ? || '%' OR brand LIKE '%' || ? || '%' \
             OR model LIKE '%' || ? || '%' OR description LIKE '%' || ? || '%')"
                .into(),
        );
        for _ in 0..4 {
            binds.push(Box::new(search.clone()));
        }
    }

    (clauses.join(" AND "), binds)
}

impl Database {
    pub fn insert_listing(&self, l: &ListingRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO listings (id, seller_id, title, brand, model, reference_number,
                    year, condition, movement_type, case_material, case_diameter_mm, price,
                    currency, description, status, location_city, location_country)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                params![
                    l.id,
                    l.seller_id,
                    l.title,
                    l.brand,
                    l.model,
                    l.reference_number,
                    l.year,
                    l.condition,
                    l.movement_type,
                    l.case_material,
                    l.case_diameter_mm,
                    l.price,
                    l.currency,
                    l.description,
                    l.status,
                    l.location_city,
                    l.location_country,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_listing(&self, id: &str) -> Result<Option<ListingRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {LISTING_COLS} FROM listings WHERE id = ?1");
            Ok(conn.query_row(&sql, [id], listing_from_row).optional()?)
        })
    }

    pub fn update_listing(&self, l: &ListingRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE listings
                 SET title = ?2, brand = ?3, model = ?4, reference_number = ?5, year = ?6,
                     condition = ?7, movement_type = ?8, case_material = ?9,
                     case_diameter_mm = ?10, price = ?11, currency = ?12, description = ?13,
                     status = ?14, location_city = ?15, location_country = ?16,
                     updated_at = datetime('now')
                 WHERE id = ?1",
                params![
                    l.id,
                    l.title,
                    l.brand,
                    l.model,
                    l.reference_number,
                    l.year,
                    l.condition,
                    l.movement_type,
                    l.case_material,
                    l.case_diameter_mm,
                    l.price,
                    l.currency,
                    l.description,
                    l.status,
                    l.location_city,
                    l.location_country,
                ],
            )?;
            Ok(())
        })
    }

    pub fn set_listing_status(&self, id: &str, status: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE listings SET status = ?2, updated_at = datetime('now') WHERE id = ?1",
                params![id, status],
            )?;
            Ok(())
        })
    }

    /// Best-effort view counter. A single relative UPDATE so concurrent
    /// detail fetches never lose increments.
    pub fn increment_views(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE listings SET views_count = views_count + 1 WHERE id = ?1",
                [id],
            )?;
            Ok(())
        })
    }

    pub fn search_listings(
        &self,
        filter: &ListingFilter,
        sort: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ListingRow>> {
        let (where_sql, binds) = filter_sql(filter);
        let order = sort_clause(sort);

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {LISTING_COLS} FROM listings WHERE {where_sql} \
                 ORDER BY {order} LIMIT {limit} OFFSET {offset}"
            );
            let mut stmt = conn.prepare(&sql)?;
            let bind_refs: Vec<&dyn ToSql> = binds.iter().map(|b| b.as_ref()).collect();
            let rows = stmt
                .query_map(bind_refs.as_slice(), listing_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_listings(&self, filter: &ListingFilter) -> Result<u64> {
        let (where_sql, binds) = filter_sql(filter);
        self.with_conn(|conn| {
            let sql = format!("SELECT COUNT(*) FROM listings WHERE {where_sql}");
            let bind_refs: Vec<&dyn ToSql> = binds.iter().map(|b| b.as_ref()).collect();
            let n: i64 = conn.query_row(&sql, bind_refs.as_slice(), |row| row.get(0))?;
            Ok(n as u64)
        })
    }

    /// Seller-facing list. Public callers see active listings only; the owner
    /// path includes every status.
    pub fn listings_by_seller(
        &self,
        seller_id: &str,
        active_only: bool,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<ListingRow>, u64)> {
        let status_sql = if active_only { " AND status = 'active'" } else { "" };
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {LISTING_COLS} FROM listings WHERE seller_id = ?1{status_sql} \
                 ORDER BY created_at DESC LIMIT {limit} OFFSET {offset}"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([seller_id], listing_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let count_sql =
                format!("SELECT COUNT(*) FROM listings WHERE seller_id = ?1{status_sql}");
            let count: i64 = conn.query_row(&count_sql, [seller_id], |row| row.get(0))?;
            Ok((rows, count as u64))
        })
    }

    // -- Images --

    /// Insert an image. When `is_primary` is set the previous primary on the
    /// same listing is demoted inside the same transaction, so at most one
    /// primary ever holds.
    pub fn insert_image(
        &self,
        id: &str,
        listing_id: &str,
        url: &str,
        is_primary: bool,
        position: i64,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if is_primary {
                tx.execute(
                    "UPDATE listing_images SET is_primary = 0 WHERE listing_id = ?1",
                    [listing_id],
                )?;
            }
            tx.execute(
                "INSERT INTO listing_images (id, listing_id, url, is_primary, position)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, listing_id, url, is_primary, position],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn count_images(&self, listing_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM listing_images WHERE listing_id = ?1",
                [listing_id],
                |row| row.get(0),
            )?;
            Ok(n as u64)
        })
    }

    pub fn images_for_listing(&self, listing_id: &str) -> Result<Vec<ListingImageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, listing_id, url, is_primary, position
                 FROM listing_images WHERE listing_id = ?1
                 ORDER BY position, created_at",
            )?;
            let rows = stmt
                .query_map([listing_id], image_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Batch-fetch images for a page of listings (card rendering).
    pub fn images_for_listings(&self, listing_ids: &[String]) -> Result<Vec<ListingImageRow>> {
        if listing_ids.is_empty() {
            return Ok(vec![]);
        }
        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=listing_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT id, listing_id, url, is_primary, position
                 FROM listing_images WHERE listing_id IN ({})
                 ORDER BY position, created_at",
                placeholders.join(", ")
            );
            let mut stmt = conn.prepare(&sql)?;
            let bind: Vec<&dyn ToSql> =
                listing_ids.iter().map(|id| id as &dyn ToSql).collect();
            let rows = stmt
                .query_map(bind.as_slice(), image_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_image(&self, image_id: &str, listing_id: &str) -> Result<Option<ListingImageRow>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, listing_id, url, is_primary, position
                     FROM listing_images WHERE id = ?1 AND listing_id = ?2",
                    params![image_id, listing_id],
                    image_from_row,
                )
                .optional()?)
        })
    }

    /// Promote one image to primary, demoting the rest of the listing's
    /// images in the same transaction. Returns false when the image does not
    /// belong to the listing.
    pub fn set_primary_image(&self, listing_id: &str, image_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE listing_images SET is_primary = 0 WHERE listing_id = ?1",
                [listing_id],
            )?;
            let changed = tx.execute(
                "UPDATE listing_images SET is_primary = 1 WHERE id = ?1 AND listing_id = ?2",
                params![image_id, listing_id],
            )?;
            tx.commit()?;
            Ok(changed > 0)
        })
    }

    /// Delete an image; if it was the primary, the first remaining image is
    /// promoted. Returns the deleted row so the caller can unlink the file.
    pub fn delete_image(&self, image_id: &str, listing_id: &str) -> Result<Option<ListingImageRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let row = tx
                .query_row(
                    "SELECT id, listing_id, url, is_primary, position
                     FROM listing_images WHERE id = ?1 AND listing_id = ?2",
                    params![image_id, listing_id],
                    image_from_row,
                )
                .optional()?;

            let Some(row) = row else {
                return Ok(None);
            };

            tx.execute("DELETE FROM listing_images WHERE id = ?1", [image_id])?;
            if row.is_primary {
                tx.execute(
                    "UPDATE listing_images SET is_primary = 1
                     WHERE id = (SELECT id FROM listing_images WHERE listing_id = ?1
                                 ORDER BY position, created_at LIMIT 1)",
                    [listing_id],
                )?;
            }
            tx.commit()?;
            Ok(Some(row))
        })
    }

    // -- Saved listings --

    /// Idempotent save (INSERT OR IGNORE under the unique pair constraint).
    pub fn save_listing(&self, id: &str, user_id: &str, listing_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO saved_listings (id, user_id, listing_id) VALUES (?1, ?2, ?3)",
                params![id, user_id, listing_id],
            )?;
            Ok(())
        })
    }

    pub fn unsave_listing(&self, user_id: &str, listing_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM saved_listings WHERE user_id = ?1 AND listing_id = ?2",
                params![user_id, listing_id],
            )?;
            Ok(())
        })
    }

    pub fn is_saved(&self, user_id: &str, listing_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM saved_listings WHERE user_id = ?1 AND listing_id = ?2",
                params![user_id, listing_id],
                |row| row.get(0),
            )?;
            Ok(n > 0)
        })
    }

    /// Which of `listing_ids` the user has saved (card annotation).
    pub fn saved_ids_for_user(&self, user_id: &str, listing_ids: &[String]) -> Result<Vec<String>> {
        if listing_ids.is_empty() {
            return Ok(vec![]);
        }
        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (2..=listing_ids.len() + 1).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT listing_id FROM saved_listings
                 WHERE user_id = ?1 AND listing_id IN ({})",
                placeholders.join(", ")
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut bind: Vec<&dyn ToSql> = vec![&user_id as &dyn ToSql];
            bind.extend(listing_ids.iter().map(|id| id as &dyn ToSql));
            let rows = stmt
                .query_map(bind.as_slice(), |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn saved_listings_for_user(
        &self,
        user_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<ListingRow>, u64)> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM listings l
                 JOIN saved_listings s ON s.listing_id = l.id
                 WHERE s.user_id = ?1
                 ORDER BY s.created_at DESC LIMIT {limit} OFFSET {offset}",
                LISTING_COLS
                    .split(", ")
                    .map(|c| format!("l.{c}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], listing_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM saved_listings WHERE user_id = ?1",
                [user_id],
                |row| row.get(0),
            )?;
            Ok((rows, count as u64))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    fn seed(db: &Database) {
        db.create_user("s1", "s@example.com", "seller", "h", "", "", "seller")
            .unwrap();
        db.create_user("b1", "b@example.com", "buyer", "h", "", "", "buyer")
            .unwrap();
    }

    fn listing(id: &str, brand: &str, price: f64, status: &str) -> ListingRow {
        ListingRow {
            id: id.into(),
            seller_id: "s1".into(),
            title: format!("{brand} diver"),
            brand: brand.into(),
            model: "Classic".into(),
            reference_number: String::new(),
            year: Some(2019),
            condition: "good".into(),
            movement_type: Some("automatic".into()),
            case_material: String::new(),
            case_diameter_mm: Some(40.0),
            price,
            currency: "USD".into(),
            description: "well kept".into(),
            status: status.into(),
            views_count: 0,
            location_city: "Geneva".into(),
            location_country: "Switzerland".into(),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn search_only_sees_active() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        db.insert_listing(&listing("l1", "Omega", 3000.0, "active")).unwrap();
        db.insert_listing(&listing("l2", "Omega", 2000.0, "sold")).unwrap();
        db.insert_listing(&listing("l3", "Rolex", 9000.0, "removed")).unwrap();

        let filter = ListingFilter::default();
        let rows = db.search_listings(&filter, "-created_at", 20, 0).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "l1");
        assert_eq!(db.count_listings(&filter).unwrap(), 1);
    }

    #[test]
    fn predicates_intersect() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        db.insert_listing(&listing("l1", "Omega", 3000.0, "active")).unwrap();
        db.insert_listing(&listing("l2", "Rolex", 9000.0, "active")).unwrap();

        let filter = ListingFilter {
            brand: Some("ome".into()),
            min_price: Some(2500.0),
            max_price: Some(5000.0),
            conditions: vec!["good".into(), "excellent".into()],
            ..Default::default()
        };
        let rows = db.search_listings(&filter, "-created_at", 20, 0).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].brand, "Omega");

        let none = ListingFilter {
            brand: Some("ome".into()),
            min_price: Some(5000.0),
            ..Default::default()
        };
        assert!(db.search_listings(&none, "-created_at", 20, 0).unwrap().is_empty());
    }

    #[test]
    fn free_text_search_spans_fields() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        db.insert_listing(&listing("l1", "Omega", 3000.0, "active")).unwrap();
        db.insert_listing(&listing("l2", "Rolex", 9000.0, "active")).unwrap();

        let filter = ListingFilter {
            search: Some("rolex".into()),
            ..Default::default()
        };
        let rows = db.search_listings(&filter, "-created_at", 20, 0).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "l2");

        // matches description too
        let filter = ListingFilter {
            search: Some("well kept".into()),
            ..Default::default()
        };
        assert_eq!(db.search_listings(&filter, "-created_at", 20, 0).unwrap().len(), 2);
    }

    #[test]
    fn unknown_sort_falls_back() {
        assert_eq!(sort_clause("price"), "price ASC");
        assert_eq!(sort_clause("-views_count"), "views_count DESC");
        assert_eq!(sort_clause("seller_id; DROP TABLE users"), "created_at DESC");
        assert_eq!(sort_clause(""), "created_at DESC");
    }

    #[test]
    fn sort_by_price() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        db.insert_listing(&listing("l1", "Omega", 3000.0, "active")).unwrap();
        db.insert_listing(&listing("l2", "Rolex", 9000.0, "active")).unwrap();
        db.insert_listing(&listing("l3", "Seiko", 400.0, "active")).unwrap();

        let rows = db
            .search_listings(&ListingFilter::default(), "price", 20, 0)
            .unwrap();
        let prices: Vec<f64> = rows.iter().map(|r| r.price).collect();
        assert_eq!(prices, vec![400.0, 3000.0, 9000.0]);
    }

    #[test]
    fn view_counter_is_relative() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        db.insert_listing(&listing("l1", "Omega", 3000.0, "active")).unwrap();

        db.increment_views("l1").unwrap();
        db.increment_views("l1").unwrap();
        assert_eq!(db.get_listing("l1").unwrap().unwrap().views_count, 2);
    }

    #[test]
    fn at_most_one_primary_image() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        db.insert_listing(&listing("l1", "Omega", 3000.0, "active")).unwrap();

        db.insert_image("i1", "l1", "/media/i1", true, 0).unwrap();
        db.insert_image("i2", "l1", "/media/i2", false, 1).unwrap();
        db.insert_image("i3", "l1", "/media/i3", true, 2).unwrap();

        let images = db.images_for_listing("l1").unwrap();
        let primaries: Vec<&str> = images
            .iter()
            .filter(|i| i.is_primary)
            .map(|i| i.id.as_str())
            .collect();
        assert_eq!(primaries, vec!["i3"]);
    }

    #[test]
    fn promote_demotes_previous_primary() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        db.insert_listing(&listing("l1", "Omega", 3000.0, "active")).unwrap();
        db.insert_image("i1", "l1", "/media/i1", true, 0).unwrap();
        db.insert_image("i2", "l1", "/media/i2", false, 1).unwrap();

        assert!(db.set_primary_image("l1", "i2").unwrap());
        let images = db.images_for_listing("l1").unwrap();
        assert!(images.iter().filter(|i| i.is_primary).count() == 1);
        assert!(images.iter().any(|i| i.id == "i2" && i.is_primary));

        // promoting an image from another listing is refused
        assert!(!db.set_primary_image("l1", "nope").unwrap());
    }

    #[test]
    fn racing_promotions_leave_exactly_one_primary() {
        use std::sync::Arc;
        use std::thread;

        let db = Arc::new(Database::open_in_memory().unwrap());
        seed(&db);
        db.insert_listing(&listing("l1", "Omega", 3000.0, "active")).unwrap();
        let image_ids = ["i1", "i2", "i3", "i4"];
        for (pos, id) in image_ids.iter().enumerate() {
            db.insert_image(id, "l1", &format!("/media/{id}"), pos == 0, pos as i64)
                .unwrap();
        }

        let handles: Vec<_> = image_ids
            .into_iter()
            .map(|image_id| {
                let db = Arc::clone(&db);
                thread::spawn(move || db.set_primary_image("l1", image_id).unwrap())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }

        let images = db.images_for_listing("l1").unwrap();
        assert_eq!(images.iter().filter(|i| i.is_primary).count(), 1);
    }

    #[test]
    fn deleting_primary_promotes_next() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        db.insert_listing(&listing("l1", "Omega", 3000.0, "active")).unwrap();
        db.insert_image("i1", "l1", "/media/i1", true, 0).unwrap();
        db.insert_image("i2", "l1", "/media/i2", false, 1).unwrap();

        let deleted = db.delete_image("i1", "l1").unwrap().unwrap();
        assert!(deleted.is_primary);
        let images = db.images_for_listing("l1").unwrap();
        assert_eq!(images.len(), 1);
        assert!(images[0].is_primary);
    }

    #[test]
    fn save_toggle_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        db.insert_listing(&listing("l1", "Omega", 3000.0, "active")).unwrap();

        db.save_listing("sv1", "b1", "l1").unwrap();
        db.save_listing("sv2", "b1", "l1").unwrap(); // ignored
        assert!(db.is_saved("b1", "l1").unwrap());

        let (saved, count) = db.saved_listings_for_user("b1", 20, 0).unwrap();
        assert_eq!(count, 1);
        assert_eq!(saved[0].id, "l1");

        db.unsave_listing("b1", "l1").unwrap();
        assert!(!db.is_saved("b1", "l1").unwrap());
    }
}
