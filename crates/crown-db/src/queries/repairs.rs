use crate::Database;
use crate::models::{AppointmentRow, RepairShopRow, ReviewRow, ServiceRow};
use crate::queries::stores::{ProfileFilter, profile_filter_sql};
use crate::queries::unique_slug;
use anyhow::Result;
use rusqlite::types::ToSql;
use rusqlite::{OptionalExtension, Row, params};

const SHOP_COLS: &str = "id, owner_id, name, slug, description, logo_url, phone, email, \
                         address, city, country, latitude, longitude, opening_hours, \
                         is_featured, is_verified, created_at, updated_at";

fn shop_from_row(row: &Row) -> rusqlite::Result<RepairShopRow> {
    Ok(RepairShopRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        slug: row.get(3)?,
        description: row.get(4)?,
        logo_url: row.get(5)?,
        phone: row.get(6)?,
        email: row.get(7)?,
        address: row.get(8)?,
        city: row.get(9)?,
        country: row.get(10)?,
        latitude: row.get(11)?,
        longitude: row.get(12)?,
        opening_hours: row.get(13)?,
        is_featured: row.get(14)?,
        is_verified: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}

fn service_from_row(row: &Row) -> rusqlite::Result<ServiceRow> {
    Ok(ServiceRow {
        id: row.get(0)?,
        shop_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        price_from: row.get(4)?,
        price_to: row.get(5)?,
        duration_days: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn appointment_from_row(row: &Row) -> rusqlite::Result<AppointmentRow> {
    Ok(AppointmentRow {
        id: row.get(0)?,
        shop_id: row.get(1)?,
        service_id: row.get(2)?,
        customer_id: row.get(3)?,
        scheduled_at: row.get(4)?,
        status: row.get(5)?,
        notes: row.get(6)?,
        created_at: row.get(7)?,
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

impl Database {
    pub fn insert_repair_shop(&self, s: &RepairShopRow) -> Result<RepairShopRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let slug = unique_slug(&tx, "repair_shops", &s.name)?;
            tx.execute(
                "INSERT INTO repair_shops (id, owner_id, name, slug, description, phone, email,
                    address, city, country, latitude, longitude, opening_hours)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    s.id,
                    s.owner_id,
                    s.name,
                    slug,
                    s.description,
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
            let sql = format!("SELECT {SHOP_COLS} FROM repair_shops WHERE id = ?1");
            let row = tx.query_row(&sql, [&s.id], shop_from_row)?;
            tx.commit()?;
            Ok(row)
        })
    }

    pub fn get_repair_shop_by_slug(&self, slug: &str) -> Result<Option<RepairShopRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {SHOP_COLS} FROM repair_shops WHERE slug = ?1");
            Ok(conn.query_row(&sql, [slug], shop_from_row).optional()?)
        })
    }

    pub fn get_repair_shop_by_owner(&self, owner_id: &str) -> Result<Option<RepairShopRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {SHOP_COLS} FROM repair_shops WHERE owner_id = ?1");
            Ok(conn.query_row(&sql, [owner_id], shop_from_row).optional()?)
        })
    }

    pub fn update_repair_shop(&self, s: &RepairShopRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE repair_shops
                 SET name = ?2, description = ?3, phone = ?4, email = ?5, address = ?6,
                     city = ?7, country = ?8, latitude = ?9, longitude = ?10,
                     opening_hours = ?11, updated_at = datetime('now')
                 WHERE id = ?1",
                params![
                    s.id,
                    s.name,
                    s.description,
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

    pub fn set_repair_shop_logo(&self, id: &str, logo_url: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE repair_shops SET logo_url = ?2, updated_at = datetime('now') WHERE id = ?1",
                params![id, logo_url],
            )?;
            Ok(())
        })
    }

    pub fn delete_repair_shop(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM repair_shops WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    pub fn search_repair_shops(
        &self,
        filter: &ProfileFilter,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<RepairShopRow>, u64)> {
        let (where_sql, binds) = profile_filter_sql(filter);
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {SHOP_COLS} FROM repair_shops WHERE {where_sql}
                 ORDER BY is_featured DESC, created_at DESC LIMIT {limit} OFFSET {offset}"
            );
            let mut stmt = conn.prepare(&sql)?;
            let bind_refs: Vec<&dyn ToSql> = binds.iter().map(|b| b.as_ref()).collect();
            let rows = stmt
                .query_map(bind_refs.as_slice(), shop_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let count_sql = format!("SELECT COUNT(*) FROM repair_shops WHERE {where_sql}");
            let count: i64 =
                conn.query_row(&count_sql, bind_refs.as_slice(), |row| row.get(0))?;
            Ok((rows, count as u64))
        })
    }

    // -- Services --

    pub fn insert_service(&self, s: &ServiceRow) -> Result<ServiceRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO repair_services (id, shop_id, name, description, price_from,
                    price_to, duration_days)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    s.id,
                    s.shop_id,
                    s.name,
                    s.description,
                    s.price_from,
                    s.price_to,
                    s.duration_days,
                ],
            )?;
            let row = conn.query_row(
                "SELECT id, shop_id, name, description, price_from, price_to, duration_days,
                        created_at
                 FROM repair_services WHERE id = ?1",
                [&s.id],
                service_from_row,
            )?;
            Ok(row)
        })
    }

    pub fn get_service(&self, id: &str, shop_id: &str) -> Result<Option<ServiceRow>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, shop_id, name, description, price_from, price_to,
                            duration_days, created_at
                     FROM repair_services WHERE id = ?1 AND shop_id = ?2",
                    params![id, shop_id],
                    service_from_row,
                )
                .optional()?)
        })
    }

    pub fn services_for_shop(&self, shop_id: &str) -> Result<Vec<ServiceRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, shop_id, name, description, price_from, price_to, duration_days,
                        created_at
                 FROM repair_services WHERE shop_id = ?1 ORDER BY name",
            )?;
            let rows = stmt
                .query_map([shop_id], service_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_service(&self, s: &ServiceRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE repair_services
                 SET name = ?2, description = ?3, price_from = ?4, price_to = ?5,
                     duration_days = ?6
                 WHERE id = ?1",
                params![s.id, s.name, s.description, s.price_from, s.price_to, s.duration_days],
            )?;
            Ok(())
        })
    }

    pub fn delete_service(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM repair_services WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    // -- Reviews --

    pub fn has_reviewed_shop(&self, author_id: &str, shop_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM repair_reviews WHERE author_id = ?1 AND shop_id = ?2",
                params![author_id, shop_id],
                |row| row.get(0),
            )?;
            Ok(n > 0)
        })
    }

    pub fn insert_repair_review(
        &self,
        id: &str,
        author_id: &str,
        shop_id: &str,
        rating: i64,
        content: &str,
    ) -> Result<ReviewRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO repair_reviews (id, author_id, shop_id, rating, content)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, author_id, shop_id, rating, content],
            )?;
            let row = conn.query_row(
                "SELECT id, author_id, rating, content, created_at
                 FROM repair_reviews WHERE id = ?1",
                [id],
                review_from_row,
            )?;
            Ok(row)
        })
    }

    pub fn repair_reviews(
        &self,
        shop_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<ReviewRow>, u64)> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT id, author_id, rating, content, created_at
                 FROM repair_reviews WHERE shop_id = ?1
                 ORDER BY created_at DESC, rowid DESC LIMIT {limit} OFFSET {offset}"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([shop_id], review_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM repair_reviews WHERE shop_id = ?1",
                [shop_id],
                |row| row.get(0),
            )?;
            Ok((rows, count as u64))
        })
    }

    pub fn repair_shop_rating(&self, shop_id: &str) -> Result<(f64, u64)> {
        self.with_conn(|conn| {
            let (avg, count): (f64, i64) = conn.query_row(
                "SELECT COALESCE(AVG(rating), 0), COUNT(*)
                 FROM repair_reviews WHERE shop_id = ?1",
                [shop_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            Ok((avg, count as u64))
        })
    }

    // -- Appointments --

    pub fn insert_appointment(&self, a: &AppointmentRow) -> Result<AppointmentRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO appointments (id, shop_id, service_id, customer_id, scheduled_at,
                    notes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![a.id, a.shop_id, a.service_id, a.customer_id, a.scheduled_at, a.notes],
            )?;
            let row = conn.query_row(
                "SELECT id, shop_id, service_id, customer_id, scheduled_at, status, notes,
                        created_at
                 FROM appointments WHERE id = ?1",
                [&a.id],
                appointment_from_row,
            )?;
            Ok(row)
        })
    }

    /// Shop owner view: every appointment booked at the shop.
    pub fn appointments_for_shop(
        &self,
        shop_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<AppointmentRow>, u64)> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT id, shop_id, service_id, customer_id, scheduled_at, status, notes,
                        created_at
                 FROM appointments WHERE shop_id = ?1
                 ORDER BY scheduled_at DESC LIMIT {limit} OFFSET {offset}"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([shop_id], appointment_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM appointments WHERE shop_id = ?1",
                [shop_id],
                |row| row.get(0),
            )?;
            Ok((rows, count as u64))
        })
    }

    /// Customer view: only their own bookings at the shop.
    pub fn appointments_for_customer(
        &self,
        shop_id: &str,
        customer_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<AppointmentRow>, u64)> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT id, shop_id, service_id, customer_id, scheduled_at, status, notes,
                        created_at
                 FROM appointments WHERE shop_id = ?1 AND customer_id = ?2
                 ORDER BY scheduled_at DESC LIMIT {limit} OFFSET {offset}"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![shop_id, customer_id], appointment_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM appointments WHERE shop_id = ?1 AND customer_id = ?2",
                params![shop_id, customer_id],
                |row| row.get(0),
            )?;
            Ok((rows, count as u64))
        })
    }

    pub fn get_appointment(&self, id: &str, shop_id: &str) -> Result<Option<AppointmentRow>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, shop_id, service_id, customer_id, scheduled_at, status, notes,
                            created_at
                     FROM appointments WHERE id = ?1 AND shop_id = ?2",
                    params![id, shop_id],
                    appointment_from_row,
                )
                .optional()?)
        })
    }

    pub fn set_appointment_status(&self, id: &str, status: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE appointments SET status = ?2, updated_at = datetime('now') WHERE id = ?1",
                params![id, status],
            )?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    fn shop_row(id: &str, owner: &str, name: &str) -> RepairShopRow {
        RepairShopRow {
            id: id.into(),
            owner_id: owner.into(),
            name: name.into(),
            slug: String::new(),
            description: String::new(),
            logo_url: None,
            phone: String::new(),
            email: String::new(),
            address: String::new(),
            city: "Bern".into(),
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

    fn seed(db: &Database) {
        db.create_user("o1", "o@example.com", "owen", "h", "", "", "repair")
            .unwrap();
        db.create_user("c1", "c@example.com", "cora", "h", "", "", "buyer")
            .unwrap();
        db.insert_repair_shop(&shop_row("sh1", "o1", "Fix My Watch")).unwrap();
    }

    #[test]
    fn services_crud() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);

        let svc = db
            .insert_service(&ServiceRow {
                id: "sv1".into(),
                shop_id: "sh1".into(),
                name: "Full service".into(),
                description: "Movement overhaul".into(),
                price_from: Some(200.0),
                price_to: Some(600.0),
                duration_days: Some(14),
                created_at: String::new(),
            })
            .unwrap();
        assert_eq!(svc.name, "Full service");

        let listed = db.services_for_shop("sh1").unwrap();
        assert_eq!(listed.len(), 1);

        db.delete_service("sv1").unwrap();
        assert!(db.get_service("sv1", "sh1").unwrap().is_none());
    }

    #[test]
    fn appointment_visibility_split() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        db.create_user("c2", "c2@example.com", "carl", "h", "", "", "buyer")
            .unwrap();

        for (id, customer) in [("a1", "c1"), ("a2", "c2")] {
            db.insert_appointment(&AppointmentRow {
                id: id.into(),
                shop_id: "sh1".into(),
                service_id: None,
                customer_id: customer.into(),
                scheduled_at: "2026-09-15 10:00:00".into(),
                status: "pending".into(),
                notes: String::new(),
                created_at: String::new(),
            })
            .unwrap();
        }

        let (owner_view, owner_count) = db.appointments_for_shop("sh1", 20, 0).unwrap();
        assert_eq!(owner_count, 2);
        assert_eq!(owner_view.len(), 2);

        let (mine, my_count) = db.appointments_for_customer("sh1", "c1", 20, 0).unwrap();
        assert_eq!(my_count, 1);
        assert_eq!(mine[0].id, "a1");
    }

    #[test]
    fn appointment_status_transition() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        db.insert_appointment(&AppointmentRow {
            id: "a1".into(),
            shop_id: "sh1".into(),
            service_id: None,
            customer_id: "c1".into(),
            scheduled_at: "2026-09-15 10:00:00".into(),
            status: "pending".into(),
            notes: String::new(),
            created_at: String::new(),
        })
        .unwrap();

        db.set_appointment_status("a1", "confirmed").unwrap();
        let row = db.get_appointment("a1", "sh1").unwrap().unwrap();
        assert_eq!(row.status, "confirmed");
    }
}
