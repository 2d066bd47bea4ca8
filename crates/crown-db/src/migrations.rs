use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            email       TEXT NOT NULL UNIQUE,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            first_name  TEXT NOT NULL DEFAULT '',
            last_name   TEXT NOT NULL DEFAULT '',
            role        TEXT NOT NULL DEFAULT 'buyer'
                        CHECK (role IN ('buyer', 'seller', 'store', 'repair', 'admin')),
            phone       TEXT NOT NULL DEFAULT '',
            avatar_url  TEXT,
            is_verified INTEGER NOT NULL DEFAULT 0,
            is_active   INTEGER NOT NULL DEFAULT 1,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS email_verification_tokens (
            token       TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            expires_at  TEXT NOT NULL DEFAULT (datetime('now', '+1 day'))
        );

        CREATE TABLE IF NOT EXISTS password_reset_tokens (
            token       TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            is_used     INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            expires_at  TEXT NOT NULL DEFAULT (datetime('now', '+1 hour'))
        );

        CREATE TABLE IF NOT EXISTS revoked_tokens (
            jti         TEXT PRIMARY KEY,
            revoked_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS listings (
            id               TEXT PRIMARY KEY,
            seller_id        TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            title            TEXT NOT NULL,
            brand            TEXT NOT NULL,
            model            TEXT NOT NULL,
            reference_number TEXT NOT NULL DEFAULT '',
            year             INTEGER,
            condition        TEXT NOT NULL
                             CHECK (condition IN ('new', 'excellent', 'good', 'fair', 'poor')),
            movement_type    TEXT
                             CHECK (movement_type IN ('automatic', 'manual', 'quartz', 'solar')),
            case_material    TEXT NOT NULL DEFAULT '',
            case_diameter_mm REAL,
            price            REAL NOT NULL,
            currency         TEXT NOT NULL DEFAULT 'USD',
            description      TEXT NOT NULL DEFAULT '',
            status           TEXT NOT NULL DEFAULT 'active'
                             CHECK (status IN ('active', 'sold', 'pending', 'removed')),
            views_count      INTEGER NOT NULL DEFAULT 0,
            location_city    TEXT NOT NULL DEFAULT '',
            location_country TEXT NOT NULL DEFAULT '',
            created_at       TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at       TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_listings_brand ON listings(brand);
        CREATE INDEX IF NOT EXISTS idx_listings_status ON listings(status);
        CREATE INDEX IF NOT EXISTS idx_listings_price ON listings(price);
        CREATE INDEX IF NOT EXISTS idx_listings_condition ON listings(condition);
        CREATE INDEX IF NOT EXISTS idx_listings_created ON listings(created_at);

        CREATE TABLE IF NOT EXISTS listing_images (
            id          TEXT PRIMARY KEY,
            listing_id  TEXT NOT NULL REFERENCES listings(id) ON DELETE CASCADE,
            url         TEXT NOT NULL,
            is_primary  INTEGER NOT NULL DEFAULT 0,
            position    INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_listing_images_listing
            ON listing_images(listing_id, position);

        CREATE TABLE IF NOT EXISTS saved_listings (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            listing_id  TEXT NOT NULL REFERENCES listings(id) ON DELETE CASCADE,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(user_id, listing_id)
        );

        CREATE TABLE IF NOT EXISTS conversations (
            id          TEXT PRIMARY KEY,
            listing_id  TEXT NOT NULL REFERENCES listings(id) ON DELETE CASCADE,
            buyer_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            seller_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at  TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(listing_id, buyer_id)
        );

        CREATE INDEX IF NOT EXISTS idx_conversations_buyer ON conversations(buyer_id);
        CREATE INDEX IF NOT EXISTS idx_conversations_seller ON conversations(seller_id);

        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            sender_id       TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            content         TEXT NOT NULL,
            is_read         INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, created_at);

        CREATE TABLE IF NOT EXISTS stores (
            id            TEXT PRIMARY KEY,
            owner_id      TEXT NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
            name          TEXT NOT NULL,
            slug          TEXT NOT NULL UNIQUE,
            description   TEXT NOT NULL DEFAULT '',
            logo_url      TEXT,
            website       TEXT NOT NULL DEFAULT '',
            phone         TEXT NOT NULL DEFAULT '',
            email         TEXT NOT NULL DEFAULT '',
            address       TEXT NOT NULL DEFAULT '',
            city          TEXT NOT NULL DEFAULT '',
            country       TEXT NOT NULL DEFAULT '',
            latitude      REAL,
            longitude     REAL,
            opening_hours TEXT NOT NULL DEFAULT '{}',
            is_featured   INTEGER NOT NULL DEFAULT 0,
            is_verified   INTEGER NOT NULL DEFAULT 0,
            created_at    TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at    TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS store_reviews (
            id          TEXT PRIMARY KEY,
            author_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            store_id    TEXT NOT NULL REFERENCES stores(id) ON DELETE CASCADE,
            rating      INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
            content     TEXT NOT NULL DEFAULT '',
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(author_id, store_id)
        );

        CREATE TABLE IF NOT EXISTS store_promotions (
            id          TEXT PRIMARY KEY,
            store_id    TEXT NOT NULL UNIQUE REFERENCES stores(id) ON DELETE CASCADE,
            plan        TEXT NOT NULL CHECK (plan IN ('spotlight', 'featured')),
            started_at  TEXT NOT NULL DEFAULT (datetime('now')),
            expires_at  TEXT NOT NULL,
            is_active   INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS repair_shops (
            id            TEXT PRIMARY KEY,
            owner_id      TEXT NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
            name          TEXT NOT NULL,
            slug          TEXT NOT NULL UNIQUE,
            description   TEXT NOT NULL DEFAULT '',
            logo_url      TEXT,
            phone         TEXT NOT NULL DEFAULT '',
            email         TEXT NOT NULL DEFAULT '',
            address       TEXT NOT NULL DEFAULT '',
            city          TEXT NOT NULL DEFAULT '',
            country       TEXT NOT NULL DEFAULT '',
            latitude      REAL,
            longitude     REAL,
            opening_hours TEXT NOT NULL DEFAULT '{}',
            is_featured   INTEGER NOT NULL DEFAULT 0,
            is_verified   INTEGER NOT NULL DEFAULT 0,
            created_at    TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at    TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS repair_services (
            id            TEXT PRIMARY KEY,
            shop_id       TEXT NOT NULL REFERENCES repair_shops(id) ON DELETE CASCADE,
            name          TEXT NOT NULL,
            description   TEXT NOT NULL DEFAULT '',
            price_from    REAL,
            price_to      REAL,
            duration_days INTEGER,
            created_at    TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS repair_reviews (
            id          TEXT PRIMARY KEY,
            author_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            shop_id     TEXT NOT NULL REFERENCES repair_shops(id) ON DELETE CASCADE,
            rating      INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
            content     TEXT NOT NULL DEFAULT '',
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(author_id, shop_id)
        );

        CREATE TABLE IF NOT EXISTS appointments (
            id           TEXT PRIMARY KEY,
            shop_id      TEXT NOT NULL REFERENCES repair_shops(id) ON DELETE CASCADE,
            service_id   TEXT REFERENCES repair_services(id) ON DELETE SET NULL,
            customer_id  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            scheduled_at TEXT NOT NULL,
            status       TEXT NOT NULL DEFAULT 'pending'
                         CHECK (status IN ('pending', 'confirmed', 'completed', 'cancelled')),
            notes        TEXT NOT NULL DEFAULT '',
            created_at   TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_appointments_shop
            ON appointments(shop_id, scheduled_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
