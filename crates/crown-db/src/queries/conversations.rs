use crate::Database;
use crate::models::{ConversationRow, ConversationSummaryRow, MessageRow};
use anyhow::Result;
use rusqlite::{OptionalExtension, Row, params};

fn conversation_from_row(row: &Row) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        listing_id: row.get(1)?,
        buyer_id: row.get(2)?,
        seller_id: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn message_from_row(row: &Row) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        content: row.get(3)?,
        is_read: row.get(4)?,
        created_at: row.get(5)?,
    })
}

impl Database {
    /// Get-or-create keyed on (listing, buyer). The insert races against the
    /// UNIQUE constraint: both the winner and the loser of a concurrent first
    /// message end up on the same single row, and only the winner sees
    /// `created = true`.
    pub fn get_or_create_conversation(
        &self,
        id: &str,
        listing_id: &str,
        buyer_id: &str,
        seller_id: &str,
    ) -> Result<(ConversationRow, bool)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO conversations (id, listing_id, buyer_id, seller_id)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(listing_id, buyer_id) DO NOTHING",
                params![id, listing_id, buyer_id, seller_id],
            )?;
            let created = tx.changes() > 0;

            let row = tx.query_row(
                "SELECT id, listing_id, buyer_id, seller_id, created_at, updated_at
                 FROM conversations WHERE listing_id = ?1 AND buyer_id = ?2",
                params![listing_id, buyer_id],
                conversation_from_row,
            )?;
            tx.commit()?;
            Ok((row, created))
        })
    }

    pub fn get_conversation(&self, id: &str) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, listing_id, buyer_id, seller_id, created_at, updated_at
                     FROM conversations WHERE id = ?1",
                    [id],
                    conversation_from_row,
                )
                .optional()?)
        })
    }

    /// Every conversation the user participates in, most recent activity
    /// first. The unread column counts received-and-unread messages for this
    /// user specifically.
    pub fn conversations_for_user(&self, user_id: &str) -> Result<Vec<ConversationSummaryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.listing_id, l.title, l.brand, c.buyer_id, c.seller_id,
                        (SELECT COUNT(*) FROM messages m
                          WHERE m.conversation_id = c.id
                            AND m.is_read = 0 AND m.sender_id <> ?1) AS unread,
                        (SELECT m.content FROM messages m WHERE m.conversation_id = c.id
                          ORDER BY m.created_at DESC, m.rowid DESC LIMIT 1),
                        (SELECT m.sender_id FROM messages m WHERE m.conversation_id = c.id
                          ORDER BY m.created_at DESC, m.rowid DESC LIMIT 1),
                        (SELECT m.created_at FROM messages m WHERE m.conversation_id = c.id
                          ORDER BY m.created_at DESC, m.rowid DESC LIMIT 1),
                        c.created_at, c.updated_at
                 FROM conversations c
                 JOIN listings l ON l.id = c.listing_id
                 WHERE c.buyer_id = ?1 OR c.seller_id = ?1
                 ORDER BY c.updated_at DESC, c.rowid DESC",
            )?;

            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(ConversationSummaryRow {
                        id: row.get(0)?,
                        listing_id: row.get(1)?,
                        listing_title: row.get(2)?,
                        listing_brand: row.get(3)?,
                        buyer_id: row.get(4)?,
                        seller_id: row.get(5)?,
                        unread: row.get(6)?,
                        last_content: row.get(7)?,
                        last_sender_id: row.get(8)?,
                        last_created_at: row.get(9)?,
                        created_at: row.get(10)?,
                        updated_at: row.get(11)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Append a message and bump the conversation's freshness marker in one
    /// transaction.
    pub fn insert_message(
        &self,
        id: &str,
        conversation_id: &str,
        sender_id: &str,
        content: &str,
    ) -> Result<MessageRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO messages (id, conversation_id, sender_id, content)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, conversation_id, sender_id, content],
            )?;
            tx.execute(
                "UPDATE conversations SET updated_at = datetime('now') WHERE id = ?1",
                [conversation_id],
            )?;
            let row = tx.query_row(
                "SELECT id, conversation_id, sender_id, content, is_read, created_at
                 FROM messages WHERE id = ?1",
                [id],
                message_from_row,
            )?;
            tx.commit()?;
            Ok(row)
        })
    }

    /// Chronological history, oldest first.
    pub fn messages_for_conversation(&self, conversation_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, sender_id, content, is_read, created_at
                 FROM messages WHERE conversation_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
            )?;
            let rows = stmt
                .query_map([conversation_id], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Bulk unread→read for everything the reader received in this
    /// conversation. One UPDATE, so the flip is atomic; the transition is
    /// one-directional and therefore idempotent. Returns how many flipped.
    pub fn mark_messages_read(&self, conversation_id: &str, reader_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET is_read = 1
                 WHERE conversation_id = ?1 AND is_read = 0 AND sender_id <> ?2",
                params![conversation_id, reader_id],
            )?;
            Ok(changed as u64)
        })
    }

    /// Unread count for one participant of one conversation.
    pub fn unread_count_for(&self, conversation_id: &str, user_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages
                 WHERE conversation_id = ?1 AND is_read = 0 AND sender_id <> ?2",
                params![conversation_id, user_id],
                |row| row.get(0),
            )?;
            Ok(n as u64)
        })
    }

    /// Scalar badge count: unread messages across every conversation the
    /// user participates in, excluding self-authored ones.
    pub fn unread_total(&self, user_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages m
                 JOIN conversations c ON c.id = m.conversation_id
                 WHERE (c.buyer_id = ?1 OR c.seller_id = ?1)
                   AND m.sender_id <> ?1 AND m.is_read = 0",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(n as u64)
        })
    }

}

#[cfg(test)]
mod tests {
    use crate::Database;
    use crate::models::ListingRow;

    fn seed(db: &Database) {
        db.create_user("seller", "s@example.com", "sam", "h", "", "", "seller")
            .unwrap();
        db.create_user("buyer", "b@example.com", "bea", "h", "", "", "buyer")
            .unwrap();
        db.insert_listing(&ListingRow {
            id: "l1".into(),
            seller_id: "seller".into(),
            title: "Speedmaster".into(),
            brand: "Omega".into(),
            model: "Professional".into(),
            reference_number: String::new(),
            year: None,
            condition: "good".into(),
            movement_type: None,
            case_material: String::new(),
            case_diameter_mm: None,
            price: 5000.0,
            currency: "USD".into(),
            description: String::new(),
            status: "active".into(),
            views_count: 0,
            location_city: String::new(),
            location_country: String::new(),
            created_at: String::new(),
            updated_at: String::new(),
        })
        .unwrap();
    }

    #[test]
    fn get_or_create_converges_to_one_row() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);

        let (c1, created1) = db
            .get_or_create_conversation("c1", "l1", "buyer", "seller")
            .unwrap();
        assert!(created1);

        // second call with a fresh candidate id lands on the existing row
        let (c2, created2) = db
            .get_or_create_conversation("c-other", "l1", "buyer", "seller")
            .unwrap();
        assert!(!created2);
        assert_eq!(c1.id, c2.id);
    }

    #[test]
    fn racing_first_messages_share_one_conversation() {
        use std::sync::Arc;
        use std::thread;

        let db = Arc::new(Database::open_in_memory().unwrap());
        seed(&db);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let db = Arc::clone(&db);
                thread::spawn(move || {
                    db.get_or_create_conversation(&format!("cand-{i}"), "l1", "buyer", "seller")
                        .unwrap()
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        // exactly one caller observes the creation, everyone lands on one row
        assert_eq!(results.iter().filter(|(_, created)| *created).count(), 1);
        let first = &results[0].0.id;
        assert!(results.iter().all(|(row, _)| &row.id == first));
    }

    #[test]
    fn unread_counts_exclude_own_messages() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let (c, _) = db
            .get_or_create_conversation("c1", "l1", "buyer", "seller")
            .unwrap();

        db.insert_message("m1", &c.id, "buyer", "Is this available?").unwrap();

        // seller received one unread, buyer authored it
        assert_eq!(db.unread_total("seller").unwrap(), 1);
        assert_eq!(db.unread_total("buyer").unwrap(), 0);
        assert_eq!(db.unread_count_for(&c.id, "seller").unwrap(), 1);
        assert_eq!(db.unread_count_for(&c.id, "buyer").unwrap(), 0);
    }

    #[test]
    fn mark_read_is_bulk_and_idempotent() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let (c, _) = db
            .get_or_create_conversation("c1", "l1", "buyer", "seller")
            .unwrap();
        db.insert_message("m1", &c.id, "buyer", "hello").unwrap();
        db.insert_message("m2", &c.id, "buyer", "still there?").unwrap();
        db.insert_message("m3", &c.id, "seller", "yes").unwrap();

        // seller views: both buyer messages flip, own message untouched
        assert_eq!(db.mark_messages_read(&c.id, "seller").unwrap(), 2);
        assert_eq!(db.unread_count_for(&c.id, "seller").unwrap(), 0);
        assert_eq!(db.unread_count_for(&c.id, "buyer").unwrap(), 1);

        // idempotent: nothing left to flip
        assert_eq!(db.mark_messages_read(&c.id, "seller").unwrap(), 0);

        let msgs = db.messages_for_conversation(&c.id).unwrap();
        assert!(msgs.iter().filter(|m| m.sender_id == "buyer").all(|m| m.is_read));
        assert!(!msgs.iter().find(|m| m.id == "m3").unwrap().is_read);
    }

    #[test]
    fn history_is_chronological() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let (c, _) = db
            .get_or_create_conversation("c1", "l1", "buyer", "seller")
            .unwrap();
        db.insert_message("m1", &c.id, "buyer", "first").unwrap();
        db.insert_message("m2", &c.id, "seller", "second").unwrap();
        db.insert_message("m3", &c.id, "buyer", "third").unwrap();

        let ids: Vec<String> = db
            .messages_for_conversation(&c.id)
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn summaries_carry_preview_and_per_user_unread() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let (c, _) = db
            .get_or_create_conversation("c1", "l1", "buyer", "seller")
            .unwrap();
        db.insert_message("m1", &c.id, "buyer", "hello").unwrap();
        db.insert_message("m2", &c.id, "buyer", "ping").unwrap();

        let for_seller = db.conversations_for_user("seller").unwrap();
        assert_eq!(for_seller.len(), 1);
        assert_eq!(for_seller[0].unread, 2);
        assert_eq!(for_seller[0].last_content.as_deref(), Some("ping"));
        assert_eq!(for_seller[0].listing_title, "Speedmaster");

        // same conversation, buyer's perspective: zero unread
        let for_buyer = db.conversations_for_user("buyer").unwrap();
        assert_eq!(for_buyer[0].unread, 0);

        // an uninvolved user sees nothing
        db.create_user("other", "o@example.com", "omar", "h", "", "", "buyer")
            .unwrap();
        assert!(db.conversations_for_user("other").unwrap().is_empty());
    }
}
