//! Database row types — these map directly to SQLite rows.
//! Distinct from the crown-types API models to keep the DB layer independent.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub phone: String,
    pub avatar_url: Option<String>,
    pub is_verified: bool,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug)]
pub struct TokenRow {
    pub token: String,
    pub user_id: String,
    pub is_used: bool,
    pub is_expired: bool,
}

#[derive(Debug, Clone)]
pub struct ListingRow {
    pub id: String,
    pub seller_id: String,
    pub title: String,
    pub brand: String,
    pub model: String,
    pub reference_number: String,
    pub year: Option<i64>,
    pub condition: String,
    pub movement_type: Option<String>,
    pub case_material: String,
    pub case_diameter_mm: Option<f64>,
    pub price: f64,
    pub currency: String,
    pub description: String,
    pub status: String,
    pub views_count: i64,
    pub location_city: String,
    pub location_country: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct ListingImageRow {
    pub id: String,
    pub listing_id: String,
    pub url: String,
    pub is_primary: bool,
    pub position: i64,
}

#[derive(Debug, Clone)]
pub struct ConversationRow {
    pub id: String,
    pub listing_id: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Inbox view of a conversation: joined listing fields, last-message preview
/// columns and the unread count for the querying participant.
#[derive(Debug)]
pub struct ConversationSummaryRow {
    pub id: String,
    pub listing_id: String,
    pub listing_title: String,
    pub listing_brand: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub unread: i64,
    pub last_content: Option<String>,
    pub last_sender_id: Option<String>,
    pub last_created_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub is_read: bool,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct StoreRow {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub logo_url: Option<String>,
    pub website: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub city: String,
    pub country: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub opening_hours: String,
    pub is_featured: bool,
    pub is_verified: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct PromotionRow {
    pub id: String,
    pub store_id: String,
    pub plan: String,
    pub started_at: String,
    pub expires_at: String,
    pub is_active: bool,
    pub is_expired: bool,
}

/// Shared by store_reviews and repair_reviews (identical shape).
#[derive(Debug, Clone)]
pub struct ReviewRow {
    pub id: String,
    pub author_id: String,
    pub rating: i64,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct RepairShopRow {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub logo_url: Option<String>,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub city: String,
    pub country: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub opening_hours: String,
    pub is_featured: bool,
    pub is_verified: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct ServiceRow {
    pub id: String,
    pub shop_id: String,
    pub name: String,
    pub description: String,
    pub price_from: Option<f64>,
    pub price_to: Option<f64>,
    pub duration_days: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct AppointmentRow {
    pub id: String,
    pub shop_id: String,
    pub service_id: Option<String>,
    pub customer_id: String,
    pub scheduled_at: String,
    pub status: String,
    pub notes: String,
    pub created_at: String,
}
