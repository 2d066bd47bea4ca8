//! Row-to-response mapping. Rows keep the DB layer's string ids and
//! timestamps; everything crossing the API boundary becomes typed here.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use crown_db::Database;
use crown_db::models::{
    AppointmentRow, ConversationSummaryRow, ListingImageRow, ListingRow, MessageRow, PromotionRow,
    RepairShopRow, ReviewRow, ServiceRow, StoreRow, UserRow,
};
use crown_types::api::{
    AppointmentResponse, ConversationSummary, LastMessage, ListingCard, ListingDetail,
    ListingImageResponse, MessageResponse, PromotionResponse, RepairShopDetail, ReviewResponse,
    ServiceResponse, StoreCard, StoreDetail, UserProfile, UserPublic,
};
use crown_types::models::{
    AppointmentStatus, Condition, ListingStatus, MovementType, PromotionPlan, Role,
};

pub fn parse_uuid(s: &str) -> Uuid {
    s.parse().unwrap_or_else(|e| {
        warn!("Corrupt uuid '{}': {}", s, e);
        Uuid::default()
    })
}

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
/// Parse as naive UTC and convert, falling back through RFC 3339.
pub fn parse_ts(s: &str) -> DateTime<Utc> {
    s.parse::<DateTime<Utc>>()
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", s, e);
            DateTime::default()
        })
}

fn parse_role(s: &str) -> Role {
    Role::parse(s).unwrap_or_else(|| {
        warn!("Corrupt role '{}'", s);
        Role::Buyer
    })
}

fn full_name(first: &str, last: &str) -> String {
    format!("{first} {last}").trim().to_string()
}

pub fn user_public(row: &UserRow) -> UserPublic {
    UserPublic {
        id: parse_uuid(&row.id),
        username: row.username.clone(),
        full_name: full_name(&row.first_name, &row.last_name),
        avatar_url: row.avatar_url.clone(),
        role: parse_role(&row.role),
        is_verified: row.is_verified,
        created_at: parse_ts(&row.created_at),
    }
}

pub fn user_profile(row: &UserRow) -> UserProfile {
    UserProfile {
        id: parse_uuid(&row.id),
        email: row.email.clone(),
        username: row.username.clone(),
        full_name: full_name(&row.first_name, &row.last_name),
        first_name: row.first_name.clone(),
        last_name: row.last_name.clone(),
        role: parse_role(&row.role),
        avatar_url: row.avatar_url.clone(),
        phone: row.phone.clone(),
        is_verified: row.is_verified,
        created_at: parse_ts(&row.created_at),
        updated_at: parse_ts(&row.updated_at),
    }
}

/// Batch-load public profiles keyed by user id (inbox and card rendering).
pub fn load_user_map(db: &Database, ids: &[String]) -> Result<HashMap<String, UserPublic>> {
    let mut unique: Vec<String> = ids.to_vec();
    unique.sort();
    unique.dedup();
    let rows = db.get_users_by_ids(&unique)?;
    Ok(rows.iter().map(|r| (r.id.clone(), user_public(r))).collect())
}

fn placeholder_user(id: &str) -> UserPublic {
    warn!("Missing user row for '{}'", id);
    UserPublic {
        id: parse_uuid(id),
        username: "unknown".into(),
        full_name: String::new(),
        avatar_url: None,
        role: Role::Buyer,
        is_verified: false,
        created_at: DateTime::default(),
    }
}

pub fn user_or_placeholder(map: &HashMap<String, UserPublic>, id: &str) -> UserPublic {
    map.get(id).cloned().unwrap_or_else(|| placeholder_user(id))
}

// -- Listings --

pub fn image_response(row: &ListingImageRow) -> ListingImageResponse {
    ListingImageResponse {
        id: parse_uuid(&row.id),
        url: row.url.clone(),
        is_primary: row.is_primary,
        position: row.position.max(0) as u32,
    }
}

fn parse_condition(s: &str) -> Condition {
    Condition::parse(s).unwrap_or_else(|| {
        warn!("Corrupt condition '{}'", s);
        Condition::Good
    })
}

fn parse_listing_status(s: &str) -> ListingStatus {
    ListingStatus::parse(s).unwrap_or_else(|| {
        warn!("Corrupt listing status '{}'", s);
        ListingStatus::Removed
    })
}

/// Card shape: the primary image (or the first, when none is flagged).
pub fn listing_card(
    row: &ListingRow,
    images: &[ListingImageRow],
    seller: UserPublic,
    is_saved: bool,
) -> ListingCard {
    let primary = images
        .iter()
        .find(|i| i.is_primary)
        .or_else(|| images.first())
        .map(image_response);

    ListingCard {
        id: parse_uuid(&row.id),
        title: row.title.clone(),
        brand: row.brand.clone(),
        model: row.model.clone(),
        condition: parse_condition(&row.condition),
        price: row.price,
        currency: row.currency.clone(),
        location_city: row.location_city.clone(),
        location_country: row.location_country.clone(),
        primary_image: primary,
        seller,
        is_saved,
        views_count: row.views_count.max(0) as u64,
        created_at: parse_ts(&row.created_at),
    }
}

pub fn listing_detail(
    row: &ListingRow,
    images: &[ListingImageRow],
    seller: UserPublic,
    is_saved: bool,
) -> ListingDetail {
    ListingDetail {
        id: parse_uuid(&row.id),
        title: row.title.clone(),
        brand: row.brand.clone(),
        model: row.model.clone(),
        reference_number: row.reference_number.clone(),
        year: row.year.map(|y| y.max(0) as u32),
        condition: parse_condition(&row.condition),
        movement_type: row.movement_type.as_deref().and_then(MovementType::parse),
        case_material: row.case_material.clone(),
        case_diameter_mm: row.case_diameter_mm,
        price: row.price,
        currency: row.currency.clone(),
        description: row.description.clone(),
        status: parse_listing_status(&row.status),
        location_city: row.location_city.clone(),
        location_country: row.location_country.clone(),
        views_count: row.views_count.max(0) as u64,
        images: images.iter().map(image_response).collect(),
        seller,
        is_saved,
        created_at: parse_ts(&row.created_at),
        updated_at: parse_ts(&row.updated_at),
    }
}

// -- Messaging --

pub fn message_response(row: &MessageRow, sender: UserPublic) -> MessageResponse {
    MessageResponse {
        id: parse_uuid(&row.id),
        sender,
        content: row.content.clone(),
        is_read: row.is_read,
        created_at: parse_ts(&row.created_at),
    }
}

pub fn conversation_summary(
    row: &ConversationSummaryRow,
    users: &HashMap<String, UserPublic>,
) -> ConversationSummary {
    let last_message = match (&row.last_content, &row.last_sender_id, &row.last_created_at) {
        (Some(content), Some(sender_id), Some(created_at)) => Some(LastMessage {
            content: content.clone(),
            sender_id: parse_uuid(sender_id),
            created_at: parse_ts(created_at),
        }),
        _ => None,
    };

    ConversationSummary {
        id: parse_uuid(&row.id),
        listing_id: parse_uuid(&row.listing_id),
        listing_title: row.listing_title.clone(),
        listing_brand: row.listing_brand.clone(),
        buyer: user_or_placeholder(users, &row.buyer_id),
        seller: user_or_placeholder(users, &row.seller_id),
        last_message,
        unread_count: row.unread.max(0) as u64,
        created_at: parse_ts(&row.created_at),
        updated_at: parse_ts(&row.updated_at),
    }
}

// -- Stores & repair shops --

fn parse_hours(s: &str) -> serde_json::Value {
    serde_json::from_str(s).unwrap_or_else(|e| {
        warn!("Corrupt opening_hours '{}': {}", s, e);
        serde_json::json!({})
    })
}

/// One decimal place, matching the directory card display.
pub fn round_rating(avg: f64) -> f64 {
    (avg * 10.0).round() / 10.0
}

pub fn store_card(row: &StoreRow, avg: f64, review_count: u64) -> StoreCard {
    StoreCard {
        id: parse_uuid(&row.id),
        name: row.name.clone(),
        slug: row.slug.clone(),
        logo_url: row.logo_url.clone(),
        city: row.city.clone(),
        country: row.country.clone(),
        is_featured: row.is_featured,
        is_verified: row.is_verified,
        average_rating: round_rating(avg),
        review_count,
        created_at: parse_ts(&row.created_at),
    }
}

pub fn store_detail(
    row: &StoreRow,
    owner: UserPublic,
    avg: f64,
    review_count: u64,
    promotion: Option<&PromotionRow>,
) -> StoreDetail {
    StoreDetail {
        id: parse_uuid(&row.id),
        owner,
        name: row.name.clone(),
        slug: row.slug.clone(),
        description: row.description.clone(),
        logo_url: row.logo_url.clone(),
        website: row.website.clone(),
        phone: row.phone.clone(),
        email: row.email.clone(),
        address: row.address.clone(),
        city: row.city.clone(),
        country: row.country.clone(),
        latitude: row.latitude,
        longitude: row.longitude,
        opening_hours: parse_hours(&row.opening_hours),
        is_featured: row.is_featured,
        is_verified: row.is_verified,
        average_rating: round_rating(avg),
        review_count,
        promotion: promotion.map(promotion_response),
        created_at: parse_ts(&row.created_at),
        updated_at: parse_ts(&row.updated_at),
    }
}

pub fn promotion_response(row: &PromotionRow) -> PromotionResponse {
    let plan = PromotionPlan::parse(&row.plan).unwrap_or_else(|| {
        warn!("Corrupt promotion plan '{}'", row.plan);
        PromotionPlan::Spotlight
    });
    PromotionResponse {
        id: parse_uuid(&row.id),
        plan,
        plan_label: plan.label().to_string(),
        started_at: parse_ts(&row.started_at),
        expires_at: parse_ts(&row.expires_at),
        is_active: row.is_active,
        is_expired: row.is_expired,
    }
}

pub fn review_response(row: &ReviewRow, author: UserPublic) -> ReviewResponse {
    ReviewResponse {
        id: parse_uuid(&row.id),
        author,
        rating: row.rating.clamp(1, 5) as u8,
        content: row.content.clone(),
        created_at: parse_ts(&row.created_at),
    }
}

pub fn repair_shop_card(row: &RepairShopRow, avg: f64, review_count: u64) -> StoreCard {
    StoreCard {
        id: parse_uuid(&row.id),
        name: row.name.clone(),
        slug: row.slug.clone(),
        logo_url: row.logo_url.clone(),
        city: row.city.clone(),
        country: row.country.clone(),
        is_featured: row.is_featured,
        is_verified: row.is_verified,
        average_rating: round_rating(avg),
        review_count,
        created_at: parse_ts(&row.created_at),
    }
}

pub fn repair_shop_detail(
    row: &RepairShopRow,
    owner: UserPublic,
    avg: f64,
    review_count: u64,
    services: &[ServiceRow],
) -> RepairShopDetail {
    RepairShopDetail {
        id: parse_uuid(&row.id),
        owner,
        name: row.name.clone(),
        slug: row.slug.clone(),
        description: row.description.clone(),
        logo_url: row.logo_url.clone(),
        phone: row.phone.clone(),
        email: row.email.clone(),
        address: row.address.clone(),
        city: row.city.clone(),
        country: row.country.clone(),
        latitude: row.latitude,
        longitude: row.longitude,
        opening_hours: parse_hours(&row.opening_hours),
        is_featured: row.is_featured,
        is_verified: row.is_verified,
        average_rating: round_rating(avg),
        review_count,
        services: services.iter().map(service_response).collect(),
        created_at: parse_ts(&row.created_at),
        updated_at: parse_ts(&row.updated_at),
    }
}

pub fn service_response(row: &ServiceRow) -> ServiceResponse {
    ServiceResponse {
        id: parse_uuid(&row.id),
        name: row.name.clone(),
        description: row.description.clone(),
        price_from: row.price_from,
        price_to: row.price_to,
        duration_days: row.duration_days.map(|d| d.max(0) as u32),
        created_at: parse_ts(&row.created_at),
    }
}

pub fn appointment_response(
    row: &AppointmentRow,
    customer: UserPublic,
    service: Option<&ServiceRow>,
) -> AppointmentResponse {
    let status = AppointmentStatus::parse(&row.status).unwrap_or_else(|| {
        warn!("Corrupt appointment status '{}'", row.status);
        AppointmentStatus::Pending
    });
    AppointmentResponse {
        id: parse_uuid(&row.id),
        customer,
        service: service.map(service_response),
        scheduled_at: parse_ts(&row.scheduled_at),
        status,
        notes: row.notes.clone(),
        created_at: parse_ts(&row.created_at),
    }
}
