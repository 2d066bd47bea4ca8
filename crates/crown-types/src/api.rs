use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    AppointmentStatus, Condition, ListingStatus, MovementType, PromotionPlan, Role,
};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the token issuer. Canonical
/// definition lives here in crown-types to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    /// "access" or "refresh". Refresh tokens are only accepted by the
    /// refresh endpoint; access tokens everywhere else.
    pub token_type: String,
    /// Token id, used to blacklist refresh tokens on logout.
    pub jti: Uuid,
    pub exp: usize,
}

// -- Pagination --

/// Page-number pagination envelope: `{count, page, page_size, results}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Page<T> {
    pub count: u64,
    pub page: u32,
    pub page_size: u32,
    pub results: Vec<T>,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    pub password_confirm: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub user: UserProfile,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access: String,
    pub refresh: String,
    pub user: UserProfile,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccessTokenResponse {
    pub access: String,
}

#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PasswordResetConfirm {
    pub token: Uuid,
    pub new_password: String,
    pub new_password_confirm: String,
}

// -- Users --

/// Safe public profile — no sensitive fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPublic {
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
    pub avatar_url: Option<String>,
    pub role: Role,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

/// Full profile for the authenticated user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub full_name: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub avatar_url: Option<String>,
    pub phone: String,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub new_password_confirm: String,
}

// -- Listings --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateListingRequest {
    pub title: String,
    pub brand: String,
    pub model: String,
    #[serde(default)]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub year: Option<u32>,
    pub condition: Condition,
    #[serde(default)]
    pub movement_type: Option<MovementType>,
    #[serde(default)]
    pub case_material: Option<String>,
    #[serde(default)]
    pub case_diameter_mm: Option<f64>,
    pub price: f64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location_city: Option<String>,
    #[serde(default)]
    pub location_country: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct UpdateListingRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub year: Option<u32>,
    #[serde(default)]
    pub condition: Option<Condition>,
    #[serde(default)]
    pub movement_type: Option<MovementType>,
    #[serde(default)]
    pub case_material: Option<String>,
    #[serde(default)]
    pub case_diameter_mm: Option<f64>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location_city: Option<String>,
    #[serde(default)]
    pub location_country: Option<String>,
    #[serde(default)]
    pub status: Option<ListingStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingImageResponse {
    pub id: Uuid,
    pub url: String,
    pub is_primary: bool,
    pub position: u32,
}

/// Compact shape for listing cards in search results.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListingCard {
    pub id: Uuid,
    pub title: String,
    pub brand: String,
    pub model: String,
    pub condition: Condition,
    pub price: f64,
    pub currency: String,
    pub location_city: String,
    pub location_country: String,
    pub primary_image: Option<ListingImageResponse>,
    pub seller: UserPublic,
    pub is_saved: bool,
    pub views_count: u64,
    pub created_at: DateTime<Utc>,
}

/// Full listing detail including every image.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListingDetail {
    pub id: Uuid,
    pub title: String,
    pub brand: String,
    pub model: String,
    pub reference_number: String,
    pub year: Option<u32>,
    pub condition: Condition,
    pub movement_type: Option<MovementType>,
    pub case_material: String,
    pub case_diameter_mm: Option<f64>,
    pub price: f64,
    pub currency: String,
    pub description: String,
    pub status: ListingStatus,
    pub location_city: String,
    pub location_country: String,
    pub views_count: u64,
    pub images: Vec<ListingImageResponse>,
    pub seller: UserPublic,
    pub is_saved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SavedResponse {
    pub saved: bool,
}

// -- Messaging --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StartConversationRequest {
    pub listing_id: Uuid,
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub sender: UserPublic,
    pub content: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastMessage {
    pub content: String,
    pub sender_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Conversation as seen in the inbox list: last-message preview plus the
/// unread count for the requesting participant — never a participant-agnostic
/// count.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub listing_title: String,
    pub listing_brand: String,
    pub buyer: UserPublic,
    pub seller: UserPublic,
    pub last_message: Option<LastMessage>,
    pub unread_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationDetail {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub listing_title: String,
    pub listing_brand: String,
    pub buyer: UserPublic,
    pub seller: UserPublic,
    pub messages: Vec<MessageResponse>,
    pub buyer_unread: u64,
    pub seller_unread: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnreadResponse {
    pub unread: u64,
}

// -- Stores & repair shops --

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct UpsertStoreRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub opening_hours: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreCard {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub logo_url: Option<String>,
    pub city: String,
    pub country: String,
    pub is_featured: bool,
    pub is_verified: bool,
    pub average_rating: f64,
    pub review_count: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreDetail {
    pub id: Uuid,
    pub owner: UserPublic,
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
    pub opening_hours: serde_json::Value,
    pub is_featured: bool,
    pub is_verified: bool,
    pub average_rating: f64,
    pub review_count: u64,
    pub promotion: Option<PromotionResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Repair shops embed their service menu in the detail payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct RepairShopDetail {
    pub id: Uuid,
    pub owner: UserPublic,
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
    pub opening_hours: serde_json::Value,
    pub is_featured: bool,
    pub is_verified: bool,
    pub average_rating: f64,
    pub review_count: u64,
    pub services: Vec<ServiceResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateReviewRequest {
    pub rating: u8,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReviewResponse {
    pub id: Uuid,
    pub author: UserPublic,
    pub rating: u8,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PurchasePromotionRequest {
    pub plan: PromotionPlan,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PromotionResponse {
    pub id: Uuid,
    pub plan: PromotionPlan,
    pub plan_label: String,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub is_expired: bool,
}

// -- Repair services & appointments --

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct UpsertServiceRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price_from: Option<f64>,
    #[serde(default)]
    pub price_to: Option<f64>,
    #[serde(default)]
    pub duration_days: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceResponse {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub price_from: Option<f64>,
    pub price_to: Option<f64>,
    pub duration_days: Option<u32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateAppointmentRequest {
    #[serde(default)]
    pub service_id: Option<Uuid>,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateAppointmentRequest {
    pub status: AppointmentStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AppointmentResponse {
    pub id: Uuid,
    pub customer: UserPublic,
    pub service: Option<ServiceResponse>,
    pub scheduled_at: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}
