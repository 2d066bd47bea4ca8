//! Buyer-seller messaging. One conversation per (listing, buyer) pair;
//! unread state is always tracked per participant.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crown_db::models::ConversationRow;
use crown_types::api::{
    Claims, ConversationDetail, ConversationSummary, SendMessageRequest,
    StartConversationRequest, UnreadResponse,
};
use crown_types::models::ListingStatus;

use crate::convert::{self, conversation_summary, load_user_map, message_response, parse_ts};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

fn is_participant(claims: &Claims, row: &ConversationRow) -> bool {
    let user_id = claims.sub.to_string();
    user_id == row.buyer_id || user_id == row.seller_id
}

fn get_participant_conversation(
    state: &AppState,
    claims: &Claims,
    id: Uuid,
) -> ApiResult<ConversationRow> {
    let row = state
        .db
        .get_conversation(&id.to_string())?
        .ok_or(ApiError::NotFound("Conversation"))?;
    if !is_participant(claims, &row) {
        return Err(ApiError::PermissionDenied(
            "You are not a participant in this conversation.".into(),
        ));
    }
    Ok(row)
}

fn conversation_detail(state: &AppState, row: &ConversationRow) -> ApiResult<ConversationDetail> {
    let listing = state
        .db
        .get_listing(&row.listing_id)?
        .ok_or_else(|| anyhow::anyhow!("conversation {} has no listing row", row.id))?;

    let messages = state.db.messages_for_conversation(&row.id)?;

    let mut user_ids = vec![row.buyer_id.clone(), row.seller_id.clone()];
    user_ids.extend(messages.iter().map(|m| m.sender_id.clone()));
    let users = load_user_map(&state.db, &user_ids)?;

    Ok(ConversationDetail {
        id: convert::parse_uuid(&row.id),
        listing_id: convert::parse_uuid(&row.listing_id),
        listing_title: listing.title,
        listing_brand: listing.brand,
        buyer: convert::user_or_placeholder(&users, &row.buyer_id),
        seller: convert::user_or_placeholder(&users, &row.seller_id),
        messages: messages
            .iter()
            .map(|m| message_response(m, convert::user_or_placeholder(&users, &m.sender_id)))
            .collect(),
        buyer_unread: state.db.unread_count_for(&row.id, &row.buyer_id)?,
        seller_unread: state.db.unread_count_for(&row.id, &row.seller_id)?,
        created_at: parse_ts(&row.created_at),
        updated_at: parse_ts(&row.updated_at),
    })
}

/// POST /conversations/ — start (or continue) the caller's conversation
/// about a listing. Concurrent first messages converge on one conversation;
/// 201 marks the request that actually created it.
pub async fn start(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<StartConversationRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.message.trim().is_empty() {
        return Err(ApiError::InvalidArgument("Message cannot be empty.".into()));
    }

    let buyer_id = claims.sub.to_string();
    let listing = state
        .db
        .get_listing(&req.listing_id.to_string())?
        .filter(|l| l.status == ListingStatus::Active.as_str())
        .ok_or(ApiError::NotFound("Listing"))?;
    if listing.seller_id == buyer_id {
        return Err(ApiError::InvalidArgument(
            "You cannot message your own listing.".into(),
        ));
    }

    let (conversation, created) = state.db.get_or_create_conversation(
        &Uuid::new_v4().to_string(),
        &listing.id,
        &buyer_id,
        &listing.seller_id,
    )?;
    state.db.insert_message(
        &Uuid::new_v4().to_string(),
        &conversation.id,
        &buyer_id,
        req.message.trim(),
    )?;

    let detail = conversation_detail(&state, &conversation)?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(detail)))
}

/// GET /conversations/ — the caller's inbox, freshest first.
pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<ConversationSummary>>> {
    let rows = state.db.conversations_for_user(&claims.sub.to_string())?;

    let mut user_ids = Vec::with_capacity(rows.len() * 2);
    for row in &rows {
        user_ids.push(row.buyer_id.clone());
        user_ids.push(row.seller_id.clone());
    }
    let users = load_user_map(&state.db, &user_ids)?;

    Ok(Json(
        rows.iter().map(|r| conversation_summary(r, &users)).collect(),
    ))
}

/// GET /conversations/{id}/ — opening a conversation marks everything the
/// caller received in it as read.
pub async fn detail(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ConversationDetail>> {
    let row = get_participant_conversation(&state, &claims, id)?;
    state.db.mark_messages_read(&row.id, &claims.sub.to_string())?;
    Ok(Json(conversation_detail(&state, &row)?))
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.content.trim().is_empty() {
        return Err(ApiError::InvalidArgument("Message cannot be empty.".into()));
    }

    let row = get_participant_conversation(&state, &claims, id)?;
    let sender_id = claims.sub.to_string();
    let message = state.db.insert_message(
        &Uuid::new_v4().to_string(),
        &row.id,
        &sender_id,
        req.content.trim(),
    )?;

    let users = load_user_map(&state.db, std::slice::from_ref(&sender_id))?;
    let sender = convert::user_or_placeholder(&users, &sender_id);
    Ok((StatusCode::CREATED, Json(message_response(&message, sender))))
}

/// GET /conversations/unread/ — scalar badge count across the inbox.
pub async fn unread_total(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<UnreadResponse>> {
    let unread = state.db.unread_total(&claims.sub.to_string())?;
    Ok(Json(UnreadResponse { unread }))
}
