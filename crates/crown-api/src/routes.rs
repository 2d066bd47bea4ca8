//! Route table. Public routes serve the catalog and directories (optionally
//! personalized via a bearer token); protected routes sit behind
//! [`require_auth`].

use axum::{
    Router, middleware,
    routing::{delete, get, patch, post, put},
};

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{auth, conversations, listings, repairs, stores, users};

pub fn api_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/auth/register/", post(auth::register))
        .route("/auth/login/", post(auth::login))
        .route("/auth/refresh/", post(auth::refresh))
        .route("/auth/logout/", post(auth::logout))
        .route("/auth/verify-email/", post(auth::verify_email))
        .route("/auth/password-reset/", post(auth::password_reset_request))
        .route("/auth/password-reset/confirm/", post(auth::password_reset_confirm))
        .route("/listings/", get(listings::search))
        .route("/listings/{id}/", get(listings::detail))
        .route("/users/{id}/", get(users::public_profile))
        .route("/users/{id}/listings/", get(users::seller_listings))
        .route("/stores/", get(stores::directory))
        .route("/stores/{slug}/", get(stores::detail))
        .route("/stores/{slug}/reviews/", get(stores::list_reviews))
        .route("/repair-shops/", get(repairs::directory))
        .route("/repair-shops/{slug}/", get(repairs::detail))
        .route("/repair-shops/{slug}/reviews/", get(repairs::list_reviews))
        .with_state(state.clone());

    let protected = Router::new()
        .route("/users/me/", get(users::me).patch(users::update_me))
        .route("/users/me/password/", post(users::change_password))
        .route("/users/me/avatar/", put(users::upload_avatar))
        .route("/listings/", post(listings::create))
        .route("/listings/mine/", get(listings::mine))
        .route("/listings/saved/", get(listings::saved))
        .route("/listings/{id}/", patch(listings::update).delete(listings::delete))
        .route(
            "/listings/{id}/save/",
            post(listings::save).delete(listings::unsave),
        )
        .route("/listings/{id}/images/", post(listings::upload_image))
        .route(
            "/listings/{id}/images/{image_id}/",
            delete(listings::delete_image),
        )
        .route(
            "/listings/{id}/images/{image_id}/primary/",
            post(listings::set_primary_image),
        )
        .route(
            "/conversations/",
            get(conversations::list).post(conversations::start),
        )
        .route("/conversations/unread/", get(conversations::unread_total))
        .route("/conversations/{id}/", get(conversations::detail))
        .route(
            "/conversations/{id}/messages/",
            post(conversations::send_message),
        )
        .route("/stores/", post(stores::create))
        .route(
            "/stores/mine/",
            get(stores::mine).patch(stores::update).delete(stores::delete),
        )
        .route("/stores/mine/logo/", put(stores::upload_logo))
        .route(
            "/stores/mine/promotion/",
            get(stores::my_promotion).post(stores::purchase_promotion),
        )
        .route("/stores/{slug}/reviews/", post(stores::create_review))
        .route("/repair-shops/", post(repairs::create))
        .route(
            "/repair-shops/mine/",
            get(repairs::mine).patch(repairs::update).delete(repairs::delete),
        )
        .route("/repair-shops/mine/logo/", put(repairs::upload_logo))
        .route("/repair-shops/mine/services/", post(repairs::create_service))
        .route(
            "/repair-shops/mine/services/{service_id}/",
            patch(repairs::update_service).delete(repairs::delete_service),
        )
        .route("/repair-shops/{slug}/reviews/", post(repairs::create_review))
        .route(
            "/repair-shops/{slug}/appointments/",
            get(repairs::list_appointments).post(repairs::create_appointment),
        )
        .route(
            "/repair-shops/{slug}/appointments/{appointment_id}/",
            patch(repairs::update_appointment),
        )
        .layer(middleware::from_fn(require_auth))
        .with_state(state);

    Router::new().merge(public).merge(protected)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use uuid::Uuid;

    use crown_db::Database;

    use crate::state::{AppState, AppStateInner};

    use super::api_router;

    fn test_state() -> AppState {
        let media_dir = std::env::temp_dir().join(format!("crown-media-{}", Uuid::new_v4()));
        Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            jwt_secret: crate::middleware::jwt_secret(),
            media_dir: PathBuf::from(media_dir),
        })
    }

    fn app() -> (Router, AppState) {
        let state = test_state();
        (api_router(state.clone()), state)
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        json_request("POST", uri, token, body)
    }

    fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    /// Register + login, returning the access token.
    async fn signup(app: &Router, email: &str, username: &str, role: &str) -> String {
        let (status, _) = send(
            app,
            post_json(
                "/auth/register/",
                None,
                json!({
                    "email": email,
                    "username": username,
                    "password": "correct-horse",
                    "password_confirm": "correct-horse",
                    "role": role,
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(
            app,
            post_json(
                "/auth/login/",
                None,
                json!({ "email": email, "password": "correct-horse" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["access"].as_str().unwrap().to_string()
    }

    async fn create_listing(app: &Router, token: &str, title: &str) -> String {
        let (status, body) = send(
            app,
            post_json(
                "/listings/",
                Some(token),
                json!({
                    "title": title,
                    "brand": "Omega",
                    "model": "Speedmaster",
                    "condition": "good",
                    "price": 4200.0,
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn register_login_me_roundtrip() {
        let (app, _) = app();
        let token = signup(&app, "amy@example.com", "amy", "buyer").await;

        let (status, body) = send(&app, get_request("/users/me/", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["username"], "amy");
        assert_eq!(body["role"], "buyer");
    }

    #[tokio::test]
    async fn register_rejects_admin_and_bad_passwords() {
        let (app, _) = app();

        let (status, body) = send(
            &app,
            post_json(
                "/auth/register/",
                None,
                json!({
                    "email": "a@example.com",
                    "username": "adminwannabe",
                    "password": "correct-horse",
                    "password_confirm": "correct-horse",
                    "role": "admin",
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_argument");

        let (status, _) = send(
            &app,
            post_json(
                "/auth/register/",
                None,
                json!({
                    "email": "a@example.com",
                    "username": "amy",
                    "password": "short",
                    "password_confirm": "short",
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn protected_routes_need_a_token() {
        let (app, _) = app();
        let (status, body) = send(&app, get_request("/users/me/", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthenticated");

        let (status, _) = send(&app, get_request("/users/me/", Some("garbage"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn refresh_token_is_not_an_access_token() {
        let (app, _) = app();
        signup(&app, "amy@example.com", "amy", "buyer").await;

        let (_, body) = send(
            &app,
            post_json(
                "/auth/login/",
                None,
                json!({ "email": "amy@example.com", "password": "correct-horse" }),
            ),
        )
        .await;
        let refresh = body["refresh"].as_str().unwrap().to_string();

        // refresh token rejected by the auth middleware
        let (status, _) = send(&app, get_request("/users/me/", Some(&refresh))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        // but accepted by the refresh endpoint
        let (status, body) = send(
            &app,
            post_json("/auth/refresh/", None, json!({ "refresh": refresh })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["access"].is_string());
    }

    #[tokio::test]
    async fn logout_revokes_the_refresh_token() {
        let (app, _) = app();
        signup(&app, "amy@example.com", "amy", "buyer").await;

        let (_, body) = send(
            &app,
            post_json(
                "/auth/login/",
                None,
                json!({ "email": "amy@example.com", "password": "correct-horse" }),
            ),
        )
        .await;
        let refresh = body["refresh"].as_str().unwrap().to_string();

        let (status, _) = send(
            &app,
            post_json("/auth/logout/", None, json!({ "refresh": refresh })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            &app,
            post_json("/auth/refresh/", None, json!({ "refresh": refresh })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn buyers_cannot_create_listings() {
        let (app, _) = app();
        let token = signup(&app, "amy@example.com", "amy", "buyer").await;

        let (status, body) = send(
            &app,
            post_json(
                "/listings/",
                Some(&token),
                json!({
                    "title": "Speedy",
                    "brand": "Omega",
                    "model": "Speedmaster",
                    "condition": "good",
                    "price": 4200.0,
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "permission_denied");
    }

    #[tokio::test]
    async fn listing_search_and_detail() {
        let (app, _) = app();
        let seller = signup(&app, "sam@example.com", "sam", "seller").await;
        let id = create_listing(&app, &seller, "Speedy Tuesday").await;

        // anonymous search sees it
        let (status, body) = send(&app, get_request("/listings/?brand=omega", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(body["results"][0]["title"], "Speedy Tuesday");
        assert_eq!(body["results"][0]["is_saved"], false);

        // detail bumps the view counter
        let uri = format!("/listings/{id}/");
        send(&app, get_request(&uri, None)).await;
        let (_, body) = send(&app, get_request(&uri, None)).await;
        assert_eq!(body["views_count"], 1);
    }

    #[tokio::test]
    async fn soft_deleted_listing_disappears_from_public_view() {
        let (app, _) = app();
        let seller = signup(&app, "sam@example.com", "sam", "seller").await;
        let id = create_listing(&app, &seller, "Speedy").await;
        let uri = format!("/listings/{id}/");

        let (status, _) = send(
            &app,
            Request::builder()
                .method("DELETE")
                .uri(&uri)
                .header(header::AUTHORIZATION, format!("Bearer {seller}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        // gone for the public, still visible to the owner
        let (status, _) = send(&app, get_request(&uri, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, body) = send(&app, get_request(&uri, Some(&seller))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "removed");

        let (_, body) = send(&app, get_request("/listings/", None)).await;
        assert_eq!(body["count"], 0);
    }

    #[tokio::test]
    async fn save_and_unsave_listing() {
        let (app, _) = app();
        let seller = signup(&app, "sam@example.com", "sam", "seller").await;
        let buyer = signup(&app, "amy@example.com", "amy", "buyer").await;
        let id = create_listing(&app, &seller, "Speedy").await;

        let save_uri = format!("/listings/{id}/save/");
        let (status, body) = send(&app, post_json(&save_uri, Some(&buyer), json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["saved"], true);

        let (_, body) = send(&app, get_request("/listings/saved/", Some(&buyer))).await;
        assert_eq!(body["count"], 1);

        // saved flag shows up in search when authenticated
        let (_, body) = send(&app, get_request("/listings/", Some(&buyer))).await;
        assert_eq!(body["results"][0]["is_saved"], true);

        let (status, _) = send(
            &app,
            Request::builder()
                .method("DELETE")
                .uri(&save_uri)
                .header(header::AUTHORIZATION, format!("Bearer {buyer}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = send(&app, get_request("/listings/saved/", Some(&buyer))).await;
        assert_eq!(body["count"], 0);
    }

    #[tokio::test]
    async fn conversation_flow_with_unread_accounting() {
        let (app, _) = app();
        let seller = signup(&app, "sam@example.com", "sam", "seller").await;
        let buyer = signup(&app, "amy@example.com", "amy", "buyer").await;
        let listing_id = create_listing(&app, &seller, "Speedy").await;

        // first message creates the conversation
        let (status, body) = send(
            &app,
            post_json(
                "/conversations/",
                Some(&buyer),
                json!({ "listing_id": listing_id, "message": "Is it available?" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let conversation_id = body["id"].as_str().unwrap().to_string();

        // second message lands on the same conversation
        let (status, body) = send(
            &app,
            post_json(
                "/conversations/",
                Some(&buyer),
                json!({ "listing_id": listing_id, "message": "Still there?" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], conversation_id.as_str());

        // seller has two unread, buyer zero
        let (_, body) = send(&app, get_request("/conversations/unread/", Some(&seller))).await;
        assert_eq!(body["unread"], 2);
        let (_, body) = send(&app, get_request("/conversations/unread/", Some(&buyer))).await;
        assert_eq!(body["unread"], 0);

        // seller's inbox shows the preview and per-user unread
        let (_, body) = send(&app, get_request("/conversations/", Some(&seller))).await;
        assert_eq!(body[0]["unread_count"], 2);
        assert_eq!(body[0]["last_message"]["content"], "Still there?");

        // opening the conversation marks everything received as read
        let detail_uri = format!("/conversations/{conversation_id}/");
        let (status, body) = send(&app, get_request(&detail_uri, Some(&seller))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["seller_unread"], 0);
        let (_, body) = send(&app, get_request("/conversations/unread/", Some(&seller))).await;
        assert_eq!(body["unread"], 0);

        // only the two participants may open the thread
        let outsider = signup(&app, "eve@example.com", "eve", "buyer").await;
        let (status, _) = send(&app, get_request(&detail_uri, Some(&outsider))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // seller replies; buyer now has one unread
        let (status, _) = send(
            &app,
            post_json(
                &format!("/conversations/{conversation_id}/messages/"),
                Some(&seller),
                json!({ "content": "Yes, still for sale." }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let (_, body) = send(&app, get_request("/conversations/unread/", Some(&buyer))).await;
        assert_eq!(body["unread"], 1);
    }

    #[tokio::test]
    async fn messaging_own_listing_is_rejected() {
        let (app, _) = app();
        let seller = signup(&app, "sam@example.com", "sam", "seller").await;
        let listing_id = create_listing(&app, &seller, "Speedy").await;

        let (status, _) = send(
            &app,
            post_json(
                "/conversations/",
                Some(&seller),
                json!({ "listing_id": listing_id, "message": "hello me" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn store_lifecycle_reviews_and_promotion() {
        let (app, _) = app();
        let owner = signup(&app, "olive@example.com", "olive", "store").await;
        let reviewer = signup(&app, "amy@example.com", "amy", "buyer").await;

        let (status, body) = send(
            &app,
            post_json(
                "/stores/",
                Some(&owner),
                json!({ "name": "Watch World", "city": "Geneva" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["slug"], "watch-world");

        // buyers cannot open stores
        let (status, _) = send(
            &app,
            post_json("/stores/", Some(&reviewer), json!({ "name": "Nope" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // review it once
        let (status, _) = send(
            &app,
            post_json(
                "/stores/watch-world/reviews/",
                Some(&reviewer),
                json!({ "rating": 4, "content": "Solid selection" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) = send(
            &app,
            post_json(
                "/stores/watch-world/reviews/",
                Some(&reviewer),
                json!({ "rating": 1 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = send(&app, get_request("/stores/watch-world/", None)).await;
        assert_eq!(body["average_rating"], 4.0);
        assert_eq!(body["review_count"], 1);

        // promotion flags the store featured
        let (status, body) = send(
            &app,
            post_json(
                "/stores/mine/promotion/",
                Some(&owner),
                json!({ "plan": "spotlight" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["is_active"], true);

        let (_, body) = send(&app, get_request("/stores/?featured=true", None)).await;
        assert_eq!(body["count"], 1);
    }

    #[tokio::test]
    async fn repair_shop_booking_flow() {
        let (app, _) = app();
        let owner = signup(&app, "rita@example.com", "rita", "repair").await;
        let customer = signup(&app, "amy@example.com", "amy", "buyer").await;

        let (status, body) = send(
            &app,
            post_json(
                "/repair-shops/",
                Some(&owner),
                json!({ "name": "Tick Tock Repairs" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["slug"], "tick-tock-repairs");

        let (status, body) = send(
            &app,
            post_json(
                "/repair-shops/mine/services/",
                Some(&owner),
                json!({ "name": "Full service", "price_from": 250.0, "duration_days": 14 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let service_id = body["id"].as_str().unwrap().to_string();

        // customer books the service
        let (status, body) = send(
            &app,
            post_json(
                "/repair-shops/tick-tock-repairs/appointments/",
                Some(&customer),
                json!({
                    "service_id": service_id,
                    "scheduled_at": "2030-05-01T10:00:00Z",
                    "notes": "Crown feels loose",
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "pending");
        let appointment_id = body["id"].as_str().unwrap().to_string();

        // owner confirms; customer cannot
        let uri = format!("/repair-shops/tick-tock-repairs/appointments/{appointment_id}/");
        let (status, _) = send(
            &app,
            json_request("PATCH", &uri, Some(&customer), json!({ "status": "confirmed" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, body) = send(
            &app,
            json_request("PATCH", &uri, Some(&owner), json!({ "status": "confirmed" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "confirmed");

        // customer may cancel their own booking
        let (status, body) = send(
            &app,
            json_request("PATCH", &uri, Some(&customer), json!({ "status": "cancelled" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "cancelled");

        // owner sees the booking; the customer's own list matches; outsiders see none
        let list_uri = "/repair-shops/tick-tock-repairs/appointments/";
        let (_, body) = send(&app, get_request(list_uri, Some(&owner))).await;
        assert_eq!(body["count"], 1);
        let (_, body) = send(&app, get_request(list_uri, Some(&customer))).await;
        assert_eq!(body["count"], 1);
        let outsider = signup(&app, "eve@example.com", "eve", "buyer").await;
        let (_, body) = send(&app, get_request(list_uri, Some(&outsider))).await;
        assert_eq!(body["count"], 0);
    }

    #[tokio::test]
    async fn image_rules_first_is_primary_and_capped() {
        let (app, state) = app();
        let seller = signup(&app, "sam@example.com", "sam", "seller").await;
        let id = create_listing(&app, &seller, "Speedy").await;
        let uri = format!("/listings/{id}/images/");

        let upload = |n: u8| {
            Request::builder()
                .method("POST")
                .uri(&uri)
                .header(header::AUTHORIZATION, format!("Bearer {seller}"))
                .header(header::CONTENT_TYPE, "application/octet-stream")
                .body(Body::from(vec![n; 64]))
                .unwrap()
        };

        let (status, body) = send(&app, upload(1)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["is_primary"], true);
        let (_, body) = send(&app, upload(2)).await;
        assert_eq!(body["is_primary"], false);

        for n in 3..=10 {
            let (status, _) = send(&app, upload(n)).await;
            assert_eq!(status, StatusCode::CREATED);
        }
        let (status, body) = send(&app, upload(11)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_argument");

        tokio::fs::remove_dir_all(&state.media_dir).await.ok();
    }
}
