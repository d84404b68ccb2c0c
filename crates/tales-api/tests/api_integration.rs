//! API integration tests.
//!
//! Tests the complete request flow: HTTP → routes → store → SQLite (in memory).

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use tales_api::mailer::{MailKind, MemoryMailer};
use tales_api::rate_limit::RateLimitConfig;
use tales_api::server::ServerBuilder;

const TEST_JWT_SECRET: &str = "integration-test-secret-at-least-32-bytes";
const PASSWORD: &str = "correct horse battery";

struct TestApp {
    router: axum::Router,
    mailer: Arc<MemoryMailer>,
}

fn test_app() -> Result<TestApp> {
    test_app_with_rate_limit(RateLimitConfig {
        enabled: false,
        ..RateLimitConfig::default()
    })
}

fn test_app_with_rate_limit(rate_limit: RateLimitConfig) -> Result<TestApp> {
    let mailer = Arc::new(MemoryMailer::new());
    let router = ServerBuilder::new()
        .jwt_hs256_secret(TEST_JWT_SECRET)
        .rate_limit(rate_limit)
        .mailer(mailer.clone())
        .build()?
        .test_router()?;
    Ok(TestApp { router, mailer })
}

/// A verified, logged-in account.
struct Account {
    id: i64,
    email: String,
    token: String,
}

mod helpers {
    use super::*;

    pub fn make_request(
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<Request<Body>> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }

        let body = match body {
            Some(v) => Body::from(serde_json::to_vec(&v).context("serialize request body")?),
            None => Body::empty(),
        };

        builder.body(body).context("build request")
    }

    pub async fn send(
        app: &TestApp,
        request: Request<Body>,
    ) -> Result<axum::response::Response> {
        let response = app
            .router
            .clone()
            .oneshot(request)
            .await
            .map_err(|err| match err {})?;
        Ok(response)
    }

    pub async fn call(
        app: &TestApp,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value)> {
        let request = make_request(method, uri, token, body)?;
        let response = send(app, request).await?;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 256 * 1024)
            .await
            .context("read response body")?;
        if bytes.is_empty() {
            return Ok((status, Value::Null));
        }
        let json = serde_json::from_slice(&bytes).with_context(|| {
            format!(
                "parse JSON response (status={status}): {}",
                String::from_utf8_lossy(&bytes)
            )
        })?;
        Ok((status, json))
    }

    pub async fn get(app: &TestApp, uri: &str, token: Option<&str>) -> Result<(StatusCode, Value)> {
        call(app, Method::GET, uri, token, None).await
    }

    pub async fn post(
        app: &TestApp,
        uri: &str,
        token: Option<&str>,
        body: Value,
    ) -> Result<(StatusCode, Value)> {
        call(app, Method::POST, uri, token, Some(body)).await
    }

    pub async fn patch(
        app: &TestApp,
        uri: &str,
        token: Option<&str>,
        body: Value,
    ) -> Result<(StatusCode, Value)> {
        call(app, Method::PATCH, uri, token, Some(body)).await
    }

    pub async fn delete(app: &TestApp, uri: &str, token: Option<&str>) -> Result<(StatusCode, Value)> {
        call(app, Method::DELETE, uri, token, None).await
    }

    pub fn id_of(value: &Value) -> Result<i64> {
        value["id"].as_i64().context("missing id")
    }

    /// Registers, verifies, and logs in an account.
    pub async fn signup(app: &TestApp, name: &str, email: &str, role: &str) -> Result<Account> {
        let (status, body) = post(
            app,
            "/api/users/register",
            None,
            json!({ "fullName": name, "email": email, "password": PASSWORD, "role": role }),
        )
        .await?;
        assert_eq!(status, StatusCode::CREATED, "register {email}: {body}");
        let id = body["userId"].as_i64().context("missing userId")?;

        let otp = app.mailer.latest_otp(email).context("no OTP mailed")?;
        let (status, body) = post(
            app,
            "/api/users/verify-otp",
            None,
            json!({ "email": email, "otp": otp }),
        )
        .await?;
        assert_eq!(status, StatusCode::OK, "verify {email}: {body}");

        let (status, body) = post(
            app,
            "/api/users/login",
            None,
            json!({ "email": email, "password": PASSWORD }),
        )
        .await?;
        assert_eq!(status, StatusCode::OK, "login {email}: {body}");
        let token = body["token"].as_str().context("missing token")?.to_string();

        Ok(Account {
            id,
            email: email.to_string(),
            token,
        })
    }

    pub async fn create_manuscript(app: &TestApp, author: &Account, title: &str) -> Result<i64> {
        let (status, body) = post(
            app,
            "/api/manuscripts",
            Some(&author.token),
            json!({ "title": title, "genre": "Mystery", "tags": ["night"], "priceCents": 499 }),
        )
        .await?;
        assert_eq!(status, StatusCode::CREATED, "create manuscript: {body}");
        id_of(&body["manuscript"])
    }

    pub async fn create_chapter(
        app: &TestApp,
        author: &Account,
        manuscript_id: i64,
        title: &str,
        order: i64,
    ) -> Result<i64> {
        let (status, body) = post(
            app,
            "/api/chapters",
            Some(&author.token),
            json!({ "manuscriptId": manuscript_id, "title": title, "content": "...", "order": order }),
        )
        .await?;
        assert_eq!(status, StatusCode::CREATED, "create chapter: {body}");
        id_of(&body["chapter"])
    }

    pub async fn notifications(app: &TestApp, account: &Account, query: &str) -> Result<Value> {
        let (status, body) = get(
            app,
            &format!("/api/notifications{query}"),
            Some(&account.token),
        )
        .await?;
        assert_eq!(status, StatusCode::OK, "notifications: {body}");
        Ok(body)
    }

    pub fn types_of(inbox: &Value) -> Vec<String> {
        inbox["notifications"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|n| n["type"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

use helpers::*;

// ============================================================================
// Accounts
// ============================================================================

#[tokio::test]
async fn test_register_verify_login_profile() -> Result<()> {
    let app = test_app()?;

    let (status, body) = post(
        &app,
        "/api/users/register",
        None,
        json!({ "fullName": "Ada Lovelace", "email": "ada@example.com", "password": PASSWORD }),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        body["message"],
        "User registered successfully. Please verify your OTP."
    );

    // Unverified accounts cannot log in.
    let (status, _) = post(
        &app,
        "/api/users/login",
        None,
        json!({ "email": "ada@example.com", "password": PASSWORD }),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let otp = app
        .mailer
        .latest_otp("ada@example.com")
        .context("OTP mailed")?;
    assert_eq!(otp.len(), 5);

    let wrong = if otp == "00000" { "11111" } else { "00000" };
    let (status, body) = post(
        &app,
        "/api/users/verify-otp",
        None,
        json!({ "email": "ada@example.com", "otp": wrong }),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid OTP.");

    let (status, _) = post(
        &app,
        "/api/users/verify-otp",
        None,
        json!({ "email": "ada@example.com", "otp": otp }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post(
        &app,
        "/api/users/verify-otp",
        None,
        json!({ "email": "ada@example.com", "otp": otp }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "User is already verified.");

    let (status, body) = post(
        &app,
        "/api/users/login",
        None,
        json!({ "email": "ada@example.com", "password": "not the password" }),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid email or password");

    // Email lookup ignores case.
    let (status, body) = post(
        &app,
        "/api/users/login",
        None,
        json!({ "email": "ADA@example.com", "password": PASSWORD }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["role"], "READER");
    let token = body["token"].as_str().context("token")?.to_string();

    let (status, body) = get(&app, "/api/users/myProfile", Some(&token)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "ada@example.com");
    assert!(body["user"].get("password").is_none());
    assert!(body["user"].get("otpCode").is_none());

    let (status, _) = get(&app, "/api/users/myProfile", None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = get(&app, "/api/users/myProfile", Some("not-a-jwt")).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn test_register_rejects_duplicates_and_bad_roles() -> Result<()> {
    let app = test_app()?;
    signup(&app, "Grace", "grace@example.com", "WRITER").await?;

    let (status, body) = post(
        &app,
        "/api/users/register",
        None,
        json!({ "fullName": "Grace", "email": "Grace@Example.com", "password": PASSWORD }),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Email already in use");

    let (status, _) = post(
        &app,
        "/api/users/register",
        None,
        json!({ "fullName": "Mallory", "email": "m@example.com", "password": PASSWORD, "role": "EDITOR" }),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = post(
        &app,
        "/api/users/register",
        None,
        json!({ "email": "x@example.com", "password": PASSWORD }),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Full Name, email, and password are required.");
    Ok(())
}

#[tokio::test]
async fn test_password_reset_flow() -> Result<()> {
    let app = test_app()?;
    let account = signup(&app, "Linus", "linus@example.com", "READER").await?;

    let (status, _) = post(
        &app,
        "/api/users/forgot-password",
        None,
        json!({ "email": "nobody@example.com" }),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = post(
        &app,
        "/api/users/forgot-password",
        None,
        json!({ "email": account.email }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let otp = app
        .mailer
        .latest_otp(&account.email)
        .context("reset OTP mailed")?;

    let (status, _) = post(
        &app,
        "/api/users/verify-reset-otp",
        None,
        json!({ "email": account.email, "otp": otp }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = post(
        &app,
        "/api/users/reset-password",
        None,
        json!({ "email": account.email, "otp": otp, "newPassword": "brand new secret" }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    // The code is single-use.
    let (status, _) = post(
        &app,
        "/api/users/reset-password",
        None,
        json!({ "email": account.email, "otp": otp, "newPassword": "another one" }),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post(
        &app,
        "/api/users/login",
        None,
        json!({ "email": account.email, "password": PASSWORD }),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = post(
        &app,
        "/api/users/login",
        None,
        json!({ "email": account.email, "password": "brand new secret" }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_profile_update_password_change_and_delete() -> Result<()> {
    let app = test_app()?;
    let account = signup(&app, "Barbara", "barbara@example.com", "WRITER").await?;

    let (status, body) = patch(
        &app,
        "/api/users/updateMe",
        Some(&account.token),
        json!({ "fullName": "Barbara Liskov", "bio": "Substitutable." }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["fullName"], "Barbara Liskov");
    assert_eq!(body["user"]["bio"], "Substitutable.");

    let (status, _) = post(
        &app,
        "/api/users/update-password",
        Some(&account.token),
        json!({ "currentPassword": "wrong", "newPassword": "next secret" }),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = post(
        &app,
        "/api/users/update-password",
        Some(&account.token),
        json!({ "currentPassword": PASSWORD, "newPassword": "next secret" }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get(&app, "/api/users/allUsers", Some(&account.token)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["users"].as_array().map(Vec::len), Some(1));

    let (status, _) = delete(&app, "/api/users/deleteMe", Some(&account.token)).await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = get(&app, "/api/users/myProfile", Some(&account.token)).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

// ============================================================================
// Manuscripts
// ============================================================================

#[tokio::test]
async fn test_manuscript_permissions() -> Result<()> {
    let app = test_app()?;
    let author = signup(&app, "Agatha", "agatha@example.com", "WRITER").await?;
    let stranger = signup(&app, "Eve", "eve@example.com", "READER").await?;
    let manuscript_id = create_manuscript(&app, &author, "Night Train").await?;
    let uri = format!("/api/manuscripts/{manuscript_id}");

    let (status, _) = patch(&app, &uri, Some(&stranger.token), json!({ "title": "Mine" })).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = delete(&app, &uri, Some(&stranger.token)).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = post(
        &app,
        "/api/chapters",
        Some(&stranger.token),
        json!({ "manuscriptId": manuscript_id, "title": "Intrusion" }),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = get(&app, "/api/manuscripts/999999", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = post(
        &app,
        "/api/manuscripts",
        Some(&author.token),
        json!({ "title": "Free?", "priceCents": -1 }),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post(&app, "/api/manuscripts", None, json!({ "title": "Anon" })).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = delete(&app, &uri, Some(&author.token)).await?;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = get(&app, &uri, None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn test_publish_catalogue_reads_and_stats() -> Result<()> {
    let app = test_app()?;
    let author = signup(&app, "Agatha", "agatha@example.com", "WRITER").await?;
    let draft_id = create_manuscript(&app, &author, "Unfinished").await?;
    let manuscript_id = create_manuscript(&app, &author, "Night Train").await?;
    let second = create_chapter(&app, &author, manuscript_id, "Arrival", 2).await?;
    let first = create_chapter(&app, &author, manuscript_id, "Departure", 1).await?;

    let (_, body) = get(&app, "/api/manuscripts", None).await?;
    assert_eq!(body["manuscripts"].as_array().map(Vec::len), Some(0));

    let (status, body) = patch(
        &app,
        &format!("/api/manuscripts/{manuscript_id}"),
        Some(&author.token),
        json!({ "status": "PUBLISHED" }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["manuscript"]["status"], "PUBLISHED");

    let (_, body) = get(&app, "/api/manuscripts", None).await?;
    let listed = body["manuscripts"].as_array().context("manuscripts")?;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["id"], manuscript_id);
    assert_eq!(listed[0]["author"]["fullName"], "Agatha");
    assert!(listed[0]["author"].get("email").is_none());
    let chapter_ids: Vec<i64> = listed[0]["chapters"]
        .as_array()
        .context("chapters")?
        .iter()
        .filter_map(|c| c["id"].as_i64())
        .collect();
    assert_eq!(chapter_ids, vec![first, second]);

    let (_, body) = get(&app, &format!("/api/manuscripts/{manuscript_id}"), None).await?;
    assert_eq!(body["manuscript"]["reads"], 1);
    let (_, body) = get(&app, &format!("/api/manuscripts/{draft_id}"), None).await?;
    assert_eq!(body["manuscript"]["reads"], 0);

    let (status, body) = get(&app, "/api/manuscripts/stats", Some(&author.token)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stats"]["totalManuscripts"], 2);
    assert_eq!(body["stats"]["publishedBooks"], 1);
    assert_eq!(body["stats"]["totalReads"], 1);
    assert_eq!(body["stats"]["totalEarnings"], 998);

    let (_, body) = get(&app, "/api/manuscripts/my-manuscripts", Some(&author.token)).await?;
    assert_eq!(body["manuscripts"].as_array().map(Vec::len), Some(2));

    let inbox = notifications(&app, &author, "?type=SYSTEM").await?;
    let titles: Vec<&str> = inbox["notifications"]
        .as_array()
        .context("notifications")?
        .iter()
        .filter_map(|n| n["title"].as_str())
        .collect();
    assert!(titles.contains(&"Manuscript Published"));
    assert_eq!(titles.iter().filter(|t| **t == "Manuscript Created").count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_chapters_order_and_editor_access() -> Result<()> {
    let app = test_app()?;
    let author = signup(&app, "Agatha", "agatha@example.com", "WRITER").await?;
    let editor = signup(&app, "Max", "max@example.com", "READER").await?;
    let manuscript_id = create_manuscript(&app, &author, "Night Train").await?;

    let (status, body) = post(
        &app,
        "/api/manuscripts/invite",
        Some(&author.token),
        json!({ "manuscriptId": manuscript_id, "email": editor.email, "role": "EDITOR" }),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "invite: {body}");
    let collaboration_id = id_of(&body["collaboration"])?;

    // Pending editors cannot write yet.
    let (status, _) = post(
        &app,
        "/api/chapters",
        Some(&editor.token),
        json!({ "manuscriptId": manuscript_id, "title": "Too Early" }),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = post(
        &app,
        "/api/manuscripts/respond",
        Some(&editor.token),
        json!({ "collaborationId": collaboration_id, "status": "ACCEPTED" }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let inbox = notifications(&app, &author, "?type=COLLABORATION").await?;
    let items = inbox["notifications"].as_array().context("notifications")?;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["title"], "Invitation Accepted");
    assert_eq!(
        items[0]["message"],
        "Max (max@example.com) has accepted your invitation to collaborate on \"Night Train\" as an editor."
    );
    assert_eq!(items[0]["data"]["status"], "ACCEPTED");

    let chapter_id = create_chapter(&app, &editor, manuscript_id, "Editor's Cut", 5).await?;
    let (status, body) = patch(
        &app,
        &format!("/api/chapters/{chapter_id}"),
        Some(&editor.token),
        json!({ "title": "   ", "order": 0 }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chapter"]["title"], "Editor's Cut");
    assert_eq!(body["chapter"]["order"], 0);

    // Only the author deletes chapters.
    let (status, _) = delete(&app, &format!("/api/chapters/{chapter_id}"), Some(&editor.token)).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = delete(&app, &format!("/api/chapters/{chapter_id}"), Some(&author.token)).await?;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get(
        &app,
        &format!("/api/chapters/manuscript/{manuscript_id}"),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chapters"].as_array().map(Vec::len), Some(0));

    let (status, _) = get(&app, "/api/chapters/manuscript/424242", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

// ============================================================================
// Collaboration
// ============================================================================

#[tokio::test]
async fn test_invite_and_respond_notify_both_sides() -> Result<()> {
    let app = test_app()?;
    let author = signup(&app, "Agatha", "agatha@example.com", "WRITER").await?;
    let invitee = signup(&app, "Max", "max@example.com", "READER").await?;
    let outsider = signup(&app, "Eve", "eve@example.com", "READER").await?;
    let manuscript_id = create_manuscript(&app, &author, "Night Train").await?;

    let (status, body) = post(
        &app,
        "/api/manuscripts/invite",
        Some(&author.token),
        json!({ "manuscriptId": manuscript_id, "email": author.email }),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "You cannot invite yourself");

    let (status, _) = post(
        &app,
        "/api/manuscripts/invite",
        Some(&outsider.token),
        json!({ "manuscriptId": manuscript_id, "email": invitee.email }),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = post(
        &app,
        "/api/manuscripts/invite",
        Some(&author.token),
        json!({ "manuscriptId": manuscript_id, "email": "MAX@example.com" }),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["collaboration"]["status"], "PENDING");
    assert_eq!(body["collaboration"]["role"], "VIEWER");
    let collaboration_id = id_of(&body["collaboration"])?;

    let (status, _) = post(
        &app,
        "/api/manuscripts/invite",
        Some(&author.token),
        json!({ "manuscriptId": manuscript_id, "email": invitee.email }),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(
        app.mailer
            .sent()
            .iter()
            .any(|mail| mail.kind == MailKind::Invitation && mail.to.eq_ignore_ascii_case(&invitee.email))
    );

    let inbox = notifications(&app, &invitee, "").await?;
    assert_eq!(types_of(&inbox), vec!["COLLABORATION".to_string()]);
    assert_eq!(inbox["unreadCount"], 1);

    let (status, _) = post(
        &app,
        "/api/manuscripts/respond",
        Some(&outsider.token),
        json!({ "collaborationId": collaboration_id, "status": "ACCEPTED" }),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = post(
        &app,
        "/api/manuscripts/respond",
        Some(&invitee.token),
        json!({ "collaborationId": collaboration_id, "status": "PENDING" }),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = post(
        &app,
        "/api/manuscripts/respond",
        Some(&invitee.token),
        json!({ "collaborationId": collaboration_id, "status": "DECLINED" }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Invitation declined");

    let (status, body) = post(
        &app,
        "/api/manuscripts/respond",
        Some(&invitee.token),
        json!({ "collaborationId": collaboration_id, "status": "ACCEPTED" }),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invitation has already been processed");

    let inbox = notifications(&app, &author, "?type=COLLABORATION").await?;
    let items = inbox["notifications"].as_array().context("notifications")?;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["title"], "Invitation Declined");
    assert_eq!(
        items[0]["message"],
        "Max has declined your invitation to collaborate on \"Night Train\"."
    );

    // Declined collaborators do not count toward the invitee's dashboard.
    let (_, body) = get(&app, "/api/manuscripts/stats", Some(&invitee.token)).await?;
    assert_eq!(body["stats"]["totalManuscripts"], 0);

    let (_, body) = get(&app, &format!("/api/manuscripts/{manuscript_id}"), None).await?;
    let collaborations = body["manuscript"]["collaborations"]
        .as_array()
        .context("collaborations")?;
    assert_eq!(collaborations.len(), 1);
    assert_eq!(collaborations[0]["user"]["fullName"], "Max");
    Ok(())
}

// ============================================================================
// Feedback and notifications
// ============================================================================

#[tokio::test]
async fn test_comments_and_reviews_notify_author() -> Result<()> {
    let app = test_app()?;
    let author = signup(&app, "Agatha", "agatha@example.com", "WRITER").await?;
    let reader = signup(&app, "Rita", "rita@example.com", "READER").await?;
    let manuscript_id = create_manuscript(&app, &author, "Night Train").await?;
    let chapter_id = create_chapter(&app, &author, manuscript_id, "Departure", 1).await?;

    let (status, body) = post(
        &app,
        "/api/comments/comment",
        Some(&reader.token),
        json!({ "chapterId": chapter_id, "content": "The opening scene is wonderfully tense and strange." }),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    let comment_id = id_of(&body["comment"])?;

    // The author's own feedback does not notify them.
    let (status, _) = post(
        &app,
        "/api/comments/comment",
        Some(&author.token),
        json!({ "chapterId": chapter_id, "content": "Thanks!" }),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);

    for rating in [0, 6] {
        let (status, _) = post(
            &app,
            "/api/comments/review",
            Some(&reader.token),
            json!({ "chapterId": chapter_id, "rating": rating }),
        )
        .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
    let (status, _) = post(
        &app,
        "/api/comments/review",
        Some(&reader.token),
        json!({ "chapterId": chapter_id, "rating": 4, "content": "Gripping." }),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = get(&app, &format!("/api/comments/comment/chapter/{chapter_id}"), None).await?;
    let comments = body["comments"].as_array().context("comments")?;
    assert_eq!(comments.len(), 2);
    assert_eq!(comments[0]["author"]["fullName"], "Rita");

    let (_, body) = get(&app, &format!("/api/comments/review/chapter/{chapter_id}"), None).await?;
    assert_eq!(body["reviews"][0]["rating"], 4);

    let inbox = notifications(&app, &author, "?type=COMMENT").await?;
    let items = inbox["notifications"].as_array().context("notifications")?;
    assert_eq!(items.len(), 1);
    let message = items[0]["message"].as_str().context("message")?;
    assert!(message.starts_with("Rita commented on Chapter \"Departure\": \""));
    assert!(message.ends_with("...\""));

    let inbox = notifications(&app, &author, "?type=REVIEW").await?;
    assert_eq!(inbox["notifications"].as_array().map(Vec::len), Some(1));

    let (status, _) = delete(
        &app,
        &format!("/api/comments/comment/{comment_id}"),
        Some(&author.token),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = delete(
        &app,
        &format!("/api/comments/comment/{comment_id}"),
        Some(&reader.token),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = post(
        &app,
        "/api/comments/comment",
        Some(&reader.token),
        json!({ "chapterId": 987654, "content": "Hello?" }),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn test_notification_inbox_filters_and_ownership() -> Result<()> {
    let app = test_app()?;
    let author = signup(&app, "Agatha", "agatha@example.com", "WRITER").await?;
    let other = signup(&app, "Eve", "eve@example.com", "READER").await?;
    create_manuscript(&app, &author, "One").await?;
    create_manuscript(&app, &author, "Two").await?;

    let inbox = notifications(&app, &author, "").await?;
    assert_eq!(inbox["unreadCount"], 2);
    let first_id = id_of(&inbox["notifications"][0])?;

    // Someone else's notification reads as missing.
    let (status, _) = patch(
        &app,
        &format!("/api/notifications/{first_id}/read"),
        Some(&other.token),
        json!({}),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = delete(&app, &format!("/api/notifications/{first_id}"), Some(&other.token)).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = patch(
        &app,
        &format!("/api/notifications/{first_id}/read"),
        Some(&author.token),
        json!({}),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["notification"]["isRead"], true);

    let read = notifications(&app, &author, "?isRead=true").await?;
    assert_eq!(read["notifications"].as_array().map(Vec::len), Some(1));
    assert_eq!(read["unreadCount"], 1);
    let unread = notifications(&app, &author, "?isRead=false").await?;
    assert_eq!(unread["notifications"].as_array().map(Vec::len), Some(1));

    let (status, _) = get(&app, "/api/notifications?type=BOGUS", Some(&author.token)).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = patch(
        &app,
        "/api/notifications/mark-all-read",
        Some(&author.token),
        json!({}),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let inbox = notifications(&app, &author, "").await?;
    assert_eq!(inbox["unreadCount"], 0);

    let (status, _) = delete(&app, &format!("/api/notifications/{first_id}"), Some(&author.token)).await?;
    assert_eq!(status, StatusCode::OK);
    let inbox = notifications(&app, &author, "").await?;
    assert_eq!(inbox["notifications"].as_array().map(Vec::len), Some(1));
    Ok(())
}

// ============================================================================
// Transport concerns
// ============================================================================

#[tokio::test]
async fn test_double_slash_paths_are_normalized() -> Result<()> {
    let app = test_app()?;
    let author = signup(&app, "Agatha", "agatha@example.com", "WRITER").await?;

    let (status, body) = get(&app, "//api//users///myProfile", Some(&author.token)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["id"], author.id);

    let (status, _) = get(&app, "/api//notifications?type=SYSTEM", Some(&author.token)).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_request_id_is_echoed_on_errors() -> Result<()> {
    let app = test_app()?;

    let request = Request::builder()
        .uri("/api/users/myProfile")
        .header("x-request-id", "trace-me")
        .body(Body::empty())
        .context("build request")?;
    let response = send(&app, request).await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok()),
        Some("trace-me")
    );
    let body = axum::body::to_bytes(response.into_body(), 4096)
        .await
        .context("read response body")?;
    let json: Value = serde_json::from_slice(&body).context("parse JSON body")?;
    assert_eq!(json["requestId"], "trace-me");
    Ok(())
}

fn credential_limits(trust_forwarded_for: bool) -> RateLimitConfig {
    RateLimitConfig {
        enabled: true,
        default_requests_per_minute: 600,
        auth_requests_per_minute: 1,
        burst_size: 3,
        trust_forwarded_for,
    }
}

fn login_from(forwarded_for: &str) -> Result<Request<Body>> {
    let mut request = make_request(
        Method::POST,
        "/api/users/login",
        None,
        Some(json!({ "email": "nobody@example.com", "password": "guess" })),
    )?;
    request.headers_mut().insert(
        "x-forwarded-for",
        forwarded_for.parse().context("header value")?,
    );
    Ok(request)
}

#[tokio::test]
async fn test_credential_routes_are_rate_limited() -> Result<()> {
    let app = test_app_with_rate_limit(credential_limits(false))?;

    let attempt = json!({ "email": "nobody@example.com", "password": "guess" });
    let (status, _) = post(&app, "/api/users/login", None, attempt.clone()).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = make_request(Method::POST, "/api/users/login", None, Some(attempt))?;
    let response = send(&app, request).await?;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));

    // The default tier has its own quota.
    let (status, _) = get(&app, "/api/manuscripts", None).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_rotating_forwarded_for_does_not_reset_credential_quota() -> Result<()> {
    let app = test_app_with_rate_limit(credential_limits(false))?;

    let mut limited = 0;
    for i in 0..50 {
        let response = send(&app, login_from(&format!("10.0.0.{i}"))?).await?;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            limited += 1;
        }
    }
    assert_eq!(limited, 49);
    Ok(())
}

#[tokio::test]
async fn test_forwarded_for_keys_clients_behind_trusted_proxy() -> Result<()> {
    let app = test_app_with_rate_limit(credential_limits(true))?;

    let response = send(&app, login_from("198.51.100.1")?).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let response = send(&app, login_from("198.51.100.1, 10.0.0.1")?).await?;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let response = send(&app, login_from("198.51.100.2")?).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn test_openapi_document_is_served() -> Result<()> {
    let app = test_app()?;
    let (status, body) = get(&app, "/openapi.json", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["info"]["title"], "YourTales API");
    assert!(body["paths"].get("/api/manuscripts/invite").is_some());
    Ok(())
}
