mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{body_json, body_to_vec, data_uri, TestApp, ADMIN_TOKEN, PNG_BYTES};
use serde_json::json;

fn upload_body(mime: &str, bytes: &[u8]) -> serde_json::Value {
    json!({ "imageData": data_uri(mime, bytes), "fileName": "logo.png" })
}

#[tokio::test]
async fn uploads_require_the_admin_credential() -> Result<()> {
    let app = TestApp::new()?;

    let missing = app
        .post_json("/api/uploads", &upload_body("image/png", PNG_BYTES), None)
        .await?;
    assert_eq!(missing.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(missing).await?["error"], "Unauthorized access");

    let wrong = app
        .post_json(
            "/api/uploads",
            &upload_body("image/png", PNG_BYTES),
            Some("SuperAdmin nope"),
        )
        .await?;
    assert_eq!(wrong.status(), StatusCode::FORBIDDEN);

    let bearer = app
        .post_json(
            "/api/uploads",
            &upload_body("image/png", PNG_BYTES),
            Some(&format!("Bearer {ADMIN_TOKEN}")),
        )
        .await?;
    assert_eq!(bearer.status(), StatusCode::FORBIDDEN);

    assert!(!app.uploads_dir().exists());
    Ok(())
}

#[tokio::test]
async fn credential_is_checked_before_the_body() -> Result<()> {
    let app = TestApp::new()?;
    let response = app
        .post_json("/api/uploads", &json!({ "imageData": "garbage" }), None)
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn uploads_are_refused_when_no_token_is_configured() -> Result<()> {
    let app = TestApp::with_upload_token(None)?;
    let response = app
        .post_json(
            "/api/uploads",
            &upload_body("image/png", PNG_BYTES),
            Some("SuperAdmin anything"),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn accepted_upload_is_stored_listed_and_served() -> Result<()> {
    let app = TestApp::new()?;
    let (status, body) = app.upload("image/png", PNG_BYTES, "mon logo (final).png").await?;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["mimeType"], "image/png");
    assert_eq!(body["size"], PNG_BYTES.len());

    let name = body["name"].as_str().unwrap();
    assert!(name.ends_with("_mon_logo__final_.png"));
    assert!(name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')));
    let url = body["url"].as_str().unwrap();
    assert_eq!(url, format!("/uploads/{name}"));

    let listed = body_json(app.get("/api/uploads/list").await?).await?;
    let images = listed["images"].as_array().unwrap();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0]["url"], url);
    assert_eq!(images[0]["size"], PNG_BYTES.len());

    let served = app.get(url).await?;
    assert_eq!(served.status(), StatusCode::OK);
    assert_eq!(body_to_vec(served.into_body()).await?, PNG_BYTES);
    Ok(())
}

#[tokio::test]
async fn identical_names_never_collide() -> Result<()> {
    let app = TestApp::new()?;
    let (first_status, first) = app.upload("image/png", PNG_BYTES, "logo.png").await?;
    let (second_status, second) = app.upload("image/png", b"other bytes", "logo.png").await?;
    assert_eq!((first_status, second_status), (200, 200));
    assert_ne!(first["url"], second["url"]);

    let stored = std::fs::read_dir(app.uploads_dir())?.count();
    assert_eq!(stored, 2);
    Ok(())
}

#[tokio::test]
async fn oversized_payload_is_rejected_before_any_quote_exists() -> Result<()> {
    let app = TestApp::new()?;
    let six_mib = vec![0u8; 6 * 1024 * 1024];

    let (status, body) = app.upload("image/png", &six_mib, "huge.png").await?;
    assert_eq!(status, 400);
    assert_eq!(body["details"]["reason"], "PayloadTooLarge");

    let (status, body) = app.upload("text/plain", &six_mib, "huge.txt").await?;
    assert_eq!(status, 400);
    assert_eq!(body["details"]["reason"], "PayloadTooLarge");

    let quotes = body_json(app.get("/api/quotes").await?).await?;
    assert!(quotes["quotes"].as_array().unwrap().is_empty());
    assert!(!app.uploads_dir().exists() || std::fs::read_dir(app.uploads_dir())?.count() == 0);
    Ok(())
}

#[tokio::test]
async fn malformed_or_unsupported_payloads_are_rejected() -> Result<()> {
    let app = TestApp::new()?;
    let auth = format!("SuperAdmin {ADMIN_TOKEN}");

    let response = app
        .post_json(
            "/api/uploads",
            &json!({ "imageData": "iVBORw0KGgo=", "fileName": "x.png" }),
            Some(&auth),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await?["details"]["reason"], "InvalidFormat");

    let (status, body) = app.upload("text/html", b"<p>hi</p>", "x.html").await?;
    assert_eq!(status, 400);
    assert_eq!(body["details"]["reason"], "UnsupportedType");

    let response = app
        .post_json("/api/uploads", &json!({ "fileName": "x.png" }), Some(&auth))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}
