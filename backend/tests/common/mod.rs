use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use axum::Router;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use http_body_util::BodyExt;
use quoteflow::config::{AppConfig, PaymentConfig, SmtpConfig, DEFAULT_MAX_BODY_BYTES};
use quoteflow::documents::{PdfEngine, RenderError};
use quoteflow::notifications::{Mailer, MessageId, NotifyError, OutgoingEmail};
use quoteflow::payments::SimulatedGateway;
use quoteflow::routes;
use quoteflow::state::{AppState, Collaborators};
use quoteflow::storage::LocalDiskStorage;
use quoteflow::submissions::MemorySubmissionStore;
use serde::Serialize;
use serde_json::Value;
use tempfile::TempDir;
use tower::util::ServiceExt;

#[allow(dead_code)]
pub const ADMIN_TOKEN: &str = "test-admin-token";
#[allow(dead_code)]
pub const ADMIN_EMAIL: &str = "admin@example.com";

/// 1x1 transparent PNG.
#[allow(dead_code)]
pub const PNG_BYTES: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f,
    0x15, 0xc4, 0x89, 0x00, 0x00, 0x00, 0x0a, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0d, 0x0a, 0x2d, 0xb4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

#[allow(dead_code)]
pub fn data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

#[derive(Default)]
pub struct FakeMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
    failing: AtomicBool,
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<MessageId, NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Transport("connection refused".into()));
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(email);
        Ok(MessageId(format!("<{}@test.local>", sent.len())))
    }
}

impl FakeMailer {
    #[allow(dead_code)]
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    #[allow(dead_code)]
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }
}

/// Writes a tiny PDF instead of starting a browser.
#[derive(Default)]
pub struct FakeEngine {
    failing: AtomicBool,
    calls: AtomicUsize,
    last_html: Mutex<Option<String>>,
}

#[async_trait]
impl PdfEngine for FakeEngine {
    async fn render_pdf(&self, html: &str, output: &Path) -> Result<(), RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_html.lock().unwrap() = Some(html.to_string());
        if self.failing.load(Ordering::SeqCst) {
            return Err(RenderError::Browser {
                status: "exit status: 1".into(),
                stderr: "crashed".into(),
            });
        }
        tokio::fs::write(output, b"%PDF-1.4\n%%EOF\n").await?;
        Ok(())
    }
}

impl FakeEngine {
    #[allow(dead_code)]
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    #[allow(dead_code)]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    #[allow(dead_code)]
    pub fn last_html(&self) -> Option<String> {
        self.last_html.lock().unwrap().clone()
    }
}

pub struct TestApp {
    #[allow(dead_code)]
    pub state: AppState,
    router: Router,
    #[allow(dead_code)]
    pub store: Arc<MemorySubmissionStore>,
    #[allow(dead_code)]
    pub mailer: Arc<FakeMailer>,
    #[allow(dead_code)]
    pub engine: Arc<FakeEngine>,
    public_dir: TempDir,
}

impl TestApp {
    pub fn new() -> Result<Self> {
        Self::with_upload_token(Some(ADMIN_TOKEN))
    }

    pub fn with_upload_token(token: Option<&str>) -> Result<Self> {
        let public_dir = tempfile::tempdir()?;
        let config = AppConfig {
            database_url: "postgres://unused@localhost/unused".to_string(),
            database_max_pool_size: 1,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            cors_allowed_origin: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            uploads_dir: public_dir.path().join("uploads"),
            generated_dir: public_dir.path().join("generated"),
            upload_admin_token: token.map(str::to_string),
            admin_email: ADMIN_EMAIL.to_string(),
            smtp: SmtpConfig {
                host: "localhost".to_string(),
                port: 1025,
                from: "no-reply@test.local".to_string(),
                username: None,
                password: None,
                starttls: false,
                timeout: Duration::from_secs(1),
            },
            chromium_bin: "chromium".to_string(),
            render_timeout: Duration::from_secs(5),
            payment: PaymentConfig {
                settlement_delay: Duration::from_millis(20),
                iban: "FR76 0000 0000 0000".to_string(),
                bic: "TESTFRPP".to_string(),
                beneficiary: "Test Studio".to_string(),
            },
        };

        let store = Arc::new(MemorySubmissionStore::new());
        let mailer = Arc::new(FakeMailer::default());
        let engine = Arc::new(FakeEngine::default());
        let settlement_delay = config.payment.settlement_delay;
        let collaborators = Collaborators {
            submissions: store.clone(),
            uploads: Arc::new(LocalDiskStorage::new(config.uploads_dir.clone())),
            mailer: mailer.clone(),
            pdf_engine: engine.clone(),
            settlement: Arc::new(SimulatedGateway::new(settlement_delay)),
        };

        let state = AppState::new(config, collaborators);
        let router = routes::create_router(state.clone());

        Ok(Self {
            state,
            router,
            store,
            mailer,
            engine,
            public_dir,
        })
    }

    #[allow(dead_code)]
    pub fn uploads_dir(&self) -> PathBuf {
        self.public_dir.path().join("uploads")
    }

    #[allow(dead_code)]
    pub fn generated_dir(&self) -> PathBuf {
        self.public_dir.path().join("generated")
    }

    pub async fn send(&self, request: Request<Body>) -> Result<hyper::Response<Body>> {
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    #[allow(dead_code)]
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        authorization: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.json_request(Method::POST, path, payload, authorization)
            .await
    }

    #[allow(dead_code)]
    pub async fn patch_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
    ) -> Result<hyper::Response<Body>> {
        self.json_request(Method::PATCH, path, payload, None).await
    }

    async fn json_request<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: &T,
        authorization: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(value) = authorization {
            builder = builder.header("authorization", value);
        }
        self.send(builder.body(Body::from(body))?).await
    }

    #[allow(dead_code)]
    pub async fn get(&self, path: &str) -> Result<hyper::Response<Body>> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(Body::empty())?;
        self.send(request).await
    }

    /// Uploads `bytes` with the admin credential and returns the response body.
    #[allow(dead_code)]
    pub async fn upload(&self, mime: &str, bytes: &[u8], file_name: &str) -> Result<(u16, Value)> {
        let response = self
            .post_json(
                "/api/uploads",
                &serde_json::json!({
                    "imageData": data_uri(mime, bytes),
                    "fileName": file_name,
                }),
                Some(&format!("SuperAdmin {ADMIN_TOKEN}")),
            )
            .await?;
        let status = response.status().as_u16();
        Ok((status, body_json(response).await?))
    }
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body.collect().await?;
    Ok(collected.to_bytes().to_vec())
}

#[allow(dead_code)]
pub async fn body_json(response: hyper::Response<Body>) -> Result<Value> {
    let bytes = body_to_vec(response.into_body()).await?;
    Ok(serde_json::from_slice(&bytes)?)
}
