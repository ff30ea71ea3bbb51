use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc,
};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::storage::ObjectStorage;

pub const MAX_ATTACHMENT_BYTES: usize = 5 * 1024 * 1024;
pub const UPLOADS_URL_PREFIX: &str = "/uploads/";

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("image data must be a data URI of the form data:<mime>;base64,<payload>")]
    InvalidFormat,
    #[error("unsupported file type '{0}', expected png, jpeg, gif or pdf")]
    UnsupportedType(String),
    #[error("file is {size} bytes, the limit is {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },
    #[error("attachment '{0}' was not issued by the upload endpoint")]
    UnknownAttachment(String),
    #[error("attachment storage failed: {0:#}")]
    Storage(anyhow::Error),
}

impl AttachmentError {
    /// Machine-readable rejection reason, `None` for server-side failures.
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            AttachmentError::InvalidFormat => Some("InvalidFormat"),
            AttachmentError::UnsupportedType(_) => Some("UnsupportedType"),
            AttachmentError::PayloadTooLarge { .. } => Some("PayloadTooLarge"),
            AttachmentError::UnknownAttachment(_) => Some("UnknownAttachment"),
            AttachmentError::Storage(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentType {
    Png,
    Jpeg,
    Gif,
    Pdf,
}

impl AttachmentType {
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.to_ascii_lowercase().as_str() {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/gif" => Some(Self::Gif),
            "application/pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Pdf => "application/pdf",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Gif => "gif",
            Self::Pdf => "pdf",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri<'a> {
    pub mime: &'a str,
    pub payload: &'a str,
}

pub fn parse_data_uri(input: &str) -> Result<DataUri<'_>, AttachmentError> {
    let rest = input
        .strip_prefix("data:")
        .ok_or(AttachmentError::InvalidFormat)?;
    let (mime, payload) = rest
        .split_once(";base64,")
        .ok_or(AttachmentError::InvalidFormat)?;
    if !is_mime_token(mime) || payload.is_empty() {
        return Err(AttachmentError::InvalidFormat);
    }
    Ok(DataUri { mime, payload })
}

fn is_mime_token(value: &str) -> bool {
    let Some((kind, subtype)) = value.split_once('/') else {
        return false;
    };
    let valid = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '-' | '.'))
    };
    valid(kind) && valid(subtype)
}

fn is_safe_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-')
}

pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|ch| if is_safe_char(ch) { ch } else { '_' })
        .collect()
}

/// Strictly increasing millisecond clock; clones of a validator share it.
#[derive(Debug, Clone, Default)]
pub struct TokenClock {
    last_millis: Arc<AtomicI64>,
}

impl TokenClock {
    fn next_millis(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut previous = self.last_millis.load(Ordering::Relaxed);
        loop {
            let next = now.max(previous + 1);
            match self.last_millis.compare_exchange_weak(
                previous,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(actual) => previous = actual,
            }
        }
    }

    pub fn unique_token(&self) -> String {
        let suffix: [u8; 4] = rand::random();
        format!("{}-{}", self.next_millis(), hex::encode(suffix))
    }
}

fn is_unique_token(token: &str) -> bool {
    let Some((millis, suffix)) = token.split_once('-') else {
        return false;
    };
    !millis.is_empty()
        && millis.chars().all(|ch| ch.is_ascii_digit())
        && suffix.len() == 8
        && suffix.chars().all(|ch| ch.is_ascii_hexdigit())
}

/// Returns the stored name behind a URL produced by [`AttachmentValidator::accept`].
pub fn stored_name_from_url(url: &str) -> Option<&str> {
    let name = url.strip_prefix(UPLOADS_URL_PREFIX)?;
    let (token, rest) = name.split_once('_')?;
    (is_unique_token(token) && !rest.is_empty() && name.chars().all(is_safe_char)).then_some(name)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub mime_type: &'static str,
    pub size: usize,
    pub name: String,
    pub original_name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListedAttachment {
    pub name: String,
    pub url: String,
    pub size: u64,
}

#[derive(Clone)]
pub struct AttachmentValidator {
    storage: Arc<dyn ObjectStorage>,
    clock: TokenClock,
    max_bytes: usize,
}

impl AttachmentValidator {
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self {
            storage,
            clock: TokenClock::default(),
            max_bytes: MAX_ATTACHMENT_BYTES,
        }
    }

    /// Decodes, validates and stores one upload.
    ///
    /// The decoded size is checked before the declared type so an oversized
    /// payload is always reported as too large.
    pub async fn accept(
        &self,
        image_data: &str,
        file_name: Option<&str>,
    ) -> Result<Attachment, AttachmentError> {
        let uri = parse_data_uri(image_data)?;
        let bytes = STANDARD
            .decode(uri.payload)
            .map_err(|_| AttachmentError::InvalidFormat)?;

        if bytes.len() > self.max_bytes {
            return Err(AttachmentError::PayloadTooLarge {
                size: bytes.len(),
                limit: self.max_bytes,
            });
        }

        let kind = AttachmentType::from_mime(uri.mime)
            .ok_or_else(|| AttachmentError::UnsupportedType(uri.mime.to_string()))?;

        let original_name = file_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("upload.{}", kind.extension()));
        let stored_name = format!("{}_{}", self.clock.unique_token(), sanitize_file_name(&original_name));
        let size = bytes.len();

        self.storage
            .put_object(&stored_name, bytes)
            .await
            .map_err(AttachmentError::Storage)?;

        info!(
            name = %stored_name,
            mime_type = kind.mime_type(),
            size,
            "attachment stored"
        );

        Ok(Attachment {
            mime_type: kind.mime_type(),
            size,
            url: format!("{UPLOADS_URL_PREFIX}{stored_name}"),
            name: stored_name,
            original_name,
        })
    }

    /// Ensures `url` points at a file previously stored by [`Self::accept`].
    pub async fn verify_issued(&self, url: &str) -> Result<(), AttachmentError> {
        let Some(name) = stored_name_from_url(url) else {
            warn!(%url, "rejected attachment reference with foreign url");
            return Err(AttachmentError::UnknownAttachment(url.to_string()));
        };
        let exists = self
            .storage
            .object_exists(name)
            .await
            .map_err(AttachmentError::Storage)?;
        if !exists {
            warn!(%url, "rejected reference to missing attachment");
            return Err(AttachmentError::UnknownAttachment(url.to_string()));
        }
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<ListedAttachment>, AttachmentError> {
        let objects = self
            .storage
            .list_objects()
            .await
            .map_err(AttachmentError::Storage)?;

        Ok(objects
            .into_iter()
            .filter(|object| {
                mime_guess::from_path(&object.name)
                    .first()
                    .and_then(|mime| AttachmentType::from_mime(mime.essence_str()))
                    .is_some()
            })
            .map(|object| ListedAttachment {
                url: format!("{UPLOADS_URL_PREFIX}{}", object.name),
                name: object.name,
                size: object.size,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::storage::LocalDiskStorage;

    fn data_uri(mime: &str, bytes: &[u8]) -> String {
        format!("data:{mime};base64,{}", STANDARD.encode(bytes))
    }

    fn validator(dir: &tempfile::TempDir) -> AttachmentValidator {
        AttachmentValidator::new(Arc::new(LocalDiskStorage::new(dir.path())))
    }

    #[test]
    fn parses_well_formed_data_uri() {
        let uri = parse_data_uri("data:image/png;base64,iVBORw0KGgo=").unwrap();
        assert_eq!(uri.mime, "image/png");
        assert_eq!(uri.payload, "iVBORw0KGgo=");
    }

    #[test]
    fn rejects_malformed_data_uris() {
        for input in [
            "",
            "iVBORw0KGgo=",
            "data:image/png,iVBORw0KGgo=",
            "data:image/png;charset=utf-8;base64,iVBORw0KGgo=",
            "data:;base64,iVBORw0KGgo=",
            "data:image/png;base64,",
            "data:png;base64,iVBORw0KGgo=",
        ] {
            assert!(
                matches!(parse_data_uri(input), Err(AttachmentError::InvalidFormat)),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn sanitizes_every_unsafe_character() {
        assert_eq!(sanitize_file_name("mon logo (v2).png"), "mon_logo__v2_.png");
        assert_eq!(sanitize_file_name("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize_file_name("devis-été.pdf"), "devis-_t_.pdf");
        assert_eq!(sanitize_file_name("plain_name-1.gif"), "plain_name-1.gif");
    }

    #[test]
    fn tokens_are_unique_and_recognizable() {
        let clock = TokenClock::default();
        let tokens: HashSet<String> = (0..1000).map(|_| clock.unique_token()).collect();
        assert_eq!(tokens.len(), 1000);
        assert!(tokens.iter().all(|token| is_unique_token(token)));
    }

    fn token_millis(token: &str) -> i64 {
        token.split_once('-').unwrap().0.parse().unwrap()
    }

    #[test]
    fn cloned_clocks_share_one_sequence() {
        let clock = TokenClock::default();
        let twin = clock.clone();
        let mut last = 0;
        for step in 0..200 {
            let source = if step % 2 == 0 { &clock } else { &twin };
            let millis = token_millis(&source.unique_token());
            assert!(millis > last, "{millis} should follow {last}");
            last = millis;
        }
    }

    #[test]
    fn separate_clocks_are_independent() {
        let first = TokenClock::default();
        let ahead = first.next_millis() + 10_000;
        first.last_millis.store(ahead, Ordering::SeqCst);

        let other = TokenClock::default();
        assert!(token_millis(&other.unique_token()) < ahead);
        assert_eq!(token_millis(&first.unique_token()), ahead + 1);
    }

    #[test]
    fn only_issued_urls_are_recognized() {
        assert_eq!(
            stored_name_from_url("/uploads/1760000000000-0a1b2c3d_logo.png"),
            Some("1760000000000-0a1b2c3d_logo.png")
        );
        assert_eq!(stored_name_from_url("/uploads/logo.png"), None);
        assert_eq!(stored_name_from_url("/etc/passwd"), None);
        assert_eq!(
            stored_name_from_url("/uploads/1760000000000-0a1b2c3d_../x"),
            None
        );
        assert_eq!(
            stored_name_from_url("https://evil.example/1760000000000-0a1b2c3d_a.png"),
            None
        );
    }

    #[tokio::test]
    async fn stores_valid_png_under_unique_name() {
        let dir = tempfile::tempdir().unwrap();
        let validator = validator(&dir);

        let attachment = validator
            .accept(&data_uri("image/png", b"\x89PNG fake"), Some("mon logo.png"))
            .await
            .unwrap();

        assert_eq!(attachment.mime_type, "image/png");
        assert_eq!(attachment.size, 9);
        assert_eq!(attachment.original_name, "mon logo.png");
        assert!(attachment.name.ends_with("_mon_logo.png"));
        assert_eq!(attachment.url, format!("/uploads/{}", attachment.name));
        let stored = std::fs::read(dir.path().join(&attachment.name)).unwrap();
        assert_eq!(stored, b"\x89PNG fake");
        validator.verify_issued(&attachment.url).await.unwrap();
    }

    #[tokio::test]
    async fn identical_names_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let validator = validator(&dir);
        let payload = data_uri("image/gif", b"GIF89a");

        let (first, second) = tokio::join!(
            validator.accept(&payload, Some("same.gif")),
            validator.accept(&payload, Some("same.gif")),
        );
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_ne!(first.name, second.name);
        assert_eq!(validator.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn oversized_payload_is_rejected_whatever_the_type() {
        let dir = tempfile::tempdir().unwrap();
        let validator = validator(&dir);
        let bytes = vec![0u8; MAX_ATTACHMENT_BYTES + 1];

        for mime in ["image/png", "application/zip"] {
            let err = validator
                .accept(&data_uri(mime, &bytes), Some("big.bin"))
                .await
                .unwrap_err();
            assert!(
                matches!(err, AttachmentError::PayloadTooLarge { size, .. } if size == MAX_ATTACHMENT_BYTES + 1)
            );
        }
        assert!(validator.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn exactly_five_mebibytes_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let validator = validator(&dir);
        let bytes = vec![7u8; MAX_ATTACHMENT_BYTES];

        let attachment = validator
            .accept(&data_uri("application/pdf", &bytes), Some("cahier.pdf"))
            .await
            .unwrap();
        assert_eq!(attachment.size, MAX_ATTACHMENT_BYTES);
    }

    #[tokio::test]
    async fn unsupported_and_undecodable_payloads_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let validator = validator(&dir);

        let err = validator
            .accept(&data_uri("image/webp", b"RIFF"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AttachmentError::UnsupportedType(ref mime) if mime == "image/webp"));

        let err = validator
            .accept("data:image/png;base64,not base64!", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AttachmentError::InvalidFormat));
    }

    #[tokio::test]
    async fn missing_file_name_gets_a_typed_default() {
        let dir = tempfile::tempdir().unwrap();
        let validator = validator(&dir);

        let attachment = validator
            .accept(&data_uri("image/jpeg", b"\xff\xd8\xff"), Some("   "))
            .await
            .unwrap();
        assert_eq!(attachment.original_name, "upload.jpg");
        assert!(attachment.name.ends_with("_upload.jpg"));
    }

    #[tokio::test]
    async fn verify_rejects_unknown_files() {
        let dir = tempfile::tempdir().unwrap();
        let validator = validator(&dir);

        for url in ["/uploads/1760000000000-0a1b2c3d_missing.png", "/tmp/logo.png"] {
            let err = validator.verify_issued(url).await.unwrap_err();
            assert!(matches!(err, AttachmentError::UnknownAttachment(_)));
        }
    }
}
