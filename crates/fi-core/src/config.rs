//! Board-wide constants and request-layer limits.

use std::time::Duration;

/// Delay between a confirmed delete request and the purge.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(60);

/// How often the sweeper looks for overdue pending posts.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

pub const DEFAULT_MAX_FILES: usize = 3;

/// Upper bound on a single multipart request body.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 8 * 1024 * 1024;

/// Lifetime of a login session, counted from login.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

pub const DEFAULT_EMAIL_DOMAIN: &str = "bennett.edu.in";

/// Extensions accepted for uploads.
pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

pub const CATEGORIES: &[&str] = &[
    "Mobile",
    "Laptop",
    "Charger",
    "Book",
    "ID Card",
    "Wallet",
    "Keys",
    "Bag",
    "Earphones",
    "Power Bank",
    "Clothes",
    "Other",
];

pub const PLACES: &[&str] = &[
    "Library",
    "Canteen",
    "Hostel Gate",
    "Lecture Hall",
    "Ground",
    "Parking",
    "Computer Lab",
    "Bus Stop",
    "Auditorium",
    "Other",
];

/// Limits enforced by the request layer.
#[derive(Debug, Clone)]
pub struct BoardSettings {
    /// Registration only accepts `<user>@<allowed_email_domain>`
    pub allowed_email_domain: String,
    pub max_files: usize,
    pub max_upload_bytes: usize,
    pub session_ttl: Duration,
}

impl Default for BoardSettings {
    fn default() -> Self {
        Self {
            allowed_email_domain: DEFAULT_EMAIL_DOMAIN.to_string(),
            max_files: DEFAULT_MAX_FILES,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            session_ttl: DEFAULT_SESSION_TTL,
        }
    }
}

/// True when `filename` carries one of the whitelisted image extensions.
pub fn has_allowed_extension(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
}
