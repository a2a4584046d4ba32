use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub estimate_timeout_secs: u64,
    pub ack_dismiss_secs: u64,
    pub display_utc_offset_hours: i32,
    pub max_image_bytes: usize,
    pub draft_idle_secs: u64,
    pub max_drafts: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "junkdesk.db".to_string()),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_else(|_| "changeme".to_string()),
            gemini_api_key: env::var("GEMINI_API_KEY").unwrap_or_default(),
            gemini_model: env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-2.5-flash".to_string()),
            gemini_base_url: env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string()),
            estimate_timeout_secs: env::var("ESTIMATE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            ack_dismiss_secs: env::var("ACK_DISMISS_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            display_utc_offset_hours: env::var("DISPLAY_UTC_OFFSET_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|h: &i32| (-23..=23).contains(h))
                .unwrap_or(9),
            max_image_bytes: env::var("MAX_IMAGE_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10 * 1024 * 1024),
            draft_idle_secs: env::var("DRAFT_IDLE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30 * 60),
            max_drafts: env::var("MAX_DRAFTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1000),
        }
    }
}
