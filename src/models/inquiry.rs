use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum InquiryStatus {
    Pending,
    Reviewing,
    Completed,
    Cancelled,
}

impl InquiryStatus {
    pub const ALL: [InquiryStatus; 4] = [
        InquiryStatus::Pending,
        InquiryStatus::Reviewing,
        InquiryStatus::Completed,
        InquiryStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InquiryStatus::Pending => "PENDING",
            InquiryStatus::Reviewing => "REVIEWING",
            InquiryStatus::Completed => "COMPLETED",
            InquiryStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(InquiryStatus::Pending),
            "REVIEWING" => Some(InquiryStatus::Reviewing),
            "COMPLETED" => Some(InquiryStatus::Completed),
            "CANCELLED" => Some(InquiryStatus::Cancelled),
            _ => None,
        }
    }

    pub fn badge_class(&self) -> &'static str {
        match self {
            InquiryStatus::Pending => "bg-yellow-100 text-yellow-800",
            InquiryStatus::Reviewing => "bg-blue-100 text-blue-800",
            InquiryStatus::Completed => "bg-green-100 text-green-800",
            InquiryStatus::Cancelled => "bg-gray-100 text-gray-800",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAttachment {
    pub mime_type: String,
    pub data_base64: String,
    pub preview_url: String,
}

impl ImageAttachment {
    pub fn from_bytes(bytes: &[u8], mime_type: Option<&str>) -> Self {
        Self::from_encoded(STANDARD.encode(bytes), mime_type)
    }

    pub fn from_base64(data: &str, mime_type: Option<&str>) -> Result<Self, base64::DecodeError> {
        let data = data.trim();
        STANDARD.decode(data)?;
        Ok(Self::from_encoded(data.to_string(), mime_type))
    }

    fn from_encoded(data_base64: String, mime_type: Option<&str>) -> Self {
        let mime_type = normalize_mime(mime_type);
        let preview_url = format!("data:{mime_type};base64,{data_base64}");
        Self {
            mime_type,
            data_base64,
            preview_url,
        }
    }
}

fn normalize_mime(mime_type: Option<&str>) -> String {
    // Drop parameters such as "; charset=binary" and fall back to JPEG for non-images.
    mime_type
        .and_then(|m| m.split(';').next())
        .map(|m| m.trim().to_ascii_lowercase())
        .filter(|m| m.starts_with("image/"))
        .unwrap_or_else(|| DEFAULT_IMAGE_MIME.to_string())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InquiryFields {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub preferred_date: Option<String>,
    #[serde(default)]
    pub items_description: Option<String>,
}

impl InquiryFields {
    pub fn missing_required(&self) -> Option<&'static str> {
        [
            ("name", &self.name),
            ("phone", &self.phone),
            ("address", &self.address),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
    }

    pub fn apply(&mut self, update: FieldsUpdate) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(phone) = update.phone {
            self.phone = phone;
        }
        if let Some(address) = update.address {
            self.address = address;
        }
        if let Some(date) = update.preferred_date {
            self.preferred_date = non_blank(date);
        }
        if let Some(description) = update.items_description {
            self.items_description = non_blank(description);
        }
    }

    pub fn description(&self) -> Option<&str> {
        self.items_description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FieldsUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub preferred_date: Option<String>,
    pub items_description: Option<String>,
}

fn non_blank(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inquiry {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub address: String,
    pub preferred_date: Option<String>,
    pub items_description: Option<String>,
    pub image: Option<ImageAttachment>,
    pub ai_estimate: Option<String>,
    pub status: InquiryStatus,
    pub created_at: DateTime<Utc>,
}

impl Inquiry {
    pub fn new(
        fields: InquiryFields,
        image: Option<ImageAttachment>,
        ai_estimate: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: fields.name,
            phone: fields.phone,
            address: fields.address,
            preferred_date: fields.preferred_date.and_then(non_blank),
            items_description: fields.items_description.and_then(non_blank),
            image,
            ai_estimate,
            status: InquiryStatus::Pending,
            created_at: Utc::now(),
        }
    }
}
