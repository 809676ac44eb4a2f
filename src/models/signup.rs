use serde::Serialize;

/// Early-access signup row (`presignup` table)
#[derive(Debug, Clone, Serialize)]
pub struct WaitlistEntry {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

/// Newsletter subscription row (`newsletter` table)
#[derive(Debug, Clone, Serialize)]
pub struct NewsletterEntry {
    pub email: String,
}
