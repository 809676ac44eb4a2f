//! Expiring HMAC-SHA1 signatures for local object URLs

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::time::Duration;

type HmacSha1 = Hmac<Sha1>;

/// Signs object paths with a validity window
pub struct UrlSigner {
    secret: String,
}

impl UrlSigner {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// `{start};{end}` in unix seconds
    fn key_time(valid: Duration) -> String {
        let start = Utc::now().timestamp();
        let end = start + valid.as_secs().max(1) as i64;
        format!("{};{}", start, end)
    }

    fn hmac_hex(key: &[u8], data: &str) -> String {
        let mut mac = HmacSha1::new_from_slice(key).expect("HMAC can take key of any size");
        mac.update(data.as_bytes());
        mac.finalize()
            .into_bytes()
            .iter()
            .map(|x| format!("{:02x}", x))
            .collect::<Vec<String>>()
            .join("")
    }

    /// Signature binding `path` to `key_time`
    pub fn signature(&self, path: &str, key_time: &str) -> String {
        let sign_key = Self::hmac_hex(self.secret.as_bytes(), key_time);
        let string_to_sign = format!("get\n/{}\n{}\n", path.trim_start_matches('/'), key_time);
        Self::hmac_hex(sign_key.as_bytes(), &string_to_sign)
    }

    /// Query string granting access to `path` for `valid`
    pub fn sign(&self, path: &str, valid: Duration) -> String {
        let key_time = Self::key_time(valid);
        let signature = self.signature(path, &key_time);
        format!(
            "q-sign-time={}&q-signature={}",
            urlencoding::encode(&key_time),
            signature
        )
    }
}
