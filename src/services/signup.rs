use std::sync::Arc;

use crate::backend::SignupTable;
use crate::error::{AppError, BackendError, Result};
use crate::models::{NewsletterEntry, WaitlistEntry};

pub const WAITLIST_JOINED: &str = "You're on the list! We'll be in touch soon.";
pub const WAITLIST_DUPLICATE: &str = "This email is already registered for early access.";
pub const NEWSLETTER_JOINED: &str = "Thank you for subscribing!";
pub const NEWSLETTER_DUPLICATE: &str = "This email is already subscribed.";
pub const SIGNUP_FAILED: &str = "Something went wrong. Please try again.";

/// Early-access waitlist and newsletter signups
#[derive(Clone)]
pub struct SignupService {
    signups: Arc<dyn SignupTable>,
}

impl SignupService {
    pub fn new(signups: Arc<dyn SignupTable>) -> Self {
        Self { signups }
    }

    /// Returns the confirmation text on success
    pub async fn join_waitlist(&self, email: &str, phone_number: Option<&str>) -> Result<&'static str> {
        let entry = WaitlistEntry {
            email: normalize_email(email)?,
            phone_number: phone_number
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
        };

        match self.signups.insert_waitlist(&entry).await {
            Ok(()) => {
                tracing::info!("Waitlist signup for {}", entry.email);
                Ok(WAITLIST_JOINED)
            }
            Err(e) => Err(signup_error(e, WAITLIST_DUPLICATE)),
        }
    }

    pub async fn subscribe(&self, email: &str) -> Result<&'static str> {
        let entry = NewsletterEntry {
            email: normalize_email(email)?,
        };

        match self.signups.insert_newsletter(&entry).await {
            Ok(()) => {
                tracing::info!("Newsletter subscription for {}", entry.email);
                Ok(NEWSLETTER_JOINED)
            }
            Err(e) => Err(signup_error(e, NEWSLETTER_DUPLICATE)),
        }
    }
}

/// Duplicate rows get their own message; everything else is generic
fn signup_error(e: BackendError, duplicate_message: &str) -> AppError {
    if e.is_unique_violation() {
        tracing::debug!("Duplicate signup: {}", e);
        AppError::Conflict(duplicate_message.to_string())
    } else {
        tracing::error!("Signup failed: {}", e);
        AppError::Backend(BackendError {
            message: SIGNUP_FAILED.to_string(),
            ..e
        })
    }
}

fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(AppError::Validation("Please enter a valid email address".to_string()));
    }
    Ok(email.to_string())
}
