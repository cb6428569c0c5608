//! Merchant and user types

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wallet identity resolved by the sign-in collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub address: Address,
    pub created_at: DateTime<Utc>,
}

/// A merchant owning payment intents
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Merchant {
    pub id: i64,
    /// Owning user, one merchant per user
    pub user_id: i64,
    pub name: String,
    pub email: String,
    pub website: Option<String>,
    /// Credential presented by the merchant
    #[serde(skip_serializing)]
    pub api_key: String,
    /// HMAC key for outbound notifications
    #[serde(skip_serializing)]
    pub webhook_secret: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Merchant row to create at registration
#[derive(Debug, Clone)]
pub struct NewMerchant {
    pub user_id: i64,
    pub name: String,
    pub email: String,
    pub website: Option<String>,
    pub api_key: String,
    pub webhook_secret: String,
}

impl Merchant {
    /// Callback target and signing key, when both are configured
    pub fn notification_target(&self) -> Option<(&str, &str)> {
        let website = self.website.as_deref().filter(|w| !w.trim().is_empty())?;
        let secret = self.webhook_secret.as_deref().filter(|s| !s.is_empty())?;
        Some((website, secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merchant(website: Option<&str>, secret: Option<&str>) -> Merchant {
        Merchant {
            id: 1,
            user_id: 1,
            name: "Toko".to_string(),
            email: "toko@example.com".to_string(),
            website: website.map(str::to_string),
            api_key: "key".to_string(),
            webhook_secret: secret.map(str::to_string),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_notification_target() {
        assert_eq!(
            merchant(Some("https://shop.example"), Some("s3cret")).notification_target(),
            Some(("https://shop.example", "s3cret"))
        );
        assert!(merchant(None, Some("s3cret")).notification_target().is_none());
        assert!(merchant(Some("  "), Some("s3cret")).notification_target().is_none());
        assert!(merchant(Some("https://shop.example"), None).notification_target().is_none());
    }

    #[test]
    fn test_secrets_not_serialized() {
        let json = serde_json::to_value(merchant(Some("https://a"), Some("b"))).unwrap();
        assert!(json.get("apiKey").is_none());
        assert!(json.get("webhookSecret").is_none());
        assert_eq!(json["name"], "Toko");
    }
}
