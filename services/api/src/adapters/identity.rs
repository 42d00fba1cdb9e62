//! services/api/src/adapters/identity.rs
//!
//! Bearer-token verification. Implements the `IdentityVerifier` port by checking
//! an HS256 JWT and then requiring an admin record in the `users` collection.

use async_trait::async_trait;
use crm_core::ports::{
    collections, DocumentStore, Identity, IdentityVerifier, PortError, PortResult,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::JwtSettings;

/// The only role allowed through the CRM.
pub const ADMIN_ROLE: &str = "admin";

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iss: String,
    pub exp: usize,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

pub struct JwtIdentityVerifier {
    key: DecodingKey,
    validation: Validation,
    users: Arc<dyn DocumentStore>,
}

impl JwtIdentityVerifier {
    pub fn new(settings: &JwtSettings, users: Arc<dyn DocumentStore>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[settings.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        match &settings.audience {
            Some(audience) => validation.set_audience(&[audience.as_str()]),
            None => validation.validate_aud = false,
        }
        Self {
            key: DecodingKey::from_secret(settings.secret.as_bytes()),
            validation,
            users,
        }
    }

    fn claims(&self, token: &str) -> PortResult<Claims> {
        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                use jsonwebtoken::errors::ErrorKind;
                let reason = match e.kind() {
                    ErrorKind::ExpiredSignature => "token expired",
                    ErrorKind::InvalidSignature => "invalid signature",
                    ErrorKind::InvalidIssuer => "unexpected issuer",
                    ErrorKind::InvalidAudience => "unexpected audience",
                    ErrorKind::MissingRequiredClaim(_) => "missing required claim",
                    _ => "invalid token",
                };
                debug!(reason, "rejected bearer token");
                PortError::Unauthorized
            })
    }
}

/// Makes sure each subject has an admin user record. Existing records keep
/// their other fields; returns how many records were written.
pub async fn provision_admins(
    users: &dyn DocumentStore,
    subjects: &[String],
) -> PortResult<usize> {
    let mut written = 0;
    for subject in subjects {
        let mut record = users.get(collections::USERS, subject).await?.unwrap_or_default();
        if text_field(&record, "role").as_deref() == Some(ADMIN_ROLE) {
            continue;
        }
        record.insert("role".to_string(), ADMIN_ROLE.into());
        record
            .entry("created_at".to_string())
            .or_insert_with(|| chrono::Utc::now().to_rfc3339().into());
        users.put(collections::USERS, subject, record).await?;
        info!(subject = %subject, "provisioned admin user");
        written += 1;
    }
    Ok(written)
}

fn text_field(doc: &crm_core::ports::Document, key: &str) -> Option<String> {
    doc.get(key).and_then(|v| v.as_str()).map(String::from)
}

#[async_trait]
impl IdentityVerifier for JwtIdentityVerifier {
    async fn verify(&self, bearer: &str) -> PortResult<Identity> {
        let claims = self.claims(bearer)?;

        let user = self
            .users
            .get(collections::USERS, &claims.sub)
            .await?
            .ok_or_else(|| {
                warn!(subject = %claims.sub, "token subject has no user record");
                PortError::Forbidden("no user record for this account".to_string())
            })?;

        let role = text_field(&user, "role").unwrap_or_default();
        if role != ADMIN_ROLE {
            warn!(subject = %claims.sub, role = %role, "non-admin account refused");
            return Err(PortError::Forbidden("admin role required".to_string()));
        }

        Ok(Identity {
            email: claims.email.or_else(|| text_field(&user, "email")),
            name: claims.name.or_else(|| text_field(&user, "name")),
            subject_id: claims.sub,
            role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_core::InMemoryDocumentStore;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn settings() -> JwtSettings {
        JwtSettings {
            secret: SECRET.to_string(),
            issuer: "crm".to_string(),
            audience: None,
        }
    }

    fn token(sub: &str, iss: &str, exp_offset: i64, secret: &str) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            iss: iss.to_string(),
            exp: (chrono::Utc::now().timestamp() + exp_offset) as usize,
            email: Some("admin@example.com".to_string()),
            name: None,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    async fn verifier() -> JwtIdentityVerifier {
        let store = Arc::new(InMemoryDocumentStore::new());
        store
            .seed(
                collections::USERS,
                "admin-1",
                json!({"role": "admin", "name": "Avery"}).as_object().cloned().unwrap(),
            )
            .await;
        store
            .seed(
                collections::USERS,
                "viewer-1",
                json!({"role": "viewer"}).as_object().cloned().unwrap(),
            )
            .await;
        JwtIdentityVerifier::new(&settings(), store)
    }

    #[tokio::test]
    async fn admin_token_yields_identity() {
        let verifier = verifier().await;
        let identity = verifier
            .verify(&token("admin-1", "crm", 3600, SECRET))
            .await
            .unwrap();
        assert_eq!(identity.subject_id, "admin-1");
        assert_eq!(identity.role, "admin");
        assert_eq!(identity.email.as_deref(), Some("admin@example.com"));
        assert_eq!(identity.name.as_deref(), Some("Avery"));
    }

    #[tokio::test]
    async fn bad_tokens_are_unauthorized() {
        let verifier = verifier().await;
        for bad in [
            token("admin-1", "crm", -3600, SECRET),
            token("admin-1", "someone-else", 3600, SECRET),
            token("admin-1", "crm", 3600, "ffffffffffffffffffffffffffffffff"),
            "not-a-jwt".to_string(),
        ] {
            assert!(matches!(
                verifier.verify(&bad).await,
                Err(PortError::Unauthorized)
            ));
        }
    }

    #[tokio::test]
    async fn missing_or_non_admin_user_is_forbidden() {
        let verifier = verifier().await;
        assert!(matches!(
            verifier.verify(&token("viewer-1", "crm", 3600, SECRET)).await,
            Err(PortError::Forbidden(_))
        ));
        assert!(matches!(
            verifier.verify(&token("ghost", "crm", 3600, SECRET)).await,
            Err(PortError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn provisioning_promotes_and_creates_admins() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store
            .seed(
                collections::USERS,
                "viewer-1",
                json!({"role": "viewer", "name": "Vic"}).as_object().cloned().unwrap(),
            )
            .await;
        let subjects = vec!["viewer-1".to_string(), "new-1".to_string()];

        assert_eq!(provision_admins(store.as_ref(), &subjects).await.unwrap(), 2);
        assert_eq!(provision_admins(store.as_ref(), &subjects).await.unwrap(), 0);

        let promoted = store.get(collections::USERS, "viewer-1").await.unwrap().unwrap();
        assert_eq!(promoted["role"], "admin");
        assert_eq!(promoted["name"], "Vic");

        let verifier = JwtIdentityVerifier::new(&settings(), store);
        let identity = verifier
            .verify(&token("new-1", "crm", 3600, SECRET))
            .await
            .unwrap();
        assert_eq!(identity.subject_id, "new-1");
    }
}
