use std::time::{SystemTime, UNIX_EPOCH};

use crate::models::Claims;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

fn now() -> usize {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as usize
}

pub fn generate_admin_token(username: &str, secret: &str, ttl: usize) -> String {
    let claims = Claims {
        sub: username.to_string(),
        exp: now() + ttl,
        jti: Uuid::new_v4().to_string(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, String> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies_with_same_secret() {
        let token = generate_admin_token("admin", "test-secret", 60);
        let claims = verify_token(&token, "test-secret").unwrap();
        assert_eq!(claims.sub, "admin");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = generate_admin_token("admin", "test-secret", 60);
        assert!(verify_token(&token, "other-secret").is_err());
    }
}
