use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Claims of the token issued by the Telegram login flow.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // player id
    pub exp: usize,
    pub iat: usize,
}

pub fn extract_player_from_token(token: &str, secret: &str) -> Result<i64> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthError("Invalid or expired token".to_string()))?;

    token_data
        .claims
        .sub
        .parse()
        .map_err(|_| AppError::AuthError("Token subject is not a player id".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token_for(sub: &str, secret: &str) -> String {
        let now = Utc::now();
        let claims = Claims {
            sub: sub.to_string(),
            exp: (now + Duration::hours(1)).timestamp() as usize,
            iat: now.timestamp() as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("encode token")
    }

    #[test]
    fn extracts_numeric_player_id() {
        let token = token_for("42", "secret");
        assert_eq!(extract_player_from_token(&token, "secret").unwrap(), 42);
    }

    #[test]
    fn rejects_wrong_secret_and_non_numeric_subject() {
        let token = token_for("42", "secret");
        assert!(matches!(
            extract_player_from_token(&token, "other"),
            Err(AppError::AuthError(_))
        ));

        let token = token_for("0xabc", "secret");
        assert!(matches!(
            extract_player_from_token(&token, "secret"),
            Err(AppError::AuthError(_))
        ));
    }
}
