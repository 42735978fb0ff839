use argon2::{
    Argon2, PasswordVerifier,
    password_hash::{PasswordHash, PasswordHasher, SaltString, rand_core::OsRng},
};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::{
    error::{Error, Result, is_unique_violation},
    utils::now_utc,
};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

pub fn validate_username(username: &str) -> Vec<String> {
    let mut errors = Vec::new();
    if username.chars().count() < 3 {
        errors.push("Username must be at least 3 characters long".to_string());
    }
    errors
}

/// Returns every rule the password breaks, empty when it is acceptable.
pub fn validate_password_strength(password: &str) -> Vec<String> {
    let mut errors = Vec::new();
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_letter = password.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());

    if password.chars().count() < 6 {
        errors.push("Password must be at least 6 characters long".to_string());
    }
    if !has_upper {
        errors.push("Password must contain at least one uppercase letter".to_string());
    }
    if !has_lower {
        errors.push("Password must contain at least one lowercase letter".to_string());
    }
    if !has_digit {
        errors.push("Password must contain at least one number".to_string());
    }
    if !(has_letter && has_digit) {
        errors.push("Password must contain both letters and numbers".to_string());
    }
    let chars: Vec<char> = password.chars().collect();
    if chars
        .windows(3)
        .any(|w| w[0].is_ascii_digit() && w[0] == w[1] && w[1] == w[2])
    {
        errors.push(
            "Password cannot contain consecutive repeating digits (e.g., 111, 222)".to_string(),
        );
    }
    errors
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();
    Ok(password_hash)
}

pub async fn username_available(database: &SqlitePool, username: &str) -> Result<bool> {
    let taken: i64 = sqlx::query_scalar("select count(*) from user_account where username = ?")
        .bind(username)
        .fetch_one(database)
        .await?;
    Ok(taken == 0)
}

/// Registers a user after validating the username and password rules.
pub async fn create_user(database: &SqlitePool, username: &str, password: &str) -> Result<i64> {
    let username_errors = validate_username(username);
    if !username_errors.is_empty() {
        return Err(Error::InvalidField {
            field: "username",
            messages: username_errors,
        });
    }
    if !username_available(database, username).await? {
        return Err(Error::invalid_field("username", "Username already taken"));
    }
    let password_errors = validate_password_strength(password);
    if !password_errors.is_empty() {
        return Err(Error::InvalidField {
            field: "password",
            messages: password_errors,
        });
    }
    let password_hash = hash_password(password)?;
    let result = sqlx::query("insert into user_account (username, password, created_at) values (?, ?, ?)")
        .bind(username)
        .bind(password_hash)
        .bind(now_utc())
        .execute(database)
        .await;
    match result {
        Ok(r) => {
            info!("user {} registered", username);
            Ok(r.last_insert_rowid())
        }
        Err(e) if is_unique_violation(&e) => {
            Err(Error::invalid_field("username", "Username already taken"))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn login(database: &SqlitePool, username: &str, password: &str) -> Result<UserInfo> {
    let Some((id, hash)) = sqlx::query_as::<_, (i64, String)>(
        "select id, password from user_account where username = ?",
    )
    .bind(username)
    .fetch_optional(database)
    .await?
    else {
        warn!("login failed, unknown user {}", username);
        return Err(Error::InvalidCredentials);
    };
    let parsed_hash = PasswordHash::new(&hash)
        .map_err(|e| anyhow::anyhow!("Failed to parse password hash: {}", e))?;
    if Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_err()
    {
        warn!("login failed, wrong password for {}", username);
        return Err(Error::InvalidCredentials);
    }
    get_user(database, id).await
}

pub async fn get_user(database: &SqlitePool, id: i64) -> Result<UserInfo> {
    sqlx::query_as::<_, UserInfo>(
        "select id, username, first_name, last_name from user_account where id = ?",
    )
    .bind(id)
    .fetch_optional(database)
    .await?
    .ok_or(Error::NotFound("User"))
}

pub async fn get_user_list(database: &SqlitePool) -> Result<Vec<UserInfo>> {
    let users = sqlx::query_as::<_, UserInfo>(
        "select id, username, first_name, last_name from user_account order by id",
    )
    .fetch_all(database)
    .await?;
    Ok(users)
}

pub async fn delete_user(database: &SqlitePool, id: i64) -> Result<()> {
    let result = sqlx::query("delete from user_account where id = ?")
        .bind(id)
        .execute(database)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound("User"));
    }
    Ok(())
}
