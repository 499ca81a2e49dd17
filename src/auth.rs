//src/auth.rs
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("Email cannot be empty.")]
    EmptyEmail,
    #[error("'{0}' is not a valid email address.")]
    InvalidEmail(String),
    #[error("Password must be at least 8 characters.")]
    PasswordTooShort,
    #[error("Passwords do not match.")]
    PasswordMismatch,
}

pub fn validate_email(email: &str) -> Result<(), CredentialError> {
    let trimmed = email.trim();
    if trimmed.is_empty() {
        return Err(CredentialError::EmptyEmail);
    }
    match trimmed.split_once('@') {
        Some((user, domain)) if !user.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(CredentialError::InvalidEmail(trimmed.to_string())),
    }
}

/// Checked before a registration or password reset is submitted.
pub fn validate_new_password(password: &str, confirmation: &str) -> Result<(), CredentialError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(CredentialError::PasswordTooShort);
    }
    if password != confirmation {
        return Err(CredentialError::PasswordMismatch);
    }
    Ok(())
}

/// Form-level message for an error string returned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormError {
    EmailTaken,
    InvalidCredentials,
    UserNotFound,
    ResetTokenExpired,
    Unknown,
}

impl FormError {
    const KNOWN: [(&'static str, Self); 4] = [
        ("email already in use", Self::EmailTaken),
        ("invalid email or password", Self::InvalidCredentials),
        ("user not found", Self::UserNotFound),
        ("reset token expired", Self::ResetTokenExpired),
    ];

    pub fn from_server_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        Self::KNOWN
            .iter()
            .find(|(needle, _)| lower.contains(needle))
            .map_or(Self::Unknown, |(_, kind)| *kind)
    }

    pub const fn message(self) -> &'static str {
        match self {
            Self::EmailTaken => "An account with this email already exists.",
            Self::InvalidCredentials => "Incorrect email or password.",
            Self::UserNotFound => "No account was found for this email.",
            Self::ResetTokenExpired => "This reset link has expired. Request a new one.",
            Self::Unknown => "Something went wrong. Please try again.",
        }
    }
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub device_id: &'a str,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub device_id: &'a str,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
    pub device_id: &'a str,
}

#[derive(Serialize, Debug, Clone)]
pub struct PasswordResetRequest<'a> {
    pub email: &'a str,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_rules() {
        assert_eq!(
            validate_new_password("short", "short"),
            Err(CredentialError::PasswordTooShort)
        );
        assert_eq!(
            validate_new_password("longenough", "longenougH"),
            Err(CredentialError::PasswordMismatch)
        );
        assert!(validate_new_password("longenough", "longenough").is_ok());
    }

    #[test]
    fn email_shape() {
        assert_eq!(validate_email("  "), Err(CredentialError::EmptyEmail));
        assert!(validate_email("coach@example.com").is_ok());
        assert!(validate_email("coach@localhost").is_err());
        assert!(validate_email("@example.com").is_err());
    }

    #[test]
    fn server_messages_map_to_form_errors() {
        assert_eq!(
            FormError::from_server_message("Error: Email already in use"),
            FormError::EmailTaken
        );
        assert_eq!(
            FormError::from_server_message("{\"message\":\"Invalid email or password\"}"),
            FormError::InvalidCredentials
        );
        assert_eq!(FormError::from_server_message("boom"), FormError::Unknown);
    }
}
