//! Input validation for API requests.
//!
//! Each function checks one field and returns a message suitable for the
//! `details` map of a validation error. Collect several of them with
//! `ValidationErrorBuilder` from the `error` module.

use lazy_static::lazy_static;
use regex::Regex;

use crate::auth::password_strength_problem;

lazy_static! {
    /// Usernames: letters, digits, dots, dashes and underscores, starting with a letter
    static ref USERNAME_REGEX: Regex = Regex::new(r"^[a-zA-Z][a-zA-Z0-9._-]*$").unwrap();

    /// A pragmatic email check: something@something.tld
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"^[^@\s]+@[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?)+$")
            .unwrap();

    /// Department identifiers such as `biology` or `eng-mech`
    static ref DEPARTMENT_REGEX: Regex = Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_-]*$").unwrap();
}

pub fn validate_username(username: &str) -> Result<(), String> {
    if username.is_empty() {
        return Err("Username is required".to_string());
    }

    if username.len() < 3 {
        return Err("Username is too short (min 3 characters)".to_string());
    }

    if username.len() > 50 {
        return Err("Username is too long (max 50 characters)".to_string());
    }

    if !USERNAME_REGEX.is_match(username) {
        return Err(
            "Username must start with a letter and contain only letters, digits, '.', '-' or '_'"
                .to_string(),
        );
    }

    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email is too long (max 254 characters)".to_string());
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email format".to_string());
    }

    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), String> {
    match password_strength_problem(password) {
        Some(problem) => Err(problem.to_string()),
        None => Ok(()),
    }
}

/// Optional personal name fields
pub fn validate_name(name: &Option<String>, field_name: &str) -> Result<(), String> {
    if let Some(n) = name {
        if n.len() > 100 {
            return Err(format!("{} is too long (max 100 characters)", field_name));
        }
    }
    Ok(())
}

pub fn validate_title(title: &str) -> Result<(), String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err("Title is required".to_string());
    }

    if trimmed.len() > 255 {
        return Err("Title is too long (max 255 characters)".to_string());
    }

    Ok(())
}

pub fn validate_abstract(text: &Option<String>) -> Result<(), String> {
    if let Some(t) = text {
        if t.len() > 10_000 {
            return Err("Abstract is too long (max 10000 characters)".to_string());
        }
    }
    Ok(())
}

pub fn validate_department_id(department_id: &str) -> Result<(), String> {
    if department_id.is_empty() {
        return Err("Department is required".to_string());
    }

    if department_id.len() > 64 {
        return Err("Department is too long (max 64 characters)".to_string());
    }

    if !DEPARTMENT_REGEX.is_match(department_id) {
        return Err("Invalid department format".to_string());
    }

    Ok(())
}

pub fn validate_requested_amount(amount: Option<f64>) -> Result<(), String> {
    if let Some(a) = amount {
        if !a.is_finite() {
            return Err("Requested amount must be a number".to_string());
        }
        if a < 0.0 {
            return Err("Requested amount cannot be negative".to_string());
        }
    }
    Ok(())
}

pub fn validate_notes(notes: &Option<String>) -> Result<(), String> {
    if let Some(n) = notes {
        if n.len() > 2_000 {
            return Err("Notes are too long (max 2000 characters)".to_string());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_username() {
        assert!(validate_username("jdoe").is_ok());
        assert!(validate_username("j.doe-2").is_ok());
        assert!(validate_username("Jane_Doe").is_ok());

        assert!(validate_username("").is_err());
        assert!(validate_username("jd").is_err());
        assert!(validate_username("2fast").is_err());
        assert!(validate_username("j doe").is_err());
        assert!(validate_username(&"a".repeat(51)).is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("jane@example.org").is_ok());
        assert!(validate_email("jane.doe+lab@uni.example.ac.uk").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("jane").is_err());
        assert!(validate_email("jane@localhost").is_err());
        assert!(validate_email("jane@@example.org").is_err());
        assert!(validate_email("ja ne@example.org").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("Tr1cky-Grant-Pass").is_ok());
        assert!(validate_password("short1!A").is_err());
        assert!(validate_password("alllowercase123!").is_err());
    }

    #[test]
    fn test_validate_title() {
        assert!(validate_title("Soil microbiome survey").is_ok());
        assert!(validate_title("").is_err());
        assert!(validate_title("   ").is_err());
        assert!(validate_title(&"x".repeat(256)).is_err());
    }

    #[test]
    fn test_validate_department_id() {
        assert!(validate_department_id("biology").is_ok());
        assert!(validate_department_id("eng-mech_2").is_ok());
        assert!(validate_department_id("").is_err());
        assert!(validate_department_id("-bio").is_err());
        assert!(validate_department_id("bio/../x").is_err());
    }

    #[test]
    fn test_validate_requested_amount() {
        assert!(validate_requested_amount(None).is_ok());
        assert!(validate_requested_amount(Some(0.0)).is_ok());
        assert!(validate_requested_amount(Some(125_000.50)).is_ok());

        assert!(validate_requested_amount(Some(-1.0)).is_err());
        assert!(validate_requested_amount(Some(f64::NAN)).is_err());
        assert!(validate_requested_amount(Some(f64::INFINITY)).is_err());
    }

    #[test]
    fn test_validate_optional_text() {
        assert!(validate_name(&None, "First name").is_ok());
        assert!(validate_name(&Some("x".repeat(101)), "First name").is_err());
        assert!(validate_abstract(&Some("x".repeat(10_001))).is_err());
        assert!(validate_notes(&Some("Please focus on budget".to_string())).is_ok());
    }
}
