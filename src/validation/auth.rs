/// Characters accepted as the "special" class of a password.
const PASSWORD_SPECIALS: &str = "!@#$%^&*(),.?\":{}|<>";

/// Validates a username.
///
/// # Arguments
///
/// * `username` - The username to validate.
///
/// # Returns
///
/// A `garde::Result` indicating whether the username is valid.
pub fn validate_username(username: &str, _context: &()) -> garde::Result {
    let length = username.chars().count();
    if length < 3 {
        return Err(garde::Error::new("username must be at least 3 characters long"));
    }

    if length > 255 {
        return Err(garde::Error::new("username must be at most 255 characters"));
    }

    if !username.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
        return Err(garde::Error::new(
            "username can only contain letters, numbers, underscores, and hyphens",
        ));
    }

    Ok(())
}

/// Validates a new password.
///
/// A password needs 8 to 128 characters and at least one upper-case letter,
/// lower-case letter, digit and special character.
pub fn validate_password(password: &str, _context: &()) -> garde::Result {
    let length = password.chars().count();
    if length < 8 {
        return Err(garde::Error::new("password must be at least 8 characters long"));
    }

    if length > 128 {
        return Err(garde::Error::new("password must be at most 128 characters"));
    }

    let missing: Vec<&str> = [
        (password.chars().any(|c| c.is_uppercase()), "an upper-case letter"),
        (password.chars().any(|c| c.is_lowercase()), "a lower-case letter"),
        (password.chars().any(|c| c.is_ascii_digit()), "a digit"),
        (password.chars().any(|c| PASSWORD_SPECIALS.contains(c)), "a special character"),
    ]
    .into_iter()
    .filter(|(present, _)| !present)
    .map(|(_, name)| name)
    .collect();

    if !missing.is_empty() {
        return Err(garde::Error::new(format!(
            "password must contain {}",
            missing.join(", ")
        )));
    }

    Ok(())
}
