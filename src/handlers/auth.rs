use anyhow::Result;
use zeroize::Zeroizing;

use securevault_client::{
    models::user::{LoginRequest, RegisterRequest},
    services::{
        auth as auth_service,
        authz::{self, Capability},
    },
    state::AppState,
};

/// Reads a password from `VAULT_PASSWORD`, else prompts without echo.
fn read_password(prompt: &str) -> Result<Zeroizing<String>> {
    if let Ok(password) = std::env::var("VAULT_PASSWORD") {
        return Ok(Zeroizing::new(password));
    }
    Ok(Zeroizing::new(rpassword::prompt_password(prompt)?))
}

/// Handles `login`.
pub async fn login(state: &AppState, email: String) -> Result<()> {
    let password = read_password("Password: ")?;
    let request = LoginRequest {
        email,
        password: password.to_string(),
    };

    let session = auth_service::login(&state.client, &request).await?;
    match session.identity {
        Some(identity) => println!("Logged in as {} ({})", identity.username, identity.subject_id),
        None => println!("Logged in"),
    }
    Ok(())
}

/// Handles `register`.
pub async fn register(state: &AppState, email: String, username: String, login: bool) -> Result<()> {
    let password = read_password("New password: ")?;
    if std::env::var("VAULT_PASSWORD").is_err() {
        let confirmation = read_password("Repeat password: ")?;
        if *confirmation != *password {
            anyhow::bail!("passwords do not match");
        }
    }

    let request = RegisterRequest {
        email,
        username,
        password: password.to_string(),
    };

    if login {
        let (registered, session) = auth_service::register_and_login(&state.client, &request).await?;
        println!("Registered user {}", registered.user_id);
        if let Some(identity) = session.identity {
            println!("Logged in as {}", identity.username);
        }
    } else {
        let registered = auth_service::register(&state.client, &request).await?;
        println!("Registered user {}", registered.user_id);
    }
    Ok(())
}

/// Handles `logout`.
pub fn logout(state: &AppState) -> Result<()> {
    auth_service::logout(&state.client)?;
    println!("Logged out");
    Ok(())
}

/// Handles `whoami`.
pub fn whoami(state: &AppState) -> Result<()> {
    let identity = state.session.identity();
    let Some(identity) = identity.as_ref().filter(|_| state.session.is_authenticated()) else {
        println!("Not logged in");
        return Ok(());
    };

    println!("Subject:  {}", identity.subject_id);
    println!("Username: {}", identity.username);
    println!(
        "Roles:    {}",
        identity.roles.iter().cloned().collect::<Vec<_>>().join(", ")
    );
    if let Some(expires_at) = identity.expires_at {
        println!("Expires:  {}", expires_at.to_rfc3339());
    }
    println!(
        "Admin:    {}",
        if authz::can(Some(identity), Capability::AdminViews) { "yes" } else { "no" }
    );
    Ok(())
}
