use anyhow::Result;

use securevault_client::{models::key::KeyDescriptor, state::AppState};

fn print_key(key: &KeyDescriptor) {
    println!("Label:   {}", if key.label.is_empty() { "(none)" } else { key.label.as_str() });
    println!("Active:  {}", if key.is_active { "yes" } else { "no" });
    if let Some(created_at) = key.created_at {
        println!("Created: {}", created_at.to_rfc3339());
    }
}

/// Handles `key active`.
pub async fn active(state: &AppState) -> Result<()> {
    match state.keys.fetch_active().await? {
        Some(key) => print_key(&key),
        None => println!("No active key. Run `securevault key generate` to create one."),
    }
    Ok(())
}

/// Handles `key generate`.
pub async fn generate(state: &AppState, label: Option<String>) -> Result<()> {
    state.keys.generate(label.as_deref()).await?;

    // The server retires the previous key; show its view, not ours.
    match state.keys.fetch_active().await? {
        Some(key) => print_key(&key),
        None => println!("Key generated, but the server reports no active key"),
    }
    Ok(())
}
