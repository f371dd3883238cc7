use std::collections::HashMap;

pub(crate) const SERVICE_NAME: &str = "taskmerge";

async fn open() -> Result<oo7::Keyring, String> {
    oo7::Keyring::new()
        .await
        .map_err(|e| format!("Failed to connect to keyring: {}", e))
}

/// Store a secret in the system keyring via Secret Service, replacing any
/// previous value under the same key.
pub async fn store_secret(key: &str, label: &str, secret: &str) -> Result<(), String> {
    let keyring = open().await?;

    let mut attrs = HashMap::new();
    attrs.insert("service", SERVICE_NAME);
    attrs.insert("key", key);

    keyring
        .create_item(label, &attrs, secret.as_bytes(), true)
        .await
        .map_err(|e| format!("Failed to store secret: {}", e))?;

    Ok(())
}

/// Load a secret from the system keyring. Empty secrets read as absent.
pub async fn load_secret(key: &str) -> Result<Option<String>, String> {
    let keyring = open().await?;

    let mut attrs = HashMap::new();
    attrs.insert("service", SERVICE_NAME);
    attrs.insert("key", key);

    let items = keyring
        .search_items(&attrs)
        .await
        .map_err(|e| format!("Failed to search keyring: {}", e))?;

    if let Some(item) = items.first() {
        let secret_bytes = item
            .secret()
            .await
            .map_err(|e| format!("Failed to read secret: {}", e))?;
        let secret = String::from_utf8(secret_bytes.to_vec())
            .map_err(|e| format!("Invalid UTF-8 in secret: {}", e))?;
        if !secret.is_empty() {
            return Ok(Some(secret));
        }
    }

    Ok(None)
}

pub async fn delete_secret(key: &str) -> Result<(), String> {
    let keyring = open().await?;

    let mut attrs = HashMap::new();
    attrs.insert("service", SERVICE_NAME);
    attrs.insert("key", key);

    let items = keyring
        .search_items(&attrs)
        .await
        .map_err(|e| format!("Failed to search keyring: {}", e))?;

    for item in items {
        item.delete()
            .await
            .map_err(|e| format!("Failed to delete secret: {}", e))?;
    }

    Ok(())
}

/// Keyring key holding the Google refresh token of one identity.
pub fn refresh_token_key(email: &str) -> String {
    format!("google-refresh:{}", email.to_lowercase())
}
