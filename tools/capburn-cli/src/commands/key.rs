//! Manage the transcription API key.

use capburn_audio::credentials::redact;
use capburn_audio::CredentialStore;
use capburn_common::config::AppConfig;

pub fn set(config: &AppConfig, value: &str) -> anyhow::Result<()> {
    let store = CredentialStore::open_default();
    store.set(&config.transcription.credential_name, value)?;
    println!("Stored {} in {}", config.transcription.credential_name, store.path().display());
    Ok(())
}

pub fn show(config: &AppConfig) -> anyhow::Result<()> {
    let store = CredentialStore::open_default();
    match store.get(&config.transcription.credential_name)? {
        Some(value) => println!("{}: {}", config.transcription.credential_name, redact(&value)),
        None => println!("{}: not set", config.transcription.credential_name),
    }
    Ok(())
}

pub fn clear(config: &AppConfig) -> anyhow::Result<()> {
    let store = CredentialStore::open_default();
    if store.clear(&config.transcription.credential_name)? {
        println!("Cleared {}", config.transcription.credential_name);
    } else {
        println!("{} was not set", config.transcription.credential_name);
    }
    Ok(())
}
