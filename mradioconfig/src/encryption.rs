//! Chiffrement des secrets stockés dans la configuration
//!
//! Le mot de passe source du relais peut être écrit en clair dans
//! `config.yaml` ou sous la forme `encrypted:BASE64`. La clé AES-256-GCM est
//! dérivée de l'identifiant de la machine : un fichier de configuration
//! chiffré n'est donc lisible que sur la machine qui l'a produit.
//!
//! Format encodé : `nonce (12 octets) || ciphertext`, encodé en base64.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use sha2::{Digest, Sha256};

const SEALED_PREFIX: &str = "encrypted:";

const KEY_SALT: &[u8] = b"mradio-config-encryption-v1";
const NONCE_SALT: &[u8] = b"mradio-nonce-v1";
const NONCE_LEN: usize = 12;

/// Identifiant stable de la machine
///
/// Linux : `/etc/machine-id` puis `/var/lib/dbus/machine-id`.
/// macOS : `IOPlatformUUID` via `ioreg`.
fn machine_id() -> Result<String> {
    #[cfg(target_os = "linux")]
    {
        for candidate in ["/etc/machine-id", "/var/lib/dbus/machine-id"] {
            if let Ok(id) = std::fs::read_to_string(candidate) {
                let id = id.trim();
                if !id.is_empty() {
                    return Ok(id.to_string());
                }
            }
        }
        Err(anyhow!("No machine-id file found"))
    }

    #[cfg(target_os = "macos")]
    {
        let output = std::process::Command::new("ioreg")
            .args(["-d2", "-c", "IOPlatformExpertDevice"])
            .output()?;
        let text = String::from_utf8_lossy(&output.stdout);

        // "IOPlatformUUID" = "XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX"
        text.lines()
            .find(|line| line.contains("IOPlatformUUID"))
            .and_then(|line| line.split('"').nth(3))
            .map(str::to_string)
            .ok_or_else(|| anyhow!("IOPlatformUUID not found in ioreg output"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        Err(anyhow!("Machine id lookup is not supported on this platform"))
    }
}

fn cipher() -> Result<Aes256Gcm> {
    let key = Sha256::new()
        .chain_update(machine_id()?.as_bytes())
        .chain_update(KEY_SALT)
        .finalize();
    Aes256Gcm::new_from_slice(&key).map_err(|e| anyhow!("Invalid cipher key: {}", e))
}

/// Chiffre un secret et retourne `encrypted:BASE64`
///
/// Le nonce est dérivé du secret : sceller deux fois la même valeur
/// produit la même chaîne, ce qui évite de réécrire la configuration
/// inutilement.
pub fn seal(secret: &str) -> Result<String> {
    let nonce = Sha256::new()
        .chain_update(secret.as_bytes())
        .chain_update(NONCE_SALT)
        .finalize();
    let nonce = &nonce[..NONCE_LEN];

    let sealed = cipher()?
        .encrypt(Nonce::from_slice(nonce), secret.as_bytes())
        .map_err(|e| anyhow!("Cannot seal secret: {}", e))?;

    let payload = [nonce, sealed.as_slice()].concat();
    Ok(format!("{}{}", SEALED_PREFIX, BASE64.encode(payload)))
}

/// Ouvre une valeur `encrypted:BASE64`
///
/// Échoue si le préfixe manque, si le base64 ou la longueur sont invalides,
/// ou si la clé diffère (configuration copiée depuis une autre machine).
pub fn unseal(value: &str) -> Result<String> {
    let encoded = value
        .strip_prefix(SEALED_PREFIX)
        .ok_or_else(|| anyhow!("Sealed value must start with '{}'", SEALED_PREFIX))?;
    let payload = BASE64
        .decode(encoded)
        .map_err(|e| anyhow!("Sealed value is not base64: {}", e))?;
    if payload.len() <= NONCE_LEN {
        bail!("Sealed value is truncated");
    }

    let (nonce, sealed) = payload.split_at(NONCE_LEN);
    let clear = cipher()?
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| anyhow!("Cannot unseal secret (other machine or corrupted value)"))?;
    String::from_utf8(clear).context("Unsealed secret is not UTF-8")
}

pub fn is_sealed(value: &str) -> bool {
    value.starts_with(SEALED_PREFIX)
}

/// Valeur en clair d'un secret de configuration, scellé ou non
pub fn reveal(value: &str) -> Result<String> {
    if is_sealed(value) {
        unseal(value)
    } else {
        Ok(value.to_string())
    }
}
