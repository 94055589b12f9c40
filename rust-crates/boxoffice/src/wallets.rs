use crate::{
    error::PurchaseError,
    session::{
        UnlockedAccount,
        WalletProvider,
    },
};
use alloy::signers::local::PrivateKeySigner;
use eth_keystore::decrypt_key;
use rpassword::prompt_password;
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

#[derive(Clone, Debug)]
pub struct WalletDescriptor {
    pub name: String,
    pub path: PathBuf,
}

impl WalletDescriptor {
    pub fn new(name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            path,
        }
    }
}

pub fn default_wallet_dir() -> Result<PathBuf, PurchaseError> {
    let home = std::env::var("HOME")
        .map_err(|_| PurchaseError::NoWalletInstalled)?;
    Ok(PathBuf::from(home).join(".boxoffice").join("wallets"))
}

pub fn resolve_wallet_dir(dir: Option<&str>) -> Result<PathBuf, PurchaseError> {
    match dir {
        Some(raw) => {
            let expanded = shellexpand::tilde(raw);
            Ok(PathBuf::from(expanded.into_owned()))
        }
        None => default_wallet_dir(),
    }
}

/// Web3 keystore files found in the wallet directory, sorted by name.
pub fn list_wallets(dir: &Path) -> Result<Vec<WalletDescriptor>, PurchaseError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut wallets = Vec::new();
    // An unreadable directory is as good as no wallet at all.
    let entries = fs::read_dir(dir).map_err(|e| {
        tracing::warn!(dir = %dir.display(), error = %e, "wallet directory unreadable");
        PurchaseError::NoWalletInstalled
    })?;
    for entry in entries {
        let Ok(entry) = entry else {
            continue;
        };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .map(str::to_owned)
        else {
            continue;
        };
        wallets.push(WalletDescriptor::new(name, path));
    }
    wallets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(wallets)
}

/// The wallet capability backed by an eth-keystore directory; the password
/// prompt plays the part of the wallet extension's approval dialog. An
/// empty password aborts, and a failed decryption counts as the user
/// failing to authorize access.
#[derive(Clone, Debug)]
pub struct KeystoreWallet {
    dir: PathBuf,
    name: Option<String>,
}

impl KeystoreWallet {
    pub fn new(dir: PathBuf, name: Option<String>) -> Self {
        Self { dir, name }
    }

    fn pick_descriptor(&self) -> Result<WalletDescriptor, PurchaseError> {
        let wallets = list_wallets(&self.dir)?;
        if wallets.is_empty() {
            return Err(PurchaseError::NoWalletInstalled);
        }
        match &self.name {
            Some(name) => wallets
                .into_iter()
                .find(|w| &w.name == name)
                .ok_or(PurchaseError::NoWalletInstalled),
            None => Ok(wallets.into_iter().next().expect("non-empty")),
        }
    }

    fn unlock(descriptor: &WalletDescriptor) -> Result<UnlockedAccount, PurchaseError> {
        let prompt = format!(
            "Enter password for wallet '{}' (empty to cancel): ",
            descriptor.name
        );
        let password =
            prompt_password(prompt).map_err(|_| PurchaseError::UserDeclined)?;
        if password.is_empty() {
            return Err(PurchaseError::UserDeclined);
        }

        let secret = decrypt_key(&descriptor.path, password.as_bytes()).map_err(|_| {
            tracing::warn!(wallet = %descriptor.name, "keystore decryption failed");
            PurchaseError::UserDeclined
        })?;

        let signer = PrivateKeySigner::from_slice(&secret)
            .map_err(|_| PurchaseError::UserDeclined)?;
        let address = signer.address();
        Ok(UnlockedAccount { address, signer })
    }
}

impl WalletProvider for KeystoreWallet {
    async fn request_account(&self) -> Result<UnlockedAccount, PurchaseError> {
        let descriptor = self.pick_descriptor()?;
        Self::unlock(&descriptor)
    }
}
