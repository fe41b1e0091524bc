use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use common::crypto::{
    cipher_by_name, require_scheme, Aes256GcmCipher, CryptoError, KeyError, MlDsa44, PrivateKey,
    PublicKey, SymmetricCipher,
};
use common::error::{Categorize, ErrorKind};
use common::ledger::{JournalLedger, Ledger, LedgerError};
use common::pipeline::{Registrar, Signer, VerificationPipeline, WorkerPool};
use common::registry::{DocumentRegistry, RegistryError};
use common::storage::{ContentStore, FsContentStore, IpfsClient, StorageError, DEFAULT_IPFS_API};

pub const APP_NAME: &str = "qdv";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const REGISTRY_FILE_NAME: &str = "registry.json";
pub const LEDGER_FILE_NAME: &str = "ledger.jsonl";
pub const KEYS_DIR_NAME: &str = "keys";
pub const BLOBS_DIR_NAME: &str = "blobs";
pub const DEFAULT_KEY_NAME: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where document bytes live
    #[serde(default)]
    pub storage: StorageConfig,
    /// Scheme used for new key pairs
    #[serde(default = "default_signature_scheme")]
    pub signature_scheme: String,
    /// AEAD used for sealed documents
    #[serde(default = "default_cipher")]
    pub cipher: String,
    /// Pipelines allowed to run at once in batch mode
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Upper bound for a single pipeline job
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
}

fn default_signature_scheme() -> String {
    MlDsa44::NAME.to_string()
}

fn default_cipher() -> String {
    Aes256GcmCipher::NAME.to_string()
}

fn default_concurrency() -> usize {
    10
}

fn default_job_timeout_secs() -> u64 {
    30
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            signature_scheme: default_signature_scheme(),
            cipher: default_cipher(),
            concurrency: default_concurrency(),
            job_timeout_secs: default_job_timeout_secs(),
        }
    }
}

/// Content storage backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageConfig {
    /// IPFS node HTTP API
    Ipfs { api_url: Url },
    /// Local content-addressed directory
    Filesystem {
        /// Defaults to qdv_dir/blobs/
        path: Option<PathBuf>,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        // constant url always parses; fall back to the local store otherwise
        match Url::parse(DEFAULT_IPFS_API) {
            Ok(api_url) => StorageConfig::Ipfs { api_url },
            Err(_) => StorageConfig::Filesystem { path: None },
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the qdv directory (~/.qdv)
    pub qdv_dir: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Path to the fingerprint registry
    pub registry_path: PathBuf,
    /// Path to the ledger journal
    pub ledger_path: PathBuf,
    /// Directory holding PEM key pairs
    pub keys_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the qdv directory path (custom or default ~/.qdv)
    pub fn qdv_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    fn at(qdv_dir: PathBuf, config: AppConfig) -> Self {
        Self {
            config_path: qdv_dir.join(CONFIG_FILE_NAME),
            registry_path: qdv_dir.join(REGISTRY_FILE_NAME),
            ledger_path: qdv_dir.join(LEDGER_FILE_NAME),
            keys_path: qdv_dir.join(KEYS_DIR_NAME),
            qdv_dir,
            config,
        }
    }

    /// Initialize a new qdv state directory
    pub fn init(custom_path: Option<PathBuf>, config: AppConfig) -> Result<Self, StateError> {
        let qdv_dir = Self::qdv_dir(custom_path)?;
        let state = Self::at(qdv_dir, config);
        if state.config_path.exists() {
            return Err(StateError::AlreadyInitialized(state.qdv_dir));
        }

        // reject a config we could not use later
        require_scheme(&state.config.signature_scheme)?;
        cipher_by_name(&state.config.cipher)?;

        fs::create_dir_all(&state.keys_path)?;
        let config_toml = toml::to_string_pretty(&state.config)?;
        fs::write(&state.config_path, config_toml)?;

        Ok(state)
    }

    /// Load existing state from the qdv directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let qdv_dir = Self::qdv_dir(custom_path)?;
        let config_path = qdv_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Err(StateError::NotInitialized(qdv_dir));
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&config_toml)?;
        Ok(Self::at(qdv_dir, config))
    }

    pub fn private_key_path(&self, name: &str) -> PathBuf {
        self.keys_path.join(format!("{}.pem", name))
    }

    pub fn public_key_path(&self, name: &str) -> PathBuf {
        self.keys_path.join(format!("{}.pub.pem", name))
    }

    /// Write a key pair under `name`; the private half is readable by the owner only
    pub fn save_keypair(
        &self,
        name: &str,
        scheme: &str,
        public_key: &PublicKey,
        private_key: &PrivateKey,
    ) -> Result<(PathBuf, PathBuf), StateError> {
        let private_path = self.private_key_path(name);
        if private_path.exists() {
            return Err(StateError::KeyExists(name.to_string()));
        }
        fs::create_dir_all(&self.keys_path)?;
        write_private(&private_path, private_key.to_pem(scheme).as_bytes())?;

        let public_path = self.public_key_path(name);
        fs::write(&public_path, public_key.to_pem(scheme))?;
        Ok((public_path, private_path))
    }

    /// Load the signer stored under `name`
    pub fn load_signer(&self, name: &str) -> Result<Signer, StateError> {
        let path = self.private_key_path(name);
        if !path.exists() {
            return Err(StateError::UnknownKey(name.to_string()));
        }
        let pem = fs::read_to_string(&path)?;
        let (scheme, private_key) = PrivateKey::from_pem(&pem)?;
        let scheme = require_scheme(&scheme)?;
        Ok(Signer::new(scheme, Arc::new(private_key))?)
    }

    pub fn cipher(&self) -> Result<Arc<dyn SymmetricCipher>, StateError> {
        Ok(cipher_by_name(&self.config.cipher)?)
    }

    pub fn store(&self) -> Result<Arc<dyn ContentStore>, StateError> {
        match &self.config.storage {
            StorageConfig::Ipfs { api_url } => Ok(Arc::new(IpfsClient::new(api_url)?)),
            StorageConfig::Filesystem { path } => {
                let root = path
                    .clone()
                    .unwrap_or_else(|| self.qdv_dir.join(BLOBS_DIR_NAME));
                Ok(Arc::new(FsContentStore::open(root)?))
            }
        }
    }

    pub fn registry(&self) -> Result<DocumentRegistry, StateError> {
        Ok(DocumentRegistry::open(&self.registry_path)?)
    }

    pub async fn ledger(&self) -> Result<JournalLedger, StateError> {
        Ok(JournalLedger::open(&self.ledger_path).await?)
    }

    pub fn pool(&self) -> WorkerPool {
        WorkerPool::new(
            self.config.concurrency,
            Duration::from_secs(self.config.job_timeout_secs),
        )
    }

    /// Both pipelines over this state's store, ledger and registry
    pub async fn pipelines(&self) -> Result<(Registrar, VerificationPipeline), StateError> {
        let ledger = Arc::new(self.ledger().await?);
        self.pipelines_on(ledger)
    }

    /// Both pipelines over this state's store and registry, recording on `ledger`
    pub fn pipelines_on(
        &self,
        ledger: Arc<dyn Ledger>,
    ) -> Result<(Registrar, VerificationPipeline), StateError> {
        let store = self.store()?;
        let registry = self.registry()?;
        let cipher = self.cipher()?;

        let registrar =
            Registrar::new(store.clone(), ledger, registry.clone()).with_cipher(cipher.clone());
        let pipeline = VerificationPipeline::new(store, registry).with_cipher(cipher);
        Ok((registrar, pipeline))
    }
}

/// Read a public key PEM written by [`AppState::save_keypair`] or exported by a peer
pub fn read_public_key(path: &Path) -> Result<(String, PublicKey), StateError> {
    let pem = fs::read_to_string(path)?;
    Ok(PublicKey::from_pem(&pem)?)
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    fs::write(path, contents)
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("qdv directory {0:?} not initialized. Run 'qdv deploy' first")]
    NotInitialized(PathBuf),

    #[error("qdv directory {0:?} already initialized")]
    AlreadyInitialized(PathBuf),

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("no key named '{0}'. Run 'qdv keygen' first")]
    UnknownKey(String),

    #[error("a key named '{0}' already exists")]
    KeyExists(String),

    #[error("invalid key: {0}")]
    Key(#[from] KeyError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

impl Categorize for StateError {
    fn kind(&self) -> ErrorKind {
        match self {
            StateError::NotInitialized(_)
            | StateError::AlreadyInitialized(_)
            | StateError::NoHomeDirectory
            | StateError::KeyExists(_)
            | StateError::TomlSer(_)
            | StateError::TomlDe(_) => ErrorKind::Config,
            StateError::UnknownKey(_) => ErrorKind::NotFound,
            StateError::Key(e) => e.kind(),
            StateError::Crypto(e) => e.kind(),
            StateError::Storage(e) => e.kind(),
            StateError::Ledger(e) => e.kind(),
            StateError::Registry(e) => e.kind(),
            StateError::Io(_) => ErrorKind::Io,
        }
    }
}
