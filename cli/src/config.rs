use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;
use tracing::{info, warn};

pub const ENV_SUPABASE_URL: &str = "INTAKE_SUPABASE_URL";
pub const ENV_SUPABASE_ANON_KEY: &str = "INTAKE_SUPABASE_ANON_KEY";
pub const ENV_ACCESS_TOKEN: &str = "INTAKE_ACCESS_TOKEN";
pub const ENV_USER_ID: &str = "INTAKE_USER_ID";

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
    pub remote: Option<RemoteSettings>,
}

/// Connection details for the hosted backend. All four values are required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSettings {
    pub url: String,
    pub anon_key: String,
    pub access_token: String,
    pub user_id: String,
}

impl RemoteSettings {
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from a variable lookup. Missing or blank values disable sync.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let url = get(ENV_SUPABASE_URL)?;
        let required = [ENV_SUPABASE_ANON_KEY, ENV_ACCESS_TOKEN, ENV_USER_ID];
        let missing: Vec<&str> = required.iter().copied().filter(|&n| get(n).is_none()).collect();
        if !missing.is_empty() {
            warn!(
                missing = %missing.join(", "),
                "{ENV_SUPABASE_URL} is set but sync is disabled"
            );
            return None;
        }

        let settings = Self {
            url: url.trim_end_matches('/').to_string(),
            anon_key: get(ENV_SUPABASE_ANON_KEY)?,
            access_token: get(ENV_ACCESS_TOKEN)?,
            user_id: get(ENV_USER_ID)?,
        };
        info!(url = %settings.url, user_id = %settings.user_id, "remote sync enabled");
        Some(settings)
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "intake").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let db_path = data_dir.join("intake.db");

        Ok(Config {
            db_path,
            data_dir,
            remote: RemoteSettings::from_env(),
        })
    }

    /// The backend user id, if sync is configured.
    pub fn owner(&self) -> Option<String> {
        self.remote.as_ref().map(|r| r.user_id.clone())
    }

    /// Load the API key from disk, or generate a new one.
    ///
    /// Returns `(key, newly_created)`.
    pub fn load_or_create_api_key(&self) -> Result<(String, bool)> {
        use rand::Rng;
        use std::fmt::Write;

        let path = self.data_dir.join("api_key");

        if path.exists() {
            let key = std::fs::read_to_string(&path).context("Failed to read API key file")?;
            let key = key.trim().to_string();
            if !key.is_empty() {
                return Ok((key, false));
            }
        }

        let bytes: [u8; 32] = rand::rng().random();
        let key = bytes
            .iter()
            .fold(String::with_capacity(64), |mut acc: String, b| {
                let _ = write!(acc, "{b:02x}");
                acc
            });
        std::fs::write(&path, &key).context("Failed to write API key file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to set API key file permissions")?;
        }
        info!(path = %path.display(), "generated API key");
        eprintln!("Generated new API key: {key}");
        eprintln!("Include in requests: Authorization: Bearer {key}");
        Ok((key, true))
    }
}
