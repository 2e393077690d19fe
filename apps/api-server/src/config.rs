use ai::blip::BLIPModel;
use anyhow::{anyhow, Context};
use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";
const DEFAULT_CAPTION_TIMEOUT_SECS: u64 = 120;
const DEFAULT_HISTORY_LIMIT: u32 = 20;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub local_data_dir: PathBuf,
    pub database_path: PathBuf,
    pub upload_folder: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub model_type: BLIPModel,
    pub bind_addr: SocketAddr,
    pub caption_timeout: Duration,
    pub history_default_limit: u32,
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup, `std::env` in production.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let local_data_dir = lookup("LOCAL_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data"));

        let database_path = lookup("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| local_data_dir.join("captions.db"));
        let upload_folder = lookup("UPLOAD_FOLDER")
            .map(PathBuf::from)
            .unwrap_or_else(|| local_data_dir.join("uploads"));
        let log_dir = lookup("LOCAL_LOG_DIR").map(PathBuf::from);

        let model_path = lookup("BLIP_MODEL_PATH")
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("'$BLIP_MODEL_PATH' is not set"))?;
        let tokenizer_path = lookup("BLIP_TOKENIZER_PATH")
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("'$BLIP_TOKENIZER_PATH' is not set"))?;

        let model_type = match lookup("BLIP_MODEL_TYPE") {
            Some(v) => BLIPModel::from_str(&v)
                .with_context(|| format!("invalid BLIP_MODEL_TYPE: {}", v))?,
            None => BLIPModel::Base,
        };

        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid BIND_ADDR: {}", bind_addr))?;

        let caption_timeout = Duration::from_secs(parse_or(
            &lookup,
            "CAPTION_TIMEOUT_SECS",
            DEFAULT_CAPTION_TIMEOUT_SECS,
        )?);
        let history_default_limit =
            parse_or(&lookup, "HISTORY_DEFAULT_LIMIT", DEFAULT_HISTORY_LIMIT)?;
        let max_upload_bytes = parse_or(&lookup, "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?;

        Ok(Self {
            local_data_dir,
            database_path,
            upload_folder,
            log_dir,
            model_path,
            tokenizer_path,
            model_type,
            bind_addr,
            caption_timeout,
            history_default_limit,
            max_upload_bytes,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(v) => v
            .trim()
            .parse::<T>()
            .with_context(|| format!("invalid {}: {}", key, v)),
        None => Ok(default),
    }
}
