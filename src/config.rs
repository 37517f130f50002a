//! Configuration management
//!
//! Run parameters come from a param file (JSON, or TOML when the path ends
//! in `.toml`). `.env` is loaded first so `RUST_LOG` and `PROVIDER_URL`
//! can be set there; `PROVIDER_URL` overrides whatever provider the file
//! names.
//!
//! Number fields accept numbers or numeric strings (`"0.5"`). Singular
//! `fromPrivateKey` / `fromPublicKey` are merged into the plural lists and
//! the lists are de-duplicated by value.

use alloy::primitives::Address;
use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const PROVIDER_URL_ENV: &str = "PROVIDER_URL";

pub const DEFAULT_FEE_CAP_GWEI: u32 = 60;
pub const DEFAULT_MINT_GAS_LIMIT: u64 = 200_000;
pub const DEFAULT_WARMUP_MILLIS: u64 = 3_000;
pub const DEFAULT_FLUSH_INTERVAL_MILLIS: u64 = 100;

/// Load `.env` into the process environment if present.
pub fn load_env() {
    dotenv::dotenv().ok();
}

// ── Provider ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "tpe")]
pub enum ProviderParams {
    #[serde(rename = "InfuraProviderParams")]
    Infura {
        network: String,
        #[serde(rename = "projectId")]
        project_id: String,
        #[serde(default)]
        websocket: bool,
    },
    #[serde(rename = "RpcProviderParams")]
    Rpc {
        url: String,
        #[serde(default)]
        network: Option<String>,
    },
    #[serde(rename = "WsProviderParams")]
    Ws { url: String },
}

impl ProviderParams {
    pub fn url(&self) -> String {
        match self {
            ProviderParams::Infura {
                network,
                project_id,
                websocket,
            } => {
                let network = match network.as_str() {
                    "homestead" => "mainnet",
                    other => other,
                };
                if *websocket {
                    format!("wss://{}.infura.io/ws/v3/{}", network, project_id)
                } else {
                    format!("https://{}.infura.io/v3/{}", network, project_id)
                }
            }
            ProviderParams::Rpc { url, .. } | ProviderParams::Ws { url } => url.clone(),
        }
    }

    /// Endpoint to connect to, honouring `PROVIDER_URL`.
    pub fn resolved_url(&self) -> String {
        std::env::var(PROVIDER_URL_ENV)
            .ok()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| self.url())
    }
}

// ── Lenient numbers ─────────────────────────────────────────────────

mod lenient {
    use rust_decimal::prelude::ToPrimitive;
    use rust_decimal::Decimal;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};
    use std::str::FromStr;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Int(i64),
        Float(f64),
        Str(String),
    }

    fn to_decimal(raw: NumberOrString) -> Result<Decimal, String> {
        match raw {
            NumberOrString::Int(i) => Ok(Decimal::from(i)),
            NumberOrString::Float(f) => {
                Decimal::from_str(&f.to_string()).map_err(|e| format!("{}: {}", f, e))
            }
            NumberOrString::Str(s) => {
                Decimal::from_str(s.trim()).map_err(|e| format!("{:?}: {}", s, e))
            }
        }
    }

    pub fn decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<NumberOrString>::deserialize(deserializer)?
            .map(to_decimal)
            .transpose()
            .map_err(D::Error::custom)
    }

    pub fn count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(value) = decimal(deserializer)? else {
            return Ok(None);
        };
        if !value.fract().is_zero() {
            return Err(D::Error::custom(format!("expected a whole number, got {}", value)));
        }
        value
            .to_u64()
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("expected a non-negative count, got {}", value)))
    }
}

// ── Wallet references ───────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRefs {
    #[serde(default)]
    from_private_key: Option<String>,
    #[serde(default)]
    from_private_keys: Vec<String>,
    #[serde(default)]
    from_public_key: Option<String>,
    #[serde(default)]
    from_public_keys: Vec<String>,
}

impl KeyRefs {
    pub fn new(private_keys: Vec<String>, public_keys: Vec<String>) -> Self {
        let mut refs = Self {
            from_private_keys: private_keys,
            from_public_keys: public_keys,
            ..Default::default()
        };
        refs.normalize();
        refs
    }

    /// Merge singular keys into the lists and drop duplicates, first
    /// occurrence wins.
    pub fn normalize(&mut self) {
        if let Some(key) = self.from_private_key.take() {
            self.from_private_keys.push(key);
        }
        if let Some(key) = self.from_public_key.take() {
            self.from_public_keys.push(key);
        }
        dedupe(&mut self.from_private_keys);
        dedupe(&mut self.from_public_keys);
    }

    pub fn private_keys(&self) -> &[String] {
        &self.from_private_keys
    }

    pub fn public_keys(&self) -> &[String] {
        &self.from_public_keys
    }
}

fn dedupe(keys: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    keys.retain(|k| seen.insert(k.clone()));
}

// ── Transfer params ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub from_at_least_balance: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub from_should_remain_balance: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub should_send_at_least: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub should_send_at_most: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub should_send_exactly: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub to_should_remain_balance_at_most: Option<Decimal>,
    #[serde(default, alias = "bufferHopCount", deserialize_with = "lenient::count")]
    pub buffers_count: Option<u64>,
    pub to_address: Address,
    #[serde(flatten)]
    pub keys: KeyRefs,
}

impl TransferRequest {
    pub fn buffer_hops(&self) -> usize {
        self.buffers_count.unwrap_or(0) as usize
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferParams {
    #[serde(default)]
    pub provider_params: Option<ProviderParams>,
    /// Older files name only an Infura project on mainnet.
    #[serde(default)]
    pub infura_project_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub max_fee_per_gas_gwei: Option<Decimal>,
    pub transfers: Vec<TransferRequest>,
}

impl TransferParams {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut params: Self = load_file(path)?;
        for transfer in &mut params.transfers {
            transfer.keys.normalize();
        }
        Ok(params)
    }

    pub fn provider(&self) -> Result<ProviderParams> {
        if let Some(provider) = &self.provider_params {
            return Ok(provider.clone());
        }
        match &self.infura_project_id {
            Some(project_id) => Ok(ProviderParams::Infura {
                network: "mainnet".to_string(),
                project_id: project_id.clone(),
                websocket: false,
            }),
            None => bail!("either providerParams or infuraProjectId is required"),
        }
    }

    pub fn fee_cap_gwei(&self) -> Decimal {
        self.max_fee_per_gas_gwei
            .unwrap_or_else(|| Decimal::from(DEFAULT_FEE_CAP_GWEI))
    }
}

// ── Mint params ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintTask {
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub from_at_least_balance: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub from_should_remain_balance: Option<Decimal>,
    #[serde(default, alias = "shouldSendAtLeast", deserialize_with = "lenient::count")]
    pub should_mint_at_least: Option<u64>,
    #[serde(default, alias = "shouldSendAtMost", deserialize_with = "lenient::count")]
    pub should_mint_at_most: Option<u64>,
    #[serde(default, alias = "shouldSendExactly", deserialize_with = "lenient::count")]
    pub should_mint_exactly: Option<u64>,
    #[serde(flatten)]
    pub keys: KeyRefs,
}

fn default_mint_signature() -> String {
    "mint(uint256)".to_string()
}

fn default_watch_signatures() -> Vec<String> {
    vec!["devMint(uint256)".to_string(), "mint(uint32,uint32)".to_string()]
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintParams {
    pub provider_params: ProviderParams,
    pub contract_address: Address,
    /// Method we call; one `uint256` quantity argument.
    #[serde(default = "default_mint_signature")]
    pub mint_signature: String,
    /// Methods whose pending calls count as challengers.
    #[serde(default = "default_watch_signatures")]
    pub watch_signatures: Vec<String>,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub mint_price_eth: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient::count")]
    pub mint_gas_limit: Option<u64>,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub max_fee_per_gas_gwei: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub max_priority_fee_per_gas_gwei: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub outbid_gwei: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient::count")]
    pub warmup_millis: Option<u64>,
    #[serde(default, deserialize_with = "lenient::count")]
    pub flush_interval_millis: Option<u64>,
    pub mints: Vec<MintTask>,
}

impl MintParams {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut params: Self = load_file(path)?;
        for mint in &mut params.mints {
            mint.keys.normalize();
        }
        Ok(params)
    }

    pub fn fee_cap_gwei(&self) -> Decimal {
        self.max_fee_per_gas_gwei
            .unwrap_or_else(|| Decimal::from(DEFAULT_FEE_CAP_GWEI))
    }

    pub fn gas_limit(&self) -> u64 {
        self.mint_gas_limit.unwrap_or(DEFAULT_MINT_GAS_LIMIT)
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_millis.unwrap_or(DEFAULT_WARMUP_MILLIS))
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_millis.unwrap_or(DEFAULT_FLUSH_INTERVAL_MILLIS))
    }
}

/// Parse a param file, choosing TOML or JSON by extension.
pub fn load_file<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read params file: {}", path.display()))?;

    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);

    if is_toml {
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML params: {}", path.display()))
    } else {
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON params: {}", path.display()))
    }
}
