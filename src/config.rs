//! Client configuration.
//!
//! A [`DispatchConfig`] value is built once and handed to every protocol
//! component through [`crate::context::DispatchContext`]. There is no
//! process-wide "current cluster".

use crate::constants::DEFAULT_MAX_ATTEMPTS;
use crate::error::{DispatchError, Result};
use crate::ledger::Commitment;
use crate::pubkey::Pubkey;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable selecting the cluster.
pub const ENV_CLUSTER: &str = "DISPATCH_CLUSTER";
/// Environment variable overriding the RPC endpoint.
pub const ENV_RPC_URL: &str = "DISPATCH_RPC_URL";
/// Environment variable pointing at the wallet key file.
pub const ENV_WALLET_FILE: &str = "DISPATCH_WALLET_FILE";

const MESSAGING_PROGRAM: &str = "BHJ4tRcogS88tUhYotPfYWDjR4q7MGdizdiguY3N54rb";
const POSTBOX_PROGRAM: &str = "Fg6PaFpoGXkYsidMpWTK6W2BeZ7FEfcYkg476zPFsLnS";
const DEVNET_TREASURY: &str = "G2GGDc89qpuk21WgRUVPDY517uc6qR5yT4KX7AakyVR1";
const MAINNET_TREASURY: &str = "5MNBoBJDHHG4pB6qtWgYPzGEncoYTLAaANovvoaxu28p";

/// Ledger cluster the client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Cluster {
    /// Production cluster.
    MainnetBeta,
    /// Public development cluster.
    #[default]
    Devnet,
    /// Public test cluster.
    Testnet,
    /// Local validator.
    Localnet,
}

impl Cluster {
    /// Returns the canonical cluster name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Cluster::MainnetBeta => "mainnet-beta",
            Cluster::Devnet => "devnet",
            Cluster::Testnet => "testnet",
            Cluster::Localnet => "localnet",
        }
    }

    /// Returns the public RPC endpoint for this cluster.
    pub fn default_rpc_url(&self) -> &'static str {
        match self {
            Cluster::MainnetBeta => "https://api.mainnet-beta.solana.com",
            Cluster::Devnet => "https://api.devnet.solana.com",
            Cluster::Testnet => "https://api.testnet.solana.com",
            Cluster::Localnet => "http://127.0.0.1:8899",
        }
    }
}

impl fmt::Display for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cluster {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mainnet-beta" | "mainnet" => Ok(Cluster::MainnetBeta),
            "devnet" => Ok(Cluster::Devnet),
            "testnet" => Ok(Cluster::Testnet),
            "localnet" | "localhost" => Ok(Cluster::Localnet),
            other => Err(DispatchError::config(format!(
                "Unknown cluster '{}' (expected mainnet-beta, devnet, testnet or localnet)",
                other
            ))),
        }
    }
}

/// Program ids and fee destination for one cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterAddresses {
    /// Messaging (mailbox) program.
    pub messaging_program: Pubkey,
    /// Postbox (forum) program.
    pub postbox_program: Pubkey,
    /// Treasury that collects protocol fees.
    pub treasury: Pubkey,
}

impl ClusterAddresses {
    /// Returns the well-known addresses for a cluster.
    pub fn for_cluster(cluster: Cluster) -> Result<Self> {
        let treasury = match cluster {
            Cluster::MainnetBeta => MAINNET_TREASURY,
            Cluster::Devnet | Cluster::Testnet | Cluster::Localnet => DEVNET_TREASURY,
        };
        Ok(Self {
            messaging_program: MESSAGING_PROGRAM.parse()?,
            postbox_program: POSTBOX_PROGRAM.parse()?,
            treasury: treasury.parse()?,
        })
    }
}

/// Bounded retry for transient submission failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    /// Retries without sleeping between attempts.
    pub fn immediate() -> Self {
        Self {
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << exp);
        delay.min(self.max_delay)
    }
}

/// Sharded post-id allocation settings.
///
/// Only obtainable through [`BucketConfig::new`], so every value has at
/// least one bucket of at least one slot and an id space that fits in `u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketConfig {
    num_buckets: u32,
    posts_per_bucket: u32,
}

impl BucketConfig {
    /// Creates a bucket configuration, rejecting empty shapes.
    pub fn new(num_buckets: u32, posts_per_bucket: u32) -> Result<Self> {
        if num_buckets == 0 || posts_per_bucket == 0 {
            return Err(DispatchError::config(
                "Bucket count and bucket capacity must both be non-zero",
            ));
        }
        num_buckets
            .checked_mul(posts_per_bucket)
            .and_then(|n| n.checked_add(posts_per_bucket))
            .ok_or_else(|| DispatchError::config("Bucketed id space overflows u32"))?;
        Ok(Self {
            num_buckets,
            posts_per_bucket,
        })
    }

    /// Number of buckets the id space is split into.
    pub fn num_buckets(&self) -> u32 {
        self.num_buckets
    }

    /// Slots per bucket.
    pub fn posts_per_bucket(&self) -> u32 {
        self.posts_per_bucket
    }
}

/// Top-level client configuration.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Target cluster.
    pub cluster: Cluster,
    /// JSON-RPC endpoint.
    pub rpc_url: String,
    /// Wallet key file used by the CLI.
    pub wallet_path: PathBuf,
    /// Retry policy for transient failures.
    pub retry: RetryPolicy,
    /// Commitment level awaited after submission.
    pub commitment: Commitment,
    /// Enables sharded post allocation when set.
    pub buckets: Option<BucketConfig>,
}

impl DispatchConfig {
    /// Creates a configuration for a cluster with default settings.
    pub fn new(cluster: Cluster) -> Self {
        Self {
            cluster,
            rpc_url: cluster.default_rpc_url().to_string(),
            wallet_path: default_wallet_path(),
            retry: RetryPolicy::default(),
            commitment: Commitment::Confirmed,
            buckets: None,
        }
    }

    /// Builds a configuration from `DISPATCH_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let cluster = match std::env::var(ENV_CLUSTER) {
            Ok(name) => name.parse()?,
            Err(_) => Cluster::default(),
        };
        let mut config = Self::new(cluster);
        if let Ok(url) = std::env::var(ENV_RPC_URL) {
            config.rpc_url = url;
        }
        if let Ok(path) = std::env::var(ENV_WALLET_FILE) {
            config.wallet_path = PathBuf::from(path);
        }
        Ok(config)
    }

    /// Switches the cluster, resetting the RPC endpoint to its default.
    pub fn with_cluster(mut self, cluster: Cluster) -> Self {
        self.cluster = cluster;
        self.rpc_url = cluster.default_rpc_url().to_string();
        self
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Enables bucketed post allocation.
    pub fn with_buckets(mut self, buckets: BucketConfig) -> Self {
        self.buckets = Some(buckets);
        self
    }

    /// Returns the program and treasury addresses for the configured cluster.
    pub fn addresses(&self) -> Result<ClusterAddresses> {
        ClusterAddresses::for_cluster(self.cluster)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self::new(Cluster::default())
    }
}

fn default_wallet_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("solana")
        .join("id.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_config_rejects_invalid_shapes() {
        assert!(BucketConfig::new(0, 10).is_err());
        assert!(BucketConfig::new(10, 0).is_err());
        assert!(BucketConfig::new(0, 0).is_err());
        assert!(BucketConfig::new(u32::MAX, 2).is_err());
        assert!(BucketConfig::new(2, u32::MAX / 2).is_err());

        let config = BucketConfig::new(4, 16).unwrap();
        assert_eq!(config.num_buckets(), 4);
        assert_eq!(config.posts_per_bucket(), 16);
    }

    #[test]
    fn test_cluster_parse() {
        assert_eq!("mainnet-beta".parse::<Cluster>().unwrap(), Cluster::MainnetBeta);
        assert_eq!("devnet".parse::<Cluster>().unwrap(), Cluster::Devnet);
        assert_eq!("testnet".parse::<Cluster>().unwrap(), Cluster::Testnet);
        assert!("moon".parse::<Cluster>().is_err());
    }

    #[test]
    fn test_treasury_per_cluster() {
        let main = ClusterAddresses::for_cluster(Cluster::MainnetBeta).unwrap();
        let dev = ClusterAddresses::for_cluster(Cluster::Devnet).unwrap();
        let test = ClusterAddresses::for_cluster(Cluster::Testnet).unwrap();
        assert_ne!(main.treasury, dev.treasury);
        assert_eq!(dev.treasury, test.treasury);
        assert_eq!(main.messaging_program, dev.messaging_program);
    }

    #[test]
    fn test_retry_backoff_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_millis(250));
        assert_eq!(policy.delay_after(2), Duration::from_millis(500));
        assert_eq!(policy.delay_after(10), Duration::from_secs(4));
        assert_eq!(RetryPolicy::immediate().delay_after(5), Duration::ZERO);
    }

    #[test]
    fn test_default_wallet_path() {
        let config = DispatchConfig::default();
        assert!(config.wallet_path.ends_with(".config/solana/id.json"));
        assert_eq!(config.retry.max_attempts, 6);
    }
}
