use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use chordkv_core::consistency::QuorumConfig;
use chordkv_core::consts::DEFAULT_ID_BITS;
use chordkv_core::consts::DEFAULT_JOIN_RETRIES;
use chordkv_core::consts::DEFAULT_READ_QUORUM;
use chordkv_core::consts::DEFAULT_REPLICAS;
use chordkv_core::consts::DEFAULT_RPC_TIMEOUT_MS;
use chordkv_core::consts::DEFAULT_STABILIZE_INTERVAL_SECS;
use chordkv_core::consts::DEFAULT_WRITE_QUORUM;
use chordkv_core::dht::IdSpace;
use chordkv_core::dht::NodeId;
use chordkv_core::dht::Routing;
use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;
use crate::error::Result;
use crate::util::ensure_parent_dir;
use crate::util::expand_home;

lazy_static::lazy_static! {
  static ref DEFAULT_DATA_STORAGE_CONFIG: StorageConfig = StorageConfig {
    path: get_storage_location(".chordkv", "data"),
    capacity: DEFAULT_STORAGE_CAPACITY,
  };
}

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:7000";
pub const DEFAULT_STORAGE_CAPACITY: u32 = 200000000;

pub fn get_storage_location<P>(prefix: P, path: P) -> String
where P: AsRef<std::path::Path> {
    let home_dir = env::var_os("HOME").map(PathBuf::from);
    let expect = match home_dir {
        Some(dir) => dir.join(prefix).join(path),
        None => std::path::Path::new("data").join(prefix).join(path),
    };
    expect.to_string_lossy().to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Address the TCP listener binds to.
    pub bind_addr: String,
    /// Address other nodes use to reach this one, when it differs from `bind_addr`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advertise_addr: Option<String>,
    /// Pinned ring id. The hash of the advertised address is used otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap: Option<String>,
    #[serde(default = "default_id_bits")]
    pub id_bits: u8,
    #[serde(default = "default_replicas")]
    pub replicas: u8,
    #[serde(default = "default_read_quorum")]
    pub read_quorum: u8,
    #[serde(default = "default_write_quorum")]
    pub write_quorum: u8,
    /// Seconds between two stabilization ticks.
    #[serde(default = "default_stabilize_interval")]
    pub stabilize_interval: u64,
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,
    #[serde(default = "default_join_retries")]
    pub join_retries: u8,
    #[serde(default)]
    pub routing: Routing,
    pub data_storage: StorageConfig,
}

fn default_id_bits() -> u8 {
    DEFAULT_ID_BITS
}

fn default_replicas() -> u8 {
    DEFAULT_REPLICAS
}

fn default_read_quorum() -> u8 {
    DEFAULT_READ_QUORUM
}

fn default_write_quorum() -> u8 {
    DEFAULT_WRITE_QUORUM
}

fn default_stabilize_interval() -> u64 {
    DEFAULT_STABILIZE_INTERVAL_SECS
}

fn default_rpc_timeout_ms() -> u64 {
    DEFAULT_RPC_TIMEOUT_MS
}

fn default_join_retries() -> u8 {
    DEFAULT_JOIN_RETRIES
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            advertise_addr: None,
            node_id: None,
            bootstrap: None,
            id_bits: DEFAULT_ID_BITS,
            replicas: DEFAULT_REPLICAS,
            read_quorum: DEFAULT_READ_QUORUM,
            write_quorum: DEFAULT_WRITE_QUORUM,
            stabilize_interval: DEFAULT_STABILIZE_INTERVAL_SECS,
            rpc_timeout_ms: DEFAULT_RPC_TIMEOUT_MS,
            join_retries: DEFAULT_JOIN_RETRIES,
            routing: Routing::default(),
            data_storage: DEFAULT_DATA_STORAGE_CONFIG.clone(),
        }
    }
}

impl Config {
    /// The address this node announces to the ring.
    pub fn address(&self) -> &str {
        self.advertise_addr.as_deref().unwrap_or(&self.bind_addr)
    }

    pub fn space(&self) -> Result<IdSpace> {
        IdSpace::new(self.id_bits).map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    pub fn node_id(&self) -> Result<Option<NodeId>> {
        let Some(id) = self.node_id else {
            return Ok(None);
        };
        let space = self.space()?;
        if space.id(id).as_u64() != id {
            return Err(Error::InvalidConfig(format!(
                "node_id {} does not fit in {} bits",
                id, self.id_bits
            )));
        }
        Ok(Some(NodeId::new(id)))
    }

    pub fn quorum(&self) -> Result<QuorumConfig> {
        QuorumConfig::new(self.replicas, self.read_quorum, self.write_quorum)
            .map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    pub fn stabilize_interval(&self) -> Duration {
        Duration::from_secs(self.stabilize_interval)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    /// Reject values the node cannot start with.
    pub fn validate(&self) -> Result<()> {
        self.space()?;
        self.node_id()?;
        self.quorum()?;
        if self.stabilize_interval == 0 {
            return Err(Error::InvalidConfig(
                "stabilize_interval must be positive".to_string(),
            ));
        }
        if self.rpc_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "rpc_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn write_fs<P>(&self, path: P) -> Result<String>
    where P: AsRef<std::path::Path> {
        let path = expand_home(path)?;
        ensure_parent_dir(&path)?;
        let f =
            fs::File::create(path.as_path()).map_err(|e| Error::CreateFileError(e.to_string()))?;
        let f_writer = io::BufWriter::new(f);
        serde_yaml::to_writer(f_writer, self).map_err(|_| Error::EncodeError)?;
        Ok(path.to_string_lossy().to_string())
    }

    pub fn read_fs<P>(path: P) -> Result<Config>
    where P: AsRef<std::path::Path> {
        let path = expand_home(path)?;
        tracing::debug!("Read config from: {:?}", path);
        let f = fs::File::open(path).map_err(|e| Error::OpenFileError(e.to_string()))?;
        let f_rdr = io::BufReader::new(f);
        Ok(serde_yaml::from_reader(f_rdr)?)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub path: String,
    pub capacity: u32,
}

impl StorageConfig {
    pub fn new(path: &str, capacity: u32) -> Self {
        Self {
            path: path.to_string(),
            capacity,
        }
    }
}
