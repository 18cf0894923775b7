use serde::{Deserialize, Serialize};

/// How a read behaves while a write to the same key is still chained.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadConsistency {
    /// Every read waits its turn in the chain, like a write.
    StrictChain,
    /// A read that arrives while the chain's last operation is a running
    /// write is answered from that write's payload without touching the
    /// backend. In every other case the read is chained.
    #[default]
    Shadow,
}

/// Configuration for a [`KeyedSerializer`](crate::KeyedSerializer).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerializerConfig {
    /// Read-your-write strategy.
    pub read_consistency: ReadConsistency,
}

impl SerializerConfig {
    /// Configuration in which no read ever bypasses the chain.
    pub fn strict() -> Self {
        Self {
            read_consistency: ReadConsistency::StrictChain,
        }
    }
}
