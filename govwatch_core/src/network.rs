use serde::{Deserialize, Serialize};

/// Chain identifier a space is deployed on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres-types", derive(postgres_types::ToSql, postgres_types::FromSql))]
#[cfg_attr(feature = "postgres-types", postgres(transparent))]
#[serde(transparent)]
pub struct NetworkId(i32);

/// The chains the store knows about. Seeded once and never updated.
pub const KNOWN_NETWORKS: &[(i32, &str)] = &[
    (1, "Ethereum mainnet"),
    (56, "Binance smart chain"),
    (4, "Ethereum Rinkeby"),
    (100, "xDai"),
    (42, "Ethereum Kovan"),
    (7, "ThaiChain"),
    (61, "Ethereum Classic mainnet"),
    (97, "Binance smart chain testnet"),
    (137, "Matic Mainnet"),
    (420, "Optimistic Ethereum"),
    (32659, "Fusion mainnet"),
    (80001, "Matic Mumbai"),
];

impl NetworkId {
    pub fn as_i32(&self) -> i32 {
        self.0
    }

    /// Looks up a chain id in [`KNOWN_NETWORKS`].
    pub fn known(id: i64) -> Option<NetworkId> {
        KNOWN_NETWORKS
            .iter()
            .find(|(known, _)| i64::from(*known) == id)
            .map(|(known, _)| NetworkId(*known))
    }

    /// Interprets the network field of a remote payload, which is usually a
    /// decimal string.
    pub fn parse_known(raw: &str) -> Option<NetworkId> {
        raw.trim().parse::<i64>().ok().and_then(NetworkId::known)
    }
}

impl core::fmt::Display for NetworkId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub id: NetworkId,
    pub name: String,
}

impl Network {
    pub fn known() -> Vec<Network> {
        KNOWN_NETWORKS
            .iter()
            .map(|(id, name)| Network {
                id: NetworkId(*id),
                name: name.to_string(),
            })
            .collect()
    }
}
