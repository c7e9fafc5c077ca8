use super::{FetchError, Fetcher};
use async_trait::async_trait;
use govwatch_core::{
    chrono::{self, DateTime, NaiveDateTime},
    NetworkId, NewChoice, Proposal, ProposalId, Space, SpaceId, UnresolvedObservation,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::{collections::BTreeMap, time::Duration};

pub const DEFAULT_URL: &str = "https://hub.snapshot.page/api";

/// Client for the Snapshot hub REST API.
///
/// Listings are decoded record by record. A record that doesn't decode is
/// logged and left out rather than failing the whole listing.
#[derive(Clone, Debug)]
pub struct SnapshotHub {
    client: reqwest::Client,
    base_url: String,
    logger: slog::Logger,
}

#[derive(Deserialize, Debug)]
struct RawSpace {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    network: Option<Value>,
    #[serde(default)]
    symbol: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawProposal {
    #[serde(default)]
    address: Option<String>,
    msg: RawProposalMsg,
}

#[derive(Deserialize, Debug)]
struct RawProposalMsg {
    payload: RawProposalPayload,
}

#[derive(Deserialize, Debug)]
struct RawProposalPayload {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    body: Option<String>,
    start: i64,
    end: i64,
    #[serde(default)]
    choices: Option<Vec<String>>,
}

#[derive(Deserialize, Debug)]
struct RawVote {
    msg: RawVoteMsg,
}

#[derive(Deserialize, Debug)]
struct RawVoteMsg {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    payload: Value,
}

impl SnapshotHub {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        logger: slog::Logger,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            logger,
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| FetchError::Http {
                url: url.clone(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url,
                status: response.status().as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|source| FetchError::Http {
            url: url.clone(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|e| FetchError::Payload {
            url,
            reason: e.to_string(),
        })
    }

    /// Fetches an object keyed by identifier and decodes each entry on its own.
    async fn get_records<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Vec<(String, T)>, FetchError> {
        let raw: BTreeMap<String, Value> = self.get(path).await?;
        Ok(raw
            .into_iter()
            .filter_map(|(id, record)| self.decode(path, id, record))
            .collect())
    }

    fn decode<T: DeserializeOwned>(&self, path: &str, id: String, record: Value) -> Option<(String, T)> {
        match serde_json::from_value(record) {
            Ok(record) => Some((id, record)),
            Err(e) => {
                warn!(self.logger, "skipping malformed record";
                      "path" => path, "id" => id, "error" => e.to_string());
                None
            }
        }
    }

    async fn get_proposals(&self, space: &SpaceId) -> Result<Vec<(String, RawProposal)>, FetchError> {
        self.get_records(&format!("{}/proposals", space)).await
    }
}

fn network_of(raw: &Value) -> Option<NetworkId> {
    match raw {
        Value::String(network) => NetworkId::parse_known(network),
        Value::Number(network) => network.as_i64().and_then(NetworkId::known),
        _ => None,
    }
}

/// A choice is a positive ordinal, given either as a number or a decimal
/// string.
fn ordinal_of(raw: &Value) -> Option<u32> {
    let ordinal = match raw {
        Value::Number(choice) => choice.as_u64(),
        Value::String(choice) => choice.trim().parse::<u64>().ok(),
        _ => None,
    }?;
    match u32::try_from(ordinal) {
        Ok(ordinal) if ordinal > 0 => Some(ordinal),
        _ => None,
    }
}

fn timestamp(secs: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp(secs, 0).map(|time| time.naive_utc())
}

fn now() -> NaiveDateTime {
    chrono::Utc::now().naive_utc()
}

#[async_trait]
impl Fetcher for SnapshotHub {
    async fn fetch_spaces(&self) -> Result<Vec<Space>, FetchError> {
        let spaces = self.get_records::<RawSpace>("spaces").await?;
        let fetched_at = now();
        Ok(spaces
            .into_iter()
            .map(|(id, space)| Space {
                id: SpaceId::from(id),
                name: space.name.unwrap_or_default(),
                network: space.network.as_ref().and_then(network_of),
                symbol: space.symbol.unwrap_or_default(),
                created_at: fetched_at,
                watched: false,
            })
            .collect())
    }

    async fn fetch_proposals(&self, space: &SpaceId) -> Result<Vec<Proposal>, FetchError> {
        let proposals = self.get_proposals(space).await?;
        let fetched_at = now();
        Ok(proposals
            .into_iter()
            .filter_map(|(id, proposal)| {
                let RawProposalPayload {
                    name,
                    body,
                    start,
                    end,
                    ..
                } = proposal.msg.payload;
                let (start, end) = match (timestamp(start), timestamp(end)) {
                    (Some(start), Some(end)) => (start, end),
                    _ => {
                        warn!(self.logger, "skipping proposal with an invalid voting window";
                              "space" => space.as_str(), "id" => id, "start" => start, "end" => end);
                        return None;
                    }
                };
                Some(Proposal {
                    id: ProposalId::from(id),
                    space: space.clone(),
                    address: proposal.address.unwrap_or_default(),
                    start,
                    end,
                    name: name.unwrap_or_default(),
                    body: body.unwrap_or_default(),
                    created_at: fetched_at,
                    watched: false,
                })
            })
            .collect())
    }

    async fn fetch_choices(
        &self,
        proposal: &ProposalId,
        space: &SpaceId,
    ) -> Result<Vec<NewChoice>, FetchError> {
        let proposals = self.get_proposals(space).await?;
        Ok(proposals
            .into_iter()
            .find(|(id, _)| id == proposal.as_str())
            .and_then(|(_, proposal)| proposal.msg.payload.choices)
            .map(NewChoice::from_declarations)
            .unwrap_or_default())
    }

    async fn fetch_vote_observations(
        &self,
        proposal: &ProposalId,
        space: &SpaceId,
    ) -> Result<Vec<UnresolvedObservation>, FetchError> {
        let votes = self
            .get_records::<RawVote>(&format!("{}/proposal/{}", space, proposal))
            .await?;
        let ordinals = votes
            .into_iter()
            .map(|(_, vote)| vote.msg)
            .filter(|msg| msg.kind.as_deref() == Some("vote"))
            .filter_map(|msg| msg.payload.get("choice").and_then(ordinal_of));
        Ok(UnresolvedObservation::count_votes(ordinals))
    }
}
