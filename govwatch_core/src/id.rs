use serde::{Deserialize, Serialize};

/// Identifier of a space as assigned by the remote source.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres-types", derive(postgres_types::ToSql, postgres_types::FromSql))]
#[cfg_attr(feature = "postgres-types", postgres(transparent))]
#[serde(transparent)]
pub struct SpaceId(String);

/// Identifier of a proposal as assigned by the remote source.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres-types", derive(postgres_types::ToSql, postgres_types::FromSql))]
#[cfg_attr(feature = "postgres-types", postgres(transparent))]
#[serde(transparent)]
pub struct ProposalId(String);

/// Locally assigned identifier of a proposal choice. The remote source only
/// knows choices by their position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres-types", derive(postgres_types::ToSql, postgres_types::FromSql))]
#[cfg_attr(feature = "postgres-types", postgres(transparent))]
#[serde(transparent)]
pub struct ChoiceId(i64);

/// Locally assigned identifier of a tally row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres-types", derive(postgres_types::ToSql, postgres_types::FromSql))]
#[cfg_attr(feature = "postgres-types", postgres(transparent))]
#[serde(transparent)]
pub struct TallyId(i64);

crate::impl_string_id!(SpaceId);
crate::impl_string_id!(ProposalId);
crate::impl_serial_id!(ChoiceId);
crate::impl_serial_id!(TallyId);

#[cfg(test)]
mod test {
    use super::*;
    use core::str::FromStr;

    #[test]
    fn string_ids_display_verbatim() {
        let id = SpaceId::from_str("yam.eth").unwrap();
        assert_eq!(id.to_string(), "yam.eth");
        assert_eq!(id, SpaceId::new("yam.eth"));
        assert_eq!(ProposalId::from("QmXyz").as_str(), "QmXyz");
    }

    #[test]
    fn serial_ids_order_by_value() {
        assert!(ChoiceId::from(2) > ChoiceId::from(1));
        assert_eq!(TallyId::from(7).as_i64(), 7);
    }
}
