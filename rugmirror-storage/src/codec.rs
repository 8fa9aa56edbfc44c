//! Serialization adapter between records and stored bytes.
//!
//! One [`RecordCodec`] is built at startup and handed to every store that
//! reads or writes records. Wide integers travel as decimal strings (see
//! [`rugmirror_core::decimal`]); this module adds schema detection on top.
//!
//! # Legacy dynamic entries
//!
//! Older writers persisted the derived `dirtLevel`/`agingLevel` next to the
//! dynamic record and had no `baseAgingLevel`. Such entries decode as
//! [`DecodedDynamic::Legacy`] with the stored aging level promoted to the base,
//! and with both derived fields dropped.

use rugmirror_core::{
    ChainConfig, CollectionSummary, DynamicRecord, MirrorResult, PermanentRecord, StorageError,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

const BASE_AGING_FIELD: &str = "baseAgingLevel";
const LEGACY_AGING_FIELD: &str = "agingLevel";
const LEGACY_DIRT_FIELD: &str = "dirtLevel";

/// A dynamic record as found in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedDynamic {
    Current(DynamicRecord),
    /// Pre-migration entry; the record is usable but should be rewritten.
    Legacy(DynamicRecord),
}

impl DecodedDynamic {
    pub fn is_legacy(&self) -> bool {
        matches!(self, DecodedDynamic::Legacy(_))
    }

    pub fn into_record(self) -> DynamicRecord {
        match self {
            DecodedDynamic::Current(record) | DecodedDynamic::Legacy(record) => record,
        }
    }
}

/// Encodes and decodes every value the mirror persists.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordCodec;

impl RecordCodec {
    pub fn new() -> Self {
        Self
    }

    fn encode<T: Serialize>(&self, key: &str, value: &T) -> MirrorResult<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| {
            StorageError::Encode {
                key: key.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    fn decode<T: DeserializeOwned>(&self, key: &str, bytes: &[u8]) -> MirrorResult<T> {
        serde_json::from_slice(bytes).map_err(|e| decode_err(key, e))
    }

    pub fn encode_permanent(&self, key: &str, record: &PermanentRecord) -> MirrorResult<Vec<u8>> {
        self.encode(key, record)
    }

    pub fn decode_permanent(&self, key: &str, bytes: &[u8]) -> MirrorResult<PermanentRecord> {
        self.decode(key, bytes)
    }

    pub fn encode_dynamic(&self, key: &str, record: &DynamicRecord) -> MirrorResult<Vec<u8>> {
        self.encode(key, record)
    }

    pub fn decode_dynamic(&self, key: &str, bytes: &[u8]) -> MirrorResult<DecodedDynamic> {
        let value: Value = self.decode(key, bytes)?;
        let Value::Object(mut fields) = value else {
            return Err(decode_err(key, "dynamic record is not a JSON object"));
        };

        let legacy = promote_legacy_fields(&mut fields);
        let record: DynamicRecord =
            serde_json::from_value(Value::Object(fields)).map_err(|e| decode_err(key, e))?;

        Ok(if legacy {
            DecodedDynamic::Legacy(record)
        } else {
            DecodedDynamic::Current(record)
        })
    }

    pub fn encode_config(&self, key: &str, config: &ChainConfig) -> MirrorResult<Vec<u8>> {
        self.encode(key, config)
    }

    pub fn decode_config(&self, key: &str, bytes: &[u8]) -> MirrorResult<ChainConfig> {
        self.decode(key, bytes)
    }

    pub fn encode_stats(&self, key: &str, stats: &CollectionSummary) -> MirrorResult<Vec<u8>> {
        self.encode(key, stats)
    }

    pub fn decode_stats(&self, key: &str, bytes: &[u8]) -> MirrorResult<CollectionSummary> {
        self.decode(key, bytes)
    }

    /// Total supply is stored as a bare decimal string.
    pub fn encode_supply(&self, key: &str, supply: u64) -> MirrorResult<Vec<u8>> {
        self.encode(key, &supply.to_string())
    }

    pub fn decode_supply(&self, key: &str, bytes: &[u8]) -> MirrorResult<u64> {
        match self.decode::<Value>(key, bytes)? {
            Value::String(text) => text.trim().parse().map_err(|e| decode_err(key, e)),
            Value::Number(n) => n
                .as_u64()
                .ok_or_else(|| decode_err(key, format!("supply is not a u64: {n}"))),
            other => Err(decode_err(key, format!("unexpected supply value: {other}"))),
        }
    }
}

/// Strip derived fields, promoting the stored aging level to the base when the
/// entry predates `baseAgingLevel`. Returns whether the entry was legacy.
fn promote_legacy_fields(fields: &mut Map<String, Value>) -> bool {
    let stored_aging = fields.remove(LEGACY_AGING_FIELD);
    let stored_dirt = fields.remove(LEGACY_DIRT_FIELD);

    if fields.contains_key(BASE_AGING_FIELD) {
        return false;
    }
    match (stored_aging, stored_dirt) {
        (Some(aging), _) => {
            fields.insert(BASE_AGING_FIELD.to_string(), aging);
            true
        }
        (None, Some(_)) => {
            fields.insert(BASE_AGING_FIELD.to_string(), Value::from(0u8));
            true
        }
        // Neither form; let deserialization report the missing field.
        (None, None) => false,
    }
}

fn decode_err(key: &str, reason: impl std::fmt::Display) -> rugmirror_core::MirrorError {
    StorageError::Decode {
        key: key.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rugmirror_core::{FrameTier, U256};
    use serde_json::json;

    const KEY: &str = "rugmarket:84532:0xabc:nft:1:dynamic";

    fn legacy_json() -> Value {
        json!({
            "dirtLevel": 1,
            "agingLevel": 4,
            "frameLevel": 2,
            "maintenanceScore": "120",
            "lastCleaned": 1_700_000_000_000u64,
            "currentOwner": "0x1111111111111111111111111111111111111111",
            "ownershipHistory": [],
            "saleHistory": [],
            "isListed": false,
            "lastUpdated": "1700000000000"
        })
    }

    #[test]
    fn test_legacy_entry_is_promoted() {
        let bytes = serde_json::to_vec(&legacy_json()).unwrap();
        let decoded = RecordCodec::new().decode_dynamic(KEY, &bytes).unwrap();

        assert!(decoded.is_legacy());
        let record = decoded.into_record();
        assert_eq!(record.base_aging_level, 4);
        assert_eq!(record.frame_level, FrameTier::Silver);
        assert_eq!(record.last_cleaned, 1_700_000_000_000);
    }

    #[test]
    fn test_legacy_dirt_only_defaults_base() {
        let mut value = legacy_json();
        value.as_object_mut().unwrap().remove("agingLevel");
        let bytes = serde_json::to_vec(&value).unwrap();
        let decoded = RecordCodec::new().decode_dynamic(KEY, &bytes).unwrap();

        assert!(decoded.is_legacy());
        assert_eq!(decoded.into_record().base_aging_level, 0);
    }

    #[test]
    fn test_current_entry_never_persists_derived_fields() {
        let codec = RecordCodec::new();
        let bytes = serde_json::to_vec(&legacy_json()).unwrap();
        let record = codec.decode_dynamic(KEY, &bytes).unwrap().into_record();

        let encoded = codec.encode_dynamic(KEY, &record).unwrap();
        let value: Value = serde_json::from_slice(&encoded).unwrap();
        assert!(value.get("dirtLevel").is_none());
        assert!(value.get("agingLevel").is_none());
        assert_eq!(value["baseAgingLevel"], "4");

        let again = codec.decode_dynamic(KEY, &encoded).unwrap();
        assert_eq!(again, DecodedDynamic::Current(record));
    }

    #[test]
    fn test_missing_base_and_legacy_fields_is_an_error() {
        let mut value = legacy_json();
        let fields = value.as_object_mut().unwrap();
        fields.remove("agingLevel");
        fields.remove("dirtLevel");
        let bytes = serde_json::to_vec(&value).unwrap();

        let err = RecordCodec::new().decode_dynamic(KEY, &bytes).unwrap_err();
        assert!(err.to_string().contains("baseAgingLevel"));
    }

    #[test]
    fn test_supply_accepts_string_or_number() {
        let codec = RecordCodec::new();
        assert_eq!(codec.decode_supply("k", b"\"1234\"").unwrap(), 1234);
        assert_eq!(codec.decode_supply("k", b"1234").unwrap(), 1234);
        assert!(codec.decode_supply("k", b"null").is_err());

        let encoded = codec.encode_supply("k", 77).unwrap();
        assert_eq!(encoded, b"\"77\"".to_vec());
    }

    proptest! {
        #[test]
        fn prop_permanent_survives_wide_seeds(seed in any::<[u8; 32]>(), mint_time in any::<u64>()) {
            let record = PermanentRecord {
                token_id: 9,
                seed: U256::from_be_bytes(seed),
                name: "OnchainRug #9".to_string(),
                description: "OnchainRugs by valipokkann".to_string(),
                image: "/logo.png".to_string(),
                palette_name: "Sunset".to_string(),
                minified_palette: "{}".to_string(),
                minified_stripe_data: "[]".to_string(),
                text_rows: vec!["HELLO".to_string()],
                warp_thickness: 3,
                mint_time,
                filtered_character_map: "{}".to_string(),
                character_count: 5,
                stripe_count: 12,
                curator: "0x2222222222222222222222222222222222222222".to_string(),
            };
            let codec = RecordCodec::new();
            let bytes = codec.encode_permanent("k", &record).unwrap();
            prop_assert_eq!(codec.decode_permanent("k", &bytes).unwrap(), record);
        }
    }
}
