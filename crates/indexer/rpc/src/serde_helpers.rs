//! Deserializers for the amino JSON encoding used by Tendermint2 nodes.

/// 64-bit integers, which amino JSON renders as strings.
///
/// Plain JSON numbers are accepted as well.
pub(crate) mod quoted_i64 {
    use serde::{Deserialize, Deserializer, de::Error};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(i64),
    }

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match StringOrNumber::deserialize(deserializer)? {
            StringOrNumber::String(s) => s.parse().map_err(D::Error::custom),
            StringOrNumber::Number(n) => Ok(n),
        }
    }
}

/// Byte strings, rendered as standard base64. `null` decodes to an empty vector.
pub(crate) mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, de::Error};

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(s) => STANDARD.decode(s.as_bytes()).map_err(D::Error::custom),
            None => Ok(Vec::new()),
        }
    }
}

/// A list of base64 byte strings. `null` decodes to an empty list.
pub(crate) mod base64_list {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, de::Error};

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<Vec<String>>::deserialize(deserializer)?
            .unwrap_or_default()
            .iter()
            .map(|s| STANDARD.decode(s.as_bytes()).map_err(D::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Sample {
        #[serde(with = "super::quoted_i64")]
        height: i64,
        #[serde(default, with = "super::base64_bytes")]
        hash: Vec<u8>,
        #[serde(default, with = "super::base64_list")]
        txs: Vec<Vec<u8>>,
    }

    #[test]
    fn test_amino_json_quirks() {
        let sample: Sample =
            serde_json::from_str(r#"{"height":"42","hash":"AQI=","txs":["AA==","AQ=="]}"#)
                .unwrap();
        assert_eq!(sample.height, 42);
        assert_eq!(sample.hash, vec![1, 2]);
        assert_eq!(sample.txs, vec![vec![0], vec![1]]);
    }

    #[test]
    fn test_nulls_and_numbers() {
        let sample: Sample =
            serde_json::from_str(r#"{"height":7,"hash":null,"txs":null}"#).unwrap();
        assert_eq!(sample.height, 7);
        assert!(sample.hash.is_empty());
        assert!(sample.txs.is_empty());
    }

    #[test]
    fn test_rejects_garbage_height() {
        let result = serde_json::from_str::<Sample>(r#"{"height":"seven"}"#);
        assert!(result.is_err());
    }
}
