use serde::{Deserialize, Deserializer, Serialize};

/// Remote-side description of a stored object, as returned by `?metadata`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5sum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha512sum: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_length",
        skip_serializing_if = "Option::is_none"
    )]
    pub length: Option<u64>,
}

impl RemoteMetadata {
    pub fn is_empty(&self) -> bool {
        self.md5sum.is_none() && self.sha512sum.is_none() && self.length.is_none()
    }
}

/// Servers report the length either as a JSON number or as a decimal string.
fn deserialize_length<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Length {
        Number(u64),
        Text(String),
    }

    match Option::<Length>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Length::Number(n)) => Ok(Some(n)),
        Some(Length::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid length '{s}'"))),
    }
}
