//! Dataset elements.

use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetElementMeta {
    pub name: String,
    pub description: String,
}

/// One dataset element. Binary contents travel base64 encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatasetElement {
    #[serde(flatten)]
    pub meta: DatasetElementMeta,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub contents: String,
    #[serde(
        serialize_with = "serialize_base64",
        deserialize_with = "deserialize_base64",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub binary_contents: Vec<u8>,
}

impl DatasetElement {
    pub fn text(name: impl Into<String>, description: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            meta: DatasetElementMeta {
                name: name.into(),
                description: description.into(),
            },
            contents: contents.into(),
            binary_contents: Vec::new(),
        }
    }

    pub fn binary(name: impl Into<String>, description: impl Into<String>, contents: Vec<u8>) -> Self {
        Self {
            meta: DatasetElementMeta {
                name: name.into(),
                description: description.into(),
            },
            contents: String::new(),
            binary_contents: contents,
        }
    }
}

fn serialize_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
}

fn deserialize_base64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let encoded = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(serde::de::Error::custom)
}

/// Body of the `datasets*` requests. `input` is itself a JSON document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DatasetRequest<'a> {
    pub input: String,
    pub dataset_tool: &'a str,
    pub env: &'a [String],
}

#[derive(Debug, Serialize)]
pub(crate) struct DatasetArgs<'a> {
    #[serde(rename = "workspaceID")]
    pub workspace_id: &'a str,
    #[serde(rename = "datasetID", skip_serializing_if = "Option::is_none")]
    pub dataset_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elements: Option<&'a [DatasetElement]>,
    #[serde(rename = "name", skip_serializing_if = "Option::is_none")]
    pub element: Option<&'a str>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn binary_contents_are_base64() {
        let element = DatasetElement::binary("img", "bytes", vec![0, 1, 2, 255]);
        let value = serde_json::to_value(&element).unwrap();
        assert_eq!(
            value,
            json!({"name": "img", "description": "bytes", "binaryContents": "AAEC/w=="})
        );

        let back: DatasetElement = serde_json::from_value(value).unwrap();
        assert_eq!(back.binary_contents, vec![0, 1, 2, 255]);
    }

    #[test]
    fn null_binary_contents_decode_empty() {
        let element: DatasetElement = serde_json::from_value(json!({
            "name": "a", "description": "", "contents": "hi", "binaryContents": null
        }))
        .unwrap();
        assert!(element.binary_contents.is_empty());
        assert_eq!(element.contents, "hi");
    }
}
