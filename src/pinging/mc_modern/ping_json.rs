use serde::{Deserialize, Serialize};
use serde_json::Value;

const FAVICON_PREFIX: &str = "data:image/png;base64,";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PingVersion {
    pub name: String,
    pub protocol: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PingPlayer {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PingPlayerInfo {
    pub max: i32,
    pub online: i32,
    #[serde(default)]
    pub sample: Vec<PingPlayer>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PingMod {
    pub modid: String,
    pub version: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PingModInfo {
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(rename = "modList", default)]
    pub mod_list: Vec<PingMod>,
}

/// The status JSON exactly as the server sent it.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PingResponse {
    pub version: PingVersion,
    #[serde(default)]
    pub players: Option<PingPlayerInfo>,
    #[serde(default)]
    pub description: Value,
    #[serde(default)]
    pub favicon: Option<String>,
    #[serde(default)]
    pub enforces_secure_chat: Option<bool>,
    #[serde(default)]
    pub previews_chat: Option<bool>,
    #[serde(rename = "modinfo", default)]
    pub mods: Option<PingModInfo>,
}

/// A successful modern status ping.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PingResult {
    pub online: bool,
    pub version: PingVersion,
    pub players: PingPlayerInfo,
    pub description: String,
    pub favicon: Option<String>,
    pub latency_ms: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enforces_secure_chat: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previews_chat: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mods: Option<PingModInfo>,
}

impl PingResult {
    pub fn from_response(response: PingResponse, latency_ms: u32) -> Self {
        Self {
            online: true,
            version: response.version,
            players: response.players.unwrap_or_default(),
            description: flatten_description(&response.description),
            favicon: response.favicon,
            latency_ms,
            enforces_secure_chat: response.enforces_secure_chat,
            previews_chat: response.previews_chat,
            mods: response.mods,
        }
    }

    /// Decodes the favicon data URI into raw PNG bytes.
    pub fn favicon_png(&self) -> Option<Result<Vec<u8>, base64::DecodeError>> {
        let favicon = self.favicon.as_deref()?;
        let encoded = favicon.strip_prefix(FAVICON_PREFIX).unwrap_or(favicon);
        // some servers wrap the base64 at 76 columns
        let encoded: String = encoded.split_whitespace().collect();
        Some(base64::decode(encoded))
    }
}

/// Reduces a description to plain text.
///
/// Accepts a plain string or a chat component with `text` and/or `extra`.
/// Anything else becomes an empty string rather than failing the ping.
pub fn flatten_description(description: &Value) -> String {
    match description {
        Value::String(s) => s.clone(),
        Value::Object(_) => {
            let mut out = String::new();
            append_component(description, &mut out);
            out
        }
        _ => String::new(),
    }
}

fn append_component(component: &Value, out: &mut String) {
    match component {
        Value::String(s) => out.push_str(s),
        Value::Object(fields) => {
            if let Some(Value::String(text)) = fields.get("text") {
                out.push_str(text);
            }
            if let Some(Value::Array(extra)) = fields.get("extra") {
                for child in extra {
                    append_component(child, out);
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn decode(raw: &str) -> PingResult {
        let response: PingResponse = serde_json::from_str(raw).unwrap();
        PingResult::from_response(response, 12)
    }

    #[test]
    fn decodes_a_plain_status() {
        let result = decode(
            r#"{"version":{"name":"1.20.4","protocol":765},"players":{"online":3,"max":20},"description":"A Minecraft Server"}"#,
        );

        assert!(result.online);
        assert_eq!(
            result.version,
            PingVersion {
                name: "1.20.4".to_owned(),
                protocol: 765
            }
        );
        assert_eq!(result.players.online, 3);
        assert_eq!(result.players.max, 20);
        assert!(result.players.sample.is_empty());
        assert_eq!(result.description, "A Minecraft Server");
        assert_eq!(result.favicon, None);
        assert_eq!(result.latency_ms, 12);
    }

    #[test]
    fn flattens_rich_descriptions() {
        let description = json!({"text": "Hello ", "extra": [{"text": "World"}]});
        assert_eq!(flatten_description(&description), "Hello World");

        let description = json!({"text": "only text"});
        assert_eq!(flatten_description(&description), "only text");

        let description = json!({"extra": [{"text": "a"}, "b", {"text": "c", "extra": [{"text": "d"}]}]});
        assert_eq!(flatten_description(&description), "abcd");
    }

    #[test]
    fn unrecognised_descriptions_become_empty() {
        assert_eq!(flatten_description(&json!(42)), "");
        assert_eq!(flatten_description(&json!(null)), "");
        assert_eq!(flatten_description(&json!({"translate": "x"})), "");

        let result = decode(r#"{"version":{"name":"x","protocol":1},"description":[1,2]}"#);
        assert_eq!(result.description, "");
        assert_eq!(result.players, PingPlayerInfo::default());
    }

    #[test]
    fn keeps_sample_and_favicon() {
        let result = decode(
            r#"{
                "version": {"name": "Paper 1.20.1", "protocol": 763},
                "players": {"online": 1, "max": 10, "sample": [{"name": "Notch", "id": "069a79f4-44e9-4726-a5be-fca90e38aaf5"}]},
                "description": {"text": "hi"},
                "favicon": "data:image/png;base64,iVBORw0KGgo=",
                "enforcesSecureChat": true
            }"#,
        );

        assert_eq!(result.players.sample.len(), 1);
        assert_eq!(result.players.sample[0].name, "Notch");
        assert_eq!(
            result.favicon.as_deref(),
            Some("data:image/png;base64,iVBORw0KGgo=")
        );
        assert_eq!(result.enforces_secure_chat, Some(true));

        let png = result.favicon_png().unwrap().unwrap();
        assert_eq!(&png[..4], &[0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn reads_forge_mod_list() {
        let result = decode(
            r#"{"version":{"name":"1.12.2","protocol":340},"description":"","modinfo":{"type":"FML","modList":[{"modid":"forge","version":"14.23.5.2859"}]}}"#,
        );
        let mods = result.mods.unwrap();
        assert_eq!(mods.ty, "FML");
        assert_eq!(mods.mod_list[0].modid, "forge");
    }

    #[test]
    fn missing_version_is_a_decode_error() {
        assert!(serde_json::from_str::<PingResponse>(r#"{"description":"x"}"#).is_err());
    }
}
