//! Stream frames exchanged with the exchange WebSocket endpoints

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Channel selector used in subscribe requests and echoed on pushes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelArg {
    #[serde(default)]
    pub inst_type: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub inst_id: String,
}

impl ChannelArg {
    pub fn new(inst_type: &str, channel: &str, inst_id: &str) -> Self {
        Self {
            inst_type: inst_type.to_string(),
            channel: channel.to_string(),
            inst_id: inst_id.to_string(),
        }
    }
}

/// `{op: "subscribe", args: [...]}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubscribeRequest {
    pub op: String,
    pub args: Vec<ChannelArg>,
}

impl SubscribeRequest {
    pub fn new(args: Vec<ChannelArg>) -> Self {
        Self {
            op: "subscribe".to_string(),
            args,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoginArg {
    pub api_key: String,
    pub passphrase: String,
    pub timestamp: String,
    pub sign: String,
}

/// `{op: "login", args: [{apiKey, passphrase, timestamp, sign}]}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoginRequest {
    pub op: String,
    pub args: Vec<LoginArg>,
}

impl LoginRequest {
    pub fn new(arg: LoginArg) -> Self {
        Self {
            op: "login".to_string(),
            args: vec![arg],
        }
    }
}

/// Any decoded JSON frame pushed by the exchange
///
/// Event replies (`login`, `subscribe`, `error`) carry `event`/`code`/`msg`;
/// channel pushes carry `arg` and `data`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct StreamFrame {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub arg: Option<ChannelArg>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub code: Option<Value>,
    #[serde(default)]
    pub msg: Option<String>,
}

impl StreamFrame {
    pub fn event(&self) -> Option<&str> {
        self.event.as_deref()
    }

    pub fn channel(&self) -> Option<&str> {
        self.arg.as_ref().map(|a| a.channel.as_str())
    }

    /// True when `code` is absent or zero (`0`, `"0"`, `"00000"`)
    pub fn is_success(&self) -> bool {
        match &self.code {
            None | Some(Value::Null) => true,
            Some(Value::Number(n)) => n.as_i64() == Some(0),
            Some(Value::String(s)) => s.trim_start_matches('0').is_empty(),
            Some(_) => false,
        }
    }
}
