use crate::Height;
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

/// A transaction included in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Height of the owning block.
    pub height: Height,
    /// Position of the transaction in the block.
    pub index: u32,
    /// Transaction hash.
    pub hash: String,
    /// Fee amount paid, in [`gas_fee_denom`](Self::gas_fee_denom) units.
    pub gas_fee: i64,
    /// Denomination of the fee coin, e.g. `ugnot`. Empty when no fee was set.
    pub gas_fee_denom: String,
    /// Gas limit requested by the sender.
    pub gas_wanted: i64,
    /// Free-form memo attached by the sender.
    pub memo: String,
    /// Messages in source order.
    pub messages: Vec<Message>,
}

/// A message carried by a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Height of the owning block.
    pub height: Height,
    /// Hash of the owning transaction.
    pub tx_hash: String,
    /// Position of the message in the transaction.
    pub index: u32,
    /// Handler route, e.g. `vm` or `bank`.
    pub route: String,
    /// Message type within the route, e.g. `exec` or `send`.
    pub msg_type: String,
    /// The undecoded message.
    pub payload: MessagePayload,
}

/// An undecoded message, kept verbatim for later interpretation.
///
/// The body is the amino binary encoding of the concrete message, so reading its fields takes a
/// second decode against the message type named by `type_url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    /// The amino type URL, e.g. `/vm.m_call`.
    pub type_url: String,
    /// The amino-encoded message body.
    pub value: Vec<u8>,
}

impl MessagePayload {
    /// Renders the payload as the JSON document stored in the `msg_raw` column.
    ///
    /// The layout follows the amino JSON convention for interfaces:
    /// `{"@type": "<type url>", "value": "<base64 body>"}`. The `value` is the base64 of the
    /// amino binary body, not a decoded JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "@type": self.type_url,
            "value": STANDARD.encode(&self.value),
        })
    }
}
