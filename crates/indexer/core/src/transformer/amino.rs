//! Binary layout of a gno `std.Tx`.
//!
//! Amino binary encoding of structs is wire compatible with protobuf, so the transaction is
//! described with `prost` messages. Field numbers follow the declaration order of the Go structs.
//! Signatures (field 3) are not indexed and are skipped while decoding.

/// A standard transaction.
#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct StdTx {
    #[prost(message, repeated, tag = "1")]
    pub(crate) msgs: Vec<AnyMsg>,
    #[prost(message, optional, tag = "2")]
    pub(crate) fee: Option<Fee>,
    #[prost(string, tag = "4")]
    pub(crate) memo: String,
}

/// An interface value: the registered type URL followed by the concrete encoding.
#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct AnyMsg {
    #[prost(string, tag = "1")]
    pub(crate) type_url: String,
    #[prost(bytes = "vec", tag = "2")]
    pub(crate) value: Vec<u8>,
}

/// Fee of a transaction.
///
/// Amino writes signed integers zigzag encoded, and `std.Coin` marshals to its string form
/// (`1000000ugnot`) in binary as well as in JSON.
#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct Fee {
    #[prost(sint64, tag = "1")]
    pub(crate) gas_wanted: i64,
    #[prost(string, tag = "2")]
    pub(crate) gas_fee: String,
}

/// Splits a coin string such as `1000000ugnot` into its amount and denomination.
///
/// An empty string is a zero fee without denomination. Returns `None` when the string does not
/// start with an amount that fits an `i64`, or when the denomination is missing.
pub(crate) fn parse_coin(coin: &str) -> Option<(i64, &str)> {
    if coin.is_empty() {
        return Some((0, ""));
    }
    let split = coin.find(|c: char| !c.is_ascii_digit())?;
    let (amount, denom) = coin.split_at(split);
    if amount.is_empty() {
        return None;
    }
    Some((amount.parse().ok()?, denom))
}

/// Splits a message type URL into its `(route, type)` pair.
///
/// Known gno messages use their on-chain route and type names. Anything else falls back to the
/// package part of the URL as route and the remainder as type.
pub(crate) fn route_and_type(type_url: &str) -> (String, String) {
    let known = match type_url {
        "/bank.MsgSend" => Some(("bank", "send")),
        "/vm.m_call" => Some(("vm", "exec")),
        "/vm.m_addpkg" => Some(("vm", "add_package")),
        "/vm.m_run" => Some(("vm", "run")),
        _ => None,
    };
    if let Some((route, msg_type)) = known {
        return (route.to_string(), msg_type.to_string());
    }

    let trimmed = type_url.trim_start_matches('/');
    match trimmed.split_once('.') {
        Some((route, msg_type)) => (route.to_string(), msg_type.to_string()),
        None => (trimmed.to_string(), String::new()),
    }
}
