//! Wire-level protocol: frame types, method names, typed payloads, codec.

pub mod codec;
pub mod messages;
pub mod methods;
pub mod types;

pub use codec::{decode, decode_str, encode, encode_value};
pub use types::{
    JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, Meta,
    ProgressToken, RequestId, JSONRPC_VERSION, LATEST_PROTOCOL_VERSION,
    SUPPORTED_PROTOCOL_VERSIONS,
};
