pub mod rpc;
pub mod tokens;

pub use rpc::ChainClient;
pub use tokens::{TokenMetadata, TokenMetadataCache};
