//! MCP (Model Context Protocol) plumbing for toolbind: wire types, the
//! transport layer, catalog introspection, result decoding, and the
//! runtime client bridge that generated stubs call into.

pub mod bridge;
pub mod decode;
pub mod introspect;
pub mod protocol;
pub mod transport;

pub use bridge::{ConnectionRegistry, Connector, ToolBridge, TransportConnector};
pub use introspect::{introspect, Catalog};
pub use protocol::{CallToolResult, ToolDef};
pub use transport::{open_channel, Channel};
