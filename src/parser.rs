//! Subscription and Protocol Parsing Module
//!
//! This module provides functionality for:
//! - Detecting subscription content types (link list, Base64 link list, Clash YAML, sing-box JSON)
//! - Decoding Base64 content with the alphabet and padding variants providers emit
//! - Parsing protocol links (vless://, vmess://, trojan://, ss://) into obfuscating nodes
//! - Dynamic dispatch to the appropriate parser based on the link scheme

pub mod base64;
pub mod detection;
pub mod node;
pub mod protocols;

pub use detection::{ContentType, decode_link_list, detect_content_type};
pub use node::{NodeConfig, NodeState, ProxyNode};
pub use protocols::{FieldMap, ProtocolParser, ProtocolRegistry};
