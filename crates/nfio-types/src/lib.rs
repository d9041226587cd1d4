//! Shared identity, state and value types for nfio.
//!
//! This crate has **no internal nfio dependencies**. The kernel, the
//! orchestration backends and the server binary all speak these types.
//!
//! # Entity Overview
//!
//! ```text
//! NF type (catalog entry, e.g. "firewall")
//!     └── NF instance (InstanceKey = type + name, InstanceId from backend)
//!             └── attributes (status, config, action, id, ip, extensions)
//!
//! Channel (ChannelName from backend)
//!     └── source InstanceKey ──► destination InstanceKey
//!     └── at most one live channel per PairKey (unordered endpoints)
//! ```
//!
//! # Key Types
//!
//! |--------------------|---------------------------------------------|
//! | Type               | Purpose                                     |
//! |--------------------|---------------------------------------------|
//! | [`InstanceKey`]    | Which instance (type + name, jointly unique)|
//! | [`InstanceId`]     | Backend-assigned opaque instance identifier |
//! | [`ChannelName`]    | Backend-assigned opaque channel identifier  |
//! | [`ChannelRequest`] | Ordered endpoint pair named by a caller     |
//! | [`PairKey`]        | Unordered endpoint pair (dedup key)         |
//! | [`InstanceState`]  | Lifecycle state tracked by the kernel       |
//! | [`InstanceStatus`] | Run status as reported by the backend       |
//! | [`ChannelState`]   | Channel lifecycle state                     |
//! | [`Action`]         | Control verb written to an instance         |
//! | [`AttrValue`]      | Typed attribute value                       |
//! |--------------------|---------------------------------------------|

pub mod ids;
pub mod state;
pub mod value;

pub use ids::{ChannelName, ChannelRequest, InstanceId, InstanceKey, PairKey};
pub use state::{Action, ChannelState, InstanceState, InstanceStatus};
pub use value::{AttrValue, Record};
