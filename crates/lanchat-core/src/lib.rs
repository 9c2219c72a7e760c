//! LanChat Core
//!
//! Peer discovery and broadcast engine for a LAN chat. A locally typed message
//! is fanned out concurrently to every peer found in the neighbor table, while
//! a long-lived HTTP endpoint turns requests from other instances into inbound
//! messages. Everything the core produces ends up in one [`EventSink`].

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod directory;
pub mod errors;
pub mod fanout;
pub mod listener;
pub mod message;
pub mod sink;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::{ChatConfig, DirectoryConfig, DirectorySource, NetworkConfig, UiConfig};
pub use directory::{ArpSource, ArpTableDirectory, PeerAddress, PeerDirectory, StaticDirectory};
pub use errors::{ChatError, ConfigError, DeliveryError, DirectoryError, ListenerError, Result};
pub use fanout::{
    BroadcastHandle, BroadcastSummary, Broadcaster, Delivery, DeliveryOutcome, DeliveryReceipt,
    HttpDelivery, OutcomeKind,
};
pub use listener::InboundListener;
pub use message::{ChatEvent, Message, Notice, NoticeLevel, Sender};
pub use sink::{ChannelSink, EventReceiver, EventSink};
