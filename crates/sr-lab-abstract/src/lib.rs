pub mod config;
pub mod error;
pub mod interface;
pub mod packet;
pub mod scenario;

pub use interface::{SystemContext, TransportProtocol};
pub use packet::{Message, NOT_IN_USE, PAYLOAD_SIZE, Packet, trim_padding};

pub use config::{ProtocolConfig, SimConfig};
pub use error::{ConfigError, MessageError};
pub use scenario::{
    ProtocolConfigOverride, SimConfigOverride, TestAction, TestAssertion, TestScenario,
};
