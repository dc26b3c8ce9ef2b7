pub mod channel;
pub mod discovery;
pub mod frame;
pub mod link;

pub use discovery::MdnsDiscovery;
pub use link::{ChromecastConnector, ChromecastLink};
