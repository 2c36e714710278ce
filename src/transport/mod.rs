pub mod envelope;
pub mod link;
pub mod uplink;
pub mod worker;

pub use link::{HostLink, LinkDriver};
pub use uplink::{HttpUplink, Uplink};
pub use worker::TransmitWorker;
