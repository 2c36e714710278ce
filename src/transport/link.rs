//! Wireless link collaborator and bounded reconnection
//!
//! The link itself (association, DHCP, power management) belongs to the
//! host. This module only decides when to ask for a join and how many
//! times, as an explicit `Disconnected → Connecting → Connected` machine.

use std::fs;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::error::LinkError;
use crate::{utils, LinkConfig};

#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub ssid: String,
    pub password: String,
}

/// Addresses resolved by a successful join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    pub address: IpAddr,
    pub hardware_address: [u8; 6],
}

/// Process-lifetime identity of this device on the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device_id: String,
    pub address: IpAddr,
    pub hardware_address: String,
}

impl DeviceInfo {
    pub fn resolve(prefix: &str, link: &LinkInfo) -> Self {
        Self {
            device_id: utils::device_id(prefix, &link.hardware_address),
            address: link.address,
            hardware_address: utils::hex(&link.hardware_address),
        }
    }
}

/// Link-layer driver: one join attempt at a time, cheap health probe.
pub trait LinkDriver {
    fn join(
        &self,
        credentials: &Credentials,
        timeout: Duration,
    ) -> impl Future<Output = Result<LinkInfo, LinkError>>;

    fn is_connected(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    /// Join attempt `n` of the current connect cycle is under way
    Connecting(u32),
    Connected,
}

/// Bounded-retry connect cycle.
#[derive(Debug)]
pub struct Reconnector {
    credentials: Credentials,
    join_timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
    state: LinkState,
}

impl Reconnector {
    pub fn new(config: &LinkConfig) -> Self {
        Self {
            credentials: Credentials {
                ssid: config.ssid.clone(),
                password: config.password.clone(),
            },
            join_timeout: config.join_timeout(),
            max_retries: config.max_retries.max(1),
            retry_delay: config.retry_delay(),
            state: LinkState::Disconnected,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Move to the next attempt, or `None` once the cycle is exhausted.
    pub fn begin_attempt(&mut self) -> Option<u32> {
        let next = match self.state {
            LinkState::Disconnected | LinkState::Connected => 1,
            LinkState::Connecting(n) if n < self.max_retries => n + 1,
            LinkState::Connecting(_) => {
                self.state = LinkState::Disconnected;
                return None;
            }
        };
        self.state = LinkState::Connecting(next);
        Some(next)
    }

    pub fn on_joined(&mut self) {
        self.state = LinkState::Connected;
    }

    pub fn on_lost(&mut self) {
        self.state = LinkState::Disconnected;
    }

    /// Run one connect cycle: up to `max_retries` joins, `retry_delay` apart.
    pub async fn connect<L: LinkDriver>(&mut self, link: &L) -> Result<LinkInfo, LinkError> {
        self.on_lost();

        while let Some(attempt) = self.begin_attempt() {
            info!("Link join {}/{}", attempt, self.max_retries);

            let joined = tokio::time::timeout(
                self.join_timeout,
                link.join(&self.credentials, self.join_timeout),
            )
            .await
            .unwrap_or_else(|_| Err(LinkError::JoinTimeout(self.join_timeout)));

            match joined {
                Ok(info) => {
                    info!("Link up: {}", info.address);
                    self.on_joined();
                    return Ok(info);
                }
                Err(e) => warn!("Link join {} failed: {}", attempt, e),
            }

            if attempt < self.max_retries {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        warn!("Link not connected after {} attempts", self.max_retries);
        Err(LinkError::RetriesExhausted {
            attempts: self.max_retries,
        })
    }
}

/// Link state of a Linux host.
///
/// Association is handled by the OS, so the credentials are not used. A
/// join is a TCP reachability probe of the collector. Health comes from the
/// `operstate` of the configured interface, or of the primary interface
/// when none is configured.
#[derive(Debug)]
pub struct HostLink {
    probe_addr: String,
    interface: Option<String>,
    joined: AtomicBool,
}

impl HostLink {
    pub fn new(config: &LinkConfig) -> Self {
        Self {
            probe_addr: config.probe_addr.clone(),
            interface: config.interface.clone(),
            joined: AtomicBool::new(false),
        }
    }

    fn hardware_address(&self) -> [u8; 6] {
        let found = match &self.interface {
            Some(iface) => utils::read_hardware_address(iface),
            None => utils::primary_interface().map(|(_, mac)| mac),
        };
        found.unwrap_or_else(|| {
            debug!("No hardware address found, using zeros");
            [0; 6]
        })
    }
}

impl LinkDriver for HostLink {
    async fn join(&self, credentials: &Credentials, timeout: Duration) -> Result<LinkInfo, LinkError> {
        if !credentials.ssid.is_empty() {
            debug!("Association for {} is managed by the host", credentials.ssid);
        }

        let stream = tokio::time::timeout(timeout, TcpStream::connect(&self.probe_addr))
            .await
            .map_err(|_| LinkError::JoinTimeout(timeout))??;
        let address = stream
            .local_addr()
            .map(|addr| addr.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        drop(stream);

        self.joined.store(true, Ordering::Release);
        Ok(LinkInfo {
            address,
            hardware_address: self.hardware_address(),
        })
    }

    fn is_connected(&self) -> bool {
        match &self.interface {
            Some(iface) => read_operstate(iface).is_some_and(|state| operstate_is_up(&state)),
            None => {
                let operstate = utils::primary_interface().and_then(|(iface, _)| read_operstate(&iface));
                fallback_health(operstate.as_deref(), self.joined.load(Ordering::Acquire))
            }
        }
    }
}

fn read_operstate(iface: &str) -> Option<String> {
    fs::read_to_string(format!("/sys/class/net/{}/operstate", iface)).ok()
}

/// `up` and `unknown` (common for drivers without carrier reporting) count as up.
fn operstate_is_up(state: &str) -> bool {
    matches!(state.trim(), "up" | "unknown")
}

/// Health without a configured interface: the primary interface's state
/// when it can be read, the last join otherwise.
fn fallback_health(operstate: Option<&str>, joined: bool) -> bool {
    operstate.map_or(joined, operstate_is_up)
}
