//! Opens a link and a memory controller from a [`GatewayConfig`].

use std::fs::OpenOptions;
use std::sync::Arc;
use std::time::Duration;

use master_link::{
    Channel, Link, LinkError, Request, SimHandle, SimulatedMaster, StreamChannel, TcpChannel, Transport,
};
use master_memory::{JsonExtensionStore, MemoryController, MemoryError};
use master_protocol::{ClassicCommand, ClassicResponse, CoreCommand, CoreResponse, HardwareFamily, ProtocolError};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::info;

use crate::config::{ChannelConfig, ConfigError, GatewayConfig};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors of the command line tool.
#[derive(Error, Debug)]
pub enum ToolError {
    /// Bad configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The channel could not be opened.
    #[error("cannot open {target}: {source}")]
    Open {
        /// Address or device.
        target: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A request on the link failed.
    #[error(transparent)]
    Link(#[from] LinkError),

    /// A memory operation failed.
    #[error(transparent)]
    Memory(#[from] MemoryError),

    /// A reply did not decode.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Bad command line input.
    #[error("{0}")]
    Usage(String),
}

/// Firmware version reported by the master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct FirmwareVersion {
    /// Major.
    pub major: u8,
    /// Minor.
    pub minor: u8,
    /// Patch.
    pub patch: u8,
}

impl std::fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// An open connection to a master.
pub struct Gateway {
    family: HardwareFamily,
    link: Arc<dyn Link>,
    controller: MemoryController,
    sim: Option<SimHandle>,
}

impl Gateway {
    /// Open the channel, transport and controller described by `config`.
    pub fn open(config: &GatewayConfig) -> Result<Self, ToolError> {
        let family = config.family;
        let (channel, sim): (Box<dyn Channel>, Option<SimHandle>) = match &config.channel {
            ChannelConfig::Tcp(addr) => {
                let channel = TcpChannel::connect(addr.as_str(), CONNECT_TIMEOUT).map_err(|source| ToolError::Open {
                    target: addr.clone(),
                    source,
                })?;
                (Box::new(channel), None)
            }
            ChannelConfig::Device(path) => {
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .open(path)
                    .map_err(|source| ToolError::Open {
                        target: path.display().to_string(),
                        source,
                    })?;
                (Box::new(StreamChannel::new(file)), None)
            }
            ChannelConfig::Simulated(faults) => {
                let (sim, handle) = SimulatedMaster::new(family);
                handle.set_faults(faults.clone());
                (Box::new(sim), Some(handle))
            }
        };

        let transport = Transport::new(channel, config.transport_config());
        let link: Arc<dyn Link> = Arc::new(Mutex::new(transport));
        let mut controller = MemoryController::for_link(family, Arc::clone(&link), config.memory_config()?);

        if let Some(path) = &config.extensions.path {
            let store = JsonExtensionStore::open(path).map_err(|source| ToolError::Open {
                target: path.display().to_string(),
                source,
            })?;
            controller = controller.with_extension_store(Box::new(store));
        }

        info!(family = family.as_str(), channel = ?config.channel, "gateway open");
        Ok(Gateway {
            family,
            link,
            controller,
            sim,
        })
    }

    /// Hardware family.
    pub fn family(&self) -> HardwareFamily {
        self.family
    }

    /// Memory controller.
    pub fn controller(&self) -> &MemoryController {
        &self.controller
    }

    /// Shared link.
    pub fn link(&self) -> &Arc<dyn Link> {
        &self.link
    }

    /// Handle of the simulated master, if the channel is simulated.
    pub fn simulator(&self) -> Option<&SimHandle> {
        self.sim.as_ref()
    }

    /// Ask the master for its firmware version.
    pub fn firmware_version(&self) -> Result<FirmwareVersion, ToolError> {
        match self.family {
            HardwareFamily::Classic => {
                let request = Request::classic(&ClassicCommand::FirmwareVersion)?;
                let code = request.command;
                let payload = self.link.send(request)?;
                match ClassicResponse::decode(code, &payload)? {
                    ClassicResponse::FirmwareVersion { major, minor, patch } => {
                        Ok(FirmwareVersion { major, minor, patch })
                    }
                    other => Err(ToolError::Usage(format!("unexpected reply {:?}", other))),
                }
            }
            HardwareFamily::Core => {
                let request = Request::core(&CoreCommand::FirmwareVersion);
                let code = request.command;
                let payload = self.link.send(request)?;
                match CoreResponse::decode(code, &payload)? {
                    CoreResponse::FirmwareVersion { major, minor, patch } => Ok(FirmwareVersion { major, minor, patch }),
                    other => Err(ToolError::Usage(format!("unexpected reply {:?}", other))),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use master_memory::{MemoryBank, PageId};

    #[test]
    fn test_simulated_gateway_roundtrip() {
        for family in [HardwareFamily::Classic, HardwareFamily::Core] {
            let gateway = Gateway::open(&GatewayConfig::simulated(family)).expect("open");
            let sim = gateway.simulator().expect("simulated").clone();
            sim.set_firmware_version(3, 143, 7);
            assert_eq!(
                gateway.firmware_version().expect("version"),
                FirmwareVersion {
                    major: 3,
                    minor: 143,
                    patch: 7
                }
            );

            let page = PageId::new(MemoryBank::Eeprom, 2);
            gateway.controller().write_raw(page, 4, &[1, 2, 3]).expect("write");
            assert_eq!(&gateway.controller().read_raw(page).expect("read")[4..7], &[1, 2, 3]);
        }
    }

    #[test]
    fn test_open_missing_device() {
        let mut config = GatewayConfig::simulated(HardwareFamily::Core);
        config.channel = ChannelConfig::Device("/nonexistent/ttyO5".into());
        assert!(matches!(Gateway::open(&config), Err(ToolError::Open { .. })));
    }
}
