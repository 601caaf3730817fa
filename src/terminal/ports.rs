//! Serial port discovery.
//!
//! Flat enumeration of the system's serial devices so the shell can
//! populate its port picker. Backed by `serialport::available_ports`.

use crate::terminal::types::TerminalError;
use serde::{Deserialize, Serialize};

/// Type of serial port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PortType {
    /// USB to serial adapter.
    UsbSerial,
    /// PCI / PCI-Express serial card.
    Pci,
    /// Bluetooth serial profile (RFCOMM).
    Bluetooth,
    /// Unknown type.
    Unknown,
}

impl PortType {
    pub fn label(&self) -> &'static str {
        match self {
            Self::UsbSerial => "USB-Serial",
            Self::Pci => "PCI",
            Self::Bluetooth => "Bluetooth",
            Self::Unknown => "Unknown",
        }
    }
}

/// Information about a discovered serial port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortInfo {
    /// System port name (e.g. `COM3`, `/dev/ttyUSB0`).
    pub port_name: String,
    pub port_type: PortType,
    /// Product / driver description, when the platform reports one.
    pub description: Option<String>,
    /// Manufacturer string (USB adapters).
    pub manufacturer: Option<String>,
    /// Friendly name for the picker.
    pub display_name: String,
}

/// Enumerate the serial ports currently visible to the OS.
pub fn list_ports() -> Result<Vec<PortInfo>, TerminalError> {
    let ports = serialport::available_ports()
        .map_err(|e| TerminalError::io(format!("port enumeration failed: {}", e)))?;

    Ok(ports
        .into_iter()
        .map(|port| {
            let (port_type, description, manufacturer) = match port.port_type {
                serialport::SerialPortType::UsbPort(usb) => {
                    (PortType::UsbSerial, usb.product, usb.manufacturer)
                }
                serialport::SerialPortType::PciPort => (PortType::Pci, None, None),
                serialport::SerialPortType::BluetoothPort => {
                    (PortType::Bluetooth, None, None)
                }
                serialport::SerialPortType::Unknown => (PortType::Unknown, None, None),
            };
            let display_name = match &description {
                Some(desc) => format!("{} ({})", port.port_name, desc),
                None => port.port_name.clone(),
            };
            PortInfo {
                port_name: port.port_name,
                port_type,
                description,
                manufacturer,
                display_name,
            }
        })
        .collect())
}
