use serialport::{SerialPort, SerialPortType};

use crate::serial_link::{open_link, SerialLinkError};

/// USB-UART bridges found on acquisition node boards, by VID/PID.
const KNOWN_BRIDGES: [(u16, u16, &str); 7] = [
    (0x10c4, 0xea60, "CP210x"),
    (0x1a86, 0x7523, "CH340"),
    (0x1a86, 0x55d4, "CH9102"),
    (0x0403, 0x6001, "FT232R"),
    (0x0403, 0x6015, "FT231X"),
    (0x303a, 0x1001, "ESP32 USB-Serial/JTAG"),
    (0x303a, 0x0002, "ESP32-S2 USB-CDC"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePort {
    pub name: String,
    pub port: String,
    pub bridge: &'static str,
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("Serial link error: {0}")]
    SerialLink(#[from] SerialLinkError),

    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    #[error("No acquisition node found. Please connect one or specify the port manually")]
    NodeNotFound,
}

/// Name of the bridge chip for a USB VID/PID pair, if it is a known one.
pub fn bridge_name(vid: u16, pid: u16) -> Option<&'static str> {
    KNOWN_BRIDGES
        .iter()
        .find(|(v, p, _)| *v == vid && *p == pid)
        .map(|(_, _, name)| *name)
}

/// Serial ports that look like acquisition nodes.
pub fn available_nodes() -> Result<Vec<NodePort>, ConnectorError> {
    let mut nodes = Vec::new();

    for info in serialport::available_ports()? {
        let SerialPortType::UsbPort(usb) = &info.port_type else {
            continue;
        };
        let Some(bridge) = bridge_name(usb.vid, usb.pid) else {
            continue;
        };
        nodes.push(NodePort {
            name: usb.product.clone().unwrap_or_else(|| bridge.to_string()),
            port: info.port_name.clone(),
            bridge,
        });
    }

    Ok(nodes)
}

/// Open the given port, or the first discovered node when `port` is `None`.
pub fn connect(port: Option<&str>, baud_rate: u32) -> Result<Box<dyn SerialPort>, ConnectorError> {
    let port_name = match port {
        Some(port) => port.to_string(),
        None => {
            let node = available_nodes()?
                .into_iter()
                .next()
                .ok_or(ConnectorError::NodeNotFound)?;
            log::debug!("Found {} ({}) at {}", node.name, node.bridge, node.port);
            node.port
        }
    };

    log::debug!("Connecting to acquisition node on {}", port_name);
    Ok(open_link(&port_name, baud_rate)?)
}
