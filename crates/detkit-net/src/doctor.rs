use std::net::IpAddr;

use crate::{NetError, PortRange};

pub fn check_port_range(start: u16, end: u16) -> Result<PortRange, NetError> {
    PortRange::new(start, end)
}

pub fn check_ip(ip: &str) -> Result<IpAddr, NetError> {
    Ok(ip.parse()?)
}
