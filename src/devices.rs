//! Input-device enumeration and selection.

use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, HostTrait};

#[derive(Debug, Clone)]
pub struct InputDevice {
    pub id: usize,
    pub name: String,
    pub channels: u16,
    pub sample_rate: u32,
    pub host_api: String,
}

pub fn list() -> Result<Vec<InputDevice>> {
    let host = cpal::default_host();
    let host_api = host.id().name().to_string();

    let mut devices = Vec::new();
    for (id, device) in host.input_devices()?.enumerate() {
        let name = device.name().unwrap_or_else(|_| "unknown".into());
        // skip devices that refuse to report an input config
        let Ok(config) = device.default_input_config() else {
            continue;
        };
        devices.push(InputDevice {
            id,
            name,
            channels: config.channels(),
            sample_rate: u32::from(config.sample_rate()),
            host_api: host_api.clone(),
        });
    }
    Ok(devices)
}

/// Open a device by enumeration id, or the default input device.
pub fn open(id: Option<usize>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    match id {
        Some(id) => host
            .input_devices()?
            .nth(id)
            .ok_or_else(|| anyhow!("input device {id} does not exist")),
        None => host
            .default_input_device()
            .ok_or_else(|| anyhow!("no default input device")),
    }
}
