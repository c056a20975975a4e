//! List available audio capture and playback devices.

use crate::recording::audio::suppress_alsa_warnings;
use crate::session::SessionError;
use cpal::traits::{DeviceTrait, HostTrait};

/// One enumerated device, ready to print.
struct DeviceEntry {
    name: String,
    is_default: bool,
    config: Option<(u32, u16)>,
}

/// Lists the capture and playback devices on the system.
///
/// The IDs printed here can be used for `device` and `output_device` in the config file.
///
/// # Errors
/// - If the audio host cannot enumerate devices
pub fn handle_list_devices() -> anyhow::Result<()> {
    let (inputs, outputs) = suppress_alsa_warnings(|| {
        let host = cpal::default_host();
        let default_input = host.default_input_device().and_then(|d| d.name().ok());
        let default_output = host.default_output_device().and_then(|d| d.name().ok());

        let inputs = host
            .input_devices()
            .map_err(|e| SessionError::Device(format!("Failed to enumerate input devices: {e}")))?
            .filter_map(|d| {
                let name = d.name().ok()?;
                Some(DeviceEntry {
                    is_default: default_input.as_ref() == Some(&name),
                    config: d
                        .default_input_config()
                        .ok()
                        .map(|c| (c.sample_rate().0, c.channels())),
                    name,
                })
            })
            .collect::<Vec<_>>();

        let outputs = host
            .output_devices()
            .map_err(|e| SessionError::Device(format!("Failed to enumerate output devices: {e}")))?
            .filter_map(|d| {
                let name = d.name().ok()?;
                Some(DeviceEntry {
                    is_default: default_output.as_ref() == Some(&name),
                    config: d
                        .default_output_config()
                        .ok()
                        .map(|c| (c.sample_rate().0, c.channels())),
                    name,
                })
            })
            .collect::<Vec<_>>();

        Ok((inputs, outputs))
    })?;

    println!();
    print_section("Capture devices (audio.device)", &inputs);
    print_section("Playback devices (audio.output_device)", &outputs);
    Ok(())
}

fn print_section(title: &str, devices: &[DeviceEntry]) {
    println!("{title}:");
    println!();
    if devices.is_empty() {
        println!("  none found");
        println!();
        return;
    }
    for (index, device) in devices.iter().enumerate() {
        let default_indicator = if device.is_default { " [DEFAULT]" } else { "" };
        let config_info = match device.config {
            Some((sample_rate, channels)) => format!(" ({sample_rate}Hz, {channels} channels)"),
            None => " (configuration unavailable)".to_string(),
        };
        println!("  ID: {index}");
        println!("    Name: {}{}", device.name, default_indicator);
        println!("    Config:{config_info}");
        println!();
    }
}
