//! Headless driver: connect the given device numbers and print movement
//! changes as they stream in. Useful for soak-testing controllers without
//! the game running.
//!
//! ```text
//! ble_pong <device-number> [<device-number> ...]
//! ```

use anyhow::Context;
use ble_pong::infrastructure::logging;
use ble_pong::{
    BtleplugTransport, ConnectionRegistry, MessageSeverity, PlayerRoster, RegistryConfig,
    Settings, SettingsService,
};
use std::time::Duration;
use tracing::{error, info, warn};

fn main() -> anyhow::Result<()> {
    let settings_service = SettingsService::new()?;
    let _logging_guard = logging::init_logger(&settings_service.get().log_settings)?;
    let settings = settings_service.get().clone();

    let device_numbers: Vec<u8> = std::env::args()
        .skip(1)
        .map(|arg| {
            arg.parse::<u8>()
                .with_context(|| format!("not a device number: {:?}", arg))
        })
        .collect::<anyhow::Result<_>>()?;
    if device_numbers.is_empty() {
        anyhow::bail!("usage: ble_pong <device-number> [<device-number> ...]");
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(settings, device_numbers))
}

async fn run(settings: Settings, device_numbers: Vec<u8>) -> anyhow::Result<()> {
    let transport = BtleplugTransport::new()
        .await
        .context("no usable bluetooth adapter")?;
    let roster = PlayerRoster::load_or_default(&settings.roster_path);
    let mut registry = ConnectionRegistry::new(transport, roster, RegistryConfig::from(&settings));

    for (i, &device_number) in device_numbers
        .iter()
        .enumerate()
        .take(registry.player_count())
    {
        registry.request_connect(i + 1, device_number)?;
    }

    info!("Playing to {} points", registry.points_to_win());

    let mut last_movement = vec![0i32; registry.player_count()];
    let mut frame = tokio::time::interval(Duration::from_millis(16));
    loop {
        tokio::select! {
            _ = frame.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                registry.disconnect_all();
                break;
            }
        }

        registry.process_events();
        while let Some(status) = registry.poll_status() {
            match status.severity {
                MessageSeverity::Error => error!("{}", status.message),
                MessageSeverity::Warning => warn!("{}", status.message),
                _ => info!("{}", status.message),
            }
        }

        for slot in 1..=registry.player_count() {
            let movement = registry.movement_for(slot);
            if movement != last_movement[slot - 1] {
                info!("{}: movement {}", registry.display_name_for(slot), movement);
                last_movement[slot - 1] = movement;
            }
        }
    }

    Ok(())
}
