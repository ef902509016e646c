// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! - Running the appliance loop
//! - Taking a single photo
//! - Sampling sensors
//! - Inspecting and editing configuration

use pocketcam::app::{self, Action, AppEvent, InputEvent, NullSink};
use pocketcam::backends::camera::{CameraBackendType, FrameSource, device_factory};
use pocketcam::backends::sensors::simulated::SimulatedSensors;
use pocketcam::backends::sensors::{SensorPoller, SensorSet};
use pocketcam::config::{CameraSettings, ConfigProvider, JsonConfigStore, StorageSettings};
use pocketcam::storage::{PhotoStorage, PhotoStore};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Run the appliance until Ctrl-C, `quit`, or a long-press shutdown
pub fn run(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = JsonConfigStore::load(config_path)?;
    let (sender, receiver) = mpsc::channel();

    let mut orchestrator = app::assemble(Box::new(config), Box::new(NullSink::default()), receiver)?;

    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))?;

    // Stdin stands in for the touch panel and buttons on a desktop
    std::thread::Builder::new()
        .name("stdin-input".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                match parse_command(&line) {
                    Some(event) => {
                        if sender.send(event).is_err() {
                            break;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => eprintln!("unknown command: {}", line.trim()),
                }
            }
        })?;

    println!("pocketcam {} running. Commands: capture, flash, filter, brightness, iso N,", env!("GIT_VERSION"));
    println!("  settings, gallery, back, press, release SECS, rotate N, shutdown, quit");
    orchestrator.run(stop)?;
    Ok(())
}

/// Map a stdin line to an input event
fn parse_command(line: &str) -> Option<InputEvent> {
    let mut words = line.split_whitespace();
    let command = words.next()?;
    let arg = words.next();

    let event = match command {
        "capture" | "c" => InputEvent::Shutter,
        "flash" => InputEvent::Action(Action::CycleFlash),
        "filter" => InputEvent::Action(Action::CycleFilter),
        "brightness" => InputEvent::Action(Action::CycleBrightness),
        "iso" => InputEvent::Action(Action::SetIso(arg?.parse().ok()?)),
        "settings" => InputEvent::Action(Action::Navigate(AppEvent::OpenSettings)),
        "gallery" => InputEvent::Action(Action::Navigate(AppEvent::OpenGallery)),
        "back" => InputEvent::Action(Action::Navigate(AppEvent::BackToCamera)),
        "shutdown" => InputEvent::Action(Action::Navigate(AppEvent::ShutdownRequest)),
        "press" => InputEvent::EncoderPressed,
        "release" => InputEvent::EncoderReleased {
            held: Duration::from_secs_f32(arg.and_then(|a| a.parse().ok()).unwrap_or(0.0f32).max(0.0)),
        },
        "rotate" => InputEvent::EncoderRotated(arg.and_then(|a| a.parse().ok()).unwrap_or(1)),
        "touch" => InputEvent::Touch {
            x: arg?.parse().ok()?,
            y: words.next()?.parse().ok()?,
            action: None,
        },
        "quit" | "q" => InputEvent::Action(Action::Quit),
        _ => return None,
    };
    Some(event)
}

/// Take one still photo and exit
pub fn take_photo(
    config_path: &Path,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = JsonConfigStore::load(config_path)?;
    let settings = CameraSettings::from_config(&config);
    let storage = StorageSettings::from_config(&config);

    let mut camera = FrameSource::open(device_factory(&settings), &settings)?;
    println!("Using camera: {}", camera.device_name());

    let target = match output {
        Some(path) if path.is_dir() => PhotoStore::open(path)?.next_path()?,
        Some(path) => path,
        None => PhotoStore::open(&storage.photos_dir)?.next_path()?,
    };

    println!("Capturing {}...", settings.capture);
    let saved = camera.capture_photo(&target, settings.capture_quality)?;
    println!("Photo saved: {}", saved.display());

    if let Ok(mut store) = PhotoStore::open(&storage.photos_dir)
        && saved.starts_with(store.photos_dir())
        && let Err(e) = store.enforce_limit(storage.max_photos)
    {
        warn!(error = %e, "Photo retention failed");
    }
    Ok(())
}

/// Sample sensors for `duration_secs` and print a line per second
pub fn print_sensors(config_path: &Path, duration_secs: u64) -> Result<(), Box<dyn std::error::Error>> {
    let config = JsonConfigStore::load(config_path)?;
    let settings = CameraSettings::from_config(&config);

    let set = match settings.backend {
        CameraBackendType::Simulated => SimulatedSensors::new().sensor_set(),
        CameraBackendType::V4l2 => SensorSet::detect(),
    };
    let mut poller = SensorPoller::start(set);

    let fmt_opt = |v: Option<String>| v.unwrap_or_else(|| "-".to_string());
    let deadline = Instant::now() + Duration::from_secs(duration_secs);
    println!("{:>10} {:>10} {:>8}", "lux", "tilt", "battery");
    while Instant::now() < deadline {
        std::thread::sleep(Duration::from_secs(1));
        let snapshot = poller.get_snapshot();
        println!(
            "{:>10} {:>10} {:>8}",
            fmt_opt(snapshot.lux().map(|v| format!("{v:.1}"))),
            fmt_opt(snapshot.tilt_deg().map(|v| format!("{v:.1}"))),
            fmt_opt(snapshot.battery_percent().map(|v| format!("{v}%"))),
        );
    }
    poller.stop();
    Ok(())
}

pub fn show_config(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = JsonConfigStore::load(config_path)?;
    println!("# {}", config_path.display());
    println!("{}", serde_json::to_string_pretty(config.document())?);
    Ok(())
}

pub fn set_config(
    config_path: &Path,
    section: &str,
    key: &str,
    raw: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = JsonConfigStore::load(config_path)?;
    let value = serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
    config.set_value(section, key, value.clone(), true)?;
    info!(section, key, %value, "Config updated");
    println!("{section}.{key} = {value}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("capture"), Some(InputEvent::Shutter));
        assert_eq!(
            parse_command("iso 800"),
            Some(InputEvent::Action(Action::SetIso(800)))
        );
        assert_eq!(parse_command("iso"), None);
        assert_eq!(
            parse_command("release 2.5"),
            Some(InputEvent::EncoderReleased {
                held: Duration::from_millis(2500)
            })
        );
        assert_eq!(parse_command("rotate -1"), Some(InputEvent::EncoderRotated(-1)));
        assert_eq!(parse_command("bogus"), None);
        assert_eq!(parse_command(""), None);
    }
}
