//! Poll a simulated Alt tracker through a connect / track / unplug / replug cycle.
//!
//! Usage: RUST_LOG=debug cargo run --example simulated

use alt_tracker::sim::{SimControl, SimDevice};
use alt_tracker::{AltTracker, NodeHandle, Pose, Quaternion, Settings, Stage, Vector3};
use std::time::{Duration, Instant};

fn main() {
    env_logger::init();

    let device = SimDevice::new();
    device.send(SimControl::Store {
        key: "environment".into(),
        value: "AntilatencyAltEnvironmentHorizontalGrid~demo".into(),
    });

    let script = device.sender();
    let driver = std::thread::spawn(move || {
        let steps = [
            (200, SimControl::Connect(NodeHandle(1))),
            (
                0,
                SimControl::SetState {
                    pose: Pose::IDENTITY,
                    velocity: Vector3::ZERO,
                    stage: Stage::InertialDataInitialization,
                },
            ),
            (
                300,
                SimControl::SetState {
                    pose: Pose::new(
                        Vector3::new(0.05, 1.7, -0.2),
                        Quaternion::new(0.0, 0.2588, 0.0, 0.9659),
                    ),
                    velocity: Vector3::new(0.1, 0.0, 0.0),
                    stage: Stage::Tracking6Dof,
                },
            ),
            (700, SimControl::Disconnect(NodeHandle(1))),
            (400, SimControl::Connect(NodeHandle(2))),
        ];
        for (delay_ms, msg) in steps {
            std::thread::sleep(Duration::from_millis(delay_ms));
            if script.send(msg).is_err() {
                break;
            }
        }
    });

    let settings = Settings {
        extrapolation_time: 0.03,
        ..Settings::from_env()
    };
    let mut tracker = AltTracker::new(device.collaborators(), settings);
    if let Err(e) = tracker.start_tracker() {
        eprintln!("Failed to start tracker: {}", e);
        std::process::exit(1);
    }

    println!("Polling simulated tracker at 100 Hz...");

    let start = Instant::now();
    let mut count: u64 = 0;
    while start.elapsed() < Duration::from_millis(2500) {
        let d = tracker.sample();
        count += 1;
        if count % 10 == 1 {
            println!(
                "t={:>5}ms  tracking={:<5}  pos=[{:+8.2}, {:+8.2}, {:+8.2}]  ypr=[{:+7.2}, {:+7.2}, {:+7.2}]",
                start.elapsed().as_millis(),
                tracker.is_tracking(),
                d.tx, d.ty, d.tz,
                d.yaw, d.pitch, d.roll,
            );
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    let _ = driver.join();
    println!("\nTotal: {} samples", count);
}
