// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
use std::env;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use flir_lepton::acquisition::Acquisition;
use flir_lepton::arbiter::{Consumer, FrameArbiter};
use flir_lepton::{Lepton, StdClock, VideoMode};
use linux_embedded_hal::spidev::{SpiModeFlags, SpidevOptions};
use linux_embedded_hal::sysfs_gpio::Direction;
use linux_embedded_hal::{Delay, I2cdev, Pin, Spidev};
use log::{error, info, warn};

const USAGE: &str =
    "Usage: capture <I2C bus> <SPI device> <chip select GPIO> <reset GPIO> [num_frames]";

fn output_pin(number: u64, initial: Direction) -> anyhow::Result<Pin> {
    let pin = Pin::new(number);
    pin.export()
        .with_context(|| format!("exporting GPIO {}", number))?;
    pin.set_direction(initial)
        .with_context(|| format!("configuring GPIO {}", number))?;
    Ok(pin)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    if args.len() < 5 || args.len() > 6 {
        bail!(USAGE);
    }
    let num_frames: u64 = match args.get(5) {
        Some(count) => count.parse().context("num_frames must be a number")?,
        None => 27,
    };
    let i2c_bus = I2cdev::new(&args[1]).with_context(|| format!("opening {}", args[1]))?;
    let mut spi_bus = Spidev::open(&args[2]).with_context(|| format!("opening {}", args[2]))?;
    spi_bus.configure(
        &SpidevOptions::new()
            .bits_per_word(8)
            .max_speed_hz(16_000_000)
            .mode(SpiModeFlags::SPI_MODE_3)
            .build(),
    )?;
    let chip_select = output_pin(args[3].parse()?, Direction::High)?;
    let reset = output_pin(args[4].parse()?, Direction::High)?;

    let mut camera = Lepton::new(i2c_bus, spi_bus, chip_select, reset, Delay, StdClock::new());
    camera.boot()?;
    while !camera.poll_ready()? {
        thread::sleep(Duration::from_millis(50));
    }
    let metadata = camera
        .metadata()
        .ok_or_else(|| anyhow!("camera ready without metadata"))?;
    println!("Serial number: {:#018X}", metadata.serial_number());
    println!("Part number: {}", metadata.part_number());
    let revision = metadata.software_revision();
    println!(
        "Software revision: GPP {}.{}.{}, DSP {}.{}.{}",
        revision[0], revision[1], revision[2], revision[3], revision[4], revision[5]
    );
    camera.set_video_mode(VideoMode::TLinear)?;
    camera.enable_vsync()?;

    let geometry = *camera.geometry();
    let (producer, consumer) = FrameArbiter::new(geometry.stream_len());
    let printer = thread::spawn(move || print_frames(consumer, num_frames, geometry.width));

    // The camera and its buses stay on this thread.
    let mut acquisition = Acquisition::new(producer);
    while !printer.is_finished() {
        if let Err(err) = acquisition.cycle(&mut camera) {
            warn!("Frame read failed: {}", err);
        }
    }
    printer
        .join()
        .map_err(|_| anyhow!("frame printing thread panicked"))?;
    info!("Acquisition finished: {:?}", acquisition.stats());
    Ok(())
}

/// Print a summary of each frame, treating pixels as centikelvin.
fn print_frames(consumer: Consumer, num_frames: u64, width: usize) {
    let mut last_seen = 0;
    let mut printed = 0;
    while printed < num_frames {
        let frame = match consumer.wait_for_frame(last_seen, Duration::from_secs(5)) {
            Some(frame) => frame,
            None => {
                error!("No frame published in the last five seconds");
                continue;
            }
        };
        last_seen = frame.sequence();
        let pixels: Vec<u16> = frame
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        drop(frame);
        let to_celsius = |centikelvin: u16| f32::from(centikelvin) / 100.0 - 273.15;
        let min = pixels.iter().copied().min().unwrap_or(0);
        let max = pixels.iter().copied().max().unwrap_or(0);
        let center = pixels[pixels.len() / 2 + width / 2];
        println!(
            "Frame {}: min {:.2}°C max {:.2}°C center {:.2}°C",
            last_seen,
            to_celsius(min),
            to_celsius(max),
            to_celsius(center)
        );
        printed += 1;
    }
}
