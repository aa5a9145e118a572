//! Live broadcast-radio receiver: opens an RTL2832U/R820T dongle, tunes to a
//! frequency, demodulates in a background thread, and streams the decoded
//! audio to stdout as interleaved 16-bit little-endian PCM, the same
//! contract `demod-stdin` and the grounding example's `output()` use.
//! Printing anything else to stdout would corrupt that stream, so all
//! logging goes to stderr via `stderrlog`.

use log::info;
use rtlsdr_radio::controller::AudioSink;
use rtlsdr_radio::{DeviceDescriptors, DeviceId, Mode, RadioController};
use std::env;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

const DEFAULT_FREQUENCY: u32 = 100_000_000;

struct AppConfig {
    frequency: u32,
    mode: Mode,
    gain_db: Option<f32>,
    ppm: i32,
    device_index: usize,
}

fn main() {
    stderrlog::new().verbosity(log::Level::Info).init().unwrap();
    if let Err(err) = run() {
        eprintln!("rtlsdr-radio: {}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let config = parse_args()?;

    match DeviceDescriptors::new() {
        Ok(descriptors) if !descriptors.is_empty() => {
            info!("found {} device(s):", descriptors.len());
            for dev in descriptors.iter() {
                info!("  {}: {}, {}, SN: {}", dev.index, dev.manufacturer, dev.product, dev.serial);
            }
        }
        Ok(_) => info!("no supported devices found during enumeration"),
        Err(e) => info!("device enumeration failed (continuing anyway): {}", e),
    }

    let sink: Box<dyn AudioSink> = Box::new(StdoutSink::new());
    let controller = RadioController::with_device(sink, DeviceId::Index(config.device_index));
    controller.set_on_error(|e| log::error!("radio error: {}", e));
    controller.set_mode(config.mode);
    controller.set_frequency(config.frequency);
    controller.set_correction_ppm(config.ppm);
    match config.gain_db {
        Some(db) => controller.set_manual_gain(db),
        None => controller.set_auto_gain(),
    }

    static SHUTDOWN: AtomicBool = AtomicBool::new(false);
    ctrlc::set_handler(|| SHUTDOWN.store(true, Ordering::SeqCst))
        .map_err(|e| format!("failed to set signal handler: {}", e))?;

    controller.start();
    info!("tuned to {} Hz, waiting for ctrl-c", config.frequency);
    while !SHUTDOWN.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
    }
    info!("shutting down");
    controller.stop();
    // Controller's Drop impl blocks until the engine thread has closed the
    // device, so by the time this function returns it's safe to exit.
    Ok(())
}

/// Writes decoded blocks to stdout as interleaved i16 LE PCM, mirroring
/// `demod-stdin`'s `write_stereo` and the grounding example's raw-PCM
/// `output()`. Buffered and locked for the life of the process so every
/// write lands in order on one file descriptor.
struct StdoutSink {
    writer: Mutex<io::BufWriter<io::Stdout>>,
}

impl StdoutSink {
    fn new() -> Self {
        StdoutSink {
            writer: Mutex::new(io::BufWriter::new(io::stdout())),
        }
    }
}

impl AudioSink for StdoutSink {
    fn play(&mut self, left: &[f32], right: &[f32]) {
        let len = left.len().min(right.len());
        let mut buf = Vec::with_capacity(len * 4);
        for k in 0..len {
            let l = (left[k].clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            let r = (right[k].clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            buf.extend_from_slice(&l.to_le_bytes());
            buf.extend_from_slice(&r.to_le_bytes());
        }
        let mut writer = self.writer.lock().unwrap();
        if writer.write_all(&buf).is_err() {
            return;
        }
        let _ = writer.flush();
    }
}

fn parse_args() -> Result<AppConfig, String> {
    let mut config = AppConfig {
        frequency: DEFAULT_FREQUENCY,
        mode: Mode::Wbfm,
        gain_db: None,
        ppm: 0,
        device_index: 0,
    };
    let args: Vec<String> = env::args().skip(1).collect();
    let mut idx = 0;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            "-f" => {
                idx += 1;
                let value = args.get(idx).ok_or("missing value for -f")?;
                config.frequency = value
                    .parse::<u32>()
                    .map_err(|e| format!("invalid frequency: {}", e))?;
            }
            "-m" => {
                idx += 1;
                let value = args.get(idx).ok_or("missing value for -m")?;
                config.mode = match value.to_ascii_uppercase().as_str() {
                    "WBFM" => Mode::Wbfm,
                    "NBFM" => Mode::Nbfm { max_f: 5_000.0 },
                    "AM" => Mode::Am { bandwidth: 10_000.0 },
                    other => return Err(format!("unknown mode: {}", other)),
                };
            }
            "-g" => {
                idx += 1;
                let value = args.get(idx).ok_or("missing value for -g")?;
                config.gain_db = Some(
                    value
                        .parse::<f32>()
                        .map_err(|e| format!("invalid gain: {}", e))?,
                );
            }
            "-p" => {
                idx += 1;
                let value = args.get(idx).ok_or("missing value for -p")?;
                config.ppm = value
                    .parse::<i32>()
                    .map_err(|e| format!("invalid ppm correction: {}", e))?;
            }
            "-d" => {
                idx += 1;
                let value = args.get(idx).ok_or("missing value for -d")?;
                config.device_index = value
                    .parse::<usize>()
                    .map_err(|e| format!("invalid device index: {}", e))?;
            }
            other => return Err(format!("unrecognized argument: {}", other)),
        }
        idx += 1;
    }
    Ok(config)
}

fn print_usage() {
    eprintln!(
        "usage: rtlsdr-radio [-f hz] [-m WBFM|NBFM|AM] [-g gain_db] [-p ppm] [-d index]\n\n\
         -f    center frequency in Hz (default {})\n\
         -m    demodulation mode (default WBFM)\n\
         -g    manual tuner gain in dB (default: auto gain)\n\
         -p    frequency correction in ppm (default 0)\n\
         -d    device index among enumerated dongles (default 0)\n\n\
         writes interleaved 16-bit little-endian PCM to stdout; \
         pipe it to an audio player, e.g. `play -r 48000 -t raw -e s -b 16 -c 2 -`",
        DEFAULT_FREQUENCY
    );
}
