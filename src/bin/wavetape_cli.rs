use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use wavetape::testing::{pulse_echo_signal, ScriptedCapturer, ScriptedEmitter};
use wavetape::{
    speed_of_sound, CaptureMode, DebugFrame, SonarConfig, SonarSession,
};

#[derive(Parser, Debug)]
#[command(name = "wavetape_cli", about = "Acoustic pulse-echo distance measurement")]
struct Cli {
    /// Load configuration overrides from a JSON file
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Measure distances with the default audio devices
    Measure {
        /// Seconds to keep measuring before exiting
        #[arg(long, default_value_t = 10.0)]
        duration: f32,
        /// Use onset-triggered continuous capture instead of snapshots
        #[arg(long)]
        continuous: bool,
        /// Ambient temperature in degrees Celsius
        #[arg(long)]
        temperature: Option<f32>,
        /// Write the last conditioned envelope to a WAV file on exit
        #[arg(long)]
        dump_wav: Option<PathBuf>,
    },
    /// Run a synthetic echo through the full pipeline and verify the result
    Selftest,
    /// Print the advisory measurement range for the configuration
    Range,
}

fn main() -> ExitCode {
    env_logger::init();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = cli
        .config
        .map(SonarConfig::load_from_file)
        .unwrap_or_default();

    match cli.command {
        Commands::Measure {
            duration,
            continuous,
            temperature,
            dump_wav,
        } => run_measure(config, duration, continuous, temperature, dump_wav),
        Commands::Selftest => run_selftest(config),
        Commands::Range => run_range(config),
    }
}

fn run_measure(
    mut config: SonarConfig,
    duration: f32,
    continuous: bool,
    temperature: Option<f32>,
    dump_wav: Option<PathBuf>,
) -> Result<ExitCode> {
    if continuous {
        config.capture_mode = CaptureMode::Continuous;
    }
    if let Some(t) = temperature {
        config.temperature_c = t;
    }

    let mut session = SonarSession::with_default_devices(config);
    let range = session.valid_range();
    println!(
        "Valid range: {:.3} m .. {:.3} m",
        range.min_m, range.max_m
    );

    let last_frame: Arc<Mutex<Option<DebugFrame>>> = Arc::new(Mutex::new(None));
    let frame_sink = Arc::clone(&last_frame);

    session
        .start(
            Box::new(|distance_m| {
                println!("{distance_m:.3} m");
            }),
            Some(Box::new(move |frame| {
                if let Ok(mut slot) = frame_sink.lock() {
                    *slot = Some(frame.clone());
                }
            })),
        )
        .context("starting measurement session")?;

    std::thread::sleep(Duration::from_secs_f32(duration));
    session.stop();

    if let Some(path) = dump_wav {
        let frame = last_frame.lock().ok().and_then(|mut slot| slot.take());
        match frame {
            Some(frame) => {
                write_envelope_wav(&path, &frame)
                    .with_context(|| format!("writing envelope to {}", path.display()))?;
                println!("Envelope written to {}", path.display());
            }
            None => println!("No envelope captured, nothing to dump"),
        }
    }

    Ok(ExitCode::from(0))
}

fn run_selftest(mut config: SonarConfig) -> Result<ExitCode> {
    // Known geometry: echo 20 ms after the pulse, so the pipeline should
    // report delay * speed_of_sound / 2.
    let sample_rate = 48_000;
    let echo_delay_s = 0.02;
    let expected = echo_delay_s * speed_of_sound(config.temperature_c) / 2.0;

    config.capture_mode = CaptureMode::Continuous;
    config.num_measurements = 1;
    config.measure_period_ms = 20;
    config.window_duration_s = Some(8192.0 / sample_rate as f32);
    config.guard_samples = 0;
    config.sample_rate = sample_rate;

    let signal = pulse_echo_signal(sample_rate, 16_384, 0.005, echo_delay_s, 1.0, 0.6);
    let emitter = ScriptedEmitter::new();
    let mut session = SonarSession::new(
        config,
        Box::new(emitter),
        Box::new(ScriptedCapturer::new(sample_rate, 512, signal)),
    );

    let measured: Arc<Mutex<Vec<f32>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&measured);
    session
        .start(
            Box::new(move |distance_m| {
                if let Ok(mut values) = sink.lock() {
                    values.push(distance_m);
                }
            }),
            None,
        )
        .context("starting selftest session")?;

    std::thread::sleep(Duration::from_millis(300));
    session.stop();

    let values = measured.lock().expect("measurement sink poisoned");
    let Some(&distance) = values.first() else {
        println!("FAIL: no measurement produced");
        return Ok(ExitCode::from(2));
    };

    let report = serde_json::json!({
        "expected_m": expected,
        "measured_m": distance,
        "error_m": (distance - expected).abs(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    if (distance - expected).abs() < 0.2 {
        println!("OK");
        Ok(ExitCode::from(0))
    } else {
        println!("FAIL: measurement outside tolerance");
        Ok(ExitCode::from(2))
    }
}

fn run_range(config: SonarConfig) -> Result<ExitCode> {
    let range = wavetape::dsp::valid_range(&config, config.sample_rate);
    let report = serde_json::json!({
        "min_m": range.min_m,
        "max_m": range.max_m,
        "speed_of_sound_ms": speed_of_sound(config.temperature_c),
        "temperature_c": config.temperature_c,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(ExitCode::from(0))
}

fn write_envelope_wav(path: &PathBuf, frame: &DebugFrame) -> Result<()> {
    let envelope_rate =
        frame.envelope.sample_rate / frame.envelope.samples_per_step.max(1) as u32;
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: envelope_rate.max(1),
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in &frame.envelope.samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}
