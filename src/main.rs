use std::path::PathBuf;

use clap::{Parser, Subcommand};
use mecanum_runtime::motor::ProfileTable;
use mecanum_runtime::motor::sim::{SimBoard, WriteKind};
use mecanum_runtime::{ConfigError, Direction, Motion, MotionCommand, Runtime, Settings};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

#[derive(Parser)]
#[command(version, about = "Mecanum base motor controller (simulated board)")]
struct Cli {
    /// Profile table (JSON); the built-in table is used when omitted
    #[arg(long, global = true)]
    profiles: Option<PathBuf>,

    /// Runtime settings (JSON)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List profiles and their pin maps
    Profiles,
    /// Execute one timed motion
    Run {
        #[arg(long)]
        profile: String,
        /// Motion symbol, e.g. FW, strafe-left, front_left
        motion: Motion,
        #[arg(long, default_value_t = 100)]
        speed: i32,
        #[arg(long, default_value_t = 1.5)]
        duration: f32,
        #[arg(long, default_value = "forward")]
        direction: Direction,
        /// Press start before running
        #[arg(long)]
        start: bool,
    },
}

fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), ConfigError> {
    let table = match &cli.profiles {
        Some(path) => ProfileTable::load(path)?,
        None => ProfileTable::builtin()?,
    };
    let settings = match &cli.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };

    match cli.command {
        Command::Profiles => {
            for (id, config) in table.iter() {
                println!("{id}:");
                for (role, pins) in config.iter() {
                    println!("  {:<12} dir={:<3} pwm={}", role, pins.dir, pins.pwm);
                }
            }
        }
        Command::Run {
            profile,
            motion,
            speed,
            duration,
            direction,
            start,
        } => {
            let board = SimBoard::new();
            let start_pin = settings.safety.start_pin;
            let pressed = settings.safety.start_polarity.is_asserted(true);
            let mut runtime = Runtime::new(board.clone(), board.delay(), table, &settings)?;
            runtime.select_profile(&profile)?;

            if start {
                runtime.poll_safety();
                board.set_input(start_pin, pressed);
                runtime.wait_for_start();
                board.set_input(start_pin, !pressed);
            }

            board.clear_trace();
            let cmd = MotionCommand {
                motion,
                speed,
                duration_s: duration,
                direction,
            };
            let outcome = runtime.run(&cmd);
            println!("{}", serde_json::to_string(&outcome)?);

            for write in board.trace() {
                let value = match write.kind {
                    WriteKind::Level(high) => format!("level={}", u8::from(high)),
                    WriteKind::Duty(duty) => format!("duty={duty}"),
                };
                println!("{:>8.3}s pin {:<2} {}", write.at.as_secs_f32(), write.pin, value);
            }
            println!("{} writes, finished at {:?}", board.trace().len(), board.now());
        }
    }
    Ok(())
}
