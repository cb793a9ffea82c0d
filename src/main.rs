use std::error::Error;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use bpaf::{Bpaf, Parser};
use roccat_vulcan::abi::{DEFAULT_WAVE_SPEED, MAX_WAVE_SPEED, MIN_WAVE_SPEED};
use roccat_vulcan::keymap;
use roccat_vulcan::locate::Strategy;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vulcan_rgb_core::{Board, KeyColor, LogicalKey, PinTable};

use crate::config::Config;
use crate::daemon::{Options, Reactive, Session};
use crate::pipe::Piped;
use crate::detection::{board_kind, BoardKind};

mod config;
mod daemon;
mod detection;
mod lock;
mod pipe;
mod render;

/// `KEY:R,G,B` key pin from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct KeyPin {
    code: u16,
    key: LogicalKey,
    color: KeyColor,
}

impl Display for KeyPin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", keymap::name(self.code), self.color)
    }
}

impl FromStr for KeyPin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, color) = s
            .split_once(':')
            .ok_or_else(|| format!("expected KEY:R,G,B but got '{s}'"))?;
        let code = keymap::parse_code(name).ok_or_else(|| format!("unknown key '{name}'"))?;
        let key = keymap::lookup(code).ok_or_else(|| format!("no key for '{name}' on this board"))?;
        Ok(Self {
            code,
            key,
            color: color.parse()?,
        })
    }
}

/// Parse a wave speed leniently: missing, zero or garbage means the default,
/// anything else is clamped into range.
fn wave_speed(arg: Option<&str>) -> u8 {
    match arg.map(|s| s.trim().parse::<i64>()) {
        Some(Ok(0)) | Some(Err(_)) | None => DEFAULT_WAVE_SPEED,
        Some(Ok(speed)) => speed.clamp(MIN_WAVE_SPEED as i64, MAX_WAVE_SPEED as i64) as u8,
    }
}

#[derive(Clone, Debug, Bpaf)]
#[bpaf(options, version, descr(env!("CARGO_PKG_DESCRIPTION")))]
struct Cli {
    /// Log every report exchanged with the keyboard
    #[bpaf(short, long)]
    verbose: bool,
    #[bpaf(external(board_kind))]
    board: BoardKind,
    /// Control interface discovery: hidapi or hidraw. Overrides the config file.
    #[bpaf(long, argument("STRATEGY"))]
    strategy: Option<Strategy>,
    /// Delay between reconnection attempts, eg. `2s`. Overrides the config file.
    #[bpaf(long, argument("DURATION"))]
    retry: Option<humantime::Duration>,
    /// Pin a key to a fixed color, eg. `-k KEY_ESC:255,0,0`.
    /// Keys are evdev KEY_* names or raw input event codes.
    #[bpaf(short('k'), long("key"), argument("KEY:R,G,B"))]
    keys: Vec<KeyPin>,
    #[bpaf(external(command))]
    command: Command,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Command {
    /// Light held keys from the host (default).
    Run,
    /// Start the on-device wave animation and exit.
    Wave { speed: u8 },
    /// Turn every unpinned key off and exit.
    Off,
    /// Paint keys from `KEY:r,g,b` or `all:r,g,b` lines written to a named pipe.
    Pipe { path: PathBuf },
}

fn command() -> impl Parser<Command> {
    let run = bpaf::pure(Command::Run)
        .to_options()
        .descr("Light held keys from the host")
        .command("run")
        .help("Light held keys from the host (default)");

    let wave = bpaf::positional::<String>("SPEED")
        .help("Animation speed, 1 (slow) to 11 (fast). Defaults to 6")
        .optional()
        .map(|speed| Command::Wave {
            speed: wave_speed(speed.as_deref()),
        })
        .to_options()
        .descr("Start the on-device wave animation and exit")
        .command("wave")
        .help("Start the on-device wave animation and exit");

    let off = bpaf::pure(Command::Off)
        .to_options()
        .descr("Turn every unpinned key off and exit")
        .command("off")
        .help("Turn every unpinned key off and exit");

    let pipe = bpaf::positional::<PathBuf>("PATH")
        .help("Named pipe to read commands from, created if missing")
        .map(|path| Command::Pipe { path })
        .to_options()
        .descr("Paint keys from commands written to a named pipe")
        .footer("Lines are KEY:r,g,b or all:r,g,b with evdev KEY_* names. Pins do not apply.")
        .command("pipe")
        .help("Paint keys from commands written to a named pipe");

    bpaf::construct!([run, wave, off, pipe]).fallback(Command::Run)
}

/// Level used when `RUST_LOG` is unset. Verbose shows every report exchanged.
fn default_filter(verbose: bool) -> EnvFilter {
    EnvFilter::new(if verbose { "debug" } else { "info" })
}

fn setup_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(verbose));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn apply_wave(board: &mut dyn Board, speed: u8) -> Result<(), Box<dyn Error>> {
    board
        .as_hardware_effect()
        .ok_or("board does not support hardware effects")?
        .set_wave(speed)?;
    info!("wave effect started at speed {speed}");
    Ok(())
}

fn apply_off(board: &mut dyn Board, pins: &PinTable) -> Result<(), Box<dyn Error>> {
    let lighting = board
        .as_per_key_lighting()
        .ok_or("board does not support per-key lighting")?;
    lighting.enable_host_lighting()?;
    lighting.send_frame(None, pins)?;
    info!("lights off");
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = cli().run();
    setup_logging(cli.verbose);

    let config = Config::load_or_create()?;
    let strategy = cli.strategy.unwrap_or(config.general.strategy);
    let ready = config.handshake.ready_wait();

    let mut pins = config.lighting.pin_table(config.general.layout);
    for pin in &cli.keys {
        info!("pinned {pin}");
        pins.pin(pin.key, pin.color);
    }

    let _lock = lock::Lock::acquire()?;
    let opts = Options {
        board: cli.board,
        strategy,
        ready,
        frame: config.refresh.frame,
        retry: cli.retry.map(Into::into).unwrap_or(config.refresh.retry),
    };
    match cli.command {
        Command::Run => {
            let session = Session::new(pins, config.lighting.palette());
            daemon::run(&opts, &mut Reactive::new(session))
        },
        Command::Pipe { path } => daemon::run(&opts, &mut Piped::open(&path)?),
        Command::Wave { speed } => {
            let mut board = opts.board.as_board(strategy, ready)?;
            apply_wave(board.as_mut(), speed)
        },
        Command::Off => {
            let mut board = opts.board.as_board(strategy, ready)?;
            apply_off(board.as_mut(), &pins)
        },
    }
}
