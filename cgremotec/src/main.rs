#![warn(clippy::all)]
#![allow(deprecated)]

use cgremote::Backend;
use cgremote::EventFilterMask;
use cgremote::EventSuppressionState;
use cgremote::LocalEventClass;
use cgremote::MAX_BUTTON_COUNT;
use cgremote::Point;
use cgremote::RemoteOperation;
use cgremote::RemoteOperationConfig;
use cgremote::ScreenUpdateOperation;
use clap::Parser;
use clap::ValueEnum;
use color_eyre::eyre;
use color_eyre::eyre::bail;
use std::path::PathBuf;
use std::time::Duration;
use strum::IntoEnumIterator;
use tracing_subscriber::EnvFilter;

#[derive(Copy, Clone, ValueEnum)]
enum BooleanState {
    Enable,
    Disable,
}

impl From<BooleanState> for bool {
    fn from(b: BooleanState) -> Self {
        match b {
            BooleanState::Enable => true,
            BooleanState::Disable => false,
        }
    }
}

#[derive(Copy, Clone, ValueEnum)]
enum BackendArg {
    Quartz,
    Simulated,
}

impl From<BackendArg> for Backend {
    fn from(backend: BackendArg) -> Self {
        match backend {
            BackendArg::Quartz => Backend::Quartz,
            BackendArg::Simulated => Backend::Simulated,
        }
    }
}

#[derive(Copy, Clone, ValueEnum)]
enum SuppressionStateArg {
    SuppressionInterval,
    RemoteMouseDrag,
}

impl From<SuppressionStateArg> for EventSuppressionState {
    fn from(state: SuppressionStateArg) -> Self {
        match state {
            SuppressionStateArg::SuppressionInterval => EventSuppressionState::SuppressionInterval,
            SuppressionStateArg::RemoteMouseDrag => EventSuppressionState::RemoteMouseDrag,
        }
    }
}

#[derive(Copy, Clone, ValueEnum)]
enum EventClassArg {
    Mouse,
    Keyboard,
    SystemDefined,
}

impl From<EventClassArg> for LocalEventClass {
    fn from(class: EventClassArg) -> Self {
        match class {
            EventClassArg::Mouse => LocalEventClass::Mouse,
            EventClassArg::Keyboard => LocalEventClass::Keyboard,
            EventClassArg::SystemDefined => LocalEventClass::SystemDefined,
        }
    }
}

#[derive(Parser)]
struct Warp {
    /// X coordinate in global display space
    x: f64,
    /// Y coordinate in global display space
    y: f64,
}

#[derive(Parser)]
struct Associate {
    #[clap(value_enum)]
    boolean_state: BooleanState,
}

#[derive(Parser)]
struct Click {
    /// X coordinate in global display space
    x: f64,
    /// Y coordinate in global display space
    y: f64,
    /// Button to press (0 = primary, 1 = secondary, 2 = center)
    #[clap(short, long, default_value_t = 0)]
    button: u32,
    /// Leave the on-screen cursor where it was
    #[clap(long)]
    keep_cursor: bool,
}

#[derive(Parser)]
struct Scroll {
    /// Line deltas for up to three wheels, primary first
    #[clap(required = true, num_args = 1..=3, allow_hyphen_values = true)]
    wheels: Vec<i32>,
}

#[derive(Parser)]
struct Key {
    /// Virtual key code
    key_code: u16,
    /// Character generated by the key
    #[clap(short, long)]
    char: Option<char>,
    /// Only post the key down event
    #[clap(long)]
    down_only: bool,
}

#[derive(Parser)]
struct WatchRefresh {
    /// Stop after this many updates
    #[clap(short, long)]
    count: Option<usize>,
    /// Report moves separately instead of as refreshes
    #[clap(short, long)]
    r#move: bool,
    /// Ask the server to coalesce rectangles
    #[clap(short, long)]
    reduced: bool,
}

#[derive(Parser)]
struct WatchServer {
    /// How often to check the port, in milliseconds
    #[clap(short, long, default_value_t = 500)]
    poll: u64,
}

#[derive(Parser)]
struct Suppression {
    /// Set the suppression interval in seconds before printing
    #[clap(short, long)]
    interval: Option<f64>,
}

#[derive(Parser)]
struct Filter {
    #[clap(value_enum)]
    state: SuppressionStateArg,
    /// Local event classes to permit during the suppression state
    #[clap(value_enum)]
    classes: Vec<EventClassArg>,
}

#[derive(Parser)]
#[clap(author, about, version)]
struct Opts {
    /// Path to a configuration JSON file
    #[clap(long, global = true)]
    config: Option<PathBuf>,
    /// Window server backend to use, overriding the configuration file
    #[clap(value_enum, long, global = true)]
    backend: Option<BackendArg>,
    #[clap(subcommand)]
    subcmd: SubCommand,
}

#[derive(Parser)]
enum SubCommand {
    /// Show cursor visibility, framebuffer drawing and position
    Cursor,
    /// Move the cursor without generating events
    #[clap(arg_required_else_help = true)]
    Warp(Warp),
    /// Connect or disconnect mouse movement and the cursor
    #[clap(arg_required_else_help = true)]
    Associate(Associate),
    /// Post a mouse down and mouse up at a position
    #[clap(arg_required_else_help = true)]
    Click(Click),
    /// Post a scroll wheel event
    #[clap(arg_required_else_help = true)]
    Scroll(Scroll),
    /// Post a keyboard event
    #[clap(arg_required_else_help = true)]
    Key(Key),
    /// Print screen updates as JSON lines as they arrive
    WatchRefresh(WatchRefresh),
    /// Block until the window server exits
    WatchServer(WatchServer),
    /// Show the suppression interval and the filter of every suppression state
    Suppression(Suppression),
    /// Set the local events permitted during a suppression state
    #[clap(arg_required_else_help = true)]
    Filter(Filter),
    /// Generate a JSON Schema of the configuration file
    Schema,
}

pub fn setup() -> eyre::Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        unsafe {
            std::env::set_var("RUST_LIB_BACKTRACE", "1");
        }
    }

    color_eyre::install()?;

    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", "info");
        }
    }

    tracing::subscriber::set_global_default(
        tracing_subscriber::fmt::Subscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .finish(),
    )?;

    // Record panics as tracing events so they land next to everything else
    std::panic::set_hook(Box::new(|panic| {
        panic.location().map_or_else(
            || {
                tracing::error!(message = %panic);
            },
            |location| {
                tracing::error!(
                    message = %panic,
                    panic.file = location.file(),
                    panic.line = location.line(),
                    panic.column = location.column(),
                );
            },
        );
    }));

    Ok(())
}

fn connect(opts: &Opts) -> eyre::Result<RemoteOperation> {
    let mut config = match &opts.config {
        Some(path) => RemoteOperationConfig::read(path)?,
        None => RemoteOperationConfig::load()?,
    };

    if let Some(backend) = opts.backend {
        config.backend = backend.into();
    }

    Ok(RemoteOperation::with_config(&config)?)
}

fn print_suppression(remote: &RemoteOperation) {
    println!(
        "interval: {:.3}s",
        remote.local_events_suppression_interval().as_secs_f64()
    );

    for state in EventSuppressionState::iter() {
        let filter = remote.local_events_filter_during_suppression_state(state);
        let permitted = LocalEventClass::iter()
            .filter(|class| filter.permits(*class))
            .map(|class| class.to_string())
            .collect::<Vec<_>>();

        println!("{state}: {:#x} [{}]", filter.bits(), permitted.join(", "));
    }
}

fn main() -> eyre::Result<()> {
    let opts: Opts = Opts::parse();

    if let SubCommand::Schema = opts.subcmd {
        #[cfg(feature = "schemars")]
        {
            let schema = RemoteOperationConfig::json_schema()?;
            println!("{schema}");
        }

        return Ok(());
    }

    setup()?;
    let remote = connect(&opts)?;

    match opts.subcmd {
        SubCommand::Cursor => {
            let position = remote.server().cursor_position()?;
            println!("visible: {}", remote.cursor_is_visible());
            println!(
                "drawn in framebuffer: {}",
                remote.cursor_is_drawn_in_framebuffer()
            );
            println!("position: {}, {}", position.x, position.y);
        }
        SubCommand::Warp(args) => {
            remote.warp_mouse_cursor_position(Point::new(args.x, args.y))?;
        }
        SubCommand::Associate(args) => {
            remote.associate_mouse_and_mouse_cursor_position(args.boolean_state.into())?;
        }
        SubCommand::Click(args) => {
            if args.button >= MAX_BUTTON_COUNT {
                bail!("button must be below {MAX_BUTTON_COUNT}");
            }

            let position = Point::new(args.x, args.y);
            let mut buttons = vec![false; args.button as usize + 1];

            buttons[args.button as usize] = true;
            remote.post_mouse_event(position, !args.keep_cursor, &buttons)?;

            buttons[args.button as usize] = false;
            remote.post_mouse_event(position, !args.keep_cursor, &buttons)?;
        }
        SubCommand::Scroll(args) => {
            remote.post_scroll_wheel_event(&args.wheels)?;
        }
        SubCommand::Key(args) => {
            let char_code = match args.char {
                Some(c) => {
                    let mut units = [0; 2];
                    match c.encode_utf16(&mut units) {
                        [unit] => *unit,
                        _ => bail!("'{c}' does not fit in a single UTF-16 code unit"),
                    }
                }
                None => 0,
            };

            remote.post_keyboard_event(char_code, args.key_code, true)?;
            if !args.down_only {
                remote.post_keyboard_event(char_code, args.key_code, false)?;
            }
        }
        SubCommand::WatchRefresh(args) => {
            if remote.server().name() == "simulated" {
                bail!("the simulated window server only reports changes made in-process");
            }

            let mut requested = ScreenUpdateOperation::REFRESH;
            if args.r#move {
                requested |= ScreenUpdateOperation::MOVE;
            }
            if args.reduced {
                requested |= ScreenUpdateOperation::REDUCED_DIRTY_RECTANGLE_COUNT;
            }

            let mut seen = 0;
            while args.count.is_none_or(|count| seen < count) {
                let update = remote.wait_for_screen_update_rects(requested)?;
                let line = serde_json::json!({
                    "operation": if update.operation.is_move() { "move" } else { "refresh" },
                    "delta": update.delta,
                    "rects": &*update.rects,
                });

                println!("{line}");
                seen += 1;
            }
        }
        SubCommand::WatchServer(args) => {
            let Some(port) = remote.window_server_create_server_port() else {
                bail!("the window server is not running");
            };

            port.on_invalidation(|| tracing::info!("window server port invalidated"));

            tracing::info!("watching the {} window server", remote.server().name());
            while port.is_valid() {
                std::thread::sleep(Duration::from_millis(args.poll));
            }

            println!("window server exited");
        }
        SubCommand::Suppression(args) => {
            if let Some(interval) = args.interval {
                remote.set_local_events_suppression_interval_secs(interval)?;
            }

            print_suppression(&remote);
        }
        SubCommand::Filter(args) => {
            let filter = args
                .classes
                .into_iter()
                .map(LocalEventClass::from)
                .collect::<EventFilterMask>();

            remote.set_local_events_filter_during_suppression_state(filter, args.state.into())?;
            print_suppression(&remote);
        }
        SubCommand::Schema => {}
    }

    Ok(())
}
