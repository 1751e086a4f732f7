//! Command-line polling client

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use fieldpoll::model::*;
use fieldpoll::transport::{Framing, Link, Parity, SerialSettings, TransportSettings};
use fieldpoll::*;

const NODE: NodeId = NodeId(1);

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error("either --tcp or --serial must be given")]
    NoLink,
    #[error("bad TCP endpoint: {0}")]
    BadEndpoint(String),
    #[error("{0} cannot be used on this link")]
    BadFraming(String),
    #[error("channel was rejected: {0}")]
    Rejected(String),
    #[error("{0} values of {1} bits do not fit a dataset")]
    TooMany(u16, usize),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error("pipeline was shut down")]
    Shutdown,
}

#[derive(Parser)]
#[command(name = "fieldpoll-client")]
#[command(about = "A command line program for polling Modbus field devices using the fieldpoll crate")]
#[command(version)]
struct Cli {
    #[arg(long, help = "TCP endpoint of an RTU-over-TCP bridge (e.g. 192.168.1.10:502)")]
    tcp: Option<String>,

    #[arg(long, conflicts_with = "tcp", help = "Path of a serial port (e.g. /dev/ttyUSB0)")]
    serial: Option<String>,

    #[arg(long, default_value_t = 9600, help = "Baud rate of the serial port")]
    baud: u32,

    #[arg(long, default_value = "none", help = "Parity of the serial port (none, odd, even)")]
    parity: Parity,

    #[arg(short = 'f', long, help = "Framing (rtu, ascii, bridge), derived from the link when absent")]
    framing: Option<Framing>,

    #[arg(short = 'u', long, default_value_t = 1, help = "The unit id of the device")]
    unit: u8,

    #[arg(long, default_value = "standard", help = "Function set of the device (standard, vendor)")]
    protocol: Protocol,

    #[arg(short = 't', long, default_value_t = 1000, help = "Response timeout in milliseconds")]
    timeout: u64,

    #[arg(long, default_value = "header", help = "Frame logging (nothing, header, payload)")]
    frame_decode: FrameDecodeLevel,

    #[arg(long, default_value = "nothing", help = "Physical layer logging (nothing, length, data)")]
    phys_decode: PhysDecodeLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "poll a dataset and print every change")]
    Poll(PollArgs),

    #[command(about = "write one value")]
    Write(WriteArgs),

    #[command(about = "assign logical addresses to every unassigned vendor unit")]
    Enumerate(EnumerateArgs),
}

#[derive(Args)]
struct DatasetArgs {
    #[arg(short = 'c', long, default_value = "holding", help = "message class (coil, discrete, holding, input)")]
    class: MessageClass,

    #[arg(short = 's', long, help = "the starting address")]
    address: u16,

    #[arg(short = 'o', long, default_value_t = 0, help = "offset from the starting address")]
    offset: u16,

    #[arg(short = 'v', long, default_value = "uint16", help = "value class of each channel")]
    value: ValueClass,
}

#[derive(Args)]
struct PollArgs {
    #[command(flatten)]
    dataset: DatasetArgs,

    #[arg(short = 'q', long, default_value_t = 1, help = "quantity of values")]
    quantity: u16,

    #[arg(short = 'p', long, default_value_t = 1000, help = "polling period in milliseconds")]
    period: u64,

    #[arg(long, help = "poll on the fast list instead of the slow list")]
    fast: bool,
}

#[derive(Args)]
struct WriteArgs {
    #[command(flatten)]
    dataset: DatasetArgs,

    #[arg(short = 'i', long, default_value_t = 0, help = "position of the value in the dataset, in values (bits for bit values)")]
    index: u16,

    #[arg(help = "the value: true/false, an integer, a decimal or a bit string")]
    value: String,
}

#[derive(Args)]
struct EnumerateArgs {
    #[arg(short = 's', long, default_value_t = 2, help = "first logical unit id to assign")]
    first: u8,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    if let Err(ref e) = run().await {
        println!("error: {e}");
    }

    Ok(())
}

async fn run() -> Result<(), Error> {
    let cli = Cli::parse();

    let transceiver = Arc::new(Transceiver::new(
        settings(&cli)?,
        DecodeLevel::new(cli.frame_decode, cli.phys_decode),
    ));
    transceiver.connect().await?;

    let registry = Arc::new(Registry::new());
    let (controller, mut events) =
        Controller::start(transceiver, registry.clone(), ControllerConfig::default());
    controller.add_node(NODE, UnitId::new(cli.unit), cli.protocol);

    let result = match &cli.command {
        Command::Poll(args) => poll(&controller, &mut events, args).await,
        Command::Write(args) => write(&controller, args).await,
        Command::Enumerate(args) => enumerate(&controller, &mut events, args).await,
    };

    tracing::info!("{}", controller.counters());
    controller.stop().await;
    result
}

fn settings(cli: &Cli) -> Result<TransportSettings, Error> {
    let link = match (&cli.tcp, &cli.serial) {
        (Some(endpoint), _) => {
            let (host, port) = endpoint
                .rsplit_once(':')
                .ok_or_else(|| Error::BadEndpoint(endpoint.clone()))?;
            let port = port
                .parse()
                .map_err(|_| Error::BadEndpoint(endpoint.clone()))?;
            Link::Tcp {
                host: host.to_string(),
                port,
            }
        }
        (None, Some(path)) => Link::Serial {
            path: path.clone(),
            settings: SerialSettings {
                baud_rate: cli.baud,
                parity: cli.parity,
                ..SerialSettings::default()
            },
        },
        (None, None) => return Err(Error::NoLink),
    };

    let framing = match (cli.framing, &link) {
        (Some(x), _) => x,
        (None, Link::Tcp { .. }) => Framing::Bridge,
        (None, Link::Serial { .. }) => Framing::Rtu,
    };

    let mut settings = TransportSettings::new(link, framing);
    settings.response_timeout = Duration::from_millis(cli.timeout);
    if !settings.is_supported() {
        return Err(Error::BadFraming(format!("{framing:?}")));
    }
    Ok(settings)
}

/// number of registers, or bits, needed for `quantity` values
fn dataset_length(args: &DatasetArgs, quantity: u16) -> Result<u16, Error> {
    let width = args.value.width();
    let bits = usize::from(quantity) * width;
    let length = if args.class.is_bits() {
        bits
    } else {
        bits.div_ceil(16)
    };
    u16::try_from(length).map_err(|_| Error::TooMany(quantity, width))
}

fn add_dataset(
    controller: &Controller,
    args: &DatasetArgs,
    length: u16,
    repeat: RepeatPolicy,
) -> DatasetId {
    let dataset = Dataset::new(NODE, args.class, args.address, length)
        .with_offset(args.offset)
        .with_repeat(repeat);
    controller.registry().add_dataset("cli", dataset)
}

fn add_channel(controller: &Controller, channel: Channel) -> Result<(), Error> {
    let id = channel.id.to_string();
    if !controller.registry().add_channel(channel) {
        return Err(Error::Rejected(id));
    }
    Ok(())
}

async fn poll(
    controller: &Controller,
    events: &mut tokio::sync::mpsc::Receiver<Event>,
    args: &PollArgs,
) -> Result<(), Error> {
    let length = dataset_length(&args.dataset, args.quantity)?;
    let repeat = if args.fast {
        RepeatPolicy::Fast
    } else {
        RepeatPolicy::Slow
    };
    let id = add_dataset(controller, &args.dataset, length, repeat);

    for index in 0..args.quantity {
        let channel = Channel::new(
            ChannelId::new(format!("{}", usize::from(args.dataset.address) + usize::from(index))),
            id,
            index,
            args.dataset.value,
        );
        add_channel(controller, channel)?;
    }
    controller.poll_dataset(id)?;

    let mut interval = tokio::time::interval(Duration::from_millis(args.period));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                reconnect(controller).await?;
                if args.fast {
                    controller.exec_fast();
                } else {
                    controller.exec_slow();
                }
            }
            event = events.recv() => match event {
                Some(Event::State(state)) => println!("{state}"),
                Some(Event::Discovered(device)) => println!("{device:?}"),
                None => return Err(Error::Shutdown),
            },
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

/// reopen the link if an i/o error closed it
async fn reconnect(controller: &Controller) -> Result<(), Error> {
    if !controller.transceiver().is_connected() {
        controller.transceiver().connect().await?;
    }
    Ok(())
}

async fn write(controller: &Controller, args: &WriteArgs) -> Result<(), Error> {
    let length = dataset_length(&args.dataset, args.index.saturating_add(1))?;
    let dataset = add_dataset(controller, &args.dataset, length, RepeatPolicy::Once);

    let id = ChannelId::new("value");
    add_channel(
        controller,
        Channel::new(id.clone(), dataset, args.index, args.dataset.value),
    )?;

    let before = controller.counters().messages;
    controller
        .write(State::new(id, parse_value(&args.value)))
        .await?;

    // the write is executed asynchronously, wait for the transaction to start and settle
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while controller.counters().messages == before {
        if tokio::time::Instant::now() > deadline {
            return Err(RequestError::ResponseTimeout.into());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(controller.transceiver().settings().response_timeout).await;
    Ok(())
}

async fn enumerate(
    controller: &Controller,
    events: &mut tokio::sync::mpsc::Receiver<Event>,
    args: &EnumerateArgs,
) -> Result<(), Error> {
    let dataset = Dataset::new(NODE, MessageClass::SetLogicalAddress, u16::from(args.first), 1);
    let id = controller.registry().add_dataset("enumerate", dataset);
    controller.poll_dataset(id)?;

    // enumeration ends with a query nobody answers, so stop once the bus has been quiet
    let quiet = controller.transceiver().settings().response_timeout * 3;
    loop {
        match tokio::time::timeout(quiet, events.recv()).await {
            Ok(Some(Event::Discovered(device))) => match device.serial {
                Some(serial) => println!("serial {serial} -> unit {}", device.unit),
                None => println!("{device:?}"),
            },
            Ok(Some(Event::State(_))) => {}
            Ok(None) => return Err(Error::Shutdown),
            Err(_) => return Ok(()),
        }
    }
}

fn parse_value(text: &str) -> Value {
    if let Ok(x) = text.parse::<bool>() {
        return Value::Bool(x);
    }
    if let Ok(x) = text.parse::<i64>() {
        return Value::Int(x);
    }
    if let Ok(x) = text.parse::<f64>() {
        return Value::Float(x);
    }
    Value::Text(text.to_string())
}
