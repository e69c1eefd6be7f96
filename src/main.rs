use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use eventsys::memory::{DataSpace, DeviceBuffer, HostBuffer};
use eventsys::net::{BufferExchange, ExchangeDirection, ExchangeSendTask, Neighborhood, Transport};
use eventsys::tasks::{ComputeTask, CopyTask, FillPolicy, FillTask, RecvTask};
use eventsys::{elog, Error, EventTask, ExchangeOrdering, Manager, ManagerStats, Result, SchedulerConfig};

/// eventsys - asynchronous task/event scheduler demos
#[derive(Parser, Debug)]
#[command(name = "eventsys")]
#[command(version, about, long_about = None)]
#[command(
    after_help = "ENVIRONMENT:\n    EVENTSYS_DEBUG=1     Enable debug logging (alternative to --debug)"
)]
pub struct Cli {
    /// Enable debug logging (writes to ~/.eventsys/eventsys.log)
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    /// Scheduler config file (defaults to ~/.eventsys/eventsys.toml)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Print a JSON summary instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Fill a device buffer and copy it back to the host
    Fill {
        /// Number of elements
        #[arg(long, default_value_t = 1000)]
        extent: usize,

        /// Fill value
        #[arg(long, default_value_t = 7)]
        value: u64,

        /// Fill policy (auto picks by value size)
        #[arg(long, value_enum, default_value_t = PolicyArg::Auto)]
        policy: PolicyArg,
    },

    /// Send buffers to neighbor directions over the loopback transport
    Exchange {
        /// Dimensionality of the neighborhood (0-3)
        #[arg(long, default_value_t = 2)]
        dim: usize,

        /// Direction codes with an active exchange, comma separated
        #[arg(long, value_delimiter = ',', default_values_t = [1u32, 6])]
        active: Vec<u32>,

        /// Elements per message
        #[arg(long, default_value_t = 64)]
        len: usize,

        /// Seed every direction from the same event instead of chaining them
        #[arg(long)]
        concurrent: bool,
    },

    /// Chain fill, kernel and copy-back steps through transactions
    Pipeline {
        /// Number of steps
        #[arg(long, default_value_t = 8)]
        steps: usize,

        /// Elements per buffer
        #[arg(long, default_value_t = 4096)]
        extent: usize,

        /// Print the dependency graph (Graphviz) before waiting
        #[arg(long)]
        dot: bool,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyArg {
    Auto,
    Small,
    Large,
}

#[derive(Serialize)]
struct Summary {
    command: &'static str,
    ok: bool,
    elapsed_ms: f64,
    detail: serde_json::Value,
    stats: ManagerStats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    eventsys::log::init_with_debug(cli.debug);
    if cli.debug {
        elog!("eventsys starting (debug mode enabled)");
    } else {
        elog!("eventsys starting");
    }

    let config = match &cli.config {
        Some(path) => SchedulerConfig::load_from(path)?,
        None => SchedulerConfig::load()?,
    };

    let summary = match cli.command {
        Command::Fill {
            extent,
            value,
            policy,
        } => run_fill(config, extent, value, policy)?,
        Command::Exchange {
            dim,
            active,
            len,
            concurrent,
        } => run_exchange(config, dim, active, len, concurrent)?,
        Command::Pipeline { steps, extent, dot } => run_pipeline(config, steps, extent, dot)?,
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    if summary.ok {
        Ok(())
    } else {
        Err(Error::Validation(format!("{} produced wrong results", summary.command)))
    }
}

fn run_fill(config: SchedulerConfig, extent: usize, value: u64, policy: PolicyArg) -> Result<Summary> {
    let mut manager = Manager::new(config)?;
    let start = Instant::now();

    let device = DeviceBuffer::<u64, 1>::new(DataSpace::new([extent]));
    let host = HostBuffer::<u64, 1>::new(DataSpace::new([extent]));

    let mut fill = FillTask::new(device.clone(), value);
    fill = match policy {
        PolicyArg::Auto => fill,
        PolicyArg::Small => fill.with_policy(FillPolicy::Small),
        PolicyArg::Large => fill.with_policy(FillPolicy::Large),
    };

    let done = manager.transaction(EventTask::ready(), |m| {
        m.submit(fill);
        m.submit(CopyTask::device_to_host(&device, &host));
    });
    manager.wait(&done);

    let ok = host.to_vec().iter().all(|v| *v == value);
    Ok(Summary {
        command: "fill",
        ok,
        elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
        detail: serde_json::json!({ "extent": extent, "value": value, "policy": format!("{:?}", policy) }),
        stats: manager.stats(),
    })
}

fn run_exchange(
    mut config: SchedulerConfig,
    dim: usize,
    active: Vec<u32>,
    len: usize,
    concurrent: bool,
) -> Result<Summary> {
    if concurrent {
        config.exchange_ordering = ExchangeOrdering::Concurrent;
    }
    let neighborhood = Neighborhood::new(dim);
    let mut active: Vec<ExchangeDirection> = active
        .into_iter()
        .map(ExchangeDirection::new)
        .filter(|d| !d.is_none() && d.code() < neighborhood.exchanges())
        .collect();
    active.sort();
    active.dedup();

    let mut manager = Manager::new(config)?;
    let start = Instant::now();
    const TAG: u32 = 1;

    let mut handler = BufferExchange::<u32>::new(TAG);
    let mut inboxes = Vec::new();
    let mut received = EventTask::ready();
    for direction in &active {
        let outgoing = HostBuffer::new_filled(DataSpace::new([len]), direction.code());
        handler = handler.with_send(*direction, outgoing);

        let inbox = HostBuffer::<u32, 1>::new(DataSpace::new([len]));
        received += manager.submit(RecvTask::into_buffer(direction.mirror(), TAG, inbox.clone()));
        inboxes.push((*direction, inbox));
    }

    let sent = manager.submit(ExchangeSendTask::new(handler, neighborhood));
    manager.wait(&(sent + received));

    let ok = inboxes
        .iter()
        .all(|(direction, inbox)| inbox.to_vec() == vec![direction.code(); len]);
    let names: Vec<String> = active.iter().map(|d| d.to_string()).collect();
    Ok(Summary {
        command: "exchange",
        ok,
        elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
        detail: serde_json::json!({
            "directions": neighborhood.len(),
            "active": names,
            "messages_sent": manager.transport().messages_sent(),
        }),
        stats: manager.stats(),
    })
}

fn run_pipeline(config: SchedulerConfig, steps: usize, extent: usize, dot: bool) -> Result<Summary> {
    let mut manager = Manager::new(config)?;
    let start = Instant::now();

    let device = DeviceBuffer::<u64, 1>::new(DataSpace::new([extent]));
    let host = HostBuffer::<u64, 1>::new(DataSpace::new([extent]));
    let mut previous = EventTask::ready();

    for step in 0..steps as u64 {
        manager.start_transaction(previous);
        let filled = manager.submit(FillTask::new(device.clone(), step));
        let kernel_buffer = device.clone();
        let computed = manager.submit_after(
            ComputeTask::new(move || {
                kernel_buffer.write(|mut data| {
                    for v in data.as_mut_slice() {
                        *v += 1;
                    }
                })
            }),
            filled,
        );
        manager.submit_after(CopyTask::device_to_host(&device, &host), computed);
        previous = manager.end_transaction();
    }

    if dot {
        print!("{}", manager.dependency_dot());
    }
    manager.wait(&previous);

    let expected = steps as u64;
    let ok = steps == 0 || host.to_vec().iter().all(|v| *v == expected);
    Ok(Summary {
        command: "pipeline",
        ok,
        elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
        detail: serde_json::json!({ "steps": steps, "extent": extent }),
        stats: manager.stats(),
    })
}

fn print_summary(summary: &Summary) {
    println!();
    println!("  Command:     {}", summary.command);
    println!("  Result:      {}", if summary.ok { "ok" } else { "MISMATCH" });
    println!("  Elapsed:     {:.2} ms", summary.elapsed_ms);
    if let serde_json::Value::Object(fields) = &summary.detail {
        for (key, value) in fields {
            println!("  {:<12} {}", format!("{}:", key), value);
        }
    }
    let registry = &summary.stats.registry;
    println!(
        "  Tasks:       {} submitted, {} finished, {} collected",
        registry.submitted_total, registry.finished_total, registry.collected_total
    );
    for lane in &summary.stats.lanes {
        println!(
            "  {:<12} {} ops ({:?})",
            format!("{}:", lane.id),
            lane.submitted,
            lane.kind
        );
    }
    println!();
}
