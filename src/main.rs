//! Weft - CLI

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use weft::{
    AsyncDriver, ExternalEvent, QueuedSource, Scheduler, ScriptStep, SequenceHandle, Value,
    NAME, VERSION,
};

/// Suspendable execution engine demo pump
#[derive(Parser, Debug)]
#[command(name = "weft")]
#[command(version = VERSION)]
#[command(about = NAME, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Pump synthetic external events through a bounded scheduler
    Pump {
        /// Number of synthetic events to load
        #[arg(long, default_value_t = 5)]
        events: usize,

        /// External-event budget per run (0 = unbounded)
        #[arg(long, default_value_t = 0)]
        max: usize,

        /// Print scheduler statistics as JSON
        #[arg(long)]
        stats_json: bool,
    },

    /// Run the delegation showcase (outer yields 0, delegates, yields 99)
    Demo,

    /// Print version information
    Version,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(if args.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::from_default_env()
        })
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Commands::Pump {
            events,
            max,
            stats_json,
        } => {
            pump(events, max, stats_json)?;
        }
        Commands::Demo => demo()?,
        Commands::Version => {
            println!("{} {}", NAME, VERSION);
        }
    }

    Ok(())
}

/// Load `events` synthetic requests into a queued source and drain them.
/// Each request spawns an async computation that awaits a deferred settled
/// by the request handler itself, so every event exercises the full
/// settle-then-dispatch path.
fn pump(
    events: usize,
    max: usize,
    stats_json: bool,
) -> Result<usize> {
    let scheduler = Scheduler::new();
    let mut source = QueuedSource::new("synthetic-requests");

    for request in 0..events {
        let queue = scheduler.queue();
        source.push(ExternalEvent::new(format!("request-{}", request), move || {
            let response = weft::DeferredHandle::new(queue.clone());
            let sequence = SequenceHandle::from_script(vec![
                ScriptStep::Emit(Value::Deferred(response.clone())),
                ScriptStep::StoreSent("body".into()),
                ScriptStep::FinishLocal("body".into()),
            ]);
            let outcome = AsyncDriver::spawn(queue.clone(), sequence);
            outcome.register_continuation(
                move |value| println!("request-{} answered: {}", request, value),
                move |reason| eprintln!("request-{} failed: {}", request, reason),
            );
            if let Err(fault) = response.settle_success(Value::Int(request as i64 * 10)) {
                tracing::error!(%fault, "response deferred already settled");
            }
        }));
    }

    scheduler.add_source(source);
    let mut serviced = scheduler.run(max).map_err(|e| anyhow::anyhow!("{e}"))?;
    // A bounded run may leave events behind; report and drain.
    if max > 0 && serviced == max {
        serviced += scheduler.run(0).map_err(|e| anyhow::anyhow!("{e}"))?;
    }
    println!("serviced {} external events", serviced);

    if stats_json {
        println!("{}", serde_json::to_string_pretty(&scheduler.stats())?);
    }
    Ok(serviced)
}

/// Consume the canonical delegation scenario to completion.
fn demo() -> Result<()> {
    let inner = SequenceHandle::from_values(
        vec![Value::Int(10), Value::Int(20)],
        Value::Int(100),
    );
    let outer = SequenceHandle::from_script(vec![
        ScriptStep::Emit(Value::Int(0)),
        ScriptStep::Delegate(inner),
        ScriptStep::Emit(Value::Int(99)),
        ScriptStep::Finish(Value::Undefined),
    ]);

    loop {
        let step = outer
            .resume(Value::Undefined)
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        if step.done {
            break;
        }
        println!("{}", step.value);
    }
    Ok(())
}
