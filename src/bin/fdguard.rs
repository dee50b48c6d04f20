use clap::{App, Arg, ArgMatches, SubCommand};
use colored::*;
use fdguard::bus::{Transport, VirtualBus};
use fdguard::config::{parse_key, NodeConfig, Role};
use fdguard::link::{BusLink, DEFAULT_BUS_HOST};
use fdguard::node::{AdversaryNode, ConsumerNode, ProducerNode};
use rand::rngs::{OsRng, StdRng};
use std::time::{Duration, Instant};
use tokio::signal;
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info, warn};

const DEFAULT_PORT: &str = "9000";
const LOOP_PERIOD_MS: u64 = 1;
const DASHBOARD_REFRESH_MS: u64 = 1000;

enum RoleNode {
    Producer(ProducerNode<OsRng, StdRng>),
    Consumer(ConsumerNode),
    Adversary(AdversaryNode),
}

impl RoleNode {
    fn build(config: NodeConfig) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(match config.role {
            Role::Producer => RoleNode::Producer(ProducerNode::from_entropy(config)?),
            Role::Consumer => RoleNode::Consumer(ConsumerNode::new(config)?),
            Role::Adversary => RoleNode::Adversary(AdversaryNode::new(config)?),
        })
    }

    fn tick<T: Transport>(&mut self, now: u64, transport: &mut T) {
        match self {
            RoleNode::Producer(producer) => {
                if let Err(e) = producer.poll(now, transport) {
                    error!("Producer error: {}", e);
                }
            }
            RoleNode::Consumer(consumer) => {
                consumer.poll(transport);
            }
            RoleNode::Adversary(adversary) => {
                adversary.poll(now, transport);
            }
        }
    }

    fn render(&self) -> Option<String> {
        match self {
            RoleNode::Producer(_) => None,
            RoleNode::Consumer(consumer) => Some(consumer.dashboard().render()),
            RoleNode::Adversary(adversary) => Some(format!(
                "{}\n{}",
                "Unauthenticated view".red().bold(),
                adversary.naive_dashboard().render()
            )),
        }
    }

    fn stats_json(&self) -> serde_json::Result<String> {
        match self {
            RoleNode::Producer(producer) => serde_json::to_string_pretty(producer.get_stats()),
            RoleNode::Consumer(consumer) => serde_json::to_string_pretty(consumer.get_stats()),
            RoleNode::Adversary(adversary) => serde_json::to_string_pretty(adversary.get_stats()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let matches = App::new("fdguard")
        .version("0.1.0")
        .author("Vehicle Network Security Team")
        .about("Authenticated-encrypted CAN-FD telemetry nodes")
        .arg(
            Arg::with_name("host")
                .short("h")
                .long("host")
                .value_name("HOST")
                .help("Bus hub host address")
                .takes_value(true)
                .default_value(DEFAULT_BUS_HOST)
                .global(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Bus hub port")
                .takes_value(true)
                .default_value(DEFAULT_PORT)
                .global(true),
        )
        .arg(
            Arg::with_name("debug")
                .short("d")
                .long("debug")
                .help("Log every frame with a hex dump")
                .global(true),
        )
        .arg(
            Arg::with_name("key")
                .short("k")
                .long("key")
                .value_name("HEX")
                .help("Pre-shared 32 byte key as 64 hex digits")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("payload-len")
                .long("payload-len")
                .value_name("BYTES")
                .help("Plaintext payload length, identical on every node")
                .takes_value(true)
                .possible_values(&["20", "36"])
                .default_value("20")
                .global(true),
        )
        .subcommand(SubCommand::with_name("producer").about("Publish sealed telemetry frames"))
        .subcommand(SubCommand::with_name("consumer").about("Verify frames and show the dashboard"))
        .subcommand(
            SubCommand::with_name("adversary")
                .about("Sniff the bus and optionally forge frames")
                .arg(
                    Arg::with_name("inject")
                        .short("i")
                        .long("inject")
                        .help("Send all-0xFF frames under the target identifiers"),
                )
                .arg(
                    Arg::with_name("target")
                        .short("t")
                        .long("target")
                        .value_name("ID")
                        .help("Identifier to forge, hex (repeatable)")
                        .takes_value(true)
                        .multiple(true)
                        .number_of_values(1),
                ),
        )
        .subcommand(
            SubCommand::with_name("demo")
                .about("Run producer, consumer and adversary on an in-process bus")
                .arg(
                    Arg::with_name("duration")
                        .long("duration")
                        .value_name("MS")
                        .help("Simulated time to run")
                        .takes_value(true)
                        .default_value("2000"),
                )
                .arg(
                    Arg::with_name("inject")
                        .short("i")
                        .long("inject")
                        .help("Let the adversary forge frames"),
                ),
        )
        .get_matches();

    let host = matches.value_of("host").unwrap_or(DEFAULT_BUS_HOST);
    let port = matches.value_of("port").unwrap_or(DEFAULT_PORT).parse::<u16>()?;

    match matches.subcommand() {
        ("producer", Some(sub_matches)) => {
            let config = build_config(&matches, sub_matches, Role::Producer)?;
            run_node(config, host, port).await?;
        }
        ("consumer", Some(sub_matches)) => {
            let config = build_config(&matches, sub_matches, Role::Consumer)?;
            run_node(config, host, port).await?;
        }
        ("adversary", Some(sub_matches)) => {
            let config = build_config(&matches, sub_matches, Role::Adversary)?;
            run_node(config, host, port).await?;
        }
        ("demo", Some(sub_matches)) => {
            run_demo(&matches, sub_matches)?;
        }
        _ => {
            println!("{}", "No role specified. Use --help for usage information.".yellow());
            println!("{}", "Quick start:".bright_green());
            println!("  {} Start the bus hub", "fdguard-bus".bright_cyan());
            println!("  {} Publish telemetry", "fdguard producer".bright_cyan());
            println!("  {} Show the dashboard", "fdguard consumer".bright_cyan());
            println!("  {} Forge frames", "fdguard adversary --inject".bright_cyan());
        }
    }

    Ok(())
}

fn parse_identifier(text: &str) -> Result<u32, std::num::ParseIntError> {
    let digits = text.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(digits, 16)
}

fn build_config(
    matches: &ArgMatches,
    sub_matches: &ArgMatches,
    role: Role,
) -> Result<NodeConfig, Box<dyn std::error::Error>> {
    let mut config = NodeConfig::for_role(role);
    config.debug_output = matches.is_present("debug") || sub_matches.is_present("debug");
    config.inject_malicious_frames = sub_matches.is_present("inject");

    if let Some(key) = matches.value_of("key").or_else(|| sub_matches.value_of("key")) {
        config.key = parse_key(key)?;
    }
    if let Some(len) = matches.value_of("payload-len") {
        config.payload_len = len.parse()?;
    }
    if let Some(targets) = sub_matches.values_of("target") {
        config.inject_targets = targets.map(parse_identifier).collect::<Result<Vec<u32>, _>>()?;
    }

    config.validate()?;
    Ok(config)
}

async fn run_node(config: NodeConfig, host: &str, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let role = config.role;
    let debug_output = config.debug_output;

    println!("{} {}", "fdguard".bright_blue().bold(), role.name().bright_white());
    println!("{} {}:{}", "Connecting to".dimmed(), host, port);

    let (mut transport, tasks) = BusLink::connect((host, port)).await?;
    let mut node = RoleNode::build(config)?;
    info!("{} attached to bus at {}:{}", role.name(), host, port);

    let start = Instant::now();
    let mut ticker = time::interval(Duration::from_millis(LOOP_PERIOD_MS));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let shutdown = signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut next_render = DASHBOARD_REFRESH_MS;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut shutdown => break,
        }

        let now = start.elapsed().as_millis() as u64;
        node.tick(now, &mut transport);

        if transport.is_closed() {
            warn!("Bus hub closed the connection");
            break;
        }

        if !debug_output && now >= next_render {
            next_render = now + DASHBOARD_REFRESH_MS;
            if let Some(view) = node.render() {
                println!("{}", view);
            }
        }
    }

    tasks.abort();
    println!("{}", "Node statistics".bright_green());
    println!("{}", node.stats_json()?);
    Ok(())
}

fn run_demo(matches: &ArgMatches, sub_matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let duration = sub_matches.value_of("duration").unwrap_or("2000").parse::<u64>()?;

    let bus = VirtualBus::new();
    let mut producer_port = bus.attach();
    let mut consumer_port = bus.attach();
    let mut adversary_port = bus.attach();

    let mut producer = ProducerNode::from_entropy(build_config(matches, sub_matches, Role::Producer)?)?;
    let mut consumer = ConsumerNode::new(build_config(matches, sub_matches, Role::Consumer)?)?;
    let mut adversary = AdversaryNode::new(build_config(matches, sub_matches, Role::Adversary)?)?;

    // Simulated clock; the in-process bus has no real latency
    for now in 0..duration {
        producer.poll(now, &mut producer_port)?;
        adversary.poll(now, &mut adversary_port);
        consumer.poll(&mut consumer_port);
    }

    println!("{}", consumer.dashboard().render());
    println!("{}", "Unauthenticated view".red().bold());
    println!("{}", adversary.naive_dashboard().render());
    println!("{}", serde_json::to_string_pretty(consumer.get_stats())?);
    println!("{}", serde_json::to_string_pretty(&bus.get_stats())?);
    Ok(())
}
