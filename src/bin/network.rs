use anyhow::Result;
use clap::{Parser, ValueEnum};
use logseq_mcp::gateway;
use logseq_mcp::{traversal_for, ConceptNetwork, Config, Strategy};
use std::collections::BTreeSet;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "network")]
#[command(about = "Print the concept network around a Logseq page")]
struct Args {
    /// Root page name
    page: String,

    /// Maximum number of hops from the root
    #[arg(short, long, default_value_t = 2)]
    depth: usize,

    /// Traversal strategy (defaults to features.use_datalog from the config)
    #[arg(short, long, value_enum)]
    strategy: Option<StrategyArg>,

    /// Run both strategies and report whether they agree
    #[arg(long)]
    compare: bool,

    /// Print the network as JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StrategyArg {
    Datalog,
    Sequential,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Datalog => Strategy::Datalog,
            StrategyArg::Sequential => Strategy::Sequential,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "warn")).init();

    let args = Args::parse();
    let config = Config::load()?;
    let api = gateway::connect(&config)?;

    if args.compare {
        let datalog = timed(traversal_for(Strategy::Datalog, api.clone()).as_ref(), &args).await?;
        let sequential = timed(traversal_for(Strategy::Sequential, api).as_ref(), &args).await?;
        compare(&datalog, &sequential);
        return Ok(());
    }

    let strategy = args
        .strategy
        .map(Strategy::from)
        .unwrap_or_else(|| Strategy::from_flag(config.features.use_datalog_for("concept_network")));
    let network = timed(traversal_for(strategy, api).as_ref(), &args).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&network)?);
    } else {
        print_network(&network);
    }
    Ok(())
}

async fn timed(traversal: &dyn logseq_mcp::NetworkTraversal, args: &Args) -> Result<ConceptNetwork> {
    let start = Instant::now();
    let network = traversal.traverse(&args.page, args.depth).await?;
    log::info!(
        "{:?}: {} nodes, {} edges in {} ms",
        traversal.strategy(),
        network.nodes.len(),
        network.edges.len(),
        start.elapsed().as_millis()
    );
    Ok(network)
}

fn print_network(network: &ConceptNetwork) {
    println!(
        "\n=== Concept network: {} (depth {}, {:?}) ===\n",
        network.root, network.max_hops, network.strategy
    );
    println!("{:<8} {:>6}  {}", "Depth", "Id", "Page");
    println!("{:-<60}", "");
    for node in &network.nodes {
        println!("{:<8} {:>6}  {}", node.depth, node.id, node.name);
    }

    println!("\nEdges ({}):", network.edges.len());
    for edge in &network.edges {
        let name = |id| network.node(id).map(|n| n.name.as_str()).unwrap_or("?");
        println!("  {} -> {} [{:?}]", name(edge.from), name(edge.to), edge.kind);
    }
}

fn compare(datalog: &ConceptNetwork, sequential: &ConceptNetwork) {
    let nodes = |n: &ConceptNetwork| n.nodes.iter().map(|x| (x.id, x.depth)).collect::<BTreeSet<_>>();
    let edges = |n: &ConceptNetwork| {
        n.edges
            .iter()
            .map(|e| (e.from, e.to, format!("{:?}", e.kind)))
            .collect::<BTreeSet<_>>()
    };

    let (dn, sn) = (nodes(datalog), nodes(sequential));
    let (de, se) = (edges(datalog), edges(sequential));

    println!("datalog:    {} nodes, {} edges", dn.len(), de.len());
    println!("sequential: {} nodes, {} edges", sn.len(), se.len());
    println!("nodes match: {}", if dn == sn { "yes" } else { "NO" });
    println!("edges match: {}", if de == se { "yes" } else { "NO" });

    for (id, depth) in dn.symmetric_difference(&sn) {
        let side = if dn.contains(&(*id, *depth)) { "datalog only" } else { "sequential only" };
        println!("  node {} at depth {}: {}", id, depth, side);
    }
}
