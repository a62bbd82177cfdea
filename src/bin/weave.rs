use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use sceneweave::http::{HttpTransport, TokioClock};
use sceneweave::{Delivery, Engine, Tree, Value, document};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "weave")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dispatch an event and print the application actions it produces.
    Run {
        file: String,
        #[arg(long)]
        node: Option<String>,
        #[arg(long, default_value = "load")]
        event: String,
        #[arg(long, default_value_t = 10_000)]
        timeout_ms: u64,
    },
    /// Print the node tree with registered events.
    Inspect { file: String },
}

fn print_delivery(tree: &Tree, delivery: &Delivery) {
    let params = tree.evaluate(delivery.originator, delivery.action.info());
    // Evaluate one level down as well, where app actions keep their arguments.
    let params: sceneweave::Map = params
        .into_iter()
        .map(|(k, v)| match v {
            Value::Map(inner) => (k, Value::Map(tree.evaluate(delivery.originator, &inner))),
            other => (k, other),
        })
        .collect();
    println!("{}", Value::Map(params).to_json_string());
}

fn print_tree(tree: &Tree, id: sceneweave::NodeId, depth: usize) {
    let Some(node) = tree.get(id) else {
        return;
    };
    let events: Vec<&str> = node.events.names().collect();
    println!(
        "{:indent$}{} {} events: [{}]",
        "",
        id,
        node.name.as_deref().unwrap_or("-"),
        events.join(", "),
        indent = depth * 2
    );
    for child in &node.children {
        print_tree(tree, *child, depth + 1);
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            node,
            event,
            timeout_ms,
        } => {
            let (tree, root) = document::load(&file)?;
            let target = match &node {
                Some(name) => tree
                    .find(name)
                    .ok_or_else(|| anyhow!("Node not found: {}", name))?,
                None => root,
            };

            let mut engine = Engine::new(tree, HttpTransport::new(), TokioClock);
            engine.set_handler(|tree: &Tree, delivery: &Delivery| print_delivery(tree, delivery));
            engine.dispatch(target, &event)?;

            let timeout = Duration::from_millis(timeout_ms);
            if tokio::time::timeout(timeout, engine.run_until_idle())
                .await
                .is_err()
            {
                log::info!("timed out after {:?}; cancelling pending work", timeout);
            }
            engine.shutdown();
        }
        Commands::Inspect { file } => {
            let (tree, root) = document::load(&file)?;
            print_tree(&tree, root, 0);
        }
    }

    Ok(())
}
