use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use replica_executor::{
    ComputationDef, DeviceSpec, ExecutionModeConfig, ExecutionModeContext, FunctionWrapperBuilder,
    Value, ValueType, check, find_dataset_reduce_nodes,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "replica-executor")]
struct Args {
    /// JSON execution-mode config; falls back to the environment when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a computation against the configured execution mode
    Check {
        /// Serialized computation (.pb or .json)
        file: PathBuf,
    },
    /// Wrap and invoke a computation
    Run {
        file: PathBuf,

        /// Pin the whole computation to the CPU
        #[arg(long, default_value_t = false)]
        cpu: bool,

        /// Pin the whole computation to a logical device, e.g. GPU:0
        #[arg(long)]
        device: Option<DeviceSpec>,

        /// Integer argument for computations taking a parameter
        #[arg(long)]
        arg: Option<i64>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ExecutionModeConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ExecutionModeConfig::from_env()?,
    };
    let context = Arc::new(ExecutionModeContext::from_config(&config)?);

    match args.command {
        Command::Check { file } => {
            let def = ComputationDef::from_file(&file)
                .with_context(|| format!("loading {}", file.display()))?;
            let graph = def.extract_graph()?;
            for path in find_dataset_reduce_nodes(&graph) {
                println!("dataset reduce: {path}");
            }
            check(&graph, &context)?;
            println!("ok: {} nodes", graph.root().total_node_count());
        }
        Command::Run {
            file,
            cpu,
            device,
            arg,
        } => {
            let def = ComputationDef::from_file(&file)
                .with_context(|| format!("loading {}", file.display()))?;
            let param_type = arg.map(|_| ValueType::I64);
            let callable =
                FunctionWrapperBuilder::new(context).build(&def, cpu, param_type, device)?;
            let result = callable.call(arg.map(Value::I64))?;
            println!("{result}");
        }
    }
    Ok(())
}
