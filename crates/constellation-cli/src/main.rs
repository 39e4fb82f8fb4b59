//! Constellation compiler and runtime CLI.
//!
//! `spec.md` §1/§6 scope the CLI out of the core as an external
//! collaborator ("only their interfaces described in §6") -- this binary
//! is the thin surface that exercises the Host embedding API
//! (`constellation-check`'s checker, `constellation-compiler`'s
//! `compile`/`rehydrate`, `constellation-runtime`'s `Executor`) and the
//! Program Store (`constellation-storage`) from a terminal.
//!
//! Grounded on `lmlang-cli/src/main.rs`'s subcommand-per-pipeline-stage
//! shape (`compile` there drove `lmlang_codegen::compile`; here `compile`
//! and `run` drive the Constellation pipeline instead) and its
//! exit-code-per-failure-class convention.

mod builtins;
mod registry_manifest;

use std::fs;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use indexmap::IndexMap;
use uuid::Uuid;

use constellation_compiler::{compile, CompileError};
use constellation_core::types::CValue;
use constellation_runtime::{Executor, ExecutionStatus, Scheduler, SchedulerMode};
use constellation_storage::{ProgramStore, SqliteStore};

use registry_manifest::load_registry;

/// Constellation dataflow compiler and runtime.
#[derive(Parser)]
#[command(name = "constellation", about = "Constellation dataflow compiler and runtime")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a source file and print its structural hash, or its errors.
    Compile {
        /// Path to a Constellation source file.
        file: PathBuf,
        /// Name recorded on the compiled program image.
        #[arg(long, default_value = "program")]
        name: String,
        /// Path to a JSON function-registry manifest (`spec.md` §6 module
        /// registry). Falls back to a small built-in registry when absent.
        #[arg(long)]
        registry: Option<PathBuf>,
        /// Persist the compiled image into this SQLite store.
        #[arg(long)]
        store: Option<PathBuf>,
    },
    /// Compile and execute a source file, printing the resulting
    /// `DataSignature` as JSON.
    Run {
        /// Path to a Constellation source file.
        file: PathBuf,
        /// Name recorded on the compiled program image.
        #[arg(long, default_value = "program")]
        name: String,
        /// Path to a JSON function-registry manifest.
        #[arg(long)]
        registry: Option<PathBuf>,
        /// One `name=<json-value>` pair per user input, where `<json-value>`
        /// is a `constellation_core::CValue` in its serde representation
        /// (e.g. `x='{"Int":42}'`). Repeatable.
        #[arg(long = "input")]
        inputs: Vec<String>,
    },
    /// Program Store operations (`spec.md` §4.7), backed by a SQLite file.
    Store {
        #[command(subcommand)]
        command: StoreCommands,
    },
}

#[derive(Subcommand)]
enum StoreCommands {
    /// Register a human-readable alias for a stored structural hash.
    Alias {
        #[arg(long)]
        db: PathBuf,
        hash: String,
        name: String,
    },
    /// Resolve an alias or `sha256:<hex>` reference to its structural hash.
    Resolve {
        #[arg(long)]
        db: PathBuf,
        reference: String,
    },
    /// List every stored program image.
    List {
        #[arg(long)]
        db: PathBuf,
    },
    /// List every registered alias.
    Aliases {
        #[arg(long)]
        db: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let exit_code = match cli.command {
        Commands::Compile { file, name, registry, store } => {
            run_compile(&file, &name, registry.as_deref(), store.as_deref())
        }
        Commands::Run { file, name, registry, inputs } => {
            run_run(&file, &name, registry.as_deref(), &inputs).await
        }
        Commands::Store { command } => run_store(command),
    };
    process::exit(exit_code);
}

/// Exit codes: 0 success, 1 I/O error, 2 compile error, 3 bad `--input`,
/// 4 execution did not complete (`Suspended`/`Failed`).
fn run_compile(file: &std::path::Path, name: &str, registry: Option<&std::path::Path>, store: Option<&std::path::Path>) -> i32 {
    let source = match fs::read_to_string(file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: failed to read {}: {e}", file.display());
            return 1;
        }
    };

    let function_registry = match load_registry(registry) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {e}");
            return 1;
        }
    };

    let loaded = match compile(&source, name, &function_registry) {
        Ok(l) => l,
        Err(e) => {
            print_compile_error(&e);
            return 2;
        }
    };

    println!("structural_hash: {}", loaded.image.structural_hash);
    println!("syntactic_hash: {}", loaded.image.syntactic_hash);

    if let Some(db) = store {
        let db = match db.to_str() {
            Some(s) => s,
            None => {
                eprintln!("error: --store path is not valid UTF-8");
                return 1;
            }
        };
        let sqlite = match SqliteStore::new(db) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("error: failed to open store {db}: {e}");
                return 1;
            }
        };
        let hash = loaded.image.structural_hash.clone();
        if let Err(e) = sqlite.store(loaded.image) {
            eprintln!("error: failed to persist image: {e}");
            return 1;
        }
        println!("stored: {hash}");
    }

    0
}

async fn run_run(file: &std::path::Path, name: &str, registry: Option<&std::path::Path>, raw_inputs: &[String]) -> i32 {
    let source = match fs::read_to_string(file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: failed to read {}: {e}", file.display());
            return 1;
        }
    };

    let function_registry = match load_registry(registry) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {e}");
            return 1;
        }
    };

    let loaded = match compile(&source, name, &function_registry) {
        Ok(l) => l,
        Err(e) => {
            print_compile_error(&e);
            return 2;
        }
    };

    let mut inputs: IndexMap<String, CValue> = IndexMap::new();
    for raw in raw_inputs {
        match parse_input(raw) {
            Ok((k, v)) => {
                inputs.insert(k, v);
            }
            Err(e) => {
                eprintln!("error: {e}");
                return 3;
            }
        }
    }

    let module_registry = builtins::module_registry();
    let scheduler = Scheduler::new(SchedulerMode::Unbounded);
    let executor = Executor::new(module_registry, scheduler);
    let signature = executor.execute(&loaded, Uuid::new_v4(), inputs).await;

    let json = serde_json::to_string_pretty(&signature).unwrap_or_else(|e| {
        format!("{{\"error\": \"failed to serialize signature: {e}\"}}")
    });
    println!("{json}");

    match signature.status {
        ExecutionStatus::Completed => 0,
        ExecutionStatus::Suspended | ExecutionStatus::Failed => 4,
    }
}

fn run_store(command: StoreCommands) -> i32 {
    match command {
        StoreCommands::Alias { db, hash, name } => {
            let Some(store) = open_store(&db) else { return 1 };
            store.alias(&name, &hash);
            println!("aliased {name} -> {hash}");
            0
        }
        StoreCommands::Resolve { db, reference } => {
            let Some(store) = open_store(&db) else { return 1 };
            match store.resolve(&reference) {
                Some(hash) => {
                    println!("{hash}");
                    0
                }
                None => {
                    eprintln!("no such alias or structural hash: {reference}");
                    1
                }
            }
        }
        StoreCommands::List { db } => {
            let Some(store) = open_store(&db) else { return 1 };
            let images = store.list_images();
            println!("{}", serde_json::to_string_pretty(&images).unwrap());
            0
        }
        StoreCommands::Aliases { db } => {
            let Some(store) = open_store(&db) else { return 1 };
            let aliases = store.list_aliases();
            println!("{}", serde_json::to_string_pretty(&aliases).unwrap());
            0
        }
    }
}

fn open_store(db: &std::path::Path) -> Option<SqliteStore> {
    let path = match db.to_str() {
        Some(s) => s,
        None => {
            eprintln!("error: --db path is not valid UTF-8");
            return None;
        }
    };
    match SqliteStore::new(path) {
        Ok(s) => Some(s),
        Err(e) => {
            eprintln!("error: failed to open store {path}: {e}");
            None
        }
    }
}

/// Parses one `--input name=<json-value>` argument. The value half is the
/// serde representation of a `constellation_core::CValue`
/// (e.g. `{"Int":42}`, `{"Product":{"x":{"Int":1}}}`), not a bare JSON
/// literal -- `spec.md` §1 scopes generic JSON<->value conversion out of
/// the core, so the CLI leans on `CValue`'s own derive instead of building
/// a second conversion layer.
fn parse_input(arg: &str) -> Result<(String, CValue), String> {
    let (name, raw) = arg
        .split_once('=')
        .ok_or_else(|| format!("invalid --input '{arg}', expected name=<json-value>"))?;
    let value: CValue = serde_json::from_str(raw)
        .map_err(|e| format!("invalid value for input '{name}': {e}"))?;
    Ok((name.to_string(), value))
}

fn print_compile_error(err: &CompileError) {
    match err {
        CompileError::Check(errors) => {
            eprintln!("{} error(s):", errors.len());
            for e in errors {
                eprintln!("  - {e}");
            }
        }
        CompileError::Lower(e) => {
            eprintln!("lowering error: {e}");
        }
    }
}
